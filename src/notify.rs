//! Sale events and customer notifications.
//!
//! Workflows publish [`SaleEvent`]s onto an in-process outbox once their
//! transaction has committed. A [`NotificationWorker`] drains the outbox,
//! sends the customer mails and mirrors each event to NATS when a client is
//! configured. Nothing here can fail the write that produced the event:
//! delivery failures are logged and not retried.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::join_url;
use crate::domain::aggregates::{ConfirmationStatus, OrderStatus};
use crate::domain::events::SaleEvent;
use crate::store::CustomerDirectory;
use crate::{CommerceError, Result};

pub const MAIL_SUBJECT: &str = "mail.outbound";

pub fn event_subject(event: &SaleEvent) -> String { format!("sales.events.{}", event.kind()) }

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_accepted(&self, customer_id: &str) -> Result<()>;
    async fn send_delivered(&self, customer_id: &str, sale_id: &str) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Renders customer mails and hands them to the mail transport over NATS.
/// Without a NATS client the rendered mail is only logged.
pub struct MailNotifier<D> {
    directory: Arc<D>,
    nats: Option<async_nats::Client>,
    from: String,
    invoice_base_url: String,
}

impl<D: CustomerDirectory> MailNotifier<D> {
    pub fn new(directory: Arc<D>, nats: Option<async_nats::Client>, from: impl Into<String>, invoice_base_url: impl Into<String>) -> Self {
        Self { directory, nats, from: from.into(), invoice_base_url: invoice_base_url.into() }
    }

    async fn recipient(&self, customer_id: &str) -> Result<(String, String)> {
        let customer = self
            .directory
            .customer_by_id(customer_id)
            .await?
            .ok_or_else(|| CommerceError::Notification(format!("no customer {customer_id}")))?;
        Ok((customer.email, customer.name))
    }

    pub async fn accepted_message(&self, customer_id: &str) -> Result<EmailMessage> {
        let (to, name) = self.recipient(customer_id).await?;
        Ok(EmailMessage {
            from: self.from.clone(),
            to,
            subject: "Your order has been accepted".into(),
            body: format!("Hello {name},\n\nYour order has been accepted and is being prepared for dispatch.\n"),
        })
    }

    pub async fn delivered_message(&self, customer_id: &str, sale_id: &str) -> Result<EmailMessage> {
        let (to, name) = self.recipient(customer_id).await?;
        let invoice = self.invoice_link(sale_id);
        Ok(EmailMessage {
            from: self.from.clone(),
            to,
            subject: "Your order has been delivered".into(),
            body: format!("Hello {name},\n\nYour order has been delivered.\nDownload your invoice: {invoice}\n"),
        })
    }

    fn invoice_link(&self, sale_id: &str) -> String {
        if self.invoice_base_url.contains('?') {
            format!("{}{sale_id}", self.invoice_base_url)
        } else {
            join_url(&self.invoice_base_url, sale_id)
        }
    }

    async fn deliver(&self, message: EmailMessage) -> Result<()> {
        match &self.nats {
            Some(client) => {
                let payload = serde_json::to_vec(&message).map_err(|e| CommerceError::Notification(e.to_string()))?;
                client
                    .publish(MAIL_SUBJECT.to_string(), payload.into())
                    .await
                    .map_err(|e| CommerceError::Notification(e.to_string()))?;
                debug!(to = %message.to, subject = %message.subject, "mail queued");
            }
            None => info!(to = %message.to, subject = %message.subject, "mail transport not configured; mail logged only"),
        }
        Ok(())
    }
}

#[async_trait]
impl<D: CustomerDirectory> NotificationSender for MailNotifier<D> {
    async fn send_accepted(&self, customer_id: &str) -> Result<()> {
        let message = self.accepted_message(customer_id).await?;
        self.deliver(message).await
    }

    async fn send_delivered(&self, customer_id: &str, sale_id: &str) -> Result<()> {
        let message = self.delivered_message(customer_id, sale_id).await?;
        self.deliver(message).await
    }
}

/// Sending half of the outbox.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<SaleEvent>,
}

impl EventPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SaleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: SaleEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!(sale_id = %e.0.sale_id(), kind = e.0.kind(), "event outbox closed; event dropped");
        }
    }
}

pub struct NotificationWorker<N> {
    sender: Arc<N>,
    nats: Option<async_nats::Client>,
}

impl<N: NotificationSender + 'static> NotificationWorker<N> {
    pub fn new(sender: Arc<N>, nats: Option<async_nats::Client>) -> Self { Self { sender, nats } }

    /// Drains the outbox until every [`EventPublisher`] is dropped.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<SaleEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.dispatch(&event).await;
            }
            debug!("event outbox closed; notification worker stopping");
        })
    }

    pub async fn dispatch(&self, event: &SaleEvent) {
        if let Err(e) = self.mirror(event).await {
            warn!(error = %e, sale_id = %event.sale_id(), kind = event.kind(), "failed to mirror sale event");
        }

        let sent = match event {
            SaleEvent::ConfirmationChanged { customer_id, to: ConfirmationStatus::Accepted, .. } => {
                Some(self.sender.send_accepted(customer_id).await)
            }
            SaleEvent::OrderStatusChanged { customer_id, sale_id, to: OrderStatus::Delivered, .. } => {
                Some(self.sender.send_delivered(customer_id, sale_id).await)
            }
            _ => None,
        };

        match sent {
            Some(Ok(())) => info!(sale_id = %event.sale_id(), kind = event.kind(), "customer notified"),
            Some(Err(e)) => warn!(error = %e, sale_id = %event.sale_id(), kind = event.kind(), "customer notification failed"),
            None => {}
        }
    }

    async fn mirror(&self, event: &SaleEvent) -> Result<()> {
        let Some(client) = &self.nats else { return Ok(()) };
        let payload = serde_json::to_vec(event).map_err(|e| CommerceError::EventBus(e.to_string()))?;
        client
            .publish(event_subject(event), payload.into())
            .await
            .map_err(|e| CommerceError::EventBus(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::{Customer, SaleMode};
    use crate::store::MemoryStore;
    use tokio::sync::Mutex;

    /// Records every notification it is asked to send.
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub sent: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send_accepted(&self, customer_id: &str) -> Result<()> {
            self.sent.lock().await.push(format!("accepted:{customer_id}"));
            if self.fail {
                return Err(CommerceError::Notification("smtp down".into()));
            }
            Ok(())
        }

        async fn send_delivered(&self, customer_id: &str, sale_id: &str) -> Result<()> {
            self.sent.lock().await.push(format!("delivered:{customer_id}:{sale_id}"));
            if self.fail {
                return Err(CommerceError::Notification("smtp down".into()));
            }
            Ok(())
        }
    }

    fn accepted(sale_id: &str) -> SaleEvent {
        SaleEvent::ConfirmationChanged {
            sale_id: sale_id.into(),
            customer_id: "C1".into(),
            from: ConfirmationStatus::Pending,
            to: ConfirmationStatus::Accepted,
        }
    }

    #[tokio::test]
    async fn test_only_qualifying_events_notify() {
        let sender = Arc::new(RecordingSender::default());
        let worker = NotificationWorker::new(sender.clone(), None);
        worker.dispatch(&accepted("S1")).await;
        worker
            .dispatch(&SaleEvent::OrderStatusChanged {
                sale_id: "S1".into(),
                customer_id: "C1".into(),
                from: OrderStatus::Pending,
                to: OrderStatus::Dispatched,
            })
            .await;
        worker
            .dispatch(&SaleEvent::OrderStatusChanged {
                sale_id: "S1".into(),
                customer_id: "C1".into(),
                from: OrderStatus::Dispatched,
                to: OrderStatus::Delivered,
            })
            .await;
        worker
            .dispatch(&SaleEvent::Placed { sale_id: "S2".into(), customer_id: "C1".into(), sale_mode: SaleMode::Online })
            .await;
        assert_eq!(*sender.sent.lock().await, vec!["accepted:C1".to_string(), "delivered:C1:S1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_notification_is_swallowed() {
        let sender = Arc::new(RecordingSender { fail: true, ..Default::default() });
        let worker = NotificationWorker::new(sender.clone(), None);
        worker.dispatch(&accepted("S1")).await;
        assert_eq!(sender.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_drains_outbox() {
        let sender = Arc::new(RecordingSender::default());
        let (publisher, rx) = EventPublisher::channel();
        let handle = NotificationWorker::new(sender.clone(), None).spawn(rx);
        publisher.publish(accepted("S1"));
        publisher.publish(accepted("S2"));
        drop(publisher);
        handle.await.unwrap();
        assert_eq!(sender.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mail_rendering() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_customer(Customer { id: "C1".into(), username: "asha".into(), name: "Asha".into(), email: "asha@example.com".into() })
            .await;
        let notifier = MailNotifier::new(store, None, "shop@example.com", "http://shop/order/generate-invoice?saleID=");

        let mail = notifier.delivered_message("C1", "S9").await.unwrap();
        assert_eq!(mail.to, "asha@example.com");
        assert_eq!(mail.from, "shop@example.com");
        assert!(mail.body.contains("http://shop/order/generate-invoice?saleID=S9"));

        assert!(notifier.send_accepted("C1").await.is_ok());
        assert!(matches!(notifier.send_accepted("nobody").await, Err(CommerceError::Notification(_))));
    }

    #[test]
    fn test_event_subject() {
        assert_eq!(event_subject(&accepted("S1")), "sales.events.confirmation_changed");
    }
}
