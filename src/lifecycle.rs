//! Order lifecycle
//!
//! Staff move a sale through confirmation (PENDING to ACCEPTED or REJECTED)
//! and fulfilment (PENDING, DISPATCHED, DELIVERED). The prior status is read
//! under a row lock in the same unit as the write, and an event is published
//! only for a real transition after the write has committed.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::aggregates::{ConfirmationStatus, OrderStatus, Sale, Transition};
use crate::domain::events::SaleEvent;
use crate::notify::EventPublisher;
use crate::store::{TransactionalStore, UnitOfWork};
use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusUpdate {
    Applied,
    /// The sale already had the requested status.
    Unchanged,
    NotFound,
    Rejected { from: String, to: String },
    /// Storage failure; the status may or may not have changed.
    Failed,
}

impl StatusUpdate {
    /// Row-count view: 1 when the sale holds the requested status afterwards,
    /// 0 when no sale matched or the move was refused, -1 on failure.
    ///
    /// The 0 is shared by `NotFound` and `Rejected`; callers that must tell an
    /// unknown sale from a refused move match on the variant (serialized as
    /// the `result` tag) instead.
    pub fn rows_updated(&self) -> i64 {
        match self {
            Self::Applied | Self::Unchanged => 1,
            Self::NotFound | Self::Rejected { .. } => 0,
            Self::Failed => -1,
        }
    }
}

/// A requested status change on one of the two state machines.
#[derive(Clone, Copy, Debug)]
enum Requested {
    Confirmation(ConfirmationStatus),
    Fulfilment(OrderStatus),
}

/// Outcome of the in-unit part of an update.
enum Step {
    Missing,
    Same,
    Refused(String, String),
    Written(SaleEvent),
}

async fn apply<U: UnitOfWork>(unit: &mut U, sale: Sale, requested: Requested) -> Result<Step> {
    match requested {
        Requested::Confirmation(to) => {
            let from = sale.order_confirmation_status;
            match from.transition_to(to) {
                Transition::Unchanged => Ok(Step::Same),
                Transition::Rejected => Ok(Step::Refused(from.to_string(), to.to_string())),
                Transition::Allowed => {
                    if unit.set_confirmation_status(&sale.sale_id, to).await? == 0 {
                        return Ok(Step::Missing);
                    }
                    Ok(Step::Written(SaleEvent::ConfirmationChanged {
                        sale_id: sale.sale_id,
                        customer_id: sale.customer_id,
                        from,
                        to,
                    }))
                }
            }
        }
        Requested::Fulfilment(to) => {
            let from = sale.order_status;
            match from.transition_to(to) {
                Transition::Unchanged => Ok(Step::Same),
                Transition::Rejected => Ok(Step::Refused(from.to_string(), to.to_string())),
                Transition::Allowed => {
                    if unit.set_order_status(&sale.sale_id, to).await? == 0 {
                        return Ok(Step::Missing);
                    }
                    Ok(Step::Written(SaleEvent::OrderStatusChanged {
                        sale_id: sale.sale_id,
                        customer_id: sale.customer_id,
                        from,
                        to,
                    }))
                }
            }
        }
    }
}

pub struct OrderLifecycleManager<S> {
    store: Arc<S>,
    events: EventPublisher,
}

impl<S: TransactionalStore> OrderLifecycleManager<S> {
    pub fn new(store: Arc<S>, events: EventPublisher) -> Self { Self { store, events } }

    pub async fn update_confirmation_status(&self, sale_id: &str, status: ConfirmationStatus) -> StatusUpdate {
        self.run(sale_id, Requested::Confirmation(status)).await
    }

    pub async fn update_order_status(&self, sale_id: &str, status: OrderStatus) -> StatusUpdate {
        self.run(sale_id, Requested::Fulfilment(status)).await
    }

    async fn run(&self, sale_id: &str, requested: Requested) -> StatusUpdate {
        let mut unit = match self.store.begin().await {
            Ok(unit) => unit,
            Err(e) => {
                error!(error = %e, sale_id, "failed to open status update transaction");
                return StatusUpdate::Failed;
            }
        };

        let step = match unit.lock_sale(sale_id).await {
            Ok(Some(sale)) => apply(&mut unit, sale, requested).await,
            Ok(None) => Ok(Step::Missing),
            Err(e) => Err(e),
        };

        let step = match step {
            Ok(Step::Written(event)) => match unit.commit().await {
                Ok(()) => Step::Written(event),
                Err(e) => {
                    error!(error = %e, sale_id, "status update commit failed");
                    return StatusUpdate::Failed;
                }
            },
            Ok(other) => {
                if let Err(e) = unit.rollback().await {
                    warn!(error = %e, sale_id, "status update rollback failed");
                }
                other
            }
            Err(e) => {
                error!(error = %e, sale_id, ?requested, "status update failed");
                if let Err(e) = unit.rollback().await {
                    warn!(error = %e, sale_id, "status update rollback failed");
                }
                return StatusUpdate::Failed;
            }
        };

        match step {
            Step::Written(event) => {
                info!(sale_id, kind = event.kind(), "sale status changed");
                self.events.publish(event);
                StatusUpdate::Applied
            }
            Step::Same => StatusUpdate::Unchanged,
            Step::Missing => StatusUpdate::NotFound,
            Step::Refused(from, to) => {
                warn!(sale_id, from = %from, to = %to, "status change refused");
                StatusUpdate::Rejected { from, to }
            }
        }
    }
}
