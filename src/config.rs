//! Service configuration from environment variables.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Static seller identity printed on invoices.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CompanyProfile {
    pub name: String,
    pub address: String,
    pub email: String,
    pub phone: String,
}

impl Default for CompanyProfile {
    fn default() -> Self {
        Self {
            name: "Analytical Equipment Solutions".into(),
            address: " Jamil Nagar, Bhandup (W), Mumbai - 400078".into(),
            email: "official@analyticalequipmentsolutions.com".into(),
            phone: "8268393857".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Prefix for stored product image paths.
    pub asset_base_url: String,
    /// Prefix for the invoice link in delivery mails; the sale id is appended.
    pub invoice_base_url: String,
    pub mail_from: String,
    pub page_reach_flush_interval: Duration,
    pub company: CompanyProfile,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let company = CompanyProfile::default();

        let asset_base_url = get("ASSET_BASE_URL").unwrap_or_else(|| "http://localhost:3000/".into());
        let invoice_base_url =
            get("INVOICE_BASE_URL").unwrap_or_else(|| join_url(&asset_base_url, "order/generate-invoice?saleID="));

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or(&get, "PORT", 8083)?,
            nats_url: get("NATS_URL"),
            invoice_base_url,
            asset_base_url,
            mail_from: get("MAIL_FROM").unwrap_or_else(|| company.email.clone()),
            page_reach_flush_interval: Duration::from_secs(parse_or(&get, "PAGE_REACH_FLUSH_SECS", 60u64)?.max(1)),
            company: CompanyProfile {
                name: get("COMPANY_NAME").unwrap_or(company.name),
                address: get("COMPANY_ADDRESS").unwrap_or(company.address),
                email: get("COMPANY_EMAIL").unwrap_or(company.email),
                phone: get("COMPANY_PHONE").unwrap_or(company.phone),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Joins a base URL and a relative path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
