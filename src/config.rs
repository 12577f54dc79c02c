use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::inventory::RetryPolicy;
use crate::models::RequisitionState;

/// When a requisition's line quantities are credited to the receiving service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockCreditPolicy {
    OnApproval,
    OnCompletion,
}

impl StockCreditPolicy {
    /// Whether entering `state` is the moment line quantities hit stock.
    pub fn credits_on(self, state: RequisitionState) -> bool {
        match self {
            Self::OnApproval => state == RequisitionState::Approved,
            Self::OnCompletion => state == RequisitionState::Complete,
        }
    }
}

impl FromStr for StockCreditPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_approval" | "approval" => Ok(Self::OnApproval),
            "on_completion" | "completion" => Ok(Self::OnCompletion),
            other => anyhow::bail!(
                "unknown stock credit policy '{}' (expected on_approval or on_completion)",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    /// `None` disables the background rebalancer.
    pub rebalance_interval: Option<Duration>,
    pub requisition_window: chrono::Duration,
    pub delivery_lead: chrono::Duration,
    pub stock_credit_policy: StockCreditPolicy,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let interval_secs: u64 = var("REBALANCE_INTERVAL_SECS", "3600")
            .parse()
            .context("REBALANCE_INTERVAL_SECS must be a whole number of seconds")?;
        let window_hours: i64 = var("REQUISITION_WINDOW_HOURS", "24")
            .parse()
            .context("REQUISITION_WINDOW_HOURS must be a number")?;
        let lead_days: i64 = var("DELIVERY_LEAD_DAYS", "7")
            .parse()
            .context("DELIVERY_LEAD_DAYS must be a number")?;
        if window_hours <= 0 {
            anyhow::bail!("REQUISITION_WINDOW_HOURS must be positive");
        }
        if lead_days < 0 {
            anyhow::bail!("DELIVERY_LEAD_DAYS must not be negative");
        }

        let max_attempts: u32 = var("DB_RETRY_ATTEMPTS", "3")
            .parse()
            .context("DB_RETRY_ATTEMPTS must be a number")?;
        let base_delay_ms: u64 = var("DB_RETRY_BASE_MS", "100")
            .parse()
            .context("DB_RETRY_BASE_MS must be a number")?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            host: var("HOST", "127.0.0.1"),
            port: var("PORT", "3000")
                .parse()
                .context("PORT must be a valid number")?,
            max_connections: var("DB_MAX_CONNECTIONS", "10")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a number")?,
            rebalance_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            requisition_window: chrono::Duration::hours(window_hours),
            delivery_lead: chrono::Duration::days(lead_days),
            stock_credit_policy: var("STOCK_CREDIT_POLICY", "on_completion").parse()?,
            retry: RetryPolicy::new(max_attempts.max(1), Duration::from_millis(base_delay_ms)),
        })
    }
}
