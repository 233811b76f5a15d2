//! Dashboard aggregation over independent summary providers.
//!
//! Every provider is called concurrently and in isolation. A provider that
//! fails or exceeds its timeout contributes its zero-value summary and is
//! listed in [`DashboardStatus::defaulted`]; the other providers are never
//! affected and the gateway itself never fails.

use nexus_core::collaborators::SummaryProvider;
use nexus_core::environment::Clock;
use nexus_core::summary::{
    CrewSummary, DashboardStatus, DockingSummary, HealthReport, InventorySummary,
    LifeSupportSummary, OverallStatus, PowerSummary, ServiceHealth,
};
use std::sync::Arc;
use std::time::Duration;

/// Utilization above which power is critical.
pub const POWER_CRITICAL_PERCENT: f64 = 90.0;

/// Utilization above which power is a warning.
pub const POWER_WARNING_PERCENT: f64 = 75.0;

/// Low-stock items tolerated before inventory is a warning.
pub const LOW_STOCK_WARNING_THRESHOLD: u32 = 3;

/// Warnings tolerated before the facility is a warning.
pub const WARNING_THRESHOLD: u32 = 2;

/// Gateway configuration.
///
/// # Default Values
///
/// - `provider_timeout`: 5 seconds
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Upper bound on each provider call
    pub provider_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    /// Set the per-provider timeout.
    #[must_use]
    pub const fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}

/// One provider per domain.
#[derive(Clone)]
pub struct SummaryProviders {
    /// Docking provider
    pub docking: Arc<dyn SummaryProvider<DockingSummary>>,
    /// Crew provider
    pub crew: Arc<dyn SummaryProvider<CrewSummary>>,
    /// Life-support provider
    pub life_support: Arc<dyn SummaryProvider<LifeSupportSummary>>,
    /// Power provider
    pub power: Arc<dyn SummaryProvider<PowerSummary>>,
    /// Inventory provider
    pub inventory: Arc<dyn SummaryProvider<InventorySummary>>,
}

/// Aggregation gateway.
#[derive(Clone)]
pub struct AggregationGateway {
    providers: SummaryProviders,
    clock: Arc<dyn Clock>,
    config: GatewayConfig,
}

impl AggregationGateway {
    /// Create a gateway.
    #[must_use]
    pub fn new(providers: SummaryProviders, clock: Arc<dyn Clock>, config: GatewayConfig) -> Self {
        Self {
            providers,
            clock,
            config,
        }
    }

    /// Collect every summary and derive the facility status.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self) -> DashboardStatus {
        let p = &self.providers;
        let (docking, crew, life_support, power, inventory) = tokio::join!(
            self.fetch(p.docking.as_ref()),
            self.fetch(p.crew.as_ref()),
            self.fetch(p.life_support.as_ref()),
            self.fetch(p.power.as_ref()),
            self.fetch(p.inventory.as_ref()),
        );

        let defaulted: Vec<String> = [
            docking.1, crew.1, life_support.1, power.1, inventory.1,
        ]
        .into_iter()
        .flatten()
        .collect();

        let overall_status =
            overall_status(&docking.0, &life_support.0, &power.0, &inventory.0);

        tracing::info!(
            overall_status = ?overall_status,
            defaulted = defaulted.len(),
            "Dashboard assembled"
        );

        DashboardStatus {
            timestamp: self.clock.now(),
            overall_status,
            docking: docking.0,
            crew: crew.0,
            life_support: life_support.0,
            power: power.0,
            inventory: inventory.0,
            defaulted,
        }
    }

    /// Probe every provider.
    #[tracing::instrument(skip(self))]
    pub async fn health(&self) -> HealthReport {
        let p = &self.providers;
        let (docking, crew, life_support, power, inventory) = tokio::join!(
            self.probe(p.docking.as_ref()),
            self.probe(p.crew.as_ref()),
            self.probe(p.life_support.as_ref()),
            self.probe(p.power.as_ref()),
            self.probe(p.inventory.as_ref()),
        );

        HealthReport {
            timestamp: self.clock.now(),
            services: ServiceHealth {
                docking: docking.into(),
                crew: crew.into(),
                life_support: life_support.into(),
                power: power.into(),
                inventory: inventory.into(),
            },
        }
    }

    /// Summary of one provider, or its default plus the provider name.
    async fn fetch<T: Default>(&self, provider: &dyn SummaryProvider<T>) -> (T, Option<String>) {
        let name = provider.name();
        match tokio::time::timeout(self.config.provider_timeout, provider.summary()).await {
            Ok(Ok(summary)) => (summary, None),
            Ok(Err(e)) => {
                tracing::warn!(provider = name, error = %e, "Provider failed, using default summary");
                metrics::counter!("nexus.gateway.provider_defaulted", "provider" => name.to_string())
                    .increment(1);
                (T::default(), Some(name.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    provider = name,
                    timeout_ms = u64::try_from(self.config.provider_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Provider timed out, using default summary"
                );
                metrics::counter!("nexus.gateway.provider_defaulted", "provider" => name.to_string())
                    .increment(1);
                (T::default(), Some(name.to_string()))
            }
        }
    }

    async fn probe<T>(&self, provider: &dyn SummaryProvider<T>) -> bool {
        let up = tokio::time::timeout(self.config.provider_timeout, provider.ping())
            .await
            .unwrap_or(false);
        if !up {
            tracing::debug!(provider = provider.name(), "Provider unreachable");
        }
        up
    }
}

/// Derive the facility status label from domain summaries.
#[must_use]
pub fn overall_status(
    docking: &DockingSummary,
    life_support: &LifeSupportSummary,
    power: &PowerSummary,
    inventory: &InventorySummary,
) -> OverallStatus {
    let mut critical = life_support.sections_critical;
    let mut warning = life_support.sections_warning;

    if life_support.active_alerts > 0 {
        warning = warning.saturating_add(1);
    }

    if power.utilization_percent > POWER_CRITICAL_PERCENT {
        critical = critical.saturating_add(1);
    } else if power.utilization_percent > POWER_WARNING_PERCENT {
        warning = warning.saturating_add(1);
    }

    if inventory.low_stock_items > LOW_STOCK_WARNING_THRESHOLD {
        warning = warning.saturating_add(1);
    }

    if docking.available_bays == 0 && docking.incoming_ships > 0 {
        warning = warning.saturating_add(1);
    }

    if critical > 0 {
        OverallStatus::Critical
    } else if warning > WARNING_THRESHOLD {
        OverallStatus::Warning
    } else {
        OverallStatus::Nominal
    }
}
