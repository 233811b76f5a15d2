//! Dashboard summaries produced by each domain.
//!
//! `Default` is the documented zero value the aggregation gateway substitutes
//! when a provider fails. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Docking summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DockingSummary {
    /// Total bays
    pub total_bays: u32,
    /// Bays free
    pub available_bays: u32,
    /// Bays holding a ship
    pub occupied_bays: u32,
    /// Bays reserved
    pub reserved_bays: u32,
    /// Ships incoming
    pub incoming_ships: u32,
    /// Ships docked
    pub docked_ships: u32,
}

/// Crew summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrewSummary {
    /// Total crew
    pub total_crew: u32,
    /// On duty
    pub active_crew: u32,
    /// On leave
    pub on_leave: u32,
    /// Off shift
    pub off_duty: u32,
    /// Moving
    pub in_transit: u32,
}

/// Life-support summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifeSupportSummary {
    /// Sections monitored
    pub total_sections: u32,
    /// Sections in nominal state
    pub sections_nominal: u32,
    /// Sections in warning state
    pub sections_warning: u32,
    /// Sections in critical state
    pub sections_critical: u32,
    /// Unacknowledged alerts
    pub active_alerts: u32,
    /// Average O₂ percentage
    pub average_o2_level: f64,
    /// Average temperature in °C
    pub average_temperature: f64,
}

impl Default for LifeSupportSummary {
    fn default() -> Self {
        Self {
            total_sections: 0,
            sections_nominal: 0,
            sections_warning: 0,
            sections_critical: 0,
            active_alerts: 0,
            average_o2_level: 21.0,
            average_temperature: 22.0,
        }
    }
}

/// Power summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PowerSummary {
    /// Σ rated output of eligible sources in kW
    pub total_capacity_kw: f64,
    /// Σ present output of eligible sources in kW
    pub total_output_kw: f64,
    /// Σ allocations in kW
    pub total_allocated_kw: f64,
    /// Output minus allocations in kW
    pub available_kw: f64,
    /// Allocations as a percentage of output
    pub utilization_percent: f64,
    /// Sources online
    pub online_sources: u32,
    /// All sources
    pub total_sources: u32,
}

/// Inventory summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventorySummary {
    /// Items tracked
    pub total_items: u32,
    /// Items below reorder level
    pub low_stock_items: u32,
    /// Resupply requests pending
    pub pending_resupply_requests: u32,
    /// Cargo manifests pending
    pub pending_manifests: u32,
}

/// Facility-wide status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    /// Nothing notable
    Nominal,
    /// Several warnings
    Warning,
    /// At least one critical condition
    Critical,
}

/// Aggregated dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatus {
    /// When the dashboard was assembled
    pub timestamp: DateTime<Utc>,
    /// Derived label
    pub overall_status: OverallStatus,
    /// Docking summary
    pub docking: DockingSummary,
    /// Crew summary
    pub crew: CrewSummary,
    /// Life-support summary
    pub life_support: LifeSupportSummary,
    /// Power summary
    pub power: PowerSummary,
    /// Inventory summary
    pub inventory: InventorySummary,
    /// Providers whose summary was replaced with its zero value
    pub defaulted: Vec<String>,
}

/// Reachability of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    /// Answered
    Up,
    /// Did not answer
    Down,
}

impl From<bool> for ServiceState {
    fn from(reachable: bool) -> Self {
        if reachable { Self::Up } else { Self::Down }
    }
}

/// Per-provider reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    /// Docking service
    pub docking: ServiceState,
    /// Crew service
    pub crew: ServiceState,
    /// Life-support service
    pub life_support: ServiceState,
    /// Power service
    pub power: ServiceState,
    /// Inventory service
    pub inventory: ServiceState,
}

/// Health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// When the probes ran
    pub timestamp: DateTime<Utc>,
    /// Probe results
    pub services: ServiceHealth,
}
