//! Service wiring.
//!
//! Builds every runtime service from a set of storage backends and the
//! collaborator configuration. Power and crew are wired in-process unless
//! a remote URL is configured; life-support readings and inventory are
//! always fetched from their services.

use crate::clients::{HttpCapacityConsumer, HttpCrewClient, HttpPowerClient, HttpSummaryProvider};
use crate::config::Config;
use crate::state::AppState;
use nexus_core::collaborators::{CapacityConsumer, CrewCollaborator, PowerCollaborator, SummaryProvider};
use nexus_core::environment::Clock;
use nexus_core::kv::KeyValueStore;
use nexus_core::store::{DockingStore, PowerStore, SectionStore};
use nexus_core::summary::{CrewSummary, PowerSummary};
use nexus_runtime::{
    AggregationGateway, CapacityGuard, CapacityGuardConfig, CapacityLedger, DockingEnvironment,
    DockingOrchestrator, SummaryProviders, TransitionTrigger, TriggerConfig,
};
use std::sync::Arc;

/// Path of the life-support environment summary.
pub const LIFE_SUPPORT_SUMMARY_PATH: &str = "/api/life-support/environment/summary";
/// Path of the inventory summary.
pub const INVENTORY_SUMMARY_PATH: &str = "/api/inventory/summary";
/// Path of the crew summary on a remote crew service.
pub const CREW_SUMMARY_PATH: &str = "/api/crew/summary";
/// Path of the grid status on a remote power service.
pub const POWER_SUMMARY_PATH: &str = "/api/power/grid";

/// Storage and time the services run on.
#[derive(Clone)]
pub struct Backends {
    /// Bays, ships and docking audit
    pub docking: Arc<dyn DockingStore>,
    /// Pools, sources, allocations and power audit
    pub power: Arc<dyn PowerStore>,
    /// Crew occupancy book
    pub crew_sections: Arc<dyn SectionStore>,
    /// Life-support occupancy book
    pub life_support_sections: Arc<dyn SectionStore>,
    /// Shared key-value store
    pub kv: Arc<dyn KeyValueStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Everything the binary runs.
pub struct Services {
    /// Handler state
    pub state: AppState,
    /// Return timer handler, to be fed expiry events
    pub trigger: Arc<TransitionTrigger>,
}

/// Wire the services.
#[must_use]
pub fn assemble(backends: Backends, config: &Config, http: &reqwest::Client) -> Services {
    let remote = &config.collaborators;

    let ledger = Arc::new(CapacityLedger::new(
        Arc::clone(&backends.power),
        Arc::clone(&backends.kv),
        Arc::clone(&backends.clock),
        config.ledger.clone(),
    ));
    let power: Arc<dyn PowerCollaborator> = match &remote.power_service_url {
        Some(url) => Arc::new(HttpPowerClient::new(http.clone(), url)),
        None => Arc::clone(&ledger) as Arc<dyn PowerCollaborator>,
    };

    let life_support = Arc::new(
        CapacityGuard::new(
            Arc::clone(&backends.life_support_sections),
            CapacityGuardConfig::default(),
        )
        .with_power(Arc::clone(&power)),
    );
    let consumer: Arc<dyn CapacityConsumer> = if remote.remote_life_support_capacity {
        Arc::new(HttpCapacityConsumer::new(
            http.clone(),
            &remote.life_support_service_url,
        ))
    } else {
        Arc::clone(&life_support) as Arc<dyn CapacityConsumer>
    };
    let crew = Arc::new(
        CapacityGuard::new(
            Arc::clone(&backends.crew_sections),
            CapacityGuardConfig::default(),
        )
        .with_consumer(consumer),
    );
    let crew_collaborator: Arc<dyn CrewCollaborator> = match &remote.crew_service_url {
        Some(url) => Arc::new(HttpCrewClient::new(http.clone(), url)),
        None => Arc::clone(&crew) as Arc<dyn CrewCollaborator>,
    };

    let trigger = Arc::new(TransitionTrigger::new(
        Arc::clone(&backends.kv),
        Arc::clone(&backends.docking),
        Arc::clone(&backends.clock),
        TriggerConfig::default(),
    ));
    let docking = Arc::new(DockingOrchestrator::new(
        DockingEnvironment {
            store: Arc::clone(&backends.docking),
            power,
            crew: crew_collaborator,
            trigger: Arc::clone(&trigger),
            cache: Arc::clone(&backends.kv),
            clock: Arc::clone(&backends.clock),
        },
        config.docking,
    ));

    let crew_summary: Arc<dyn SummaryProvider<CrewSummary>> = match &remote.crew_service_url {
        Some(url) => Arc::new(HttpSummaryProvider::new(http.clone(), "crew", url, CREW_SUMMARY_PATH)),
        None => Arc::clone(&crew) as Arc<dyn SummaryProvider<CrewSummary>>,
    };
    let power_summary: Arc<dyn SummaryProvider<PowerSummary>> = match &remote.power_service_url {
        Some(url) => Arc::new(HttpSummaryProvider::new(http.clone(), "power", url, POWER_SUMMARY_PATH)),
        None => Arc::clone(&ledger) as Arc<dyn SummaryProvider<PowerSummary>>,
    };
    let gateway = Arc::new(AggregationGateway::new(
        SummaryProviders {
            docking: Arc::clone(&docking) as _,
            crew: crew_summary,
            life_support: Arc::new(HttpSummaryProvider::new(
                http.clone(),
                "life-support",
                &remote.life_support_service_url,
                LIFE_SUPPORT_SUMMARY_PATH,
            )),
            power: power_summary,
            inventory: Arc::new(HttpSummaryProvider::new(
                http.clone(),
                "inventory",
                &remote.inventory_service_url,
                INVENTORY_SUMMARY_PATH,
            )),
        },
        Arc::clone(&backends.clock),
        config.gateway,
    ));

    Services {
        state: AppState {
            docking,
            ledger,
            crew,
            life_support,
            gateway,
        },
        trigger,
    }
}
