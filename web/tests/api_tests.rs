//! End-to-end tests of the HTTP surface over in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use nexus_core::CollaboratorError;
use nexus_core::model::{BayStatus, ShipStatus};
use nexus_core::summary::{
    CrewSummary, DashboardStatus, HealthReport, InventorySummary, LifeSupportSummary,
    ServiceState,
};
use nexus_runtime::{
    AggregationGateway, CapacityGuard, CapacityGuardConfig, CapacityLedger, DockingConfig,
    DockingEnvironment, DockingOrchestrator, GatewayConfig, LedgerConfig, SummaryProviders,
    TransitionTrigger, TriggerConfig,
};
use nexus_testing::collaborators::{RecordingPower, StubSummaryProvider};
use nexus_testing::{InMemoryKeyValueStore, InMemoryStore, fixtures, test_clock};
use nexus_web::bootstrap::{self, Backends};
use nexus_web::clients::http_client;
use nexus_web::{AppState, Config, TRACE_ID_HEADER, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct Station {
    facility: InMemoryStore,
    life_support_power: RecordingPower,
    server: TestServer,
}

/// One bay, two ships, a 500 kW grid and two small sections.
fn station() -> Station {
    nexus_testing::init_test_tracing();
    let facility = InMemoryStore::new();
    facility.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
    facility.insert_ship(fixtures::ship(10, "Rocinante", ShipStatus::Incoming, 4));
    facility.insert_ship(fixtures::ship(11, "Canterbury", ShipStatus::Incoming, 0));
    facility.insert_pool(fixtures::pool("main"));
    facility.insert_source(fixtures::online_source(1, "main", 1000.0, 500.0));

    let crew_book = InMemoryStore::new();
    crew_book.insert_section(fixtures::section(1, 20, 1));
    crew_book.insert_section(fixtures::section(2, 2, 2));
    crew_book.insert_crew_member(fixtures::crew_member(5, Some(1)));

    let life_book = InMemoryStore::new();
    life_book.insert_section(fixtures::section(1, 20, 1));
    life_book.insert_section(fixtures::section(2, 2, 2));

    let kv = Arc::new(InMemoryKeyValueStore::new());
    let clock = Arc::new(test_clock());
    let life_support_power = RecordingPower::new();

    let ledger = Arc::new(CapacityLedger::new(
        Arc::new(facility.clone()),
        kv.clone(),
        clock.clone(),
        LedgerConfig::default(),
    ));
    let life_support = Arc::new(
        CapacityGuard::new(Arc::new(life_book), CapacityGuardConfig::default())
            .with_power(Arc::new(life_support_power.clone())),
    );
    let crew = Arc::new(
        CapacityGuard::new(Arc::new(crew_book), CapacityGuardConfig::default())
            .with_consumer(life_support.clone()),
    );
    let trigger = Arc::new(TransitionTrigger::new(
        kv.clone(),
        Arc::new(facility.clone()),
        clock.clone(),
        TriggerConfig::default(),
    ));
    let docking = Arc::new(DockingOrchestrator::new(
        DockingEnvironment {
            store: Arc::new(facility.clone()),
            power: ledger.clone(),
            crew: crew.clone(),
            trigger,
            cache: kv,
            clock: clock.clone(),
        },
        DockingConfig::default(),
    ));
    let gateway = Arc::new(AggregationGateway::new(
        SummaryProviders {
            docking: docking.clone(),
            crew: crew.clone(),
            life_support: Arc::new(StubSummaryProvider::<LifeSupportSummary>::failing(
                "life-support",
            )),
            power: ledger.clone(),
            inventory: Arc::new(StubSummaryProvider::answering(
                "inventory",
                InventorySummary {
                    total_items: 40,
                    low_stock_items: 3,
                    ..InventorySummary::default()
                },
            )),
        },
        clock,
        GatewayConfig::default(),
    ));

    let state = AppState {
        docking,
        ledger,
        crew,
        life_support,
        gateway,
    };
    Station {
        facility,
        life_support_power,
        server: TestServer::new(build_router(state)).unwrap(),
    }
}

#[tokio::test]
async fn health_endpoint_answers() {
    let station = station();
    let response = station.server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn docking_a_ship_takes_a_bay_and_power() {
    let station = station();

    let response = station.server.post("/api/docking/dock/10").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "shipId": 10, "bayId": 1, "allocatedKw": 50.0 }));

    let grid: Value = station.server.get("/api/power/grid").await.json();
    assert_eq!(grid["totalAllocatedKw"], json!(50.0));

    let crew: CrewSummary = station.server.get("/api/crew/summary").await.json();
    assert_eq!(crew.total_crew, 5);
    assert_eq!(crew.in_transit, 4);

    let ship = station.facility.ship_row(nexus_core::ShipId::new(10)).unwrap();
    assert_eq!(ship.status, ShipStatus::Docked);
}

#[tokio::test]
async fn docking_with_no_free_bay_is_a_conflict() {
    let station = station();
    station.server.post("/api/docking/dock/10").await.assert_status_ok();

    let response = station.server.post("/api/docking/dock/11").await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "NO_BAY_AVAILABLE");
}

#[tokio::test]
async fn docking_an_unknown_ship_is_not_found() {
    let station = station();
    let response = station.server.post("/api/docking/dock/99").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "ship 99 not found");
}

#[tokio::test]
async fn responses_carry_a_trace_id() {
    let station = station();

    let generated = station.server.get("/api/docking/bays").await;
    generated.assert_status_ok();
    assert!(generated.headers().get(TRACE_ID_HEADER).is_some());

    let propagated = station
        .server
        .post("/api/docking/dock/99")
        .add_header(
            HeaderName::from_static(TRACE_ID_HEADER),
            HeaderValue::from_static("trace-abc"),
        )
        .await;
    assert_eq!(
        propagated.headers().get(TRACE_ID_HEADER).unwrap(),
        "trace-abc"
    );
}

#[tokio::test]
async fn delivery_with_blank_cargo_is_rejected() {
    let station = station();
    let response = station
        .server
        .post("/api/docking/schedule-delivery")
        .json(&json!({
            "shipName": "Tachi",
            "cargoType": "  ",
            "estimatedArrival": "2026-01-01T00:00:00Z",
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn delivery_creates_an_incoming_ship() {
    let station = station();
    let response = station
        .server
        .post("/api/docking/schedule-delivery")
        .json(&json!({
            "shipName": "Tachi",
            "cargoType": "Water",
            "estimatedArrival": "2026-01-01T00:00:00Z",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let incoming: Vec<Value> = station.server.get("/api/docking/ships/incoming").await.json();
    assert!(incoming.iter().any(|ship| ship["name"] == "Tachi"));
}

#[tokio::test]
async fn power_allocation_within_capacity_is_created() {
    let station = station();
    let response = station
        .server
        .post("/api/power/allocate")
        .json(&json!({ "system": "hydroponics", "amountKw": 200.0, "priority": 3 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["system"], "hydroponics");
    assert_eq!(body["allocatedKw"], json!(200.0));
    assert_eq!(body["priority"], 3);
}

#[tokio::test]
async fn power_allocation_beyond_output_is_a_conflict() {
    let station = station();
    station
        .server
        .post("/api/power/allocate")
        .json(&json!({ "system": "hydroponics", "amountKw": 200.0 }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = station
        .server
        .post("/api/power/allocate")
        .json(&json!({ "system": "shields", "amountKw": 400.0 }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "INSUFFICIENT_CAPACITY");
}

#[tokio::test]
async fn relocation_into_a_full_section_is_a_conflict() {
    let station = station();
    let response = station
        .server
        .post("/api/crew/relocate")
        .json(&json!({ "crewId": 5, "targetSectionId": 2 }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "CAPACITY_EXCEEDED");
}

#[tokio::test]
async fn arrival_registers_crew_in_transit() {
    let station = station();
    let response = station
        .server
        .post("/api/crew/arrival")
        .json(&json!({ "shipId": 10, "crewCount": 3 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let members: Vec<Value> = response.json();
    assert_eq!(members.len(), 3);
    assert!(members.iter().all(|m| m["section_id"] == 1));
}

#[tokio::test]
async fn capacity_increase_without_power_is_unavailable() {
    let station = station();
    station
        .life_support_power
        .fail_allocations(Some(CollaboratorError::Unreachable {
            collaborator: "power".to_string(),
            message: "connection refused".to_string(),
        }));

    let response = station
        .server
        .post("/api/life-support/adjust-capacity")
        .json(&json!({ "sectionId": 1, "occupancyChange": 2 }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["message"], "power service is unavailable");
}

#[tokio::test]
async fn dashboard_defaults_failing_providers() {
    let station = station();

    let response = station.server.get("/api/dashboard/status").await;
    response.assert_status_ok();
    let status: DashboardStatus = response.json();
    assert_eq!(status.defaulted, vec!["life-support".to_string()]);
    assert_eq!(status.life_support, LifeSupportSummary::default());
    assert_eq!(status.inventory.total_items, 40);
    assert_eq!(status.docking.total_bays, 1);

    let health: HealthReport = station.server.get("/api/dashboard/health").await.json();
    assert_eq!(health.services.docking, ServiceState::Up);
    assert_eq!(health.services.life_support, ServiceState::Down);
}

#[tokio::test]
async fn assembled_services_survive_unreachable_remotes() {
    let config = Config::from_lookup(|key| match key {
        "LIFE_SUPPORT_SERVICE_URL" | "INVENTORY_SERVICE_URL" => {
            Some("http://127.0.0.1:1".to_string())
        }
        "GATEWAY_PROVIDER_TIMEOUT_MS" => Some("2000".to_string()),
        _ => None,
    });
    let facility = InMemoryStore::new();
    facility.insert_bay(fixtures::bay(1, 1, BayStatus::Available));
    facility.insert_pool(fixtures::pool("main"));
    facility.insert_source(fixtures::online_source(1, "main", 1000.0, 500.0));

    let services = bootstrap::assemble(
        Backends {
            docking: Arc::new(facility.clone()),
            power: Arc::new(facility),
            crew_sections: Arc::new(InMemoryStore::new()),
            life_support_sections: Arc::new(InMemoryStore::new()),
            kv: Arc::new(InMemoryKeyValueStore::new()),
            clock: Arc::new(test_clock()),
        },
        &config,
        &http_client(Duration::from_secs(1)).unwrap(),
    );
    let server = TestServer::new(build_router(services.state)).unwrap();

    let response = server.get("/api/dashboard/status").await;
    response.assert_status_ok();
    let status: DashboardStatus = response.json();
    assert!(status.defaulted.contains(&"life-support".to_string()));
    assert!(status.defaulted.contains(&"inventory".to_string()));
    assert_eq!(status.docking.available_bays, 1);
    assert_eq!(status.power.total_output_kw, 500.0);

    let health: HealthReport = server.get("/api/dashboard/health").await.json();
    assert_eq!(health.services.power, ServiceState::Up);
    assert_eq!(health.services.inventory, ServiceState::Down);
}
