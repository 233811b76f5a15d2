//! Facility domain model.
//!
//! Rows are plain values keyed by the types in [`crate::ids`]. Status enums
//! carry their persisted representation (`as_str` / `parse`) so every store
//! adapter writes the same strings.

use crate::error::StoreError;
use crate::ids::{BayId, CrewMemberId, PoolId, SectionId, ShipId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! persisted_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Persisted string representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parse the persisted string representation.
            ///
            /// # Errors
            ///
            /// Returns [`StoreError::Serialization`] for unknown values.
            pub fn parse(s: &str) -> Result<Self, StoreError> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(StoreError::Serialization(format!(
                        concat!("Invalid ", stringify!($name), ": {}"),
                        s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

persisted_enum! {
    /// Occupancy state of a docking bay.
    BayStatus {
        /// Free for the next ship
        Available => "AVAILABLE",
        /// Holds exactly one ship
        Occupied => "OCCUPIED",
        /// Held back by operators
        Reserved => "RESERVED",
        /// Out of service
        Maintenance => "MAINTENANCE",
    }
}

persisted_enum! {
    /// Lifecycle state of a ship.
    ///
    /// `INCOMING → DOCKED → DEPARTING → (return timer) → INCOMING`
    ShipStatus {
        /// Approaching, may dock
        Incoming => "INCOMING",
        /// Occupies a bay
        Docked => "DOCKED",
        /// Left its bay, waiting for the return timer
        Departing => "DEPARTING",
        /// Travelling elsewhere
        InTransit => "IN_TRANSIT",
    }
}

persisted_enum! {
    /// Kind of vessel.
    ShipType {
        /// Freighter
        Cargo => "CARGO",
        /// Passenger liner
        Passenger => "PASSENGER",
        /// Military vessel
        Military => "MILITARY",
        /// Research vessel
        Research => "RESEARCH",
        /// Supply runner
        Supply => "SUPPLY",
    }
}

persisted_enum! {
    /// Audit action recorded for docking operations.
    DockingAction {
        /// Ship docked at a bay
        Dock => "DOCK",
        /// Ship left its bay
        Undock => "UNDOCK",
        /// Arrival scheduled (delivery or return)
        ArrivalScheduled => "ARRIVAL_SCHEDULED",
        /// Departure scheduled
        DepartureScheduled => "DEPARTURE_SCHEDULED",
    }
}

persisted_enum! {
    /// Kind of power source.
    SourceType {
        /// Photovoltaic array
        SolarArray => "SOLAR_ARRAY",
        /// Fusion reactor
        FusionReactor => "FUSION_REACTOR",
        /// Battery storage
        BatteryBank => "BATTERY_BANK",
        /// Fuel cell
        FuelCell => "FUEL_CELL",
    }
}

persisted_enum! {
    /// Operating state of a power source. Only `ONLINE` sources count
    /// towards pool capacity.
    SourceStatus {
        /// Producing and eligible
        Online => "ONLINE",
        /// Switched off
        Offline => "OFFLINE",
        /// Warm spare
        Standby => "STANDBY",
        /// Under maintenance
        Maintenance => "MAINTENANCE",
        /// Producing below rated output
        Degraded => "DEGRADED",
    }
}

persisted_enum! {
    /// Audit action recorded by the capacity ledger.
    PowerAction {
        /// Amount added to a consumer's allocation
        Allocate => "ALLOCATE",
        /// Consumer's allocation removed
        Deallocate => "DEALLOCATE",
    }
}

persisted_enum! {
    /// Duty state of a crew member.
    CrewStatus {
        /// On duty
        Active => "ACTIVE",
        /// On leave
        OnLeave => "ON_LEAVE",
        /// Off shift
        OffDuty => "OFF_DUTY",
        /// Moving between sections or ships
        InTransit => "IN_TRANSIT",
    }
}

/// A docking bay.
///
/// `occupant` is set if and only if `status` is [`BayStatus::Occupied`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bay {
    /// Bay id
    pub id: BayId,
    /// Bay number, the deterministic order for bay selection
    pub bay_number: i32,
    /// Current status
    pub status: BayStatus,
    /// Ship currently in the bay
    pub occupant: Option<ShipId>,
    /// Largest ship class the bay takes
    pub capacity: i32,
}

impl Bay {
    /// Whether the occupant/status invariant holds for this row.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(
            (self.status, self.occupant),
            (BayStatus::Occupied, Some(_))
                | (
                    BayStatus::Available | BayStatus::Reserved | BayStatus::Maintenance,
                    None
                )
        )
    }

    /// Put `ship` into this bay.
    pub const fn occupy(&mut self, ship: ShipId) {
        self.status = BayStatus::Occupied;
        self.occupant = Some(ship);
    }

    /// Clear the bay.
    pub const fn release(&mut self) {
        self.status = BayStatus::Available;
        self.occupant = None;
    }
}

/// A ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    /// Ship id
    pub id: ShipId,
    /// Ship name
    pub name: String,
    /// Vessel kind
    pub ship_type: ShipType,
    /// Lifecycle state
    pub status: ShipStatus,
    /// People aboard
    pub crew_count: i32,
    /// Cargo capacity in tonnes
    pub cargo_capacity: i32,
    /// Arrival time (ETA while incoming, actual once docked)
    pub arrival_time: Option<DateTime<Utc>>,
    /// Departure time
    pub departure_time: Option<DateTime<Utc>>,
}

/// Values for a ship that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShip {
    /// Ship name
    pub name: String,
    /// Vessel kind
    pub ship_type: ShipType,
    /// Initial status
    pub status: ShipStatus,
    /// People aboard
    pub crew_count: i32,
    /// Cargo capacity in tonnes
    pub cargo_capacity: i32,
    /// Expected arrival
    pub arrival_time: Option<DateTime<Utc>>,
}

/// Audit record of a docking operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingLog {
    /// Log id
    pub id: i64,
    /// Ship concerned
    pub ship_id: ShipId,
    /// Bay concerned, if any
    pub bay_id: Option<BayId>,
    /// What happened
    pub action: DockingAction,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Free-form details
    pub details: String,
}

/// Audit record to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDockingLog {
    /// Ship concerned
    pub ship_id: ShipId,
    /// Bay concerned, if any
    pub bay_id: Option<BayId>,
    /// What happened
    pub action: DockingAction,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Free-form details
    pub details: String,
}

/// A habitat section with bounded occupancy.
///
/// `0 <= current_occupancy <= max_capacity` holds for every committed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section id
    pub id: SectionId,
    /// Section name
    pub name: String,
    /// Deck number
    pub deck: i32,
    /// Upper bound on occupancy
    pub max_capacity: i32,
    /// People currently assigned
    pub current_occupancy: i32,
}

impl Section {
    /// Whether one more occupant fits.
    #[must_use]
    pub const fn has_room(&self) -> bool {
        self.current_occupancy < self.max_capacity
    }
}

/// A crew member, the occupant moved by relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewMember {
    /// Crew member id
    pub id: CrewMemberId,
    /// Full name
    pub name: String,
    /// Rank
    pub rank: String,
    /// Role aboard
    pub role: String,
    /// Section the crew member is assigned to
    pub section_id: Option<SectionId>,
    /// Duty state
    pub status: CrewStatus,
}

/// Values for a crew member that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCrewMember {
    /// Full name
    pub name: String,
    /// Rank
    pub rank: String,
    /// Role aboard
    pub role: String,
    /// Section assigned on arrival
    pub section_id: Option<SectionId>,
    /// Initial duty state
    pub status: CrewStatus,
}

/// A resource pool (power grid). Capacity is derived from its sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Pool id
    pub id: PoolId,
    /// Display name
    pub name: String,
}

/// A power source feeding a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSource {
    /// Source id
    pub id: i64,
    /// Owning pool
    pub pool_id: PoolId,
    /// Display name
    pub name: String,
    /// Kind of source
    pub source_type: SourceType,
    /// Operating state
    pub status: SourceStatus,
    /// Rated output in kW
    pub max_output_kw: f64,
    /// Present output in kW
    pub current_output_kw: f64,
}

impl PowerSource {
    /// Whether the source counts towards pool capacity.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self.status, SourceStatus::Online)
    }
}

/// Power held by one consumer in one pool. Unique per `(pool_id, system)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Pool the power comes from
    pub pool_id: PoolId,
    /// Consumer system name, e.g. `docking_bay_3`
    pub system: String,
    /// Amount held in kW
    pub amount_kw: f64,
    /// Priority, 1 is most important
    pub priority: i32,
    /// Section the consumer serves, if any
    pub section_id: Option<SectionId>,
    /// Last time the allocation grew
    pub allocated_at: DateTime<Utc>,
}

/// Audit record of a ledger mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerLog {
    /// Pool concerned
    pub pool_id: PoolId,
    /// Consumer system name
    pub system: String,
    /// What happened
    pub action: PowerAction,
    /// Amount moved in kW
    pub amount_kw: f64,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}
