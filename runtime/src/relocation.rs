//! Capacity-guarded section occupancy.
//!
//! Every occupancy change locks the section row before reading it and holds
//! the lock through commit, so `0 <= current_occupancy <= max_capacity`
//! holds under concurrency. Lock order is the crew member first, then
//! sections in ascending id.
//!
//! Notifications to the capacity consumer follow an asymmetric policy:
//!
//! | Change | On failure |
//! |--------|------------|
//! | decrease | log and continue |
//! | increase | restore every touched row, then fault |
//!
//! The same guard serves two roles. Over the crew tables it relocates crew
//! members and registers arrivals, notifying life support. Over the
//! life-support tables it is itself the capacity consumer, provisioning
//! power for every added occupant.

use futures::future::BoxFuture;
use nexus_core::collaborators::{
    CapacityConsumer, CrewCollaborator, PowerCollaborator, PowerRequest, SummaryProvider,
};
use nexus_core::ids::{CrewMemberId, SectionId, ShipId};
use nexus_core::model::{CrewMember, CrewStatus, NewCrewMember, Section};
use nexus_core::store::{SectionStore, SectionTx};
use nexus_core::summary::CrewSummary;
use nexus_core::{CollaboratorError, FacilityError, Outcome, Rejection, Result};
use serde::Serialize;
use std::sync::Arc;

/// Power consumer name of a life-support section.
#[must_use]
pub fn section_system(section: SectionId) -> String {
    format!("life_support_section_{section}")
}

/// Guard configuration.
///
/// # Default Values
///
/// - `power_per_occupant_kw`: 5.0
/// - `power_priority`: 1
/// - `min_delta`: -100
#[derive(Debug, Clone, Copy)]
pub struct CapacityGuardConfig {
    /// Power provisioned per added occupant
    pub power_per_occupant_kw: f64,
    /// Priority of occupant power
    pub power_priority: i32,
    /// Smallest accepted occupancy change
    pub min_delta: i32,
}

impl Default for CapacityGuardConfig {
    fn default() -> Self {
        Self {
            power_per_occupant_kw: 5.0,
            power_priority: 1,
            min_delta: -100,
        }
    }
}

impl CapacityGuardConfig {
    /// Set the power provisioned per occupant.
    #[must_use]
    pub const fn power_per_occupant_kw(mut self, kw: f64) -> Self {
        self.power_per_occupant_kw = kw;
        self
    }
}

/// Result of a relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relocation {
    /// Crew member moved
    pub crew_member_id: CrewMemberId,
    /// Section left, if any
    pub from_section: Option<SectionId>,
    /// Section joined
    pub to_section: SectionId,
    /// Occupancy of the joined section afterwards
    pub occupancy: i32,
}

/// Capacity guard over a [`SectionStore`].
#[derive(Clone)]
pub struct CapacityGuard {
    store: Arc<dyn SectionStore>,
    consumer: Option<Arc<dyn CapacityConsumer>>,
    power: Option<Arc<dyn PowerCollaborator>>,
    config: CapacityGuardConfig,
}

impl CapacityGuard {
    /// Create a guard with no collaborators attached.
    #[must_use]
    pub fn new(store: Arc<dyn SectionStore>, config: CapacityGuardConfig) -> Self {
        Self {
            store,
            consumer: None,
            power: None,
            config,
        }
    }

    /// Notify `consumer` of every occupancy change made by relocation and
    /// arrival registration.
    #[must_use]
    pub fn with_consumer(mut self, consumer: Arc<dyn CapacityConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Provision power through `power` when capacity is adjusted upwards.
    #[must_use]
    pub fn with_power(mut self, power: Arc<dyn PowerCollaborator>) -> Self {
        self.power = Some(power);
        self
    }

    /// Move a crew member into `target_id`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown crew member or
    /// section, [`FacilityError::DownstreamUnavailable`] when the increase
    /// notification fails (after every touched row was restored), or a store
    /// fault.
    #[tracing::instrument(skip(self), fields(crew_member_id = %member_id, section_id = %target_id))]
    pub async fn relocate(
        &self,
        member_id: CrewMemberId,
        target_id: SectionId,
    ) -> Result<Outcome<Relocation>> {
        let mut tx = self.store.begin().await?;

        let Some(mut member) = tx.crew_member_for_update(member_id).await? else {
            tx.rollback().await?;
            return Err(FacilityError::not_found("crew member", member_id));
        };
        let member_before = member.clone();
        let source_id = member.section_id;

        if source_id == Some(target_id) {
            tx.rollback().await?;
            return Ok(Outcome::Rejected(Rejection::AlreadyInSection {
                section_id: target_id,
            }));
        }

        let (target, source) = lock_sections(tx.as_mut(), target_id, source_id).await?;
        let Some(mut target) = target else {
            tx.rollback().await?;
            return Err(FacilityError::not_found("section", target_id));
        };

        if !target.has_room() {
            tx.rollback().await?;
            tracing::info!(
                occupancy = target.current_occupancy,
                max_capacity = target.max_capacity,
                "Section at capacity"
            );
            return Ok(Outcome::Rejected(Rejection::CapacityExceeded {
                section_id: target_id,
                occupancy: target.current_occupancy,
                max_capacity: target.max_capacity,
            }));
        }
        let target_before = target.clone();
        let source_before = source.clone();

        if let Some(mut source) = source {
            source.current_occupancy = (source.current_occupancy - 1).max(0);
            tx.update_section(source).await?;
            self.notify_decrease(source_before.as_ref().map(|s| s.id), 1).await;
        } else if let Some(missing) = source_id {
            tracing::warn!(source_section = %missing, "Previous section missing, nothing to decrement");
        }

        target.current_occupancy += 1;
        tx.update_section(target.clone()).await?;
        member.section_id = Some(target_id);
        tx.update_crew_member(member).await?;

        if let Some(consumer) = &self.consumer {
            if let Err(e) = consumer.adjust_capacity(target_id, 1).await {
                tracing::error!(error = %e, "Increase not provisioned, restoring sections");
                metrics::counter!("nexus.relocation.compensated").increment(1);

                tx.update_section(target_before).await?;
                if let Some(source) = source_before {
                    tx.update_section(source).await?;
                }
                tx.update_crew_member(member_before).await?;
                tx.commit().await?;
                return Err(e.into());
            }
        }

        tx.commit().await?;

        tracing::info!(
            from_section = ?source_id.map(SectionId::get),
            occupancy = target.current_occupancy,
            "Crew member relocated"
        );

        Ok(Outcome::Completed(Relocation {
            crew_member_id: member_id,
            from_section: source_id,
            to_section: target_id,
            occupancy: target.current_occupancy,
        }))
    }

    /// Change a section's occupancy by `delta`, clamping at zero.
    ///
    /// An increase provisions `delta × power_per_occupant_kw` through the
    /// power collaborator; if that fails the previous occupancy is written
    /// back before the fault is returned.
    ///
    /// # Errors
    ///
    /// Returns [`FacilityError::NotFound`] for an unknown section,
    /// [`FacilityError::DownstreamUnavailable`] when power cannot be
    /// provisioned, or a store fault.
    #[tracing::instrument(skip(self), fields(section_id = %section_id))]
    pub async fn adjust_capacity(&self, section_id: SectionId, delta: i32) -> Result<Outcome<Section>> {
        if delta < self.config.min_delta {
            return Ok(Outcome::Rejected(Rejection::InvalidInput(format!(
                "occupancy change must be at least {}, got {delta}",
                self.config.min_delta
            ))));
        }

        let mut tx = self.store.begin().await?;
        let Some(mut section) = tx.section_for_update(section_id).await? else {
            tx.rollback().await?;
            return Err(FacilityError::not_found("section", section_id));
        };

        let before = section.current_occupancy;
        let after = before.saturating_add(delta).max(0);
        if after > section.max_capacity {
            tx.rollback().await?;
            return Ok(Outcome::Rejected(Rejection::CapacityExceeded {
                section_id,
                occupancy: after,
                max_capacity: section.max_capacity,
            }));
        }

        section.current_occupancy = after;
        tx.update_section(section.clone()).await?;

        if delta > 0 {
            if let Some(power) = &self.power {
                let request = PowerRequest {
                    system: section_system(section_id),
                    amount_kw: f64::from(delta) * self.config.power_per_occupant_kw,
                    section_id: Some(section_id),
                    priority: self.config.power_priority,
                };
                if let Err(e) = power.allocate(request).await {
                    tracing::error!(error = %e, before, "Power not provisioned, restoring occupancy");
                    metrics::counter!("nexus.relocation.compensated").increment(1);

                    section.current_occupancy = before;
                    tx.update_section(section).await?;
                    tx.commit().await?;
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        tracing::info!(delta, occupancy = after, "Capacity adjusted");
        Ok(Outcome::Completed(section))
    }

    /// Register `crew_count` crew arriving on `ship_id` in the first section
    /// with room for all of them.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    #[tracing::instrument(skip(self), fields(ship_id = %ship_id))]
    pub async fn register_arrival(
        &self,
        ship_id: ShipId,
        crew_count: i32,
    ) -> Result<Outcome<Vec<CrewMember>>> {
        if crew_count <= 0 {
            return Ok(Outcome::Rejected(Rejection::InvalidInput(format!(
                "crew count must be positive, got {crew_count}"
            ))));
        }

        let mut tx = self.store.begin().await?;
        let Some(mut section) = tx.section_with_room_for_update(crew_count).await? else {
            tx.rollback().await?;
            return Ok(Outcome::Rejected(Rejection::NoSectionAvailable {
                needed: crew_count,
            }));
        };

        let mut members = Vec::new();
        for i in 1..=crew_count {
            let member = tx
                .insert_crew_member(NewCrewMember {
                    name: format!("Crew-Ship{ship_id}-{i}"),
                    rank: "Ensign".to_string(),
                    role: "General Duty".to_string(),
                    section_id: Some(section.id),
                    status: CrewStatus::InTransit,
                })
                .await?;
            members.push(member);
        }

        section.current_occupancy += crew_count;
        let section_id = section.id;
        tx.update_section(section).await?;

        if let Some(consumer) = &self.consumer {
            if let Err(e) = consumer.adjust_capacity(section_id, crew_count).await {
                tracing::warn!(section_id = %section_id, error = %e, "Life support not notified of arrival");
            }
        }

        tx.commit().await?;
        tracing::info!(section_id = %section_id, crew_count, "Crew arrival registered");
        Ok(Outcome::Completed(members))
    }

    /// All sections.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn sections(&self) -> Result<Vec<Section>> {
        Ok(self.store.sections().await?)
    }

    /// All crew members.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn crew_members(&self) -> Result<Vec<CrewMember>> {
        Ok(self.store.crew_members().await?)
    }

    /// Crew counts by duty state.
    ///
    /// # Errors
    ///
    /// Returns a store fault.
    pub async fn crew_summary(&self) -> Result<CrewSummary> {
        let crew = self.store.crew_members().await?;
        let with = |status| count(crew.iter().filter(|m| m.status == status).count());
        Ok(CrewSummary {
            total_crew: count(crew.len()),
            active_crew: with(CrewStatus::Active),
            on_leave: with(CrewStatus::OnLeave),
            off_duty: with(CrewStatus::OffDuty),
            in_transit: with(CrewStatus::InTransit),
        })
    }

    async fn notify_decrease(&self, section: Option<SectionId>, by: i32) {
        let (Some(consumer), Some(section)) = (&self.consumer, section) else {
            return;
        };
        if let Err(e) = consumer.adjust_capacity(section, -by).await {
            tracing::warn!(source_section = %section, error = %e, "Decrease not delivered, continuing");
        }
    }
}

/// Lock `target` and `source` in ascending id order.
async fn lock_sections(
    tx: &mut dyn SectionTx,
    target: SectionId,
    source: Option<SectionId>,
) -> Result<(Option<Section>, Option<Section>)> {
    let mut ids: Vec<SectionId> = std::iter::once(target).chain(source).collect();
    ids.sort_unstable();

    let mut target_row = None;
    let mut source_row = None;
    for id in ids {
        let row = tx.section_for_update(id).await?;
        if id == target {
            target_row = row;
        } else {
            source_row = row;
        }
    }
    Ok((target_row, source_row))
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ═══════════════════════════════════════════════════════════════════════════
// In-process collaborator adapters
// ═══════════════════════════════════════════════════════════════════════════

impl CapacityConsumer for CapacityGuard {
    fn adjust_capacity(
        &self,
        section_id: SectionId,
        delta: i32,
    ) -> BoxFuture<'_, std::result::Result<(), CollaboratorError>> {
        Box::pin(async move {
            match CapacityGuard::adjust_capacity(self, section_id, delta).await {
                Ok(Outcome::Completed(_)) => Ok(()),
                Ok(Outcome::Rejected(rejection)) => Err(CollaboratorError::Rejected {
                    collaborator: "life-support".to_string(),
                    message: rejection.to_string(),
                }),
                Err(e) => Err(CollaboratorError::Unreachable {
                    collaborator: "life-support".to_string(),
                    message: e.to_string(),
                }),
            }
        })
    }
}

impl CrewCollaborator for CapacityGuard {
    fn register_arrival<'a>(
        &'a self,
        ship_id: ShipId,
        _ship_name: &'a str,
        crew_count: i32,
    ) -> BoxFuture<'a, std::result::Result<(), CollaboratorError>> {
        Box::pin(async move {
            match CapacityGuard::register_arrival(self, ship_id, crew_count).await {
                Ok(Outcome::Completed(_)) => Ok(()),
                Ok(Outcome::Rejected(rejection)) => Err(CollaboratorError::Rejected {
                    collaborator: "crew".to_string(),
                    message: rejection.to_string(),
                }),
                Err(e) => Err(CollaboratorError::Unreachable {
                    collaborator: "crew".to_string(),
                    message: e.to_string(),
                }),
            }
        })
    }

    fn register_departure<'a>(
        &'a self,
        ship_name: &'a str,
    ) -> BoxFuture<'a, std::result::Result<(), CollaboratorError>> {
        Box::pin(async move {
            // Departing crew keep their records until reassigned.
            tracing::info!(ship_name, "Crew departure noted");
            Ok(())
        })
    }
}

impl SummaryProvider<CrewSummary> for CapacityGuard {
    fn name(&self) -> &str {
        "crew"
    }

    fn summary(&self) -> BoxFuture<'_, std::result::Result<CrewSummary, CollaboratorError>> {
        Box::pin(async move {
            self.crew_summary()
                .await
                .map_err(|e| CollaboratorError::Unreachable {
                    collaborator: "crew".to_string(),
                    message: e.to_string(),
                })
        })
    }

    fn ping(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.store.sections().await.is_ok() })
    }
}
