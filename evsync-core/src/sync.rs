//! One sync pass between the vault and a calendar.

use tracing::info;

use crate::error::SyncResult;
use crate::event::{Event, EventMap};
use crate::reconcile::reconcile;
use crate::store::EventStore;

/// What one pass would write to each side.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDiff {
    /// Calendar events missing from the vault.
    pub to_vault: Vec<Event>,
    /// Vault events missing from the calendar.
    pub to_calendar: Vec<Event>,
    pub vault_total: usize,
    pub calendar_total: usize,
}

/// Uids written during [`SyncDiff::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub stored_in_vault: Vec<String>,
    pub created_in_calendar: Vec<String>,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.stored_in_vault.len() + self.created_in_calendar.len()
    }
}

impl SyncDiff {
    /// Read both stores fully (vault first) and reconcile them.
    pub async fn from_stores<V, C>(vault: &V, calendar: &C) -> SyncResult<Self>
    where
        V: EventStore,
        C: EventStore,
    {
        let vault_events = vault.list_events().await?;
        let calendar_events = calendar.list_events().await?;

        Ok(Self::from_maps(&vault_events, &calendar_events))
    }

    pub fn from_maps(vault: &EventMap, calendar: &EventMap) -> Self {
        let reconciliation = reconcile(vault, calendar);

        SyncDiff {
            to_vault: reconciliation.only_in_b.into_iter().cloned().collect(),
            to_calendar: reconciliation.only_in_a.into_iter().cloned().collect(),
            vault_total: vault.len(),
            calendar_total: calendar.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_vault.is_empty() && self.to_calendar.is_empty()
    }

    /// Write missing events to the vault, then to the calendar.
    ///
    /// Stops at the first failed write; earlier writes stay applied.
    pub async fn apply<V, C>(&self, vault: &V, calendar: &C) -> SyncResult<SyncReport>
    where
        V: EventStore,
        C: EventStore,
    {
        let mut report = SyncReport::default();

        for event in &self.to_vault {
            info!(uid = %event.uid, target = vault.name(), "creating missing event");
            vault.create_event(event).await?;
            report.stored_in_vault.push(event.uid.clone());
        }

        for event in &self.to_calendar {
            info!(uid = %event.uid, target = calendar.name(), "creating missing event");
            calendar.create_event(event).await?;
            report.created_in_calendar.push(event.uid.clone());
        }

        Ok(report)
    }
}
