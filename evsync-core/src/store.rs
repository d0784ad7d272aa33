//! The seam between the sync loop and a backing store.

use crate::error::SyncResult;
use crate::event::{Event, EventMap};

/// A source of events that can also accept new ones.
///
/// Implemented by the vault and CalDAV adapters; the sync loop only ever
/// lists everything and creates what is missing.
#[allow(async_fn_in_trait)]
pub trait EventStore {
    /// Short label used in logs and output ("vault", "nextcloud").
    fn name(&self) -> &str;

    /// Every event in the store keyed by uid, last duplicate winning.
    async fn list_events(&self) -> SyncResult<EventMap>;

    /// Create `event` in the store. No existence check is made.
    async fn create_event(&self, event: &Event) -> SyncResult<()>;
}
