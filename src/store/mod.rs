//! Persistent record store consumed by the session.

mod memory;

pub(crate) use memory::MemoryStore;
#[cfg(test)]
pub(crate) use memory::{StoreCall, NAME_TAKEN};

use crate::api::ApiResult;
use crate::models::{ClaimResult, Entry};
use async_trait::async_trait;

/// Entries with author, last editor and voters expanded.
///
/// Every mutation is expected to publish `EntryChanged(id)` on the
/// notification channel once it lands.
#[async_trait(?Send)]
pub(crate) trait RecordStore {
    /// Returns the server-assigned id.
    async fn create_entry(&self, text: &str, username: &str) -> ApiResult<String>;

    async fn update_entry(&self, id: &str, text: &str, username: &str) -> ApiResult<()>;

    async fn delete_entry(&self, id: &str) -> ApiResult<()>;

    async fn list_entries(&self) -> ApiResult<Vec<Entry>>;

    /// `Ok(None)` when the entry no longer exists.
    async fn get_entry(&self, id: &str) -> ApiResult<Option<Entry>>;

    async fn set_vote(&self, entry_id: &str, username: &str, voting: bool) -> ApiResult<()>;

    async fn claim_username(&self, target: &str, previous: &str) -> ApiResult<ClaimResult>;
}
