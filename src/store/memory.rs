use super::RecordStore;
use crate::api::{ApiError, ApiResult};
use crate::models::{ClaimResult, Entry, UserRef};
use crate::state::runtime::Runtime;
use crate::util::now_ms;
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

pub(crate) const NAME_TAKEN: &str = "This name is already taken";

/// One remote call as the store received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoreCall {
    Create { text: String, username: String },
    Update { id: String, text: String, username: String },
    Delete { id: String },
    List,
    Get { id: String },
    Vote { entry_id: String, username: String, voting: bool },
    Claim { target: String, previous: String },
}

#[derive(Clone, Debug)]
struct UserRow {
    id: String,
    username: String,
}

#[derive(Clone, Debug)]
struct EntryRow {
    id: String,
    text: String,
    created_by: String,
    updated_by: String,
    voters: Vec<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRow>,
    entries: Vec<EntryRow>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn user_id(&self, username: &str) -> ApiResult<String> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.id.clone())
            .ok_or_else(|| ApiError::not_found(format!("user {username}")))
    }

    fn user_ref(&self, user_id: &str) -> UserRef {
        let username = self
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();
        UserRef {
            id: user_id.to_string(),
            username,
        }
    }

    fn entry_mut(&mut self, id: &str) -> ApiResult<&mut EntryRow> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ApiError::not_found(format!("entry {id}")))
    }

    /// Created, edited or voted on at least one entry.
    fn has_activity(&self, user_id: &str) -> bool {
        self.entries.iter().any(|e| {
            e.created_by == user_id
                || e.updated_by == user_id
                || e.voters.iter().any(|v| v == user_id)
        })
    }

    fn expand(&self, row: &EntryRow) -> Entry {
        Entry {
            id: row.id.clone(),
            text: row.text.clone(),
            created_by: self.user_ref(&row.created_by),
            updated_by: self.user_ref(&row.updated_by),
            voters: row.voters.iter().map(|v| self.user_ref(v)).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// In-process record store with the server's semantics.
///
/// Every mutation publishes the entry id to subscribers synchronously.
/// Test builds also keep the calls and an outbox of ids for later delivery.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: RefCell<Tables>,
    #[cfg(test)]
    calls: RefCell<Vec<StoreCall>>,
    #[cfg(test)]
    outbox: RefCell<Vec<String>>,
    subscribers: RefCell<Vec<Box<dyn Fn(&str)>>>,
    offline: Cell<bool>,
    write_latency: RefCell<Option<(Rc<dyn Runtime>, Duration)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, on_changed: impl Fn(&str) + 'static) {
        self.subscribers.borrow_mut().push(Box::new(on_changed));
    }

    /// Every call fails with a network error while offline.
    #[cfg(test)]
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Delay write responses; the mutation itself lands immediately.
    #[cfg(test)]
    pub fn set_write_latency(&self, runtime: Rc<dyn Runtime>, latency: Duration) {
        *self.write_latency.borrow_mut() = Some((runtime, latency));
    }

    #[cfg(test)]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    /// Published ids not yet delivered, oldest first.
    #[cfg(test)]
    pub fn drain_outbox(&self) -> Vec<String> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    #[cfg(test)]
    pub fn user_exists(&self, username: &str) -> bool {
        self.tables.borrow().user_id(username).is_ok()
    }

    fn record(&self, call: StoreCall) -> ApiResult<()> {
        #[cfg(test)]
        self.calls.borrow_mut().push(call);
        #[cfg(not(test))]
        tracing::trace!(?call, "memory store call");
        if self.offline.get() {
            Err(ApiError::unreachable())
        } else {
            Ok(())
        }
    }

    fn publish(&self, id: &str) {
        #[cfg(test)]
        self.outbox.borrow_mut().push(id.to_string());
        for sub in self.subscribers.borrow().iter() {
            sub(id);
        }
    }

    async fn respond(&self) {
        let latency = self.write_latency.borrow().clone();
        if let Some((runtime, delay)) = latency {
            runtime.sleep(delay).await;
        }
    }
}

#[async_trait(?Send)]
impl RecordStore for MemoryStore {
    async fn create_entry(&self, text: &str, username: &str) -> ApiResult<String> {
        self.record(StoreCall::Create {
            text: text.to_string(),
            username: username.to_string(),
        })?;

        let id = {
            let mut t = self.tables.borrow_mut();
            let author = t.user_id(username)?;
            let id = t.next_id("e");
            let now = now_ms();
            t.entries.push(EntryRow {
                id: id.clone(),
                text: text.to_string(),
                created_by: author.clone(),
                updated_by: author,
                voters: vec![],
                created_at: now,
                updated_at: now,
            });
            id
        };

        self.publish(&id);
        self.respond().await;
        Ok(id)
    }

    async fn update_entry(&self, id: &str, text: &str, username: &str) -> ApiResult<()> {
        self.record(StoreCall::Update {
            id: id.to_string(),
            text: text.to_string(),
            username: username.to_string(),
        })?;

        {
            let mut t = self.tables.borrow_mut();
            let editor = t.user_id(username)?;
            let row = t.entry_mut(id)?;
            row.text = text.to_string();
            row.updated_by = editor;
            row.updated_at = now_ms();
        }

        self.publish(id);
        self.respond().await;
        Ok(())
    }

    async fn delete_entry(&self, id: &str) -> ApiResult<()> {
        self.record(StoreCall::Delete { id: id.to_string() })?;

        {
            let mut t = self.tables.borrow_mut();
            let before = t.entries.len();
            t.entries.retain(|e| e.id != id);
            if t.entries.len() == before {
                return Err(ApiError::not_found(format!("entry {id}")));
            }
        }

        self.publish(id);
        self.respond().await;
        Ok(())
    }

    async fn list_entries(&self) -> ApiResult<Vec<Entry>> {
        self.record(StoreCall::List)?;
        let t = self.tables.borrow();
        Ok(t.entries.iter().map(|row| t.expand(row)).collect())
    }

    async fn get_entry(&self, id: &str) -> ApiResult<Option<Entry>> {
        self.record(StoreCall::Get { id: id.to_string() })?;
        let t = self.tables.borrow();
        Ok(t.entries.iter().find(|e| e.id == id).map(|row| t.expand(row)))
    }

    async fn set_vote(&self, entry_id: &str, username: &str, voting: bool) -> ApiResult<()> {
        self.record(StoreCall::Vote {
            entry_id: entry_id.to_string(),
            username: username.to_string(),
            voting,
        })?;

        {
            let mut t = self.tables.borrow_mut();
            let voter = t.user_id(username)?;
            let row = t.entry_mut(entry_id)?;
            row.voters.retain(|v| v != &voter);
            if voting {
                row.voters.push(voter);
            }
        }

        self.publish(entry_id);
        self.respond().await;
        Ok(())
    }

    async fn claim_username(&self, target: &str, previous: &str) -> ApiResult<ClaimResult> {
        self.record(StoreCall::Claim {
            target: target.to_string(),
            previous: previous.to_string(),
        })?;

        let result = {
            let mut t = self.tables.borrow_mut();
            if target == previous {
                ClaimResult::ok()
            } else if let Some(owner) = t.users.iter().find(|u| u.username == target).cloned() {
                if t.has_activity(&owner.id) {
                    ClaimResult::rejected(NAME_TAKEN)
                } else {
                    // Idle owner: reclaim the name.
                    t.users.retain(|u| u.id != owner.id);
                    rename_or_create(&mut t, target, previous);
                    ClaimResult::ok()
                }
            } else {
                rename_or_create(&mut t, target, previous);
                ClaimResult::ok()
            }
        };

        self.respond().await;
        Ok(result)
    }
}

fn rename_or_create(t: &mut Tables, target: &str, previous: &str) {
    if let Some(user) = t.users.iter_mut().find(|u| u.username == previous) {
        user.username = target.to_string();
        return;
    }
    let id = t.next_id("u");
    t.users.push(UserRow {
        id,
        username: target.to_string(),
    });
}
