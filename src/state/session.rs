//! Optimistic voting session.
//!
//! Every user action mutates local state synchronously and then fires the
//! matching remote call on the event loop. Remote failures are logged and
//! absorbed: nothing is rolled back, the next "entry changed" refetch or full
//! refresh brings the list back in line. Only the rename flow reports its
//! outcome, because the name has to be unique.

use crate::config::SessionConfig;
use crate::models::{Entry, SENTINEL_ID};
use crate::state::busy::{BusyGate, BusyToken};
use crate::state::debounce::Debouncer;
use crate::state::entries::{EntryList, Upserted};
use crate::state::runtime::Runtime;
use crate::state::trash::DeletedEntries;
use crate::storage::UserContext;
use crate::store::RecordStore;
use crate::util::{now_ms, truncate_text, TRUNCATE_AT};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub(crate) const RENAME_FAILED: &str = "Could not change the name";

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub(crate) enum SessionError {
    #[error("choose a name first")]
    NoUsername,
    #[error("the previous entry is still being created")]
    AddPending,
    #[error("no entry with id {0:?}")]
    UnknownEntry(String),
    #[error("the entry has not been saved yet")]
    EntryNotPersisted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RenameOutcome {
    /// Empty or same as the current name; nothing sent.
    Unchanged,
    Claimed,
    /// Field-level message for the name input.
    Rejected(String),
}

/// A soft-deleted entry that can still be brought back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PendingDeletion {
    pub id: String,
    pub message: String,
}

impl PendingDeletion {
    fn for_entry(entry: &Entry) -> Self {
        let message = if entry.text.is_empty() {
            "Deleted empty entry".to_string()
        } else {
            format!("Deleted: {}", truncate_text(&entry.text, TRUNCATE_AT))
        };
        Self {
            id: entry.id.clone(),
            message,
        }
    }
}

/// Forgets dismissed toast ids whose deletion is no longer pending, so an
/// entry deleted again gets its toast back. True when something was dropped.
pub(crate) fn prune_dismissed(dismissed: &mut Vec<String>, live: &[PendingDeletion]) -> bool {
    let before = dismissed.len();
    dismissed.retain(|id| live.iter().any(|d| &d.id == id));
    dismissed.len() != before
}

/// Everything the page renders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SessionSnapshot {
    pub entries: Vec<Entry>,
    pub deletions: Vec<PendingDeletion>,
    pub username: String,
    pub username_draft: String,
    pub username_error: Option<String>,
    pub busy: bool,
    pub can_add: bool,
}

struct SessionState {
    user: UserContext,
    username_draft: String,
    username_error: Option<String>,
    entries: EntryList,
    trash: DeletedEntries,
    busy: BusyGate,
    /// entry id -> text waiting to be written
    text_writes: Debouncer<String, String>,
    rename: Debouncer<(), String>,
    /// Generation of the create call still waiting for its id.
    create_pending: Option<u64>,
    next_create: u64,
}

struct Shared {
    store: Rc<dyn RecordStore>,
    runtime: Rc<dyn Runtime>,
    config: SessionConfig,
    state: RefCell<SessionState>,
    on_change: RefCell<Option<Rc<dyn Fn(SessionSnapshot)>>>,
}

/// Owned by one page instance; clones share state.
#[derive(Clone)]
pub(crate) struct VotingSession(Rc<Shared>);

impl VotingSession {
    pub fn new(
        store: Rc<dyn RecordStore>,
        runtime: Rc<dyn Runtime>,
        user: UserContext,
        config: SessionConfig,
    ) -> Self {
        let username_draft = user.username().to_string();
        Self(Rc::new(Shared {
            store,
            runtime,
            config,
            state: RefCell::new(SessionState {
                user,
                username_draft,
                username_error: None,
                entries: EntryList::default(),
                trash: DeletedEntries::default(),
                busy: BusyGate::default(),
                text_writes: Debouncer::default(),
                rename: Debouncer::default(),
                create_pending: None,
                next_create: 0,
            }),
            on_change: RefCell::new(None),
        }))
    }

    /// Called with a fresh snapshot after every state change.
    pub fn set_on_change(&self, on_change: impl Fn(SessionSnapshot) + 'static) {
        *self.0.on_change.borrow_mut() = Some(Rc::new(on_change));
        self.notify();
    }

    /// Stops change callbacks; in-flight tasks still finish.
    pub fn detach(&self) {
        self.0.on_change.borrow_mut().take();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.0.state.borrow();
        let username = s.user.username().to_string();
        SessionSnapshot {
            entries: s.entries.as_slice().to_vec(),
            deletions: s
                .trash
                .slots()
                .iter()
                .map(|slot| PendingDeletion::for_entry(&slot.entry))
                .collect(),
            can_add: !username.is_empty()
                && s.create_pending.is_none()
                && !s.entries.has_sentinel(),
            username,
            username_draft: s.username_draft.clone(),
            username_error: s.username_error.clone(),
            busy: s.busy.is_busy(),
        }
    }

    pub fn username(&self) -> String {
        self.0.state.borrow().user.username().to_string()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.0.state.borrow_mut())
    }

    fn notify(&self) {
        let on_change = self.0.on_change.borrow().clone();
        if let Some(on_change) = on_change {
            on_change(self.snapshot());
        }
    }

    fn begin_busy(&self) -> BusyToken {
        let token = self.with_state(|s| s.busy.begin());
        self.notify();
        token
    }

    fn end_busy(&self, token: BusyToken) {
        if self.with_state(|s| s.busy.end(token)) {
            self.notify();
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.0.runtime.spawn(Box::pin(task));
    }

    /// Runs `task` on the event loop with the busy gate held.
    fn spawn_busy(&self, task: impl Future<Output = ()> + 'static) {
        let token = self.begin_busy();
        let session = self.clone();
        self.spawn(async move {
            task.await;
            session.end_busy(token);
        });
    }

    // ---------------------------------------------------------------------
    // Full refresh
    // ---------------------------------------------------------------------

    /// Reloads the whole list (mount, page visible again).
    pub fn refresh(&self) {
        let session = self.clone();
        self.spawn_busy(async move { session.reload().await });
    }

    pub fn on_became_visible(&self) {
        debug!("page visible again, refreshing");
        self.refresh();
    }

    async fn reload(&self) {
        let server = match self.0.store.list_entries().await {
            Ok(server) => server,
            Err(e) => {
                warn!(error = %e, "refresh failed");
                return;
            }
        };

        let count = self.with_state(|s| {
            let mut live = s.trash.rebase(server);
            for entry in live.iter_mut() {
                if let Some(text) = s.text_writes.pending(entry.id.as_str()) {
                    entry.text = text.clone();
                }
            }
            s.entries.replace_all(live);
            s.entries.len()
        });
        info!(count, "entries refreshed");
        self.notify();
    }

    // ---------------------------------------------------------------------
    // Add
    // ---------------------------------------------------------------------

    /// Shows an empty placeholder now and creates the entry remotely.
    ///
    /// Only one create may be in flight: a second add before the first has
    /// its server id is rejected, even if a refresh already dropped the
    /// placeholder.
    pub fn add_entry(&self) -> Result<(), SessionError> {
        let (username, generation) = self.with_state(|s| {
            let username = s.user.username().to_string();
            if username.is_empty() {
                return Err(SessionError::NoUsername);
            }
            if s.create_pending.is_some() || s.entries.has_sentinel() {
                return Err(SessionError::AddPending);
            }
            s.next_create += 1;
            s.create_pending = Some(s.next_create);
            if let Upserted::Appended(i) = s.entries.upsert(Entry::placeholder(&username, now_ms()))
            {
                s.trash.note_live_insert(i);
            }
            Ok((username, s.next_create))
        })?;
        self.notify();

        let session = self.clone();
        self.spawn_busy(async move {
            let created = session.0.store.create_entry("", &username).await;
            session.with_state(|s| {
                if s.create_pending == Some(generation) {
                    s.create_pending = None;
                }
            });
            match created {
                Ok(id) => session.resolve_placeholder(id),
                Err(e) => {
                    warn!(error = %e, "create entry failed");
                    session.notify();
                }
            }
        });
        Ok(())
    }

    /// Gives the placeholder its server id. A refresh or a notification may
    /// have replaced it already; the add gate keeps any other placeholder
    /// from appearing meanwhile.
    fn resolve_placeholder(&self, id: String) {
        let typed = self.with_state(|s| {
            let i = s.entries.sentinel_index()?;
            s.entries.resolve_sentinel(&id);
            s.entries.get(i).map(|e| e.text.clone())
        });

        match typed {
            None => {
                debug!(%id, "placeholder already merged elsewhere");
                self.notify();
            }
            Some(text) => {
                self.notify();
                if !text.is_empty() {
                    self.schedule_text_write(id, text);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Edit
    // ---------------------------------------------------------------------

    /// Local text change; the remote write is debounced per entry.
    pub fn edit_text(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let entry_id = self.with_state(|s| {
            let entry = s
                .entries
                .find_index(id)
                .and_then(|i| s.entries.get_mut(i))
                .ok_or_else(|| SessionError::UnknownEntry(id.to_string()))?;
            entry.text = text.to_string();
            Ok(entry.id.clone())
        })?;
        self.notify();

        if entry_id.is_empty() {
            // Written once the placeholder gets its id.
            debug!("text kept locally until the entry is created");
        } else {
            self.schedule_text_write(entry_id, text.to_string());
        }
        Ok(())
    }

    /// Focus left the entry's input: write now.
    pub fn flush_text(&self, id: &str) {
        let due = self.with_state(|s| s.text_writes.take(id));
        if let Some(text) = due {
            self.write_text(id.to_string(), text);
        }
    }

    fn schedule_text_write(&self, id: String, text: String) {
        let generation = self.with_state(|s| s.text_writes.schedule(id.clone(), text));
        let timer = self.0.runtime.sleep(self.0.config.text_debounce);
        let session = self.clone();
        self.spawn(async move {
            timer.await;
            let due = session.with_state(|s| s.text_writes.fire(id.as_str(), generation));
            if let Some(text) = due {
                session.write_text(id, text);
            }
        });
    }

    fn write_text(&self, id: String, text: String) {
        let store = self.0.store.clone();
        let username = self.username();
        self.spawn_busy(async move {
            if let Err(e) = store.update_entry(&id, &text, &username).await {
                warn!(%id, error = %e, "update entry failed");
            }
        });
    }

    // ---------------------------------------------------------------------
    // Vote
    // ---------------------------------------------------------------------

    /// Casts or retracts the current user's vote. Returns the new state.
    pub fn toggle_vote(&self, id: &str) -> Result<bool, SessionError> {
        let (entry_id, username, voting) = self.with_state(|s| {
            let username = s.user.username().to_string();
            if username.is_empty() {
                return Err(SessionError::NoUsername);
            }
            let entry = s
                .entries
                .find_index(id)
                .and_then(|i| s.entries.get_mut(i))
                .ok_or_else(|| SessionError::UnknownEntry(id.to_string()))?;
            if entry.is_sentinel() {
                return Err(SessionError::EntryNotPersisted);
            }
            let voting = !entry.has_voter(&username);
            *entry = entry.with_vote(&username, voting);
            Ok((entry.id.clone(), username, voting))
        })?;
        self.notify();

        let store = self.0.store.clone();
        self.spawn_busy(async move {
            if let Err(e) = store.set_vote(&entry_id, &username, voting).await {
                warn!(id = %entry_id, voting, error = %e, "vote failed");
            }
        });
        Ok(voting)
    }

    // ---------------------------------------------------------------------
    // Delete / undo
    // ---------------------------------------------------------------------

    /// Removes the entry locally; the remote delete follows after the grace
    /// period unless `undo` is called first.
    pub fn soft_delete(&self, id: &str) -> Result<PendingDeletion, SessionError> {
        if id.is_empty() {
            return Err(SessionError::EntryNotPersisted);
        }

        let (deletion, ticket, unsaved) = self.with_state(|s| {
            if s.entries.position_exact(id).is_none() {
                return Err(SessionError::UnknownEntry(id.to_string()));
            }
            let (index, entry) = s
                .entries
                .remove_by_id(id)
                .ok_or_else(|| SessionError::UnknownEntry(id.to_string()))?;
            let deletion = PendingDeletion::for_entry(&entry);
            let ticket = s.trash.park(entry, index);
            Ok((deletion, ticket, s.text_writes.take(id)))
        })?;
        self.notify();

        // Keep the last text so an undo does not lose it remotely.
        if let Some(text) = unsaved {
            self.write_text(id.to_string(), text);
        }

        let timer = self.0.runtime.sleep(self.0.config.undo_grace);
        let session = self.clone();
        let id = id.to_string();
        self.spawn(async move {
            timer.await;
            session.confirm_delete(&id, ticket);
        });

        Ok(deletion)
    }

    /// Puts a soft-deleted entry back. `false` once the delete was confirmed.
    pub fn undo(&self, id: &str) -> bool {
        let restored = self.with_state(|s| {
            let (entry, index) = s.trash.take(id)?;
            Some(s.entries.insert_at(index, entry))
        });

        match restored {
            Some(index) => {
                debug!(%id, index, "deletion undone");
                self.notify();
                true
            }
            None => false,
        }
    }

    fn confirm_delete(&self, id: &str, ticket: u64) {
        if self.with_state(|s| s.trash.confirm(id, ticket)).is_none() {
            debug!(%id, "deletion was undone or superseded");
            return;
        }
        self.notify();

        let store = self.0.store.clone();
        let id = id.to_string();
        self.spawn_busy(async move {
            if let Err(e) = store.delete_entry(&id).await {
                warn!(%id, error = %e, "delete entry failed");
            }
        });
    }

    // ---------------------------------------------------------------------
    // Remote change listener
    // ---------------------------------------------------------------------

    /// "Entry `id` changed somewhere": refetch it and merge.
    ///
    /// Idempotent, so duplicates and reordering are harmless.
    pub fn on_entry_changed(&self, id: &str) {
        if id == SENTINEL_ID {
            debug!("ignoring change for an unsaved id");
            return;
        }
        let session = self.clone();
        let id = id.to_string();
        self.spawn_busy(async move {
            match session.0.store.get_entry(&id).await {
                Ok(Some(entry)) => session.merge_remote(entry),
                Ok(None) => session.merge_gone(&id),
                Err(e) => warn!(%id, error = %e, "refetch after notification failed"),
            }
        });
    }

    fn merge_remote(&self, mut entry: Entry) {
        self.with_state(|s| {
            if s.trash.contains(&entry.id) {
                s.trash.refresh(entry);
                return;
            }
            // Local typing not yet written wins over the echo.
            if let Some(text) = s.text_writes.pending(entry.id.as_str()) {
                entry.text = text.clone();
            }
            if let Upserted::Appended(i) = s.entries.upsert(entry) {
                s.trash.note_live_insert(i);
            }
        });
        self.notify();
    }

    fn merge_gone(&self, id: &str) {
        if id == SENTINEL_ID {
            return;
        }
        let changed = self.with_state(|s| {
            if s.trash.discard(id).is_some() {
                return true;
            }
            match s.entries.position_exact(id) {
                Some(i) => {
                    s.trash.note_live_removal(i);
                    s.entries.remove_by_id(id);
                    s.text_writes.take(id);
                    true
                }
                None => false,
            }
        });

        if changed {
            debug!(%id, "entry deleted elsewhere");
            self.notify();
        }
    }

    // ---------------------------------------------------------------------
    // Rename
    // ---------------------------------------------------------------------

    /// Name input changed; the claim is debounced.
    pub fn edit_username(&self, value: &str) {
        let generation = self.with_state(|s| {
            s.username_draft = value.to_string();
            s.rename.schedule((), value.to_string())
        });
        self.notify();

        let timer = self.0.runtime.sleep(self.0.config.username_debounce);
        let session = self.clone();
        self.spawn(async move {
            timer.await;
            let due = session.with_state(|s| s.rename.fire(&(), generation));
            if let Some(value) = due {
                session.claim_username(&value).await;
            }
        });
    }

    /// Name input lost focus: claim now.
    pub fn flush_username(&self) {
        if let Some(value) = self.with_state(|s| s.rename.take(&())) {
            let session = self.clone();
            self.spawn(async move {
                session.claim_username(&value).await;
            });
        }
    }

    /// Claims `value` as the current user's name.
    ///
    /// On success the list is refetched before the new name is stored, so
    /// author labels match the new name.
    pub async fn claim_username(&self, value: &str) -> RenameOutcome {
        let previous = self.username();
        if value.is_empty() || value == previous {
            self.with_state(|s| s.username_error = None);
            self.notify();
            return RenameOutcome::Unchanged;
        }

        let token = self.begin_busy();
        let outcome = match self.0.store.claim_username(value, &previous).await {
            Ok(result) if result.success => {
                self.with_state(|s| s.username_error = None);
                self.reload().await;
                self.with_state(|s| s.user.set_username(value));
                info!(from = %previous, to = %value, "username claimed");
                RenameOutcome::Claimed
            }
            Ok(result) => {
                let message = result.error.unwrap_or_else(|| RENAME_FAILED.to_string());
                self.with_state(|s| s.username_error = Some(message.clone()));
                RenameOutcome::Rejected(message)
            }
            Err(e) => {
                warn!(error = %e, "claim username failed");
                self.with_state(|s| s.username_error = Some(RENAME_FAILED.to_string()));
                RenameOutcome::Rejected(RENAME_FAILED.to_string())
            }
        };
        self.notify();
        self.end_busy(token);
        outcome
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::state::runtime::TokioRuntime;
    use crate::storage::{MemoryStorage, UsernameStorage};
    use crate::store::{MemoryStore, StoreCall, NAME_TAKEN};
    use std::time::Duration;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    fn user(name: &str) -> UserContext {
        let storage = MemoryStorage::default();
        if !name.is_empty() {
            storage.save(name);
        }
        UserContext::load(Box::new(storage))
    }

    async fn session_for(name: &str) -> (Rc<MemoryStore>, VotingSession) {
        let store = Rc::new(MemoryStore::new());
        if !name.is_empty() {
            store.claim_username(name, "").await.unwrap();
        }
        let session = VotingSession::new(
            store.clone(),
            Rc::new(TokioRuntime),
            user(name),
            SessionConfig::default(),
        );
        (store, session)
    }

    /// Entries created by `ann` straight in the store, ids in order.
    async fn seed(store: &MemoryStore, texts: &[&str]) -> Vec<String> {
        let mut ids = vec![];
        for text in texts {
            ids.push(store.create_entry(text, "ann").await.unwrap());
        }
        store.drain_outbox();
        ids
    }

    fn ids(session: &VotingSession) -> Vec<String> {
        session.snapshot().entries.into_iter().map(|e| e.id).collect()
    }

    fn texts(session: &VotingSession) -> Vec<String> {
        session.snapshot().entries.into_iter().map(|e| e.text).collect()
    }

    fn count(store: &MemoryStore, pred: impl Fn(&StoreCall) -> bool) -> usize {
        store.calls().iter().filter(|c| pred(c)).count()
    }

    fn deliver(store: &MemoryStore, session: &VotingSession) {
        for id in store.drain_outbox() {
            session.on_entry_changed(&id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_resolves_placeholder_then_echo_merges_in_place() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;

                session.add_entry().unwrap();
                let snap = session.snapshot();
                assert_eq!(snap.entries.len(), 1);
                assert!(snap.entries[0].is_sentinel());
                assert!(!snap.can_add);
                assert!(snap.busy);

                settle().await;
                let id = ids(&session).remove(0);
                assert!(!id.is_empty());

                deliver(&store, &session);
                settle().await;
                assert_eq!(ids(&session), vec![id]);
                assert!(session.snapshot().can_add);
                assert!(!session.snapshot().busy);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_before_create_response_fills_placeholder() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(1));

                session.add_entry().unwrap();
                settle().await;
                // created remotely, response still in flight
                let published = store.drain_outbox();
                assert_eq!(published.len(), 1);
                assert!(session.snapshot().entries[0].is_sentinel());

                session.on_entry_changed(&published[0]);
                settle().await;
                assert_eq!(ids(&session), published);

                sleep(Duration::from_secs(2)).await;
                assert_eq!(ids(&session), published);
                assert!(!session.snapshot().busy);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_add_while_pending_is_rejected() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(1));

                session.add_entry().unwrap();
                assert_eq!(session.add_entry(), Err(SessionError::AddPending));

                sleep(Duration::from_secs(2)).await;
                assert!(session.add_entry().is_ok());
                settle().await;
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Create { .. })), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_during_create_keeps_ids_unique() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(1));

                session.add_entry().unwrap();
                settle().await;
                session.on_became_visible();
                settle().await;

                // The refresh already holds the new entry and dropped the placeholder.
                let snap = session.snapshot();
                assert_eq!(snap.entries.len(), 1);
                assert!(!snap.entries[0].is_sentinel());
                assert!(!snap.can_add);
                assert_eq!(session.add_entry(), Err(SessionError::AddPending));

                sleep(Duration::from_secs(3)).await;
                let first = ids(&session);
                assert_eq!(first.len(), 1);
                assert!(session.snapshot().can_add);

                session.add_entry().unwrap();
                sleep(Duration::from_secs(3)).await;
                let both = ids(&session);
                assert_eq!(both.len(), 2);
                assert_ne!(both[0], both[1]);
                assert_eq!(both[0], first[0]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_entry_taking_placeholder_keeps_add_gated() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.claim_username("bob", "").await.unwrap();
                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(1));

                session.add_entry().unwrap();
                settle().await;
                let own = store.drain_outbox();

                let bob_store = store.clone();
                tokio::task::spawn_local(async move {
                    bob_store.create_entry("tea", "bob").await.unwrap();
                });
                settle().await;
                deliver(&store, &session);
                settle().await;

                let snap = session.snapshot();
                assert_eq!(texts(&session), vec!["tea"]);
                assert!(!snap.can_add);
                assert_eq!(session.add_entry(), Err(SessionError::AddPending));

                sleep(Duration::from_secs(2)).await;
                assert_eq!(ids(&session).len(), 1);

                for id in own {
                    session.on_entry_changed(&id);
                }
                settle().await;
                let ids = ids(&session);
                assert_eq!(ids.len(), 2);
                assert_ne!(ids[0], ids[1]);
                assert!(session.snapshot().can_add);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_for_empty_id_leaves_placeholder() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(1));

                session.add_entry().unwrap();
                session.on_entry_changed("");
                settle().await;
                let snap = session.snapshot();
                assert_eq!(snap.entries.len(), 1);
                assert!(snap.entries[0].is_sentinel());
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Get { .. })), 0);

                session.merge_gone("");
                assert_eq!(session.snapshot().entries.len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_without_username_is_rejected() {
        LocalSet::new()
            .run_until(async {
                let (_store, session) = session_for("").await;
                assert_eq!(session.add_entry(), Err(SessionError::NoUsername));
                assert!(session.snapshot().entries.is_empty());
                assert!(!session.snapshot().can_add);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_write_once_with_last_text() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &[""]).await.remove(0);
                session.refresh();
                settle().await;

                for text in ["t", "te", "tea"] {
                    session.edit_text(&id, text).unwrap();
                    sleep(Duration::from_millis(500)).await;
                }
                assert_eq!(texts(&session), vec!["tea"]);
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Update { .. })), 0);

                sleep(Duration::from_secs(3)).await;
                let updates: Vec<StoreCall> = store
                    .calls()
                    .into_iter()
                    .filter(|c| matches!(c, StoreCall::Update { .. }))
                    .collect();
                assert_eq!(
                    updates,
                    vec![StoreCall::Update {
                        id: id.clone(),
                        text: "tea".to_string(),
                        username: "ann".to_string(),
                    }]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_loss_flushes_exactly_once() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &[""]).await.remove(0);
                session.refresh();
                settle().await;

                session.edit_text(&id, "coffee").unwrap();
                session.flush_text(&id);
                settle().await;
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Update { .. })), 1);

                sleep(Duration::from_secs(5)).await;
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Update { .. })), 1);
                assert_eq!(store.list_entries().await.unwrap()[0].text, "coffee");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_to_different_entries_debounce_independently() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["", ""]).await;
                session.refresh();
                settle().await;

                session.edit_text(&ids[0], "a").unwrap();
                session.edit_text(&ids[1], "b").unwrap();
                sleep(Duration::from_secs(4)).await;

                let server: Vec<String> = store
                    .list_entries()
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|e| e.text)
                    .collect();
                assert_eq!(server, vec!["a", "b"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_does_not_clobber_unsaved_typing() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &["old"]).await.remove(0);
                session.refresh();
                settle().await;

                session.edit_text(&id, "typing").unwrap();
                session.on_entry_changed(&id);
                settle().await;
                assert_eq!(texts(&session), vec!["typing"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_within_grace_period_cancels_remote_delete() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["a", "b", "c"]).await;
                session.refresh();
                settle().await;

                let pending = session.soft_delete(&ids[1]).unwrap();
                assert_eq!(pending.message, "Deleted: b");
                assert_eq!(texts(&session), vec!["a", "c"]);
                assert_eq!(session.snapshot().deletions, vec![pending]);

                sleep(Duration::from_secs(1)).await;
                assert!(session.undo(&ids[1]));
                assert_eq!(texts(&session), vec!["a", "b", "c"]);
                assert!(session.snapshot().deletions.is_empty());

                sleep(Duration::from_secs(10)).await;
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Delete { .. })), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_elapses_into_remote_delete() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["", "b"]).await;
                session.refresh();
                settle().await;

                let pending = session.soft_delete(&ids[0]).unwrap();
                assert_eq!(pending.message, "Deleted empty entry");

                sleep(Duration::from_secs(5)).await;
                assert_eq!(
                    store.calls().last(),
                    Some(&StoreCall::Delete { id: ids[0].clone() })
                );
                assert!(!session.undo(&ids[0]));
                assert!(session.snapshot().deletions.is_empty());

                // the echo of our own delete changes nothing
                deliver(&store, &session);
                settle().await;
                assert_eq!(texts(&session), vec!["b"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_all_undo_all_round_trips() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["a", "b", "c", "d"]).await;
                session.refresh();
                settle().await;

                for i in [2, 0, 3, 1] {
                    session.soft_delete(&ids[i]).unwrap();
                }
                assert!(session.snapshot().entries.is_empty());
                for i in [1, 3, 0, 2] {
                    assert!(session.undo(&ids[i]));
                }
                assert_eq!(texts(&session), vec!["a", "b", "c", "d"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsaved_text_is_written_before_delete() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &[""]).await.remove(0);
                session.refresh();
                settle().await;

                session.edit_text(&id, "keep me").unwrap();
                session.soft_delete(&id).unwrap();
                settle().await;
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Update { .. })), 1);

                assert!(session.undo(&id));
                sleep(Duration::from_secs(10)).await;
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Update { .. })), 1);
                assert_eq!(texts(&session), vec!["keep me"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_notification_yields_single_row() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &["tea"]).await.remove(0);

                session.on_entry_changed(&id);
                session.on_entry_changed(&id);
                settle().await;

                assert_eq!(ids(&session), vec![id.clone()]);
                assert_eq!(count(&store, |c| matches!(c, StoreCall::Get { .. })), 2);
                assert_eq!(texts(&session), vec!["tea"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_delete_removes_row_and_unknown_is_noop() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["a", "b"]).await;
                session.refresh();
                settle().await;

                store.delete_entry(&ids[0]).await.unwrap();
                deliver(&store, &session);
                session.on_entry_changed("never-existed");
                settle().await;

                assert_eq!(texts(&session), vec!["b"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_change_to_parked_entry_stays_hidden() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["a", "b"]).await;
                session.refresh();
                settle().await;

                session.soft_delete(&ids[0]).unwrap();
                store.update_entry(&ids[0], "a2", "ann").await.unwrap();
                deliver(&store, &session);
                settle().await;
                assert_eq!(texts(&session), vec!["b"]);

                assert!(session.undo(&ids[0]));
                assert_eq!(texts(&session), vec!["a2", "b"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_parked_entries_out() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let ids = seed(&store, &["a", "b", "c"]).await;
                session.refresh();
                settle().await;

                session.soft_delete(&ids[1]).unwrap();
                session.on_became_visible();
                settle().await;
                assert_eq!(texts(&session), vec!["a", "c"]);

                assert!(session.undo(&ids[1]));
                assert_eq!(texts(&session), vec!["a", "b", "c"]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_toggle_is_local_first() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &["tea"]).await.remove(0);
                session.refresh();
                settle().await;

                assert_eq!(session.toggle_vote(&id), Ok(true));
                assert!(session.snapshot().entries[0].has_voter("ann"));
                settle().await;
                assert!(store.get_entry(&id).await.unwrap().unwrap().has_voter("ann"));

                assert_eq!(session.toggle_vote(&id), Ok(false));
                assert!(session.snapshot().entries[0].voters.is_empty());
                settle().await;
                assert!(store.get_entry(&id).await.unwrap().unwrap().voters.is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_absorbed_without_rollback() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &["tea"]).await.remove(0);
                session.refresh();
                settle().await;

                store.set_offline(true);
                assert_eq!(session.toggle_vote(&id), Ok(true));
                settle().await;
                assert!(session.snapshot().entries[0].has_voter("ann"));
                assert!(!session.snapshot().busy);

                // the next refresh reconciles
                store.set_offline(false);
                session.refresh();
                settle().await;
                assert!(session.snapshot().entries[0].voters.is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_on_placeholder_is_rejected() {
        LocalSet::new()
            .run_until(async {
                let (_store, session) = session_for("ann").await;
                session.add_entry().unwrap();
                assert_eq!(session.toggle_vote(""), Err(SessionError::EntryNotPersisted));
                assert_eq!(session.soft_delete(""), Err(SessionError::EntryNotPersisted));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_idle_name_succeeds_and_persists() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.claim_username("idle", "").await.unwrap();

                assert_eq!(session.claim_username("idle").await, RenameOutcome::Claimed);
                assert_eq!(session.username(), "idle");
                assert!(store.user_exists("idle"));
                assert!(!store.user_exists("ann"));
                assert!(session.snapshot().username_error.is_none());
                // list refetched as part of the rename
                assert_eq!(store.calls().last(), Some(&StoreCall::List));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_active_name_is_rejected() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.claim_username("bob", "").await.unwrap();
                store.create_entry("bob's", "bob").await.unwrap();

                assert_eq!(
                    session.claim_username("bob").await,
                    RenameOutcome::Rejected(NAME_TAKEN.to_string())
                );
                assert_eq!(session.username(), "ann");
                assert_eq!(
                    session.snapshot().username_error.as_deref(),
                    Some(NAME_TAKEN)
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_same_or_empty_name_sends_nothing() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let before = store.calls().len();
                assert_eq!(session.claim_username("ann").await, RenameOutcome::Unchanged);
                assert_eq!(session.claim_username("").await, RenameOutcome::Unchanged);
                assert_eq!(store.calls().len(), before);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_network_failure_reports_generic_error() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                store.set_offline(true);
                assert_eq!(
                    session.claim_username("anna").await,
                    RenameOutcome::Rejected(RENAME_FAILED.to_string())
                );
                assert_eq!(session.username(), "ann");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_username_edits_are_debounced() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("").await;

                for value in ["z", "zo", "zoe"] {
                    session.edit_username(value);
                    sleep(Duration::from_millis(300)).await;
                }
                assert_eq!(session.snapshot().username_draft, "zoe");
                assert_eq!(session.username(), "");

                sleep(Duration::from_secs(3)).await;
                assert_eq!(
                    count(&store, |c| matches!(c, StoreCall::Claim { .. })),
                    1
                );
                assert_eq!(session.username(), "zoe");
                assert!(session.add_entry().is_ok());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_username_flush_claims_immediately() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("").await;
                session.edit_username("zoe");
                session.flush_username();
                settle().await;
                assert_eq!(session.username(), "zoe");

                sleep(Duration::from_secs(3)).await;
                assert_eq!(
                    store.calls().iter().filter(|c| matches!(c, StoreCall::Claim { .. })).count(),
                    1
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_gate_spans_overlapping_operations() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &["tea"]).await.remove(0);
                session.refresh();
                settle().await;

                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(2));
                session.toggle_vote(&id).unwrap();
                sleep(Duration::from_secs(1)).await;
                session.toggle_vote(&id).unwrap();

                // first vote answers at 2s, the second at 3s
                sleep(Duration::from_millis(1500)).await;
                assert!(session.snapshot().busy);
                sleep(Duration::from_secs(1)).await;
                assert!(!session.snapshot().busy);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_is_accepted_while_busy() {
        LocalSet::new()
            .run_until(async {
                let (store, session) = session_for("ann").await;
                let id = seed(&store, &["tea"]).await.remove(0);
                session.refresh();
                settle().await;

                store.set_write_latency(Rc::new(TokioRuntime), Duration::from_secs(2));
                session.toggle_vote(&id).unwrap();
                settle().await;
                assert!(session.snapshot().busy);

                session.edit_text(&id, "green tea").unwrap();
                assert_eq!(texts(&session), vec!["green tea"]);

                sleep(Duration::from_secs(5)).await;
                let writes = count(&store, |c| {
                    matches!(c, StoreCall::Update { text, .. } if text == "green tea")
                });
                assert_eq!(writes, 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_callback_receives_snapshots() {
        LocalSet::new()
            .run_until(async {
                let (_store, session) = session_for("ann").await;
                let seen = Rc::new(RefCell::new(Vec::<SessionSnapshot>::new()));
                let sink = seen.clone();
                session.set_on_change(move |snap| sink.borrow_mut().push(snap));

                session.add_entry().unwrap();
                settle().await;
                assert!(seen.borrow().iter().any(|s| s.busy));
                assert!(!seen.borrow().last().expect("snapshots").busy);

                session.detach();
                let n = seen.borrow().len();
                session.refresh();
                settle().await;
                assert_eq!(seen.borrow().len(), n);
            })
            .await;
    }

    #[test]
    fn test_prune_dismissed_keeps_only_pending_ids() {
        let pending = |id: &str| PendingDeletion {
            id: id.to_string(),
            message: String::new(),
        };
        let mut dismissed = vec!["a".to_string(), "b".to_string()];
        assert!(!prune_dismissed(&mut dismissed, &[pending("a"), pending("b")]));
        assert!(prune_dismissed(&mut dismissed, &[pending("b")]));
        assert_eq!(dismissed, vec!["b"]);
        assert!(prune_dismissed(&mut dismissed, &[]));
        assert!(dismissed.is_empty());
    }

    #[test]
    fn test_pending_deletion_message_truncates() {
        let mut entry = Entry::placeholder("ann", 0);
        entry.id = "e1".to_string();
        entry.text = "x".repeat(40);
        let pending = PendingDeletion::for_entry(&entry);
        assert_eq!(pending.message, format!("Deleted: {}...", "x".repeat(25)));
    }
}
