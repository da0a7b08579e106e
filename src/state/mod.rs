pub(crate) mod busy;
pub(crate) mod debounce;
pub(crate) mod entries;
pub(crate) mod runtime;
pub(crate) mod session;
pub(crate) mod trash;

use crate::api::ApiClient;
use crate::config::{EnvConfig, SessionConfig};
use crate::state::runtime::BrowserRuntime;
use crate::state::session::{SessionSnapshot, VotingSession};
use crate::storage::{CookieStorage, UserContext, UsernameStorage};
use crate::store::{MemoryStore, RecordStore};
use leptos::prelude::*;
use leptos::task::spawn_local;
use std::rc::Rc;

#[derive(Clone, Copy)]
pub(crate) struct AppState {
    pub env: StoredValue<EnvConfig>,
    pub session_config: SessionConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            env: StoredValue::new(EnvConfig::from_window()),
            session_config: SessionConfig::default(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct AppContext(pub AppState);

/// Where entries live: the HTTP API, or an in-page store for local demos.
enum Backend {
    Remote(Rc<ApiClient>),
    Local(Rc<MemoryStore>),
}

impl Backend {
    fn from_env(env: &EnvConfig) -> Self {
        if env.is_local_demo() {
            Self::Local(Rc::new(MemoryStore::new()))
        } else {
            Self::Remote(Rc::new(ApiClient::new(env.api_url.clone())))
        }
    }

    fn store(&self) -> Rc<dyn RecordStore> {
        match self {
            Self::Remote(client) => client.clone(),
            Self::Local(store) => store.clone(),
        }
    }
}

/// A page's voting session plus the signal its view renders from.
#[derive(Clone, Copy)]
pub(crate) struct SessionHandle {
    pub snapshot: RwSignal<SessionSnapshot>,
    session: StoredValue<VotingSession, LocalStorage>,
}

impl SessionHandle {
    pub fn open(env: &EnvConfig, config: SessionConfig) -> Self {
        let backend = Backend::from_env(env);
        let user = UserContext::load(Box::new(CookieStorage));
        let session = VotingSession::new(backend.store(), Rc::new(BrowserRuntime), user, config);

        let snapshot = RwSignal::new(session.snapshot());
        session.set_on_change(move |snap| snapshot.set(snap));

        let handle = Self {
            snapshot,
            session: StoredValue::new_local(session),
        };
        if let Backend::Local(store) = backend {
            handle.attach_local(store);
        }
        handle
    }

    /// The in-page store publishes straight into the session.
    fn attach_local(&self, store: Rc<MemoryStore>) {
        let handle = *self;
        store.subscribe(move |id| {
            handle.with(|s| s.on_entry_changed(id));
        });

        // A fresh store does not know the remembered name yet.
        let username = CookieStorage.load().unwrap_or_default();
        if !username.is_empty() {
            spawn_local(async move {
                if let Err(e) = store.claim_username(&username, "").await {
                    tracing::warn!(error = %e, "local demo user setup failed");
                }
            });
        }
    }

    /// `None` once the owning view is gone.
    pub fn with<R>(&self, f: impl FnOnce(&VotingSession) -> R) -> Option<R> {
        self.session.try_with_value(f)
    }

    pub fn close(&self) {
        self.with(|s| s.detach());
    }
}
