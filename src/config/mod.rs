use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:6689";
const DEFAULT_CHANNEL: &str = "voting";
const DEFAULT_LOG_LEVEL: &str = "info";

/// `API_URL` value that runs against an in-page store instead of a server.
pub(crate) const LOCAL_DEMO_URL: &str = "memory";

/// Deployment settings injected at runtime through `window.ENV`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct EnvConfig {
    pub api_url: String,
    pub channel: String,
    pub log_level: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl EnvConfig {
    pub fn from_window() -> Self {
        let mut cfg = Self::default();

        let Some(window) = web_sys::window() else {
            return cfg;
        };
        let Some(env) = window.get("ENV") else {
            return cfg;
        };
        if env.is_undefined() || !env.is_object() {
            return cfg;
        }

        // Both `API_URL` (README style) and `api_url` are accepted.
        let read = |upper: &str, lower: &str| -> Option<String> {
            [upper, lower].into_iter().find_map(|k| {
                js_sys::Reflect::get(&env, &k.into())
                    .ok()
                    .and_then(|v| v.as_string())
                    .filter(|s| !s.trim().is_empty())
            })
        };

        if let Some(v) = read("API_URL", "api_url") {
            cfg.api_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = read("CHANNEL", "channel") {
            cfg.channel = v;
        }
        if let Some(v) = read("LOG_LEVEL", "log_level") {
            cfg.log_level = v;
        }

        cfg
    }

    pub fn is_local_demo(&self) -> bool {
        self.api_url == LOCAL_DEMO_URL
    }

    pub fn channel_url(&self) -> String {
        format!(
            "{}/channels/{}",
            self.api_url,
            urlencoding::encode(&self.channel)
        )
    }
}

/// Timings of the optimistic session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SessionConfig {
    /// Idle time before an entry text edit is written.
    pub text_debounce: Duration,
    /// Idle time before a rename is attempted.
    pub username_debounce: Duration,
    /// How long a delete can be undone before it is sent.
    pub undo_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            text_debounce: Duration::from_millis(3000),
            username_debounce: Duration::from_millis(2000),
            undo_grace: Duration::from_millis(4000),
        }
    }
}
