//! Change notifications from the server and the page visibility trigger.

use leptos::ev;
use leptos_dom::helpers::{window_event_listener, WindowListenerHandle};
use serde::Deserialize;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

/// Server-side event name carrying an entry id.
pub(crate) const UPDATE_EVENT: &str = "update";

/// "Entry `0` changed somewhere": created, edited, voted on or deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EntryChanged(pub String);

#[derive(Deserialize)]
struct UpdatePayload {
    id: String,
}

impl EntryChanged {
    /// Accepts either the bare id or `{"id": "..."}`.
    pub fn parse(data: &str) -> Option<Self> {
        let data = data.trim();
        let id = if data.starts_with('{') {
            serde_json::from_str::<UpdatePayload>(data).ok()?.id
        } else {
            data.trim_matches('"').to_string()
        };
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self(id.to_string()))
    }
}

/// Open subscription to the broadcast channel. Closed on `close` or drop.
pub(crate) struct ChannelSubscription {
    source: web_sys::EventSource,
    _on_update: Closure<dyn FnMut(web_sys::MessageEvent)>,
}

impl ChannelSubscription {
    pub fn close(&self) {
        self.source.close();
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// Listens on `url` and hands every changed entry id to `on_changed`.
pub(crate) fn subscribe_channel(
    url: &str,
    on_changed: impl Fn(EntryChanged) + 'static,
) -> Result<ChannelSubscription, String> {
    let source = web_sys::EventSource::new(url).map_err(|e| format!("{e:?}"))?;

    let on_update = Closure::wrap(Box::new(move |ev: web_sys::MessageEvent| {
        match ev.data().as_string().and_then(|d| EntryChanged::parse(&d)) {
            Some(changed) => on_changed(changed),
            None => tracing::debug!("ignoring malformed update event"),
        }
    }) as Box<dyn FnMut(web_sys::MessageEvent)>);

    source
        .add_event_listener_with_callback(UPDATE_EVENT, on_update.as_ref().unchecked_ref())
        .map_err(|e| format!("{e:?}"))?;

    tracing::info!(%url, "subscribed to change channel");
    Ok(ChannelSubscription {
        source,
        _on_update: on_update,
    })
}

fn document_visible() -> bool {
    web_sys::window()
        .and_then(|w| w.document())
        .map(|d| d.visibility_state() == web_sys::VisibilityState::Visible)
        .unwrap_or(false)
}

/// Calls `on_visible` each time the page goes from hidden to visible.
pub(crate) fn on_visible(on_visible: impl Fn() + 'static) -> WindowListenerHandle {
    window_event_listener(ev::visibilitychange, move |_ev: web_sys::Event| {
        if document_visible() {
            on_visible();
        }
    })
}
