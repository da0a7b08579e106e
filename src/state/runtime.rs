use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub(crate) type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// The single-threaded event loop the session schedules onto.
///
/// Suspension points are network calls and the two kinds of timers.
pub(crate) trait Runtime {
    fn spawn(&self, task: LocalTask);
    fn sleep(&self, duration: Duration) -> LocalTask;
}

/// Browser microtask queue + `setTimeout`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BrowserRuntime;

impl Runtime for BrowserRuntime {
    fn spawn(&self, task: LocalTask) {
        leptos::task::spawn_local(task);
    }

    fn sleep(&self, duration: Duration) -> LocalTask {
        Box::pin(gloo_timers::future::sleep(duration))
    }
}

/// Current-thread tokio runtime; run inside a `LocalSet`.
#[cfg(all(test, not(target_arch = "wasm32")))]
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TokioRuntime;

#[cfg(all(test, not(target_arch = "wasm32")))]
impl Runtime for TokioRuntime {
    fn spawn(&self, task: LocalTask) {
        tokio::task::spawn_local(task);
    }

    fn sleep(&self, duration: Duration) -> LocalTask {
        Box::pin(tokio::time::sleep(duration))
    }
}
