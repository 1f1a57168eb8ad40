//! Tokio helpers shared by the workspace crates.

pub use tokio::{select, task, time, try_join};

pub mod sync {
    pub use tokio::sync::*;
}

use log::trace;
use std::future::Future;
use task::JoinHandle;

// Spawn a named task on the current runtime
// The name is only used for tracing
#[track_caller]
pub fn spawn_task<F>(name: impl Into<String>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let name = name.into();
    if log::log_enabled!(log::Level::Trace) {
        trace!("spawning task {}", name);
    }

    tokio::spawn(future)
}
