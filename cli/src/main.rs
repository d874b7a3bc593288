//! Courier daemon - binary entry point.
//!
//! ```text
//! main() -> init_tracing -> CourierConfig::load -> resolve(env)
//!        -> apply [log].filter -> ThreadManager (shared by Arc)
//!        -> Server::run until SIGINT/SIGTERM
//! ```
//!
//! Each connection gets a session thread that reads one JSON request line and
//! dispatches it to an account API handler on a thread of its own. Threads
//! are reaped as they finish; on shutdown the rest are cancelled and joined.

mod server;
mod shutdown;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use courier_config::{CourierConfig, DEFAULT_LOG_FILTER, EnvOverrides, Settings};
use courier_dispatch::{AccountStore, MemoryAccountStore};
use courier_thread::ThreadManager;

use crate::server::Server;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Installed before the config is read so that loading can log.
///
/// Returns a handle for swapping in the configured filter, or `None` when
/// `RUST_LOG` is set and wins over the config.
fn init_tracing() -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (filter, handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
    (!pinned).then_some(handle)
}

fn apply_log_filter(handle: &FilterHandle, directives: &str) {
    let filter = match EnvFilter::try_new(directives) {
        Ok(filter) => filter,
        Err(err) => {
            tracing::warn!(filter = directives, "Ignoring invalid log filter: {err}");
            return;
        }
    };
    if let Err(err) = handle.reload(filter) {
        tracing::warn!(filter = directives, "Failed to apply log filter: {err}");
    }
}

fn load_settings() -> Result<Settings> {
    let config = CourierConfig::load()
        .context("failed to load configuration")?
        .unwrap_or_default();
    config
        .resolve(&EnvOverrides::from_env())
        .context("invalid configuration")
}

fn main() -> Result<()> {
    let filter = init_tracing();
    let settings = load_settings().inspect_err(|err| tracing::error!("{err:#}"))?;
    if let Some(handle) = &filter {
        apply_log_filter(handle, &settings.log_filter);
    }
    shutdown::install()?;

    let manager = Arc::new(ThreadManager::new(settings.threads.clone()));
    let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    let server = Server::bind(settings.listen, Arc::clone(&manager), accounts)
        .with_context(|| format!("failed to listen on {}", settings.listen))?;

    tracing::info!(
        listen = %settings.listen,
        stack_size = %settings.threads.stack_size,
        "Courier listening"
    );
    let stats = server.run(shutdown::flag());

    let attributes = manager.attribute_stats();
    tracing::info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        handled = stats.handled,
        failed = stats.failed,
        attributes_outstanding = attributes.outstanding(),
        live_threads = manager.live_threads(),
        "Courier stopped"
    );
    Ok(())
}
