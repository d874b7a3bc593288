//! Process-level shutdown requests.
//!
//! SIGINT and SIGTERM set a flag the acceptor polls between accepts; the
//! handler itself does nothing else, so it stays async-signal-safe.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

static REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn flag() -> &'static AtomicBool {
    &REQUESTED
}

pub fn install() -> Result<()> {
    install_platform_handlers().context("failed to install shutdown signal handlers")?;
    tracing::debug!("Shutdown signal handlers installed");
    Ok(())
}

#[cfg(unix)]
extern "C" fn on_shutdown_signal(_signal: libc::c_int) {
    REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_platform_handlers() -> io::Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: `action` is fully initialized before use, and the handler
        // only performs an atomic store.
        let rc = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_shutdown_signal as extern "C" fn(libc::c_int) as usize;
            libc::sigemptyset(&raw mut action.sa_mask);
            libc::sigaction(signal, &raw const action, std::ptr::null_mut())
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_platform_handlers() -> io::Result<()> {
    Ok(())
}
