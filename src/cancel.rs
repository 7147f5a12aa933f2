//! Cooperative stop conditions.
//!
//! The session driver polls its stop condition once per iteration, after the
//! frame has been handled. Nothing interrupts an iteration in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// Polled once per iteration; returning true ends the session gracefully.
pub trait StopCondition {
    fn should_stop(&mut self) -> bool;
}

impl<F> StopCondition for F
where
    F: FnMut() -> bool,
{
    fn should_stop(&mut self) -> bool {
        self()
    }
}

/// Never requests a stop; the session runs until end of stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunToEnd;

impl StopCondition for RunToEnd {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Shared cancel signal. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that is raised on SIGINT (Ctrl-C).
    ///
    /// Can only be installed once per process.
    pub fn install_ctrlc() -> Result<Self> {
        let flag = Self::new();
        let handler_flag = flag.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received; stopping after the current frame");
            handler_flag.cancel();
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
        Ok(flag)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl StopCondition for CancelFlag {
    fn should_stop(&mut self) -> bool {
        self.is_cancelled()
    }
}
