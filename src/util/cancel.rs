//! Cooperative cancellation
//!
//! A single process-wide atomic cell, set by the termination-signal handler
//! and polled by the coordinator before fan-out, by workers at each index
//! fetch, and by the parser every 1000 lines. The flag is sticky for the
//! remainder of the process. The handler mutates only the one cell it
//! captured at installation time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Cloneable handle to the shared cancellation cell.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static HANDLER_FLAG: OnceLock<CancelFlag> = OnceLock::new();

extern "C" fn on_termination_signal(_signal: libc::c_int) {
    if let Some(flag) = HANDLER_FLAG.get() {
        flag.0.store(true, Ordering::SeqCst);
    }
}

/// Register SIGINT and SIGTERM handlers that set `flag`.
///
/// Installation happens once per process; later calls are no-ops so commands
/// invoked in sequence keep observing the same cell.
pub fn install_signal_handler(flag: &CancelFlag) {
    if HANDLER_FLAG.set(flag.clone()).is_err() {
        return;
    }

    let handler: extern "C" fn(libc::c_int) = on_termination_signal;
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_sticky_and_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
        assert!(flag.is_cancelled());
    }
}
