//! Shutdown signal that tests trigger by hand.

use std::sync::{Arc, Condvar, Mutex};

use crate::process::{ShutdownError, ShutdownSignal};

/// Blocks `wait` until [`ManualShutdownSignal::trigger`] is called.
#[derive(Clone, Default)]
pub struct ManualShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ManualShutdownSignal {
    /// Releases every current and future waiter.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for ManualShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}
