//! Lifecycle bookkeeping shared between the control side and the engine
//! thread.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use ostinato_types::error::EngineError;
use ostinato_types::message::BackendState;

/// One-shot latched signal. The engine thread sets the result exactly once
/// per start or stop sequence; any number of waiters observe it, before or
/// after the fact.
pub(crate) struct Signal {
    slot: Mutex<Option<Result<(), EngineError>>>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn set(&self, result: Result<(), EngineError>) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(result);
            self.cond.notify_all();
        }
    }

    pub(crate) fn wait(&self, timeout: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + timeout;
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::Timeout(timeout));
            }
            let (guard, wait_result) = match self.cond.wait_timeout(slot, deadline - now) {
                Ok(pair) => pair,
                Err(poisoned) => {
                    let pair = poisoned.into_inner();
                    (pair.0, pair.1)
                }
            };
            slot = guard;
            if wait_result.timed_out() && slot.is_none() {
                return Err(EngineError::Timeout(timeout));
            }
        }
    }
}

/// Called when a forced stop after a crash itself fails. There is nobody
/// left waiting on the stop at that point, so the error has to go somewhere
/// out of band.
pub type FatalHandler = Box<dyn Fn(&EngineError) + Send + Sync>;

pub(crate) struct LifecycleState {
    pub(crate) state: Mutex<BackendState>,
    pub(crate) fatal: Mutex<FatalHandler>,
}

impl LifecycleState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState::Stopped),
            fatal: Mutex::new(Box::new(|err| {
                log::error!(target: "engine", "fatal engine error: {err}");
            })),
        })
    }

    pub(crate) fn get(&self) -> BackendState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn set(&self, next: BackendState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state != next {
            log::info!(target: "engine", "backend state: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    pub(crate) fn report_fatal(&self, err: &EngineError) {
        let fatal = match self.fatal.lock() {
            Ok(fatal) => fatal,
            Err(poisoned) => poisoned.into_inner(),
        };
        fatal(err);
    }

    pub(crate) fn set_fatal_handler(&self, handler: FatalHandler) {
        let mut fatal = match self.fatal.lock() {
            Ok(fatal) => fatal,
            Err(poisoned) => poisoned.into_inner(),
        };
        *fatal = handler;
    }
}
