//! Engine-side plumbing for ostinato: the backend trait, the lifecycle
//! state machine, and the message channel between the control side and
//! the audio runtime.

pub mod backend;
pub mod channel;
mod manager;

pub use backend::{Backend, BackendError, NullBackend, TelemetrySender};
pub use channel::{EngineHandle, Listener};
pub use manager::FatalHandler;
