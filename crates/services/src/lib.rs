#![forbid(unsafe_code)]

pub mod error;
pub mod ports;
mod schedule;
pub mod sessions;
pub mod settings;

pub use quiz_core::Clock;

pub use error::{InitializationError, PageLoadError, SessionError};
pub use ports::{ConfirmationPort, ConfirmationRequest, FixedConfirmation, SessionNotification};
pub use sessions::{InFlightOperation, SessionController, SessionState, SessionView};
pub use settings::SessionSettings;
