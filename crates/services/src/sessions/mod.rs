mod actor;
mod autosave;
mod controller;
mod loader;
mod state;
mod timer;
mod view;

// Public API of the attempt session subsystem.
pub use crate::error::{InitializationError, PageLoadError, SessionError};
pub use controller::SessionController;
pub use state::{InFlightOperation, SessionState};
pub use view::SessionView;
