pub mod events;
pub mod guard;
pub mod handler;
pub mod protocol;
pub mod scheduler;
pub mod state;

// Re-export the console entry points for the binary.
pub use handler::{handle_client_message, run_console};
pub use scheduler::TokioScheduler;
pub use state::{AppState, ConsoleSession};
