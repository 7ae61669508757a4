pub mod config;
pub mod console;
pub mod error;
pub mod guard;
pub mod interrupt;
pub mod patterns;
pub mod verify;

pub use config::{BootConfig, LaunchCommand};
pub use error::BootError;
pub use guard::Shutdown;
pub use interrupt::Interrupt;
pub use patterns::SuccessPatterns;
pub use verify::{run_boot_test, BootVerifier, Outcome, Report};
