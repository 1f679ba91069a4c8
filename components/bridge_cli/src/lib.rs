//! Bridge launcher library
//!
//! Argument parsing and the [`Launcher`] that hosts one environment over the
//! local file system.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod launcher;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use launcher::Launcher;
