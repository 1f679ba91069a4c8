//! Hosts one environment for the command line
//!
//! The launcher has no host object model of its own ([`NullHost`]), so the
//! modules it runs are limited to data and built-in namespaces.

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use bridge::{Environment, EnvironmentParams, NativeFileSystem, NullHost, Statistics};
use log::{debug, LevelFilter};
use serde_json::Value;
use std::rc::Rc;

/// Length of one `--frames` step in milliseconds.
pub const FRAME_MSECS: u64 = 16;

/// An environment over the local file system.
pub struct Launcher {
    env: Rc<Environment>,
}

impl Launcher {
    /// Creates a launcher with the given parameters.
    ///
    /// # Example
    /// ```
    /// use bridge::EnvironmentParams;
    /// use bridge_cli::Launcher;
    ///
    /// let launcher = Launcher::new(EnvironmentParams::default()).unwrap();
    /// assert_eq!(launcher.statistics().modules, 0);
    /// ```
    pub fn new(params: EnvironmentParams) -> CliResult<Self> {
        let env = Environment::new(params, Rc::new(NullHost), Rc::new(NativeFileSystem))?;
        env.init();
        Ok(Self { env })
    }

    /// Creates a launcher from parsed arguments.
    ///
    /// Search paths given on the command line are appended to those of the
    /// config file; with neither, the current directory is searched.
    pub fn from_cli(cli: &Cli) -> CliResult<Self> {
        let mut params = match &cli.config {
            Some(path) => EnvironmentParams::from_json_file(path)?,
            None => EnvironmentParams::default(),
        };
        params.search_paths.extend(cli.search_paths.iter().cloned());
        if params.search_paths.is_empty() {
            params.search_paths.push(".".to_string());
        }
        debug!("search paths: {:?}", params.search_paths);
        Self::new(params)
    }

    /// Loads `module` and returns its exports as JSON.
    ///
    /// Runs `frames` update steps after loading. Exports with no JSON form
    /// (functions, symbols) come out as `null`.
    pub fn run(&self, module: &str, frames: u32) -> CliResult<Value> {
        let module_id = self.env.load(module)?;
        for _ in 0..frames {
            self.env.update(FRAME_MSECS);
        }
        let exports = self.env.module_exports(module_id).unwrap_or_default();
        Ok(self.env.engine().to_json(&exports).unwrap_or(Value::Null))
    }

    /// Current environment counters.
    pub fn statistics(&self) -> Statistics {
        self.env.get_statistics()
    }

    /// The hosted environment.
    pub fn environment(&self) -> &Rc<Environment> {
        &self.env
    }
}

/// Parses a `--log-level` value.
pub fn parse_log_level(level: &str) -> CliResult<LevelFilter> {
    level
        .parse()
        .map_err(|_| CliError::InvalidLogLevel(level.to_string()))
}
