use clap::Parser;
use config::{Config, ConfigError, File};
use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{
    error::{RelayError, Result},
    types::LogLevel,
};

/// Server used when neither a flag nor the config file names one
pub const DEFAULT_SOCKET_SERVER_URL: &str = "http://localhost:8080";

/// Workout distance used by `--auto-start`
pub const DEFAULT_AUTO_START_DISTANCE: u32 = 500;

/// Directory searched for `default.*` and `local.*` config files
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Command line arguments
///
/// The short and long spellings of the string options are separate
/// arguments: when both are given, the short one wins.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "rowrelay",
    version,
    about = "Relay rowing-machine stroke data to a race server."
)]
pub struct Cli {
    /// Rower display name
    #[arg(short = 'n', value_name = "NAME")]
    pub short_name: Option<String>,

    /// Rower display name
    #[arg(long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Race server URL
    #[arg(short = 's', value_name = "URL")]
    pub short_socket_server_url: Option<String>,

    /// Race server URL
    #[arg(long = "socket-server-url", value_name = "URL")]
    pub socket_server_url: Option<String>,

    /// Generate synthetic strokes instead of waiting for hardware
    #[arg(short = 'm', long = "simulation-mode")]
    pub simulation_mode: bool,

    /// Start a workout immediately instead of waiting for the server
    #[arg(short = 'a', long = "auto-start")]
    pub auto_start: bool,

    /// Randomly boost the reported distance
    #[arg(short = 'b', long = "boost")]
    pub boost: bool,

    /// Workout distance in meters used by --auto-start
    #[arg(long = "auto-start-distance", value_name = "METERS")]
    pub auto_start_distance: Option<u32>,

    /// Lowest severity written to the console
    #[arg(short = 'l', long = "log-level", value_enum, env = "ROWRELAY_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Extra config file, read after config/default and config/local
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    fn name(&self) -> Option<&str> {
        self.short_name.as_deref().or(self.name.as_deref())
    }

    fn socket_server_url(&self) -> Option<&str> {
        self.short_socket_server_url
            .as_deref()
            .or(self.socket_server_url.as_deref())
    }
}

/// Settings read from config files
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSettings {
    /// Rower display name
    pub name: Option<String>,
    /// Race server URL
    #[serde(alias = "socketserverurl")]
    pub socket_server_url: Option<String>,
    /// Simulation mode
    #[serde(alias = "simulationmode")]
    pub simulation_mode: Option<bool>,
    /// Auto-start
    #[serde(alias = "autostart")]
    pub auto_start: Option<bool>,
    /// Auto-start workout distance
    #[serde(alias = "autostartdistance")]
    pub auto_start_distance: Option<u32>,
    /// Boost
    pub boost: Option<bool>,
    /// Console log level
    #[serde(alias = "loglevel")]
    pub log_level: Option<LogLevel>,
}

impl FileSettings {
    /// Load `config/default.*`, `config/local.*` and an optional explicit file
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if a file is malformed or the explicit
    /// file does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_DIR), explicit)
    }

    /// Load config files from `dir`, then `explicit`
    ///
    /// Later sources override earlier ones. Missing `default`/`local` files
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if a file is malformed or the explicit
    /// file does not exist.
    pub fn load_from(dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        for stem in ["default", "local"] {
            let path = dir.join(stem);
            builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(false));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Resolved process settings, fixed for the lifetime of the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Rower display name
    pub name: String,
    /// Race server URL
    pub socket_server_url: String,
    /// Whether the rower generates synthetic strokes
    pub simulation_mode: bool,
    /// Whether a workout starts without waiting for the server
    pub auto_start: bool,
    /// Workout distance in meters for auto-start
    pub auto_start_distance: u32,
    /// Whether the boost timer runs
    pub boost: bool,
    /// Lowest severity written to the console
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: rower_name(0),
            socket_server_url: DEFAULT_SOCKET_SERVER_URL.to_string(),
            simulation_mode: false,
            auto_start: false,
            auto_start_distance: DEFAULT_AUTO_START_DISTANCE,
            boost: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Parse config files named by `cli` and resolve the final settings
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if config files cannot be read or a
    /// resolved value is invalid.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = FileSettings::load(cli.config.as_deref())?;
        Self::resolve(cli, &file, &mut rand::rng())
    }

    /// Merge flags over file settings over defaults
    ///
    /// Boolean flags can only switch a setting on; when absent, the file
    /// value applies. `rng` picks the generated name when none is given.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the auto-start distance is zero.
    pub fn resolve<R: Rng + ?Sized>(cli: &Cli, file: &FileSettings, rng: &mut R) -> Result<Self> {
        let name = cli
            .name()
            .map(str::to_string)
            .or_else(|| file.name.clone())
            .unwrap_or_else(|| random_rower_name(rng));

        let socket_server_url = cli
            .socket_server_url()
            .map(str::to_string)
            .or_else(|| file.socket_server_url.clone())
            .unwrap_or_else(|| DEFAULT_SOCKET_SERVER_URL.to_string());

        let auto_start_distance = cli
            .auto_start_distance
            .or(file.auto_start_distance)
            .unwrap_or(DEFAULT_AUTO_START_DISTANCE);
        if auto_start_distance == 0 {
            return Err(RelayError::Config(ConfigError::Message(
                "autoStartDistance must be greater than zero".to_string(),
            )));
        }

        Ok(Self {
            name,
            socket_server_url,
            simulation_mode: cli.simulation_mode || file.simulation_mode.unwrap_or(false),
            auto_start: cli.auto_start || file.auto_start.unwrap_or(false),
            auto_start_distance,
            boost: cli.boost || file.boost.unwrap_or(false),
            log_level: cli.log_level.or(file.log_level).unwrap_or_default(),
        })
    }
}

/// Display name for rower number `number`, zero-padded to four digits
#[must_use]
pub fn rower_name(number: u16) -> String {
    format!("Rower{number:04}")
}

/// Random `Rower####` display name
pub fn random_rower_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    rower_name(rng.random_range(0..10_000))
}
