//! Configuration management
//!
//! Values come from three places, highest priority first: command-line flags
//! (and their environment variables), an optional TOML file given with
//! `--config`, then built-in defaults. A missing password is prompted for when
//! a terminal is attached.

use crate::types::{Direction, SyncError, TransportKind};
use clap::{Args, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base polling interval (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Longest accepted base interval (one day, in seconds)
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Name of the per-session log directory inside the local root
pub const LOG_DIR_NAME: &str = "logs";

/// Command-line interface
#[derive(Debug, Parser)]
#[command(name = "mirrorwatch", version, about = "Mirror a folder to or from an SFTP/FTP server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors; hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a mirroring session
    Run(RunArgs),

    /// List the folders of a remote directory
    Browse(BrowseArgs),
}

/// Connection flags shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// TOML file providing any of the settings below
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Remote protocol
    #[arg(long, value_enum)]
    pub protocol: Option<TransportKind>,

    /// Server host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (22 for SFTP, 21 for FTP)
    #[arg(long)]
    pub port: Option<u16>,

    /// Login name
    #[arg(short, long)]
    pub user: Option<String>,

    /// Login password
    #[arg(long, env = "MIRRORWATCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Remote directory to mirror
    #[arg(long)]
    pub remote: Option<String>,

    /// Local directory to mirror
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Base polling interval in seconds (60, 300, 1200, 3600 or any other value)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Which side is authoritative
    #[arg(long, value_enum)]
    pub direction: Option<Direction>,

    /// Glob patterns for filenames to ignore (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct BrowseArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Remote directory to list
    #[arg(default_value = "/")]
    pub path: String,
}

/// Settings read from a `--config` TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub protocol: Option<TransportKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub remote_root: Option<String>,
    pub local_root: Option<PathBuf>,
    pub interval: Option<u64>,
    pub direction: Option<Direction>,
    pub exclude: Vec<String>,
}

impl FileConfig {
    /// Load and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            SyncError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }
}

/// Where and how to connect
#[derive(Clone)]
pub struct Endpoint {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Endpoint {
    /// `host:port` for log lines
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Immutable configuration of one sync session
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server connection
    pub endpoint: Endpoint,

    /// Remote directory (absolute, `/`-separated)
    pub remote_root: String,

    /// Local directory
    pub local_root: PathBuf,

    /// Ceiling of the adaptive poll interval, and cadence of the local safety-net scan
    pub base_interval: Duration,

    /// Which side is authoritative
    pub direction: Direction,

    /// Filename globs that are never mirrored
    pub exclude: Vec<String>,

    /// Hide progress bars
    pub quiet: bool,
}

impl SyncConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(SyncError::Config("Server host is required".to_string()));
        }

        if self.endpoint.username.trim().is_empty() {
            return Err(SyncError::Config("Username is required".to_string()));
        }

        if !self.remote_root.starts_with('/') {
            return Err(SyncError::Config(format!(
                "Remote folder must be an absolute path: {}",
                self.remote_root
            )));
        }

        if self.local_root.as_os_str().is_empty() {
            return Err(SyncError::Config("Local folder is required".to_string()));
        }

        if self.direction == Direction::LocalToRemote && !self.local_root.is_dir() {
            return Err(SyncError::Config(format!(
                "Local folder does not exist: {:?}",
                self.local_root
            )));
        }

        if self.base_interval.is_zero() {
            return Err(SyncError::Config(
                "Interval must be at least 1 second".to_string(),
            ));
        }

        if self.base_interval > Duration::from_secs(MAX_INTERVAL_SECS) {
            return Err(SyncError::Config(format!(
                "Interval must be at most {} seconds (one day)",
                MAX_INTERVAL_SECS
            )));
        }

        NameFilter::new(&self.exclude)?;
        Ok(())
    }

    /// Compile the exclude patterns
    pub fn name_filter(&self) -> Result<NameFilter, SyncError> {
        NameFilter::new(&self.exclude)
    }
}

impl TryFrom<RunArgs> for SyncConfig {
    type Error = SyncError;

    fn try_from(args: RunArgs) -> Result<Self, Self::Error> {
        let file = args.connection.file_config()?;
        let endpoint = args.connection.resolve(&file)?;

        let remote_root = args
            .remote
            .or(file.remote_root)
            .ok_or_else(|| SyncError::Config("Remote folder is required (--remote)".to_string()))?;
        let local_root = args
            .local
            .or(file.local_root)
            .ok_or_else(|| SyncError::Config("Local folder is required (--local)".to_string()))?;
        let interval = args.interval.or(file.interval).unwrap_or(DEFAULT_INTERVAL_SECS);

        let mut exclude = file.exclude;
        exclude.extend(args.exclude);

        let config = SyncConfig {
            endpoint,
            remote_root: normalize_remote(&remote_root),
            local_root,
            base_interval: Duration::from_secs(interval),
            direction: args.direction.or(file.direction).unwrap_or_default(),
            exclude,
            quiet: false,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ConnectionArgs {
    /// Load the `--config` file, or defaults when none was given
    pub fn file_config(&self) -> Result<FileConfig, SyncError> {
        match &self.config {
            Some(path) => FileConfig::load(path),
            None => Ok(FileConfig::default()),
        }
    }

    /// Merge flags over file values and fill in the secret
    pub fn resolve(&self, file: &FileConfig) -> Result<Endpoint, SyncError> {
        let kind = self.protocol.or(file.protocol).unwrap_or_default();
        let host = self
            .host
            .clone()
            .or_else(|| file.host.clone())
            .ok_or_else(|| SyncError::Config("Server host is required (--host)".to_string()))?;
        let username = self
            .user
            .clone()
            .or_else(|| file.username.clone())
            .ok_or_else(|| SyncError::Config("Username is required (--user)".to_string()))?;
        let port = self.port.or(file.port).unwrap_or(kind.default_port());

        let secret = match self.password.clone().or_else(|| file.password.clone()) {
            Some(secret) => secret,
            None => prompt_secret(&username, &host)?,
        };

        Ok(Endpoint {
            kind,
            host,
            port,
            username,
            secret,
        })
    }
}

fn prompt_secret(username: &str, host: &str) -> Result<String, SyncError> {
    if !console::user_attended_stderr() {
        return Err(SyncError::Config(
            "Password is required (--password or MIRRORWATCH_PASSWORD)".to_string(),
        ));
    }

    let term = console::Term::stderr();
    term.write_str(&format!("Password for {}@{}: ", username, host))?;
    Ok(term.read_secure_line()?)
}

/// Normalize a remote folder to `/`-separated form without a trailing slash
pub fn normalize_remote(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Filename exclusion rules
#[derive(Debug, Clone)]
pub struct NameFilter {
    globs: GlobSet,
}

impl NameFilter {
    /// Compile exclusion globs
    pub fn new(patterns: &[String]) -> Result<Self, SyncError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                SyncError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| SyncError::Config(format!("Invalid exclude patterns: {}", e)))?;
        Ok(Self { globs })
    }

    /// A filter that lets everything through
    pub fn allow_all() -> Self {
        Self {
            globs: GlobSet::empty(),
        }
    }

    /// Check whether a filename must be skipped
    pub fn is_excluded(&self, name: &str) -> bool {
        name == "." || name == ".." || name == LOG_DIR_NAME || self.globs.is_match(name)
    }
}

impl Default for NameFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}
