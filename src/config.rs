//! Server configuration.
//!
//! Settings come from an XML configuration file - the format RLCP
//! deployments already carry - overridden by command-line arguments where
//! they overlap. An unreadable or malformed file is not fatal: the built-in
//! defaults (port 3000, one `user`/`user` account, 20 s flow deadline, 10 s
//! unit deadline) are loaded instead.
//!
//! ```xml
//! <RlcpServerConfig>
//!   <Port value="3000"/>
//!   <RequestFlowTimeLimit value="20"/>
//!   <CheckUnitTimeLimit value="10"/>
//!   <UserInfo login="user" password="user"/>
//! </RlcpServerConfig>
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::warn;

use crate::xml::{Document, Element, XmlError};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REQUEST_FLOW_TIME_LIMIT: Duration = Duration::from_secs(20);
pub const DEFAULT_CHECK_UNIT_TIME_LIMIT: Duration = Duration::from_secs(10);

/// Command-line arguments for the server binary.
#[derive(Parser, Debug)]
#[command(name = "rlcp-server")]
#[command(version = "0.1.0")]
#[command(about = "An RLCP grading server", long_about = None)]
pub struct CliArgs {
    /// Path to the XML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// One account allowed to use the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub password: String,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.login, self.password)
    }
}

/// Resolved server configuration, read-only once the server starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Empty list means public access: any credentials are accepted.
    pub users: Vec<User>,
    /// Deadline for processing one whole request.
    pub request_flow_time_limit: Duration,
    /// Default deadline for one check unit, used when a condition carries no
    /// positive time limit of its own.
    pub check_unit_time_limit: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: DEFAULT_PORT,
            users: vec![User {
                login: "user".to_string(),
                password: "user".to_string(),
            }],
            request_flow_time_limit: DEFAULT_REQUEST_FLOW_TIME_LIMIT,
            check_unit_time_limit: DEFAULT_CHECK_UNIT_TIME_LIMIT,
        }
    }
}

impl Config {
    pub fn is_public(&self) -> bool {
        self.users.is_empty()
    }

    /// Resolves the configuration: file if given (defaults on failure), then
    /// CLI overrides.
    pub fn load(cli: &CliArgs) -> Config {
        let mut config = match &cli.config {
            Some(path) => Config::read_file(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "config file not loaded, using defaults");
                Config::default()
            }),
            None => Config::default(),
        };
        if let Some(port) = cli.port {
            config.port = port;
        }
        config
    }

    pub fn read_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Config::parse_xml(&contents)
    }

    pub fn parse_xml(contents: &str) -> Result<Config, ConfigError> {
        let document = Document::parse(contents)?;
        let root = &document.root;

        let port = required_value(root, "Port")?
            .parse()
            .map_err(|_| ConfigError::BadNumber("Port"))?;
        let request_flow_time_limit = optional_seconds(root, "RequestFlowTimeLimit")?
            .unwrap_or(DEFAULT_REQUEST_FLOW_TIME_LIMIT);
        let check_unit_time_limit =
            optional_seconds(root, "CheckUnitTimeLimit")?.unwrap_or(DEFAULT_CHECK_UNIT_TIME_LIMIT);

        let mut users = Vec::new();
        for element in root.descendants("UserInfo") {
            users.push(User {
                login: required_attr(element, "UserInfo", "login")?.to_string(),
                password: required_attr(element, "UserInfo", "password")?.to_string(),
            });
        }

        Ok(Config {
            port,
            users,
            request_flow_time_limit,
            check_unit_time_limit,
        })
    }
}

fn required_attr<'a>(
    element: &'a Element,
    element_name: &'static str,
    attribute: &'static str,
) -> Result<&'a str, ConfigError> {
    element
        .attr(attribute)
        .ok_or(ConfigError::MissingField(element_name))
}

fn required_value<'a>(root: &'a Element, name: &'static str) -> Result<&'a str, ConfigError> {
    let element = root.descendant(name).ok_or(ConfigError::MissingField(name))?;
    required_attr(element, name, "value")
}

fn optional_seconds(root: &Element, name: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(element) = root.descendant(name) else {
        return Ok(None);
    };
    let value = required_attr(element, name, "value")?;
    let seconds: u64 = value.parse().map_err(|_| ConfigError::BadNumber(name))?;
    Ok(Some(Duration::from_secs(seconds)))
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("failed to parse config file: {0}")]
    Xml(#[from] XmlError),

    #[error("missing {0} in config file")]
    MissingField(&'static str),

    #[error("{0} value is not a number")]
    BadNumber(&'static str),
}
