use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use ws::{BackpressurePolicy, HubOptions};

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full origin URLs allowed to receive server responses and to
    /// open WebSocket connections.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Accept WebSocket upgrades from any origin. This disables cross-site
    /// WebSocket protection and must be opted into explicitly.
    #[arg(long, env, default_value_t = false)]
    pub ws_allow_any_origin: bool,

    /// Messages buffered per WebSocket connection before backpressure applies
    #[arg(long, env, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..))]
    pub ws_queue_capacity: u32,

    /// What to do when a connection's outbound queue is full
    #[arg(
        long,
        env,
        default_value_t = BackpressurePolicy::Disconnect,
        value_parser = clap::builder::PossibleValuesParser::new(["disconnect", "drop-newest"])
            .map(|s| s.parse::<BackpressurePolicy>().unwrap()),
    )]
    pub ws_backpressure: BackpressurePolicy,

    /// Seconds a single WebSocket write may take before the peer is dropped
    #[arg(long, env, default_value_t = 10)]
    pub ws_write_timeout_secs: u64,

    /// Seconds between keepalive pings, 0 disables them
    #[arg(long, env, default_value_t = 30)]
    pub ws_ping_interval_secs: u64,

    /// Seconds to wait for open connections to drain on shutdown
    #[arg(long, env, default_value_t = 15)]
    pub shutdown_timeout_secs: u64,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            queue_capacity: self.ws_queue_capacity as usize,
            backpressure: self.ws_backpressure,
            write_timeout: Duration::from_secs(self.ws_write_timeout_secs),
            ping_interval: match self.ws_ping_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Whether a WebSocket upgrade carrying this `Origin` header may proceed.
    ///
    /// Requests without an `Origin` header come from non-browser clients and
    /// are not subject to cross-site checks.
    pub fn is_ws_origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.ws_allow_any_origin => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin.trim_end_matches('/')),
        }
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("post_feed").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 4000);
        assert_eq!(config.interface(), "127.0.0.1");
        assert!(!config.ws_allow_any_origin);
        assert_eq!(config.ws_backpressure, BackpressurePolicy::Disconnect);
        assert_eq!(config.runtime_env(), RustEnv::Development);
    }

    #[test]
    fn test_hub_options_from_flags() {
        let config = parse(&[
            "--ws-queue-capacity",
            "8",
            "--ws-backpressure",
            "drop-newest",
            "--ws-write-timeout-secs",
            "3",
            "--ws-ping-interval-secs",
            "0",
        ]);
        let options = config.hub_options();
        assert_eq!(options.queue_capacity, 8);
        assert_eq!(options.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(options.write_timeout, Duration::from_secs(3));
        assert_eq!(options.ping_interval, None);
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        let result = Config::try_parse_from(["post_feed", "--ws-queue-capacity", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_origin_allow_list() {
        let config = parse(&["--allowed-origins", "https://app.example.com,http://localhost:3000"]);
        assert!(config.is_ws_origin_allowed(Some("https://app.example.com")));
        assert!(config.is_ws_origin_allowed(Some("https://app.example.com/")));
        assert!(!config.is_ws_origin_allowed(Some("https://evil.example.com")));
        assert!(config.is_ws_origin_allowed(None));
    }

    #[test]
    fn test_allow_any_origin_must_be_explicit() {
        let config = parse(&["--ws-allow-any-origin"]);
        assert!(config.is_ws_origin_allowed(Some("https://anything.example.com")));
    }

    #[test]
    fn test_rust_env_parse() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("nope".parse::<RustEnv>(), Err(RustEnvParseError));
    }
}
