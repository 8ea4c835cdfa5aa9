use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Pulse presence and event-delivery hub
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "pulse-hub", version, about = "Pulse presence and event-delivery hub")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PULSE_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PULSE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pulse-hub.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PULSE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Base URL of the persistence service
    #[arg(long, env = "PULSE_PERSISTENCE_URL", default_value = "http://localhost:8000")]
    pub persistence_url: String,

    /// Timeout in seconds for persistence calls
    #[arg(long, env = "PULSE_PERSISTENCE_TIMEOUT_SECS", default_value = "10")]
    pub persistence_timeout_secs: u64,

    /// Shared HS256 secret for verifying identity tokens issued by the
    /// auth service. Empty means generate an ephemeral one (dev only).
    #[arg(long, env = "PULSE_IDENTITY_SECRET", default_value = "")]
    pub identity_secret: String,

    /// Maximum number of simultaneous live connections
    #[arg(long, env = "PULSE_MAX_CONNECTIONS", default_value = "10000")]
    pub max_connections: usize,

    /// Outbound queue depth per connection
    #[arg(long, env = "PULSE_CONNECTION_QUEUE_DEPTH", default_value = "64")]
    pub connection_queue_depth: usize,

    /// Seconds a single transport write may take before the connection is
    /// treated as dead
    #[arg(long, env = "PULSE_WRITE_TIMEOUT_SECS", default_value = "10")]
    pub write_timeout_secs: u64,

    /// Number of pooled conversation ordering lanes
    #[arg(long, env = "PULSE_CONVERSATION_LANES", default_value = "16")]
    pub conversation_lanes: usize,

    /// Pending-submit queue depth per lane
    #[arg(long, env = "PULSE_LANE_DEPTH", default_value = "128")]
    pub lane_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./pulse-hub.toml".to_string(),
            json_logs: false,
            generate_config: false,
            persistence_url: "http://localhost:8000".to_string(),
            persistence_timeout_secs: 10,
            identity_secret: String::new(),
            max_connections: 10_000,
            connection_queue_depth: 64,
            write_timeout_secs: 10,
            conversation_lanes: 16,
            lane_depth: 128,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PULSE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PULSE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Pulse Hub Configuration
# Place this file at ./pulse-hub.toml or specify with --config <path>
# All settings can be overridden via environment variables (PULSE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Base URL of the persistence service (message/like storage)
# persistence_url = "http://localhost:8000"

# Timeout in seconds for persistence calls
# persistence_timeout_secs = 10

# Shared HS256 secret for verifying identity tokens issued by the auth
# service. MUST be set in production; an empty value generates an
# ephemeral secret that no real token will verify against.
# identity_secret = ""

# Maximum number of simultaneous live connections before admission is
# rejected with a capacity error
# max_connections = 10000

# Outbound queue depth per connection. A client that falls this far
# behind is treated as dead and disconnected.
# connection_queue_depth = 64

# Seconds a single transport write may take before the connection is
# treated as dead
# write_timeout_secs = 10

# Number of pooled conversation ordering lanes. Submissions for one
# conversation always serialize through the same lane.
# conversation_lanes = 16

# Pending-submit queue depth per lane
# lane_depth = 128
"#
    .to_string()
}
