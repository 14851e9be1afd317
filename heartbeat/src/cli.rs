use clap::Parser;

use crate::reporter;

/// fwagent heartbeat reporter - periodic liveness posts to the controller
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Controller base URL
    #[arg(long, env = "CONTROLLER_URL")]
    pub backend_url: String,

    /// Agent authentication token, sent as a bearer credential
    #[arg(long, env = "AGENT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Node identifier assigned by the controller
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// Seconds between heartbeats
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = reporter::DEFAULT_INTERVAL.as_secs())]
    pub interval_secs: u64,

    /// Per-request timeout in seconds (client default when unset)
    #[arg(long, env = "HEARTBEAT_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
