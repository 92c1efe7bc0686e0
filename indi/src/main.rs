//! `indi-telescope`: serve a simulated telescope over INDI

use anyhow::Context;
use clap::Parser;
use indi_telescope::{
    IndiServer, ServerConfig, DEFAULT_DEVICE_NAME, DEFAULT_MAX_TOKEN_LEN, INDI_DEFAULT_PORT,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "indi-telescope",
    version,
    about = "Single-device INDI server for a simulated telescope"
)]
struct Cli {
    /// JSON property document (built-in telescope when omitted)
    #[arg(short, long, env = "INDI_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "INDI_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// TCP port
    #[arg(short, long, env = "INDI_PORT", default_value_t = INDI_DEFAULT_PORT)]
    port: u16,

    /// Device name announced to clients
    #[arg(short, long, env = "INDI_DEVICE", default_value = DEFAULT_DEVICE_NAME)]
    device: String,

    /// Largest single XML token buffered before the parser resets
    #[arg(long, env = "INDI_MAX_TOKEN_LEN", default_value_t = DEFAULT_MAX_TOKEN_LEN)]
    max_token_len: usize,

    /// Reject requests addressed to a different device name
    #[arg(long, env = "INDI_STRICT_DEVICE")]
    strict_device: bool,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        ServerConfig {
            bind_address: cli.bind,
            port: cli.port,
            device_name: cli.device,
            properties_path: cli.config,
            max_token_len: cli.max_token_len,
            strict_device_match: cli.strict_device,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config = ServerConfig::from(Cli::parse());
    let mut server = IndiServer::new(config);
    server
        .run()
        .await
        .with_context(|| format!("INDI server on {} stopped", server.config().socket_addr()))
}
