//! `wardgate` command line: run the gateway, inspect resolved credentials,
//! and test a handshake.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wardgate_client::{
    ConnectOptions, DeviceIdentity, ExplicitCredentials, GatewayClient, ProcessEnv,
    RemotePasswordPrecedence,
};
use wardgate_core::WardgateConfig;
use wardgate_gateway::{GatewayServer, GatewayState};
use wardgate_security::fingerprint;

#[derive(Parser)]
#[command(name = "wardgate", about = "Wardgate: authenticated gateway for WebSocket clients")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wardgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show which credentials an outbound call would send
    Credentials {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Connect to a gateway and report the handshake result
    Connect {
        #[command(flatten)]
        target: TargetArgs,
        /// Paired device id
        #[arg(long)]
        device_id: Option<String>,
        /// Token for the paired device
        #[arg(long, requires = "device_id")]
        device_token: Option<String>,
    },
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Gateway URL (overrides config; configured secrets are not sent)
    #[arg(long)]
    url: Option<String>,
    /// Token to send (overrides config and environment)
    #[arg(long)]
    token: Option<String>,
    /// Password to send (overrides config and environment)
    #[arg(long)]
    password: Option<String>,
    /// In remote mode, prefer the environment password over gateway.remote
    #[arg(long)]
    env_first: bool,
}

impl TargetArgs {
    fn into_options(self, device: Option<DeviceIdentity>) -> ConnectOptions {
        let explicit = (self.token.is_some() || self.password.is_some()).then(|| {
            ExplicitCredentials::new(self.token.as_deref(), self.password.as_deref())
        });
        ConnectOptions {
            url: self.url,
            explicit,
            password_precedence: if self.env_first {
                RemotePasswordPrecedence::EnvFirst
            } else {
                RemotePasswordPrecedence::RemoteFirst
            },
            device,
        }
    }
}

/// Load the config file, falling back to defaults when it does not exist.
async fn load_config(path: &Path) -> anyhow::Result<WardgateConfig> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        Ok(WardgateConfig::load(path).await?)
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        Ok(WardgateConfig::default())
    }
}

fn show(label: &str, secret: Option<&str>) {
    match secret {
        Some(secret) => println!("  {label}: {}", fingerprint(secret)),
        None => println!("  {label}: (none)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let state = Arc::new(GatewayState::from_config(&config)?);
            info!(
                mode = %state.policy.shared_method(),
                allow_private_network = state.policy.allow_private_network,
                devices = config.gateway.devices.len(),
                "Gateway auth configured"
            );

            let addr = format!("{host}:{port}");
            let listener = TcpListener::bind(&addr).await?;
            info!("Wardgate gateway listening on {}", addr);
            GatewayServer::serve(listener, state).await?;
        }
        Commands::Credentials { target } => {
            let client =
                GatewayClient::from_config(&config, &ProcessEnv, target.into_options(None));
            let credentials = client.credentials();
            println!("Gateway: {}", client.url());
            show("token", credentials.token.as_deref());
            show("password", credentials.password.as_deref());
        }
        Commands::Connect {
            target,
            device_id,
            device_token,
        } => {
            let device = device_id.map(|id| DeviceIdentity {
                id,
                token: device_token,
            });
            let client =
                GatewayClient::from_config(&config, &ProcessEnv, target.into_options(device));
            let mut session = client.connect().await?;
            if let Some(hello) = session.hello() {
                println!("Connected to {}", client.url());
                println!("  connection: {}", hello.connection_id);
                println!("  method: {}", hello.auth_method);
                println!("  shared auth ok: {}", hello.shared_auth_ok);
            }
            session.ping().await?;
            session.close().await?;
        }
    }

    Ok(())
}
