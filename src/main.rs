//! walletgated - run the wallet security gateway.
//!
//! Usage:
//!   walletgated --config /etc/walletgate.json
//!   WALLETGATE_RPC_HOST=10.0.0.2:9110 walletgated --port 8080

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walletgate::rpc::{LoggingHandlers, NotificationDispatcher, RpcError, RpcManager, WsDialer};
use walletgate::{
    AdminCredentials, ConfigBuilder, GatewayState, Identity, ShutdownCommand, TokenCodec,
    TotpGuard,
};

#[derive(Parser, Debug)]
#[command(name = "walletgated")]
#[command(version)]
#[command(about = "Two-factor security gateway for a headless staking wallet", long_about = None)]
struct Cli {
    /// JSON config file; environment variables override its values
    #[arg(short, long, env = "WALLETGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = match &cli.config {
        Some(path) => ConfigBuilder::from_file(path)?,
        None => ConfigBuilder::new(),
    }
    .from_env();
    if let Some(host) = cli.host {
        builder = builder.with_host(host);
    }
    if let Some(port) = cli.port {
        builder = builder.with_port(port);
    }
    if let Some(level) = cli.log_level {
        builder = builder.with_log_level(level);
    }
    if cli.json_logs {
        builder = builder.with_json_logging(true);
    }
    let config = builder.build()?;

    walletgate::init_tracing_with_config(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting walletgate");

    if config.auth.password.expose_secret().is_empty() {
        tracing::warn!("No admin password configured, every login will be refused");
    }

    let codec = TokenCodec::from_config(&config.auth).context("loading session signing keys")?;

    let totp = TotpGuard::with_file_store(config.totp.clone());
    match totp.is_enrolled().await {
        Ok(true) => tracing::info!("Two factor secret loaded"),
        Ok(false) => tracing::warn!("Two factor not enrolled yet, visit /api/twofactor"),
        Err(e) => tracing::error!(error = %e, "Two factor secret is unreadable"),
    }

    let cancel = CancellationToken::new();
    // The wallet may be unreachable for a long time; allow ctrl-c while waiting.
    let connect_guard = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        }
    });

    let (sink, dispatcher) = NotificationDispatcher::spawn(
        Arc::new(LoggingHandlers),
        config.rpc.notification_buffer,
        cancel.clone(),
    );
    let dialer = Arc::new(WsDialer::new(config.rpc.clone()).context("configuring wallet RPC")?);

    let rpc = match RpcManager::connect(dialer, config.rpc.clone(), sink, cancel.clone()).await {
        Ok(rpc) => rpc,
        Err(RpcError::Cancelled) => {
            tracing::info!("Shutdown requested before the wallet was reachable");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    connect_guard.abort();

    let state = GatewayState::new(
        codec,
        totp,
        rpc,
        Arc::new(ShutdownCommand::new(config.device.clone())),
    )
    .with_credentials(AdminCredentials::new(
        config.auth.username.clone(),
        config.auth.password.clone(),
    ))
    .with_identity(Identity::admin(config.auth.subject_name.clone()))
    .with_tickets(config.tickets.clone());

    walletgate::serve(walletgate::router(state), &config.server, cancel.clone()).await?;

    cancel.cancel();
    let _ = dispatcher.await;
    tracing::info!("Shutdown complete");

    Ok(())
}
