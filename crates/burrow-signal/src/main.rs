use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use burrow_common::protocol::IceServer;
use burrow_signal::config::{DEFAULT_MAX_SLOTS, ServerConfig};
use burrow_signal::{router, AppState, TurnMinter};

#[derive(Parser, Debug)]
#[command(name = "burrow-signal")]
#[command(about = "burrow rendezvous server - pairs peers and relays their handshake frames")]
struct Args {
    /// HTTP listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    http: SocketAddr,

    /// Host names accepted in the Host header (repeatable; empty allows any)
    #[arg(long = "host")]
    hosts: Vec<String>,

    /// STUN server URI handed to peers, e.g. stun:stun.example.org:3478
    #[arg(long)]
    stun: Vec<String>,

    /// TURN server URI handed to peers
    #[arg(long)]
    turn: Option<String>,

    /// Shared secret for minting time-limited TURN credentials
    /// (falls back to BURROW_TURN_SECRET)
    #[arg(long)]
    turn_secret: Option<String>,

    /// TURN credential lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    turn_ttl: u64,

    /// Maximum number of slots awaiting a peer
    #[arg(long, default_value_t = DEFAULT_MAX_SLOTS)]
    slots: u64,

    /// Seconds an unpaired slot waits before timing out
    #[arg(long, default_value_t = 60)]
    idle_timeout: u64,

    /// Seconds a paired slot may spend on the handshake
    #[arg(long, default_value_t = 120)]
    handshake_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    burrow_common::init_tracing();

    let args = Args::parse();

    let turn = match &args.turn {
        Some(uri) => {
            let secret = args
                .turn_secret
                .clone()
                .or_else(|| std::env::var("BURROW_TURN_SECRET").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!("--turn requires --turn-secret or BURROW_TURN_SECRET")
                })?;
            Some(TurnMinter::new(
                uri.clone(),
                secret,
                Duration::from_secs(args.turn_ttl),
            ))
        }
        None => None,
    };

    let config = ServerConfig {
        allowed_hosts: args.hosts,
        stun_servers: args.stun.iter().cloned().map(IceServer::stun).collect(),
        turn,
        max_slots: args.slots,
        idle_timeout: Duration::from_secs(args.idle_timeout),
        handshake_timeout: Duration::from_secs(args.handshake_timeout),
    };

    let app = router(AppState::new(config));

    let listener = TcpListener::bind(args.http).await?;
    info!("rendezvous server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
