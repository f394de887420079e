//! Relay server binary entry point
//!
//! Serves the WebRTC echo relay behind its HTTP signaling endpoints.
//!
//! # Usage
//!
//! ```bash
//! # Serve on the default address with Google STUN
//! cargo run --bin relay_server
//!
//! # Bind elsewhere and use custom ICE servers
//! cargo run --bin relay_server -- \
//!   --bind-address 0.0.0.0:8000 \
//!   --stun-servers stun:stun.example.com:19302 \
//!   --turn-servers turn:turn.example.com:3478:user:secret \
//!   --keyframe-interval-secs 3
//! ```

use clap::Parser;
use mirrorweb_relay::{RelayConfig, RelayHttpServer, SessionManager, TurnServerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Mirrorweb echo relay server
///
/// Accepts a browser's WebRTC offer over HTTP and loops its video stream
/// back to it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address for the HTTP signaling endpoints
    #[arg(long, default_value = "127.0.0.1:8000", env = "RELAY_BIND_ADDRESS")]
    bind_address: String,

    /// STUN servers (comma-separated; empty for host candidates only)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "RELAY_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "RELAY_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Seconds between keyframe-recovery requests to the publisher
    #[arg(long, default_value_t = 3, env = "RELAY_KEYFRAME_INTERVAL")]
    keyframe_interval_secs: u64,
}

/// Parse TURN server string (format: turn:host:port:username:password or
/// turns:host:port:username:password)
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    let host = parts[1];
    let port = parts[2];
    let username = parts[3].to_string();
    // Password may contain colons, so join remaining parts
    let credential = parts[4..].join(":");

    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, host, port),
        username,
        credential,
    })
}

/// Build RelayConfig from CLI arguments
fn build_config_from_args(args: &Args) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut turn_servers = Vec::new();
    for turn_str in &args.turn_servers {
        let turn_config = parse_turn_server(turn_str)
            .map_err(|e| format!("Failed to parse TURN server: {}", e))?;
        info!(
            "Adding TURN server: {} (user: {})",
            turn_config.url, turn_config.username
        );
        turn_servers.push(turn_config);
    }

    let stun_servers = args
        .stun_servers
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();

    Ok(RelayConfig {
        stun_servers,
        turn_servers,
        keyframe_interval_secs: args.keyframe_interval_secs,
        ..Default::default()
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up Ctrl+C handler at the very start
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\nCtrl+C received, shutting down...");

        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }
    })
    .expect("Failed to set Ctrl+C handler");

    // Create multi-threaded tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("relay-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Mirrorweb relay server starting"
    );

    let config = build_config_from_args(&args)?;
    config.validate()?;

    info!(
        bind_address = %args.bind_address,
        stun_servers = config.stun_servers.len(),
        turn_servers = config.turn_servers.len(),
        keyframe_interval_secs = config.keyframe_interval_secs,
        "Configuration loaded"
    );

    let manager = Arc::new(SessionManager::new(config));
    let server = RelayHttpServer::new(args.bind_address.clone(), Arc::clone(&manager));

    let shutdown_signal = async move {
        while !shutdown_flag.load(Ordering::SeqCst) {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    server.serve_with_shutdown(shutdown_signal).await?;

    // A session left open by the client is torn down with the process.
    if manager.is_active().await {
        let _ = manager.close().await;
    }

    info!("Relay server shut down gracefully");
    Ok(())
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
