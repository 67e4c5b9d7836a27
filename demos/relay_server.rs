//! Signaling relay server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8080
//!   cargo run --example relay_server localhost          # binds to 127.0.0.1:8080
//!   cargo run --example relay_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Tokens
//!
//! Accepted bearer tokens come from `RENDEZVOUS_TOKENS`, a comma separated
//! list of `token:username[:admin]` entries:
//!
//!   RENDEZVOUS_TOKENS="t-alice:alice,t-bob:bob,t-ops:ops:admin"
//!
//! Without it a single `dev-token` for user `dev` is accepted.
//!
//! ## Connecting
//!
//! Any STOMP-over-WebSocket client (stomp.js, etc.):
//!   URL:     ws://localhost:8080/signal
//!   CONNECT: Authorization: Bearer <token>   (or passcode:<token>)
//!
//! Then subscribe to `/topic/peers` and send your presence to `/app/register`.

use std::net::SocketAddr;
use std::time::Duration;

use rendezvous_rs::auth::{Identity, Role, StaticIdentityProvider};
use rendezvous_rs::{RelayServer, ServerConfig};

const DEFAULT_PORT: u16 = 8080;

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "0.0.0.0:8080" -> 0.0.0.0:8080
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

/// Build the token table from `token:username[:admin]` entries
fn load_tokens(entries: &str, provider: &StaticIdentityProvider) -> usize {
    let mut loaded = 0;

    for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.split(':');
        let (Some(token), Some(username)) = (parts.next(), parts.next()) else {
            eprintln!("Ignoring malformed token entry: '{}'", entry);
            continue;
        };
        let role = match parts.next() {
            Some("admin") => Role::Admin,
            _ => Role::User,
        };

        provider.insert(token, Identity::new(username, role));
        loaded += 1;
    }

    loaded
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RENDEZVOUS_TOKENS   token:username[:admin],...   (default: dev-token:dev)");
    eprintln!("  RUST_LOG            tracing filter");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rendezvous_rs=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let provider = StaticIdentityProvider::new();
    let tokens = std::env::var("RENDEZVOUS_TOKENS").unwrap_or_else(|_| "dev-token:dev".to_string());
    let loaded = load_tokens(&tokens, &provider);

    let config = ServerConfig::with_addr(bind_addr);

    println!("Starting signaling relay on ws://{}{}", config.bind_addr, config.endpoint_path);
    println!("Accepting {} token(s)", loaded);
    println!();

    let server = RelayServer::new(config, provider);

    // Print stats periodically
    let admin = server.hub().admin();
    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = admin.stats();
            println!(
                "Stats: peers={} channels={} sessions={} relayed={} dropped={} uptime={:?}",
                stats.registered_peers,
                stats.public_channels,
                stats.active_sessions,
                stats.messages_relayed,
                stats.messages_dropped,
                stats.uptime,
            );
        }
    });

    // Run with Ctrl+C handling
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Server error: {}", e);
    }

    stats_task.abort();
    Ok(())
}
