//! HTTP-FLV relay server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8000
//!   cargo run --example relay_server localhost          # binds to 127.0.0.1:8000
//!   cargo run --example relay_server 127.0.0.1:8080     # binds to 127.0.0.1:8080
//!
//! ## Publishing (send stream)
//!
//! With ffmpeg:
//!   ffmpeg -re -i input.mp4 -c copy -f flv -method POST http://localhost:8000/live/test
//!
//! ## Playing (receive stream)
//!
//! With ffplay:
//!   ffplay http://localhost:8000/live/test.flv
//!   ffplay "http://localhost:8000/live/test.flv?receiveaudio=0"
//!
//! Browser players (e.g. flv.js) can also use ws://localhost:8000/live/test.flv

use std::net::SocketAddr;
use std::time::Duration;

use flv_relay::{FlvServer, ServerConfig};

fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8000;

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

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => ServerConfig::with_addr(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flv_relay=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    println!("Starting HTTP-FLV relay on {}", config.bind_addr);
    println!();
    println!("=== Publish a stream ===");
    println!("ffmpeg -re -i input.mp4 -c copy -f flv -method POST http://localhost:8000/live/test");
    println!();
    println!("=== Play a stream ===");
    println!("ffplay http://localhost:8000/live/test.flv");
    println!("WebSocket: ws://localhost:8000/live/test.flv");
    println!();

    let server = FlvServer::new(config);
    let registry = std::sync::Arc::clone(server.registry());

    // Periodic registry summary
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let stats = registry.stats();
            tracing::info!(
                sessions = stats.sessions,
                publishers = stats.publishers,
                idle_players = stats.idle_players,
                "Relay stats"
            );
        }
    });

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
