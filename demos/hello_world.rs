//! Half-duplex "Hello, World!" exchange.
//!
//! Demonstrates:
//! - Connecting a client to a WebSocket echo server
//! - One send followed by one blocking receive
//! - Closing the connection
//!
//! Without `--url` a loopback echo server is started in-process.
//!
//! Usage:
//!   cargo run --example hello_world
//!   cargo run --example hello_world -- --debug
//!   cargo run --example hello_world -- --url ws://127.0.0.1:9001

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};

use tracing_subscriber::EnvFilter;
use websocket_halfduplex::{EchoServer, HalfDuplexClient, Result};

// ============================================================================
// Constants
// ============================================================================

const MESSAGE: &str = "Hello, World!";

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    url: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let url = args
            .iter()
            .position(|a| a == "--url")
            .and_then(|i| args.get(i + 1))
            .cloned();

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            url,
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "websocket_halfduplex=debug"
    } else {
        "websocket_halfduplex=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let url = match args.url {
        Some(url) => url,
        None => {
            let server = EchoServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
            let url = server.ws_url();
            server.spawn();
            url
        }
    };

    let client = HalfDuplexClient::connect(&url).await?;

    client.send(MESSAGE).await?;
    let reply = client.receive().await?;
    println!("{reply}");

    client.close().await
}
