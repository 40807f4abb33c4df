//! AquaMap Water Quality Service - Main Server
//!
//! A server-side service that:
//! 1. Serves water source search and nearest-clean-source queries
//! 2. Accepts community quality reports and folds them into source scores
//! 3. Imports monitoring data from the Water Quality Portal on demand
//! 4. Raises and serves degradation alerts for polluted sources
//!
//! Usage:
//!   cargo run --release                 # Start with service.toml (or defaults)
//!   cargo run --release -- --port 9090  # Override the listen port
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string
//!   RUST_LOG     - log filter, e.g. info or aquamap_service=debug

use aquamap_service::config;
use aquamap_service::db::{self, ClientPool};
use aquamap_service::endpoint::{self, TokenIsIdentity};
use std::env;
use std::sync::Arc;

fn main() {
    pretty_env_logger::init_custom_env("RUST_LOG");

    println!("💧 AquaMap Water Quality Service");
    println!("=================================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let port_override = match parse_port_args(&args) {
        Ok(port) => port,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!("Usage: {} [--port PORT]", args[0]);
            std::process::exit(1);
        }
    };

    // Load configuration
    let mut config = config::load_config();
    if let Some(port) = port_override {
        config.server.port = port;
    }

    // Validate database connectivity and schema before serving
    println!("📊 Validating database setup...");
    if let Err(e) = db::connect_and_verify(&["water"]) {
        eprintln!("\n❌ Database validation failed: {}\n", e);
        std::process::exit(1);
    }
    println!("✓ Database ready\n");

    println!("🔌 Opening {} pooled connections...", config.server.workers);
    let pool = match ClientPool::connect(config.server.workers) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            eprintln!("\n❌ Failed to open connection pool: {}\n", e);
            std::process::exit(1);
        }
    };

    println!("🚀 Starting HTTP endpoint server...\n");
    let config = Arc::new(config);
    let identity = Arc::new(TokenIsIdentity);

    if let Err(e) = endpoint::start_endpoint_server(config, pool, identity) {
        eprintln!("\n❌ Endpoint server error: {}", e);
        std::process::exit(1);
    }
}

/// Scans the command line for a `--port` override. Unknown flags and
/// unparseable port values are errors, not silent fallbacks.
fn parse_port_args(args: &[String]) -> Result<Option<u16>, String> {
    let mut port_override = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                let raw = args
                    .get(i + 1)
                    .ok_or_else(|| "--port requires a port number".to_string())?;
                let port = raw.parse().map_err(|_| format!("invalid port: {}", raw))?;
                port_override = Some(port);
                i += 2;
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    Ok(port_override)
}
