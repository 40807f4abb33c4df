//! One-shot Water Quality Portal import.
//!
//! Fetches monitoring locations around a point from the Water Quality
//! Portal, scores them, and upserts them as verified water sources.
//! Sources that come back degraded get the same alert check the HTTP
//! import endpoint runs.
//!
//! Usage:
//!   cargo run --bin import_wqp -- <lat> <lng> [radius_miles]
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use aquamap_service::alerts::AlertPolicy;
use aquamap_service::config;
use aquamap_service::db;
use aquamap_service::importer;
use aquamap_service::ingest::wqp;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    println!("💧 AquaMap Provider Import");
    println!("==========================\n");

    // Parse positional arguments
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <lat> <lng> [radius_miles]", args[0]);
        std::process::exit(1);
    }

    let config = config::load_config();

    let lat: f64 = args[1]
        .parse()
        .map_err(|_| format!("invalid latitude: {}", args[1]))?;
    let lng: f64 = args[2]
        .parse()
        .map_err(|_| format!("invalid longitude: {}", args[2]))?;
    let radius_miles: f64 = match args.get(3) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("invalid radius: {}", raw))?,
        None => config.provider.default_radius_miles,
    };

    // Connect and validate schema
    println!("🔌 Connecting to database...");
    let mut client = db::connect_and_verify(&["water"])?;
    println!("   ✓ Connected\n");

    let http = wqp::http_client(config.provider.timeout_seconds)?;
    let policy = AlertPolicy::from_config(&config.alerts);

    println!(
        "🌐 Fetching monitoring locations within {} miles of ({}, {})...",
        radius_miles, lat, lng
    );
    let outcome = importer::fetch_and_import(
        &mut client,
        &http,
        &config.provider,
        lat,
        lng,
        radius_miles,
        &policy,
    )?;

    println!("   ✓ Stored {} sources", outcome.sources.len());
    if !outcome.skipped.is_empty() {
        println!("   ℹ️  Skipped {} records:", outcome.skipped.len());
        for skip in &outcome.skipped {
            println!("      - {}", skip);
        }
    }

    println!("\n🎉 Import complete!");
    Ok(())
}
