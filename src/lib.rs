/// aquamap_service: community water source quality mapping service.
///
/// # Module structure
///
/// ```text
/// aquamap_service
/// ├── model       — shared data types (WaterSource, WaterReport, WaterAlert, …)
/// ├── config      — service configuration loader (service.toml)
/// ├── db          — connection setup, schema validation, connection pool
/// ├── geo         — haversine distance and bounding-box prefiltering
/// ├── quality     — purity scoring, severity, pollution classification
/// ├── sources     — water source store: search, nearest-safe, upsert, delete
/// ├── reports     — user report intake and purity merge into sources
/// ├── alerts      — degradation alert policy, dedup, resolution
/// ├── importer    — provider batch import (prepare, upsert, alert check)
/// ├── ingest
/// │   ├── wqp     — Water Quality Portal API: URL construction + JSON parsing
/// │   └── fixtures (test only) — representative API response payloads
/// └── endpoint    — JSON HTTP API over a worker pool
/// ```

/// Public modules
pub mod alerts;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod geo;
pub mod importer;
pub mod ingest;
pub mod model;
pub mod quality;
pub mod reports;
pub mod sources;
