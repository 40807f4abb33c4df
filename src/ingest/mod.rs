/// External data ingestion for the water quality mapping service.
///
/// Submodules:
/// - `wqp` — Water Quality Portal result search API: URL construction and
///   GeoJSON feed parsing.
/// - `fixtures` — representative API payloads, test builds only.
///
/// Future additions: state EPA bulk feeds, sensor telemetry intake.

pub mod wqp;

pub(crate) mod fixtures;
