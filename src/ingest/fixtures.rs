/// Test fixtures: representative JSON payloads from the Water Quality
/// Portal result search API.
///
/// These fixtures are structurally complete but truncated to the minimum
/// needed to exercise the parser. They reflect the real GeoJSON envelope
/// returned by:
///   https://www.waterqualitydata.us/data/Result/search?mimeType=json&...
///
/// WQP response shape:
///   features[]
///     .geometry.coordinates      — [longitude, latitude] (may be null)
///     .properties
///       .MonitoringLocationIdentifier — upsert key, e.g. "USGS-05553700"
///       .MonitoringLocationName
///       .MonitoringLocationTypeName   — free text, e.g. "River/Stream"
///       .pH / .DissolvedOxygen / .Turbidity / .Temperature / .FecalColiform
///
/// Note: measured parameters arrive as JSON numbers OR strings depending
/// on the reporting lab. Parsers must handle both.

/// Two-feature feed: a clean river site with full parameters, and a site
/// with no geometry at all (the portal serves those for some legacy
/// locations). The clean site's parameters score a purity of exactly 100.
#[cfg(test)]
pub(crate) fn fixture_result_feed_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "geometry": {
            "type": "Point",
            "coordinates": [-88.9934, 41.3242]
          },
          "properties": {
            "MonitoringLocationIdentifier": "USGS-05553700",
            "MonitoringLocationName": "Illinois River at Starved Rock",
            "MonitoringLocationTypeName": "River/Stream",
            "pH": 7.0,
            "DissolvedOxygen": 8.0,
            "Turbidity": 10.0,
            "Temperature": 18.5,
            "FecalColiform": 0.0
          }
        },
        {
          "type": "Feature",
          "geometry": null,
          "properties": {
            "MonitoringLocationIdentifier": "ILEPA_WQX-D-32",
            "MonitoringLocationName": "Legacy Station D-32",
            "MonitoringLocationTypeName": "Lake",
            "pH": 7.4
          }
        }
      ]
    }"#
}

/// Single feature with every numeric parameter delivered as a string, plus
/// one outright non-numeric value ("N/A") that must read as absent.
#[cfg(test)]
pub(crate) fn fixture_string_values_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "geometry": {
            "type": "Point",
            "coordinates": [-87.6298, 41.8781]
          },
          "properties": {
            "MonitoringLocationIdentifier": "ILEPA_WQX-GH-11",
            "MonitoringLocationName": "Chicago River North Branch",
            "MonitoringLocationTypeName": "River/Stream",
            "pH": "7.8",
            "DissolvedOxygen": "6.2",
            "Turbidity": "30",
            "Temperature": "N/A"
          }
        }
      ]
    }"#
}

/// Feed with no `features` member at all. The portal answers like this
/// when a query matches nothing; it must read as an empty feed.
#[cfg(test)]
pub(crate) fn fixture_empty_feed_json() -> &'static str {
    r#"{
      "type": "FeatureCollection"
    }"#
}

/// Re-import payload for the Starved Rock site with badly degraded
/// parameters: every scoring penalty fires, driving purity to 0 and
/// severity to 10. Used to exercise upsert-in-place and alert raising.
#[cfg(test)]
pub(crate) fn fixture_degraded_site_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "geometry": {
            "type": "Point",
            "coordinates": [-88.9934, 41.3242]
          },
          "properties": {
            "MonitoringLocationIdentifier": "USGS-05553700",
            "MonitoringLocationName": "Illinois River at Starved Rock",
            "MonitoringLocationTypeName": "River/Stream",
            "pH": 9.5,
            "DissolvedOxygen": 4.0,
            "Turbidity": 60.0,
            "FecalColiform": 250.0
          }
        }
      ]
    }"#
}
