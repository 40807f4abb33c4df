/// HTTP endpoint for the water quality service
///
/// JSON REST API over tiny_http. Incoming requests are dispatched to a
/// worker pool; each worker checks a database connection out of the shared
/// pool for the duration of one request, so slow handlers (the provider
/// import in particular) never stall the accept loop.
///
/// Endpoints:
/// - GET  /health - Service health check
/// - GET  /water/sources - Search water sources (type, minPurity, maxSeverity, lat/lng/radius)
/// - GET  /water/nearest-clean - Nearest safe source to a point
/// - POST /water/report - Submit a quality report (Bearer token)
/// - GET  /water/my-reports - Reports submitted by the caller (Bearer token)
/// - GET  /water/alerts - Active alerts, optionally scoped to a point
/// - GET  /water/fetch-data - Pull provider data around a point and import it
///
/// Every body is `{"success": ...}` with `data`/`count` on success and
/// `error` on failure, except /health which reports service identity.

use std::collections::HashMap;
use std::sync::Arc;

use postgres::Client;
use serde::Serialize;
use threadpool::ThreadPool;
use tiny_http::Method;

use crate::alerts::{self, AlertPolicy};
use crate::config::ServiceConfig;
use crate::db::ClientPool;
use crate::importer;
use crate::ingest::wqp;
use crate::model::{GeoPoint, ServiceError, WaterSourceKind};
use crate::reports::{self, ReportInput, SubmitOutcome};
use crate::sources::{self, SourceFilters};

type JsonResponse = tiny_http::Response<std::io::Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Maps a Bearer token to a caller identity. The service treats identity as
/// an opaque string; swapping in a real token verifier means implementing
/// this trait and handing it to `start_endpoint_server`.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<String>;
}

/// Development resolver: the token itself is the caller id.
pub struct TokenIsIdentity;

impl IdentityResolver for TokenIsIdentity {
    fn resolve(&self, token: &str) -> Option<String> {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start the HTTP endpoint server and block serving requests.
pub fn start_endpoint_server(
    config: Arc<ServiceConfig>,
    pool: Arc<ClientPool>,
    identity: Arc<dyn IdentityResolver>,
) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", config.server.port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", config.server.port);
    println!("   GET  /health - Service health check");
    println!("   GET  /water/sources - Search water sources");
    println!("   GET  /water/nearest-clean - Nearest safe source to a point");
    println!("   POST /water/report - Submit a quality report");
    println!("   GET  /water/my-reports - Reports submitted by the caller");
    println!("   GET  /water/alerts - Active alerts");
    println!("   GET  /water/fetch-data - Import provider data around a point\n");

    let http = wqp::http_client(config.provider.timeout_seconds)
        .map_err(|e| format!("Failed to build provider HTTP client: {}", e))?;
    let http = Arc::new(http);
    let workers = ThreadPool::new(config.server.workers.max(1));

    for request in server.incoming_requests() {
        let config = Arc::clone(&config);
        let pool = Arc::clone(&pool);
        let identity = Arc::clone(&identity);
        let http = Arc::clone(&http);

        workers.execute(move || {
            let mut request = request;
            let response = {
                // The guard returns the client on every exit path, a
                // panicking handler included.
                let mut client = ClientPool::checkout_guarded(&pool);
                route_request(&mut request, &mut client, &config, identity.as_ref(), &http)
            };

            if let Err(e) = request.respond(response) {
                log::warn!("failed to send response: {}", e);
            }
        });
    }

    Ok(())
}

/// Route one request to its handler.
fn route_request(
    request: &mut tiny_http::Request,
    client: &mut Client,
    config: &ServiceConfig,
    identity: &dyn IdentityResolver,
    http: &reqwest::blocking::Client,
) -> JsonResponse {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    let params = parse_query(&url);

    match (request.method().clone(), path) {
        (Method::Get, "/health") => handle_health(),
        (Method::Get, "/water/sources") => handle_sources(client, config, &params),
        (Method::Get, "/water/nearest-clean") => handle_nearest_clean(client, config, &params),
        (Method::Post, "/water/report") => handle_submit_report(request, client, config, identity),
        (Method::Get, "/water/my-reports") => handle_my_reports(request, client, identity),
        (Method::Get, "/water/alerts") => handle_alerts(client, config, &params),
        (Method::Get, "/water/fetch-data") => handle_fetch_data(client, http, config, &params),
        _ => create_response(
            404,
            serde_json::json!({
                "error": "Not found",
                "available_endpoints": [
                    "/health",
                    "/water/sources",
                    "/water/nearest-clean",
                    "/water/report",
                    "/water/my-reports",
                    "/water/alerts",
                    "/water/fetch-data"
                ]
            }),
        ),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handle /health endpoint
fn handle_health() -> JsonResponse {
    create_response(
        200,
        serde_json::json!({
            "status": "ok",
            "service": "aquamap_service",
            "version": "0.1.0"
        }),
    )
}

/// Handle GET /water/sources
fn handle_sources(
    client: &mut Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> JsonResponse {
    match sources_response(client, config, params) {
        Ok(response) => response,
        Err(e) => service_error_response(e, "Error fetching water sources"),
    }
}

fn sources_response(
    client: &mut Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> Result<JsonResponse, ServiceError> {
    let kind = match params.get("type") {
        Some(raw) => Some(
            raw.parse::<WaterSourceKind>()
                .map_err(ServiceError::Validation)?,
        ),
        None => None,
    };
    let filters = SourceFilters {
        kind,
        min_purity: float_param(params, "minPurity")?,
        max_severity: float_param(params, "maxSeverity")?,
    };
    let near = location_param(params, config.query.default_source_radius_m)?;

    let found = sources::search(client, near, &filters, config.query.max_results)?;
    Ok(listing_response(&found))
}

/// Handle GET /water/nearest-clean
fn handle_nearest_clean(
    client: &mut Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> JsonResponse {
    match nearest_clean_response(client, config, params) {
        Ok(response) => response,
        Err(e) => service_error_response(e, "Error finding nearest clean source"),
    }
}

fn nearest_clean_response(
    client: &mut Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> Result<JsonResponse, ServiceError> {
    let (latitude, longitude) = require_lat_lng(params)?;
    let min_purity = float_param(params, "minPurity")?.unwrap_or(config.query.min_safe_purity);
    let point = GeoPoint {
        longitude,
        latitude,
    };

    let nearest = sources::find_nearest_safe(client, &point, min_purity)?.ok_or_else(|| {
        ServiceError::NotFound("No clean water source found nearby".to_string())
    })?;

    // The source serializes flat with the distance alongside its fields.
    let mut data = serde_json::json!(nearest.source);
    if let Some(fields) = data.as_object_mut() {
        fields.insert(
            "distance".to_string(),
            serde_json::json!(nearest.distance_km),
        );
    }

    Ok(create_response(
        200,
        serde_json::json!({"success": true, "data": data}),
    ))
}

/// Handle POST /water/report
fn handle_submit_report(
    request: &mut tiny_http::Request,
    client: &mut Client,
    config: &ServiceConfig,
    identity: &dyn IdentityResolver,
) -> JsonResponse {
    let user_id = match authenticate(request, identity) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let mut body = String::new();
    if request.as_reader().read_to_string(&mut body).is_err() {
        return create_response(400, error_body("Unable to read request body"));
    }
    let input: ReportInput = match serde_json::from_str(&body) {
        Ok(input) => input,
        Err(_) => return create_response(400, error_body("Invalid JSON body")),
    };

    let policy = AlertPolicy::from_config(&config.alerts);
    match reports::submit_report(client, &user_id, &input, &policy) {
        Ok(outcome) => create_response(201, submitted_body(&outcome)),
        Err(e) => service_error_response(e, "Error submitting report"),
    }
}

/// Handle GET /water/my-reports
fn handle_my_reports(
    request: &tiny_http::Request,
    client: &mut Client,
    identity: &dyn IdentityResolver,
) -> JsonResponse {
    let user_id = match authenticate(request, identity) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match reports::reports_for_user(client, &user_id) {
        Ok(owned) => listing_response(&owned),
        Err(e) => service_error_response(e, "Error fetching user reports"),
    }
}

/// Handle GET /water/alerts
fn handle_alerts(
    client: &mut Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> JsonResponse {
    match alerts_response(client, config, params) {
        Ok(response) => response,
        Err(e) => service_error_response(e, "Error fetching alerts"),
    }
}

fn alerts_response(
    client: &mut Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> Result<JsonResponse, ServiceError> {
    let near = location_param(params, config.query.default_alert_radius_m)?;
    let active = alerts::active_alerts(client, near)?;
    Ok(listing_response(&active))
}

/// Handle GET /water/fetch-data
fn handle_fetch_data(
    client: &mut Client,
    http: &reqwest::blocking::Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> JsonResponse {
    match fetch_data_response(client, http, config, params) {
        Ok(response) => response,
        Err(e) => service_error_response(e, "Error fetching water quality data from external API"),
    }
}

fn fetch_data_response(
    client: &mut Client,
    http: &reqwest::blocking::Client,
    config: &ServiceConfig,
    params: &HashMap<String, String>,
) -> Result<JsonResponse, ServiceError> {
    let (latitude, longitude) = require_lat_lng(params)?;
    let radius_miles =
        float_param(params, "radius")?.unwrap_or(config.provider.default_radius_miles);
    let policy = AlertPolicy::from_config(&config.alerts);

    let outcome = importer::fetch_and_import(
        client,
        http,
        &config.provider,
        latitude,
        longitude,
        radius_miles,
        &policy,
    )?;
    if !outcome.skipped.is_empty() {
        log::info!("import skipped {} records", outcome.skipped.len());
    }

    Ok(listing_response(&outcome.sources))
}

// ---------------------------------------------------------------------------
// Request Helpers
// ---------------------------------------------------------------------------

/// Parse the query string into a key/value map, percent-decoding both sides.
/// Repeated keys keep the last value.
fn parse_query(url: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some((_, query)) = url.split_once('?') else {
        return params;
    };

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        params.insert(key, value);
    }

    params
}

/// Read an optional float query parameter; a present but unparseable value
/// is a validation error rather than a silent default.
fn float_param(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<f64>, ServiceError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<f64>().map(Some).map_err(|_| {
            ServiceError::Validation(format!("Query parameter '{}' must be a number", name))
        }),
    }
}

/// lat and lng must arrive together; anything else is a validation error.
fn require_lat_lng(params: &HashMap<String, String>) -> Result<(f64, f64), ServiceError> {
    match (float_param(params, "lat")?, float_param(params, "lng")?) {
        (Some(lat), Some(lng)) => Ok((lat, lng)),
        _ => Err(ServiceError::Validation(
            "Latitude and longitude are required".to_string(),
        )),
    }
}

/// Optional center+radius. A lone lat or lng is ignored, matching the
/// search endpoints where location scoping is opt-in.
fn location_param(
    params: &HashMap<String, String>,
    default_radius_m: f64,
) -> Result<Option<(GeoPoint, f64)>, ServiceError> {
    match (float_param(params, "lat")?, float_param(params, "lng")?) {
        (Some(latitude), Some(longitude)) => {
            let radius = float_param(params, "radius")?.unwrap_or(default_radius_m);
            Ok(Some((
                GeoPoint {
                    longitude,
                    latitude,
                },
                radius,
            )))
        }
        _ => Ok(None),
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value.
fn token_from_header(value: &str) -> Option<&str> {
    value.strip_prefix("Bearer ").map(str::trim)
}

fn bearer_token(request: &tiny_http::Request) -> Option<String> {
    for header in request.headers() {
        if header.field.equiv("Authorization") {
            return token_from_header(header.value.as_str()).map(str::to_string);
        }
    }
    None
}

/// Resolve the caller or produce the 401 to send back.
fn authenticate(
    request: &tiny_http::Request,
    identity: &dyn IdentityResolver,
) -> Result<String, JsonResponse> {
    let token = match bearer_token(request) {
        Some(token) => token,
        None => return Err(create_response(401, error_body("No token provided"))),
    };

    match identity.resolve(&token) {
        Some(user_id) => Ok(user_id),
        None => Err(create_response(401, error_body("Invalid token"))),
    }
}

// ---------------------------------------------------------------------------
// Response Helpers
// ---------------------------------------------------------------------------

fn listing_body<T: Serialize>(items: &[T]) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "count": items.len(),
        "data": items,
    })
}

fn listing_response<T: Serialize>(items: &[T]) -> JsonResponse {
    create_response(200, listing_body(items))
}

fn submitted_body(outcome: &SubmitOutcome) -> serde_json::Value {
    match &outcome.source {
        Some(source) => serde_json::json!({
            "success": true,
            "message": "Report submitted and new water source created",
            "data": {"report": outcome.report, "waterSource": source},
        }),
        None => serde_json::json!({
            "success": true,
            "message": "Report submitted successfully",
            "data": outcome.report,
        }),
    }
}

fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({"success": false, "error": message})
}

/// HTTP status for a service error.
fn status_for(error: &ServiceError) -> u16 {
    match error {
        ServiceError::Validation(_) => 400,
        ServiceError::NotFound(_) => 404,
        ServiceError::Upstream(_) => 500,
        ServiceError::Persistence(_) => 500,
    }
}

/// What the caller gets to see: validation and not-found messages pass
/// through, everything else is replaced by the endpoint's fallback text.
fn client_message(error: &ServiceError, fallback: &str) -> String {
    match error {
        ServiceError::Validation(message) | ServiceError::NotFound(message) => message.clone(),
        ServiceError::Upstream(_) | ServiceError::Persistence(_) => fallback.to_string(),
    }
}

fn service_error_response(error: ServiceError, fallback: &str) -> JsonResponse {
    let status = status_for(&error);
    if status >= 500 {
        log::error!("{}: {}", fallback, error);
    }
    create_response(status, error_body(&client_message(&error, fallback)))
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: serde_json::Value) -> JsonResponse {
    let body = serde_json::to_string_pretty(&json).unwrap();
    let bytes = body.into_bytes();

    tiny_http::Response::from_data(bytes)
        .with_status_code(tiny_http::StatusCode::from(status_code))
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
        )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
