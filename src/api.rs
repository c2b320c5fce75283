// Portal de Proveedores - HTTP surface (axum)
//
// Pages are static HTML that call the JSON API from the browser. Every route
// except /api/health and the login/logout pair needs a session cookie; the
// resolved Principal travels with the request as an extension.

use crate::auth::{
    authenticate, authorize_scope, create_session, delete_session, plate_filter,
    principal_for_session, session_token_from_cookie_header, Principal, ShipmentScope,
    SESSION_COOKIE,
};
use crate::db::{
    get_all_papers, get_all_price_entries, get_all_shipments_raw, get_all_suppliers, get_plates,
    get_shipments, Paper, Plate, PriceEntry, Shipment, Supplier,
};
use crate::error::{PortalError, PortalResult};
use crate::pricing::{price_plates, PricedPlate};
use crate::shipments::{group_by_month, MonthlyGroup};
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Extension, Form, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    debug: bool,
}

impl AppState {
    pub fn new(conn: Connection, debug: bool) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            debug,
        }
    }

    /// One connection per request; the guard releases it on every exit path
    fn conn(&self) -> PortalResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| PortalError::Store(anyhow::anyhow!("database lock poisoned")))
    }
}

// ============================================================================
// Error responses
// ============================================================================

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        match &self {
            PortalError::Store(cause) => {
                error!(error = ?cause, "request failed on data access");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, self.code(), "internal error")
            }
            PortalError::Forbidden(reason) => {
                warn!(%reason, "forbidden request");
                json_error(StatusCode::FORBIDDEN, self.code(), reason.clone())
            }
            PortalError::Unauthenticated => {
                json_error(StatusCode::UNAUTHORIZED, self.code(), "login required")
            }
        }
    }
}

// ============================================================================
// Session middleware
// ============================================================================

fn resolve_principal(state: &AppState, headers: &HeaderMap) -> PortalResult<Option<Principal>> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_token_from_cookie_header);

    match token {
        Some(token) => {
            let conn = state.conn()?;
            Ok(principal_for_session(&conn, token)?)
        }
        None => Ok(None),
    }
}

/// API routes: 401 JSON without a valid session
async fn require_api_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, PortalError> {
    let principal = resolve_principal(&state, req.headers())?.ok_or(PortalError::Unauthenticated)?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Page routes: redirect to the login page without a valid session
async fn require_page_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, PortalError> {
    match resolve_principal(&state, req.headers())? {
        Some(principal) => {
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        None => {
            let target = format!("/login?next={}", urlencoding::encode(req.uri().path()));
            Ok(Redirect::to(&target).into_response())
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /api/health - Health check (no session needed)
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "OK",
        version: crate::VERSION,
    })
}

/// GET /api/me - Who is logged in
async fn get_me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}

/// GET /api/placas - Plates visible to the caller
async fn get_placas(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> PortalResult<Json<Vec<Plate>>> {
    let conn = state.conn()?;
    let plates = get_plates(&conn, &plate_filter(&principal))?;
    Ok(Json(plates))
}

/// GET /api/placas_con_costos - Plates joined with their per-unit price
async fn get_placas_con_costos(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> PortalResult<Json<Vec<PricedPlate>>> {
    let conn = state.conn()?;
    let plates = get_plates(&conn, &plate_filter(&principal))?;
    let entries = get_all_price_entries(&conn)?;

    Ok(Json(price_plates(&entries, plates)))
}

/// GET /api/costos - Full price list
async fn get_costos(State(state): State<AppState>) -> PortalResult<Json<Vec<PriceEntry>>> {
    let conn = state.conn()?;
    Ok(Json(get_all_price_entries(&conn)?))
}

/// GET /api/papeles - Paper stock catalog
async fn get_papeles(State(state): State<AppState>) -> PortalResult<Json<Vec<Paper>>> {
    let conn = state.conn()?;
    Ok(Json(get_all_papers(&conn)?))
}

#[derive(Debug, Deserialize)]
struct EnviosQuery {
    proveedor: Option<String>,
}

/// GET /api/envios?proveedor=default|all|<email> - Shipments grouped by month
async fn get_envios(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<EnviosQuery>,
) -> PortalResult<Json<Vec<MonthlyGroup>>> {
    let scope = ShipmentScope::from_param(query.proveedor.as_deref());
    let filter = authorize_scope(&principal, scope)?;

    let conn = state.conn()?;
    let shipments = get_shipments(&conn, &filter)?;
    drop(conn);

    Ok(Json(group_by_month(shipments)))
}

/// GET /api/envios/raw - Ungrouped shipments table (admin only)
async fn get_envios_raw(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> PortalResult<Json<Vec<Shipment>>> {
    if !principal.is_admin() {
        return Err(PortalError::forbidden("the raw shipments table is admin only"));
    }

    let conn = state.conn()?;
    Ok(Json(get_all_shipments_raw(&conn)?))
}

/// GET /api/proveedores - Supplier list for the admin selector
async fn get_proveedores(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> PortalResult<Json<Vec<Supplier>>> {
    if !principal.is_admin() {
        return Err(PortalError::forbidden("the supplier list is admin only"));
    }

    let conn = state.conn()?;
    Ok(Json(get_all_suppliers(&conn)?))
}

// ============================================================================
// Session Handlers
// ============================================================================

const LOGIN_ERROR_MESSAGE: &str = "Correo o contraseña incorrectos";

#[derive(Debug, Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// Only same-site absolute paths are accepted as post-login targets
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && path
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "/_-.".contains(c)) =>
        {
            path
        }
        _ => "/",
    }
}

fn render_login(message: Option<&str>, next: &str) -> Html<String> {
    let message_html = message
        .map(|m| format!("<p class=\"error\">{}</p>", m))
        .unwrap_or_default();

    Html(
        include_str!("../web/login.html")
            .replace("{{mensaje}}", &message_html)
            .replace("{{next}}", next),
    )
}

fn session_cookie(token: &str) -> String {
    format!("{}={}; HttpOnly; SameSite=Lax; Path=/", SESSION_COOKIE, token)
}

fn expired_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// GET /login
async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    render_login(None, safe_next(query.next.as_deref()))
}

/// POST /login - email + password form
async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> PortalResult<Response> {
    let next = safe_next(form.next.as_deref()).to_string();

    let conn = state.conn()?;
    let principal = match authenticate(&conn, &form.email, &form.password)? {
        Some(principal) => principal,
        None => {
            warn!(email = %form.email, "login rejected");
            return Ok(render_login(Some(LOGIN_ERROR_MESSAGE), &next).into_response());
        }
    };
    let token = create_session(&conn, &principal)?;

    info!(email = %principal.email, rol = %principal.role, "login");

    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Redirect::to(&next),
    )
        .into_response())
}

/// GET|POST /logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> PortalResult<Response> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_token_from_cookie_header);

    if let Some(token) = token {
        let conn = state.conn()?;
        delete_session(&conn, token)?;
    }

    Ok((
        [(header::SET_COOKIE, expired_session_cookie())],
        Redirect::to("/login"),
    )
        .into_response())
}

// ============================================================================
// Pages
// ============================================================================

/// GET / - Plates with their prices
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

/// GET /envios - Monthly shipments
async fn serve_envios() -> impl IntoResponse {
    Html(include_str!("../web/envios.html"))
}

/// GET /cotizacion - Quotation module
async fn serve_cotizacion() -> impl IntoResponse {
    Html(include_str!("../web/cotizacion.html"))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let protected_api = Router::new()
        .route("/me", get(get_me))
        .route("/placas", get(get_placas))
        .route("/placas_con_costos", get(get_placas_con_costos))
        .route("/costos", get(get_costos))
        .route("/papeles", get(get_papeles))
        .route("/envios", get(get_envios))
        .route("/envios/raw", get(get_envios_raw))
        .route("/proveedores", get(get_proveedores))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_session));

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .merge(protected_api);

    let pages = Router::new()
        .route("/", get(serve_index))
        .route("/envios", get(serve_envios))
        .route("/cotizacion", get(serve_cotizacion))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_page_session));

    let app = Router::new()
        .merge(pages)
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout).post(logout))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http());

    let app = if state.debug {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };

    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/envios")), "/envios");
        assert_eq!(safe_next(Some("/cotizacion")), "/cotizacion");
        assert_eq!(safe_next(Some("//evil.example.com")), "/");
        assert_eq!(safe_next(Some("https://evil.example.com")), "/");
        assert_eq!(safe_next(Some("/\"><script>")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_login_page_renders_message() {
        let Html(body) = render_login(Some(LOGIN_ERROR_MESSAGE), "/envios");
        assert!(body.contains(LOGIN_ERROR_MESSAGE));
        assert!(body.contains("value=\"/envios\""));
        assert!(!body.contains("{{"));
    }

    #[test]
    fn test_cookies() {
        assert!(session_cookie("abc").starts_with("sesion=abc;"));
        assert!(expired_session_cookie().contains("Max-Age=0"));
    }
}
