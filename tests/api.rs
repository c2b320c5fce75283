#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use portal_proveedores::api::{build_router, AppState};
use portal_proveedores::{
    create_session, hash_password, insert_papers, insert_plates, insert_price_entries,
    insert_shipments, insert_supplier, setup_database, Paper, Plate, PriceEntry, Principal, Role,
    Shipment,
};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::HashMap;
use tower::ServiceExt;

const ANA: &str = "ana@example.com";
const LUIS: &str = "luis@example.com";
const JEFE: &str = "jefe@example.com";

struct TestApp {
    router: Router,
    ana_cookie: String,
    jefe_cookie: String,
}

fn shipment(date: &str, recipient: &str, cost: Option<f64>, status: Option<&str>) -> Shipment {
    Shipment {
        id: 0,
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        recipient: recipient.to_string(),
        description: format!("Envío {}", date),
        total_cost: cost,
        payment_status: status.map(String::from),
        metadata: HashMap::new(),
    }
}

fn plate(width: f64, height: f64, recipient: &str) -> Plate {
    Plate {
        id: 0,
        description: format!("Placa {}x{}", width, height),
        width,
        height,
        recipient: recipient.to_string(),
        metadata: HashMap::new(),
    }
}

fn session_cookie(conn: &Connection, email: &str, name: &str, role: Role) -> String {
    let principal = Principal {
        email: email.to_string(),
        name: name.to_string(),
        role,
    };
    format!("sesion={}", create_session(conn, &principal).unwrap())
}

fn spawn_app() -> TestApp {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();

    insert_supplier(&conn, ANA, "Ana", Role::Proveedor, &hash_password("secreto")).unwrap();
    insert_supplier(&conn, LUIS, "Luis", Role::Proveedor, &hash_password("clave")).unwrap();
    insert_supplier(&conn, JEFE, "Jefe", Role::Admin, &hash_password("admin")).unwrap();

    insert_shipments(
        &conn,
        &[
            shipment("2024-02-20", ANA, Some(30.0), Some("Pagado")),
            shipment("2024-03-05", ANA, Some(100.0), Some(" Pagado ")),
            shipment("2024-03-01", ANA, Some(50.0), None),
            shipment("2024-03-02", LUIS, Some(70.0), Some("Pendiente")),
        ],
    )
    .unwrap();

    let mut blue = plate(50.0, 70.0, ANA);
    blue.metadata.insert("color".to_string(), Value::from("azul"));
    insert_plates(&conn, &[blue, plate(35.0, 50.0, ANA), plate(50.0, 70.0, LUIS)]).unwrap();
    insert_price_entries(
        &conn,
        &[
            PriceEntry {
                id: 0,
                width: 50.0,
                height: 70.0,
                set_price: 1000.0,
                sheets_per_set: 10,
                currency: "USD".to_string(),
            },
            PriceEntry {
                id: 0,
                width: 100.0,
                height: 70.0,
                set_price: 450.0,
                sheets_per_set: 0,
                currency: "EUR".to_string(),
            },
        ],
    )
    .unwrap();
    insert_papers(
        &conn,
        &[
            Paper {
                id: 0,
                name: "Couché".to_string(),
                grammage: None,
                width: 61.0,
                height: 90.0,
                stock: 0,
                metadata: HashMap::new(),
            },
            Paper {
                id: 0,
                name: "Bond".to_string(),
                grammage: Some(90.0),
                width: 70.0,
                height: 100.0,
                stock: 500,
                metadata: HashMap::new(),
            },
        ],
    )
    .unwrap();

    let ana_cookie = session_cookie(&conn, ANA, "Ana", Role::Proveedor);
    let jefe_cookie = session_cookie(&conn, JEFE, "Jefe", Role::Admin);

    TestApp {
        router: build_router(AppState::new(conn, false)),
        ana_cookie,
        jefe_cookie,
    }
}

async fn get(app: &TestApp, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }

    let res = app
        .router
        .clone()
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post_login(app: &TestApp, body: &str) -> axum::response::Response {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_session() {
    let app = spawn_app();
    let (status, body) = get(&app, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn api_without_session_is_unauthorized() {
    let app = spawn_app();

    let (status, body) = get(&app, "/api/envios", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, _) = get(&app, "/api/placas", Some("sesion=not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pages_without_session_redirect_to_login() {
    let app = spawn_app();
    let res = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/envios").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()[header::LOCATION], "/login?next=%2Fenvios");
}

#[tokio::test]
async fn proveedor_sees_own_shipments_grouped_by_month() {
    let app = spawn_app();
    let (status, body) = get(&app, "/api/envios", Some(&app.ana_cookie)).await;

    assert_eq!(status, StatusCode::OK);
    let groups = body.as_array().unwrap();
    assert_eq!(groups.len(), 2);

    assert_eq!(groups[0]["mes"], "2024-03");
    assert_eq!(groups[0]["mes_display"], "Marzo 2024");
    assert_eq!(groups[0]["total_facturado"], 150.0);
    assert_eq!(groups[0]["total_pagado"], 100.0);
    assert_eq!(groups[0]["total_pendiente"], 50.0);
    assert_eq!(groups[0]["envios"][0]["fecha"], "2024-03-05");
    assert_eq!(groups[0]["envios"][0]["estado_pago"], "Pagado");

    assert_eq!(groups[1]["mes_display"], "Febrero 2024");
    assert_eq!(groups[1]["total_pendiente"], 0.0);
}

#[tokio::test]
async fn proveedor_cannot_widen_scope() {
    let app = spawn_app();

    let (status, body) = get(&app, "/api/envios?proveedor=all", Some(&app.ana_cookie)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = get(&app, "/api/envios?proveedor=luis%40example.com", Some(&app.ana_cookie)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get(&app, "/api/envios?proveedor=default", Some(&app.ana_cookie)).await;
    assert_eq!(status, StatusCode::OK);

    // Naming yourself is the same as the default scope
    let (status, own) = get(&app, "/api/envios?proveedor=ana%40example.com", Some(&app.ana_cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(own.as_array().unwrap().len(), 2);

    let (status, _) = get(&app, "/api/proveedores", Some(&app.ana_cookie)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_selects_scope() {
    let app = spawn_app();

    // Default scope is the admin's own shipments (none)
    let (_, own) = get(&app, "/api/envios", Some(&app.jefe_cookie)).await;
    assert_eq!(own.as_array().unwrap().len(), 0);

    let (_, all) = get(&app, "/api/envios?proveedor=all", Some(&app.jefe_cookie)).await;
    let groups = all.as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["envios"].as_array().unwrap().len(), 3);
    assert_eq!(groups[0]["total_facturado"], 220.0);

    let (_, luis) = get(&app, "/api/envios?proveedor=luis%40example.com", Some(&app.jefe_cookie)).await;
    let groups = luis.as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["total_pendiente"], 70.0);

    // Unknown recipient is a literal filter, not an error
    let (status, nobody) = get(&app, "/api/envios?proveedor=nadie", Some(&app.jefe_cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(nobody.as_array().unwrap().len(), 0);

    let (status, suppliers) = get(&app, "/api/proveedores", Some(&app.jefe_cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suppliers.as_array().unwrap().len(), 3);
    assert!(suppliers[0].get("password_hash").is_none());
}

#[tokio::test]
async fn plates_come_with_prices() {
    let app = spawn_app();
    let (status, body) = get(&app, "/api/placas_con_costos", Some(&app.ana_cookie)).await;

    assert_eq!(status, StatusCode::OK);
    let plates = body.as_array().unwrap();
    assert_eq!(plates.len(), 2, "proveedor only sees own plates");

    assert_eq!(plates[0]["ancho"], 50.0);
    assert_eq!(plates[0]["costo"], 100.0);
    assert_eq!(plates[0]["moneda"], "USD");
    assert_eq!(plates[0]["color"], "azul");

    assert!(plates[1]["costo"].is_null());
    assert!(plates[1]["moneda"].is_null());

    let (_, all) = get(&app, "/api/placas", Some(&app.jefe_cookie)).await;
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn price_list_keeps_insertion_order() {
    let app = spawn_app();
    let (status, body) = get(&app, "/api/costos", Some(&app.ana_cookie)).await;

    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["moneda"], "USD");
    assert_eq!(entries[0]["costo_set"], 1000.0);
    assert_eq!(entries[1]["moneda"], "EUR");
    assert_eq!(entries[1]["placas_por_set"], 0);
}

#[tokio::test]
async fn paper_catalog_sorted_by_name() {
    let app = spawn_app();
    let (status, body) = get(&app, "/api/papeles", Some(&app.ana_cookie)).await;

    assert_eq!(status, StatusCode::OK);
    let papers = body.as_array().unwrap();
    assert_eq!(papers.len(), 2);
    assert_eq!(papers[0]["nombre"], "Bond");
    assert_eq!(papers[0]["gramaje"], 90.0);
    assert_eq!(papers[1]["nombre"], "Couché");
    assert!(papers[1]["gramaje"].is_null());

    let (status, _) = get(&app, "/api/papeles", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pages_render_with_session() {
    let app = spawn_app();

    for uri in ["/", "/envios", "/cotizacion"] {
        let res = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::COOKIE, &app.ana_cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK, "{}", uri);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(bytes.to_vec()).unwrap().contains("<html"), "{}", uri);
    }
}

#[tokio::test]
async fn raw_shipments_are_admin_only() {
    let app = spawn_app();

    let (status, _) = get(&app, "/api/envios/raw", Some(&app.ana_cookie)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = get(&app, "/api/envios/raw", Some(&app.jefe_cookie)).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    // Storage order, untouched status
    assert_eq!(rows[0]["fecha"], "2024-02-20");
    assert_eq!(rows[1]["estado_pago"], " Pagado ");
}

#[tokio::test]
async fn login_with_bad_password_shows_message() {
    let app = spawn_app();
    let res = post_login(&app, "email=ana%40example.com&password=mala").await;

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());

    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Correo o contraseña incorrectos"));
}

#[tokio::test]
async fn login_then_logout() {
    let app = spawn_app();
    let res = post_login(&app, "email=luis%40example.com&password=clave&next=%2Fenvios").await;

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()[header::LOCATION], "/envios");

    let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with("sesion="));

    let (status, me) = get(&app, "/api/me", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], LUIS);
    assert_eq!(me["rol"], "proveedor");

    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert!(res.headers()[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

    let (status, _) = get(&app, "/api/me", Some(&cookie)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
