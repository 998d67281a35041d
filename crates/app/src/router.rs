use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, put},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use kasir_core::Resource;
use kasir_storage::Database;
use kasir_util::AppConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::shell::Shell;
use crate::url::{url_scheme, HostPolicy, UrlGenerator};
use crate::{admin, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    shell: Arc<Shell>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    force_https: bool,
    hosts: Arc<HostPolicy>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, config: &AppConfig) -> Self {
        Self {
            metrics,
            storage,
            shell: Arc::new(Shell::new(config.app_name.clone())),
            clock: Arc::new(Utc::now),
            force_https: config.force_https,
            hosts: Arc::new(HostPolicy::new(
                config.trusted_hosts.clone(),
                config.bind_addr.to_string(),
            )),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn force_https(&self) -> bool {
        self.force_https
    }

    pub fn hosts(&self) -> &HostPolicy {
        &self.hosts
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/admin/:resource", get(admin::index).post(admin::store))
        .route("/admin/:resource/create", get(admin::create))
        .route("/admin/:resource/:id", put(admin::update).delete(admin::destroy))
        .route("/admin/:resource/:id/edit", get(admin::edit))
        .layer(middleware::from_fn_with_state(state.clone(), url_scheme))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn home(Extension(urls): Extension<UrlGenerator>) -> Redirect {
    Redirect::to(&urls.resource_index(Resource::Transaksi))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use kasir_util::Environment;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:8080".parse().expect("addr"),
            environment: Environment::Test,
            database_url: "sqlite::memory:".to_string(),
            app_name: "Kasir".to_string(),
            force_https: false,
            trusted_hosts: vec!["kasir.test".to_string()],
        }
    }

    async fn setup_state() -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let config = test_config();
        let database = Database::connect(&config.database_url)
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");

        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        AppState::new(metrics, database, &config).with_clock(Arc::new(move || fixed))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", "kasir.test")
            .body(Body::empty())
            .unwrap()
    }

    fn inertia_get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", "kasir.test")
            .header("x-inertia", "true")
            .body(Body::empty())
            .unwrap()
    }

    fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "kasir.test")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        serde_json::from_slice(&collected.to_bytes()).expect("json body")
    }

    async fn read_text(response: Response) -> String {
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8")
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .expect("location header")
    }

    async fn create_transaction(app: &Router, code: &str, status: &str) {
        let response = app
            .clone()
            .oneshot(send_json(
                "POST",
                "/admin/transaksi",
                json!({ "code": code, "customer_name": "Sari", "total": 25000, "status": status }),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    fn codes(page: &Value) -> Vec<String> {
        page["props"]["records"]["data"]
            .as_array()
            .expect("records")
            .iter()
            .map(|row| row["code"].as_str().expect("code").to_string())
            .collect()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = app_router(setup_state().await);

        let response = app.oneshot(get("/healthz")).await.expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = app_router(setup_state().await);

        let response = app.oneshot(get("/metrics")).await.expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_text(response).await;
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn root_redirects_to_transactions() {
        let app = app_router(setup_state().await);

        let response = app.oneshot(get("/")).await.expect("handler should respond");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "http://kasir.test/admin/transaksi");
    }

    #[tokio::test]
    async fn full_visit_renders_shell_document() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(get("/admin/laporan-kasir"))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let html = read_text(response).await;
        assert!(html.contains("<title>Laporan Kasir - Kasir</title>"));
        assert!(html.contains(r#"<div id="app" data-page=""#));
        assert!(html.contains("Resources/LaporanKasir/List"));
    }

    #[tokio::test]
    async fn transaksi_list_declares_tabs_in_order() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(inertia_get("/admin/transaksi"))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-inertia").and_then(|v| v.to_str().ok()),
            Some("true")
        );
        let page = read_json(response).await;
        assert_eq!(page["component"], "Resources/Transaksi/List");
        assert_eq!(page["props"]["title"], "Transaksi");
        let keys: Vec<Value> = page["props"]["tabs"]
            .as_array()
            .expect("tabs")
            .iter()
            .map(|tab| tab["key"].clone())
            .collect();
        assert_eq!(keys, vec![Value::Null, json!("pending"), json!("failed"), json!("paid")]);
        assert_eq!(page["props"]["tabs"][0]["label"], "Semua");
        assert_eq!(page["props"]["tabs"][0]["active"], true);
        assert_eq!(page["props"]["widgets"][0]["id"], "transaksi-stats");
    }

    #[tokio::test]
    async fn paid_transaction_only_listed_under_paid_and_all() {
        let app = app_router(setup_state().await);
        create_transaction(&app, "TRX-PAID", "paid").await;
        create_transaction(&app, "TRX-WAIT", "pending").await;

        let mut seen = std::collections::HashMap::new();
        for tab in ["", "?tab=pending", "?tab=failed", "?tab=paid"] {
            let response = app
                .clone()
                .oneshot(inertia_get(&format!("/admin/transaksi{tab}")))
                .await
                .expect("handler should respond");
            seen.insert(tab, codes(&read_json(response).await));
        }

        assert_eq!(seen[""], vec!["TRX-WAIT", "TRX-PAID"]);
        assert_eq!(seen["?tab=paid"], vec!["TRX-PAID"]);
        assert_eq!(seen["?tab=pending"], vec!["TRX-WAIT"]);
        assert!(seen["?tab=failed"].is_empty());
        for tab in ["?tab=pending", "?tab=failed", "?tab=paid"] {
            assert!(seen[tab].iter().all(|code| seen[""].contains(code)));
        }
    }

    #[tokio::test]
    async fn unknown_tab_falls_back_to_all() {
        let app = app_router(setup_state().await);
        create_transaction(&app, "TRX-1", "failed").await;

        let response = app
            .oneshot(inertia_get("/admin/transaksi?tab=refunded"))
            .await
            .expect("handler should respond");
        let page = read_json(response).await;
        assert_eq!(page["props"]["active_tab"], Value::Null);
        assert_eq!(codes(&page), vec!["TRX-1"]);
    }

    #[tokio::test]
    async fn list_and_edit_pages_expose_single_header_action() {
        let state = setup_state().await;
        let app = app_router(state);

        let response = app
            .clone()
            .oneshot(send_json("POST", "/admin/kategori-catatan", json!({ "name": "Kas Kecil" })))
            .await
            .expect("handler should respond");
        let edit_url = location(&response).to_string();
        assert!(edit_url.starts_with("http://kasir.test/admin/kategori-catatan/"));
        let edit_path = edit_url
            .trim_start_matches("http://kasir.test")
            .split('?')
            .next()
            .expect("path")
            .to_string();

        let response = app
            .clone()
            .oneshot(send_json(
                "POST",
                "/admin/laporan-kasir",
                json!({
                    "note_category_id": 1,
                    "report_date": "2024-05-01",
                    "description": "Setoran shift pagi",
                    "amount": 150000
                }),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        for uri in ["/admin/kategori-catatan", "/admin/laporan-kasir"] {
            let page = read_json(app.clone().oneshot(inertia_get(uri)).await.expect("list")).await;
            let actions = page["props"]["header_actions"].as_array().expect("actions");
            assert_eq!(actions.len(), 1, "{uri}");
            assert_eq!(actions[0]["name"], "create");
        }

        for uri in [edit_path.as_str(), "/admin/laporan-kasir/1/edit"] {
            let response = app.clone().oneshot(inertia_get(uri)).await.expect("edit");
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let page = read_json(response).await;
            let actions = page["props"]["header_actions"].as_array().expect("actions");
            assert_eq!(actions.len(), 1, "{uri}");
            assert_eq!(actions[0]["name"], "delete");
            assert_eq!(actions[0]["method"], "delete");
            assert_eq!(actions[0]["confirm"], true);
        }
    }

    #[tokio::test]
    async fn laporan_kasir_title_is_literal() {
        let app = app_router(setup_state().await);

        let page = read_json(
            app.oneshot(inertia_get("/admin/laporan-kasir"))
                .await
                .expect("handler should respond"),
        )
        .await;
        assert_eq!(page["props"]["title"], "Laporan Kasir");
    }

    #[tokio::test]
    async fn secure_signal_forces_https_urls() {
        let app = app_router(setup_state().await);

        let secure = Request::builder()
            .method("POST")
            .uri("/admin/transaksi")
            .header("host", "kasir.test")
            .header("https", "on")
            .body(Body::from(json!({ "code": "TRX-S", "total": 1000 }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(secure).await.expect("handler should respond");
        assert!(location(&response).starts_with("https://kasir.test/admin/transaksi/"));

        let plain = send_json("POST", "/admin/transaksi", json!({ "code": "TRX-P", "total": 1000 }));
        let response = app.clone().oneshot(plain).await.expect("handler should respond");
        assert!(location(&response).starts_with("http://kasir.test/admin/transaksi/"));

        let page = read_json(
            app.oneshot(inertia_get("/admin/transaksi"))
                .await
                .expect("handler should respond"),
        )
        .await;
        assert!(page["url"].as_str().expect("url").starts_with("http://"));
    }

    #[tokio::test]
    async fn create_update_delete_round_trip() {
        let app = app_router(setup_state().await);
        create_transaction(&app, "TRX-10", "pending").await;

        let response = app
            .clone()
            .oneshot(send_json(
                "PUT",
                "/admin/transaksi/1",
                json!({ "code": "TRX-10", "total": 30000, "status": "paid" }),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "http://kasir.test/admin/transaksi/1/edit?notice=updated"
        );

        let page = read_json(
            app.clone()
                .oneshot(inertia_get("/admin/transaksi/1/edit?notice=updated"))
                .await
                .expect("edit"),
        )
        .await;
        assert_eq!(page["props"]["record"]["status"], "paid");
        assert_eq!(page["props"]["record"]["total"], 30000);
        assert_eq!(page["props"]["flash"]["type"], "success");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/admin/transaksi/1")
                    .header("host", "kasir.test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "http://kasir.test/admin/transaksi?notice=deleted"
        );

        let response = app
            .oneshot(inertia_get("/admin/transaksi/1/edit"))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validation_failures_are_problem_responses() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(send_json(
                "POST",
                "/admin/transaksi",
                json!({ "code": "  ", "total": -5 }),
            ))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/problem+json")
        );
        let body = read_json(response).await;
        assert_eq!(body["type"], "validation_failed");
        assert!(body["errors"]["code"].is_string());
        assert!(body["errors"]["total"].is_string());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(send_json("POST", "/admin/transaksi", json!({ "code": "TRX", "status": "refunded", "total": 1 })))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(read_json(response).await["type"], "invalid_payload");
    }

    #[tokio::test]
    async fn deleting_category_in_use_conflicts() {
        let app = app_router(setup_state().await);
        app.clone()
            .oneshot(send_json("POST", "/admin/kategori-catatan", json!({ "name": "Setoran" })))
            .await
            .expect("create category");
        app.clone()
            .oneshot(send_json(
                "POST",
                "/admin/laporan-kasir",
                json!({
                    "note_category_id": 1,
                    "report_date": "2024-05-02",
                    "description": "Setoran sore",
                    "amount": 80000
                }),
            ))
            .await
            .expect("create report");

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/admin/kategori-catatan/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn report_with_missing_category_is_unprocessable() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(send_json(
                "POST",
                "/admin/laporan-kasir",
                json!({
                    "note_category_id": 99,
                    "report_date": "2024-05-02",
                    "description": "Tanpa kategori",
                    "amount": 1000
                }),
            ))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json(response).await;
        assert!(body["errors"]["note_category_id"].is_string());
    }

    #[tokio::test]
    async fn create_page_lists_category_options() {
        let app = app_router(setup_state().await);
        app.clone()
            .oneshot(send_json("POST", "/admin/kategori-catatan", json!({ "name": "Operasional" })))
            .await
            .expect("create category");

        let page = read_json(
            app.oneshot(inertia_get("/admin/laporan-kasir/create"))
                .await
                .expect("handler should respond"),
        )
        .await;
        assert_eq!(page["component"], "Resources/LaporanKasir/Create");
        assert_eq!(page["props"]["header_actions"], json!([]));
        assert_eq!(
            page["props"]["options"]["note_category_id"],
            json!([{ "value": 1, "label": "Operasional" }])
        );
        assert_eq!(page["props"]["submit"]["method"], "post");
    }

    #[tokio::test]
    async fn malformed_query_is_a_problem_response() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(get("/admin/transaksi?page=abc"))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/problem+json")
        );
        assert_eq!(read_json(response).await["type"], "invalid_request");
    }

    #[tokio::test]
    async fn non_numeric_id_is_a_problem_response() {
        let app = app_router(setup_state().await);

        for request in [
            get("/admin/transaksi/abc/edit"),
            send_json("PUT", "/admin/transaksi/abc", json!({ "code": "X", "total": 1 })),
            Request::builder()
                .method("DELETE")
                .uri("/admin/transaksi/abc")
                .body(Body::empty())
                .unwrap(),
        ] {
            let response = app
                .clone()
                .oneshot(request)
                .await
                .expect("handler should respond");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(read_json(response).await["type"], "invalid_request");
        }
    }

    #[tokio::test]
    async fn page_url_keeps_pagination_query() {
        let app = app_router(setup_state().await);
        for n in 0..7 {
            create_transaction(&app, &format!("TRX-{n}"), "pending").await;
        }

        let page = read_json(
            app.oneshot(inertia_get("/admin/transaksi?page=2&per_page=5"))
                .await
                .expect("handler should respond"),
        )
        .await;

        assert_eq!(page["url"], "http://kasir.test/admin/transaksi?page=2&per_page=5");
        assert_eq!(page["props"]["records"]["page"], 2);
        assert_eq!(codes(&page), vec!["TRX-1", "TRX-0"]);
    }

    #[tokio::test]
    async fn forged_host_header_is_not_reflected() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("host", "evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "http://127.0.0.1:8080/admin/transaksi");
    }

    #[tokio::test]
    async fn kategori_catatan_list_uses_derived_title() {
        let app = app_router(setup_state().await);

        let page = read_json(
            app.oneshot(inertia_get("/admin/kategori-catatan"))
                .await
                .expect("handler should respond"),
        )
        .await;
        assert_eq!(page["props"]["title"], "Kategori Catatans");
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(get("/admin/pengguna"))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["type"], "unknown_resource");
    }

    #[tokio::test]
    async fn stale_asset_version_requests_full_reload() {
        let app = app_router(setup_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/transaksi")
                    .header("host", "kasir.test")
                    .header("x-inertia", "true")
                    .header("x-inertia-version", "0.0.0-old")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response
                .headers()
                .get("x-inertia-location")
                .and_then(|v| v.to_str().ok()),
            Some("http://kasir.test/admin/transaksi")
        );
    }
}
