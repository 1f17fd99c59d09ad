// weather_station - Telemetry ingestion service for a weather station
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::docs;
use crate::metrics::MeasurementMetrics;
use crate::service::{
    Deleted, DeletedCount, Measurement, MeasurementService, MeasurementUpdate, NewMeasurement, ServiceError,
    DEFAULT_LIMIT,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::headers::authorization::Basic;
use axum::headers::Authorization;
use axum::http::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, TypedHeader};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

const OPENMETRICS_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Username and password required for administrative routes.
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password: String,
}

impl AdminCredentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        AdminCredentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Compare both username and password without exiting early on the first mismatch.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything handlers need, shared between all requests.
#[derive(Debug)]
pub struct RequestContext {
    service: MeasurementService,
    metrics: MeasurementMetrics,
    registry: Registry,
    admin: AdminCredentials,
}

impl RequestContext {
    pub fn new(
        service: MeasurementService,
        metrics: MeasurementMetrics,
        registry: Registry,
        admin: AdminCredentials,
    ) -> Self {
        RequestContext {
            service,
            metrics,
            registry,
            admin,
        }
    }
}

/// Errors returned to HTTP callers as a status code and a JSON `{"detail": ...}` body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(_) | ServiceError::InvalidIdentifier(_) => Self::BadRequest(e.to_string()),
            ServiceError::NotFound(_) => Self::NotFound(e.to_string()),
            ServiceError::StorageUnavailable(_) => {
                tracing::error!(message = "storage operation failed", error = %e);
                Self::Unavailable(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized => {
                let body = ErrorBody {
                    detail: "unauthorized".to_owned(),
                };
                return (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, "Basic")], Json(body)).into_response();
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        tracing::debug!(message = "request failed", status = %status, detail = %detail);
        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[derive(Deserialize, Debug)]
pub struct ListParams {
    limit: Option<usize>,
}

/// Build the router for every route the service exposes.
pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/mediciones", get(list).post(create).delete(delete_all))
        .route("/mediciones/ultima", get(latest).put(update_ultima).delete(delete_ultima))
        .route("/mediciones/:id", get(get_one).put(update).delete(delete_one))
        .route("/openapi.json", get(openapi))
        .route("/admin/docs", get(admin_docs))
        .route("/metrics", get(text_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn root() -> Json<Value> {
    Json(serde_json::json!({ "message": "API funcionando" }))
}

async fn create(
    State(context): State<Arc<RequestContext>>,
    body: Result<Json<NewMeasurement>, JsonRejection>,
) -> Result<Json<Measurement>, ApiError> {
    let Json(input) = body?;
    let res = context.service.create(input).await;
    context.metrics.record("create", &res);

    let created = res?;
    context.metrics.observe(&created);
    Ok(Json(created))
}

async fn list(
    State(context): State<Arc<RequestContext>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Measurement>>, ApiError> {
    let Query(params) = params?;
    let res = context
        .service
        .list_recent(params.limit.unwrap_or(DEFAULT_LIMIT))
        .await;
    context.metrics.record("list", &res);
    Ok(Json(res?))
}

async fn latest(State(context): State<Arc<RequestContext>>) -> Result<Json<Measurement>, ApiError> {
    let res = context.service.latest().await;
    context.metrics.record("latest", &res);
    Ok(Json(res?))
}

async fn get_one(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
) -> Result<Json<Measurement>, ApiError> {
    let res = context.service.get(&id).await;
    context.metrics.record("get", &res);
    Ok(Json(res?))
}

async fn update(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
    body: Result<Json<MeasurementUpdate>, JsonRejection>,
) -> Result<Json<Measurement>, ApiError> {
    update_by_id(&context, &id, body).await
}

async fn delete_one(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    delete_by_id(&context, &id).await
}

// The static "ultima" route shadows the id route, so updates and deletes sent to it are
// handled as the id "ultima", which is rejected as malformed.
const LATEST_SEGMENT: &str = "ultima";

async fn update_ultima(
    State(context): State<Arc<RequestContext>>,
    body: Result<Json<MeasurementUpdate>, JsonRejection>,
) -> Result<Json<Measurement>, ApiError> {
    update_by_id(&context, LATEST_SEGMENT, body).await
}

async fn delete_ultima(State(context): State<Arc<RequestContext>>) -> Result<Json<Deleted>, ApiError> {
    delete_by_id(&context, LATEST_SEGMENT).await
}

async fn update_by_id(
    context: &RequestContext,
    id: &str,
    body: Result<Json<MeasurementUpdate>, JsonRejection>,
) -> Result<Json<Measurement>, ApiError> {
    let Json(input) = body?;
    let res = context.service.update(id, input).await;
    context.metrics.record("update", &res);
    Ok(Json(res?))
}

async fn delete_by_id(context: &RequestContext, id: &str) -> Result<Json<Deleted>, ApiError> {
    let res = context.service.delete(id).await;
    context.metrics.record("delete", &res);
    Ok(Json(res?))
}

async fn delete_all(State(context): State<Arc<RequestContext>>) -> Result<Json<DeletedCount>, ApiError> {
    let res = context.service.delete_all().await;
    context.metrics.record("delete_all", &res);
    Ok(Json(res?))
}

async fn openapi() -> Json<Value> {
    Json(docs::openapi())
}

async fn admin_docs(
    State(context): State<Arc<RequestContext>>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
) -> Result<Html<String>, ApiError> {
    match auth {
        Some(TypedHeader(auth)) if context.admin.verify(auth.username(), auth.password()) => {
            Ok(Html(docs::admin_page()))
        }
        _ => {
            tracing::warn!(message = "rejected admin request");
            Err(ApiError::Unauthorized)
        }
    }
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Result<Response, ApiError> {
    let mut buf = String::new();
    encode(&mut buf, &context.registry).map_err(|e| {
        tracing::error!(message = "error encoding metrics", error = %e);
        ApiError::Internal(e.to_string())
    })?;

    tracing::debug!(message = "encoded metrics to text format", num_bytes = buf.len());
    Ok(([(CONTENT_TYPE, OPENMETRICS_FORMAT)], buf).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use axum::body::Body;
    use axum::http::header::AUTHORIZATION;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn app_with_store(store: Arc<MemoryStore>) -> Router {
        let mut registry = Registry::with_prefix("station");
        let metrics = MeasurementMetrics::new(&mut registry);
        let context = RequestContext::new(
            MeasurementService::new(store),
            metrics,
            registry,
            AdminCredentials::new("admin", "secret"),
        );

        router(Arc::new(context))
    }

    fn app() -> Router {
        app_with_store(Arc::new(MemoryStore::new()))
    }

    fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body<T: DeserializeOwned>(res: Response) -> T {
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn reading() -> Value {
        serde_json::json!({
            "precipitacion": 0,
            "velocidad_viento": 1.2,
            "presion_atmosferica": 1013,
            "temperatura": 21.5,
            "humedad": 55,
        })
    }

    async fn create(app: &Router, payload: Value) -> Measurement {
        let res = send(app, json_request("POST", "/mediciones", payload)).await;
        assert_eq!(StatusCode::OK, res.status());
        body(res).await
    }

    #[tokio::test]
    async fn test_root() {
        let res = send(&app(), empty_request("GET", "/")).await;
        assert_eq!(StatusCode::OK, res.status());
        let v: Value = body(res).await;
        assert_eq!("API funcionando", v["message"]);
    }

    #[tokio::test]
    async fn test_create_latest_delete_scenario() {
        let app = app();
        let created = create(&app, reading()).await;
        assert_eq!(24, created.id.len());
        assert_eq!(1013.0, created.presion_atmosferica);

        let res = send(&app, empty_request("GET", "/mediciones/ultima")).await;
        assert_eq!(StatusCode::OK, res.status());
        let latest: Measurement = body(res).await;
        assert_eq!(created, latest);

        let res = send(&app, empty_request("DELETE", &format!("/mediciones/{}", created.id))).await;
        assert_eq!(StatusCode::OK, res.status());
        let deleted: Value = body(res).await;
        assert_eq!(serde_json::json!({ "deleted": true, "id": created.id }), deleted);

        let res = send(&app, empty_request("GET", "/mediciones/ultima")).await;
        assert_eq!(StatusCode::NOT_FOUND, res.status());
        let err: ErrorBody = body(res).await;
        assert!(!err.detail.is_empty());
    }

    #[tokio::test]
    async fn test_create_validation() {
        let app = app();
        let mut out_of_range = reading();
        out_of_range["humedad"] = serde_json::json!(101);
        let res = send(&app, json_request("POST", "/mediciones", out_of_range)).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());

        let mut missing = reading();
        missing.as_object_mut().unwrap().remove("temperatura");
        let res = send(&app, json_request("POST", "/mediciones", missing)).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());
    }

    #[tokio::test]
    async fn test_create_with_timestamp() {
        let app = app();
        let mut with_ts = reading();
        with_ts["timestamp"] = serde_json::json!("2024-03-01T12:00:00Z");
        let created = create(&app, with_ts).await;

        let res = send(&app, empty_request("GET", &format!("/mediciones/{}", created.id))).await;
        let v: Value = body(res).await;
        assert_eq!("2024-03-01T12:00:00Z", v["timestamp"]);
    }

    #[tokio::test]
    async fn test_create_with_timestamp_without_offset() {
        let app = app();
        let mut with_ts = reading();
        with_ts["timestamp"] = serde_json::json!("2024-03-01T12:00:00");
        let created = create(&app, with_ts).await;

        let res = send(&app, empty_request("GET", &format!("/mediciones/{}", created.id))).await;
        let v: Value = body(res).await;
        assert_eq!("2024-03-01T12:00:00Z", v["timestamp"]);
    }

    #[tokio::test]
    async fn test_list_limit_and_order() {
        let app = app();
        for minute in 0..5 {
            let mut r = reading();
            r["temperatura"] = serde_json::json!(minute);
            r["timestamp"] = serde_json::json!(format!("2024-03-01T12:0{}:00Z", minute));
            create(&app, r).await;
        }

        let res = send(&app, empty_request("GET", "/mediciones?limit=2")).await;
        assert_eq!(StatusCode::OK, res.status());
        let list: Vec<Measurement> = body(res).await;
        let temps: Vec<f64> = list.iter().map(|m| m.temperatura).collect();
        assert_eq!(vec![4.0, 3.0], temps);

        let res = send(&app, empty_request("GET", "/mediciones")).await;
        let list: Vec<Measurement> = body(res).await;
        assert_eq!(5, list.len());

        let res = send(&app, empty_request("GET", "/mediciones?limit=-1")).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());
    }

    #[tokio::test]
    async fn test_update() {
        let app = app();
        let created = create(&app, reading()).await;
        let uri = format!("/mediciones/{}", created.id);

        let res = send(&app, json_request("PUT", &uri, serde_json::json!({ "temperatura": 10.0, "humedad": null }))).await;
        assert_eq!(StatusCode::OK, res.status());
        let updated: Measurement = body(res).await;
        assert_eq!(
            Measurement {
                temperatura: 10.0,
                ..created.clone()
            },
            updated
        );

        let res = send(&app, json_request("PUT", &uri, serde_json::json!({ "humedad": null }))).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());

        let res = send(&app, json_request("PUT", "/mediciones/nope", serde_json::json!({ "temperatura": 1 }))).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());

        let missing = format!("/mediciones/{}", crate::store::RecordId::new().to_hex());
        let res = send(&app, json_request("PUT", &missing, serde_json::json!({ "temperatura": 1 }))).await;
        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }

    #[tokio::test]
    async fn test_delete_errors() {
        let app = app();
        let res = send(&app, empty_request("DELETE", "/mediciones/nope")).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());

        let missing = format!("/mediciones/{}", crate::store::RecordId::new().to_hex());
        let res = send(&app, empty_request("DELETE", &missing)).await;
        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }

    #[tokio::test]
    async fn test_latest_path_is_an_invalid_id_for_update_and_delete() {
        let app = app();
        create(&app, reading()).await;

        let res = send(&app, json_request("PUT", "/mediciones/ultima", serde_json::json!({ "temperatura": 1 }))).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());

        let res = send(&app, empty_request("DELETE", "/mediciones/ultima")).await;
        assert_eq!(StatusCode::BAD_REQUEST, res.status());
        let err: ErrorBody = body(res).await;
        assert!(err.detail.contains("ultima"));

        let res = send(&app, empty_request("GET", "/mediciones")).await;
        let list: Vec<Measurement> = body(res).await;
        assert_eq!(1, list.len());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let app = app();
        create(&app, reading()).await;
        create(&app, reading()).await;

        let res = send(&app, empty_request("DELETE", "/mediciones")).await;
        assert_eq!(StatusCode::OK, res.status());
        let v: Value = body(res).await;
        assert_eq!(serde_json::json!({ "deleted": 2 }), v);

        let res = send(&app, empty_request("GET", "/mediciones")).await;
        let list: Vec<Measurement> = body(res).await;
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_storage_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let app = app_with_store(store.clone());
        store.set_available(false);

        let res = send(&app, json_request("POST", "/mediciones", reading())).await;
        assert_eq!(StatusCode::SERVICE_UNAVAILABLE, res.status());
    }

    #[tokio::test]
    async fn test_admin_docs_requires_credentials() {
        let app = app();

        let res = send(&app, empty_request("GET", "/admin/docs")).await;
        assert_eq!(StatusCode::UNAUTHORIZED, res.status());
        assert_eq!("Basic", res.headers()[WWW_AUTHENTICATE]);

        let req = Request::builder()
            .uri("/admin/docs")
            .header(AUTHORIZATION, "Basic YWRtaW46d3Jvbmc=")
            .body(Body::empty())
            .unwrap();
        let res = send(&app, req).await;
        assert_eq!(StatusCode::UNAUTHORIZED, res.status());

        let req = Request::builder()
            .uri("/admin/docs")
            .header(AUTHORIZATION, "Basic YWRtaW46c2VjcmV0")
            .body(Body::empty())
            .unwrap();
        let res = send(&app, req).await;
        assert_eq!(StatusCode::OK, res.status());
    }

    #[tokio::test]
    async fn test_metrics() {
        let app = app();
        create(&app, reading()).await;

        let res = send(&app, empty_request("GET", "/metrics")).await;
        assert_eq!(StatusCode::OK, res.status());
        let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("station_requests_total{operation=\"create\",outcome=\"success\"} 1"));
    }

    #[test]
    fn test_verify_credentials() {
        let admin = AdminCredentials::new("admin", "secret");
        assert!(admin.verify("admin", "secret"));
        assert!(!admin.verify("admin", "secreT"));
        assert!(!admin.verify("admin", "secret1"));
        assert!(!admin.verify("root", "secret"));
        assert!(!admin.verify("", ""));
        assert!(!admin.verify("admi", "secret"));
        assert!(!format!("{:?}", admin).contains("secret"));
    }
}
