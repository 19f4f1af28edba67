//! 只读 HTTP 接口
//!
//! 所有路由都是纯读取；未知 ID 返回 404，格式错误的 ID / 时间返回 400。

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::LifecycleError;
use crate::query::{QueryService, UnitHit};
use crate::store::{CaptureUnit, Container, ContainerId, UnitId};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn router(query: QueryService) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/units", get(api_units_list))
        .route("/api/units/range", get(api_units_range))
        .route("/api/units/:id", get(api_unit_get))
        .route("/api/containers", get(api_containers_list))
        .route("/api/containers/:id", get(api_container_get))
        .with_state(query)
}

fn status_of(e: LifecycleError) -> (StatusCode, String) {
    let code = match e {
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}

fn bad_request(what: &str, raw: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, format!("invalid {what}: {raw}"))
}

async fn api_units_list(State(query): State<QueryService>) -> ApiResult<Vec<CaptureUnit>> {
    query.list_units().map(Json).map_err(status_of)
}

async fn api_unit_get(
    State(query): State<QueryService>,
    Path(id): Path<String>,
) -> ApiResult<CaptureUnit> {
    let id: UnitId = id.parse().map_err(|_| bad_request("unit id", &id))?;
    query.get_unit(&id).map(Json).map_err(status_of)
}

async fn api_containers_list(State(query): State<QueryService>) -> ApiResult<Vec<Container>> {
    query.list_containers().map(Json).map_err(status_of)
}

async fn api_container_get(
    State(query): State<QueryService>,
    Path(id): Path<String>,
) -> ApiResult<Container> {
    let id: ContainerId = id.parse().map_err(|_| bad_request("container id", &id))?;
    query.get_container(&id).map(Json).map_err(status_of)
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    start: Option<String>,
    end: Option<String>,
}

fn parse_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, (StatusCode, String)> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| bad_request("timestamp", s))
    })
    .transpose()
}

async fn api_units_range(
    State(query): State<QueryService>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Vec<UnitHit>> {
    let start = parse_time(params.start.as_deref())?;
    let end = parse_time(params.end.as_deref())?;
    query.units_overlapping(start, end).map(Json).map_err(status_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Store};
    use axum::body::Body;
    use axum::http::Request;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (router(QueryService::new(store.clone())), store)
    }

    async fn status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_and_lists() {
        let (app, _) = app();
        assert_eq!(status(app.clone(), "/api/health").await, StatusCode::OK);
        assert_eq!(status(app.clone(), "/api/units").await, StatusCode::OK);
        assert_eq!(status(app, "/api/containers").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let (app, store) = app();
        let unit = CaptureUnit::new(PathBuf::from("a.wav"), Utc::now(), Utc::now(), 1);
        store.insert_unit(&unit).unwrap();

        assert_eq!(
            status(app.clone(), &format!("/api/units/{}", unit.id)).await,
            StatusCode::OK
        );
        assert_eq!(
            status(app.clone(), &format!("/api/units/{}", UnitId::new())).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(app.clone(), &format!("/api/containers/{}", ContainerId::new())).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(status(app, "/api/units/not-a-uuid").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_range_query() {
        let (app, _) = app();
        assert_eq!(
            status(app.clone(), "/api/units/range?start=2020-01-01T10:00:00Z").await,
            StatusCode::OK
        );
        assert_eq!(status(app.clone(), "/api/units/range").await, StatusCode::OK);
        assert_eq!(
            status(app, "/api/units/range?start=yesterday").await,
            StatusCode::BAD_REQUEST
        );
    }
}
