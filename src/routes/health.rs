use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub redis: ComponentHealth,
    pub mongodb: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

fn healthy(start: std::time::Instant) -> ComponentHealth {
    ComponentHealth {
        status: "ok".to_string(),
        latency_ms: Some(start.elapsed().as_millis() as u64),
    }
}

fn unhealthy() -> ComponentHealth {
    ComponentHealth {
        status: "error".to_string(),
        latency_ms: None,
    }
}

/// GET /health — comprehensive health check with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_start = std::time::Instant::now();
    let db_check = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => healthy(db_start),
        Err(_) => unhealthy(),
    };

    let redis_start = std::time::Instant::now();
    let redis_check = match state.queue.health_check().await {
        Ok(_) => healthy(redis_start),
        Err(_) => unhealthy(),
    };

    let mongo_start = std::time::Instant::now();
    let mongo_check = match state.documents.health_check().await {
        Ok(_) => healthy(mongo_start),
        Err(_) => unhealthy(),
    };

    let all_healthy = [&db_check, &redis_check, &mongo_check]
        .iter()
        .all(|c| c.status == "ok");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            redis: redis_check,
            mongodb: mongo_check,
        },
    };

    (status_code, Json(response))
}
