//! `AppError` to HTTP response mapping. No server needed: each test calls
//! `IntoResponse` directly.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use sublym_api::error::AppError;
use sublym_core::error::CoreError;
use sublym_core::quota::RejectionReason;
use sublym_pipeline::PipelineError;

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let (status, json) = error_to_response(AppError::Core(CoreError::NotFound {
        entity: "Dream",
        id: 42,
    }))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Dream with id 42 not found");
}

#[tokio::test]
async fn not_found_by_trace_id_returns_404() {
    let (status, json) = error_to_response(AppError::Core(CoreError::NotFoundByKey {
        entity: "Run",
        key: "trc_missing".into(),
    }))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Run trc_missing not found");
}

#[tokio::test]
async fn conflict_error_returns_409() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Conflict("already running".into()))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn rejection_carries_reason_code_and_message() {
    let (status, json) = error_to_response(AppError::Rejected(
        RejectionReason::MonthlyLimitReached { allowance: 10 },
    ))
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "MONTHLY_LIMIT_REACHED");
    assert_eq!(json["error"], "Monthly limit reached (10 generations per month)");
}

#[tokio::test]
async fn pipeline_errors_map_through() {
    let err: AppError = PipelineError::Rejected(RejectionReason::SubscriptionRequired).into();
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "SUBSCRIPTION_REQUIRED");

    let err: AppError = PipelineError::Core(CoreError::Validation("bad mode".into())).into();
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn io_failures_are_sanitized() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/srv/storage/users/1");
    let err: AppError = PipelineError::Io(io).into();
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}
