use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use hearth_categorize::{
    run_detection, Detector, HttpClassifier, Pipeline, RecurringPatternRepository, RunOptions,
};
use hearth_core::{AccountId, PipelineStats, RecurringPattern};
use hearth_storage::SqliteStore;

use crate::auth;
use crate::error::ApiError;

pub struct AppState {
    pub store: SqliteStore,
    pub pipeline: Pipeline<HttpClassifier>,
    pub detector: Detector,
    pub api_token_sha256: String,
    /// Trigger-level serialization of runs. The engine itself takes no
    /// locks; overlapping runs are the caller's problem to prevent,
    /// and this server is that caller.
    pub run_guard: Mutex<()>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/categorization/run", post(run_categorization))
        .route("/api/recurring/detect", post(detect_recurring))
        .route("/api/recurring", get(list_recurring))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    account_id: Option<i64>,
    #[serde(default)]
    reprocess: bool,
}

#[derive(Serialize)]
struct RunResponse {
    success: bool,
    stats: PipelineStats,
    message: String,
}

#[derive(Serialize)]
struct DetectResponse {
    success: bool,
    detected: u32,
    created: u32,
    updated: u32,
    message: String,
}

#[derive(Serialize)]
struct PatternsResponse {
    success: bool,
    patterns: Vec<RecurringPattern>,
}

/// A missing body means "run with defaults"; anything else malformed is
/// the caller's mistake.
fn parse_body(payload: Result<Json<RunRequest>, JsonRejection>) -> Result<RunRequest, ApiError> {
    match payload {
        Ok(Json(request)) => Ok(request),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(RunRequest::default()),
        Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
    }
}

fn summary_message(stats: &PipelineStats) -> String {
    format!(
        "Categorized {} of {} transactions: {} by rule, {} from bank data, {} transfers, {} by AI, {} unmatched.",
        stats.matched(),
        stats.total,
        stats.rule_matches,
        stats.bank_matches,
        stats.transfer_matches,
        stats.ai_matches,
        stats.unmatched
    )
}

async fn run_categorization(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let request = parse_body(payload)?;
    if let Some(account_id) = request.account_id {
        if account_id <= 0 {
            return Err(ApiError::Validation(
                "accountId must be a positive integer".to_string(),
            ));
        }
    }

    let options = RunOptions {
        account: request.account_id.map(AccountId),
        reprocess: request.reprocess,
    };

    let _guard = state.run_guard.lock().await;
    let stats = state.pipeline.run(&state.store, &options).await?;
    let message = summary_message(&stats);
    Ok(Json(RunResponse { success: true, stats, message }))
}

async fn detect_recurring(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DetectResponse>, ApiError> {
    let _guard = state.run_guard.lock().await;
    let outcome = run_detection(&state.store, &state.detector).await?;
    Ok(Json(DetectResponse {
        success: true,
        detected: outcome.detected,
        created: outcome.created,
        updated: outcome.updated,
        message: format!(
            "Detected {} recurring patterns: {} created, {} updated.",
            outcome.detected, outcome.created, outcome.updated
        ),
    }))
}

async fn list_recurring(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PatternsResponse>, ApiError> {
    let patterns = state.store.patterns().await?;
    Ok(Json(PatternsResponse { success: true, patterns }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{NaiveDate, Utc};
    use hearth_categorize::{CategoryRepository, PipelineConfig, TransactionRepository};
    use hearth_core::{
        Account, CategoryRule, Money, RuleMatchType, TransactionKind,
    };
    use hearth_storage::{create_db, seed_default_categories, NewTransaction};
    use sha2::{Digest, Sha256};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    async fn test_app() -> (tempfile::TempDir, SqliteStore, Router) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("hearth.db")).await.unwrap();
        seed_default_categories(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        let state = Arc::new(AppState {
            store: store.clone(),
            pipeline: Pipeline::new(HttpClassifier::new(None).unwrap(), PipelineConfig::default()),
            detector: Detector::default(),
            api_token_sha256: hex::encode(Sha256::digest(TOKEN.as_bytes())),
            run_guard: Mutex::new(()),
        });
        (dir, store, router(state))
    }

    fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
        request.header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (_dir, _store, app) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/categorization/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let (_dir, _store, app) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/recurring")
                    .header(header::AUTHORIZATION, "Bearer not-the-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let (_dir, _store, app) = test_app().await;
        let response = app
            .oneshot(
                authed(Request::builder().method("POST").uri("/api/categorization/run"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn negative_account_id_is_rejected() {
        let (_dir, _store, app) = test_app().await;
        let response = app
            .oneshot(
                authed(Request::builder().method("POST").uri("/api/categorization/run"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"accountId": -4}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_without_body_processes_nothing_on_an_empty_store() {
        let (_dir, _store, app) = test_app().await;
        let response = app
            .oneshot(
                authed(Request::builder().method("POST").uri("/api/categorization/run"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["stats"]["total"], 0);
    }

    #[tokio::test]
    async fn rule_run_end_to_end() {
        let (_dir, store, app) = test_app().await;
        let account = store.insert_account(&Account::new("Checking", "EUR")).await.unwrap();
        let category = store
            .categories()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Subscriptions")
            .unwrap();
        store
            .insert_rule(&CategoryRule {
                id: None,
                pattern: "NETFLIX".to_string(),
                match_type: RuleMatchType::Contains,
                category_id: category.id.unwrap(),
                priority: 10,
                account_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .insert_transaction(&NewTransaction {
                account_id: account,
                date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                description: "NETFLIX.COM PARIS".to_string(),
                amount: Money::from_cents(-1349),
                currency: "EUR".to_string(),
                kind: TransactionKind::Expense,
                bank_category: None,
                import_source: None,
            })
            .await
            .unwrap();

        let response = app
            .oneshot(
                authed(Request::builder().method("POST").uri("/api/categorization/run"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["stats"]["total"], 1);
        assert_eq!(json["stats"]["ruleMatches"], 1);
        let message = json["message"].as_str().unwrap();
        assert!(message.contains("1 by rule"), "{message}");

        let all = store.all_transactions(None).await.unwrap();
        assert_eq!(all[0].category_id, category.id);
    }

    #[tokio::test]
    async fn recurring_detect_then_list() {
        let (_dir, store, app) = test_app().await;
        let account = store.insert_account(&Account::new("Checking", "EUR")).await.unwrap();
        for (month, day) in [(1u32, 5u32), (2, 4), (3, 5), (4, 4), (5, 6)] {
            store
                .insert_transaction(&NewTransaction {
                    account_id: account,
                    date: NaiveDate::from_ymd_opt(2024, month, day).unwrap(),
                    description: "GYM MEMBERSHIP".to_string(),
                    amount: Money::from_cents(-4500),
                    currency: "EUR".to_string(),
                    kind: TransactionKind::Expense,
                    bank_category: None,
                    import_source: None,
                })
                .await
                .unwrap();
        }

        let response = app
            .clone()
            .oneshot(
                authed(Request::builder().method("POST").uri("/api/recurring/detect"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["detected"], 1);
        assert_eq!(json["created"], 1);
        assert_eq!(json["updated"], 0);

        let response = app
            .oneshot(
                authed(Request::builder().method("GET").uri("/api/recurring"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let patterns = json["patterns"].as_array().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0]["cadence"], "monthly");
        assert_eq!(patterns[0]["occurrences"], 5);
    }
}
