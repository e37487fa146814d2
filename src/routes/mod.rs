pub mod health;
pub mod report;
pub mod upload;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health))
        .route("/upload", post(upload::upload_files))
        .route("/upload/", post(upload::upload_files))
        .route("/report", get(report::get_report))
        .route("/report/", get(report::get_report))
        .route("/report/pdf", get(report::get_report_pdf))
        .route("/report/render", post(report::render_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use crate::analysis::{Analyzers, CsvAnalyzer, VisionCaptioner};
    use crate::config::Config;
    use crate::llm::{GenerateRequest, GenerateResponse, LlmClient, Provider};
    use crate::pipeline::ReportPipeline;
    use crate::pipeline::narrative::NarrativeSettings;
    use crate::storage::LocalStorage;

    struct Offline;

    #[async_trait::async_trait]
    impl Provider for Offline {
        async fn generate(&self, _req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            Err(anyhow::anyhow!("offline"))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    fn app() -> Router {
        let config = Config::for_tests();
        // Never connects unless a handler touches the database.
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let llm_client = Arc::new(LlmClient {
            primary: Arc::new(Offline),
            fallback: None,
            primary_provider: "openai".to_string(),
            fallback_provider: "none".to_string(),
            fallback_model: String::new(),
            max_retries: 1,
        });
        let pipeline = ReportPipeline {
            analyzers: Analyzers {
                image: Arc::new(VisionCaptioner::new(llm_client.clone(), "gpt-4o-mini")),
                tabular: Arc::new(CsvAnalyzer),
            },
            llm_client,
            narrative: NarrativeSettings {
                model: config.llm_model.clone(),
                temperature: config.report_temperature,
                max_tokens: config.report_max_tokens,
            },
            generation_timeout: Duration::from_secs(1),
        };

        create_router(AppState {
            pool,
            storage: Arc::new(LocalStorage::new(config.upload_dir.clone())),
            pipeline: Arc::new(pipeline),
            config,
        })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "insight-report-generator");
    }

    #[tokio::test]
    async fn test_report_without_file_ids_is_bad_request() {
        let response = app()
            .oneshot(Request::get("/report").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["error"], "file_ids must not be empty");
    }

    #[tokio::test]
    async fn test_render_rejects_non_object_body() {
        let response = app()
            .oneshot(
                Request::post("/report/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("[1, 2, 3]"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Report generation failed")
        );
    }

    #[tokio::test]
    async fn test_render_returns_pdf() {
        let report = r#"{"report": {"summary": "Sales are rising", "key_metrics": {"total_rows": 100}, "trends_and_correlations": {}, "recommendations": ["Increase inventory"]}}"#;
        let response = app()
            .oneshot(
                Request::post("/report/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(report))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("attachment;")
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_render_rejects_deep_metrics() {
        let response = app()
            .oneshot(
                Request::post("/report/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"key_metrics": {"a": {"b": {"c": 1}}}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
