//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the exam endpoints and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ErrorResponse, ExamView, ProgressView, StartExamPayload, SubmitAnswerPayload,
        ToolCallView, TurnView,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::start_exam,
        handlers::submit_answer,
        handlers::resume_exam,
        handlers::get_exam,
    ),
    components(
        schemas(ExamView, ProgressView, TurnView, ToolCallView, StartExamPayload, SubmitAnswerPayload, ErrorResponse)
    ),
    tags(
        (name = "Examiner API", description = "Oral technical exams run by an AI examiner")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/exams", post(handlers::start_exam))
        .route("/exams/{id}", get(handlers::get_exam))
        .route("/exams/{id}/answers", post(handlers::submit_answer))
        .route("/exams/{id}/resume", post(handlers::resume_exam))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionTable;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use examiner_core::tools::{FinishExamArgs, ToolCall, ToolInvocation, TransitionTopicArgs};
    use examiner_core::{
        AdapterError, AgentReply, ExamAgent, ExamOrchestrator, JsonResultLog, StudentRegistry,
        Topic, Transcript,
    };
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct ScriptedAgent {
        replies: Mutex<VecDeque<AgentReply>>,
        delay: Duration,
    }

    #[async_trait]
    impl ExamAgent for ScriptedAgent {
        async fn generate(
            &self,
            _history: &Transcript,
            _current_topic: Option<&Topic>,
            _remaining_topics: &[Topic],
        ) -> AgentReply {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(AgentReply::Error(AdapterError::Timeout))
        }
    }

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        results: Arc<JsonResultLog>,
        _dir: TempDir,
    }

    fn test_app(replies: Vec<AgentReply>) -> TestApp {
        slow_test_app(replies, Duration::ZERO)
    }

    fn slow_test_app(replies: Vec<AgentReply>, delay: Duration) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let agent = Arc::new(ScriptedAgent {
            replies: Mutex::new(replies.into()),
            delay,
        });
        let results = Arc::new(JsonResultLog::in_dir(dir.path()));
        let state = Arc::new(AppState {
            orchestrator: Arc::new(ExamOrchestrator::new(agent, results.clone())),
            registry: Arc::new(StudentRegistry::in_dir(dir.path())),
            catalog: Arc::new(vec![Topic::from("Ownership")]),
            topics_per_exam: 1,
            sessions: Arc::new(SessionTable::default()),
        });
        TestApp {
            router: create_router(state.clone()),
            state,
            results,
            _dir: dir,
        }
    }

    fn text(content: &str) -> AgentReply {
        AgentReply::Text {
            content: content.to_string(),
        }
    }

    fn transition_then_finish() -> Vec<AgentReply> {
        vec![
            AgentReply::ToolCalls {
                calls: vec![ToolCall::new(
                    "call_1",
                    ToolInvocation::TransitionTopic(TransitionTopicArgs {
                        topic_score: 6.0,
                        reasoning: "Partial answer".into(),
                        next_topic_name: None,
                    }),
                )],
            },
            AgentReply::ToolCalls {
                calls: vec![ToolCall::new(
                    "call_2",
                    ToolInvocation::FinishExam(FinishExamArgs {
                        final_score: 6.5,
                        feedback: "Solid basics".into(),
                    }),
                )],
            },
        ]
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn start(app: &TestApp) -> (StatusCode, Value) {
        send(
            &app.router,
            "POST",
            "/exams",
            Some(json!({ "name": "Ada", "email": "ada@example.com" })),
        )
        .await
    }

    #[tokio::test]
    async fn test_start_exam_returns_first_question() {
        let app = test_app(vec![text("What does the borrow checker enforce?")]);

        let (status, body) = start(&app).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["candidate_id"], "ada@example.com");
        assert_eq!(body["topics"], json!(["Ownership"]));
        assert_eq!(body["state"], "awaiting_candidate");
        assert_eq!(body["progress"]["current_topic"], "Ownership");
        assert_eq!(body["transcript"][0]["kind"], "agent_text");
        assert_eq!(
            body["transcript"][1]["text"],
            "What does the borrow checker enforce?"
        );
        assert!(body["error"].is_null());

        let students = app.state.registry.students().await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_start_exam_requires_name_and_email() {
        let app = test_app(vec![]);
        let (status, body) = send(
            &app.router,
            "POST",
            "/exams",
            Some(json!({ "name": "  ", "email": "ada@example.com" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Both name and email are required");
        assert_eq!(app.state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn test_full_exam_is_recorded_and_discarded() {
        let mut replies = vec![text("Explain moves.")];
        replies.extend(transition_then_finish());
        let app = test_app(replies);

        let (_, started) = start(&app).await;
        let id = started["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app.router,
            "POST",
            &format!("/exams/{id}/answers"),
            Some(json!({ "text": "Ownership moves to the callee." })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["finished"], true);
        assert_eq!(body["recorded"], true);
        assert_eq!(body["state"], "finished");
        assert_eq!(body["final_score"], 6.5);
        assert_eq!(body["per_topic_scores"], json!([6.0]));
        assert_eq!(body["feedback"], "Solid basics");

        let results = app.results.results().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].email, "ada@example.com");
        assert_eq!(results[0].score, 6.5);

        let (status, _) = send(&app.router, "GET", &format!("/exams/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_adapter_failure_is_reported_and_resumable() {
        let app = test_app(vec![
            text("Explain moves."),
            AgentReply::Error(AdapterError::Transport("connection reset".into())),
            text("Good. And borrowing?"),
        ]);
        let (_, started) = start(&app).await;
        let id = started["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app.router,
            "POST",
            &format!("/exams/{id}/answers"),
            Some(json!({ "text": "Values move." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].as_str().unwrap().contains("connection reset"));
        assert_eq!(body["state"], "awaiting_candidate");
        assert_eq!(body["transcript"].as_array().unwrap().len(), 3);

        let (status, body) =
            send(&app.router, "POST", &format!("/exams/{id}/resume"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].is_null());
        let transcript = body["transcript"].as_array().unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2]["kind"], "user");
        assert_eq!(transcript[3]["text"], "Good. And borrowing?");
    }

    #[tokio::test]
    async fn test_empty_answer_is_rejected() {
        let app = test_app(vec![text("Explain moves.")]);
        let (_, started) = start(&app).await;
        let id = started["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app.router,
            "POST",
            &format!("/exams/{id}/answers"),
            Some(json!({ "text": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_exam_is_not_found() {
        let app = test_app(vec![]);
        let id = uuid::Uuid::new_v4();

        let (status, body) = send(&app.router, "GET", &format!("/exams/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains(&id.to_string()));

        let (status, _) = send(
            &app.router,
            "POST",
            &format!("/exams/{id}/answers"),
            Some(json!({ "text": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resume_of_open_exam_with_nothing_pending_still_asks() {
        let app = test_app(vec![
            AgentReply::Error(AdapterError::Timeout),
            text("Sorry for the wait. What is ownership?"),
        ]);
        let (status, started) = start(&app).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(started["error"].as_str().unwrap().contains("did not answer in time"));
        let id = started["id"].as_str().unwrap().to_string();

        let (_, body) = send(&app.router, "POST", &format!("/exams/{id}/resume"), None).await;
        assert_eq!(
            body["transcript"][1]["text"],
            "Sorry for the wait. What is ownership?"
        );
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = test_app(vec![]);
        let (status, body) = send(&app.router, "GET", "/api-docs/openapi.json", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/exams"].is_object());
        assert!(body["paths"]["/exams/{id}/resume"].is_object());
    }

    fn answer_request(id: &str, text: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/exams/{id}/answers"))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "text": text }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_exam_finished_after_client_disconnect_is_still_discarded() {
        let mut replies = vec![text("Explain moves.")];
        replies.extend(transition_then_finish());
        let app = slow_test_app(replies, Duration::from_millis(100));

        let (_, started) = start(&app).await;
        let id = started["id"].as_str().unwrap().to_string();

        // The client gives up long before the examiner finishes.
        let dropped = tokio::time::timeout(
            Duration::from_millis(30),
            app.router.clone().oneshot(answer_request(&id, "Values move.")),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;

        let (status, _) = send(&app.router, "GET", &format!("/exams/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.state.sessions.len().await, 0);
        assert_eq!(app.results.results().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_exam_does_not_wait_for_generation() {
        let app = slow_test_app(
            vec![text("Explain moves."), text("And borrowing?")],
            Duration::from_millis(200),
        );
        let (_, started) = start(&app).await;
        let id = started["id"].as_str().unwrap().to_string();

        let pending = tokio::spawn(
            app.router
                .clone()
                .oneshot(answer_request(&id, "Values move.")),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (status, body) = tokio::time::timeout(
            Duration::from_millis(100),
            send(&app.router, "GET", &format!("/exams/{id}"), None),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "The exam is busy with another request");

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = send(&app.router, "GET", &format!("/exams/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcript"][3]["text"], "And borrowing?");
    }
}
