use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testpilot_core::{
    ByteStream, PipelineBackend, RunController, RunHandle, RunPhase, RunSnapshot, StepStatus,
    TestPilotConfig, TestPilotError, TestPilotResult, ToolExecution, ToolSafety,
};
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect()
}

fn successful_run_body() -> String {
    sse(&[
        serde_json::json!({"step": "clone", "status": "running", "items": ["Initializing sandbox..."]}),
        serde_json::json!({"step": "clone", "status": "done", "items": ["Cloned petstore"], "sandbox": "scan-1a2b"}),
        serde_json::json!({"step": "deploy-sandbox", "status": "done", "items": ["Sandbox ready"], "sandbox": "scan-1a2b"}),
        serde_json::json!({"step": "extract", "status": "done", "items": ["Total specs extracted: 1"]}),
        serde_json::json!({"step": "ingest", "status": "done", "items": ["petstore: 2 endpoints"]}),
        serde_json::json!({"step": "discover", "status": "done", "items": ["2 tools"]}),
        serde_json::json!({"step": "schema", "status": "done", "items": ["2 schemas"]}),
        serde_json::json!({
            "step": "policy",
            "status": "done",
            "items": ["Policies applied"],
            "toolRows": [
                {"name": "list_pets", "method": "GET", "path": "/pets",
                 "safety": "Enabled", "execution": "Auto Execute", "rateLimit": 60},
                {"name": "create_pet", "method": "POST", "path": "/pets",
                 "safety": "Enabled", "execution": "Auto Execute", "rateLimit": 60}
            ]
        }),
        serde_json::json!({"step": "generate", "status": "done", "items": ["1 server generated"]}),
        serde_json::json!({"step": "mcp-test", "status": "done", "items": ["Syntax OK"]}),
        serde_json::json!({"step": "deploy", "status": "done", "items": ["1 server deployed"]}),
        serde_json::json!({
            "step": "user-test",
            "status": "done",
            "items": ["2/2 passed"],
            "passed": 2,
            "total": 2,
            "testResults": [{
                "test_name": "list pets",
                "description": "List all pets",
                "passed": true,
                "duration_ms": 840,
                "summary": "Listed 3 pets",
                "narrative": "",
                "analysis": "",
                "steps": [{"action": "call list_pets", "success": true, "duration_ms": 800, "error": null}]
            }]
        }),
        serde_json::json!({"step": "pipeline", "status": "done", "items": ["Repos scanned: 1"]}),
    ])
}

async fn mount_run(server: &MockServer, run_id: &str, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/pipeline/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": run_id})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/pipeline/stream/{}", run_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

fn controller_for(server: &MockServer) -> RunController {
    let mut config = TestPilotConfig::default();
    config.server.base_url = server.uri();
    RunController::from_config(&config).unwrap()
}

async fn wait_for_terminal(controller: &RunController) -> RunSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = controller.snapshot();
            if snapshot.phase.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not finish")
}

mod http_flow {
    use super::*;

    #[tokio::test]
    async fn test_full_run_completes() {
        let server = MockServer::start().await;
        mount_run(&server, "ab12cd34", successful_run_body()).await;
        let controller = controller_for(&server);

        let handle = controller
            .start(&["https://github.com/acme/petstore"])
            .await
            .unwrap();
        let snapshot = wait_for_terminal(&controller).await;

        assert_eq!(handle.as_str(), "ab12cd34");
        assert_eq!(snapshot.phase, RunPhase::Completed);
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.completed.len(), 12);
        assert_eq!(snapshot.active_ordinal, 11);
        assert_eq!(snapshot.viewed_ordinal, 11);
        assert!(snapshot.following);

        assert_eq!(snapshot.step(1).unwrap().sandbox.as_deref(), Some("scan-1a2b"));

        let rows = snapshot.step(7).unwrap().tool_rows.as_ref().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].safety, ToolSafety::Enabled);
        assert_eq!(rows[0].execution, ToolExecution::AutoExecute);

        let tests = snapshot.step(11).unwrap();
        assert_eq!(tests.passed, Some(2));
        assert_eq!(tests.total, Some(2));
        assert_eq!(tests.test_results.as_ref().unwrap()[0].steps[0].error, None);
    }

    #[tokio::test]
    async fn test_pipeline_error_fails_run() {
        let server = MockServer::start().await;
        let body = sse(&[
            serde_json::json!({"step": "clone", "status": "done", "items": ["Cloned"]}),
            serde_json::json!({"step": "deploy-sandbox", "status": "done", "items": []}),
            serde_json::json!({"step": "extract", "status": "error", "items": ["no OpenAPI spec"]}),
            serde_json::json!({"step": "pipeline", "status": "error",
                               "items": ["No OpenAPI specs found in any repository. Pipeline stopped."]}),
        ]);
        mount_run(&server, "deadbeef", body).await;
        let controller = controller_for(&server);

        controller.start(&["https://github.com/acme/empty"]).await.unwrap();
        let snapshot = wait_for_terminal(&controller).await;

        assert_eq!(snapshot.phase, RunPhase::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("No OpenAPI specs found in any repository. Pipeline stopped.")
        );
        assert_eq!(snapshot.step_status(3), StepStatus::Error);
        assert!(!snapshot.completed.contains(&3));
        assert_eq!(snapshot.active_ordinal, 3);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_lines_are_inert() {
        let server = MockServer::start().await;
        let body = format!(
            "{}data: {{broken\n\n: comment\n\ndata: {}\n\n{}",
            sse(&[serde_json::json!({"step": "clone", "status": "done", "items": []})]),
            serde_json::json!({"step": "teleport", "status": "done", "items": ["?"]}),
            sse(&[serde_json::json!({"step": "deploy-sandbox", "status": "running", "items": ["up"]})]),
        );
        mount_run(&server, "cafe0001", body).await;
        let controller = controller_for(&server);

        controller.start(&["u1"]).await.unwrap();
        let snapshot = wait_for_terminal(&controller).await;

        assert_eq!(snapshot.phase, RunPhase::Completed);
        assert_eq!(snapshot.step_data.len(), 2);
        assert_eq!(snapshot.step_status(2), StepStatus::Running);
        assert_eq!(snapshot.active_ordinal, 2);
    }

    #[tokio::test]
    async fn test_rejected_submission_fails_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pipeline/start"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"detail": "No URLs provided"})),
            )
            .mount(&server)
            .await;
        let controller = controller_for(&server);

        let err = controller.start(&["u1"]).await.unwrap_err();

        assert!(matches!(err, TestPilotError::ValidationError(_)));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, RunPhase::Failed);
        assert!(snapshot.error.unwrap().contains("No URLs provided"));
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_run() {
        let mut config = TestPilotConfig::default();
        config.server.base_url = "http://127.0.0.1:9".to_string();
        config.server.connect_timeout_secs = 1;
        let controller = RunController::from_config(&config).unwrap();

        let err = controller.start(&["u1"]).await.unwrap_err();

        assert!(err.is_transport_error());
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, RunPhase::Failed);
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_blank_identifiers_make_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pipeline/start"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let controller = controller_for(&server);

        let err = controller.start(&["", "   "]).await.unwrap_err();

        assert!(matches!(err, TestPilotError::EmptyIdentifiers));
        assert_eq!(controller.snapshot().phase, RunPhase::Idle);
    }

    #[tokio::test]
    async fn test_submission_body_uses_trimmed_identifiers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pipeline/start"))
            .and(body_json(serde_json::json!({"urls": ["u1", "u2"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "r1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/pipeline/stream/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        let controller = controller_for(&server);

        controller.start(&[" u1 ", "", "u2\n"]).await.unwrap();
        let snapshot = wait_for_terminal(&controller).await;

        assert_eq!(snapshot.phase, RunPhase::Completed);
        assert!(snapshot.step_data.is_empty());
        assert!(snapshot.completed.contains(&0));
    }
}

mod cancellation_flow {
    use super::*;

    /// Backend whose event stream is fed by the test through a channel.
    struct ChannelBackend {
        starts: AtomicUsize,
        receiver: Mutex<Option<mpsc::UnboundedReceiver<TestPilotResult<Bytes>>>>,
    }

    impl ChannelBackend {
        fn new() -> (Arc<Self>, mpsc::UnboundedSender<TestPilotResult<Bytes>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let backend = Self {
                starts: AtomicUsize::new(0),
                receiver: Mutex::new(Some(rx)),
            };
            (Arc::new(backend), tx)
        }
    }

    #[async_trait]
    impl PipelineBackend for ChannelBackend {
        fn backend_name(&self) -> &str {
            "channel"
        }

        async fn start_run(&self, _identifiers: &[String]) -> TestPilotResult<RunHandle> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(RunHandle::new("chan-1"))
        }

        async fn open_stream(&self, handle: &RunHandle) -> TestPilotResult<ByteStream> {
            let rx = self
                .receiver
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TestPilotError::RunNotFound(handle.to_string()))?;
            Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            })
            .boxed())
        }
    }

    fn chunk(text: &str) -> TestPilotResult<Bytes> {
        Ok(Bytes::from(text.to_string()))
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_freezes_state() {
        let (backend, tx) = ChannelBackend::new();
        let controller = RunController::new(backend.clone());
        controller.start(&["u1", "u2"]).await.unwrap();

        tx.send(chunk(
            "data: {\"step\":\"clone\",\"status\":\"running\",\"items\":[\"cloning u1\"]}\n\n",
        ))
        .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.snapshot().step(1).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Half a record sits in the decoder buffer when the run is cancelled.
        tx.send(chunk("data: {\"step\":\"clone\",\"status\":\"do")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = controller.snapshot();

        assert!(controller.cancel());
        let _ = tx.send(chunk("ne\",\"items\":[\"cloned\"]}\n\n"));
        let _ = tx.send(chunk(
            "data: {\"step\":\"pipeline\",\"status\":\"error\",\"items\":[\"late\"]}\n\n",
        ));
        drop(tx);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = controller.snapshot();
        assert_eq!(after.phase, RunPhase::Cancelled);
        assert!(!after.is_running);
        assert_eq!(after.step_data, before.step_data);
        assert_eq!(after.completed, before.completed);
        assert_eq!(after.active_ordinal, before.active_ordinal);
        assert!(after.error.is_none());
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_navigation_after_cancel_still_clamps() {
        let (backend, _tx) = ChannelBackend::new();
        let controller = RunController::new(backend);
        controller.start(&["u1"]).await.unwrap();
        controller.cancel();

        assert_eq!(controller.navigate(i64::MAX), 11);
        assert_eq!(controller.navigate(i64::MIN), 0);
        assert!(!controller.snapshot().following);
    }
}
