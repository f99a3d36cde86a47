use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use geoengine_client::core::{ClientError, JobState, ToolInvocation, ToolResult};
use geoengine_client::engine::{ExecutionBackend, RemoteClient};

fn client_for(server: &MockServer) -> RemoteClient {
    let base = url::Url::parse(&server.uri()).unwrap();
    RemoteClient::from_endpoint(base).with_poll_interval(Duration::from_millis(10))
}

fn job_body(id: &str, state: &str) -> serde_json::Value {
    json!({"id": id, "status": state})
}

#[tokio::test]
async fn test_submit_posts_invocation_and_returns_id() {
    let server = MockServer::start().await;

    // The body matcher proves the omission property: an unset input must not
    // appear in the request at all.
    Mock::given(method("POST"))
        .and(path("/api/jobs"))
        .and(body_json(json!({
            "project": "hydrology",
            "tool": "flow_accumulation",
            "inputs": {"dem": "srtm.tif"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-42"})))
        .mount(&server)
        .await;

    let invocation = ToolInvocation::new("hydrology", "flow_accumulation")
        .input("dem", Some("srtm.tif".to_string()))
        .input("mask", None);

    let id = client_for(&server).submit(&invocation).await.unwrap();
    assert_eq!(id, "job-42");
}

#[tokio::test]
async fn test_submit_includes_output_dir_when_set() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/jobs"))
        .and(body_json(json!({
            "project": "demo",
            "tool": "clip",
            "inputs": {},
            "output_dir": "/out"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-1"})))
        .mount(&server)
        .await;

    let invocation = ToolInvocation::new("demo", "clip").output_dir("/out");
    let id = client_for(&server).submit(&invocation).await.unwrap();
    assert_eq!(id, "job-1");
}

#[tokio::test]
async fn test_error_body_surfaces_message_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/jobs"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid project"})),
        )
        .mount(&server)
        .await;

    let invocation = ToolInvocation::new("nope", "clip");
    let err = client_for(&server).submit(&invocation).await.unwrap_err();

    assert!(matches!(err, ClientError::ServiceFailure(_)));
    assert_eq!(err.to_string(), "invalid project");
}

#[tokio::test]
async fn test_error_without_body_falls_back_to_generic_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let err = client_for(&server).status("job-1").await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 500: backend exploded");
}

#[tokio::test]
async fn test_transport_failure_is_distinct_from_service_error() {
    // A dedicated (non-pooled) server actually closes its listener on drop;
    // the pooled `MockServer::start()` keeps the port alive and would answer
    // with a 404 instead of refusing the connection.
    let server = MockServer::builder().start().await;
    let client = client_for(&server);
    drop(server);

    let err = client.status("job-1").await.unwrap_err();
    assert!(matches!(err, ClientError::Unreachable(_)));
    assert!(err
        .to_string()
        .starts_with("Cannot connect to GeoEngine service"));
}

#[tokio::test]
async fn test_polling_is_idempotent_before_terminal_state() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-1", "running")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.status("job-1").await.unwrap();
    let second = client.status("job-1").await.unwrap();

    assert_eq!(first.state, JobState::Running);
    assert_eq!(second.state, JobState::Running);
}

#[tokio::test]
async fn test_wait_observes_every_status_until_completed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-1", "running")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-1", "completed")))
        .mount(&server)
        .await;

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let status = client_for(&server)
        .wait("job-1", Duration::from_millis(10), None, move |status| {
            sink.lock().unwrap().push(status.state);
        })
        .await
        .unwrap();

    assert_eq!(status.state, JobState::Completed);
    // Repeated running observations are delivered, not deduplicated.
    assert_eq!(
        *observed.lock().unwrap(),
        vec![JobState::Running, JobState::Running, JobState::Completed]
    );
}

#[tokio::test]
async fn test_wait_surfaces_failed_job_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-1", "status": "failed", "error": "out of memory"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .wait("job-1", Duration::from_millis(10), None, |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ServiceFailure(_)));
    assert_eq!(err.to_string(), "Job failed: out of memory");
}

#[tokio::test]
async fn test_wait_reports_cancellation_distinctly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-1", "cancelled")))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .wait("job-1", Duration::from_millis(10), None, |_| {})
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
}

#[tokio::test]
async fn test_wait_times_out_after_bounded_polls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-1", "running")))
        .mount(&server)
        .await;

    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    let err = client_for(&server)
        .wait(
            "job-1",
            Duration::from_millis(75),
            Some(Duration::from_millis(150)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Timeout(_)));
    let count = polls.load(Ordering::SeqCst);
    assert!((1..=3).contains(&count), "observed {} polls", count);
}

#[tokio::test]
async fn test_job_output_decodes_file_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/job-1/output"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                {"name": "clip.tif", "path": "/out/clip.tif", "size": 2048},
                {"name": "clip.prj", "path": "/out/clip.prj"}
            ]
        })))
        .mount(&server)
        .await;

    let files = client_for(&server).job_output("job-1").await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "clip.tif");
    assert_eq!(files[0].size, Some(2048));
    assert_eq!(files[1].size, None);
}

#[tokio::test]
async fn test_cancel_returns_resulting_status() {
    let server = MockServer::start().await;

    // The service may lag; a cancel response can still say running.
    Mock::given(method("DELETE"))
        .and(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-1", "running")))
        .mount(&server)
        .await;

    let status = client_for(&server).cancel("job-1").await.unwrap();
    assert_eq!(status.state, JobState::Running);
}

#[tokio::test]
async fn test_project_tools_decodes_declarations() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects/hydrology/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "name": "flow_accumulation",
            "label": "Flow Accumulation",
            "inputs": [{"name": "dem", "param_type": "raster", "required": true}],
            "outputs": [{"name": "accumulation", "param_type": "raster"}]
        }])))
        .mount(&server)
        .await;

    let tools = client_for(&server)
        .project_tools("hydrology")
        .await
        .unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].outputs[0].name, "accumulation");
}

#[tokio::test]
async fn test_health_and_projects_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "healthy", "version": "0.9.3"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "hydrology", "path": "/srv/hydrology", "tools_count": 4}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let health = client.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version.as_deref(), Some("0.9.3"));

    let projects = client.list_projects().await.unwrap();
    assert_eq!(projects[0].name, "hydrology");
    assert_eq!(projects[0].tools_count, Some(4));
}

#[tokio::test]
async fn test_run_tool_completes_and_collects_files() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-9"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-9", "running")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-9", "completed")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-9/output"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"name": "result.tif", "path": "/out/result.tif", "size": 100}]
        })))
        .mount(&server)
        .await;

    let invocation = ToolInvocation::new("demo", "clip").output_dir("/out");
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let mut progress = move |line: &str| sink.lock().unwrap().push(line.to_string());
    let never = || false;

    let result = client_for(&server)
        .run_tool(&invocation, &mut progress, &never)
        .await
        .unwrap();

    match result {
        ToolResult::CompletedNoPayload { exit_code, files } => {
            assert_eq!(exit_code, 0);
            assert_eq!(files.len(), 1);
            assert_eq!(files[0].path, "/out/result.tif");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let lines = lines.lock().unwrap();
    assert!(lines.iter().any(|l| l == "Job submitted: job-9"));
    assert!(lines.iter().any(|l| l == "Status: running"));
    assert!(lines.iter().any(|l| l == "Status: completed"));
}

#[tokio::test]
async fn test_run_tool_failure_becomes_failure_variant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-3"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-3", "status": "failed", "error": "raster not found"
        })))
        .mount(&server)
        .await;

    let invocation = ToolInvocation::new("demo", "clip");
    let mut progress = |_: &str| {};
    let never = || false;

    let result = client_for(&server)
        .run_tool(&invocation, &mut progress, &never)
        .await
        .unwrap();

    match result {
        ToolResult::Failure { reason } => assert_eq!(reason, "Job failed: raster not found"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_run_tool_cancellation_issues_delete_then_observes_terminal_state() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-5"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/jobs/job-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-5", "running")))
        .mount(&server)
        .await;
    // One running observation after the cancel request, then terminal.
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-5", "running")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/job-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body("job-5", "cancelled")))
        .mount(&server)
        .await;

    let invocation = ToolInvocation::new("demo", "clip");
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let mut progress = move |line: &str| sink.lock().unwrap().push(line.to_string());
    let always = || true;

    let result = client_for(&server)
        .run_tool(&invocation, &mut progress, &always)
        .await
        .unwrap();

    assert!(matches!(result, ToolResult::Cancelled));
    assert!(lines.lock().unwrap().iter().any(|l| l == "Cancelling job..."));

    let cancels = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .count();
    assert_eq!(cancels, 1, "cancel must be requested exactly once");
}
