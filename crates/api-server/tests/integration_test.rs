//! Integration tests for API server
//!
//! These tests start the API server on a loopback port, send real HTTP and
//! WebSocket requests, and verify responses. They run against the stand-in
//! inference backend, so no network access or API key is needed.

use futures_util::{SinkExt, StreamExt};
use media_insight_api_server::{serve, ApiState, ServerConfig};
use media_insight_inference::InferenceConfig;
use std::io::Cursor;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

struct TestServer {
    base: String,
    state: ApiState,
    handle: JoinHandle<()>,
    _uploads: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_test_server() -> TestServer {
    let uploads = tempfile::tempdir().expect("Failed to create upload dir");
    let config = ServerConfig {
        upload_dir: uploads.path().to_path_buf(),
        inference: InferenceConfig::default(),
        ..ServerConfig::default()
    };
    let state = ApiState::new(config).expect("Failed to build state");

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local addr");

    let server_state = state.clone();
    let handle = tokio::spawn(async move {
        serve(listener, server_state)
            .await
            .expect("Failed to start server");
    });

    TestServer {
        base: format!("http://{addr}"),
        state,
        handle,
        _uploads: uploads,
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 6, |x, y| image::Rgb([(x * 30) as u8, (y * 40) as u8, 90]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

fn png_part() -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(png_bytes())
        .file_name("photo.png")
        .mime_str("image/png")
        .expect("Invalid MIME")
}

async fn wait_for_terminal_job(client: &reqwest::Client, base: &str, job_id: &str) -> serde_json::Value {
    for _ in 0..300 {
        let job: serde_json::Value = client
            .get(format!("{base}/api/ai/jobs/{job_id}"))
            .send()
            .await
            .expect("Failed to poll job")
            .json()
            .await
            .expect("Failed to parse job");
        if job["status"] == "completed" || job["status"] == "failed" {
            return job;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("Job {job_id} never finished");
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_test_server().await;

    let response = reqwest::get(format!("{}/health", server.base))
        .await
        .expect("Failed to send health check request");
    assert_eq!(response.status(), 200);

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_config_endpoint() {
    let server = start_test_server().await;

    let json: serde_json::Value = reqwest::get(format!("{}/api/ai/config", server.base))
        .await
        .expect("Failed to fetch config")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(json["configured"], false);
    assert_eq!(json["features"]["realtimeSubtitles"], true);
    assert_eq!(json["features"]["enhancement"], true);
}

#[tokio::test]
async fn test_analyze_with_default_tasks() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().part("file", png_part());
    let response = client
        .post(format!("{}/api/ai/analyze", server.base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send analyze request");
    assert_eq!(response.status(), 200);

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["fileName"], "photo.png");
    assert_eq!(json["mediaType"], "image");
    assert_eq!(
        json["tasks"],
        serde_json::json!(["auto_tag", "scene", "emotion", "moderation"])
    );
    assert_eq!(json["languages"], serde_json::json!(["zh", "en"]));
    assert!(json["analysis"].is_object());
    assert_eq!(json["analysis"]["mediaType"], "image");
    assert_eq!(json["moderation"]["riskLevel"], "safe");
    assert_eq!(json["jobs"], serde_json::json!([]));
}

#[tokio::test]
async fn test_analyze_with_background_jobs() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new()
        .part("file", png_part())
        .text("tasks", r#"["subtitles", "enhancement"]"#)
        .text("languages", "en, fr");
    let json: serde_json::Value = client
        .post(format!("{}/api/ai/analyze", server.base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send analyze request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert!(json["analysis"].is_null());
    assert!(json["moderation"].is_null());
    let jobs = json["jobs"].as_array().expect("jobs is not an array");
    assert_eq!(jobs.len(), 2);
    for job in jobs {
        let status = job["status"].as_str().unwrap();
        assert!(status == "pending" || status == "running", "status was {status}");
    }
    assert_eq!(jobs[0]["type"], "subtitles");
    assert_eq!(jobs[0]["label"], "generate-subtitles");
    assert_eq!(jobs[1]["type"], "enhancement");

    let subtitles = wait_for_terminal_job(&client, &server.base, jobs[0]["jobId"].as_str().unwrap()).await;
    assert_eq!(subtitles["status"], "completed");
    assert!(subtitles["error"].is_null());
    assert_eq!(subtitles["result"]["type"], "subtitles");
    assert!(subtitles["result"]["payload"]["subtitles"]["fr"].is_string());

    let enhanced = wait_for_terminal_job(&client, &server.base, jobs[1]["jobId"].as_str().unwrap()).await;
    assert_eq!(enhanced["status"], "completed", "job: {enhanced}");
    assert_eq!(enhanced["result"]["payload"]["fileName"], "enhanced.png");
    assert_eq!(enhanced["result"]["payload"]["resolution"], "12x9");

    let all: serde_json::Value = client
        .get(format!("{}/api/ai/jobs", server.base))
        .send()
        .await
        .expect("Failed to list jobs")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(all.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let server = start_test_server().await;

    let response = reqwest::get(format!("{}/api/ai/jobs/does-not-exist", server.base))
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 404);
    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(json["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_analyze_without_file_is_rejected() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("tasks", "subtitles");
    let response = client
        .post(format!("{}/api/ai/analyze", server.base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send analyze request");
    assert_eq!(response.status(), 400);
    assert!(server.state.aggregator.executor().registry().is_empty().await);
}

async fn next_event<S>(ws: &mut S) -> serde_json::Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let message = tokio::time::timeout(Duration::from_secs(10), ws.next())
        .await
        .expect("Timed out waiting for event")
        .expect("Connection closed")
        .expect("WebSocket error");
    serde_json::from_str(message.to_text().expect("Non-text frame")).expect("Invalid event JSON")
}

#[tokio::test]
async fn test_realtime_session_round_trip() {
    let server = start_test_server().await;
    let url = format!("{}/api/ai/realtime", server.base.replace("http://", "ws://"));
    let (mut ws, _) = connect_async(&url).await.expect("Failed to connect");

    ws.send(Message::text(
        serde_json::json!({"event": "ai-realtime-start", "sessionId": "../escape"}).to_string(),
    ))
    .await
    .unwrap();
    let rejected = next_event(&mut ws).await;
    assert_eq!(rejected["event"], "ai-realtime-error");

    ws.send(Message::text(
        serde_json::json!({
            "event": "ai-realtime-start",
            "sessionId": "live-1",
            "languages": ["zh", "en"]
        })
        .to_string(),
    ))
    .await
    .unwrap();
    let started = next_event(&mut ws).await;
    assert_eq!(started["event"], "ai-realtime-started");
    assert_eq!(started["sessionId"], "live-1");
    assert_eq!(started["languages"], serde_json::json!(["zh", "en"]));

    for chunk in ["AAEC", "AwQF"] {
        ws.send(Message::text(
            serde_json::json!({"event": "ai-realtime-chunk", "sessionId": "live-1", "chunk": chunk})
                .to_string(),
        ))
        .await
        .unwrap();
        let transcript = next_event(&mut ws).await;
        assert_eq!(transcript["event"], "ai-realtime-transcript");
        assert_eq!(transcript["sessionId"], "live-1");
        assert!(transcript["timestamp"].is_number());
        assert_eq!(
            transcript["transcript"]["en"],
            "Configure DEEPSEEK_API_KEY to enable realtime subtitles"
        );
        assert!(transcript["transcript"]["zh"].is_string());
    }

    // Chunks for unknown sessions get no reply
    ws.send(Message::text(
        serde_json::json!({"event": "ai-realtime-chunk", "sessionId": "ghost", "chunk": "AAEC"})
            .to_string(),
    ))
    .await
    .unwrap();

    ws.send(Message::text(
        serde_json::json!({"event": "ai-realtime-stop", "sessionId": "live-1"}).to_string(),
    ))
    .await
    .unwrap();
    let finished = next_event(&mut ws).await;
    assert_eq!(finished["event"], "ai-realtime-finished");
    assert_eq!(finished["sessionId"], "live-1");
    assert_eq!(finished["completed"], true);
    assert!(finished["subtitles"]["zh"].is_string());
    assert!(finished.get("error").is_none());
    assert!(!server.state.sessions.is_active("live-1").await);
}

#[tokio::test]
async fn test_disconnect_discards_sessions() {
    let server = start_test_server().await;
    let url = format!("{}/api/ai/realtime", server.base.replace("http://", "ws://"));
    let (mut ws, _) = connect_async(&url).await.expect("Failed to connect");

    ws.send(Message::text(
        serde_json::json!({"event": "ai-realtime-start"}).to_string(),
    ))
    .await
    .unwrap();
    let started = next_event(&mut ws).await;
    let session_id = started["sessionId"].as_str().unwrap().to_string();
    assert_eq!(started["languages"], serde_json::json!(["zh"]));
    assert!(server.state.sessions.is_active(&session_id).await);

    ws.close(None).await.unwrap();
    drop(ws);

    for _ in 0..100 {
        if server.state.sessions.is_empty().await {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("Session {session_id} survived its connection");
}

async fn wait_for_empty_dir(dir: &std::path::Path) {
    for _ in 0..200 {
        let mut entries = tokio::fs::read_dir(dir).await.expect("Failed to read upload dir");
        if entries.next_entry().await.expect("Failed to list upload dir").is_none() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("{} still holds files", dir.display());
}

#[tokio::test]
async fn test_uploads_removed_after_processing() {
    let server = start_test_server().await;
    let client = reqwest::Client::new();
    let upload_dir = server.state.config.upload_dir.clone();

    let form = reqwest::multipart::Form::new().part("file", png_part());
    let response = client
        .post(format!("{}/api/ai/analyze", server.base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send analyze request");
    assert_eq!(response.status(), 200);
    wait_for_empty_dir(&upload_dir).await;

    let form = reqwest::multipart::Form::new()
        .part("file", png_part())
        .text("tasks", "subtitles,enhancement");
    let json: serde_json::Value = client
        .post(format!("{}/api/ai/analyze", server.base))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send analyze request")
        .json()
        .await
        .expect("Failed to parse JSON");
    for job in json["jobs"].as_array().expect("jobs is not an array") {
        let finished = wait_for_terminal_job(&client, &server.base, job["jobId"].as_str().unwrap()).await;
        assert_eq!(finished["status"], "completed", "job: {finished}");
    }
    wait_for_empty_dir(&upload_dir).await;
}

#[tokio::test]
async fn test_sessions_ignore_other_connections() {
    let server = start_test_server().await;
    let url = format!("{}/api/ai/realtime", server.base.replace("http://", "ws://"));
    let (mut owner, _) = connect_async(&url).await.expect("Failed to connect");
    let (mut other, _) = connect_async(&url).await.expect("Failed to connect");

    owner
        .send(Message::text(
            serde_json::json!({"event": "ai-realtime-start", "sessionId": "private"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(next_event(&mut owner).await["event"], "ai-realtime-started");

    for event in [
        serde_json::json!({"event": "ai-realtime-chunk", "sessionId": "private", "chunk": "AAEC"}),
        serde_json::json!({"event": "ai-realtime-stop", "sessionId": "private"}),
        serde_json::json!({"event": "ai-realtime-start", "sessionId": "bad/id"}),
    ] {
        other.send(Message::text(event.to_string())).await.unwrap();
    }
    // Events are handled in order, so the rejected start is the first reply
    let reply = next_event(&mut other).await;
    assert_eq!(reply["event"], "ai-realtime-error");
    assert_eq!(reply["sessionId"], "bad/id");

    let snapshot = server.state.sessions.get("private").await.expect("Session was stopped");
    assert_eq!(snapshot.descriptor.size_bytes, 0);

    owner
        .send(Message::text(
            serde_json::json!({"event": "ai-realtime-stop", "sessionId": "private"}).to_string(),
        ))
        .await
        .unwrap();
    let finished = next_event(&mut owner).await;
    assert_eq!(finished["event"], "ai-realtime-finished");
    assert!(!server.state.sessions.is_active("private").await);
}
