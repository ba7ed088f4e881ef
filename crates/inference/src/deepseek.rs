//! Live backend speaking the DeepSeek chat completions API
//!
//! Each operation sends a system prompt describing the expected JSON shape and
//! a user message carrying the media summary plus a base64 prefix of the file.
//! The model is asked for `response_format: json_object` and its message
//! content is parsed as JSON.

use async_trait::async_trait;
use media_insight_common::{
    encode_file_sample, summarize_media, MediaDescriptor, ProcessingError, DEFAULT_SAMPLE_BYTES,
};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{
    AnalysisReport, BackendKind, InferenceBackend, InferenceConfig, InferenceError,
    ModerationVerdict, SubtitleBundle,
};

const ANALYSIS_PROMPT: &str = "You are a multimodal content understanding assistant. Analyze the \
uploaded media and return structured JSON. Always follow this format and use null or empty arrays \
for missing information. Fields: tags (string array), scene (string), emotions (string array), \
moderation (object {level, reasons, suggestions}), recommendations (string array of recommended \
use cases), languages (object keyed by language code, value is a summary in that language). If \
the tasks include subtitles, add a subtitles object keyed by language code with SRT strings.";

const SUBTITLE_PROMPT: &str = "You are an expert in speech and video subtitling. Generate \
multi-language subtitles for the audio/video content and output a JSON object keyed by language \
code whose values are SRT strings. Subtitles must match the media duration and use the requested \
languages. If the media is silent or has too little content, explain so in the subtitles.";

const MODERATION_PROMPT: &str = "You are a content safety reviewer. Identify risks such as \
violence, sexual content, politically sensitive material and illegal activity. Output JSON: \
{riskLevel: 'safe'|'warning'|'block', reasons: [], guidance: ''}.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sample and summary prepared for one backend call
struct PreparedMedia {
    sample_b64: String,
    total_size: u64,
    summary: String,
    descriptor: MediaDescriptor,
}

/// Client for the DeepSeek REST API
pub struct DeepSeekClient {
    http: HttpClient,
    api_key: String,
    endpoint: String,
    model: String,
}

impl DeepSeekClient {
    /// Build a client; fails with [`InferenceError::NotConfigured`] without an API key
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(InferenceError::NotConfigured)?;
        let http = HttpClient::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    /// Read the sample prefix and build the summary off the async runtime
    async fn prepare(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
    ) -> Result<PreparedMedia, InferenceError> {
        let path: PathBuf = media.to_path_buf();
        let mut descriptor = descriptor.clone();

        let prepared = tokio::task::spawn_blocking(move || {
            let (sample_b64, total_size) = encode_file_sample(&path, DEFAULT_SAMPLE_BYTES)?;
            let summary = summarize_media(&path, &mut descriptor)?;
            Ok::<_, ProcessingError>(PreparedMedia {
                sample_b64,
                total_size,
                summary,
                descriptor,
            })
        })
        .await
        .map_err(|e| ProcessingError::Other(format!("Media preparation task failed: {e}")))??;

        Ok(prepared)
    }

    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Value, InferenceError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
            max_tokens,
        };

        debug!("POST {} (model={})", self.endpoint, self.model);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("DeepSeek returned {}: {}", status, body);
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;
        parse_json_content(body)
    }
}

/// Extract `choices[0].message.content` and parse it as JSON
fn parse_json_content(response: ChatResponse) -> Result<Value, InferenceError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| InferenceError::Malformed("response has no message content".to_string()))?;

    serde_json::from_str(&content).map_err(|e| InferenceError::Malformed(e.to_string()))
}

/// Interpret subtitle content, tolerating a `{"subtitles": {...}}` wrapper
fn parse_subtitles(content: Value) -> Result<BTreeMap<String, String>, InferenceError> {
    let content = match content {
        Value::Object(mut map) if map.len() == 1 && map.get("subtitles").is_some_and(Value::is_object) => {
            map.remove("subtitles").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(content)
        .map_err(|e| InferenceError::Malformed(format!("subtitles are not a language map: {e}")))
}

#[async_trait]
impl InferenceBackend for DeepSeekClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Live
    }

    async fn analyze_media(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
        tasks: &[String],
        languages: &[String],
    ) -> Result<AnalysisReport, InferenceError> {
        let prepared = self.prepare(media, descriptor).await?;
        info!(
            "Analyzing {} ({}, tasks={:?})",
            media.display(),
            prepared.descriptor.media_type,
            tasks
        );

        let messages = vec![
            ChatMessage {
                role: "system",
                content: ANALYSIS_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!(
                    "Tasks: {}\nMedia description:\n{}\n\nFile content base64 prefix (<=2MB): {}\nTarget languages: {}",
                    tasks.join(", "),
                    prepared.summary,
                    prepared.sample_b64,
                    languages.join(", ")
                ),
            },
        ];

        let content = self.chat_completion(messages, 0.1, None).await?;
        let Value::Object(mut map) = content else {
            return Err(InferenceError::Malformed(
                "analysis content is not a JSON object".to_string(),
            ));
        };
        map.insert("fileSize".to_string(), Value::from(prepared.total_size));
        map.insert(
            "mediaType".to_string(),
            Value::from(prepared.descriptor.media_type.as_str()),
        );

        serde_json::from_value(Value::Object(map))
            .map_err(|e| InferenceError::Malformed(format!("unexpected analysis shape: {e}")))
    }

    async fn moderate_media(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
    ) -> Result<ModerationVerdict, InferenceError> {
        let prepared = self.prepare(media, descriptor).await?;
        info!("Moderating {}", media.display());

        let messages = vec![
            ChatMessage {
                role: "system",
                content: MODERATION_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!(
                    "Judge the following media.\nMedia description:\n{}\nContent base64 prefix: {}",
                    prepared.summary, prepared.sample_b64
                ),
            },
        ];

        let content = self.chat_completion(messages, 0.1, None).await?;
        serde_json::from_value(content)
            .map_err(|e| InferenceError::Malformed(format!("unexpected moderation shape: {e}")))
    }

    async fn generate_subtitles(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
        languages: &[String],
    ) -> Result<SubtitleBundle, InferenceError> {
        let prepared = self.prepare(media, descriptor).await?;
        info!(
            "Generating subtitles for {} (languages={:?})",
            media.display(),
            languages
        );

        let messages = vec![
            ChatMessage {
                role: "system",
                content: SUBTITLE_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!(
                    "Target languages: {}\nMedia description:\n{}\nBase64 fragment: {}",
                    languages.join(", "),
                    prepared.summary,
                    prepared.sample_b64
                ),
            },
        ];

        let content = self.chat_completion(messages, 0.3, Some(2000)).await?;
        Ok(SubtitleBundle {
            media_type: prepared.descriptor.media_type,
            file_size: prepared.total_size,
            subtitles: parse_subtitles(content)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use media_insight_common::detect_media_type;
    use std::io::Write;
    use std::time::Duration;

    fn chat_response(content: &str) -> ChatResponse {
        serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_json_content() {
        let value = parse_json_content(chat_response(r#"{"tags": ["cat"]}"#)).unwrap();
        assert_eq!(value["tags"][0], "cat");
    }

    #[test]
    fn test_parse_json_content_rejects_prose() {
        let err = parse_json_content(chat_response("Sure! Here are the tags")).unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            parse_json_content(empty),
            Err(InferenceError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_subtitles_unwraps_envelope() {
        let wrapped = serde_json::json!({"subtitles": {"en": "1\n00:00:00,000 --> 00:00:01,000\nHi"}});
        let subtitles = parse_subtitles(wrapped).unwrap();
        assert!(subtitles["en"].ends_with("Hi"));

        let flat = serde_json::json!({"zh": "a", "en": "b"});
        assert_eq!(parse_subtitles(flat).unwrap().len(), 2);

        assert!(parse_subtitles(serde_json::json!(["en"])).is_err());
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = InferenceConfig::default();
        assert!(matches!(
            DeepSeekClient::new(&config),
            Err(InferenceError::NotConfigured)
        ));
    }

    async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/")
    }

    fn live_config(api_base: String) -> InferenceConfig {
        InferenceConfig {
            api_key: Some("test-key".to_string()),
            api_base,
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"hello media").unwrap();
        file
    }

    #[tokio::test]
    async fn test_analyze_against_mock_backend() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["response_format"]["type"], "json_object");
                Json(serde_json::json!({
                    "choices": [{"message": {"content": "{\"tags\":[\"cat\"],\"scene\":\"indoor\",\"moderation\":{\"level\":\"safe\",\"reasons\":[],\"suggestions\":\"ok\"}}"}}]
                }))
            }),
        );
        let client = DeepSeekClient::new(&live_config(spawn_mock(router).await)).unwrap();
        let file = sample_file();
        let descriptor = detect_media_type("notes.txt", None);

        let report = client
            .analyze_media(file.path(), &descriptor, &["auto_tag".to_string()], &["en".to_string()])
            .await
            .unwrap();
        assert_eq!(report.tags, vec!["cat"]);
        assert_eq!(report.file_size, 11);
        assert_eq!(
            report.moderation.map(|m| m.risk_level),
            Some(crate::RiskLevel::Safe)
        );
    }

    #[tokio::test]
    async fn test_analyze_accepts_null_fields() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(serde_json::json!({
                    "choices": [{"message": {"content": "{\"tags\":null,\"scene\":\"indoor\",\"emotions\":null,\"recommendations\":null,\"languages\":null,\"moderation\":{\"level\":\"safe\",\"reasons\":[],\"suggestions\":[\"none\"]}}"}}]
                }))
            }),
        );
        let client = DeepSeekClient::new(&live_config(spawn_mock(router).await)).unwrap();
        let file = sample_file();
        let descriptor = detect_media_type("notes.txt", None);

        let report = client
            .analyze_media(file.path(), &descriptor, &["auto_tag".to_string()], &["en".to_string()])
            .await
            .unwrap();
        assert!(report.tags.is_empty());
        assert!(report.languages.is_empty());
        assert_eq!(report.scene.as_deref(), Some("indoor"));
        assert_eq!(report.moderation.unwrap().guidance, "none");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let client = DeepSeekClient::new(&live_config(spawn_mock(router).await)).unwrap();
        let file = sample_file();
        let descriptor = detect_media_type("notes.txt", None);

        let err = client
            .moderate_media(file.path(), &descriptor)
            .await
            .unwrap_err();
        match err {
            InferenceError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
