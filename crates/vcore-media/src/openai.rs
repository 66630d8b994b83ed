//! Remote AI capabilities: transcription, vision captioning, and text
//! embedding, backed by the OpenAI HTTP API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Transcribes an audio track into an ordered, non-overlapping list of
/// `(t_start, t_end, text)` utterances covering the whole track.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Vec<(f64, f64, String)>>;
}

/// Caption and structured entities for one frame, matching the vision
/// capability output schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionCaption {
    pub caption: String,
    #[serde(default)]
    pub controls: Vec<ControlEntityPayload>,
    #[serde(default)]
    pub text_on_screen: Vec<TextEntityPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlEntityPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub position: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextEntityPayload {
    pub text: String,
    pub position: String,
}

/// Produces a structured caption for one still frame.
#[async_trait]
pub trait VisionCaptioner: Send + Sync {
    async fn caption(&self, image_path: &Path) -> MediaResult<VisionCaption>;
}

/// Embeds a batch of strings into fixed-dimensional vectors, preserving
/// input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> MediaResult<Vec<Vec<f32>>>;
}

fn client() -> MediaResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| MediaError::RequestFailed(e.to_string()))
}

/// `whisper-1`-backed transcriber using the `verbose_json` response format
/// for segment-level timestamps.
pub struct OpenAiTranscriber {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(api_key: impl Into<String>) -> MediaResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            client: client()?,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    /// Points the client at an alternate base URL (tests only).
    #[doc(hidden)]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> MediaResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            client: client()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Vec<(f64, f64, String)>> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| MediaError::RequestFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .text("response_format", "verbose_json")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::RequestFailed(format!(
                "whisper request returned {status}: {body}"
            )));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .segments
            .into_iter()
            .map(|s| (s.start, s.end, s.text))
            .collect())
    }
}

/// `gpt-4o`-backed vision captioner. Requests strict JSON matching the
/// vision capability output schema.
pub struct OpenAiVisionCaptioner {
    api_key: String,
    client: Client,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

const VISION_PROMPT: &str = r#"Describe this video frame. Respond with a single JSON object exactly matching this schema and nothing else:
{"caption":"string","controls":[{"type":"string","label":"string","position":"string"}],"text_on_screen":[{"text":"string","position":"string"}]}"#;

impl OpenAiVisionCaptioner {
    pub fn new(api_key: impl Into<String>) -> MediaResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            client: client()?,
            model: "gpt-4o".to_string(),
        })
    }
}

#[async_trait]
impl VisionCaptioner for OpenAiVisionCaptioner {
    async fn caption(&self, image_path: &Path) -> MediaResult<VisionCaption> {
        let bytes = tokio::fs::read(image_path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let data_url = format!("data:image/jpeg;base64,{encoded}");

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ChatContent::Text {
                        text: VISION_PROMPT.to_string(),
                    },
                    ChatContent::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MediaError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::RequestFailed(format!(
                "vision request returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| MediaError::InvalidResponse("no choices in vision response".into()))?;

        serde_json::from_str(&content)
            .map_err(|e| MediaError::InvalidResponse(format!("schema mismatch: {e}")))
    }
}

/// `text-embedding-3-small`-backed embedder. Callers are responsible for
/// keeping batches at or below the model's input limit; this client sends
/// whatever batch it is given in one request.
pub struct OpenAiEmbedder {
    api_key: String,
    client: Client,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: String,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> MediaResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            client: client()?,
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com".to_string(),
        })
    }

    /// Points the client at an alternate base URL (tests only).
    #[doc(hidden)]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> MediaResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            client: client()?,
            model: "text-embedding-3-small".to_string(),
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> MediaResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MediaError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::RequestFailed(format!(
                "embeddings request returned {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_caption_deserializes_the_published_schema() {
        let json = r#"{"caption":"a screen","controls":[{"type":"button","label":"play","position":"center"}],"text_on_screen":[{"text":"HELLO","position":"top"}]}"#;
        let parsed: VisionCaption = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.caption, "a screen");
        assert_eq!(parsed.controls.len(), 1);
        assert_eq!(parsed.text_on_screen[0].text, "HELLO");
    }

    #[test]
    fn vision_caption_defaults_missing_arrays_to_empty() {
        let json = r#"{"caption":"blank screen"}"#;
        let parsed: VisionCaption = serde_json::from_str(json).unwrap();
        assert!(parsed.controls.is_empty());
        assert!(parsed.text_on_screen.is_empty());
    }

    #[tokio::test]
    async fn transcriber_parses_whisper_segments_from_mock_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "segments": [
                    {"start": 0.0, "end": 6.0, "text": "hello"},
                    {"start": 6.0, "end": 12.0, "text": "world"}
                ]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio_path = dir.path().join("audio.wav");
        tokio::fs::write(&audio_path, b"not real audio").await.unwrap();

        let transcriber = OpenAiTranscriber::with_base_url("sk-test", server.uri()).unwrap();
        let segments = transcriber.transcribe(&audio_path).await.unwrap();

        assert_eq!(
            segments,
            vec![(0.0, 6.0, "hello".to_string()), (6.0, 12.0, "world".to_string())]
        );
    }

    #[tokio::test]
    async fn transcriber_surfaces_non_success_responses_as_request_failed() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio_path = dir.path().join("audio.wav");
        tokio::fs::write(&audio_path, b"not real audio").await.unwrap();

        let transcriber = OpenAiTranscriber::with_base_url("sk-test", server.uri()).unwrap();
        let err = transcriber.transcribe(&audio_path).await.unwrap_err();
        assert!(matches!(err, MediaError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn embedder_returns_empty_vector_without_a_request() {
        let embedder = OpenAiEmbedder::with_base_url("sk-test", "http://unused.invalid").unwrap();
        let result = embedder.embed(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn embedder_reorders_batch_replies_by_input_index() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.2, 0.2]},
                    {"index": 0, "embedding": [0.1, 0.1]}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::with_base_url("sk-test", server.uri()).unwrap();
        let vectors = embedder
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1, 0.1], vec![0.2, 0.2]]);
    }
}
