use crate::config::Config;
use crate::models::{BookParameters, ImageQuality, ImageSize};
use crate::services::template::{BOOK_SYSTEM_PROMPT, TemplateError, book_prompt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Unexpected response: {0}")]
    Response(String),
    #[error("No API key configured")]
    MissingCredentials,
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service to constrain its output to a JSON object.
    pub json_response: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub size: ImageSize,
    pub quality: ImageQuality,
}

/// A generative text model: prompt in, completion text out.
#[allow(async_fn_in_trait)]
pub trait TextService {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError>;
}

/// A generative image model returning encoded image bytes.
#[allow(async_fn_in_trait)]
pub trait ImageService {
    /// Checks credentials and reachability before a batch of generations.
    async fn ensure_available(&self) -> Result<(), ServiceError>;

    async fn generate(&self, request: ImageGenerationRequest) -> Result<Vec<u8>, ServiceError>;
}

/// Plain HTTP GET of a binary resource.
#[allow(async_fn_in_trait)]
pub trait Downloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Client for an OpenAI-compatible API.
pub struct LlmClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

impl LlmClient {
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::MissingCredentials);
        }
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(LlmClient {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status,
                body: response_text,
            });
        }

        serde_json::from_str(&response_text).map_err(|e| ServiceError::Response(e.to_string()))
    }
}

impl TextService for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response: ChatCompletionResponse = self.post_json("chat/completions", &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::Response("completion has no content".to_string()))
    }
}

impl ImageService for LlmClient {
    async fn ensure_available(&self) -> Result<(), ServiceError> {
        let response = self
            .client
            .get(format!("{}/models", self.api_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ServiceError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn generate(&self, request: ImageGenerationRequest) -> Result<Vec<u8>, ServiceError> {
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "size": request.size.to_string(),
            "quality": request.quality.as_str(),
            "n": 1,
        });

        let response: ImageGenerationResponse = self.post_json("images/generations", &body).await?;
        let url = response
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| ServiceError::Response("image generation returned no URL".to_string()))?;

        self.fetch(&url).await
    }
}

impl Downloader for LlmClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status,
                body: String::new(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Sampling settings for the book content request.
pub const CONTENT_TEMPERATURE: f32 = 0.7;
pub const CONTENT_MAX_TOKENS: u32 = 4000;

pub fn content_request(params: &BookParameters, model: &str) -> Result<CompletionRequest, ServiceError> {
    Ok(CompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(BOOK_SYSTEM_PROMPT),
            ChatMessage::user(book_prompt(params)?),
        ],
        temperature: CONTENT_TEMPERATURE,
        max_tokens: CONTENT_MAX_TOKENS,
        json_response: true,
    })
}

/// Asks the text service for the whole book as one JSON document.
pub async fn generate_content<S: TextService>(
    service: &S,
    params: &BookParameters,
    model: &str,
) -> Result<String, ServiceError> {
    let request = content_request(params, model)?;
    tracing::debug!(
        "Sending content request ({} prompt chars) to {}",
        request.messages[1].content.len(),
        model
    );
    let text = service.complete(request).await?;
    tracing::debug!("Received {} chars of content", text.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Audience;
    use std::sync::Mutex;

    struct RecordingService {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl TextService for RecordingService {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ServiceError> {
            self.requests.lock().unwrap().push(request);
            Ok("{}".to_string())
        }
    }

    #[tokio::test]
    async fn content_request_carries_prompt_and_sampling() {
        let service = RecordingService {
            requests: Mutex::new(Vec::new()),
        };
        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");

        let text = generate_content(&service, &params, "gpt-4o").await.unwrap();
        assert_eq!(text, "{}");

        let requests = service.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[1].content.contains("'Volcanoes'"));
        assert_eq!(request.temperature, CONTENT_TEMPERATURE);
        assert_eq!(request.max_tokens, CONTENT_MAX_TOKENS);
        assert!(request.json_response);
    }

    #[test]
    fn client_requires_api_key() {
        let mut config = Config::for_tests();
        config.api_key = "  ".to_string();
        assert!(matches!(
            LlmClient::new(&config),
            Err(ServiceError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn stalled_service_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = Config::for_tests();
        config.api_url = format!("http://{addr}");
        config.http_timeout = std::time::Duration::from_millis(200);
        let client = LlmClient::new(&config).unwrap();

        let params = BookParameters::new("Volcanoes", Audience::Children, "7-9");
        let result = generate_content(&client, &params, "gpt-4o").await;
        match result {
            Err(ServiceError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected a timeout, got {other:?}"),
        }
        server.abort();
    }

    #[test]
    fn chat_response_parsing() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hello"));
    }
}
