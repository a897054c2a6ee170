//! Generation backends.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use folio_core::config::{read_api_key, GenerationProvider, GenerationSettings};
use folio_core::{Generator, Prompt, Result, ServiceError};
use folio_embed::http::{default_client, post_json};

/// Chat completions from an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiGenerator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: 1500,
            temperature: 0.0,
        }
    }

    #[must_use]
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    async fn request(&self, prompt: &Prompt) -> std::result::Result<String, ServiceError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(ApiMessage { role: "system", content: system });
        }
        messages.push(ApiMessage { role: "user", content: &prompt.user });
        let body = ChatRequest { model: &self.model, messages, max_tokens: self.max_tokens, temperature: self.temperature };

        let url = format!("{}/chat/completions", self.base_url);
        let resp: ChatResponse = post_json(&self.client, &url, &self.api_key, &body).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ServiceError::Malformed("response has no message content".into()))
    }
}

impl Generator for OpenAiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, std::result::Result<String, ServiceError>> {
        Box::pin(self.request(prompt))
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

const OFFLINE_RESPONSE: &str = "This is a test response based on the documents retrieved. \
It comes from the offline scripted generator, used when no language model is configured. \
In real usage, this would be a response generated from the retrieved documents.";

/// Replays fixed responses in order, cycling when exhausted. Records every
/// prompt it receives.
#[derive(Debug)]
pub struct ScriptedGenerator {
    responses: Vec<String>,
    next: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new(vec![OFFLINE_RESPONSE.to_string()])
    }
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self { responses, next: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, std::result::Result<String, ServiceError>> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).push(prompt.clone());
        let out = if self.responses.is_empty() {
            Err(ServiceError::Malformed("scripted generator has no responses".into()))
        } else {
            let i = self.next.fetch_add(1, Ordering::SeqCst) % self.responses.len();
            Ok(self.responses[i].clone())
        };
        Box::pin(futures::future::ready(out))
    }
}

/// Build the configured generator.
pub fn generator_from_settings(settings: &GenerationSettings, request_timeout: Duration) -> Result<Arc<dyn Generator>> {
    match settings.provider {
        GenerationProvider::Scripted => {
            tracing::info!("using scripted generator");
            Ok(Arc::new(ScriptedGenerator::default()))
        }
        GenerationProvider::OpenAi => {
            let api_key = read_api_key(&settings.api_key_env)?;
            let client = default_client(request_timeout)?;
            tracing::info!(model = %settings.model, "using OpenAI-compatible generator");
            Ok(Arc::new(
                OpenAiGenerator::new(client, &settings.base_url, api_key, &settings.model)
                    .with_sampling(settings.max_tokens, settings.temperature),
            ))
        }
    }
}
