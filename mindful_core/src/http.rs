//! HTTP implementation of the practice API.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `POST /practices/start` with `{ "practiceType": ... }`
//! - `PUT /practices/{id}/progress`
//! - `POST /practices/{id}/complete`
//!
//! Bodies use camelCase field names.

use crate::api::{PracticeApi, StartedSession};
use crate::config::ApiConfig;
use crate::types::{Answers, CompletionPayload, ProgressUpdate, SessionId};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    practice_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    practice_id: Option<Value>,
    #[serde(default)]
    is_new_practice: bool,
    form_data: Option<Value>,
    accumulated_seconds: Option<Value>,
    current_page: Option<Value>,
}

impl StartResponse {
    fn into_started(self) -> StartedSession {
        // Ids arrive as strings or numbers depending on the backend
        let session_id = match self.practice_id {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(SessionId::new(s)),
            Some(Value::Number(n)) => Some(SessionId::new(n.to_string())),
            _ => None,
        };
        StartedSession {
            session_id,
            is_new: self.is_new_practice,
            resumed_answers: self.form_data,
            resumed_elapsed_seconds: self.accumulated_seconds,
            resumed_step: self.current_page,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressRequest<'a> {
    current_page: u32,
    total_pages: u32,
    form_data: &'a Answers,
    accumulated_seconds: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    practice_type: &'a str,
    duration_minutes: u64,
    accumulated_seconds: u64,
    form_data: &'a Answers,
}

/// Practice API backed by a remote HTTP service
#[derive(Clone)]
pub struct HttpPracticeApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPracticeApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from the `[api]` config section
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("api.base_url is not set".into()))?;
        Self::new(base_url, config.token.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turn a non-success status into `Error::Api`, keeping the response body
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PracticeApi for HttpPracticeApi {
    async fn start_session(&self, exercise_type: &str) -> Result<StartedSession> {
        let response = self
            .authorize(self.client.post(self.url("/practices/start")))
            .json(&StartRequest {
                practice_type: exercise_type,
            })
            .send()
            .await?;
        let body: StartResponse = check_status(response).await?.json().await?;
        Ok(body.into_started())
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<()> {
        let path = format!("/practices/{}/progress", update.session_id);
        let response = self
            .authorize(self.client.put(self.url(&path)))
            .json(&ProgressRequest {
                current_page: update.step,
                total_pages: update.total_steps,
                form_data: &update.answers,
                accumulated_seconds: update.elapsed_seconds,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: &SessionId,
        payload: &CompletionPayload,
    ) -> Result<()> {
        let path = format!("/practices/{}/complete", session_id);
        let response = self
            .authorize(self.client.post(self.url(&path)))
            .json(&CompleteRequest {
                practice_type: &payload.exercise_type,
                duration_minutes: payload.duration_minutes,
                accumulated_seconds: payload.elapsed_seconds,
                form_data: &payload.answers,
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
