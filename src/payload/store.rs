//! The state server that stores viewer payloads behind short links.

use std::collections::HashMap;
use std::sync::Mutex;

use super::model::AnnotationPayload;
use crate::error::{GtbotError, Stage};

/// Stores payloads and hands back a token to load them again.
pub trait PayloadStore: Send + Sync {
    /// Stores `payload`, returning the URL it can be fetched from.
    fn put(&self, payload: &AnnotationPayload) -> Result<String, GtbotError>;

    fn get(&self, token: &str) -> Result<AnnotationPayload, GtbotError>;
}

/// An in-process store.
#[derive(Debug, Default)]
pub struct MemoryPayloadStore {
    states: Mutex<HashMap<String, String>>,
}

impl MemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PayloadStore for MemoryPayloadStore {
    fn put(&self, payload: &AnnotationPayload) -> Result<String, GtbotError> {
        let json =
            serde_json::to_string(payload).map_err(|source| GtbotError::PayloadParse { source })?;
        let mut states = self
            .states
            .lock()
            .map_err(|_| GtbotError::unavailable(Stage::PayloadStore, "memory", "store poisoned"))?;
        let token = format!("memory://state/{}", states.len() + 1);
        states.insert(token.clone(), json);
        Ok(token)
    }

    fn get(&self, token: &str) -> Result<AnnotationPayload, GtbotError> {
        let states = self
            .states
            .lock()
            .map_err(|_| GtbotError::unavailable(Stage::PayloadStore, "memory", "store poisoned"))?;
        let json = states
            .get(token)
            .ok_or_else(|| GtbotError::unavailable(Stage::PayloadStore, token, "no such state"))?;
        super::link::payload_from_json_str(json)
    }
}

/// A JSON state server reached over HTTP.
///
/// `put` POSTs the payload to `post_url`; the server answers with the
/// quoted URL of the stored state. `get` fetches any such URL.
#[cfg(feature = "remote")]
pub struct HttpPayloadStore {
    post_url: String,
    agent: ureq::Agent,
    token: Option<String>,
}

#[cfg(feature = "remote")]
impl HttpPayloadStore {
    pub fn new(post_url: &str, token: Option<String>, timeout: std::time::Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            post_url: post_url.to_string(),
            agent: config.into(),
            token,
        }
    }

    fn auth(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }
}

#[cfg(feature = "remote")]
impl PayloadStore for HttpPayloadStore {
    fn put(&self, payload: &AnnotationPayload) -> Result<String, GtbotError> {
        let mut request = self.agent.post(&self.post_url);
        if let Some(auth) = self.auth() {
            request = request.header("Authorization", &auth);
        }
        let mut response = request
            .send_json(payload)
            .map_err(|e| GtbotError::unavailable(Stage::PayloadStore, &self.post_url, e))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| GtbotError::unavailable(Stage::PayloadStore, &self.post_url, e))?;
        Ok(body.trim().trim_matches('"').to_string())
    }

    fn get(&self, token: &str) -> Result<AnnotationPayload, GtbotError> {
        let mut request = self.agent.get(token);
        if let Some(auth) = self.auth() {
            request = request.header("Authorization", &auth);
        }
        let mut response = request
            .call()
            .map_err(|e| GtbotError::unavailable(Stage::PayloadStore, token, e))?;
        let body = response
            .body_mut()
            .with_config()
            .limit(64 * 1024 * 1024)
            .read_to_vec()
            .map_err(|e| GtbotError::unavailable(Stage::PayloadStore, token, e))?;
        super::link::payload_from_json_slice(&body)
    }
}
