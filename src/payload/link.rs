//! Viewer links and the payloads they carry.
//!
//! A viewer link either embeds its state after `#!` as percent-encoded
//! JSON, or points at a stored state with `?json_url=<url>`.

use url::Url;

use super::model::AnnotationPayload;
use super::store::PayloadStore;
use crate::error::GtbotError;

/// A parsed viewer link.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerLink {
    Inline {
        host: String,
        payload: AnnotationPayload,
    },
    Stored {
        host: String,
        json_url: String,
    },
}

impl ViewerLink {
    /// Parses a link as pasted by a user.
    ///
    /// # Errors
    /// [`GtbotError::InvalidLink`] when the URL is malformed or carries no
    /// state, [`GtbotError::PayloadParse`] when an embedded state is not a
    /// valid payload.
    pub fn parse(link: &str) -> Result<Self, GtbotError> {
        let link = link.trim().trim_start_matches('<').trim_end_matches('>');
        let url = Url::parse(link).map_err(|e| invalid(link, e.to_string()))?;
        let host = format!(
            "{}{}",
            url.origin().ascii_serialization(),
            url.path().trim_end_matches('/')
        );

        if let Some(state) = url.fragment().and_then(|f| f.strip_prefix('!')) {
            let json = urlencoding::decode(state)
                .map_err(|e| invalid(link, format!("state is not UTF-8: {e}")))?;
            let payload = payload_from_json_str(&json)?;
            return Ok(ViewerLink::Inline { host, payload });
        }

        if let Some((_, json_url)) = url.query_pairs().find(|(key, _)| key == "json_url") {
            return Ok(ViewerLink::Stored {
                host,
                json_url: json_url.into_owned(),
            });
        }

        Err(invalid(link, "no '#!' state and no 'json_url' parameter"))
    }

    /// Viewer address without the state part.
    pub fn host(&self) -> &str {
        match self {
            ViewerLink::Inline { host, .. } | ViewerLink::Stored { host, .. } => host,
        }
    }

    /// Produces the payload, fetching it from `store` for stored links.
    pub fn into_payload(self, store: &dyn PayloadStore) -> Result<AnnotationPayload, GtbotError> {
        match self {
            ViewerLink::Inline { payload, .. } => Ok(payload),
            ViewerLink::Stored { json_url, .. } => store.get(&json_url),
        }
    }
}

/// A link that loads its state from `token`, a URL returned by a store.
pub fn share_link(host: &str, token: &str) -> String {
    format!("{}/?json_url={}", host.trim_end_matches('/'), token)
}

/// A link that embeds `payload` directly.
pub fn inline_link(host: &str, payload: &AnnotationPayload) -> Result<String, GtbotError> {
    let json = serde_json::to_string(payload).map_err(|source| GtbotError::PayloadParse { source })?;
    Ok(format!(
        "{}/#!{}",
        host.trim_end_matches('/'),
        urlencoding::encode(&json)
    ))
}

/// Parses a payload from its JSON text.
pub fn payload_from_json_str(json: &str) -> Result<AnnotationPayload, GtbotError> {
    serde_json::from_str(json).map_err(|source| GtbotError::PayloadParse { source })
}

/// Parses a payload from raw bytes.
pub fn payload_from_json_slice(bytes: &[u8]) -> Result<AnnotationPayload, GtbotError> {
    serde_json::from_slice(bytes).map_err(|source| GtbotError::PayloadParse { source })
}

fn invalid(url: &str, message: impl Into<String>) -> GtbotError {
    GtbotError::InvalidLink {
        url: url.to_string(),
        message: message.into(),
    }
}
