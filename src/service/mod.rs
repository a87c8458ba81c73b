//! The remote conversion service, as seen by the client.
//!
//! [`ConversionService`] is the seam between the lifecycle controller and the
//! network. [`http::HttpConversionService`] is the production implementation;
//! tests substitute in-memory fakes.
//!
//! ## Wire format
//!
//! ```text
//! GET  /api/models   → 200 {"vendors": [{"name": "OpenAI", "models": [{"name": "GPT-4o", "model_id": "gpt-4o"}]}]}
//! POST /api/convert  multipart: file, model_id, pages (omitted when empty)
//!                    → 200 <markdown bytes>
//!                    → 4xx/5xx {"detail": "human readable message"}
//! ```

pub mod http;

use crate::error::{CatalogError, RequestError};
use crate::input::Document;
use crate::lifecycle::CancellationToken;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// The remote conversion API.
pub trait ConversionService: Send + Sync {
    /// Fetch the available models, grouped by vendor.
    fn list_models(&self) -> impl Future<Output = Result<ModelCatalog, CatalogError>> + Send;

    /// Upload a document and return the converted Markdown payload.
    ///
    /// Implementations must stop promptly once `cancel` is signalled and
    /// return [`RequestError::UserCancelled`] without waiting for a response.
    fn convert(
        &self,
        upload: ConversionUpload,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Bytes, RequestError>> + Send;
}

/// Everything sent in one conversion call.
#[derive(Debug, Clone)]
pub struct ConversionUpload {
    pub document: Document,
    pub model_id: String,
    /// Raw page selector; `None` converts all pages.
    pub pages: Option<String>,
}

// ── Model catalog ────────────────────────────────────────────────────────

/// Available models grouped by vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub vendors: Vec<Vendor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub model_id: String,
}

impl ModelCatalog {
    /// Iterate over every model together with its vendor.
    pub fn models(&self) -> impl Iterator<Item = (&Vendor, &ModelEntry)> {
        self.vendors
            .iter()
            .flat_map(|v| v.models.iter().map(move |m| (v, m)))
    }

    pub fn find(&self, model_id: &str) -> Option<&ModelEntry> {
        self.models()
            .map(|(_, m)| m)
            .find(|m| m.model_id == model_id)
    }

    pub fn model_count(&self) -> usize {
        self.vendors.iter().map(|v| v.models.len()).sum()
    }
}

/// Parse a `/api/models` response body.
///
/// Vendors are normally objects. A flat list of strings is also accepted,
/// where `───── Name ─────` lines open a vendor group and every other string
/// is a model whose name doubles as its identifier.
pub fn parse_catalog(body: &[u8]) -> Result<ModelCatalog, CatalogError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| CatalogError::InvalidPayload)?;
    let entries = value
        .get("vendors")
        .and_then(|v| v.as_array())
        .ok_or(CatalogError::InvalidPayload)?;

    let mut vendors: Vec<Vendor> = Vec::new();
    for entry in entries {
        match entry {
            serde_json::Value::String(label) => match vendor_label(label) {
                Some(name) => vendors.push(Vendor {
                    name: name.to_string(),
                    models: Vec::new(),
                }),
                None => {
                    if vendors.is_empty() {
                        vendors.push(Vendor {
                            name: String::new(),
                            models: Vec::new(),
                        });
                    }
                    if let Some(group) = vendors.last_mut() {
                        group.models.push(ModelEntry {
                            name: label.clone(),
                            model_id: label.clone(),
                        });
                    }
                }
            },
            other => {
                let vendor: Vendor = serde_json::from_value(other.clone())
                    .map_err(|_| CatalogError::InvalidPayload)?;
                vendors.push(vendor);
            }
        }
    }

    let catalog = ModelCatalog { vendors };
    if catalog.model_count() == 0 {
        return Err(CatalogError::Empty);
    }
    Ok(catalog)
}

/// `───── OpenAI ─────` → `OpenAI`
fn vendor_label(s: &str) -> Option<&str> {
    let s = s.trim();
    if !s.starts_with('─') {
        return None;
    }
    let name = s.trim_matches(|c: char| c == '─' || c.is_whitespace());
    (!name.is_empty()).then_some(name)
}

/// The `detail` message of a structured error payload, if there is one.
pub(crate) fn error_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let detail = value.get("detail")?.as_str()?.trim();
    (!detail.is_empty()).then(|| detail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vendor_objects() {
        let body = br#"{"vendors": [
            {"name": "OpenAI", "models": [{"name": "GPT-4o", "model_id": "gpt-4o"}]},
            {"name": "Anthropic", "models": [
                {"name": "Claude", "model_id": "claude-3-5-sonnet"},
                {"name": "Haiku", "model_id": "claude-3-haiku"}
            ]}
        ]}"#;
        let catalog = parse_catalog(body).unwrap();
        assert_eq!(catalog.vendors.len(), 2);
        assert_eq!(catalog.model_count(), 3);
        assert_eq!(catalog.find("claude-3-haiku").map(|m| m.name.as_str()), Some("Haiku"));
        assert!(catalog.find("nope").is_none());
    }

    #[test]
    fn parses_flat_label_list() {
        let body = r#"{"vendors": ["───── OpenAI ─────", "gpt-4o", "───── Volcano ─────", "doubao"]}"#;
        let catalog = parse_catalog(body.as_bytes()).unwrap();
        assert_eq!(catalog.vendors[0].name, "OpenAI");
        assert_eq!(catalog.vendors[1].models[0].model_id, "doubao");
    }

    #[test]
    fn missing_vendors_is_invalid() {
        assert_eq!(parse_catalog(br#"{"models": []}"#), Err(CatalogError::InvalidPayload));
        assert_eq!(parse_catalog(b"not json"), Err(CatalogError::InvalidPayload));
        assert_eq!(parse_catalog(br#"{"vendors": [42]}"#), Err(CatalogError::InvalidPayload));
    }

    #[test]
    fn no_models_is_empty() {
        assert_eq!(parse_catalog(br#"{"vendors": []}"#), Err(CatalogError::Empty));
        assert_eq!(
            parse_catalog(br#"{"vendors": [{"name": "OpenAI"}]}"#),
            Err(CatalogError::Empty)
        );
    }

    #[test]
    fn detail_extraction() {
        assert_eq!(
            error_detail(br#"{"detail": "Invalid model ID"}"#).as_deref(),
            Some("Invalid model ID")
        );
        // FastAPI validation errors carry a list, not a message.
        assert_eq!(error_detail(br#"{"detail": [{"loc": ["body"]}]}"#), None);
        assert_eq!(error_detail(br#"{"detail": "  "}"#), None);
        assert_eq!(error_detail(b"<html>502</html>"), None);
    }
}
