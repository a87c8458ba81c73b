//! reqwest implementation of [`ConversionService`].
//!
//! No request timeout is set: conversions of large documents legitimately
//! take minutes, and the user stops a stuck upload through the cancellation
//! token instead.

use super::{error_detail, parse_catalog, ConversionService, ConversionUpload, ModelCatalog};
use crate::config::ClientConfig;
use crate::error::{CatalogError, Ocr2MdError, RequestError, TransportError, CONVERSION_FAILED};
use crate::input::Document;
use crate::lifecycle::CancellationToken;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use tracing::{debug, info, warn};

/// Fallback message when the model list request fails without a detail.
const MODELS_FAILED: &str = "Failed to load models";

/// Conversion service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConversionService {
    client: Client,
    models_url: Url,
    convert_url: Url,
}

impl HttpConversionService {
    pub fn new(config: &ClientConfig) -> Result<Self, Ocr2MdError> {
        let client = Client::builder()
            .user_agent(concat!("ocr2md/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Ocr2MdError::HttpClient(e.to_string()))?;
        Self::with_client(client, &config.base_url)
    }

    /// Use a preconfigured client, e.g. one with proxies or extra roots.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, Ocr2MdError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base = Url::parse(&base).map_err(|e| {
            Ocr2MdError::InvalidConfig(format!("base URL '{}' is invalid: {}", base_url, e))
        })?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| Ocr2MdError::InvalidConfig(format!("cannot resolve {path}: {e}")))
        };
        Ok(Self {
            models_url: join("api/models")?,
            convert_url: join("api/convert")?,
            client,
        })
    }

    async fn send_upload(&self, upload: ConversionUpload) -> Result<Bytes, TransportError> {
        let ConversionUpload {
            document,
            model_id,
            pages,
        } = upload;

        let mut form = Form::new()
            .part("file", file_part(&document))
            .text("model_id", model_id);
        if let Some(pages) = pages {
            form = form.text("pages", pages);
        }

        let response = self
            .client
            .post(self.convert_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        if !status.is_success() {
            let message = error_detail(&body).unwrap_or_else(|| CONVERSION_FAILED.to_string());
            warn!("Conversion request failed: HTTP {} ({})", status, message);
            return Err(TransportError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }
        if body.is_empty() {
            return Err(TransportError::EmptyResult);
        }

        debug!("Received {} bytes of Markdown", body.len());
        Ok(body)
    }
}

impl ConversionService for HttpConversionService {
    async fn list_models(&self) -> Result<ModelCatalog, CatalogError> {
        debug!("GET {}", self.models_url);
        let response = self
            .client
            .get(self.models_url.clone())
            .send()
            .await
            .map_err(|e| CatalogError::Connectivity(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CatalogError::Connectivity(e.to_string()))?;

        if !status.is_success() {
            return Err(CatalogError::Request {
                status: status.as_u16(),
                message: error_detail(&body).unwrap_or_else(|| MODELS_FAILED.to_string()),
            });
        }

        let catalog = parse_catalog(&body)?;
        info!(
            "Loaded {} models from {} vendors",
            catalog.model_count(),
            catalog.vendors.len()
        );
        Ok(catalog)
    }

    async fn convert(
        &self,
        upload: ConversionUpload,
        cancel: CancellationToken,
    ) -> Result<Bytes, RequestError> {
        info!(
            "Uploading '{}' ({} bytes) to {}",
            upload.document.name(),
            upload.document.size(),
            self.convert_url
        );

        // Dropping the request future aborts the connection.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Upload aborted by cancellation");
                Err(RequestError::UserCancelled)
            }
            result = self.send_upload(upload) => result.map_err(RequestError::from),
        }
    }
}

/// The `file` multipart field. The payload is streamed from the shared
/// buffer rather than copied.
fn file_part(document: &Document) -> Part {
    let part = || {
        Part::stream_with_length(Body::from(document.payload().clone()), document.size())
            .file_name(document.name().to_string())
    };
    part().mime_str(document.media_type()).unwrap_or_else(|_| part())
}
