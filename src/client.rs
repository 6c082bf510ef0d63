//! HTTP transport to the attendance server.

use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::Settings;
use crate::error::{ClientError, Result};
use crate::upload::UploadRequest;

pub const UPLOAD_ENDPOINT: &str = "/upload";
pub const CAPTURE_ENDPOINT: &str = "/capture";
pub const SHUTDOWN_ENDPOINT: &str = "/shutdown";

/// Body the server answers upload and capture requests with.
///
/// `message` is required: a response without it does not decode, which the
/// callers report the same way as any other failed request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionResult {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct CaptureRequest<'a> {
    #[serde(rename = "rollNumber")]
    roll_number: &'a str,
}

#[derive(Debug, Clone)]
pub struct AttendanceClient {
    http: reqwest::Client,
    base: Url,
}

impl AttendanceClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let base = parse_base_url(&settings.server_url)?;
        let mut builder = reqwest::Client::builder().connect_timeout(settings.connect_timeout());
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|source| ClientError::Transport { endpoint: "client", source })?;

        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, endpoint: &'static str) -> Result<Url> {
        self.base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl {
                url: format!("{}{}", self.base, endpoint),
                reason: e.to_string(),
            })
    }

    /// Enrolls a labeled face image.
    #[instrument(skip_all, fields(label = %request.label, file = %request.file_name))]
    pub async fn upload(&self, request: UploadRequest) -> Result<ActionResult> {
        let url = self.endpoint(UPLOAD_ENDPOINT)?;
        let mime = request.mime_type();

        let part = Part::bytes(request.bytes)
            .file_name(request.file_name)
            .mime_str(mime)
            .map_err(|source| ClientError::Transport { endpoint: UPLOAD_ENDPOINT, source })?;
        let form = Form::new().part("file", part).text("label", request.label);

        debug!(%url, mime, "posting upload");
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ClientError::Transport { endpoint: UPLOAD_ENDPOINT, source })?;

        decode_action_result(UPLOAD_ENDPOINT, response).await
    }

    /// Asks the server to grab a frame and match it.
    ///
    /// Without a roll number the request has no body at all.
    #[instrument(skip_all)]
    pub async fn capture(&self, roll_number: Option<&str>) -> Result<ActionResult> {
        let url = self.endpoint(CAPTURE_ENDPOINT)?;

        let mut request = self.http.post(url.clone());
        if let Some(roll_number) = roll_number {
            request = request.json(&CaptureRequest { roll_number });
        }

        debug!(%url, ?roll_number, "posting capture");
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Transport { endpoint: CAPTURE_ENDPOINT, source })?;

        decode_action_result(CAPTURE_ENDPOINT, response).await
    }

    /// Tells the server to release the camera. The body of the answer is ignored.
    ///
    /// With `strict` set, a non-2xx status is an error; otherwise any answer counts.
    #[instrument(skip_all)]
    pub async fn shutdown(&self, strict: bool) -> Result<StatusCode> {
        let url = self.endpoint(SHUTDOWN_ENDPOINT)?;

        debug!(%url, strict, "posting shutdown");
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|source| ClientError::Transport { endpoint: SHUTDOWN_ENDPOINT, source })?;

        let status = response.status();
        if !status.is_success() {
            if strict {
                return Err(ClientError::Status { endpoint: SHUTDOWN_ENDPOINT, status });
            }
            warn!(%status, "shutdown answered with a non-success status");
        }

        Ok(status)
    }
}

async fn decode_action_result(endpoint: &'static str, response: Response) -> Result<ActionResult> {
    let status = response.status();
    if !status.is_success() {
        // the server explains rejections in the same JSON shape, so keep going
        warn!(endpoint, %status, "non-success status");
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| ClientError::Transport { endpoint, source })?;

    serde_json::from_slice(&body).map_err(|source| ClientError::Decode { endpoint, source })
}

/// Parses the configured server address, making sure endpoints join beneath it.
pub fn parse_base_url(url: &str) -> Result<Url> {
    let mut normalized = url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    let base = Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl {
            url: url.to_string(),
            reason: "expected an http(s) address".to_string(),
        });
    }

    Ok(base)
}
