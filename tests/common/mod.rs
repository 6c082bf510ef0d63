//! In-process stand-in for the attendance server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attendance_kiosk::{ActionTriggers, AttendanceClient, Notifier, Settings, Uploader};
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upload {
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
        label: Option<String>,
    },
    Capture {
        content_type: Option<String>,
        body: Vec<u8>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn message(message: &str) -> Self {
        Self::json(StatusCode::OK, serde_json::json!({ "message": message }).to_string())
    }

    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }

    fn into_response(self) -> Response {
        (self.status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

struct Mock {
    calls: Mutex<Vec<Call>>,
    upload: Reply,
    capture: Reply,
    capture_delay: Duration,
    shutdown: Reply,
}

pub struct MockServer {
    pub url: String,
    mock: Arc<Mock>,
}

impl MockServer {
    pub async fn start(upload: Reply, capture: Reply, shutdown: Reply) -> Self {
        Self::start_with_capture_delay(upload, capture, Duration::ZERO, shutdown).await
    }

    /// Like [`MockServer::start`], with `/capture` taking `capture_delay` to answer.
    pub async fn start_with_capture_delay(upload: Reply, capture: Reply, capture_delay: Duration, shutdown: Reply) -> Self {
        let mock = Arc::new(Mock {
            calls: Mutex::new(Vec::new()),
            upload,
            capture,
            capture_delay,
            shutdown,
        });

        let app = Router::new()
            .route("/upload", post(upload_handler))
            .route("/capture", post(capture_handler))
            .route("/shutdown", post(shutdown_handler))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/"),
            mock,
        }
    }

    pub async fn with_defaults() -> Self {
        Self::start(
            Reply::message("File uploaded successfully"),
            Reply::message("Attendance marked for Alice"),
            Reply::text(StatusCode::OK, "Camera released and windows closed."),
        )
        .await
    }

    pub fn calls(&self) -> Vec<Call> {
        self.mock.calls.lock().unwrap().clone()
    }
}

async fn upload_handler(State(mock): State<Arc<Mock>>, mut multipart: Multipart) -> Response {
    let mut file_name = None;
    let mut content_type = None;
    let mut bytes = Vec::new();
    let mut label = None;

    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name().map(str::to_string).as_deref() {
            Some("file") => {
                file_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                bytes = field.bytes().await.unwrap().to_vec();
            }
            Some("label") => label = Some(field.text().await.unwrap()),
            _ => {}
        }
    }

    mock.calls.lock().unwrap().push(Call::Upload {
        file_name,
        content_type,
        bytes,
        label,
    });
    mock.upload.clone().into_response()
}

async fn capture_handler(State(mock): State<Arc<Mock>>, headers: axum::http::HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    mock.calls.lock().unwrap().push(Call::Capture {
        content_type,
        body: body.to_vec(),
    });
    if !mock.capture_delay.is_zero() {
        tokio::time::sleep(mock.capture_delay).await;
    }
    mock.capture.clone().into_response()
}

async fn shutdown_handler(State(mock): State<Arc<Mock>>) -> Response {
    mock.calls.lock().unwrap().push(Call::Shutdown);
    mock.shutdown.clone().into_response()
}

/// An address nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

pub fn settings_for(url: &str) -> Settings {
    Settings {
        server_url: url.to_string(),
        ..Settings::default()
    }
}

pub struct Harness {
    pub notifier: Notifier,
    pub uploader: Uploader,
    pub triggers: ActionTriggers,
}

pub fn harness(settings: &Settings) -> Harness {
    let client = Arc::new(AttendanceClient::new(settings).unwrap());
    let notifier = Notifier::new(settings.notification_delay());

    Harness {
        uploader: Uploader::new(client.clone(), notifier.clone()),
        triggers: ActionTriggers::new(client, notifier.clone(), settings),
        notifier,
    }
}
