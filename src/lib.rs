//! Client side of a face-recognition attendance kiosk.
//!
//! The attendance server owns the camera, face matching and the attendance
//! sheet. This crate covers the operator's side: enrolling a labeled face
//! image, asking the server to capture and recognize whoever stands in front
//! of the camera, shutting the camera down, and showing the outcome of each
//! of those in a transient status banner.

pub mod actions;
pub mod client;
pub mod config;
pub mod error;
pub mod kiosk;
pub mod notifier;
pub mod render;
pub mod upload;

pub use actions::ActionTriggers;
pub use client::{ActionResult, AttendanceClient};
pub use config::Settings;
pub use error::{ClientError, ValidationError};
pub use notifier::{NotificationKind, NotificationState, Notifier};
pub use upload::{UploadForm, UploadRequest, Uploader};
