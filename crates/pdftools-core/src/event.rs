//! Outbound worker messages and the sink they are posted to

use serde::Serialize;

pub const PDF_MIME: &str = "application/pdf";

/// Short message plus a longer human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub description: String,
}

impl Notice {
    pub fn new(message: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            description: description.into(),
        }
    }
}

/// Produced document bytes tagged with their MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfBlob {
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(serialize_with = "crate::command::payload::serialize")]
    pub data: Vec<u8>,
}

impl PdfBlob {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            mime_type: PDF_MIME.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WorkerMessage {
    Progress(f64),
    Warning(Notice),
    Error(Notice),
    Success(PdfBlob),
}

impl WorkerMessage {
    pub fn warning(message: impl Into<String>, description: impl Into<String>) -> Self {
        WorkerMessage::Warning(Notice::new(message, description))
    }

    pub fn error(message: impl Into<String>, description: impl Into<String>) -> Self {
        WorkerMessage::Error(Notice::new(message, description))
    }

    /// Error and success end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Error(_) | WorkerMessage::Success(_))
    }
}

/// Receives outbound messages as a task produces them
pub trait EventSink {
    fn post(&mut self, message: WorkerMessage);

    fn progress(&mut self, percent: f64) {
        self.post(WorkerMessage::Progress(percent));
    }
}

impl EventSink for Vec<WorkerMessage> {
    fn post(&mut self, message: WorkerMessage) {
        self.push(message);
    }
}

/// Adapts a closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F: FnMut(WorkerMessage)> EventSink for FnSink<F> {
    fn post(&mut self, message: WorkerMessage) {
        (self.0)(message)
    }
}
