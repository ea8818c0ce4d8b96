//! Per-pipeline message handlers
//!
//! Each worker accepts exactly one message type. Anything else, including a
//! message that failed to parse, is answered with a single error and no
//! progress.

use tracing::warn;

use crate::command::WorkerCommand;
use crate::decrypt::{Decryptor, EngineRuntime};
use crate::event::{EventSink, WorkerMessage};
use crate::merge::merge;

pub const INVALID_MESSAGE: &str = "Invalid message type";
pub const MERGE_INVALID_DESCRIPTION: &str = "Received an invalid message type";
pub const DECRYPT_INVALID_DESCRIPTION: &str = "Unknown error, you can try refreshing the page";

fn reject(description: &str, sink: &mut impl EventSink) {
    warn!("Rejected message: {}", description);
    sink.post(WorkerMessage::error(INVALID_MESSAGE, description));
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MergeWorker;

impl MergeWorker {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, command: Option<&WorkerCommand>, sink: &mut impl EventSink) {
        match command {
            Some(WorkerCommand::Merge(request)) => merge(request, sink),
            _ => reject(MERGE_INVALID_DESCRIPTION, sink),
        }
    }
}

pub struct DecryptWorker<R: EngineRuntime> {
    decryptor: Decryptor<R>,
}

impl<R: EngineRuntime> DecryptWorker<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            decryptor: Decryptor::new(runtime),
        }
    }

    pub fn decryptor(&self) -> &Decryptor<R> {
        &self.decryptor
    }

    pub async fn handle(&self, command: Option<&WorkerCommand>, sink: &mut impl EventSink) {
        match command {
            Some(WorkerCommand::Decrypt(request)) => self.decryptor.decrypt(request, sink).await,
            _ => reject(DECRYPT_INVALID_DESCRIPTION, sink),
        }
    }
}
