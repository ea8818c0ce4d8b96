//! PDF merge and decrypt pipelines for background workers
//!
//! This crate holds everything that does not depend on where the worker
//! runs:
//! - `merge`: combine PDFs, PNGs and JPEGs into one document using lopdf
//! - `decrypt`: remove a user password through an external engine
//! - `worker`: per-pipeline message handlers
//!
//! Hosts (the browser bindings and the native stdio worker) feed parsed
//! [`WorkerCommand`]s in and forward [`WorkerMessage`]s out.

pub mod command;
pub mod decrypt;
pub mod document;
pub mod error;
pub mod event;
pub mod file_kind;
pub mod image;
pub mod merge;
pub mod units;
pub mod worker;

pub use command::{
    DecryptRequest, FileDescriptor, MergeRequest, PreviewEntry, PreviewId, ScaleDimension,
    ScaleSpec, ScaleType, WorkerCommand,
};
pub use decrypt::{DecryptFailure, Decryptor, EngineError, EngineRuntime, InitStage, VirtualFs};
pub use error::PdfToolsError;
pub use event::{EventSink, FnSink, Notice, PdfBlob, WorkerMessage, PDF_MIME};
pub use file_kind::FileKind;
pub use merge::{merge, ItemOutcome};
pub use units::{convert, MeasurementUnit};
pub use worker::{DecryptWorker, MergeWorker};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_dispatch_tags() {
        let merge = serde_json::json!({
            "type": "merge",
            "files": [],
            "filesPreview": [],
            "scaleType": "all",
            "scaleDimension": "height",
            "outputSize": 11,
            "outputSizeUnit": "in",
        });
        let Some(WorkerCommand::Merge(request)) = WorkerCommand::from_json(merge) else {
            panic!("expected merge command");
        };
        assert_eq!(request.scale.scale_type, ScaleType::All);
        assert_eq!(request.scale.output_size_unit, MeasurementUnit::Inch);

        assert!(WorkerCommand::from_json(serde_json::json!({"type": "split"})).is_none());
    }
}
