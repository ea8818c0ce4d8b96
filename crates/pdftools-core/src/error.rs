use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfToolsError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Input document is encrypted")]
    Encrypted,

    #[error("Failed to decode image: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PdfToolsError {
    /// True when the failure comes from an encrypted source document
    pub fn is_encrypted(&self) -> bool {
        matches!(self, PdfToolsError::Encrypted)
    }
}

impl From<lopdf::Error> for PdfToolsError {
    fn from(e: lopdf::Error) -> Self {
        PdfToolsError::OperationError(e.to_string())
    }
}
