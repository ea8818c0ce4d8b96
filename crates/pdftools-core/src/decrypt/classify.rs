//! Interpretation of the decrypt engine's diagnostic transcript
//!
//! The engine only reports failure as free text on its combined
//! stdout/stderr, so the outcome is recovered by substring matching.

/// Printed when the input carries no encryption dictionary
pub const NOT_ENCRYPTED_MARKER: &str = "This file is not encrypted";

/// Printed for a missing or wrong user password
pub const PASSWORD_MARKER: &str = "Please provide the correct password";

/// Faults of the engine's runtime rather than of the document: the browser
/// bridge reports "JavaScript error", the native toolkit panics
pub const RUNTIME_FAULT_MARKERS: [&str; 2] = ["JavaScript error", "panic:"];

/// Why a run produced no output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptClass {
    NotEncrypted,
    InvalidPassword,
    PasswordRequired,
    EngineFault,
    Unknown,
}

/// Classify a failed run, checking the markers in priority order
pub fn classify(transcript: &str, had_password: bool) -> TranscriptClass {
    if transcript.contains(NOT_ENCRYPTED_MARKER) {
        TranscriptClass::NotEncrypted
    } else if transcript.contains(PASSWORD_MARKER) {
        if had_password {
            TranscriptClass::InvalidPassword
        } else {
            TranscriptClass::PasswordRequired
        }
    } else if RUNTIME_FAULT_MARKERS.iter().any(|m| transcript.contains(m)) {
        TranscriptClass::EngineFault
    } else {
        TranscriptClass::Unknown
    }
}
