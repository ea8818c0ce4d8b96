//! Native host for the PDF merge and decrypt workers
//!
//! Speaks the same message protocol as the browser workers, one JSON
//! message per line over stdin/stdout, and decrypts with the native
//! `pdfcpu` executable.

pub mod config;
pub mod engine;
pub mod transport;

pub use config::WorkerConfig;
pub use engine::PdfcpuProcess;
pub use transport::{serve, Host, LineSink};
