//! JSON-lines transport over standard I/O
//!
//! One inbound message per input line, one outbound message per output
//! line. All logging goes to stderr; stdout carries protocol messages only.

use std::io::{BufRead, Write};

use pdftools_core::decrypt::EngineRuntime;
use pdftools_core::{DecryptWorker, EventSink, MergeWorker, WorkerCommand, WorkerMessage};

/// Routes each message to the worker for its pipeline
pub struct Host<R: EngineRuntime> {
    merge: MergeWorker,
    decrypt: DecryptWorker<R>,
}

impl<R: EngineRuntime> Host<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            merge: MergeWorker::new(),
            decrypt: DecryptWorker::new(runtime),
        }
    }

    /// Handle one raw input line
    pub async fn dispatch(&self, line: &str, sink: &mut impl EventSink) {
        let command = match serde_json::from_str(line) {
            Ok(value) => WorkerCommand::from_json(value),
            Err(e) => {
                tracing::warn!("Malformed message line: {}", e);
                None
            }
        };

        match &command {
            Some(WorkerCommand::Merge(_)) => self.merge.handle(command.as_ref(), sink),
            // Unknown messages get the decrypt worker's error
            _ => self.decrypt.handle(command.as_ref(), sink).await,
        }
    }
}

/// Writes each message as one JSON line
pub struct LineSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failed: false,
        }
    }

    /// True once a write has failed; later messages are dropped
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, message: &WorkerMessage) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> EventSink for LineSink<W> {
    fn post(&mut self, message: WorkerMessage) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write_line(&message) {
            tracing::error!("Failed to write message: {}", e);
            self.failed = true;
        }
    }
}

/// Serve messages from `input` until EOF
pub async fn serve<R, I, W>(host: &Host<R>, input: I, output: W) -> anyhow::Result<W>
where
    R: EngineRuntime,
    I: BufRead,
    W: Write,
{
    let mut sink = LineSink::new(output);

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        host.dispatch(&line, &mut sink).await;
        if sink.failed() {
            anyhow::bail!("Output stream closed");
        }
    }

    tracing::info!("EOF reached, shutting down");
    Ok(sink.into_inner())
}

/// Serve the process's stdin and stdout
pub async fn run_stdio<R: EngineRuntime>(host: &Host<R>) -> anyhow::Result<()> {
    tracing::info!("Starting stdio transport");
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(host, stdin.lock(), stdout.lock()).await?;
    Ok(())
}
