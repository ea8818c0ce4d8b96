//! The external decrypt engine seam
//!
//! The decrypt toolkit is a command-line program compiled for some runtime
//! (a WASM module driven from JavaScript in the browser, a native process
//! elsewhere). Implementations of [`EngineRuntime`] load it once and run it
//! against the shared [`VirtualFs`].

use async_trait::async_trait;
use thiserror::Error;

use super::vfs::VirtualFs;

/// The initialization step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Filesystem,
    Runtime,
    Module,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine initialization failed at {stage:?}: {reason}")]
    Init { stage: InitStage, reason: String },

    #[error("Failed to instantiate engine: {0}")]
    Instantiate(String),

    #[error("Engine run failed: {0}")]
    Run(String),

    #[error("Virtual filesystem error: {0}")]
    Filesystem(#[from] super::vfs::FsError),
}

impl EngineError {
    pub fn init(stage: InitStage, reason: impl Into<String>) -> Self {
        EngineError::Init {
            stage,
            reason: reason.into(),
        }
    }
}

/// A runtime able to load the decrypt toolkit and execute it
///
/// `load_module` is called once per worker lifetime; every run gets a fresh
/// instance so no state carries over between runs.
#[async_trait(?Send)]
pub trait EngineRuntime {
    /// The loaded, reusable program
    type Module;
    /// One execution of the program
    type Instance;

    /// Check that the filesystem backing the engine is usable
    async fn prepare_filesystem(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Bring up the runtime the module executes in
    async fn init_runtime(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn load_module(&self) -> Result<Self::Module, EngineError>;

    async fn instantiate(&self, module: &Self::Module) -> Result<Self::Instance, EngineError>;

    /// Run to completion and return the combined stdout/stderr transcript
    async fn run(
        &self,
        instance: Self::Instance,
        argv: &[String],
        fs: &mut VirtualFs,
    ) -> Result<String, EngineError>;
}
