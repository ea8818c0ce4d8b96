//! Password removal through an external decrypt engine
//!
//! The engine (the `pdfcpu` toolkit) works on files, so each run stages the
//! input into a [`VirtualFs`], invokes the engine, and reads the result
//! back. Whether `/output.pdf` exists afterwards is the only success signal;
//! failures are recovered from the engine's transcript by [`classify`].

pub mod classify;
pub mod engine;
pub mod vfs;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, instrument, warn};

use crate::command::DecryptRequest;
use crate::event::{EventSink, Notice, PdfBlob, WorkerMessage};

pub use classify::{classify, TranscriptClass};
pub use engine::{EngineError, EngineRuntime, InitStage};
pub use vfs::{FileStat, FsError, StagingScope, VirtualFs};

pub const INPUT_PATH: &str = "/input.pdf";
pub const OUTPUT_PATH: &str = "/output.pdf";
pub const ENGINE_PROGRAM: &str = "pdfcpu.wasm";

const FAILED: &str = "Failed to decrypt PDF";
const REFRESH_HINT: &str = "Unknown error, you can try refreshing the page";

/// Command line for one decrypt run
///
/// The user-password flag is only passed for a non-empty password.
pub fn build_argv(password: Option<&str>) -> Vec<String> {
    let mut argv = vec![ENGINE_PROGRAM.to_string(), "decrypt".to_string()];
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        argv.push("-upw".to_string());
        argv.push(password.to_string());
    }
    argv.push(INPUT_PATH.to_string());
    argv.push(OUTPUT_PATH.to_string());
    argv
}

/// A terminal decrypt outcome other than success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptFailure {
    NotInitialized(InitStage),
    NotEncrypted,
    InvalidPassword,
    PasswordRequired,
    EngineFault,
    Unknown,
}

impl DecryptFailure {
    pub fn notice(&self) -> Notice {
        match self {
            DecryptFailure::NotInitialized(InitStage::Filesystem) => {
                Notice::new("Virtual filesystem is not initialized", REFRESH_HINT)
            }
            DecryptFailure::NotInitialized(InitStage::Runtime) => {
                Notice::new("Engine runtime is not initialized", REFRESH_HINT)
            }
            DecryptFailure::NotInitialized(InitStage::Module) => {
                Notice::new("Decrypt engine module is not initialized", REFRESH_HINT)
            }
            DecryptFailure::NotEncrypted => Notice::new(FAILED, "The file is not encrypted"),
            DecryptFailure::InvalidPassword => Notice::new(FAILED, "Invalid password"),
            DecryptFailure::PasswordRequired => {
                Notice::new(FAILED, "Password is required to decrypt this file")
            }
            DecryptFailure::EngineFault => Notice::new(
                FAILED,
                "Unknown JavaScript error, refresh the page and try again",
            ),
            DecryptFailure::Unknown => Notice::new(
                FAILED,
                "Unknown error, check the developer console for more information",
            ),
        }
    }
}

impl From<TranscriptClass> for DecryptFailure {
    fn from(class: TranscriptClass) -> Self {
        match class {
            TranscriptClass::NotEncrypted => DecryptFailure::NotEncrypted,
            TranscriptClass::InvalidPassword => DecryptFailure::InvalidPassword,
            TranscriptClass::PasswordRequired => DecryptFailure::PasswordRequired,
            TranscriptClass::EngineFault => DecryptFailure::EngineFault,
            TranscriptClass::Unknown => DecryptFailure::Unknown,
        }
    }
}

/// Engine state shared by every run of one [`Decryptor`]
struct EngineState<M> {
    fs: Mutex<VirtualFs>,
    module: M,
}

/// Drives decrypt runs against a lazily initialized engine
///
/// The engine is set up on the first request. A failed setup is not
/// remembered, so the next request tries again. Runs on the same decryptor
/// are serialized on the filesystem lock because they share fixed paths.
pub struct Decryptor<R: EngineRuntime> {
    runtime: R,
    state: OnceCell<EngineState<R::Module>>,
}

impl<R: EngineRuntime> Decryptor<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            state: OnceCell::new(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized()
    }

    /// Decrypt one file, posting progress and the outcome to `sink`
    #[instrument(skip_all, fields(file = %request.file.name))]
    pub async fn decrypt(&self, request: &DecryptRequest, sink: &mut impl EventSink) {
        sink.progress(0.0);
        match self.run(request, sink).await {
            Ok(bytes) => {
                info!(size = bytes.len(), "Decrypted PDF");
                sink.progress(100.0);
                sink.post(WorkerMessage::Success(PdfBlob::new(bytes)));
            }
            Err(failure) => {
                warn!(?failure, "Decrypt failed");
                sink.post(WorkerMessage::Error(failure.notice()));
            }
        }
    }

    async fn run(
        &self,
        request: &DecryptRequest,
        sink: &mut impl EventSink,
    ) -> Result<Vec<u8>, DecryptFailure> {
        let state = self
            .state
            .get_or_try_init(|| self.initialize())
            .await?;
        sink.progress(10.0);

        let mut fs = state.fs.lock().await;
        let mut scope = StagingScope::new(&mut *fs);
        scope
            .stage(INPUT_PATH, request.file.data.clone())
            .map_err(|e| {
                error!(error = %e, "Failed to stage input");
                DecryptFailure::Unknown
            })?;
        scope.track(OUTPUT_PATH);
        sink.progress(20.0);

        let instance = self
            .runtime
            .instantiate(&state.module)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to instantiate decrypt engine");
                DecryptFailure::EngineFault
            })?;
        sink.progress(30.0);

        let password = request.password();
        let argv = build_argv(password);
        let transcript = self
            .runtime
            .run(instance, &argv, scope.fs_mut())
            .await
            .map_err(|e| {
                error!(error = %e, "Decrypt engine run failed");
                DecryptFailure::EngineFault
            })?;
        sink.progress(80.0);
        debug!(%transcript, "Decrypt engine finished");

        let bytes = match scope.fs().read_file(OUTPUT_PATH) {
            Ok(bytes) => bytes.to_vec(),
            Err(_) => {
                let class = classify(&transcript, password.is_some());
                if matches!(class, TranscriptClass::EngineFault | TranscriptClass::Unknown) {
                    error!(?class, %transcript, "Decrypt engine produced no output");
                }
                return Err(class.into());
            }
        };
        sink.progress(90.0);

        drop(scope);
        Ok(bytes)
    }

    async fn initialize(&self) -> Result<EngineState<R::Module>, DecryptFailure> {
        info!("Initializing decrypt engine");
        self.runtime
            .prepare_filesystem()
            .await
            .map_err(|e| init_failure(InitStage::Filesystem, e))?;
        let fs = VirtualFs::new();

        self.runtime
            .init_runtime()
            .await
            .map_err(|e| init_failure(InitStage::Runtime, e))?;

        let module = self
            .runtime
            .load_module()
            .await
            .map_err(|e| init_failure(InitStage::Module, e))?;

        Ok(EngineState {
            fs: Mutex::new(fs),
            module,
        })
    }
}

fn init_failure(stage: InitStage, err: EngineError) -> DecryptFailure {
    error!(?stage, error = %err, "Decrypt engine initialization failed");
    DecryptFailure::NotInitialized(stage)
}
