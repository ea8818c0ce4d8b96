//! Decrypt engine backed by the native `pdfcpu` executable
//!
//! Each run gets a fresh temporary directory that mirrors the virtual
//! filesystem. Virtual paths on the command line are rewritten into that
//! directory, and files the tool creates or changes are copied back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pdftools_core::decrypt::{EngineError, EngineRuntime, InitStage, VirtualFs};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::EngineConfig;

/// The probed executable
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub program: String,
}

/// One run's sandbox, removed when dropped
pub struct Sandbox {
    program: String,
    dir: TempDir,
}

impl Sandbox {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub struct PdfcpuProcess {
    config: EngineConfig,
}

impl PdfcpuProcess {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait(?Send)]
impl EngineRuntime for PdfcpuProcess {
    type Module = ResolvedProgram;
    type Instance = Sandbox;

    async fn prepare_filesystem(&self) -> Result<(), EngineError> {
        let Some(dir) = &self.config.work_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            EngineError::init(
                InitStage::Filesystem,
                format!("{}: {}", dir.display(), e),
            )
        })
    }

    async fn load_module(&self) -> Result<ResolvedProgram, EngineError> {
        let output = Command::new(&self.config.program)
            .arg("version")
            .output()
            .await
            .map_err(|e| {
                EngineError::init(
                    InitStage::Module,
                    format!("Failed to run {}: {}", self.config.program, e),
                )
            })?;

        if !output.status.success() {
            return Err(EngineError::init(
                InitStage::Module,
                format!(
                    "{} version exited with {}",
                    self.config.program, output.status
                ),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        info!(program = %self.config.program, %version, "Decrypt engine ready");

        Ok(ResolvedProgram {
            program: self.config.program.clone(),
        })
    }

    async fn instantiate(&self, module: &ResolvedProgram) -> Result<Sandbox, EngineError> {
        let dir = match &self.config.work_dir {
            Some(parent) => TempDir::new_in(parent),
            None => TempDir::new(),
        }
        .map_err(|e| EngineError::Instantiate(e.to_string()))?;

        Ok(Sandbox {
            program: module.program.clone(),
            dir,
        })
    }

    async fn run(
        &self,
        sandbox: Sandbox,
        argv: &[String],
        fs: &mut VirtualFs,
    ) -> Result<String, EngineError> {
        let root = sandbox.path();
        let mirrored = mirror_into(fs, root).map_err(|e| EngineError::Run(e.to_string()))?;

        let args = rewrite_argv(argv, root);
        debug!(program = %sandbox.program, ?args, "Running decrypt engine");

        let output = Command::new(&sandbox.program)
            .args(&args)
            .current_dir(root)
            .output()
            .await
            .map_err(|e| EngineError::Run(format!("Failed to run {}: {}", sandbox.program, e)))?;
        debug!(status = %output.status, "Decrypt engine exited");

        let mut transcript = String::from_utf8_lossy(&output.stdout).into_owned();
        transcript.push_str(&String::from_utf8_lossy(&output.stderr));

        for (path, content) in
            collect_files(root).map_err(|e| EngineError::Run(e.to_string()))?
        {
            if mirrored.get(&path) != Some(&content) {
                fs.write_file(&path, content)?;
            }
        }

        Ok(transcript)
    }
}

/// Write every virtual file below `root`, returning what was written
fn mirror_into(fs: &VirtualFs, root: &Path) -> std::io::Result<BTreeMap<String, Vec<u8>>> {
    let mut mirrored = BTreeMap::new();
    for path in fs.paths() {
        let Ok(content) = fs.read_file(path) else {
            continue;
        };
        let target = host_path(root, path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        mirrored.insert(path.to_string(), content.to_vec());
    }
    Ok(mirrored)
}

/// Read back every file below `root`, keyed by virtual path
fn collect_files(root: &Path) -> std::io::Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let virtual_path = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
            files.insert(virtual_path, std::fs::read(&path)?);
        }
    }
    Ok(files)
}

fn host_path(root: &Path, virtual_path: &str) -> PathBuf {
    root.join(virtual_path.trim_start_matches('/'))
}

/// Flags whose following argument is a value, not a path
const VALUE_FLAGS: [&str; 2] = ["-upw", "-opw"];

/// Replace the program name and map positional virtual paths into `root`
///
/// Values of [`VALUE_FLAGS`] are never rewritten and never read as flags,
/// so a password starting with `/` or `-` is passed through untouched.
fn rewrite_argv(argv: &[String], root: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(argv.len().saturating_sub(1));
    let mut is_flag_value = false;
    for arg in argv.iter().skip(1) {
        if arg.starts_with('/') && !is_flag_value {
            args.push(host_path(root, arg).to_string_lossy().into_owned());
        } else {
            args.push(arg.clone());
        }
        is_flag_value = !is_flag_value && VALUE_FLAGS.contains(&arg.as_str());
    }
    args
}
