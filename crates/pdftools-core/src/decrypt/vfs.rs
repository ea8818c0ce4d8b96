//! In-memory virtual filesystem shared with the decrypt engine
//!
//! Paths are normalized to a leading `/` without duplicate separators.
//! Parent-directory components are rejected.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Path traversal with '..' is not allowed: {0}")]
    PathTraversal(String),
}

/// Metadata returned by [`VirtualFs::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: usize,
}

#[derive(Debug, Default)]
pub struct VirtualFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_file(&mut self, path: &str, content: Vec<u8>) -> Result<(), FsError> {
        let path = normalize_path(path)?;
        self.files.insert(path, content);
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> Result<&[u8], FsError> {
        let path = normalize_path(path)?;
        self.files
            .get(&path)
            .map(Vec::as_slice)
            .ok_or(FsError::NotFound(path))
    }

    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        self.read_file(path).map(|content| FileStat {
            size: content.len(),
        })
    }

    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize_path(path)?;
        self.files
            .remove(&path)
            .map(|_| ())
            .ok_or(FsError::NotFound(path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn normalize_path(path: &str) -> Result<String, FsError> {
    if path.split('/').any(|part| part == "..") {
        return Err(FsError::PathTraversal(path.to_string()));
    }

    let parts: Vec<&str> = path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    Ok(format!("/{}", parts.join("/")))
}

/// Files staged for one engine run
///
/// Every path written through or registered with the scope is unlinked when
/// the scope is dropped, whichever way the run ends.
pub struct StagingScope<'a> {
    fs: &'a mut VirtualFs,
    paths: Vec<String>,
}

impl<'a> StagingScope<'a> {
    pub fn new(fs: &'a mut VirtualFs) -> Self {
        Self {
            fs,
            paths: Vec::new(),
        }
    }

    /// Write a file and register it for removal
    pub fn stage(&mut self, path: &str, content: Vec<u8>) -> Result<(), FsError> {
        self.fs.write_file(path, content)?;
        self.track(path);
        Ok(())
    }

    /// Register a path the engine is expected to create
    pub fn track(&mut self, path: &str) {
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_string());
        }
    }

    pub fn fs(&self) -> &VirtualFs {
        &*self.fs
    }

    pub fn fs_mut(&mut self) -> &mut VirtualFs {
        &mut *self.fs
    }
}

impl Drop for StagingScope<'_> {
    fn drop(&mut self) {
        for path in &self.paths {
            // Absent outputs are expected on failed runs
            let _ = self.fs.unlink(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_unlink() {
        let mut fs = VirtualFs::new();
        fs.write_file("/input.pdf", b"%PDF-".to_vec()).unwrap();
        assert_eq!(fs.read_file("/input.pdf").unwrap(), b"%PDF-");
        assert_eq!(fs.stat("/input.pdf").unwrap().size, 5);

        fs.unlink("/input.pdf").unwrap();
        assert_eq!(
            fs.stat("/input.pdf"),
            Err(FsError::NotFound("/input.pdf".to_string()))
        );
    }

    #[test]
    fn test_paths_are_normalized() {
        let mut fs = VirtualFs::new();
        fs.write_file("out//./result.pdf", vec![1]).unwrap();
        assert!(fs.exists("/out/result.pdf"));
        assert_eq!(fs.paths().collect::<Vec<_>>(), vec!["/out/result.pdf"]);
    }

    #[test]
    fn test_path_traversal_blocked() {
        let mut fs = VirtualFs::new();
        let result = fs.write_file("../../../etc/passwd", vec![]);
        assert!(matches!(result, Err(FsError::PathTraversal(_))));
    }

    #[test]
    fn test_unlink_missing_file() {
        let mut fs = VirtualFs::new();
        assert!(matches!(fs.unlink("/nothing"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_staging_scope_cleans_up_on_drop() {
        let mut fs = VirtualFs::new();
        fs.write_file("/keep.pdf", vec![0]).unwrap();
        {
            let mut scope = StagingScope::new(&mut fs);
            scope.stage("/input.pdf", vec![1, 2]).unwrap();
            scope.track("/output.pdf");
            scope.fs_mut().write_file("/output.pdf", vec![3]).unwrap();
            assert!(scope.fs().exists("/input.pdf"));
        }
        assert!(!fs.exists("/input.pdf"));
        assert!(!fs.exists("/output.pdf"));
        assert!(fs.exists("/keep.pdf"));
    }

    #[test]
    fn test_staging_scope_tolerates_missing_output() {
        let mut fs = VirtualFs::new();
        {
            let mut scope = StagingScope::new(&mut fs);
            scope.stage("/input.pdf", vec![1]).unwrap();
            scope.track("/output.pdf");
        }
        assert!(fs.is_empty());
    }
}
