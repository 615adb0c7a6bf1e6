//! File upload staging
//!
//! Stages files for pickup by an external shipping agent: each upload is
//! copied into its own `<root>/<timestamp>-<pid>/data` slot so concurrent
//! processes never collide. A collaborator utility; not wired into the
//! publish pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("source file does not exist: {0}")]
    MissingSource(PathBuf),
}

/// Copies files into a per-upload staging directory.
#[derive(Debug)]
pub struct Uploader {
    root: PathBuf,
}

impl Uploader {
    /// Create an uploader rooted at `root`, creating the directory if
    /// needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, UploadError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Copy `src` into a fresh `<root>/<timestamp>-<pid>/data` slot and
    /// return the destination path.
    pub fn upload_file<P: AsRef<Path>>(
        &self,
        src: P,
        timestamp_ns: u64,
    ) -> Result<PathBuf, UploadError> {
        let src = src.as_ref();
        if !src.is_file() {
            return Err(UploadError::MissingSource(src.to_path_buf()));
        }

        let slot = self
            .root
            .join(format!("{timestamp_ns}-{}", std::process::id()));
        fs::create_dir_all(&slot)?;

        let dst = slot.join("data");
        fs::copy(src, &dst)?;
        info!(src = %src.display(), dst = %dst.display(), "staged file for upload");
        Ok(dst)
    }
}
