//! Attachment file store.
//!
//! Uploaded files live under `<root>/uploads` and are referenced from the
//! requisition row as relative paths joined with `;`. Saved files get a
//! UUID-based name so original file names never collide or leak into paths.
//! Deletion only ever touches paths that carry the managed `/uploads/`
//! prefix and contain no parent-directory components.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::models::inputs::AttachmentUpload;

/// Prefix every stored attachment path starts with.
pub const UPLOAD_PREFIX: &str = "/uploads/";

pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the files are written to.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// True when the relative path is one this store manages.
    ///
    /// Anything without the `/uploads/` prefix, or smuggling a `..`
    /// component, is not ours and must never reach the file system.
    pub fn is_managed_path(path: &str) -> bool {
        path.starts_with(UPLOAD_PREFIX)
            && !Path::new(path)
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
    }

    /// Write one upload to disk and return its stored relative path.
    pub fn save(&self, upload: &AttachmentUpload) -> io::Result<String> {
        let dir = self.uploads_dir();
        fs::create_dir_all(&dir)?;

        let file_name = match Path::new(&upload.file_name)
            .extension()
            .and_then(|e| e.to_str())
        {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        fs::write(dir.join(&file_name), &upload.bytes)?;

        tracing::debug!(file = %file_name, bytes = upload.bytes.len(), "Attachment stored");
        Ok(format!("{UPLOAD_PREFIX}{file_name}"))
    }

    /// Delete a stored file by its relative path.
    ///
    /// Returns Ok(true) if a file was removed, Ok(false) if nothing was on
    /// disk at that path. Unmanaged paths are refused outright.
    pub fn delete(&self, relative: &str) -> io::Result<bool> {
        if !Self::is_managed_path(relative) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("path is outside the managed upload directory: {relative}"),
            ));
        }

        let full = self
            .uploads_dir()
            .join(relative.trim_start_matches(UPLOAD_PREFIX));
        if !full.exists() {
            return Ok(false);
        }
        fs::remove_file(&full)?;
        tracing::debug!(file = %relative, "Attachment deleted");
        Ok(true)
    }
}

/// Split a `;`-joined attachment list, dropping empty entries.
pub fn split_paths(joined: &str) -> Vec<String> {
    joined
        .split(';')
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// Join attachment paths back into the stored `;`-delimited form.
pub fn join_paths(paths: &[String]) -> String {
    paths.join(";")
}
