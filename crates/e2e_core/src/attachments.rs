//! Diagnostic attachment sinks for test reports.

use crate::error::{E2eError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// A named diagnostic payload attached to a test report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Test the attachment belongs to.
    pub test_id: String,
    /// Attachment name, e.g. `"ACT Result"`.
    pub name: String,
    /// Stringified payload.
    pub payload: String,
}

/// Destination for diagnostic attachments.
pub trait AttachmentSink: Send + Sync {
    /// Record one attachment. Sinks must not fail the test, so errors are
    /// handled (logged) by the sink itself.
    fn attach(&self, attachment: Attachment);
}

/// Discards every attachment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAttachments;

impl AttachmentSink for NullAttachments {
    fn attach(&self, _attachment: Attachment) {}
}

/// Keeps attachments in memory. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttachments {
    entries: Arc<Mutex<Vec<Attachment>>>,
}

impl MemoryAttachments {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Attachment>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of everything attached so far.
    pub fn entries(&self) -> Vec<Attachment> {
        self.lock().clone()
    }

    /// Attachments with the given name.
    pub fn named(&self, name: &str) -> Vec<Attachment> {
        self.lock()
            .iter()
            .filter(|a| a.name == name)
            .cloned()
            .collect()
    }
}

impl AttachmentSink for MemoryAttachments {
    fn attach(&self, attachment: Attachment) {
        self.lock().push(attachment);
    }
}

/// Appends one JSON object per attachment to a file.
#[derive(Debug)]
pub struct JsonLinesAttachments {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAttachments {
    /// Open (or create) the report file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the report file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, attachment: &Attachment) -> Result<()> {
        let mut line = serde_json::to_string(attachment)
            .map_err(|e| E2eError::Serialization(e.to_string()))?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl AttachmentSink for JsonLinesAttachments {
    fn attach(&self, attachment: Attachment) {
        if let Err(e) = self.write(&attachment) {
            warn!(path = %self.path.display(), name = %attachment.name, "failed to write attachment: {}", e);
        }
    }
}
