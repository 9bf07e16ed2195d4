// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: in-memory credential record with optional file persistence.
//!
//! Without a path the store is memory-only and the caller is expected to
//! keep credentials elsewhere via [`TokenStore::export`] and [`TokenStore::inject`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::record::CredentialRecord;

#[derive(Debug, Default)]
pub struct TokenStore {
    path: Option<PathBuf>,
    record: CredentialRecord,
    /// The live record holds changes that never reached disk.
    unsaved: bool,
}

impl TokenStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, record: CredentialRecord::default(), unsaved: false }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self) -> &CredentialRecord {
        &self.record
    }

    /// Load the persisted record. Returns `false` when nothing usable is stored.
    pub async fn load(&mut self) -> anyhow::Result<bool> {
        let Some(ref path) = self.path else {
            return Ok(false);
        };
        match read_record(path).await? {
            Some(record) => {
                debug!(path = %path.display(), "loaded persisted credentials");
                self.record = record;
                self.unsaved = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Persist `record`, then make it the live record.
    ///
    /// The in-memory record only changes once the write has landed, so an
    /// interrupted save leaves both copies at the previous record.
    pub async fn save(&mut self, record: CredentialRecord) -> anyhow::Result<()> {
        if let Some(ref path) = self.path {
            write_record(path, &record).await?;
        }
        self.record = record;
        self.unsaved = false;
        Ok(())
    }

    /// Replace the live record without touching disk.
    pub fn set(&mut self, record: CredentialRecord) {
        self.record = record;
        self.unsaved = self.path.is_some();
    }

    /// Adopt the persisted record when it differs from the live one.
    ///
    /// A save cancelled while its rename was in flight can still land, leaving
    /// the file ahead of memory. Returns `true` when the live record changed.
    /// Never overwrites live changes that were not written.
    pub async fn reload(&mut self) -> anyhow::Result<bool> {
        let Some(ref path) = self.path else {
            return Ok(false);
        };
        if self.unsaved {
            return Ok(false);
        }
        match read_record(path).await? {
            Some(record) if record != self.record => {
                debug!(path = %path.display(), "adopted newer persisted credentials");
                self.record = record;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Current record in transportable form.
    pub fn export(&self) -> CredentialRecord {
        self.record.clone()
    }

    /// Replace the live record verbatim. No validation happens here.
    pub async fn inject(&mut self, record: CredentialRecord) -> anyhow::Result<()> {
        self.record = record;
        self.unsaved = self.path.is_some();
        if let Some(ref path) = self.path {
            write_record(path, &self.record).await?;
        }
        self.unsaved = false;
        Ok(())
    }

    /// Delete the persisted file and reset the live record.
    pub async fn clear(&mut self) -> anyhow::Result<()> {
        self.record = CredentialRecord::default();
        self.unsaved = false;
        let Some(ref path) = self.path else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed persisted credentials");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a record from disk. Missing, empty, or unparsable files yield `None`.
pub async fn read_record(path: &Path) -> anyhow::Result<Option<CredentialRecord>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no persisted credentials");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(&contents) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(path = %path.display(), "failed to parse persisted credentials: {e}");
            Ok(None)
        }
    }
}

/// Write a record atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a partially written `.tmp` file.
pub async fn write_record(path: &Path, record: &CredentialRecord) -> anyhow::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(record)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, json).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
