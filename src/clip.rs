//! Finished recordings and still captures, and where they are saved.
//!
//! The filename pattern `MM-DD-YYYY HH-MM-SS.<ext>` is the only externally
//! visible contract for saved artifacts.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const FILENAME_TIME_FORMAT: &str = "%m-%d-%Y %H-%M-%S";

/// Default directory for saved clips.
pub const DEFAULT_OUTPUT_DIR: &str = "recordings";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipKind {
    Video,
    Still,
}

impl ClipKind {
    pub fn extension(self) -> &'static str {
        match self {
            ClipKind::Video => "webm",
            ClipKind::Still => "png",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Clip {
    pub kind: ClipKind,
    pub data: Vec<u8>,
    pub captured_at: NaiveDateTime,
}

impl Clip {
    pub fn new(kind: ClipKind, data: Vec<u8>, captured_at: NaiveDateTime) -> Self {
        Self {
            kind,
            data,
            captured_at,
        }
    }

    pub fn suggested_filename(&self) -> String {
        format!(
            "{}.{}",
            self.captured_at.format(FILENAME_TIME_FORMAT),
            self.kind.extension()
        )
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}

/// External save/download target. Each clip is handed over exactly once.
pub trait ClipSink {
    /// Persist the clip and return where it ended up.
    fn save(&mut self, clip: &Clip) -> Result<PathBuf>;
}

/// Saves clips into a local directory, like a browser download folder.
///
/// An existing file is never overwritten; a ` (n)` suffix is added instead.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create output directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn free_path(&self, clip: &Clip) -> Result<PathBuf> {
        let stem = clip.captured_at.format(FILENAME_TIME_FORMAT).to_string();
        let ext = clip.kind.extension();
        let first = self.root.join(clip.suggested_filename());
        if !first.exists() {
            return Ok(first);
        }
        for n in 1..1000 {
            let candidate = self.root.join(format!("{} ({}).{}", stem, n, ext));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(anyhow!("no free filename for {} in {}", stem, self.root.display()))
    }
}

impl ClipSink for DirectorySink {
    fn save(&mut self, clip: &Clip) -> Result<PathBuf> {
        let path = self.free_path(clip)?;
        write_atomic(&path, &clip.data)
            .with_context(|| format!("write {}", path.display()))?;
        log::info!(
            "saved {} ({} bytes, sha256={})",
            path.display(),
            clip.data.len(),
            clip.sha256_hex()
        );
        Ok(path)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("part");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
