use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::{debug, warn};

use crate::env::{TargetEnv, check_var};
use crate::error::Error;
use crate::model::{Entry, LoadReport};
use crate::parser::parse_bytes;

const DEFAULT_FILE: &str = ".env";

/// Load `.env` from the current working directory into the process environment.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn dotenv() -> Result<LoadReport, Error> {
    unsafe { from_filename(DEFAULT_FILE) }
}

/// Load a `.env` file from a specific path into the process environment.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn from_path(path: impl AsRef<Path>) -> Result<LoadReport, Error> {
    let mut loader = EnvLoader::new()
        .path(path)
        .target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Load multiple `.env` files into the process environment.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn from_paths<I, P>(paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut loader = EnvLoader::new()
        .paths(paths)
        .target(unsafe { TargetEnv::process() });
    loader.load()
}

/// Load a dotenv file by filename from the current working directory.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn from_filename(name: &str) -> Result<LoadReport, Error> {
    unsafe { from_path(PathBuf::from(name)) }
}

/// Load `.env` into the process environment once per process.
///
/// Intended to be the first call in `main`. Failures are logged and otherwise
/// ignored; calls after the first do nothing.
///
/// # Safety
///
/// Mutates the process environment; see [`TargetEnv::process`].
pub unsafe fn autoload() {
    static AUTOLOAD: Once = Once::new();
    AUTOLOAD.call_once(|| match unsafe { dotenv() } {
        Ok(report) => debug!(loaded = report.loaded, "autoloaded {DEFAULT_FILE}"),
        Err(err) => warn!("autoload of {DEFAULT_FILE} failed: {err}"),
    });
}

/// Builder-style dotenv loader.
///
/// Keys that already exist in the target are never overwritten.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    required: bool,
    target: TargetEnv,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// Whether a missing file is an error (the default) or silently skipped.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn target(mut self, target: TargetEnv) -> Self {
        self.target = target;
        self
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    pub fn target_env_mut(&mut self) -> &mut TargetEnv {
        &mut self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }

    pub fn parse_only(&self) -> Result<Vec<Entry>, Error> {
        let (entries, _) = self.collect_entries()?;
        Ok(entries)
    }

    pub fn load(&mut self) -> Result<LoadReport, Error> {
        let (entries, files_read) = self.collect_entries()?;
        let mut report = LoadReport {
            files_read,
            ..LoadReport::default()
        };

        // Check everything first so a rejected entry leaves the target as it was.
        for entry in &entries {
            check_var(&entry.key, &entry.value)?;
        }

        for entry in entries {
            if self.target.contains_key(&entry.key) {
                report.skipped_existing += 1;
                debug!(key = %entry.key, "skipping existing key");
                continue;
            }

            self.target.set_var(&entry.key, &entry.value)?;
            report.loaded += 1;
        }

        Ok(report)
    }

    fn collect_entries(&self) -> Result<(Vec<Entry>, usize), Error> {
        let mut merged_entries = Vec::new();
        let mut by_key = HashMap::<String, usize>::new();
        let mut files_read = 0usize;

        for path in self.effective_paths() {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if !self.required && err.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "skipping missing dotenv file");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            files_read += 1;
            let parsed = parse_bytes(&bytes)?;
            debug!(path = %path.display(), entries = parsed.len(), "read dotenv file");

            for entry in parsed {
                if let Some(existing_idx) = by_key.get(&entry.key).copied() {
                    merged_entries[existing_idx] = entry;
                } else {
                    by_key.insert(entry.key.clone(), merged_entries.len());
                    merged_entries.push(entry);
                }
            }
        }

        Ok((merged_entries, files_read))
    }

    fn effective_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![PathBuf::from(DEFAULT_FILE)]
        } else {
            self.paths.clone()
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            required: true,
            target: TargetEnv::memory(),
        }
    }
}
