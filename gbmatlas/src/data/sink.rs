use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::errors::Result;

/// Destination for a finished forecast path.
pub trait ResultSink {
    fn append(&mut self, path: &[f64]) -> Result<()>;
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn append(&mut self, path: &[f64]) -> Result<()> {
        (**self).append(path)
    }
}

/// How a [`CsvFileSink`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add to the end of the file, keeping earlier runs.
    #[default]
    Append,
    /// Replace the file with this run only.
    Truncate,
}

/// One value per line, fixed 14 decimal places.
pub fn render_csv(path: &[f64]) -> String {
    let mut out = String::with_capacity(path.len() * 24);
    for v in path {
        out.push_str(&format!("{:.14}\n", v));
    }
    out
}

/// Writes a forecast as a single-column text file.
///
/// The full path is rendered before touching the file so a failed run never
/// leaves a partial result behind.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
    mode: WriteMode,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: WriteMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ResultSink for CsvFileSink {
    fn append(&mut self, path: &[f64]) -> Result<()> {
        let body = render_csv(path);
        self.ensure_parent()?;
        match self.mode {
            WriteMode::Append => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                file.write_all(body.as_bytes())?;
                file.flush()?;
            }
            WriteMode::Truncate => {
                let staging = self.staging_path();
                debug!(staging = ?staging, "staging forecast output");
                fs::write(&staging, body.as_bytes())?;
                fs::rename(&staging, &self.path)?;
            }
        }
        info!(path = ?self.path, mode = ?self.mode, values = path.len(), "forecast written");
        Ok(())
    }
}

/// Keeps every appended path in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    paths: Vec<Vec<f64>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> &[Vec<f64>] {
        &self.paths
    }

    pub fn last(&self) -> Option<&[f64]> {
        self.paths.last().map(|p| p.as_slice())
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, path: &[f64]) -> Result<()> {
        self.paths.push(path.to_vec());
        Ok(())
    }
}
