// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spool directory printer: every job becomes one file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;

use printbox_core::error::{PrintboxError, Result};

use super::PrinterBackend;

/// Writes each job to `<directory>/<printer>-<timestamp>-<id>.prn`.
pub struct SpoolBackend {
    directory: PathBuf,
    prefix: String,
    current: Option<(PathBuf, BufWriter<File>)>,
    spooled: u32,
}

impl SpoolBackend {
    /// Create the spool directory if needed.
    pub fn create(directory: PathBuf, printer_name: &str) -> Result<Self> {
        std::fs::create_dir_all(&directory).map_err(|e| {
            PrintboxError::PrinterBackend(format!(
                "create spool directory {}: {e}",
                directory.display()
            ))
        })?;
        Ok(Self {
            directory,
            prefix: sanitize(printer_name),
            current: None,
            spooled: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of jobs written so far.
    pub fn spooled(&self) -> u32 {
        self.spooled
    }
}

/// Keep file names portable whatever the printer is called.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl PrinterBackend for SpoolBackend {
    fn open_job(&mut self, slot: usize) -> Result<()> {
        let id = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}-{}-{}.prn",
            self.prefix,
            Local::now().format("%Y%m%d-%H%M%S"),
            &id[..8]
        );
        let path = self.directory.join(file_name);
        let file = File::create(&path).map_err(|e| {
            PrintboxError::PrinterBackend(format!("create {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), slot, "spooling job");
        self.current = Some((path, BufWriter::new(file)));
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.current.is_some()
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let (_, file) = self
            .current
            .as_mut()
            .ok_or_else(|| PrintboxError::PrinterBackend("no spool file open".into()))?;
        file.write_all(&[byte])?;
        Ok(())
    }

    fn close_job(&mut self, success: bool) -> Result<()> {
        let Some((path, mut file)) = self.current.take() else {
            return Ok(());
        };
        file.flush()?;
        self.spooled += 1;
        if !success {
            // Raw socket jobs always end this way; keep the data regardless.
            warn!(path = %path.display(), "job ended without completion signal");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "spool directory {} ({} jobs spooled)",
            self.directory.display(),
            self.spooled
        )
    }
}
