// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for printbox.
//
// Only startup paths return these.  Once the server loop is running, every
// failure (timeouts, disconnects, full slot table, malformed requests) is
// recovered locally and logged.

use thiserror::Error;

/// Top-level error type for all printbox operations.
#[derive(Debug, Error)]
pub enum PrintboxError {
    // -- Server lifecycle --
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("print server already started")]
    AlreadyStarted,

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Printers --
    #[error("printer backend error: {0}")]
    PrinterBackend(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintboxError>;
