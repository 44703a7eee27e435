// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printbox: configuration, error definitions and domain types shared by the
// server crate and the binary.

pub mod config;
pub mod error;
pub mod types;

pub use config::{PrinterBackendConfig, PrinterConfig, ServerConfig};
pub use error::PrintboxError;
pub use types::*;
