// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Configuration file location.

use std::ffi::OsString;
use std::path::PathBuf;

/// The path given on the command line, else the conventional location.
pub fn resolve(arg: Option<OsString>) -> PathBuf {
    match arg {
        Some(path) => PathBuf::from(path),
        None => default_path(
            std::env::var_os("XDG_CONFIG_HOME"),
            std::env::var_os("HOME"),
        ),
    }
}

fn default_path(xdg_config_home: Option<OsString>, home: Option<OsString>) -> PathBuf {
    // Try XDG config dir, then fallback to home
    let base = match (xdg_config_home, home) {
        (Some(xdg), _) => PathBuf::from(xdg),
        (None, Some(home)) => PathBuf::from(home).join(".config"),
        // Last resort: working directory
        (None, None) => return PathBuf::from("printbox.json"),
    };
    base.join("printbox").join("config.json")
}
