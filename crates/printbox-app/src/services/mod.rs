// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host integration for the daemon: where the configuration lives and what
// the web pages report about the network.

pub mod config_path;
pub mod host_network;
