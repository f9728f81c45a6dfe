// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide tracing subscriber for solver diagnostics.

use tracing_subscriber::EnvFilter;

/// Variable holding the filter directives; unset means `warn`.
pub const LOG_ENV: &str = "CCE_LOG";

/// Installs a stderr formatter filtered by [`LOG_ENV`].  Returns `false`
/// when another global subscriber was already in place.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
