//! Coordinator configuration.
//!
//! Everything time- or policy-shaped is a field here and passed in at
//! construction; nothing in the coordinator reads configuration
//! ambiently. Roster and name bounds are NOT here — they belong to
//! [`SessionLimits`](mixtape_session::SessionLimits), owned by the
//! store, because the store is what enforces them.

use std::time::Duration;

/// Tunables for a running coordinator.
#[derive(Debug, Clone)]
pub struct MixtapeConfig {
    /// Digits in a freshly minted join code.
    pub code_length: usize,

    /// How long a session may go without a mutation before the reaper
    /// finishes it.
    pub inactive_timeout: Duration,

    /// How often the reaper sweeps. The first sweep runs immediately at
    /// startup.
    pub sweep_interval: Duration,

    /// How long a started game sits in COUNTDOWN before going ACTIVE.
    pub countdown: Duration,

    /// Whether a non-author may leave once the game is underway. The
    /// author can always leave (which finishes the game).
    pub allow_leave_in_progress: bool,

    /// Answer diagnostic ECHO events. Leave off in production; a
    /// disabled echo is silently ignored, like any unknown event.
    pub echo_enabled: bool,
}

impl Default for MixtapeConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            inactive_timeout: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(15 * 60),
            countdown: Duration::from_secs(15),
            allow_leave_in_progress: true,
            echo_enabled: false,
        }
    }
}
