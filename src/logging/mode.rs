//! Logging mode state machine
//!
//! ```text
//! Invalid → Standby → Recovery → Logging → Terminating → Sleeping
//!    ▲         └──────────────────↗                          │
//!    └───────────────────── reset ───────────────────────────┘
//! ```
//! Any active mode may fall into `Failed` when the log cannot be made
//! durable; `Failed` is only left through a reset.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::info;

use crate::error::{NvlogError, Result};

use super::cancel::CancellationToken;

/// Lifecycle mode of a LogManager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoggingMode {
    Invalid,
    Standby,
    Recovery,
    Logging,
    Terminating,
    Sleeping,
    /// The frontend logger hit a durability error
    Failed,
}

impl LoggingMode {
    fn rank(self) -> u8 {
        match self {
            LoggingMode::Invalid => 0,
            LoggingMode::Standby => 1,
            LoggingMode::Recovery => 2,
            LoggingMode::Logging => 3,
            LoggingMode::Terminating => 4,
            LoggingMode::Sleeping => 5,
            LoggingMode::Failed => 6,
        }
    }

    /// Whether `target` can still be reached from this mode
    pub fn can_reach(self, target: LoggingMode) -> bool {
        match (self, target) {
            (LoggingMode::Failed, LoggingMode::Invalid) => true,
            (LoggingMode::Failed, other) => other == LoggingMode::Failed,
            (_, LoggingMode::Failed) => true,
            (LoggingMode::Sleeping, LoggingMode::Invalid) => true,
            (current, target) => target.rank() >= current.rank(),
        }
    }

    /// Modes during which a frontend logger thread runs
    pub fn has_frontend(self) -> bool {
        matches!(
            self,
            LoggingMode::Standby | LoggingMode::Recovery | LoggingMode::Logging | LoggingMode::Terminating
        )
    }
}

impl fmt::Display for LoggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoggingMode::Invalid => "invalid",
            LoggingMode::Standby => "standby",
            LoggingMode::Recovery => "recovery",
            LoggingMode::Logging => "logging",
            LoggingMode::Terminating => "terminating",
            LoggingMode::Sleeping => "sleeping",
            LoggingMode::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

struct ModeState {
    mode: LoggingMode,
    failure: Option<String>,
}

/// Monitor guarding the current mode; waiters block on its condvar
pub(crate) struct ModeMonitor {
    state: Mutex<ModeState>,
    changed: Condvar,
}

impl ModeMonitor {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ModeState {
                mode: LoggingMode::Invalid,
                failure: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn mode(&self) -> LoggingMode {
        self.state.lock().mode
    }

    pub(crate) fn failure(&self) -> Option<String> {
        self.state.lock().failure.clone()
    }

    /// Move to `next` unless the manager has failed. Returns whether it moved.
    pub(crate) fn advance(&self, next: LoggingMode) -> bool {
        let mut state = self.state.lock();
        if state.mode == LoggingMode::Failed {
            return false;
        }
        info!(from = %state.mode, to = %next, "logging mode transition");
        state.mode = next;
        self.changed.notify_all();
        true
    }

    /// Enter `Failed`, keeping the first failure reason
    pub(crate) fn fail(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(reason.to_string());
        }
        state.mode = LoggingMode::Failed;
        self.changed.notify_all();
    }

    /// Back to `Invalid`, forgetting any failure
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.mode = LoggingMode::Invalid;
        state.failure = None;
        self.changed.notify_all();
    }

    /// Wake every waiter so it re-checks its condition
    pub(crate) fn wake_all(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    /// Block until `mode == target` (`expect`) or `mode != target` (`!expect`)
    pub(crate) fn wait(
        self: &Arc<Self>,
        target: LoggingMode,
        expect: bool,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        if let Some(token) = token {
            token.register(self);
        }
        let result = self.wait_until(target, expect, token);
        if let Some(token) = token {
            token.unregister(self);
        }
        result
    }

    fn wait_until(
        &self,
        target: LoggingMode,
        expect: bool,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.mode == LoggingMode::Failed && target != LoggingMode::Failed {
                return Err(NvlogError::Durability(
                    state.failure.clone().unwrap_or_else(|| "logging failed".to_string()),
                ));
            }

            if expect {
                if state.mode == target {
                    return Ok(());
                }
                if !state.mode.can_reach(target) {
                    return Err(NvlogError::Sequencing(format!(
                        "mode {} cannot be reached from {}",
                        target, state.mode
                    )));
                }
            } else if state.mode != target {
                return Ok(());
            }

            if token.map_or(false, CancellationToken::is_cancelled) {
                return Err(NvlogError::Cancelled);
            }
            self.changed.wait(&mut state);
        }
    }
}
