// # Drop Window
//
// Debounce state for stream reloads, kept free of I/O and timers so the
// coordinator's transitions can be tested directly.
//
// ```text
//            signal(l)                      tick, nothing collapsed
//   ready ──────────────► rebuild ──► dropping ───────────────────────► ready
//                                      │   ▲
//                           signal(l)  │   │ collapsed = max(collapsed, l)
//                                      └───┘
//                                      │
//                                      │ tick, collapsed = Some(l)
//                                      ▼
//                                   rebuild(l) ──► dropping
// ```

use serde::{Deserialize, Serialize};

/// Urgency of a reload request
///
/// Ordered so that collapsing requests keeps the most urgent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReloadLevel {
    /// Rebuild from the currently stored IDs
    Current = 0,
    /// Resolve unresolved names, then rebuild
    ResolveMissing = 1,
    /// Re-resolve every name, then rebuild
    ResolveAll = 2,
}

impl ReloadLevel {
    /// Whether the resolver runs before the filter is built
    pub fn resolve_first(self) -> bool {
        self > ReloadLevel::Current
    }

    /// Whether every account is re-resolved
    pub fn resolve_all(self) -> bool {
        self > ReloadLevel::ResolveMissing
    }
}

impl From<ReloadLevel> for u8 {
    fn from(level: ReloadLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for ReloadLevel {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReloadLevel::Current),
            1 => Ok(ReloadLevel::ResolveMissing),
            2 => Ok(ReloadLevel::ResolveAll),
            other => Err(crate::Error::invalid_input(format!("unknown reload level {}", other))),
        }
    }
}

/// What to do with an incoming reload signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDecision {
    /// Rebuild now at this level
    Rebuild(ReloadLevel),
    /// A window is open; the request was folded into the collapsed level
    Collapsed {
        /// The collapsed level after folding this request in
        next: ReloadLevel,
    },
}

/// Debounce window state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropWindow {
    dropping: bool,
    collapsed: Option<ReloadLevel>,
}

impl DropWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether reload signals are currently being collapsed
    pub fn is_dropping(&self) -> bool {
        self.dropping
    }

    /// Highest level collapsed during the current window
    pub fn collapsed(&self) -> Option<ReloadLevel> {
        self.collapsed
    }

    /// Feed a reload signal
    pub fn on_signal(&mut self, level: ReloadLevel) -> SignalDecision {
        if !self.dropping {
            return SignalDecision::Rebuild(level);
        }
        let next = self.collapsed.map_or(level, |current| current.max(level));
        self.collapsed = Some(next);
        SignalDecision::Collapsed { next }
    }

    /// A rebuild finished; open a fresh window
    pub fn on_rebuilt(&mut self) {
        self.dropping = true;
        self.collapsed = None;
    }

    /// The window timer fired
    ///
    /// # Returns
    ///
    /// The level to rebuild at if a request was collapsed during the window.
    /// The caller must call [`on_rebuilt`](Self::on_rebuilt) after that
    /// rebuild to open the next window.
    pub fn on_tick(&mut self) -> Option<ReloadLevel> {
        if !self.dropping {
            return None;
        }
        self.dropping = false;
        self.collapsed.take()
    }
}
