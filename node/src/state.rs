//! Node state definitions.

/// Node operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Providers wired, prewarmer not started yet.
    Starting,
    /// Serving quotes and refreshing warm pairs.
    Running,
    /// Prewarmer stopping; no new work accepted.
    ShuttingDown,
    /// Node is stopped.
    Stopped,
}
