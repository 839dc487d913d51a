//! Consumer lifecycle state.

use std::fmt;

/// Lifecycle of an [`EventConsumer`](crate::EventConsumer).
///
/// ```text
/// Disconnected -> Connecting -> Subscribed -> ShuttingDown -> Disconnected
///                     |  ^          |
///                     |  +----------+  (delivery stream ended)
///                     v
///                   Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerState {
    /// Not connected; initial state and the state after a clean shutdown.
    #[default]
    Disconnected,

    /// Connecting, declaring the queue and subscribing, with retries.
    Connecting,

    /// Receiving deliveries.
    Subscribed,

    /// Finishing the in-flight message and disconnecting.
    ShuttingDown,

    /// Connection retries were exhausted.
    Failed,
}

impl ConsumerState {
    /// Returns true if `next` is a legal successor of this state.
    ///
    /// `Failed` has no successors.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting | Self::ShuttingDown)
                | (Self::Connecting, Self::Subscribed | Self::Failed | Self::ShuttingDown)
                | (Self::Subscribed, Self::Connecting | Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Disconnected)
        )
    }

    /// Returns a string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::ShuttingDown => "shutting_down",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            ConsumerState::Disconnected,
            ConsumerState::Connecting,
            ConsumerState::Subscribed,
            ConsumerState::ShuttingDown,
            ConsumerState::Disconnected,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_is_terminal() {
        for next in [
            ConsumerState::Disconnected,
            ConsumerState::Connecting,
            ConsumerState::Subscribed,
            ConsumerState::ShuttingDown,
        ] {
            assert!(!ConsumerState::Failed.can_transition_to(next), "failed -> {next}");
        }
        assert!(!ConsumerState::Subscribed.can_transition_to(ConsumerState::Failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(ConsumerState::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(ConsumerState::default(), ConsumerState::Disconnected);
    }
}
