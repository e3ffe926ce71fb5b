//! Recording lifecycle states and inputs.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::eventsub::payload::{ChannelUpdateEvent, StreamOnlineEvent};
use crate::Result;

/// Per-streamer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No capture activity.
    #[default]
    Idle,
    /// Capture child spawned, waiting for output.
    Starting,
    /// Capture confirmed writing output.
    Recording,
    /// Stop requested, waiting for the child to drain.
    Stopping,
    /// Brief post-stop window absorbing duplicate webhooks.
    Cooldown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Cooldown => "cooldown",
        }
    }

    /// Whether a capture attempt is in flight.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Starting | Self::Recording | Self::Stopping)
    }

    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, target),
            (Idle, Starting)
                | (Starting, Recording)
                | (Starting, Cooldown)
                | (Starting, Stopping)
                | (Recording, Stopping)
                | (Recording, Cooldown)
                | (Stopping, Cooldown)
                | (Cooldown, Idle)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inputs driving a streamer's state machine.
#[derive(Debug)]
pub enum LifecycleInput {
    /// EventSub `stream.online`.
    Online(StreamOnlineEvent),
    /// EventSub `stream.offline`.
    Offline,
    /// EventSub `channel.update`.
    Update(ChannelUpdateEvent),
    /// Operator start: bypasses `recording.enabled` for this session
    /// and raises capture retry settings. Replies with the recording id.
    ForceStart {
        reply: Option<oneshot::Sender<Result<i64>>>,
    },
    /// Operator stop; behaves like `Offline`.
    ForceStop {
        reply: Option<oneshot::Sender<Result<()>>>,
    },
}

impl LifecycleInput {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Online(_) => "online",
            Self::Offline => "offline",
            Self::Update(_) => "update",
            Self::ForceStart { .. } => "force_start",
            Self::ForceStop { .. } => "force_stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use LifecycleState::*;
        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Recording));
        assert!(Recording.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Cooldown));
        assert!(Cooldown.can_transition_to(Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        use LifecycleState::*;
        assert!(!Idle.can_transition_to(Recording));
        assert!(!Cooldown.can_transition_to(Starting));
        assert!(!Recording.can_transition_to(Starting));
        assert!(!Stopping.can_transition_to(Recording));
    }

    #[test]
    fn test_is_capturing() {
        assert!(!LifecycleState::Idle.is_capturing());
        assert!(LifecycleState::Starting.is_capturing());
        assert!(LifecycleState::Recording.is_capturing());
        assert!(LifecycleState::Stopping.is_capturing());
        assert!(!LifecycleState::Cooldown.is_capturing());
    }
}
