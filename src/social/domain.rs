// Follow state machine - pure transitions, side effects are returned as data
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::models::{NotificationKind, Privacy};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(pub String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directed relationship: `follower` wants to see `target`'s posts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FollowEdge {
    pub follower: Username,
    pub target: Username,
}

impl FollowEdge {
    pub fn new(follower: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            follower: Username::new(follower),
            target: Username::new(target),
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.follower == self.target
    }
}

impl fmt::Display for FollowEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.follower, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowState {
    None,
    Pending,
    Following,
}

impl FollowState {
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Pending => "Pending",
            Self::Following => "Following",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEvent {
    /// Follower asks to follow; the outcome depends on the target's privacy
    Request { privacy: Privacy },
    /// Follower withdraws a pending request
    Cancel,
    /// Target approves a pending request
    Accept,
    /// Target rejects a pending request
    Decline,
    /// Either side removes an established follow
    Unfollow,
}

impl FollowEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Cancel => "cancel",
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Unfollow => "unfollow",
        }
    }
}

/// A single idempotent write against the social graph or notification feed.
/// Every effect is relative to the edge it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    AddFollower,
    RemoveFollower,
    AddRequest,
    RemoveRequest,
    AddFollowing,
    RemoveFollowing,
    /// follow_request goes follower -> target, request_accepted goes target -> follower
    Notify(NotificationKind),
    Retract(NotificationKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: FollowState,
    pub to: FollowState,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FollowError {
    RequestNotFound,
    SelfFollow,
}

impl fmt::Display for FollowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestNotFound => write!(f, "Follow request not found"),
            Self::SelfFollow => write!(f, "Users cannot follow themselves"),
        }
    }
}

impl std::error::Error for FollowError {}

impl FollowState {
    /// Derive the state from the target's followers record.
    pub fn from_record(is_follower: bool, is_requested: bool) -> Self {
        if is_follower {
            Self::Following
        } else if is_requested {
            Self::Pending
        } else {
            Self::None
        }
    }

    /// Pure transition function. Removals are re-issued even when the state
    /// says they already happened, so a retried request repairs a
    /// half-applied pair of writes instead of failing.
    pub fn apply(self, event: FollowEvent) -> Result<Transition, FollowError> {
        use Effect::*;
        use NotificationKind::*;

        let (to, effects) = match (self, event) {
            (Self::None, FollowEvent::Request { privacy: Privacy::Public })
            | (Self::Following, FollowEvent::Request { .. }) => {
                (Self::Following, vec![AddFollower, AddFollowing])
            }
            (Self::None, FollowEvent::Request { privacy: Privacy::Private }) => {
                (Self::Pending, vec![AddRequest, Notify(FollowRequest)])
            }
            (Self::Pending, FollowEvent::Request { privacy: Privacy::Private }) => {
                (Self::Pending, vec![])
            }
            // Target went public while the request was pending
            (Self::Pending, FollowEvent::Request { privacy: Privacy::Public }) => (
                Self::Following,
                vec![RemoveRequest, Retract(FollowRequest), AddFollower, AddFollowing],
            ),

            (Self::Pending, FollowEvent::Cancel) | (Self::None, FollowEvent::Cancel) => {
                (Self::None, vec![RemoveRequest, Retract(FollowRequest)])
            }
            (Self::Following, FollowEvent::Cancel) => (Self::Following, vec![]),

            (Self::Pending, FollowEvent::Accept) => (
                Self::Following,
                vec![
                    RemoveRequest,
                    AddFollower,
                    AddFollowing,
                    Retract(FollowRequest),
                    Notify(RequestAccepted),
                ],
            ),
            (Self::Pending, FollowEvent::Decline) => {
                (Self::None, vec![RemoveRequest, Retract(FollowRequest)])
            }
            (_, FollowEvent::Accept) | (_, FollowEvent::Decline) => {
                return Err(FollowError::RequestNotFound)
            }

            (Self::Following, FollowEvent::Unfollow) | (Self::None, FollowEvent::Unfollow) => {
                (Self::None, vec![RemoveFollower, RemoveFollowing])
            }
            // A pending request is untouched; only stray follow edges are cleared
            (Self::Pending, FollowEvent::Unfollow) => {
                (Self::Pending, vec![RemoveFollower, RemoveFollowing])
            }
        };

        Ok(Transition {
            from: self,
            to,
            effects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Effect::*;
    use NotificationKind::*;

    const PUBLIC: FollowEvent = FollowEvent::Request {
        privacy: Privacy::Public,
    };
    const PRIVATE: FollowEvent = FollowEvent::Request {
        privacy: Privacy::Private,
    };

    #[test]
    fn public_target_is_followed_directly() {
        let t = FollowState::None.apply(PUBLIC).unwrap();
        assert_eq!(t.to, FollowState::Following);
        assert_eq!(t.effects, vec![AddFollower, AddFollowing]);
    }

    #[test]
    fn private_target_gets_a_single_request() {
        let t = FollowState::None.apply(PRIVATE).unwrap();
        assert_eq!(t.to, FollowState::Pending);
        assert_eq!(t.effects, vec![AddRequest, Notify(FollowRequest)]);

        // Retried request does not notify again
        let again = t.to.apply(PRIVATE).unwrap();
        assert_eq!(again.to, FollowState::Pending);
        assert!(again.effects.is_empty());
    }

    #[test]
    fn pending_request_to_now_public_target_becomes_follow() {
        let t = FollowState::Pending.apply(PUBLIC).unwrap();
        assert_eq!(t.to, FollowState::Following);
        assert!(t.effects.contains(&RemoveRequest));
        assert!(t.effects.contains(&Retract(FollowRequest)));
        assert!(t.effects.contains(&AddFollower));
    }

    #[test]
    fn accept_moves_pending_to_following_and_notifies_follower() {
        let t = FollowState::Pending.apply(FollowEvent::Accept).unwrap();
        assert_eq!(t.from, FollowState::Pending);
        assert_eq!(t.to, FollowState::Following);
        assert_eq!(
            t.effects,
            vec![
                RemoveRequest,
                AddFollower,
                AddFollowing,
                Retract(FollowRequest),
                Notify(RequestAccepted)
            ]
        );
    }

    #[test]
    fn accept_and_decline_require_a_pending_request() {
        for state in [FollowState::None, FollowState::Following] {
            assert_eq!(
                state.apply(FollowEvent::Accept),
                Err(FollowError::RequestNotFound)
            );
            assert_eq!(
                state.apply(FollowEvent::Decline),
                Err(FollowError::RequestNotFound)
            );
        }
    }

    #[test]
    fn decline_and_cancel_return_to_none() {
        let declined = FollowState::Pending.apply(FollowEvent::Decline).unwrap();
        assert_eq!(declined.to, FollowState::None);
        assert!(declined.effects.contains(&RemoveRequest));

        let canceled = FollowState::Pending.apply(FollowEvent::Cancel).unwrap();
        assert_eq!(canceled.to, FollowState::None);
        assert_eq!(canceled.effects, vec![RemoveRequest, Retract(FollowRequest)]);
    }

    #[test]
    fn repeated_removals_are_not_errors() {
        let recancel = FollowState::None.apply(FollowEvent::Cancel).unwrap();
        assert_eq!(recancel.to, FollowState::None);

        let reunfollow = FollowState::None.apply(FollowEvent::Unfollow).unwrap();
        assert_eq!(reunfollow.to, FollowState::None);
        assert_eq!(reunfollow.effects, vec![RemoveFollower, RemoveFollowing]);
    }

    #[test]
    fn cancel_while_following_keeps_the_follow() {
        let t = FollowState::Following.apply(FollowEvent::Cancel).unwrap();
        assert_eq!(t.to, FollowState::Following);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn unfollow_removes_both_sides() {
        let t = FollowState::Following.apply(FollowEvent::Unfollow).unwrap();
        assert_eq!(t.to, FollowState::None);
        assert_eq!(t.effects, vec![RemoveFollower, RemoveFollowing]);
    }

    #[test]
    fn state_derives_from_followers_record() {
        assert_eq!(FollowState::from_record(false, false), FollowState::None);
        assert_eq!(FollowState::from_record(false, true), FollowState::Pending);
        assert_eq!(FollowState::from_record(true, false), FollowState::Following);
    }

    #[test]
    fn self_loop_detection() {
        assert!(FollowEdge::new("alice", "alice").is_self_loop());
        assert!(!FollowEdge::new("alice", "bob").is_self_loop());
    }
}
