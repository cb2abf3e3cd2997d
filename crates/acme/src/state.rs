//! Order and Challenge lifecycle states
//!
//! States are string-backed: whatever the ACME server reports is stored
//! verbatim, so values this crate does not know about survive a round trip
//! through the store as [`State::Other`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle state shared by Orders and Challenges
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum State {
    /// Not set yet (freshly created resource)
    #[default]
    Unset,
    Unknown,
    Pending,
    Processing,
    Ready,
    Valid,
    Invalid,
    Failed,
    Expired,
    /// A value reported by the server that is not one of the above
    Other(String),
}

impl State {
    pub fn as_str(&self) -> &str {
        match self {
            State::Unset => "",
            State::Unknown => "unknown",
            State::Pending => "pending",
            State::Processing => "processing",
            State::Ready => "ready",
            State::Valid => "valid",
            State::Invalid => "invalid",
            State::Failed => "failed",
            State::Expired => "expired",
            State::Other(s) => s,
        }
    }

    /// Whether no further progress is possible from this state
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            State::Valid | State::Invalid | State::Failed | State::Expired
        )
    }

    /// Whether this state represents a failed attempt
    pub fn is_failure(&self) -> bool {
        matches!(self, State::Invalid | State::Failed | State::Expired)
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        match s {
            "" => State::Unset,
            "unknown" => State::Unknown,
            "pending" => State::Pending,
            "processing" => State::Processing,
            "ready" => State::Ready,
            "valid" => State::Valid,
            "invalid" => State::Invalid,
            "failed" => State::Failed,
            "expired" => State::Expired,
            other => State::Other(other.to_string()),
        }
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        State::from(s.as_str())
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(State::from(s))
    }
}
