use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Label the identification service reports for a face it could not match.
pub const UNRECOGNIZED: &str = "unrecognized";

/// Inbound bus topics handled by the access router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Motion,
    PasswordAttempt,
    Ring,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Motion, Topic::PasswordAttempt, Topic::Ring];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Motion => "motion",
            Topic::PasswordAttempt => "password-attempt",
            Topic::Ring => "ring",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered by the bus. Consumed once, never persisted.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: Topic,
    pub payload: Bytes,
}

impl Event {
    pub fn new(topic: Topic, payload: impl Into<Bytes>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }
}

/// Outbound command for the door controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Unlock(UnlockReason),
    Lock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockReason {
    FaceMatch { names: Vec<String> },
    Password,
    Manual,
}

#[derive(Serialize)]
struct FaceMatchPayload<'a> {
    status: &'static str,
    names: &'a [String],
}

impl Command {
    /// Payload published on the bus. The door controller treats any message on
    /// the unlock topic as an unlock; face matches carry the recognised names.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::Unlock(UnlockReason::FaceMatch { names }) => serde_json::to_vec(
                &FaceMatchPayload {
                    status: "known",
                    names,
                },
            )
            .unwrap_or_else(|_| b"unlock".to_vec()),
            Command::Unlock(_) => b"unlock".to_vec(),
            Command::Lock => b"lock".to_vec(),
        }
    }
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Label {
    Known(String),
    Unrecognized,
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        if s == UNRECOGNIZED {
            Label::Unrecognized
        } else {
            Label::Known(s)
        }
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        match label {
            Label::Known(name) => name,
            Label::Unrecognized => UNRECOGNIZED.to_string(),
        }
    }
}

/// Faces found in a frame, one label per face. Empty when no face was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationResult {
    pub labels: Vec<Label>,
}

impl IdentificationResult {
    pub fn new(labels: Vec<Label>) -> Self {
        Self { labels }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Names of every recognised face, in the order reported.
    pub fn known_names(&self) -> Vec<String> {
        self.labels
            .iter()
            .filter_map(|label| match label {
                Label::Known(name) => Some(name.clone()),
                Label::Unrecognized => None,
            })
            .collect()
    }

    pub fn decision(&self) -> Decision {
        if self.labels.is_empty() {
            Decision::NotifyNoFace
        } else if self.labels.iter().any(|l| matches!(l, Label::Known(_))) {
            Decision::Unlock
        } else {
            Decision::NotifyUnknown
        }
    }
}

/// Outcome of one access-control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Unlock,
    NotifyUnknown,
    NotifyNoFace,
    Deny,
}
