//! Core types for agent coordination.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque structured payload attached to statuses and conflicts.
pub type Metadata = Map<String, Value>;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub const ALL: &'static [Self] = &[$(Self::$variant),+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// What an agent reports it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Working,
    Blocked,
    Completed,
    Error,
}

string_enum!(AgentState {
    Idle => "idle",
    Working => "working",
    Blocked => "blocked",
    Completed => "completed",
    Error => "error",
});

/// Latest reported status of one agent on one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub feature_id: String,
    pub status: AgentState,
    pub current_phase: Option<String>,
    pub current_task: Option<String>,
    pub progress: i32,
    pub message: Option<String>,
    pub metadata: Option<Metadata>,
    pub started_at: i64,
    pub last_update: i64,
}

/// Input for a status report. Optional fields left `None` are stored as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub current_phase: Option<String>,
    pub current_task: Option<String>,
    pub progress: i32,
    pub message: Option<String>,
    pub metadata: Option<Metadata>,
}

impl StatusReport {
    pub fn with_progress(progress: i32) -> Self {
        Self {
            progress,
            ..Default::default()
        }
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.current_phase = Some(phase.into());
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(task.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Completed,
    Abandoned,
}

string_enum!(ClaimStatus {
    Active => "active",
    Completed => "completed",
    Abandoned => "abandoned",
});

/// One claim attempt on a task. Rows are never deleted, only transitioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskClaim {
    pub id: i64,
    pub feature_id: String,
    pub phase: String,
    pub task_id: String,
    pub agent_id: String,
    pub status: ClaimStatus,
    pub claimed_at: i64,
    pub released_at: Option<i64>,
    /// Agent or operator that ended the claim.
    pub released_by: Option<String>,
    pub release_reason: Option<String>,
}

impl TaskClaim {
    pub fn is_active(&self) -> bool {
        self.status == ClaimStatus::Active
    }
}

/// Result of a claim attempt. A denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Granted { claim: TaskClaim },
    Denied { held_by: String },
}

impl Serialize for ClaimOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("ClaimOutcome", 2)?;
        match self {
            Self::Granted { claim } => {
                out.serialize_field("granted", &true)?;
                out.serialize_field("claim", claim)?;
            }
            Self::Denied { held_by } => {
                out.serialize_field("granted", &false)?;
                out.serialize_field("held_by", held_by)?;
            }
        }
        out.end()
    }
}

impl ClaimOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    pub fn claim(&self) -> Option<&TaskClaim> {
        match self {
            Self::Granted { claim } => Some(claim),
            Self::Denied { .. } => None,
        }
    }

    pub fn held_by(&self) -> Option<&str> {
        match self {
            Self::Granted { .. } => None,
            Self::Denied { held_by } => Some(held_by),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    FileModification,
    ImplementationDisagreement,
    TestFailure,
}

string_enum!(ConflictType {
    FileModification => "file_modification",
    ImplementationDisagreement => "implementation_disagreement",
    TestFailure => "test_failure",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

string_enum!(ConflictStatus {
    Pending => "pending",
    Resolved => "resolved",
});

/// Resolution details, present only once a conflict is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolution: String,
    pub resolved_by: String,
    pub resolved_at: i64,
}

/// A recorded disagreement or collision between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConflict {
    pub id: String,
    pub feature_id: String,
    pub conflict_type: ConflictType,
    /// Sorted, without duplicates.
    pub involved_agents: Vec<String>,
    pub description: String,
    pub file_path: Option<String>,
    pub metadata: Option<Metadata>,
    pub status: ConflictStatus,
    pub reported_at: i64,
    /// Set exactly when `status` is resolved.
    #[serde(flatten)]
    pub resolution: Option<Resolution>,
}

impl AgentConflict {
    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }

    pub fn involves(&self, agent_id: &str) -> bool {
        self.involved_agents.iter().any(|a| a == agent_id)
    }
}

/// Input for reporting a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConflict {
    pub feature_id: String,
    pub conflict_type: ConflictType,
    pub involved_agents: Vec<String>,
    pub description: String,
    pub file_path: Option<String>,
    pub metadata: Option<Metadata>,
}

impl NewConflict {
    pub fn new(
        feature_id: impl Into<String>,
        conflict_type: ConflictType,
        involved_agents: impl IntoIterator<Item = impl Into<String>>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            feature_id: feature_id.into(),
            conflict_type,
            involved_agents: involved_agents.into_iter().map(Into::into).collect(),
            description: description.into(),
            file_path: None,
            metadata: None,
        }
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enums_parse_their_wire_names() {
        for state in AgentState::ALL {
            assert_eq!(AgentState::parse(state.as_str()), Some(*state));
        }
        assert_eq!(
            ConflictType::parse("implementation_disagreement"),
            Some(ConflictType::ImplementationDisagreement)
        );
        assert_eq!(ClaimStatus::parse("running"), None);
    }

    #[test]
    fn claim_outcome_serializes_granted_flag() {
        let denied = ClaimOutcome::Denied {
            held_by: "A".to_string(),
        };
        let value = serde_json::to_value(&denied).unwrap();
        assert_eq!(value, json!({ "granted": false, "held_by": "A" }));
    }

    #[test]
    fn pending_conflict_has_no_resolution_fields() {
        let conflict = AgentConflict {
            id: "c1".to_string(),
            feature_id: "F".to_string(),
            conflict_type: ConflictType::TestFailure,
            involved_agents: vec!["A".to_string()],
            description: "tests broke".to_string(),
            file_path: None,
            metadata: None,
            status: ConflictStatus::Pending,
            reported_at: 1,
            resolution: None,
        };
        let value = serde_json::to_value(&conflict).unwrap();

        assert!(conflict.is_pending());
        assert_eq!(value["status"], "pending");
        assert!(value.get("resolution").is_none());
        assert!(value.get("resolved_by").is_none());
    }
}
