use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel;

/// Which side of the tutoring relationship a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Parent,
    Teacher,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Teacher => "teacher",
        }
    }

    pub fn is_teacher(self) -> bool {
        match self {
            Role::Teacher => true,
            Role::Student | Role::Parent => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "parent" => Ok(Role::Parent),
            "teacher" => Ok(Role::Teacher),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// One participant of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Party {
    pub id: i64,
    pub role: Role,
}

impl Party {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairError {
    #[error("a conversation needs exactly one teacher")]
    NeedsOneTeacher,
    #[error("a user cannot message themselves")]
    SameUser,
    #[error("user ids must be positive")]
    InvalidId,
}

/// A validated student-or-parent / teacher pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationPair {
    member: Party,
    teacher: Party,
}

impl ConversationPair {
    pub fn new(a: Party, b: Party) -> Result<Self, PairError> {
        if a.id <= 0 || b.id <= 0 {
            return Err(PairError::InvalidId);
        }
        if a.id == b.id {
            return Err(PairError::SameUser);
        }
        match (a.role.is_teacher(), b.role.is_teacher()) {
            (false, true) => Ok(Self { member: a, teacher: b }),
            (true, false) => Ok(Self { member: b, teacher: a }),
            (true, true) | (false, false) => Err(PairError::NeedsOneTeacher),
        }
    }

    /// The student or parent side.
    pub fn member(&self) -> Party {
        self.member
    }

    pub fn teacher(&self) -> Party {
        self.teacher
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.member.id == user_id || self.teacher.id == user_id
    }

    pub fn channel_id(&self) -> String {
        channel::compute_channel_id(self.member.id, self.teacher.id)
    }

    pub fn channel_name(&self) -> String {
        channel::channel_name(self.member.id, self.teacher.id)
    }
}
