//! The identity an operation runs on behalf of.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClassroomError;

/// Platform-wide role supplied by the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

}

impl FromStr for Role {
    type Err = ClassroomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "member" | "student" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            _ => Err(ClassroomError::invalid(format!("unknown role '{}'", s))),
        }
    }
}

/// The caller of an operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i32,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i32, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            avatar: None,
            role,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// Admins moderate; they never author posts, comments or chat.
    pub fn can_author(&self) -> bool {
        self.role != Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names() {
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!("student".parse::<Role>().unwrap(), Role::Member);
        assert_eq!(Role::Admin.as_str().parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }
}
