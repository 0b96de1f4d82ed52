use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an authenticated user (client, employee or admin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The authenticated principal behind an engine call.
///
/// Supplied by the caller's authentication layer; the engine only authorizes
/// against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Actor {
    Admin(UserId),
    Employee(UserId),
    Client(UserId),
}

impl Actor {
    pub fn new(role: Role, id: UserId) -> Self {
        match role {
            Role::Admin => Actor::Admin(id),
            Role::Employee => Actor::Employee(id),
            Role::Client => Actor::Client(id),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Actor::Admin(UserId::new(id))
    }

    pub fn employee(id: impl Into<String>) -> Self {
        Actor::Employee(UserId::new(id))
    }

    pub fn client(id: impl Into<String>) -> Self {
        Actor::Client(UserId::new(id))
    }

    pub fn id(&self) -> &UserId {
        match self {
            Actor::Admin(id) | Actor::Employee(id) | Actor::Client(id) => id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Actor::Admin(_) => Role::Admin,
            Actor::Employee(_) => Role::Employee,
            Actor::Client(_) => Role::Client,
        }
    }

    /// Employees and admins share every staff privilege.
    pub fn is_staff(&self) -> bool {
        matches!(self, Actor::Admin(_) | Actor::Employee(_))
    }

    /// True when this is the client the order belongs to.
    pub fn owns(&self, client_id: &UserId) -> bool {
        matches!(self, Actor::Client(id) if id == client_id)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_requires_client_role() {
        let owner = UserId::new("c-1");
        assert!(Actor::client("c-1").owns(&owner));
        assert!(!Actor::client("c-2").owns(&owner));
        // Staff sharing the id string do not own the order.
        assert!(!Actor::employee("c-1").owns(&owner));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(" Employee ".parse::<Role>(), Ok(Role::Employee));
        assert!("manager".parse::<Role>().is_err());
    }
}
