use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Upper bound of [`Account::reputation`].
pub const MAX_REPUTATION: u8 = 100;

/// An identity owned by the external auth subsystem.
///
/// The ledger only ever reads accounts; it never changes role, blacklist or
/// reputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub blacklisted: bool,
    #[serde(default)]
    pub real_name_verified: bool,
    #[serde(default = "default_reputation", deserialize_with = "clamp_reputation")]
    pub reputation: u8,
}

fn default_reputation() -> u8 {
    MAX_REPUTATION
}

fn clamp_reputation<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, MAX_REPUTATION as i64) as u8)
}

impl Account {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id: AccountId(id),
            username: username.into(),
            display_name: None,
            role: Role::User,
            blacklisted: false,
            real_name_verified: true,
            reputation: MAX_REPUTATION,
        }
    }

    pub fn admin(id: u64, username: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::new(id, username)
        }
    }

    pub fn blacklisted(mut self) -> Self {
        self.blacklisted = true;
        self
    }

    pub fn unverified(mut self) -> Self {
        self.real_name_verified = false;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reputation_is_clamped_when_loaded() {
        let account: Account =
            toml::from_str("id = 1\nusername = \"alice\"\nreputation = 250").unwrap();
        assert_eq!(account.reputation, MAX_REPUTATION);

        let account: Account =
            toml::from_str("id = 2\nusername = \"bob\"\nreputation = -5").unwrap();
        assert_eq!(account.reputation, 0);
    }

    #[test]
    fn test_role_defaults_to_user() {
        let account: Account = toml::from_str("id = 3\nusername = \"carol\"").unwrap();
        assert!(!account.is_admin());
        assert!(!account.blacklisted);
    }
}
