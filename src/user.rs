use serde::{Deserialize, Serialize};
use spacetimedb::Timestamp;

use crate::error::ProgressError;

const MAX_FIELD_LEN: usize = 64;

/// Registered employee. Only `name` and `avatar` change after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub department: String,
    pub role: String,
    /// Self-reported experience level ("junior", "senior", ...)
    pub experience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Microseconds since the Unix epoch
    #[serde(default)]
    pub registered_at: i64,
}

/// Registration form as submitted by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub name: String,
    pub department: String,
    pub role: String,
    pub experience: String,
}

impl Registration {
    /// Trim fields and reject empty or oversized ones
    pub fn into_profile(self, user_id: &str, now: Timestamp) -> Result<UserProfile, ProgressError> {
        let username = clean("username", &self.username)?.to_lowercase();
        Ok(UserProfile {
            id: user_id.to_string(),
            username,
            name: clean("name", &self.name)?,
            department: clean("department", &self.department)?,
            role: clean("role", &self.role)?,
            experience: clean("experience", &self.experience)?,
            avatar: None,
            registered_at: now.to_micros_since_unix_epoch(),
        })
    }
}

impl UserProfile {
    pub fn registered_at(&self) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(self.registered_at)
    }

    /// Apply a profile edit; `None` leaves a field unchanged, an empty avatar clears it
    pub fn apply_edit(&mut self, name: Option<String>, avatar: Option<String>) -> Result<(), ProgressError> {
        if let Some(name) = name {
            self.name = clean("name", &name)?;
        }
        if let Some(avatar) = avatar {
            let avatar = avatar.trim();
            self.avatar = if avatar.is_empty() { None } else { Some(clean("avatar", avatar)?) };
        }
        Ok(())
    }
}

pub(crate) fn clean(field: &str, value: &str) -> Result<String, ProgressError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProgressError::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(ProgressError::InvalidInput(format!("{} is longer than {} characters", field, MAX_FIELD_LEN)));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> Registration {
        Registration {
            username: "  ADA ".into(),
            name: "Ada Lovelace".into(),
            department: "Engineering".into(),
            role: "Developer".into(),
            experience: "senior".into(),
        }
    }

    #[test]
    fn test_registration_normalizes_username() {
        let profile = form().into_profile("u1", Timestamp::from_micros_since_unix_epoch(7)).unwrap();
        assert_eq!(profile.username, "ada");
        assert_eq!(profile.registered_at, 7);
        assert!(profile.avatar.is_none());
    }

    #[test]
    fn test_registration_rejects_blank_department() {
        let mut bad = form();
        bad.department = "   ".into();
        let err = bad.into_profile("u1", Timestamp::from_micros_since_unix_epoch(0)).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidInput(msg) if msg.contains("department")));
    }

    #[test]
    fn test_profile_edit() {
        let mut profile = form().into_profile("u1", Timestamp::from_micros_since_unix_epoch(0)).unwrap();
        profile.apply_edit(None, Some("🦊".into())).unwrap();
        assert_eq!(profile.avatar.as_deref(), Some("🦊"));
        assert_eq!(profile.name, "Ada Lovelace");

        profile.apply_edit(Some("Ada King".into()), Some(String::new())).unwrap();
        assert_eq!(profile.name, "Ada King");
        assert!(profile.avatar.is_none());

        assert!(profile.apply_edit(Some(" ".into()), None).is_err());
    }
}
