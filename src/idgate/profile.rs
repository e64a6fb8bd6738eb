//! The user profile stored next to the token, and its validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const REQUIRED_FIELDS: [&str; 5] = ["userId", "email", "firstName", "lastName", "role"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Buyer,
    Seller,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Buyer => "buyer",
            Self::Seller => "seller",
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

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            other => Err(format!("invalid role: {other}")),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<String>,
}

impl UserProfile {
    /// Parses and validates an untyped record.
    #[must_use]
    pub fn from_record(record: &Value) -> Option<Self> {
        if !is_valid_profile(record) {
            return None;
        }
        serde_json::from_value(record.clone()).ok()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        [
            &self.user_id,
            &self.email,
            &self.first_name,
            &self.last_name,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn field_present(record: &serde_json::Map<String, Value>, field: &str) -> bool {
    match record.get(field) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Null | Value::Bool(false)) | None => false,
        Some(_) => true,
    }
}

/// Checks the record is an object carrying every required field with a
/// non-empty value and an allowed role.
#[must_use]
pub fn is_valid_profile(record: &Value) -> bool {
    let Some(object) = record.as_object() else {
        warn!("security: invalid user data structure");
        return false;
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !field_present(object, field))
        .collect();
    if !missing.is_empty() {
        warn!("security: missing required user fields: {missing:?}");
        return false;
    }

    match object.get("role").and_then(Value::as_str) {
        Some(role) if role.parse::<Role>().is_ok() => true,
        role => {
            warn!("security: invalid user role: {role:?}");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod test_profiles {
    use super::*;

    pub(crate) fn buyer(user_id: &str) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            email: "nimal@example.lk".to_string(),
            first_name: "Nimal".to_string(),
            last_name: "Perera".to_string(),
            role: Role::Buyer,
            is_verified: true,
            verification_status: Some("VERIFIED".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "userId": "u-1",
            "email": "nimal@example.lk",
            "firstName": "Nimal",
            "lastName": "Perera",
            "role": "buyer"
        })
    }

    #[test]
    fn accepts_complete_record() {
        assert!(is_valid_profile(&record()));
        let profile = UserProfile::from_record(&record());
        assert_eq!(profile.map(|p| p.role), Some(Role::Buyer));
    }

    #[test]
    fn role_is_case_insensitive() {
        let mut r = record();
        r["role"] = json!("SELLER");
        assert!(is_valid_profile(&r));
        assert_eq!(UserProfile::from_record(&r).map(|p| p.role), Some(Role::Seller));
    }

    #[test]
    fn rejects_non_objects() {
        for value in [json!(null), json!("u-1"), json!(42), json!(["u-1"])] {
            assert!(!is_valid_profile(&value));
        }
    }

    #[test]
    fn rejects_each_missing_or_empty_field() {
        for field in REQUIRED_FIELDS {
            let mut missing = record();
            if let Some(object) = missing.as_object_mut() {
                object.remove(field);
            }
            assert!(!is_valid_profile(&missing), "missing {field}");

            let mut empty = record();
            empty[field] = json!("");
            assert!(!is_valid_profile(&empty), "empty {field}");

            let mut null = record();
            null[field] = json!(null);
            assert!(!is_valid_profile(&null), "null {field}");
        }
    }

    #[test]
    fn rejects_unknown_role() {
        for role in ["superuser", "moderator", "", "root"] {
            let mut r = record();
            r["role"] = json!(role);
            assert!(!is_valid_profile(&r), "role {role}");
        }
    }

    #[test]
    fn role_serializes_lowercase() -> serde_json::Result<()> {
        let profile = test_profiles::buyer("u-1");
        let value = serde_json::to_value(&profile)?;
        assert_eq!(value["role"], json!("buyer"));
        assert_eq!(value["userId"], json!("u-1"));
        Ok(())
    }
}
