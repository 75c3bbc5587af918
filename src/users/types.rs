//! Application user records

use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::UserId;

/// Display name given to users whose provider sent none
pub const DEFAULT_DISPLAY_NAME: &str = "Utilisateur";

/// Role of an application user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Contributor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Contributor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Contributor => "CONTRIBUTOR",
            Role::Admin => "ADMIN",
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A row of the `users` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photo_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl AppUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Payload of the insert issued the first time an identity is seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub photo_url: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

/// Payload of the update issued on every later reconciliation.
///
/// `created_at` is never sent, so the stored value survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserChanges {
    pub email: String,
    pub name: String,
    pub photo_url: String,
    pub role: Role,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_value(Role::Contributor).unwrap(), json!("CONTRIBUTOR"));
        let role: Role = serde_json::from_value(json!("ADMIN")).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_row_with_nulls() {
        let user: AppUser = serde_json::from_value(json!({
            "id": "u1",
            "email": null,
            "name": "Jisoo",
            "photo_url": null,
            "role": null,
            "created_at": "2024-03-01T10:00:00+00:00"
        }))
        .unwrap();

        assert_eq!(user.role, Role::User);
        assert_eq!(user.photo_url, "");
        assert!(!user.is_admin());
        assert!(user.updated_at.is_none());
    }
}
