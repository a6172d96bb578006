//! The authenticated user behind a session token.

use serde::{Deserialize, Serialize};

/// Identity resolved from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Display name from the identity provider, if any
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Never serialized back to clients
    #[serde(skip)]
    pub access_token: String,
}

impl AuthUser {
    /// Build from the auth service's `/user` payload.
    ///
    /// Name and avatar come from `user_metadata` (`full_name`/`name`,
    /// `avatar_url`/`picture`).
    pub fn from_auth_payload(payload: &serde_json::Value, access_token: &str) -> Option<Self> {
        let id = payload.get("id")?.as_str()?.to_string();
        let meta = payload.get("user_metadata");
        let meta_str = |keys: &[&str]| {
            keys.iter().find_map(|key| {
                meta.and_then(|m| m.get(*key))
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            })
        };

        Some(Self {
            id,
            email: payload
                .get("email")
                .and_then(|v| v.as_str())
                .map(String::from),
            name: meta_str(&["full_name", "name"]),
            avatar: meta_str(&["avatar_url", "picture"]),
            access_token: access_token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_auth_payload_metadata() {
        let payload = json!({
            "id": "u-1",
            "email": "a@b.c",
            "user_metadata": {"name": "Ann", "picture": "https://img/a.png"}
        });

        let user = AuthUser::from_auth_payload(&payload, "tok").unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.name.as_deref(), Some("Ann"));
        assert_eq!(user.avatar.as_deref(), Some("https://img/a.png"));
        assert_eq!(user.access_token, "tok");
    }

    #[test]
    fn payload_without_id_is_rejected() {
        assert!(AuthUser::from_auth_payload(&json!({"email": "x"}), "t").is_none());
    }

    #[test]
    fn token_is_not_serialized() {
        let user = AuthUser {
            id: "u".into(),
            access_token: "secret".into(),
            ..AuthUser::default()
        };
        let text = serde_json::to_string(&user).unwrap();
        assert!(!text.contains("secret"));
    }
}
