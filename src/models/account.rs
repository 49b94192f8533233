use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    pub fn from_claim(role: Option<&str>) -> Self {
        match role {
            Some(r) if r.eq_ignore_ascii_case("admin") => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}
