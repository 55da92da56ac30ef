use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::{Role, User};

/// Public part of a user returned to clients. There is no password-hash
/// field here, so the hash cannot leak through serialization.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        let profile = user.profile.as_ref();
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: profile.and_then(|p| p.first_name.clone()),
            last_name: profile.and_then(|p| p.last_name.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}
