use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Role discriminator of the single-table user model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Trainer,
    Member,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Trainer => write!(f, "trainer"),
            Role::Member => write!(f, "member"),
        }
    }
}

/// Raw `users` row: base columns plus the nullable member columns, as stored.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<Date>,
    pub phone_number: Option<String>,
    pub medical_history: Option<String>,
    pub fitness_goals: Option<String>,
}

/// Profile extension carried only by member-role users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<Date>,
    pub phone_number: Option<String>,
    pub medical_history: Option<String>,
    pub fitness_goals: Option<String>,
}

/// Domain user: flat base record with an optional extension payload selected
/// by the role tag. Deliberately not `Serialize` — client-facing views are
/// built from [`crate::users::dto::PublicUser`], which has no hash field at
/// all.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub profile: Option<MemberProfile>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let profile = match row.role {
            Role::Member => Some(MemberProfile {
                first_name: row.first_name,
                last_name: row.last_name,
                date_of_birth: row.date_of_birth,
                phone_number: row.phone_number,
                medical_history: row.medical_history,
                fitness_goals: row.fitness_goals,
            }),
            Role::Admin | Role::Trainer => None,
        };
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            profile,
        }
    }
}

/// Insert payload for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub profile: Option<MemberProfile>,
}
