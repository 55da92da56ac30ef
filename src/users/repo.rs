use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, User, UserRow};
#[cfg(test)]
use crate::users::repo_types::Role;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable")]
    Unavailable,
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Capability seam over the backing user table. Constructor-passed so the
/// auth service and handlers can run against an in-memory fake in tests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, email, password_hash, role, is_active, created_at, updated_at, \
     first_name, last_name, date_of_birth, phone_number, medical_history, fitness_goals";

/// Postgres-backed store. Every query runs under a bounded timeout so an
/// unreachable database surfaces as [`StoreError::Unavailable`] instead of
/// a hung request.
pub struct PgCredentialStore {
    db: PgPool,
    timeout: Duration,
}

impl PgCredentialStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Err(_elapsed) => Err(StoreError::Unavailable),
            Ok(Err(e)) => Err(classify(e)),
            Ok(Ok(v)) => Ok(v),
        }
    }
}

fn classify(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::EmailTaken
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = self
            .bounded(
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
                ))
                .bind(email)
                .fetch_optional(&self.db),
            )
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = self
            .bounded(
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&self.db),
            )
            .await?;
        Ok(row.map(User::from))
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let profile = new.profile.unwrap_or_default();
        let row = self
            .bounded(
                sqlx::query_as::<_, UserRow>(&format!(
                    r#"
                    INSERT INTO users
                        (email, password_hash, role, first_name, last_name,
                         date_of_birth, phone_number, medical_history, fitness_goals)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING {USER_COLUMNS}
                    "#
                ))
                .bind(&new.email)
                .bind(&new.password_hash)
                .bind(new.role)
                .bind(&profile.first_name)
                .bind(&profile.last_name)
                .bind(profile.date_of_birth)
                .bind(&profile.phone_number)
                .bind(&profile.medical_history)
                .bind(&profile.fitness_goals)
                .fetch_one(&self.db),
            )
            .await?;
        Ok(User::from(row))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let rows = self
            .bounded(
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db),
            )
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

/// In-memory store used by unit tests in place of Postgres.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryStore {
    users: std::sync::Mutex<Vec<User>>,
}

#[cfg(test)]
impl InMemoryStore {
    pub fn set_active(&self, email: &str, active: bool) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.email == email) {
            user.is_active = active;
        }
    }
}

#[cfg(test)]
#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::EmailTaken);
        }
        let now = time::OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            is_active: true,
            created_at: now,
            updated_at: now,
            profile: match new.role {
                Role::Member => Some(new.profile.unwrap_or_default()),
                Role::Admin | Role::Trainer => None,
            },
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().unwrap();
        let mut all: Vec<User> = users.clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::Member,
            profile: None,
        }
    }

    #[tokio::test]
    async fn find_by_email_is_idempotent() {
        let store = InMemoryStore::default();
        store.create(member("alice@example.com")).await.unwrap();

        let first = store.find_by_email("alice@example.com").await.unwrap().unwrap();
        let second = store.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.email, second.email);
        assert_eq!(first.role, second.role);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::default();
        store.create(member("bob@example.com")).await.unwrap();
        let err = store.create(member("bob@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken));
    }

    #[tokio::test]
    async fn list_paginates() {
        let store = InMemoryStore::default();
        for i in 0..5 {
            store.create(member(&format!("user{i}@example.com"))).await.unwrap();
        }
        assert_eq!(store.list(10, 0).await.unwrap().len(), 5);
        assert_eq!(store.list(2, 2).await.unwrap().len(), 2);
        assert!(store.list(10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_rows_share_creation_and_update_time() {
        let store = InMemoryStore::default();
        let user = store.create(member("new@example.com")).await.unwrap();
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn elevated_roles_never_get_a_profile() {
        let store = InMemoryStore::default();
        let admin = store
            .create(NewUser {
                email: "root@example.com".into(),
                password_hash: "$argon2id$stub".into(),
                role: Role::Admin,
                profile: Some(Default::default()),
            })
            .await
            .unwrap();
        assert!(admin.profile.is_none());
    }
}
