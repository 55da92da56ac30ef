use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};
use tracing::{error, info, warn};

use crate::auth::dto::{AuthResponse, LoginRequest, RegisterRequest};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::config::HashConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::PublicUser;
use crate::users::repo::CredentialStore;
use crate::users::repo_types::{MemberProfile, NewUser, Role};

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

lazy_static! {
    // unknown-email logins still pay for one argon2 verification
    static ref DUMMY_HASH: String =
        hash_password(&HashConfig::default(), "placeholder-password")
            .expect("default argon2 params are valid");
}

/// Orchestrates directory lookup, password verification and token issuance.
/// Capabilities are constructor-passed so tests can run it against an
/// in-memory store.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    keys: JwtKeys,
    hashing: HashConfig,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            keys: JwtKeys::from_ref(state),
            hashing: state.config.hashing.clone(),
        }
    }
}

impl AuthService {
    /// Unknown email, wrong password and deactivated account are all
    /// reported as the same `InvalidCredentials`.
    pub async fn login(&self, payload: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let email = normalize_email(&payload.email);
        if !is_valid_email(&email) {
            warn!("login with invalid email format");
            return Err(ApiError::Validation("Invalid email".into()));
        }

        let user = match self.users.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                let _ = verify_password(&payload.password, &DUMMY_HASH);
                warn!("login unknown email");
                return Err(ApiError::InvalidCredentials);
            }
        };

        let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
            error!(error = %e, "verify_password failed");
            ApiError::Internal
        })?;
        if !ok || !user.is_active {
            warn!(user_id = %user.id, active = user.is_active, "login rejected");
            return Err(ApiError::InvalidCredentials);
        }

        let access_token = self.keys.sign(user.id, &user.email, user.role).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            ApiError::Internal
        })?;

        info!(user_id = %user.id, role = %user.role, "user logged in");
        Ok(AuthResponse {
            access_token,
            user: PublicUser::from(&user),
        })
    }

    /// Registration always creates member-role rows; elevated roles are
    /// seeded out of band.
    pub async fn register(&self, payload: RegisterRequest) -> Result<AuthResponse, ApiError> {
        let email = normalize_email(&payload.email);
        if !is_valid_email(&email) {
            warn!("register with invalid email format");
            return Err(ApiError::Validation("Invalid email".into()));
        }
        if payload.password.len() < 8 {
            warn!("register password too short");
            return Err(ApiError::Validation("Password too short".into()));
        }
        let date_of_birth = match payload.date_of_birth.as_deref() {
            Some(raw) => Some(
                Date::parse(raw, format_description!("[year]-[month]-[day]"))
                    .map_err(|_| ApiError::Validation("Invalid date_of_birth".into()))?,
            ),
            None => None,
        };

        if self.users.find_by_email(&email).await?.is_some() {
            warn!("register email already taken");
            return Err(ApiError::EmailTaken);
        }

        let password_hash = hash_password(&self.hashing, &payload.password).map_err(|e| {
            error!(error = %e, "hash_password failed");
            ApiError::Internal
        })?;

        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                role: Role::Member,
                profile: Some(MemberProfile {
                    first_name: payload.first_name,
                    last_name: payload.last_name,
                    date_of_birth,
                    phone_number: payload.phone_number,
                    medical_history: payload.medical_history,
                    fitness_goals: payload.fitness_goals,
                }),
            })
            .await?;

        let access_token = self.keys.sign(user.id, &user.email, user.role).map_err(|e| {
            error!(error = %e, "jwt sign failed");
            ApiError::Internal
        })?;

        info!(user_id = %user.id, email = %user.email, "member registered");
        Ok(AuthResponse {
            access_token,
            user: PublicUser::from(&user),
        })
    }
}
