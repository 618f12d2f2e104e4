use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::{PreferredLanguage, User, VerificationState};

/// Request body for account creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub nickname: String,
    pub email: String,
    pub phone: Option<String>,
    pub google_id: Option<String>,
    /// Kept as free text so unknown languages fail validation, not decoding.
    pub preferred_language: Option<String>,
}

/// Partial profile update. An empty string clears `name` or `phone`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmVerificationRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkGoogleRequest {
    pub google_id: String,
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

/// Exactly one of the two keys must be present.
#[derive(Debug, Default, Deserialize)]
pub struct LookupQuery {
    pub email: Option<String>,
    pub google_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetUserQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

/// Public view of an account.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub nickname: String,
    pub email: String,
    pub phone: Option<String>,
    pub google_id: Option<String>,
    pub verified: bool,
    pub verification: VerificationState,
    pub preferred_language: PreferredLanguage,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl PublicUser {
    pub fn from_user(user: User, now: OffsetDateTime) -> Self {
        Self {
            verification: user.verification_state(now),
            id: user.id,
            name: user.name,
            nickname: user.nickname,
            email: user.email,
            phone: user.phone,
            google_id: user.google_id,
            verified: user.verified,
            preferred_language: user.preferred_language,
            created_at: user.created_at,
            updated_at: user.updated_at,
            deleted_at: user.deleted_at,
        }
    }
}

/// Returned after a token is issued; the token itself only travels by mail.
#[derive(Debug, Serialize)]
pub struct VerificationIssued {
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}
