use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "preferred_language", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PreferredLanguage {
    #[default]
    En,
    Fr,
}

impl PreferredLanguage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }
}

impl std::str::FromStr for PreferredLanguage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "en" => Ok(Self::En),
            "fr" => Ok(Self::Fr),
            other => Err(AppError::validation(
                "preferred_language",
                format!("unsupported language {other:?}, expected one of: en, fr"),
            )),
        }
    }
}

/// Verification progress derived from the token fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unverified,
    PendingVerification,
    TokenExpired,
    Verified,
}

/// Account record in the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
    pub name: Option<String>,
    pub nickname: String,
    pub google_id: Option<String>,
    pub email: String,
    pub verified: bool,
    pub phone: Option<String>,
    pub preferred_language: PreferredLanguage,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verification_token_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub verification_token_issued_at: Option<OffsetDateTime>,
}

/// Already validated and normalized input for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: Option<String>,
    pub nickname: String,
    pub email: String,
    pub phone: Option<String>,
    pub google_id: Option<String>,
    pub preferred_language: PreferredLanguage,
}

/// Validated profile changes; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub name: Option<Option<String>>,
    pub nickname: Option<String>,
    pub phone: Option<Option<String>>,
    pub preferred_language: Option<PreferredLanguage>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A freshly generated token with its lifetime window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl User {
    pub fn new(input: NewUser, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            name: input.name,
            nickname: input.nickname,
            google_id: input.google_id,
            email: input.email,
            verified: false,
            phone: input.phone,
            preferred_language: input.preferred_language,
            verification_token: None,
            verification_token_expires: None,
            verification_token_issued_at: None,
        }
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn verification_state(&self, now: OffsetDateTime) -> VerificationState {
        if self.verified {
            return VerificationState::Verified;
        }
        match self.verification_token_expires {
            None => VerificationState::Unverified,
            Some(expires) if now > expires => VerificationState::TokenExpired,
            Some(_) => VerificationState::PendingVerification,
        }
    }

    /// Stores a new token, invalidating any previous one.
    ///
    /// Rejected while a previous token is younger than `cooldown`.
    pub fn issue_verification(&mut self, issued: &IssuedToken, cooldown: Duration) -> AppResult<()> {
        if self.verified {
            return Err(AppError::AlreadyVerified);
        }
        if let Some(last) = self.verification_token_issued_at {
            let ready_at = last
                .checked_add(cooldown)
                .ok_or(AppError::Internal("resend cooldown is out of range"))?;
            if issued.issued_at < ready_at {
                let wait = (ready_at - issued.issued_at).whole_seconds().max(1);
                return Err(AppError::ResendTooSoon {
                    retry_after_secs: wait,
                });
            }
        }

        self.verification_token = Some(issued.token.clone());
        self.verification_token_expires = Some(issued.expires_at);
        self.verification_token_issued_at = Some(issued.issued_at);
        self.updated_at = issued.issued_at;
        Ok(())
    }

    /// Consumes the outstanding token if `presented` matches and has not expired.
    /// On any error the record is left untouched.
    pub fn confirm_verification(&mut self, presented: &str, now: OffsetDateTime) -> AppResult<()> {
        if self.verified {
            return Err(AppError::AlreadyVerified);
        }
        let (Some(stored), Some(expires)) = (
            self.verification_token.as_deref(),
            self.verification_token_expires,
        ) else {
            return Err(AppError::TokenMismatch);
        };
        if !bool::from(stored.as_bytes().ct_eq(presented.as_bytes())) {
            return Err(AppError::TokenMismatch);
        }
        if now > expires {
            return Err(AppError::TokenExpired);
        }

        self.verified = true;
        self.clear_token();
        self.updated_at = now;
        Ok(())
    }

    /// Clears the outstanding token when it is `token`; a newer token is left alone.
    pub fn withdraw_verification(&mut self, token: &str, now: OffsetDateTime) {
        if self.verification_token.as_deref() == Some(token) {
            self.clear_token();
            self.updated_at = now;
        }
    }

    pub fn apply_profile(&mut self, patch: ProfilePatch, now: OffsetDateTime) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(nickname) = patch.nickname {
            self.nickname = nickname;
        }
        if let Some(phone) = patch.phone {
            self.phone = phone;
        }
        if let Some(lang) = patch.preferred_language {
            self.preferred_language = lang;
        }
        self.updated_at = now;
    }

    pub fn soft_delete(&mut self, now: OffsetDateTime) -> AppResult<()> {
        if self.is_deleted() {
            return Err(AppError::NotFound);
        }
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn restore(&mut self, now: OffsetDateTime) -> AppResult<()> {
        if !self.is_deleted() {
            return Err(AppError::NotFound);
        }
        self.deleted_at = None;
        self.updated_at = now;
        Ok(())
    }

    fn clear_token(&mut self) {
        self.verification_token = None;
        self.verification_token_expires = None;
        self.verification_token_issued_at = None;
    }
}
