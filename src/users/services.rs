use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::VerificationConfig,
    error::{AppError, AppResult},
    mailer::VerificationMailer,
    users::{
        dto::{CreateUserRequest, UpdateUserRequest},
        model::User,
        repo::UserStore,
        token, validation,
    },
};

const MAX_PAGE: i64 = 100;

/// Account lifecycle on top of a [`UserStore`].
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn VerificationMailer>,
    verification: VerificationConfig,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn VerificationMailer>,
        verification: VerificationConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            verification,
        }
    }

    #[instrument(skip(self, req))]
    pub async fn create(&self, req: &CreateUserRequest) -> AppResult<User> {
        let input = validation::validate_new_user(req)?;
        let user = User::new(input, OffsetDateTime::now_utc());
        let user = self.store.insert(&user).await.map_err(|e| {
            if matches!(e, AppError::ConstraintViolation { .. }) {
                warn!(email = %user.email, "email already registered");
            }
            e
        })?;
        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    pub async fn get(&self, id: Uuid, include_deleted: bool) -> AppResult<User> {
        self.store
            .find_by_id(id, include_deleted)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.store
            .find_by_email(&validation::normalize_email(email))
            .await
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> AppResult<Option<User>> {
        self.store.find_by_google_id(google_id.trim()).await
    }

    pub async fn list_active(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        self.store
            .list_active(limit.clamp(1, MAX_PAGE), offset.max(0))
            .await
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(&self, id: Uuid, req: &UpdateUserRequest) -> AppResult<User> {
        let patch = validation::validate_profile_patch(req)?;
        let user = self
            .store
            .update_profile(id, patch, OffsetDateTime::now_utc())
            .await?;
        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn link_google_identity(&self, id: Uuid, google_id: &str) -> AppResult<User> {
        let google_id = validation::validate_google_id(google_id)?;
        let user = self
            .store
            .link_google_id(id, &google_id, OffsetDateTime::now_utc())
            .await?;
        info!(user_id = %user.id, "google identity linked");
        Ok(user)
    }

    /// Issues a fresh token and hands it to the mailer, returning the record and
    /// the token's expiry. Any earlier token stops working as soon as this returns.
    ///
    /// A token that could not be delivered is withdrawn so the caller may retry
    /// right away instead of waiting out the cooldown.
    #[instrument(skip(self))]
    pub async fn issue_verification(&self, id: Uuid) -> AppResult<(User, OffsetDateTime)> {
        let issued = token::issue(OffsetDateTime::now_utc(), self.verification.token_ttl())?;
        let user = self
            .store
            .issue_token(id, &issued, self.verification.resend_cooldown())
            .await?;

        if let Err(e) = self
            .mailer
            .send_verification(&user, &issued.token, issued.expires_at)
            .await
        {
            warn!(user_id = %user.id, error = %e, "verification delivery failed");
            if let Err(withdraw) = self
                .store
                .withdraw_token(id, &issued.token, OffsetDateTime::now_utc())
                .await
            {
                warn!(user_id = %user.id, error = %withdraw, "undelivered token not withdrawn");
            }
            return Err(AppError::Mailer(e.to_string()));
        }

        info!(user_id = %user.id, expires_at = %issued.expires_at, "verification issued");
        Ok((user, issued.expires_at))
    }

    #[instrument(skip(self, presented))]
    pub async fn confirm_verification(&self, id: Uuid, presented: &str) -> AppResult<User> {
        let presented = validation::validate_token(presented)?;
        let user = self
            .store
            .confirm_token(id, presented, OffsetDateTime::now_utc())
            .await?;
        info!(user_id = %user.id, "user verified");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: Uuid) -> AppResult<User> {
        let user = self.store.soft_delete(id, OffsetDateTime::now_utc()).await?;
        info!(user_id = %user.id, "user soft-deleted");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> AppResult<User> {
        let user = self.store.restore(id, OffsetDateTime::now_utc()).await?;
        info!(user_id = %user.id, "user restored");
        Ok(user)
    }
}
