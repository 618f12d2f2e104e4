use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    users::model::{IssuedToken, ProfilePatch, User},
};

const USER_COLUMNS: &str = "id, created_at, updated_at, deleted_at, name, nickname, google_id, \
     email, verified, phone, preferred_language, verification_token, \
     verification_token_expires, verification_token_issued_at";

/// Persistence seam for accounts. Unless stated otherwise, soft-deleted rows
/// behave as if absent.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the record; an active row holding the same email is a constraint violation.
    async fn insert(&self, user: &User) -> AppResult<User>;

    async fn find_by_id(&self, id: Uuid, include_deleted: bool) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_google_id(&self, google_id: &str) -> AppResult<Option<User>>;

    async fn list_active(&self, limit: i64, offset: i64) -> AppResult<Vec<User>>;

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch, now: OffsetDateTime) -> AppResult<User>;

    async fn link_google_id(&self, id: Uuid, google_id: &str, now: OffsetDateTime) -> AppResult<User>;

    /// Replaces any outstanding token, subject to the reissue cooldown.
    async fn issue_token(&self, id: Uuid, issued: &IssuedToken, cooldown: Duration) -> AppResult<User>;

    /// Drops `token` if it is still the outstanding one, lifting the reissue cooldown.
    async fn withdraw_token(&self, id: Uuid, token: &str, now: OffsetDateTime) -> AppResult<User>;

    /// Compares `token` against the stored one at call time and consumes it on success.
    async fn confirm_token(&self, id: Uuid, token: &str, now: OffsetDateTime) -> AppResult<User>;

    async fn soft_delete(&self, id: Uuid, now: OffsetDateTime) -> AppResult<User>;

    /// Only applies to deleted rows; fails if the email was taken meanwhile.
    async fn restore(&self, id: Uuid, now: OffsetDateTime) -> AppResult<User>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Locks the row for the rest of the transaction.
    async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        include_deleted: bool,
    ) -> AppResult<User> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND ($2 OR deleted_at IS NULL) FOR UPDATE"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn write_back(tx: &mut Transaction<'_, Postgres>, user: &User) -> AppResult<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET updated_at = $2,
                   deleted_at = $3,
                   name = $4,
                   nickname = $5,
                   google_id = $6,
                   verified = $7,
                   phone = $8,
                   preferred_language = $9,
                   verification_token = $10,
                   verification_token_expires = $11,
                   verification_token_issued_at = $12
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let saved = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.updated_at)
            .bind(user.deleted_at)
            .bind(&user.name)
            .bind(&user.nickname)
            .bind(&user.google_id)
            .bind(user.verified)
            .bind(&user.phone)
            .bind(user.preferred_language)
            .bind(&user.verification_token)
            .bind(user.verification_token_expires)
            .bind(user.verification_token_issued_at)
            .fetch_one(&mut **tx)
            .await?;
        Ok(saved)
    }

    /// Load, mutate and save one row inside a single transaction.
    /// An error from `change` rolls back and leaves the row untouched.
    async fn modify<F>(&self, id: Uuid, include_deleted: bool, change: F) -> AppResult<User>
    where
        F: FnOnce(&mut User) -> AppResult<()> + Send,
    {
        let mut tx = self.db.begin().await?;
        let mut user = Self::lock_row(&mut tx, id, include_deleted).await?;
        change(&mut user)?;
        let saved = Self::write_back(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(saved)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, created_at, updated_at, name, nickname, google_id,
                               email, verified, phone, preferred_language)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        );
        let saved = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.created_at)
            .bind(user.updated_at)
            .bind(&user.name)
            .bind(&user.nickname)
            .bind(&user.google_id)
            .bind(&user.email)
            .bind(user.verified)
            .bind(&user.phone)
            .bind(user.preferred_language)
            .fetch_one(&self.db)
            .await?;
        debug!(user_id = %saved.id, "user row inserted");
        Ok(saved)
    }

    async fn find_by_id(&self, id: Uuid, include_deleted: bool) -> AppResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_google_id(&self, google_id: &str) -> AppResult<Option<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE google_id = $1 AND deleted_at IS NULL
             ORDER BY created_at ASC
             LIMIT 1
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(google_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn list_active(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE deleted_at IS NULL
             ORDER BY created_at DESC, id
             LIMIT $1 OFFSET $2
            "#
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn update_profile(&self, id: Uuid, patch: ProfilePatch, now: OffsetDateTime) -> AppResult<User> {
        self.modify(id, false, move |user| {
            user.apply_profile(patch, now);
            Ok(())
        })
        .await
    }

    async fn link_google_id(&self, id: Uuid, google_id: &str, now: OffsetDateTime) -> AppResult<User> {
        let google_id = google_id.to_string();
        self.modify(id, false, move |user| {
            user.google_id = Some(google_id);
            user.updated_at = now;
            Ok(())
        })
        .await
    }

    async fn issue_token(&self, id: Uuid, issued: &IssuedToken, cooldown: Duration) -> AppResult<User> {
        self.modify(id, false, |user| user.issue_verification(issued, cooldown))
            .await
    }

    async fn withdraw_token(&self, id: Uuid, token: &str, now: OffsetDateTime) -> AppResult<User> {
        self.modify(id, true, |user| {
            user.withdraw_verification(token, now);
            Ok(())
        })
        .await
    }

    async fn confirm_token(&self, id: Uuid, token: &str, now: OffsetDateTime) -> AppResult<User> {
        self.modify(id, false, |user| user.confirm_verification(token, now))
            .await
    }

    async fn soft_delete(&self, id: Uuid, now: OffsetDateTime) -> AppResult<User> {
        self.modify(id, false, |user| user.soft_delete(now)).await
    }

    async fn restore(&self, id: Uuid, now: OffsetDateTime) -> AppResult<User> {
        // the partial unique index rejects the write if the email is in use again
        self.modify(id, true, |user| user.restore(now)).await
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;

    use tokio::sync::RwLock;

    use super::*;

    /// In-process store with the same visibility and uniqueness rules as Postgres.
    #[derive(Default)]
    pub struct InMemoryUserStore {
        rows: RwLock<HashMap<Uuid, User>>,
    }

    fn email_taken(rows: &HashMap<Uuid, User>, email: &str, except: Uuid) -> bool {
        rows.values()
            .any(|u| u.id != except && !u.is_deleted() && u.email == email)
    }

    impl InMemoryUserStore {
        async fn modify<F>(&self, id: Uuid, include_deleted: bool, change: F) -> AppResult<User>
        where
            F: FnOnce(&mut User) -> AppResult<()>,
        {
            let mut rows = self.rows.write().await;
            let current = rows
                .get(&id)
                .filter(|u| include_deleted || !u.is_deleted())
                .ok_or(AppError::NotFound)?;
            let mut next = current.clone();
            change(&mut next)?;
            if !next.is_deleted() && email_taken(&rows, &next.email, id) {
                return Err(AppError::ConstraintViolation { field: "email" });
            }
            rows.insert(id, next.clone());
            Ok(next)
        }
    }

    #[async_trait]
    impl UserStore for InMemoryUserStore {
        async fn insert(&self, user: &User) -> AppResult<User> {
            let mut rows = self.rows.write().await;
            if email_taken(&rows, &user.email, user.id) {
                return Err(AppError::ConstraintViolation { field: "email" });
            }
            rows.insert(user.id, user.clone());
            Ok(user.clone())
        }

        async fn find_by_id(&self, id: Uuid, include_deleted: bool) -> AppResult<Option<User>> {
            let rows = self.rows.read().await;
            Ok(rows
                .get(&id)
                .filter(|u| include_deleted || !u.is_deleted())
                .cloned())
        }

        async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
            let rows = self.rows.read().await;
            Ok(rows
                .values()
                .find(|u| !u.is_deleted() && u.email == email)
                .cloned())
        }

        async fn find_by_google_id(&self, google_id: &str) -> AppResult<Option<User>> {
            let rows = self.rows.read().await;
            Ok(rows
                .values()
                .filter(|u| !u.is_deleted() && u.google_id.as_deref() == Some(google_id))
                .min_by_key(|u| u.created_at)
                .cloned())
        }

        async fn list_active(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
            let rows = self.rows.read().await;
            let mut active: Vec<User> = rows.values().filter(|u| !u.is_deleted()).cloned().collect();
            active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            Ok(active
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect())
        }

        async fn update_profile(&self, id: Uuid, patch: ProfilePatch, now: OffsetDateTime) -> AppResult<User> {
            self.modify(id, false, move |user| {
                user.apply_profile(patch, now);
                Ok(())
            })
            .await
        }

        async fn link_google_id(&self, id: Uuid, google_id: &str, now: OffsetDateTime) -> AppResult<User> {
            self.modify(id, false, |user| {
                user.google_id = Some(google_id.to_string());
                user.updated_at = now;
                Ok(())
            })
            .await
        }

        async fn issue_token(&self, id: Uuid, issued: &IssuedToken, cooldown: Duration) -> AppResult<User> {
            self.modify(id, false, |user| user.issue_verification(issued, cooldown))
                .await
        }

        async fn withdraw_token(&self, id: Uuid, token: &str, now: OffsetDateTime) -> AppResult<User> {
            self.modify(id, true, |user| {
                user.withdraw_verification(token, now);
                Ok(())
            })
            .await
        }

        async fn confirm_token(&self, id: Uuid, token: &str, now: OffsetDateTime) -> AppResult<User> {
            self.modify(id, false, |user| user.confirm_verification(token, now))
                .await
        }

        async fn soft_delete(&self, id: Uuid, now: OffsetDateTime) -> AppResult<User> {
            self.modify(id, false, |user| user.soft_delete(now)).await
        }

        async fn restore(&self, id: Uuid, now: OffsetDateTime) -> AppResult<User> {
            self.modify(id, true, |user| user.restore(now)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryUserStore;
    use super::*;
    use crate::users::model::tests::sample_new_user;

    #[tokio::test]
    async fn memory_store_enforces_active_email_uniqueness() {
        let store = InMemoryUserStore::default();
        let now = OffsetDateTime::now_utc();
        let first = User::new(sample_new_user("a@example.com"), now);
        store.insert(&first).await.unwrap();

        let dup = User::new(sample_new_user("a@example.com"), now);
        let err = store.insert(&dup).await.unwrap_err();
        assert!(matches!(err, AppError::ConstraintViolation { field: "email" }));

        store.soft_delete(first.id, now).await.unwrap();
        store.insert(&dup).await.unwrap();

        let err = store.restore(first.id, now).await.unwrap_err();
        assert!(matches!(err, AppError::ConstraintViolation { field: "email" }));
        let still_deleted = store.find_by_id(first.id, true).await.unwrap().unwrap();
        assert!(still_deleted.is_deleted());
    }

    #[tokio::test]
    async fn memory_store_hides_deleted_rows_by_default() {
        let store = InMemoryUserStore::default();
        let now = OffsetDateTime::now_utc();
        let user = User::new(sample_new_user("a@example.com"), now);
        store.insert(&user).await.unwrap();
        store.soft_delete(user.id, now).await.unwrap();

        assert!(store.find_by_id(user.id, false).await.unwrap().is_none());
        assert!(store.find_by_email("a@example.com").await.unwrap().is_none());
        assert!(store.list_active(10, 0).await.unwrap().is_empty());
        let err = store
            .issue_token(
                user.id,
                &crate::users::token::issue(now, Duration::hours(1)).unwrap(),
                Duration::ZERO,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn list_active_pages_newest_first() {
        let store = InMemoryUserStore::default();
        let base = OffsetDateTime::now_utc();
        for i in 0..5 {
            let user = User::new(
                sample_new_user(&format!("user{i}@example.com")),
                base + Duration::seconds(i),
            );
            store.insert(&user).await.unwrap();
        }
        let page = store.list_active(2, 1).await.unwrap();
        let emails: Vec<_> = page.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["user3@example.com", "user2@example.com"]);
    }
}
