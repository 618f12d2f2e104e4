use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    config::{AppConfig, VerificationConfig},
    mailer::{LogMailer, VerificationMailer},
    users::{
        repo::{PgUserStore, UserStore},
        services::UserService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
}

impl AppState {
    /// Wires the Postgres-backed store; the pool is owned by the caller.
    pub fn new(db: PgPool, config: &AppConfig) -> Self {
        let mailer = Arc::new(LogMailer) as Arc<dyn VerificationMailer>;
        Self::from_parts(Arc::new(PgUserStore::new(db)), mailer, config.verification.clone())
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn VerificationMailer>,
        verification: VerificationConfig,
    ) -> Self {
        Self {
            users: UserService::new(store, mailer, verification),
        }
    }

    #[cfg(test)]
    pub fn fake(mailer: Arc<crate::mailer::fake::RecordingMailer>) -> Self {
        use crate::users::repo::memory::InMemoryUserStore;

        Self::from_parts(
            Arc::new(InMemoryUserStore::default()),
            mailer,
            VerificationConfig::default(),
        )
    }
}
