use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::info;

use crate::users::model::User;

/// Out-of-band channel that delivers verification tokens to their owner.
#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(
        &self,
        user: &User,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;
}

/// Records the delivery request in the log instead of sending mail.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl VerificationMailer for LogMailer {
    async fn send_verification(
        &self,
        user: &User,
        _token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        info!(
            user_id = %user.id,
            email = %user.email,
            language = user.preferred_language.as_str(),
            %expires_at,
            "verification token ready for delivery"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use super::*;
    use uuid::Uuid;

    /// Captures sent tokens so tests can complete the flow.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<(Uuid, String)>>,
        fail: AtomicBool,
    }

    impl RecordingMailer {
        pub fn failing() -> Self {
            Self {
                fail: AtomicBool::new(true),
                ..Default::default()
            }
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn last_token_for(&self, user_id: Uuid) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(id, _)| *id == user_id)
                .map(|(_, t)| t.clone())
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VerificationMailer for RecordingMailer {
        async fn send_verification(
            &self,
            user: &User,
            token: &str,
            _expires_at: OffsetDateTime,
        ) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("smtp relay unavailable");
            }
            self.sent.lock().unwrap().push((user.id, token.to_string()));
            Ok(())
        }
    }
}
