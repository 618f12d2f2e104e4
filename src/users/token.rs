use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};

use crate::{
    error::{AppError, AppResult},
    users::model::IssuedToken,
};

pub const TOKEN_LEN: usize = 48;

/// Opaque single-use token drawn from the OS RNG.
pub fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn issue(now: OffsetDateTime, ttl: Duration) -> AppResult<IssuedToken> {
    let expires_at = now
        .checked_add(ttl)
        .ok_or(AppError::Internal("token expiry is out of range"))?;
    Ok(IssuedToken {
        token: generate_token(),
        issued_at: now,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::validation::TOKEN_MAX;

    #[test]
    fn tokens_are_alphanumeric_and_fit_the_column() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.len() <= TOKEN_MAX);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_is_issue_time_plus_ttl() {
        let now = OffsetDateTime::now_utc();
        let issued = issue(now, Duration::minutes(30)).unwrap();
        assert_eq!(issued.issued_at, now);
        assert_eq!(issued.expires_at - now, Duration::minutes(30));
    }

    #[test]
    fn unrepresentable_expiry_is_an_error() {
        let err = issue(OffsetDateTime::now_utc(), Duration::MAX).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
