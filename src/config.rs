use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub slow_query_ms: u64,
}

impl DatabaseConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    pub token_ttl_minutes: i64,
    pub resend_cooldown_secs: i64,
}

/// A token may live at most 30 days.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 30 * 24 * 60;
/// Reissue may be throttled for at most a day.
pub const MAX_RESEND_COOLDOWN_SECS: i64 = 24 * 60 * 60;

impl VerificationConfig {
    /// Rejects lifetimes that would expire on issue or overflow timestamp arithmetic.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_TOKEN_TTL_MINUTES).contains(&self.token_ttl_minutes),
            "VERIFICATION_TOKEN_TTL_MINUTES must be between 1 and {MAX_TOKEN_TTL_MINUTES}, got {}",
            self.token_ttl_minutes
        );
        anyhow::ensure!(
            (0..=MAX_RESEND_COOLDOWN_SECS).contains(&self.resend_cooldown_secs),
            "VERIFICATION_RESEND_COOLDOWN_SECS must be between 0 and {MAX_RESEND_COOLDOWN_SECS}, got {}",
            self.resend_cooldown_secs
        );
        Ok(())
    }

    pub fn token_ttl(&self) -> time::Duration {
        time::Duration::minutes(self.token_ttl_minutes)
    }

    pub fn resend_cooldown(&self) -> time::Duration {
        time::Duration::seconds(self.resend_cooldown_secs)
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            token_ttl_minutes: 60 * 24,
            resend_cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub verification: VerificationConfig,
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let url = lookup("DATABASE_URL")
            .or_else(|| lookup("SUPABASE_PGSQL"))
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL (or SUPABASE_PGSQL) must be set")?;

        let database = DatabaseConfig {
            url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 100),
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 10),
            max_lifetime_secs: parse_or(&lookup, "DB_MAX_LIFETIME_SECS", 60 * 60),
            idle_timeout_secs: parse_or(&lookup, "DB_IDLE_TIMEOUT_SECS", 30 * 60),
            acquire_timeout_secs: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 30),
            slow_query_ms: parse_or(&lookup, "DB_SLOW_QUERY_MS", 1000),
        };

        let defaults = VerificationConfig::default();
        let verification = VerificationConfig {
            token_ttl_minutes: parse_or(
                &lookup,
                "VERIFICATION_TOKEN_TTL_MINUTES",
                defaults.token_ttl_minutes,
            ),
            resend_cooldown_secs: parse_or(
                &lookup,
                "VERIFICATION_RESEND_COOLDOWN_SECS",
                defaults.resend_cooldown_secs,
            ),
        };
        verification
            .validate()
            .context("invalid verification settings")?;

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "APP_PORT", 8080),
            database,
            verification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_follow_pool_settings() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/app")]))
            .expect("config");
        assert_eq!(cfg.database.url, "postgres://localhost/app");
        assert_eq!(cfg.database.max_connections, 100);
        assert_eq!(cfg.database.min_connections, 10);
        assert_eq!(cfg.database.max_lifetime(), Duration::from_secs(3600));
        assert_eq!(cfg.database.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(cfg.database.slow_query_threshold(), Duration::from_secs(1));
        assert_eq!(cfg.verification.token_ttl(), time::Duration::hours(24));
        assert_eq!(cfg.verification.resend_cooldown(), time::Duration::seconds(60));
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn falls_back_to_supabase_variable() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("SUPABASE_PGSQL", "postgres://supabase/db")]))
            .expect("config");
        assert_eq!(cfg.database.url, "postgres://supabase/db");
    }

    #[test]
    fn missing_dsn_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn unparsable_numbers_use_defaults() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("DB_MAX_CONNECTIONS", "lots"),
            ("VERIFICATION_TOKEN_TTL_MINUTES", "15"),
            ("APP_PORT", "9000"),
        ]))
        .expect("config");
        assert_eq!(cfg.database.max_connections, 100);
        assert_eq!(cfg.verification.token_ttl_minutes, 15);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn out_of_range_verification_settings_are_rejected() {
        for (key, value) in [
            ("VERIFICATION_TOKEN_TTL_MINUTES", "5000000000000"),
            ("VERIFICATION_TOKEN_TTL_MINUTES", "0"),
            ("VERIFICATION_TOKEN_TTL_MINUTES", "-5"),
            ("VERIFICATION_RESEND_COOLDOWN_SECS", "-1"),
            ("VERIFICATION_RESEND_COOLDOWN_SECS", "9223372036854775807"),
        ] {
            let err = AppConfig::from_lookup(lookup_from(&[
                ("DATABASE_URL", "postgres://localhost/app"),
                (key, value),
            ]))
            .unwrap_err();
            assert!(format!("{err:#}").contains(key), "{key}={value}: {err:#}");
        }

        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("VERIFICATION_TOKEN_TTL_MINUTES", "43200"),
            ("VERIFICATION_RESEND_COOLDOWN_SECS", "0"),
        ]))
        .expect("bounds are inclusive");
        assert_eq!(cfg.verification.token_ttl(), time::Duration::days(30));
    }
}
