//! Field rules for the `users` table, kept free of any store so they can be
//! checked in isolation.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    error::{AppError, AppResult},
    users::{
        dto::{CreateUserRequest, UpdateUserRequest},
        model::{NewUser, PreferredLanguage, ProfilePatch},
    },
};

pub const NAME_MAX: usize = 255;
pub const NICKNAME_MAX: usize = 255;
pub const GOOGLE_ID_MAX: usize = 255;
pub const EMAIL_MAX: usize = 255;
pub const PHONE_MAX: usize = 20;
pub const TOKEN_MAX: usize = 255;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails compare case-insensitively; this is the single normalization point.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_len(field: &'static str, value: &str, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::validation(
            field,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

fn required(field: &'static str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    check_len(field, value, max)?;
    Ok(value.to_string())
}

/// Trims, treats blank as absent, enforces the length limit.
fn optional(field: &'static str, value: Option<&str>, max: usize) -> AppResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            check_len(field, v, max)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

pub fn validate_email(email: &str) -> AppResult<String> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::validation("email", "must not be empty"));
    }
    check_len("email", &email, EMAIL_MAX)?;
    if !is_valid_email(&email) {
        return Err(AppError::validation("email", "is not a valid address"));
    }
    Ok(email)
}

pub fn validate_phone(phone: Option<&str>) -> AppResult<Option<String>> {
    let phone = optional("phone", phone, PHONE_MAX)?;
    if let Some(p) = &phone {
        let ok = p
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'));
        if !ok {
            return Err(AppError::validation("phone", "contains unsupported characters"));
        }
    }
    Ok(phone)
}

pub fn validate_google_id(google_id: &str) -> AppResult<String> {
    required("google_id", google_id, GOOGLE_ID_MAX)
}

pub fn validate_language(lang: Option<&str>) -> AppResult<PreferredLanguage> {
    match lang {
        Some(l) => l.parse(),
        None => Ok(PreferredLanguage::default()),
    }
}

pub fn validate_token(token: &str) -> AppResult<&str> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::validation("token", "must not be empty"));
    }
    check_len("token", token, TOKEN_MAX)?;
    Ok(token)
}

pub fn validate_new_user(req: &CreateUserRequest) -> AppResult<NewUser> {
    Ok(NewUser {
        name: optional("name", req.name.as_deref(), NAME_MAX)?,
        nickname: required("nickname", &req.nickname, NICKNAME_MAX)?,
        email: validate_email(&req.email)?,
        phone: validate_phone(req.phone.as_deref())?,
        google_id: optional("google_id", req.google_id.as_deref(), GOOGLE_ID_MAX)?,
        preferred_language: validate_language(req.preferred_language.as_deref())?,
    })
}

pub fn validate_profile_patch(req: &UpdateUserRequest) -> AppResult<ProfilePatch> {
    let patch = ProfilePatch {
        name: req
            .name
            .as_deref()
            .map(|n| optional("name", Some(n), NAME_MAX))
            .transpose()?,
        nickname: req
            .nickname
            .as_deref()
            .map(|n| required("nickname", n, NICKNAME_MAX))
            .transpose()?,
        phone: req
            .phone
            .as_deref()
            .map(|p| validate_phone(Some(p)))
            .transpose()?,
        preferred_language: req
            .preferred_language
            .as_deref()
            .map(str::parse::<PreferredLanguage>)
            .transpose()?,
    };
    if patch.is_empty() {
        return Err(AppError::validation("body", "no fields to update"));
    }
    Ok(patch)
}
