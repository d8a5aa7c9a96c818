//! Profile form validation.
//!
//! Each field validator sanitizes its input and enforces length and format
//! rules. [`validate_profile_update`] runs them in a fixed order and reports
//! the first failure only.

use crate::domain::error::{ErrorCode, FieldError};
use crate::domain::sanitize::{sanitize_for_storage, strip_html};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ROOM_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z-]*$").expect("room number pattern is valid"));
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

pub const NAME_MAX_LEN: usize = 100;
pub const NICKNAME_MAX_LEN: usize = 50;
pub const ROOM_NUMBER_MAX_LEN: usize = 10;
pub const BIO_MAX_LEN: usize = 500;
pub const HOMETOWN_MAX_LEN: usize = 100;
pub const LONG_TEXT_MAX_LEN: usize = 500;
pub const INTERESTS_MAX_COUNT: usize = 20;
pub const LANGUAGES_MAX_COUNT: usize = 10;
pub const LIST_ITEM_MAX_LEN: usize = 50;

pub const MBTI_TYPES: [&str; 16] = [
    "INTJ", "INTP", "ENTJ", "ENTP", "INFJ", "INFP", "ENFJ", "ENFP", "ISTJ", "ISFJ", "ESTJ", "ESFJ",
    "ISTP", "ISFP", "ESTP", "ESFP",
];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn clean(s: &str) -> String {
    sanitize_for_storage(&strip_html(s))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

/// Display name: required, at most 100 characters.
pub fn validate_name(raw: &str) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new("name", ErrorCode::RequiredField));
    }
    if char_len(trimmed) > NAME_MAX_LEN {
        return Err(FieldError::new("name", ErrorCode::InvalidInput));
    }
    Ok(clean(trimmed))
}

/// Optional nickname, at most 50 characters.
pub fn validate_nickname(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    validate_optional_text("nickname", raw, NICKNAME_MAX_LEN)
}

/// Optional room number: letters, digits and hyphens, at most 10 characters.
pub fn validate_room_number(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    if char_len(value) > ROOM_NUMBER_MAX_LEN {
        return Err(FieldError::new("room_number", ErrorCode::InvalidInput));
    }
    if !ROOM_NUMBER.is_match(value) {
        return Err(FieldError::new("room_number", ErrorCode::InvalidFormat));
    }
    Ok(Some(value.to_string()))
}

/// Optional bio, at most 500 characters before sanitizing.
pub fn validate_bio(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    validate_optional_text("bio", raw, BIO_MAX_LEN)
}

/// Optional hometown, at most 100 characters.
pub fn validate_hometown(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    validate_optional_text("hometown", raw, HOMETOWN_MAX_LEN)
}

/// Optional free-text answer, at most 500 characters.
pub fn validate_long_text(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<String>, FieldError> {
    validate_optional_text(field, raw, LONG_TEXT_MAX_LEN)
}

fn validate_optional_text(
    field: &'static str,
    raw: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, FieldError> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    if char_len(value) > max_len {
        return Err(FieldError::new(field, ErrorCode::InvalidInput));
    }
    let cleaned = clean(value);
    Ok(if cleaned.is_empty() { None } else { Some(cleaned) })
}

/// Up to 20 interests. Items are sanitized; empty or over-long ones are dropped.
pub fn validate_interests(items: &[String]) -> Result<Vec<String>, FieldError> {
    validate_list("interests", items, INTERESTS_MAX_COUNT)
}

/// Up to 10 spoken languages, cleaned like interests.
pub fn validate_languages(items: &[String]) -> Result<Vec<String>, FieldError> {
    validate_list("languages", items, LANGUAGES_MAX_COUNT)
}

fn validate_list(
    field: &'static str,
    items: &[String],
    max_count: usize,
) -> Result<Vec<String>, FieldError> {
    if items.len() > max_count {
        return Err(FieldError::new(field, ErrorCode::InvalidInput));
    }
    Ok(items
        .iter()
        .map(|item| clean(item.trim()))
        .filter(|item| !item.is_empty() && char_len(item) <= LIST_ITEM_MAX_LEN)
        .collect())
}

/// Optional `YYYY-MM-DD` date that must exist on the calendar.
pub fn validate_move_in_date(raw: Option<&str>) -> Result<Option<NaiveDate>, FieldError> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    if !ISO_DATE.is_match(value) {
        return Err(FieldError::new("move_in_date", ErrorCode::InvalidFormat));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| FieldError::new("move_in_date", ErrorCode::InvalidInput))
}

/// Optional MBTI type, one of the 16 upper-case codes.
pub fn validate_mbti(raw: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(value) = non_empty(raw) else {
        return Ok(None);
    };
    if MBTI_TYPES.contains(&value) {
        Ok(Some(value.to_string()))
    } else {
        Err(FieldError::new("mbti", ErrorCode::InvalidInput))
    }
}

/// Raw profile form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdateInput {
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub room_number: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub hometown: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub mbti: Option<String>,
    #[serde(default)]
    pub move_in_date: Option<String>,
}

/// Profile fields after validation and sanitizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub nickname: Option<String>,
    pub room_number: Option<String>,
    pub bio: Option<String>,
    pub hometown: Option<String>,
    pub interests: Vec<String>,
    pub languages: Vec<String>,
    pub mbti: Option<String>,
    pub move_in_date: Option<NaiveDate>,
}

/// Validate a full profile form, stopping at the first invalid field.
pub fn validate_profile_update(input: &ProfileUpdateInput) -> Result<ProfileUpdate, FieldError> {
    Ok(ProfileUpdate {
        name: validate_name(&input.name)?,
        nickname: validate_nickname(input.nickname.as_deref())?,
        room_number: validate_room_number(input.room_number.as_deref())?,
        bio: validate_bio(input.bio.as_deref())?,
        hometown: validate_hometown(input.hometown.as_deref())?,
        interests: validate_interests(&input.interests)?,
        languages: validate_languages(&input.languages)?,
        mbti: validate_mbti(input.mbti.as_deref())?,
        move_in_date: validate_move_in_date(input.move_in_date.as_deref())?,
    })
}
