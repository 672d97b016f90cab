//! Format and parameter checks that run before any storage access.

use crate::error::GatewayError;
use chrono::{DateTime, TimeDelta, Utc};
use core_types::sql::code_mask;
use core_types::ParamValue;
use std::collections::{BTreeSet, HashMap};

/// Every external API alias starts with this tag.
pub const ALIAS_PREFIX: &str = "a_";

/// Lifetime used for the `-1` ("no expiry") sentinel, roughly 250 years.
pub const UNLIMITED_EXPIRY_HOURS: i64 = 2_191_500;

pub fn verify_alias_format(alias: &str) -> Result<(), GatewayError> {
    if alias.starts_with(ALIAS_PREFIX) {
        Ok(())
    } else {
        Err(GatewayError::InvalidAliasFormat(alias.to_string()))
    }
}

/// Turns a caller-supplied lifetime in hours into an absolute expiration date.
pub fn expiration_from_offset(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, GatewayError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GatewayError::InvalidExpiration("can not be blank".into()));
    }

    let hours: i64 = raw.parse().map_err(|_| {
        GatewayError::InvalidExpiration(format!("'{}' is not a whole number of hours", raw))
    })?;

    let hours = match hours {
        -1 => UNLIMITED_EXPIRY_HOURS,
        h if h > 0 => h,
        _ => {
            return Err(GatewayError::InvalidExpiration(
                "expiration date can't be earlier than the current time".into(),
            ));
        }
    };

    TimeDelta::try_hours(hours)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| GatewayError::InvalidExpiration(format!("{} hours is out of range", hours)))
}

/// Counts the distinct bind placeholders in a query.
///
/// Understands `?`, `$N` and `:name`. Quoted literals and identifiers,
/// comments and PostgreSQL `::type` casts are skipped.
pub fn count_placeholders(syntax: &str) -> usize {
    let chars = code_mask(syntax);
    let code_run = |from: usize, accept: fn(char) -> bool| -> String {
        chars[from..]
            .iter()
            .take_while(|(c, is_code)| *is_code && accept(*c))
            .map(|(c, _)| *c)
            .collect()
    };

    let mut positional = 0;
    let mut numbered = BTreeSet::new();
    let mut named = BTreeSet::new();
    let mut i = 0;

    while i < chars.len() {
        let (ch, is_code) = chars[i];
        i += 1;
        if !is_code {
            continue;
        }

        match ch {
            '?' => positional += 1,
            '$' => {
                let digits = code_run(i, |c| c.is_ascii_digit());
                if !digits.is_empty() {
                    i += digits.len();
                    numbered.insert(digits);
                }
            }
            ':' if chars.get(i) == Some(&(':', true)) => i += 1,
            ':' => {
                let name = code_run(i, |c| c.is_ascii_alphanumeric() || c == '_');
                if name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                    i += name.len();
                    named.insert(name);
                }
            }
            _ => {}
        }
    }

    positional + numbered.len() + named.len()
}

/// Fails unless the query declares exactly one placeholder per parameter key.
pub fn verify_placeholder_count(syntax: &str, keys: &[String]) -> Result<(), GatewayError> {
    let expected = count_placeholders(syntax);
    if expected == keys.len() {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "query declares {} placeholder(s) but {} parameter key(s) were given",
            expected,
            keys.len()
        )))
    }
}

/// Pulls the value of every required key out of the request, in key order.
///
/// A key that is missing or empty fails the whole request.
pub fn collect_parameters(
    keys: &[String],
    supplied: &HashMap<String, String>,
) -> Result<Vec<ParamValue>, GatewayError> {
    keys.iter()
        .map(|key| match supplied.get(key) {
            Some(value) if !value.is_empty() => Ok(ParamValue::parse(value)),
            _ => Err(GatewayError::Validation(format!("missing value for '{}'", key))),
        })
        .collect()
}

/// Compares supplied parameters against the required keys by count only.
pub fn validate_parameters<T>(supplied: &[T], required: &[String]) -> Result<(), GatewayError> {
    if supplied.len() == required.len() {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "expected {} parameter(s), got {}",
            required.len(),
            supplied.len()
        )))
    }
}
