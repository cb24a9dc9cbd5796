use crate::loader::error::ConfigLoadError;

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| parse_bool(&raw))
}

/// Non-empty, trimmed value of an environment variable.
pub fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse a human duration such as `30m`, `2h` or `90days`.
pub fn parse_duration(
    field: &str,
    raw: &str,
) -> Result<chrono::Duration, ConfigLoadError> {
    let parsed = humantime::parse_duration(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidDuration {
            field: field.to_string(),
            value: raw.to_string(),
            source,
        }
    })?;
    chrono::Duration::from_std(parsed).map_err(|_| {
        ConfigLoadError::DurationOutOfRange {
            field: field.to_string(),
            value: raw.to_string(),
        }
    })
}
