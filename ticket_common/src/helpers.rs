use std::{env, fmt::Display, str::FromStr};

use log::*;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads `key` from the environment and parses it. A missing variable silently yields `default`; a value that does
/// not parse is logged and also yields `default`.
pub fn parse_env_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
