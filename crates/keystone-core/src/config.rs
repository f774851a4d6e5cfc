use std::str::FromStr;

/// Read a required environment variable.
///
/// # Panics
///
/// Panics if the variable is missing. Call only at service startup.
pub fn required(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("missing required env var {key}"))
}

/// Read an optional environment variable, treating an empty value as unset.
pub fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or unparsable.
pub fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    optional(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
