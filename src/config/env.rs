use std::env;
use std::str::FromStr;

/// Read an environment variable, treating blank values as unset.
pub(crate) fn env_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read and parse an environment variable.
pub(crate) fn parse_env<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} ({raw}): {e}")),
        None => Ok(None),
    }
}

/// Like [`env_var`] but keeps an explicitly empty value, so a variable can
/// be used to switch a feature off.
pub(crate) fn env_var_allow_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|value| value.trim().to_string())
}
