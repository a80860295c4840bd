//! `${VAR}` and `${VAR:-default}` expansion in configuration strings.

use crate::ConfigError;

/// Variable that is referenced without a default and not set.
struct Unset(String);

/// Expand braced environment references in `value`.
///
/// Text without `${` is returned as is, so a bare `$` in a renderer argument
/// survives untouched. `field` names the setting in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    let lookup = |name: &str| match std::env::var(name) {
        Ok(found) => Ok(Some(found)),
        Err(_) => Err(Unset(name.to_owned())),
    };
    shellexpand::env_with_context(value, lookup)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} is not set", e.cause.0),
        })
}

/// Expand every element of `values`.
pub(crate) fn expand_all(values: &[String], field: &str) -> Result<Vec<String>, ConfigError> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| expand_env(value, &format!("{field}[{i}]")))
        .collect()
}
