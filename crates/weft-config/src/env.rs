use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Expand `{{ env.VAR }}` placeholders in raw config text
///
/// A `| default("...")` suffix supplies the value used when the variable is
/// unset. Comment lines are copied through untouched so commented-out
/// secrets never have to exist in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }

        let mut failure = None;
        let expanded = PLACEHOLDER.replace_all(line, |caps: &Captures<'_>| match resolve(caps) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        lines.push(expanded.into_owned());
    }

    Ok(lines.join("\n"))
}

fn resolve(caps: &Captures<'_>) -> Result<String, String> {
    let key = &caps[1];
    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var_name), caps.get(2)) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.as_str().to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var_name}`")),
    }
}
