use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Substitute `${VAR}` and `${VAR:-fallback}` placeholders from the environment
///
/// Comment lines are left untouched so that documented-but-disabled
/// settings do not require their variables to be set.
pub fn expand_env(input: &str) -> Result<String, String> {
    fn re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        // `${NAME}` or `${NAME:-fallback}`
        RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("must be valid regex"))
    }

    let mut output = String::with_capacity(input.len());
    let mut missing = None;

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let expanded = re().replace_all(line, |captures: &Captures<'_>| {
            let name = &captures[1];
            match (std::env::var(name), captures.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(fallback)) => fallback.as_str().to_owned(),
                (Err(_), None) => {
                    missing.get_or_insert_with(|| name.to_owned());
                    String::new()
                }
            }
        });
        output.push_str(&expanded);
    }

    if let Some(name) = missing {
        return Err(format!("environment variable not set: `{name}`"));
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}
