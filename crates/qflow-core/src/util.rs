//! Utility functions for QFlow
//!
//! Provides bounded rendering of raw values for log lines and environment loading.

use std::path::PathBuf;

/// Longest rendering of a raw value that goes into a single log line
pub const MAX_LOGGED_VALUE_CHARS: usize = 200;

/// Safely truncate a string at character boundaries (not byte boundaries).
///
/// # Example
/// ```
/// use qflow_core::util::safe_truncate;
///
/// assert_eq!(safe_truncate("Hello, world!", 5), "Hello");
/// ```
#[inline]
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Render a raw simulation value for diagnostics, truncated with an ellipsis.
///
/// Observations handed back by a misbehaving endpoint can be arbitrarily
/// large; log lines only carry the first [`MAX_LOGGED_VALUE_CHARS`] characters.
///
/// # Example
/// ```
/// use qflow_core::util::describe_raw;
///
/// assert_eq!(describe_raw(&serde_json::json!([1.0, 2.0])), "[1.0,2.0]");
/// assert_eq!(describe_raw(&serde_json::Value::Null), "null");
/// ```
pub fn describe_raw(value: &serde_json::Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= MAX_LOGGED_VALUE_CHARS {
        rendered
    } else {
        format!("{}...", safe_truncate(&rendered, MAX_LOGGED_VALUE_CHARS))
    }
}

/// Places a `qflow.env` file is looked for, most specific first
pub fn env_file_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("qflow.env")];
    for dir in [dirs::config_dir(), dirs::home_dir().map(|h| h.join(".config"))]
        .into_iter()
        .flatten()
    {
        let path = dir.join("qflow").join("qflow.env");
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    }
    candidates
}

/// Export variables from the first `qflow.env` found in [`env_file_candidates`].
///
/// Runs before logging is set up, so the caller reports the returned path.
pub fn load_env_file() -> Option<PathBuf> {
    load_env_from(&env_file_candidates())
}

/// Export variables from the first existing file in `candidates`.
/// Variables already present in the environment win over the file.
pub fn load_env_from(candidates: &[PathBuf]) -> Option<PathBuf> {
    let path = candidates.iter().find(|p| p.is_file())?;
    let contents = std::fs::read_to_string(path).ok()?;
    for (key, value) in parse_env_file(&contents) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(key, value);
        }
    }
    Some(path.clone())
}

/// Parse `KEY=value` lines, skipping blanks and `#` comments.
///
/// An optional `export ` prefix is dropped and one matching pair of
/// surrounding quotes is removed from the value.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents.lines().filter_map(parse_env_line).collect()
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_unicode() {
        assert_eq!(safe_truncate("hello world", 5), "hello");
        assert_eq!(safe_truncate("hi", 5), "hi");
        assert_eq!(safe_truncate("Hello 世界", 7), "Hello 世");
    }

    #[test]
    fn test_describe_raw_truncates_long_values() {
        let long = serde_json::Value::String("x".repeat(500));
        let rendered = describe_raw(&long);

        assert!(rendered.ends_with("..."));
        assert_eq!(rendered.chars().count(), MAX_LOGGED_VALUE_CHARS + 3);
    }

    #[test]
    fn test_describe_raw_keeps_short_values() {
        let value = serde_json::json!({"obs": "garbage"});
        assert_eq!(describe_raw(&value), r#"{"obs":"garbage"}"#);
    }

    #[test]
    fn test_parse_env_file() {
        let contents = r#"
            # This is a comment
            QFLOW__LEARNING__ALPHA=0.5
            export QFLOW__SIMULATION__ENDPOINT="tcp://sim:5555"
            RUST_LOG='qflow=debug'
            =orphan
            not a pair
        "#;

        assert_eq!(
            parse_env_file(contents),
            vec![
                ("QFLOW__LEARNING__ALPHA".to_string(), "0.5".to_string()),
                ("QFLOW__SIMULATION__ENDPOINT".to_string(), "tcp://sim:5555".to_string()),
                ("RUST_LOG".to_string(), "qflow=debug".to_string()),
            ]
        );
    }

    #[test]
    fn test_unmatched_quote_is_kept() {
        let parsed = parse_env_file(r#"TEST_QFLOW_NOTE="half"#);
        assert_eq!(parsed[0].1, r#""half"#);
    }

    #[test]
    fn test_load_env_from_first_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.env");
        let present = dir.path().join("qflow.env");
        std::fs::write(
            &present,
            "TEST_QFLOW_LOADED=from-file\nTEST_QFLOW_EXISTING=overwritten\n",
        )
        .unwrap();
        std::env::remove_var("TEST_QFLOW_LOADED");
        std::env::set_var("TEST_QFLOW_EXISTING", "original");

        let loaded = load_env_from(&[missing, present.clone()]);

        assert_eq!(loaded, Some(present));
        assert_eq!(std::env::var("TEST_QFLOW_LOADED").unwrap(), "from-file");
        assert_eq!(std::env::var("TEST_QFLOW_EXISTING").unwrap(), "original");
    }

    #[test]
    fn test_load_env_from_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_env_from(&[dir.path().join("absent.env")]), None);
    }

    #[test]
    fn test_env_candidates_start_local() {
        let candidates = env_file_candidates();
        assert_eq!(candidates[0], PathBuf::from("qflow.env"));
        assert!(candidates[1..].iter().all(|p| p.ends_with("qflow/qflow.env")));
    }
}
