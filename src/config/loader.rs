//! Rule-file discovery and parsing
//!
//! Rule files are TOML documents named `<rule>.rule`, discovered by a
//! non-recursive directory scan. Each file becomes one [`RuleConfig`] named
//! after its file stem.

use std::fs;
use std::path::Path;

use tracing::info;

use super::RuleConfig;
use crate::error::ConfigError;

/// File suffix that marks a rule file, compared case-insensitively.
const RULE_SUFFIX: &str = ".rule";

/// Load every `*.rule` file in `dir`, sorted by file name for deterministic
/// rule ordering.
///
/// # Errors
///
/// Returns [`ConfigError`] if the directory cannot be read or any rule file
/// fails to load.
pub fn load_rule_dir(dir: impl AsRef<Path>) -> Result<Vec<RuleConfig>, ConfigError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name
            .to_string_lossy()
            .to_ascii_lowercase()
            .ends_with(RULE_SUFFIX)
        {
            paths.push(entry.path());
        }
    }
    paths.sort();

    paths.iter().map(|p| load_rule_file(p)).collect()
}

/// Load a single rule file.
///
/// The rule is named after the file stem; parsed time windows are echoed to
/// the log in their canonical form so operators can verify what was read.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read,
/// [`ConfigError::ParseError`] if it is not valid TOML for a rule, or a
/// validation error for duplicate routing keys.
pub fn load_rule_file(path: impl AsRef<Path>) -> Result<RuleConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let mut rule: RuleConfig =
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    rule.name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    rule.validate()?;

    for window in &rule.strategy.forward_time {
        info!(rule = %rule.name, window = %window, "forwardtime");
    }
    for window in &rule.strategy.reject_time {
        info!(rule = %rule.name, window = %window, "rejecttime");
    }

    Ok(rule)
}
