use std::path::Path;

use crate::error::ConfigError;
use crate::setting::Setting;

/// CFG files cap out at this many lines; anything past it is ignored.
const MAX_LINES: usize = 50;
/// Matches the reference reader's fixed settings table size.
const MAX_SETTINGS: usize = 256;
/// A line is split on `=` at most this many times before the rest is discarded.
const NUM_SPLITS: usize = 16;

/// Splits `s` on `token`, dropping empty runs (consecutive delimiters collapse,
/// same as `strtok`) and trimming whitespace off each surviving piece.
fn split_trimmed(s: &str, token: char, max: usize) -> Vec<String> {
    s.split(token)
        .filter(|piece| !piece.is_empty())
        .take(max)
        .map(|piece| piece.trim().to_string())
        .collect()
}

fn process_line(line: &str, settings: &mut Vec<Setting>) {
    let splits = split_trimmed(line, '=', NUM_SPLITS);
    let Some(first) = splits.first() else {
        return;
    };
    if first == "testLine" && splits.len() >= 2 {
        // Debug-only probe line, never stored as a setting.
        return;
    }
    if first.starts_with('#') || first.starts_with('!') {
        return;
    }
    if splits.len() == 2 && settings.len() < MAX_SETTINGS {
        settings.push(Setting::new(&splits[0], &splits[1]));
    }
}

/// Parsed CFG settings, queryable by name as an int, a double, or a string.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    settings: Vec<Setting>,
}

impl Settings {
    /// Parses CFG text directly, without touching the filesystem.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut settings = Vec::new();
        for line in split_trimmed(text, '\n', MAX_LINES) {
            process_line(&line, &mut settings);
        }
        Self { settings }
    }

    /// Reads and parses the CFG file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file can't be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.settings.iter().any(|s| s.name == name)
    }

    #[must_use]
    pub fn get_int(&self, name: &str) -> i32 {
        self.settings.iter().find(|s| s.name == name).map_or(0, |s| s.value_int)
    }

    #[must_use]
    pub fn get_double(&self, name: &str) -> f64 {
        self.settings.iter().find(|s| s.name == name).map_or(0.0, |s| s.value_dbl)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.settings.iter().find(|s| s.name == name).map(|s| s.value_str.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_basic_setting() {
        let cfg = Settings::parse("tickRate=50\n");
        assert_eq!(cfg.get_int("tickRate"), 50);
        assert_eq!(cfg.get_str("tickRate"), Some("50"));
    }

    #[test]
    fn comments_are_skipped() {
        let cfg = Settings::parse("# this is a comment\n! so is this\ntickRate=50\n");
        assert_eq!(cfg.get_int("tickRate"), 50);
        assert!(!cfg.exists("# this is a comment"));
    }

    #[test]
    fn test_line_is_never_stored() {
        let cfg = Settings::parse("testLine=hello\n");
        assert!(!cfg.exists("testLine"));
    }

    #[test]
    fn lines_without_exactly_two_splits_are_dropped() {
        let cfg = Settings::parse("noEquals\na=b=c\n");
        assert!(!cfg.exists("noEquals"));
        assert!(!cfg.exists("a"));
    }

    #[test]
    fn missing_setting_reads_as_zero_and_none() {
        let cfg = Settings::parse("tickRate=50\n");
        assert_eq!(cfg.get_int("missing"), 0);
        assert_eq!(cfg.get_double("missing"), 0.0);
        assert_eq!(cfg.get_str("missing"), None);
        assert!(!cfg.exists("missing"));
    }

    #[test]
    fn first_match_wins_on_duplicate_names() {
        let cfg = Settings::parse("tickRate=50\ntickRate=100\n");
        assert_eq!(cfg.get_int("tickRate"), 50);
    }

    #[test]
    fn whitespace_around_name_and_value_is_trimmed() {
        let cfg = Settings::parse("  tickRate  =  50  \n");
        assert_eq!(cfg.get_int("tickRate"), 50);
        assert_eq!(cfg.get_str("tickRate"), Some("50"));
    }

    #[test]
    fn double_values_parse_alongside_int_and_str() {
        let cfg = Settings::parse("clockSpeed=3.5469\n");
        assert!((cfg.get_double("clockSpeed") - 3.5469).abs() < f64::EPSILON);
        assert_eq!(cfg.get_int("clockSpeed"), 3);
        assert_eq!(cfg.get_str("clockSpeed"), Some("3.5469"));
    }
}
