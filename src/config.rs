//! Runtime options.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Environment variable that switches debug mode on (`1`, `true`, `yes`, `on`).
pub const DEBUG_ENV: &str = "RILL_DEBUG";

/// Engine-wide switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Keep directive attributes on elements and rethrow render errors out of
    /// the scheduler turn instead of reporting them as `render:error` events.
    #[serde(default)]
    pub debug: bool,
    /// Warn when a `*for` loop has no `by` attribute and falls back to
    /// positional keys.
    #[serde(default = "default_warn_default_track_by")]
    pub warn_default_track_by: bool,
}

const fn default_warn_default_track_by() -> bool {
    true
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            warn_default_track_by: default_warn_default_track_by(),
        }
    }
}

impl Options {
    /// Production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with debug mode enabled.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }

    /// Defaults, with `debug` taken from [`DEBUG_ENV`] when set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(flag) = std::env::var(DEBUG_ENV) {
            options.debug = parse_flag(&flag);
        }
        options
    }

    /// Parses options from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or mistyped fields.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(Error::Config)
    }
}

fn parse_flag(flag: &str) -> bool {
    matches!(
        flag.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let options = Options::from_json("{}").expect("parse");
        assert_eq!(options, Options::default());
        assert!(options.warn_default_track_by);

        let options = Options::from_json(r#"{"debug": true, "warn_default_track_by": false}"#)
            .expect("parse");
        assert!(options.debug);
        assert!(!options.warn_default_track_by);
    }

    #[test]
    fn mistyped_fields_are_rejected() {
        assert!(matches!(
            Options::from_json(r#"{"debug": "sometimes"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
