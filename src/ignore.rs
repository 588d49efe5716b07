//! Ignore pattern for relative paths
//!
//! User-supplied fragments are combined into a single alternation anchored
//! at both ends, so a fragment has to match a whole relative path such as
//! `static/vendor` or `assets/.*\.map`, not just part of one.
//!
//! Paths are matched on their raw bytes, so names that are not valid UTF-8
//! are matched as they are stored on disk.

use crate::error::ConfigError;
use regex::bytes::Regex;
use std::path::Path;

/// Compiled ignore matcher
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    regex: Option<Regex>,
}

impl IgnorePattern {
    /// Compile fragments into one anchored alternation
    ///
    /// No fragments means nothing is ignored.
    pub fn new<S: AsRef<str>>(fragments: &[S]) -> Result<Self, ConfigError> {
        if fragments.is_empty() {
            return Ok(Self::none());
        }

        // Validate one by one so the error names the offending fragment
        for fragment in fragments {
            let fragment = fragment.as_ref();
            Regex::new(fragment).map_err(|e| ConfigError::InvalidIgnorePattern {
                pattern: fragment.to_string(),
                reason: e.to_string(),
            })?;
        }

        let joined = fragments
            .iter()
            .map(|f| f.as_ref())
            .collect::<Vec<_>>()
            .join("|");
        let anchored = format!("^(?:{})$", joined);

        let regex = Regex::new(&anchored).map_err(|e| ConfigError::InvalidIgnorePattern {
            pattern: joined,
            reason: e.to_string(),
        })?;

        Ok(Self { regex: Some(regex) })
    }

    /// A pattern that ignores nothing
    pub fn none() -> Self {
        Self { regex: None }
    }

    /// Check whether a path relative to the tree root is ignored
    pub fn is_match(&self, relative: &Path) -> bool {
        match &self.regex {
            Some(re) => re.is_match(relative.as_os_str().as_encoded_bytes()),
            None => false,
        }
    }

    /// The combined pattern, if any fragments were given
    pub fn as_str(&self) -> Option<&str> {
        self.regex.as_ref().map(|re| re.as_str())
    }
}

impl Default for IgnorePattern {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ignores_nothing() {
        let pattern = IgnorePattern::new::<&str>(&[]).unwrap();
        assert!(!pattern.is_match(Path::new("")));
        assert!(!pattern.is_match(Path::new("index.html")));
        assert_eq!(pattern.as_str(), None);
    }

    #[test]
    fn test_whole_path_anchoring() {
        let pattern = IgnorePattern::new(&["sub/ignored"]).unwrap();
        assert!(pattern.is_match(Path::new("sub/ignored")));
        assert!(!pattern.is_match(Path::new("sub/ignored/c.txt")));
        assert!(!pattern.is_match(Path::new("other/sub/ignored")));
        assert!(!pattern.is_match(Path::new("sub/ignored2")));
    }

    #[test]
    fn test_alternatives_are_grouped() {
        let pattern = IgnorePattern::new(&["node_modules", r".*\.map"]).unwrap();
        assert_eq!(pattern.as_str(), Some(r"^(?:node_modules|.*\.map)$"));
        assert!(pattern.is_match(Path::new("node_modules")));
        assert!(pattern.is_match(Path::new("js/app.js.map")));
        assert!(!pattern.is_match(Path::new("node_modules_backup")));
        assert!(!pattern.is_match(Path::new("js/app.js")));
    }

    #[test]
    fn test_invalid_fragment_named() {
        let err = IgnorePattern::new(&["ok", "(unclosed"]).unwrap_err();
        match err {
            ConfigError::InvalidIgnorePattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        // Unicode mode off so `.` matches arbitrary bytes
        let pattern = IgnorePattern::new(&[r"(?-u)raw/.*"]).unwrap();
        let name = OsStr::from_bytes(b"raw/\xff\xfe.bin");
        assert!(pattern.is_match(Path::new(name)));
    }
}
