//! Configuration types for pre-compress
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Parsing of the target modification time

use crate::error::ConfigError;
use crate::ignore::IgnorePattern;
use crate::walker::tree::SkipPolicy;
use chrono::DateTime;
use clap::Parser;
use std::path::PathBuf;
use std::time::SystemTime;

/// Default m-time: the zero time, so artifacts do not depend on build time
pub const DEFAULT_MTIME: &str = "0001-01-01T00:00:00Z";

/// Maximum worker count accepted on the command line
pub const MAX_CONCURRENCY: usize = 512;

/// Generate .gz siblings for files that get smaller when compressed
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pre-compress",
    version,
    about = "Generate .gz siblings for files that get smaller when compressed",
    long_about = "Walks a directory tree and writes <file>.gz next to every file whose gzip\n\
                  form is strictly smaller than the original, so a static file server can\n\
                  serve pre-compressed content.\n\n\
                  Every touched file and every artifact gets the same modification time.\n\
                  Files that already have a .gz sibling are skipped on re-runs.\n\n\
                  Positional PATTERN arguments are regular expressions matched against\n\
                  whole paths relative to the root; matching directories are skipped\n\
                  entirely.",
    after_help = "EXAMPLES:\n    \
        pre-compress\n    \
        pre-compress --m-time 2024-01-01T00:00:00Z\n    \
        pre-compress -C public --concurrency 4 'vendor' '.*\\.map'\n    \
        pre-compress --verify-fresh -q"
)]
pub struct CliArgs {
    /// Modification time applied to every file and artifact (RFC 3339)
    #[arg(long = "m-time", default_value = DEFAULT_MTIME, value_name = "TIME")]
    pub m_time: String,

    /// Number of compression workers
    #[arg(long, default_value_t = default_concurrency(), value_name = "NUM")]
    pub concurrency: usize,

    /// Directory to process (defaults to the current directory)
    #[arg(short = 'C', long = "directory", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Recompress files whose existing .gz is not at the target m-time
    #[arg(long)]
    pub verify_fresh: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Ignore paths matching pattern (relative to the root, whole path)
    #[arg(value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,
}

fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, MAX_CONCURRENCY)
}

/// Parse an RFC 3339 timestamp into a `SystemTime`
pub fn parse_mtime(value: &str) -> Result<SystemTime, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(SystemTime::from)
        .map_err(|e| ConfigError::InvalidMTime {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root of the tree to process
    pub root: PathBuf,

    /// Target modification time
    pub mtime: SystemTime,

    /// Number of workers
    pub concurrency: usize,

    /// Compiled ignore pattern
    pub ignore: IgnorePattern,

    /// When an existing artifact means a file is skipped
    pub skip_policy: SkipPolicy,

    /// Show progress indicator
    pub show_progress: bool,
}

impl RunConfig {
    /// Create and validate configuration from CLI arguments
    ///
    /// `cwd` is used as the root when no directory was given.
    pub fn from_args(args: CliArgs, cwd: PathBuf) -> Result<Self, ConfigError> {
        if args.concurrency == 0 || args.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency {
                count: args.concurrency,
                max: MAX_CONCURRENCY,
            });
        }

        let mtime = parse_mtime(&args.m_time)?;
        let ignore = IgnorePattern::new(&args.ignore_patterns)?;

        let root = match args.directory {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => cwd.join(dir),
            None => cwd,
        };
        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot {
                path: root,
                reason: "Not a directory".to_string(),
            });
        }

        let skip_policy = if args.verify_fresh {
            SkipPolicy::Fresh
        } else {
            SkipPolicy::Exists
        };

        Ok(Self {
            root,
            mtime,
            concurrency: args.concurrency,
            ignore,
            skip_policy,
            show_progress: !args.quiet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::path::Path;
    use tempfile::tempdir;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["pre-compress"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_mtime_is_zero_time() {
        let mtime = parse_mtime(DEFAULT_MTIME).unwrap();
        assert_eq!(FileTime::from_system_time(mtime).unix_seconds(), -62_135_596_800);
    }

    #[test]
    fn test_parse_mtime_with_offset() {
        let mtime = parse_mtime("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(FileTime::from_system_time(mtime).unix_seconds(), 1_709_287_200);
    }

    #[test]
    fn test_parse_mtime_invalid() {
        assert!(matches!(
            parse_mtime("yesterday"),
            Err(ConfigError::InvalidMTime { .. })
        ));
    }

    #[test]
    fn test_cli_parsing() {
        let a = args(&[
            "--m-time",
            "2024-01-01T00:00:00Z",
            "--concurrency",
            "3",
            "-q",
            "vendor",
            ".*\\.map",
        ]);
        assert_eq!(a.concurrency, 3);
        assert!(a.quiet);
        assert_eq!(a.ignore_patterns, vec!["vendor", ".*\\.map"]);
        assert!(a.directory.is_none());
    }

    #[test]
    fn test_from_args_resolves_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("public")).unwrap();

        let cwd = dir.path().to_path_buf();
        let config = RunConfig::from_args(args(&["-C", "public", "--verify-fresh"]), cwd).unwrap();
        assert_eq!(config.root, dir.path().join("public"));
        assert_eq!(config.skip_policy, SkipPolicy::Fresh);
        assert!(config.show_progress);

        let config = RunConfig::from_args(args(&[]), dir.path().to_path_buf()).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.skip_policy, SkipPolicy::Exists);
    }

    #[test]
    fn test_from_args_validation() {
        let cwd = tempdir().unwrap().path().to_path_buf();

        let err = RunConfig::from_args(args(&["--concurrency", "0"]), cwd.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency { count: 0, .. }));

        let err = RunConfig::from_args(args(&["--concurrency", "513"]), cwd.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency { count: 513, max: 512 }));

        let err = RunConfig::from_args(args(&["[a-"]), cwd.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIgnorePattern { .. }));

        let err = RunConfig::from_args(args(&["-C", "/definitely/not/here"]), cwd).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoot { .. }));
    }

    #[test]
    fn test_ignore_compiled() {
        let dir = tempdir().unwrap();
        let cwd = dir.path().to_path_buf();
        let config = RunConfig::from_args(args(&["sub/ignored"]), cwd).unwrap();
        assert!(config.ignore.is_match(Path::new("sub/ignored")));
        assert!(!config.ignore.is_match(Path::new("sub")));
    }
}
