//! # Error Handling
//!
//! This module defines the centralized error type for `grove`. It uses the
//! `thiserror` library to describe every anticipated failure mode with enough
//! context (paths, commands, captured output) to act on it.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum covering all failures of the library.
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! The variants fall into a few families:
//!
//! - Manifest input problems (`ManifestParse`, `ImportCycle`) abort a run.
//! - Disagreeing pins (`KeyConflict`, `LockConflict`) abort a run unless the
//!   caller explicitly suppresses conflict detection.
//! - Version control failures are either transient (`TransientVcs`, retried by
//!   [`crate::retry::RetryPolicy`]) or permanent (`GitCommand`).
//! - Per-project and per-hook failures (`DirtyWorkingTree`, `HookTimeout`,
//!   `HookFailure`, `CommandExecution`) are isolated and aggregated into
//!   `Multiple` rather than aborting the whole run.

use std::time::Duration;

use thiserror::Error;

/// Main error type for grove operations
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest document is malformed or fails validation.
    #[error("Manifest error in {path}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ManifestParse {
        path: String,
        message: String,
        /// Optional hint for how to fix the manifest
        hint: Option<String>,
    },

    /// The import graph contains a back edge.
    #[error("Import cycle detected: {cycle}")]
    ImportCycle { cycle: String },

    /// Two sibling sources disagree on the attributes of the same key, or two
    /// keys claim the same checkout path.
    #[error("Conflicting definitions for {key}: {message}")]
    KeyConflict { key: String, message: String },

    /// Two lock inputs pin the same key to different values.
    #[error("Conflicting lock entries for {key}: {first} ({first_source}) vs {second} ({second_source})")]
    LockConflict {
        key: String,
        first: String,
        first_source: String,
        second: String,
        second_source: String,
    },

    /// A version control command failed for a reason that is likely to go
    /// away on its own (network trouble, lock contention).
    #[error("Transient git failure in {dir}: git {command}\n{stderr}")]
    TransientVcs {
        command: String,
        dir: String,
        stderr: String,
    },

    /// A version control command failed.
    #[error("git {command} failed in {dir}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    GitCommand {
        command: String,
        dir: String,
        stdout: String,
        stderr: String,
    },

    /// A checkout holds local changes that would be lost or that block the
    /// required operation. Never resolved automatically.
    #[error("Project {project} ({path}) has local changes: {details}\n  hint: {remediation}")]
    DirtyWorkingTree {
        project: String,
        path: String,
        details: String,
        remediation: String,
    },

    /// A hook exceeded its time budget and was terminated.
    #[error("Hook {hook} timed out after {}s", timeout.as_secs())]
    HookTimeout { hook: String, timeout: Duration },

    /// A hook ran and failed.
    #[error("Hook {hook} failed: {status}{}", if output.is_empty() { String::new() } else { format!("\n{}", output) })]
    HookFailure {
        hook: String,
        status: String,
        output: String,
    },

    /// A user command exited unsuccessfully in one project.
    #[error("Command failed in project {project}: {status}")]
    CommandExecution { project: String, status: String },

    /// Pushing a change for review failed.
    #[error("Push failed for {path}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Push {
        path: String,
        stdout: String,
        stderr: String,
    },

    /// A problem specific to one project that is not a git failure.
    #[error("Project {project}: {message}")]
    Project { project: String, message: String },

    /// The workspace layout is missing or unusable.
    #[error("Workspace error: {message}")]
    Workspace { message: String },

    /// A command-line value (merge policy, assignment, filter) is malformed.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Several independent units failed.
    #[error("{context} ({} failure(s)):\n{}", errors.len(), errors.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple { context: String, errors: Vec<Error> },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// The worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    ///
    /// An aggregate is transient only when every member is.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientVcs { .. } => true,
            Error::Multiple { errors, .. } => {
                !errors.is_empty() && errors.iter().all(Error::is_transient)
            }
            _ => false,
        }
    }

    /// Wraps a list of failures, collapsing the single-error case.
    pub fn aggregate(context: impl Into<String>, mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple {
                context: context.into(),
                errors,
            }),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_manifest_parse_with_hint() {
        let error = Error::ManifestParse {
            path: "/w/.grove_manifest".to_string(),
            message: "project entry is missing `remote`".to_string(),
            hint: Some("every project needs name, path and remote".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("/w/.grove_manifest"));
        assert!(display.contains("missing `remote`"));
        assert!(display.contains("hint:"));
    }

    #[test]
    fn test_error_display_manifest_parse_without_hint() {
        let error = Error::ManifestParse {
            path: "m.yaml".to_string(),
            message: "bad".to_string(),
            hint: None,
        };
        assert!(!format!("{}", error).contains("hint:"));
    }

    #[test]
    fn test_error_display_lock_conflict() {
        let error = Error::LockConflict {
            key: "a=https://example.com/a".to_string(),
            first: "r1".to_string(),
            first_source: "one.yaml".to_string(),
            second: "r2".to_string(),
            second_source: "two.yaml".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("r1 (one.yaml)"));
        assert!(display.contains("r2 (two.yaml)"));
    }

    #[test]
    fn test_error_display_hook_timeout() {
        let error = Error::HookTimeout {
            hook: "tools/setup".to_string(),
            timeout: Duration::from_secs(90),
        };
        assert_eq!(format!("{}", error), "Hook tools/setup timed out after 90s");
    }

    #[test]
    fn test_error_display_dirty_tree_has_remediation() {
        let error = Error::DirtyWorkingTree {
            project: "a".to_string(),
            path: "/w/a".to_string(),
            details: "uncommitted changes".to_string(),
            remediation: "commit or stash them".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("uncommitted changes"));
        assert!(display.contains("hint: commit or stash them"));
    }

    #[test]
    fn test_multiple_lists_every_failure() {
        let error = Error::Multiple {
            context: "2 hooks failed".to_string(),
            errors: vec![
                Error::HookFailure {
                    hook: "a/one".to_string(),
                    status: "exit status 1".to_string(),
                    output: String::new(),
                },
                Error::HookTimeout {
                    hook: "b/two".to_string(),
                    timeout: Duration::from_secs(5),
                },
            ],
        };
        let display = format!("{}", error);
        assert!(display.contains("(2 failure(s))"));
        assert!(display.contains("  - Hook a/one failed"));
        assert!(display.contains("  - Hook b/two timed out"));
    }

    #[test]
    fn test_is_transient() {
        let transient = || Error::TransientVcs {
            command: "fetch origin".to_string(),
            dir: "/w/a".to_string(),
            stderr: "Could not resolve host".to_string(),
        };
        assert!(transient().is_transient());
        assert!(!Error::ImportCycle {
            cycle: "a -> a".to_string()
        }
        .is_transient());

        let all = Error::Multiple {
            context: "sync".to_string(),
            errors: vec![transient(), transient()],
        };
        assert!(all.is_transient());

        let mixed = Error::Multiple {
            context: "sync".to_string(),
            errors: vec![
                transient(),
                Error::Project {
                    project: "a".to_string(),
                    message: "boom".to_string(),
                },
            ],
        };
        assert!(!mixed.is_transient());
    }

    #[test]
    fn test_aggregate_collapses_single_error() {
        assert!(Error::aggregate("ctx", vec![]).is_none());
        let single = Error::aggregate(
            "ctx",
            vec![Error::Workspace {
                message: "x".to_string(),
            }],
        );
        assert!(matches!(single, Some(Error::Workspace { .. })));
        let many = Error::aggregate(
            "ctx",
            vec![
                Error::Workspace {
                    message: "x".to_string(),
                },
                Error::Workspace {
                    message: "y".to_string(),
                },
            ],
        );
        assert!(matches!(many, Some(Error::Multiple { .. })));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        assert!(format!("{}", error).contains("File not found"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: [unclosed").unwrap_err();
        let error: Error = yaml_error.into();
        assert!(format!("{}", error).contains("YAML error"));
    }
}
