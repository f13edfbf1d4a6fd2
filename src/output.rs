//! # Output Configuration
//!
//! Controls how the CLI presents results: whether colors and symbols are
//! used, the convergence progress bar and the end-of-update summary.
//!
//! ## Respecting User Preferences
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grove::output::{OutputConfig, symbol};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} Updated", symbol(&config, "✔", "[OK]"));
//! ```

use std::env;

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::phases::converge::SyncReport;

/// Output configuration for controlling colors and symbols.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and symbols should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - The value of the --color CLI flag: "always", "never", or "auto"
    ///
    /// In auto mode, colors are disabled if:
    /// - `NO_COLOR` environment variable is set (any value, including empty)
    /// - `CLICOLOR=0` is set
    /// - `TERM=dumb` is set
    /// - stdout is not a TTY (unless `CLICOLOR_FORCE=1`)
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        console::set_colors_enabled(use_color);
        console::set_colors_enabled_stderr(use_color);
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // The presence of NO_COLOR (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `fancy` when colors are enabled and `plain` otherwise.
pub fn symbol<'a>(config: &OutputConfig, fancy: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        fancy
    } else {
        plain
    }
}

/// Progress bar for convergence, hidden when stderr is not a terminal.
pub fn progress_bar(config: &OutputConfig) -> ProgressBar {
    let bar = ProgressBar::new(0);
    if !console::Term::stderr().is_term() {
        bar.set_draw_target(ProgressDrawTarget::hidden());
        return bar;
    }
    let template = if config.use_color {
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}"
    } else {
        "[{elapsed_precise}] [{wide_bar}] {pos}/{len} {msg}"
    };
    let style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

/// One-paragraph summary of a convergence pass.
pub fn render_summary(config: &OutputConfig, report: &SyncReport) -> String {
    let mut lines = Vec::new();
    let counts = [
        ("created", report.created.len()),
        ("updated", report.updated.len()),
        ("moved", report.moved.len()),
        ("deleted", report.deleted.len()),
        ("unchanged", report.unchanged),
    ];
    let parts: Vec<String> = counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(label, n)| format!("{} {}", n, label))
        .collect();
    let headline = if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    };
    lines.push(format!("{} {}", symbol(config, "✔", "[OK]"), headline));

    for p in &report.stale {
        lines.push(format!(
            "{} {} ({}) is no longer managed; run `grove update --gc` to delete it",
            symbol(config, "•", "[STALE]"),
            p.name,
            p.path.display()
        ));
    }
    for f in &report.failures {
        let marker = if config.use_color {
            style("✘").red().to_string()
        } else {
            "[FAIL]".to_string()
        };
        lines.push(format!(
            "{} {} ({}): {}",
            marker,
            f.key.name,
            f.path.display(),
            f.error
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::phases::converge::ProjectFailure;
    use crate::project::{Project, ProjectKey};
    use serial_test::serial;
    use std::path::PathBuf;

    #[test]
    #[serial]
    fn test_color_always() {
        let config = OutputConfig::from_env_and_flag("always");
        assert!(config.use_color);
    }

    #[test]
    #[serial]
    fn test_color_never() {
        let config = OutputConfig::from_env_and_flag("never");
        assert!(!config.use_color);
    }

    #[test]
    #[serial]
    fn test_auto_color_honours_no_color() {
        let previous = env::var_os("NO_COLOR");
        env::set_var("NO_COLOR", "");
        let config = OutputConfig::from_env_and_flag("auto");
        match previous {
            Some(v) => env::set_var("NO_COLOR", v),
            None => env::remove_var("NO_COLOR"),
        }
        assert!(!config.use_color);
    }

    #[test]
    fn test_symbol_helper() {
        assert_eq!(symbol(&OutputConfig::with_color(), "✔", "[OK]"), "✔");
        assert_eq!(symbol(&OutputConfig::without_color(), "✔", "[OK]"), "[OK]");
    }

    #[test]
    fn test_summary_lists_counts_stale_and_failures() {
        let report = SyncReport {
            created: vec![ProjectKey::new("a", "r")],
            unchanged: 3,
            stale: vec![Project::new("old", "/w/old", "r")],
            failures: vec![ProjectFailure {
                key: ProjectKey::new("b", "r"),
                path: PathBuf::from("/w/b"),
                error: Error::Workspace {
                    message: "boom".to_string(),
                },
            }],
            ..SyncReport::default()
        };
        let text = render_summary(&OutputConfig::without_color(), &report);
        assert!(text.starts_with("[OK] 1 created, 3 unchanged"));
        assert!(text.contains("[STALE] old"));
        assert!(text.contains("[FAIL] b (/w/b): Workspace error: boom"));
    }

    #[test]
    fn test_summary_for_empty_report() {
        let text = render_summary(&OutputConfig::without_color(), &SyncReport::default());
        assert_eq!(text, "[OK] nothing to do");
    }
}
