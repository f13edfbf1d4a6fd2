//! Pushing changes to a Gerrit-style review server.
//!
//! A change is uploaded by pushing to the magic ref
//! `refs/for/<branch>`, with reviewers, CCs and a topic appended as
//! `%r=...,cc=...,topic=...`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::defaults;
use crate::error::{Error, Result};
use crate::git::Git;

/// Which presubmit checks the review server should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Presubmit {
    #[default]
    All,
    None,
}

impl FromStr for Presubmit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Presubmit::All),
            "none" => Ok(Presubmit::None),
            other => Err(Error::InvalidInput {
                message: format!("unknown presubmit type {:?}; expected all or none", other),
            }),
        }
    }
}

impl fmt::Display for Presubmit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Presubmit::All => "all",
            Presubmit::None => "none",
        })
    }
}

/// Options for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    pub remote: String,
    pub remote_branch: String,
    pub reviewers: Vec<String>,
    pub ccs: Vec<String>,
    pub topic: Option<String>,
    pub presubmit: Presubmit,
    /// Run the local pre-push hooks.
    pub verify: bool,
    pub ref_to_upload: String,
    /// Extra arguments passed to `git push`.
    pub git_options: Vec<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            remote: defaults::REMOTE_NAME.to_string(),
            remote_branch: defaults::DEFAULT_BRANCH.to_string(),
            reviewers: Vec::new(),
            ccs: Vec::new(),
            topic: None,
            presubmit: Presubmit::All,
            verify: true,
            ref_to_upload: "HEAD".to_string(),
            git_options: Vec::new(),
        }
    }
}

impl PushOptions {
    /// The refspec pushed for these options.
    pub fn refspec(&self) -> String {
        let mut params: Vec<String> = Vec::new();
        params.extend(self.reviewers.iter().map(|r| format!("r={}", r)));
        params.extend(self.ccs.iter().map(|c| format!("cc={}", c)));
        if let Some(topic) = &self.topic {
            params.push(format!("topic={}", topic));
        }
        let mut refspec = format!("{}:refs/for/{}", self.ref_to_upload, self.remote_branch);
        if !params.is_empty() {
            refspec.push('%');
            refspec.push_str(&params.join(","));
        }
        refspec
    }

    fn push_args(&self) -> Vec<String> {
        let mut args = self.git_options.clone();
        args.push(if self.verify { "--verify" } else { "--no-verify" }.to_string());
        if self.presubmit == Presubmit::None {
            args.push("-o".to_string());
            args.push("presubmit-skip".to_string());
        }
        args
    }
}

/// Raw output of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub stdout: String,
    pub stderr: String,
    /// The server already had this exact change.
    pub no_new_changes: bool,
}

/// Splits a comma separated address list, dropping empty entries.
pub fn parse_emails(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pushes the change at `path` for review.
pub fn push(path: &Path, opts: &PushOptions) -> Result<PushResult> {
    let refspec = opts.refspec();
    log::debug!("pushing {} from {}", refspec, path.display());
    let output = Git::at(path).push(&opts.remote, &refspec, &opts.push_args())?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let no_new_changes = stderr.contains("(no new changes)") || stdout.contains("(no new changes)");
    if output.status.success() || no_new_changes {
        return Ok(PushResult {
            stdout,
            stderr,
            no_new_changes,
        });
    }
    Err(Error::Push {
        path: path.display().to_string(),
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refspec_without_parameters() {
        let opts = PushOptions::default();
        assert_eq!(opts.refspec(), "HEAD:refs/for/main");
    }

    #[test]
    fn test_refspec_with_reviewers_ccs_and_topic() {
        let opts = PushOptions {
            remote_branch: "release".to_string(),
            reviewers: parse_emails("a@example.com, b"),
            ccs: parse_emails("c@example.com,,"),
            topic: Some("me-feature".to_string()),
            ..PushOptions::default()
        };
        assert_eq!(
            opts.refspec(),
            "HEAD:refs/for/release%r=a@example.com,r=b,cc=c@example.com,topic=me-feature"
        );
    }

    #[test]
    fn test_push_args_follow_verify_and_presubmit() {
        let opts = PushOptions {
            verify: false,
            presubmit: Presubmit::None,
            ..PushOptions::default()
        };
        assert_eq!(opts.push_args(), vec!["--no-verify", "-o", "presubmit-skip"]);
        assert_eq!(PushOptions::default().push_args(), vec!["--verify"]);
    }

    #[test]
    fn test_presubmit_parse() {
        assert_eq!("none".parse::<Presubmit>().unwrap(), Presubmit::None);
        assert!("some".parse::<Presubmit>().is_err());
    }
}
