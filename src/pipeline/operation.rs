//! Typed stage operations
//!
//! A stage is a list of these, interpreted in order by `Stage::apply`.

use crate::engine::DirectorySource;
use serde::Serialize;
use std::fmt;

/// Quote a value for a POSIX shell.
/// Plain paths pass through; anything else is single-quoted.
fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A post-condition check on the artifacts a stage produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verify {
    pub argv: Vec<String>,
}

impl Verify {
    /// Directory exists and has at least one entry
    pub fn non_empty_dir(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        Self {
            argv: argv(&["sh", "-c", &format!("ls -lahd {}/*", shell_quote(path))]),
        }
    }

    /// Shell glob matches at least one path.
    /// The pattern is expanded by the shell, so `$VARS` are allowed.
    pub fn glob(pattern: &str) -> Self {
        Self {
            argv: argv(&["sh", "-c", &format!("ls -lahd {}", pattern)]),
        }
    }

    /// File exists
    pub fn file(path: &str) -> Self {
        Self {
            argv: argv(&["ls", "-lah", path]),
        }
    }

    /// Arbitrary command whose success proves the artifact works
    pub fn probe(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

/// One step of a stage
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Copy a directory into the image, optionally moving the workdir there
    Attach {
        source: DirectorySource,
        target: String,
        set_workdir: bool,
    },
    /// Bind a named cache volume for this and later stages
    MountCache { cache: String, target: String },
    /// Run a build command; non-zero exit aborts the stage
    Run { argv: Vec<String> },
    /// Run a verification; non-zero exit aborts the stage
    Verify(Verify),
    /// Change the working directory without copying anything
    Workdir { path: String },
    /// Progress message, logged only
    Note { message: String },
}

impl Operation {
    pub fn run<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Run {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    pub fn mount_cache(cache: impl Into<String>, target: impl Into<String>) -> Self {
        Self::MountCache {
            cache: cache.into(),
            target: target.into(),
        }
    }

    pub fn workdir(path: impl Into<String>) -> Self {
        Self::Workdir { path: path.into() }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::Note {
            message: message.into(),
        }
    }

    /// Whether this operation runs a command in the image
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Run { .. } | Self::Verify(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach {
                source,
                target,
                set_workdir,
            } => {
                write!(f, "attach {} -> {}", source, target)?;
                if *set_workdir {
                    write!(f, " (workdir)")?;
                }
                Ok(())
            }
            Self::MountCache { cache, target } => write!(f, "cache  {} -> {}", cache, target),
            Self::Run { argv } => write!(f, "run    {}", argv.join(" ")),
            Self::Verify(v) => write!(f, "verify {}", v.argv.join(" ")),
            Self::Workdir { path } => write!(f, "cd     {}", path),
            Self::Note { message } => write!(f, "note   {}", message),
        }
    }
}
