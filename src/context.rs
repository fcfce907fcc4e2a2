//! Build contexts: filtered captures of host directories
//!
//! A `BuildContext` only records which host subtree to read and how to filter
//! it. Nothing is read at capture time; the execution engine walks the tree
//! when a stage attaches the context.

use crate::error::{ShipyardError, ShipyardResult};
use glob::Pattern;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Immutable, declarative capture of a host directory
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
    /// Root of the captured subtree on the host
    pub source: PathBuf,
    #[serde(serialize_with = "serialize_patterns")]
    includes: Vec<Pattern>,
    #[serde(serialize_with = "serialize_patterns")]
    excludes: Vec<Pattern>,
}

fn serialize_patterns<S: Serializer>(patterns: &[Pattern], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(patterns.iter().map(Pattern::as_str))
}

fn compile(patterns: &[String]) -> ShipyardResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p.trim_end_matches('/')).map_err(|e| ShipyardError::InvalidPattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl BuildContext {
    /// Capture `source` filtered by include and exclude globs.
    ///
    /// With no includes the whole subtree is captured. Excludes always win
    /// over includes.
    pub fn capture(
        source: impl Into<PathBuf>,
        includes: &[String],
        excludes: &[String],
    ) -> ShipyardResult<Self> {
        Ok(Self {
            source: source.into(),
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Include patterns in declaration order
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(Pattern::as_str)
    }

    /// Exclude patterns in declaration order
    pub fn excludes(&self) -> impl Iterator<Item = &str> {
        self.excludes.iter().map(Pattern::as_str)
    }

    /// Whether a path relative to `source` belongs to the context.
    ///
    /// A pattern matches a path when it matches the path itself or any of
    /// its ancestors, so `priv/repo` selects everything below it.
    pub fn admits(&self, relative: &Path) -> bool {
        if Self::any_match(&self.excludes, relative) {
            return false;
        }
        self.includes.is_empty() || Self::any_match(&self.includes, relative)
    }

    /// Whether a directory can be skipped entirely: it is excluded, or no
    /// include pattern can match it or anything below it
    pub fn prunes(&self, relative: &Path) -> bool {
        if Self::any_match(&self.excludes, relative) {
            return true;
        }
        !(self.includes.is_empty()
            || Self::any_match(&self.includes, relative)
            || self.includes.iter().any(|p| Self::leads_to(p, relative)))
    }

    /// Whether `dir` matches the leading components of `pattern`, so that
    /// entries below it may still match. A `**` component matches any depth.
    fn leads_to(pattern: &Pattern, dir: &Path) -> bool {
        let mut parts = pattern.as_str().split('/');
        for component in dir.components() {
            let Some(part) = parts.next() else {
                return false;
            };
            if part == "**" {
                return true;
            }
            let name = component.as_os_str().to_string_lossy();
            match Pattern::new(part) {
                Ok(p) if p.matches(&name) => {}
                Ok(_) => return false,
                Err(_) => return true,
            }
        }
        true
    }

    fn any_match(patterns: &[Pattern], relative: &Path) -> bool {
        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|candidate| patterns.iter().any(|p| p.matches_path(candidate)))
    }

    /// Stable fingerprint of the (source, includes, excludes) identity
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.to_string_lossy().as_bytes());
        for p in &self.includes {
            hasher.update(b"\0+");
            hasher.update(p.as_str().as_bytes());
        }
        for p in &self.excludes {
            hasher.update(b"\0-");
            hasher.update(p.as_str().as_bytes());
        }
        let hash = hex::encode(hasher.finalize());
        hash[..12].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn app_source() -> BuildContext {
        BuildContext::capture(
            ".",
            &strings(&["config", "lib", "priv/repo", "test", "mix.exs", "mix.lock"]),
            &[],
        )
        .unwrap()
    }

    #[test]
    fn includes_select_subtrees() {
        let ctx = app_source();
        assert!(ctx.admits(Path::new("mix.exs")));
        assert!(ctx.admits(Path::new("lib/changelog/post.ex")));
        assert!(ctx.admits(Path::new("priv/repo/seeds.exs")));
        assert!(!ctx.admits(Path::new("priv/static/app.js")));
        assert!(!ctx.admits(Path::new(".github/workflows/ship_it.yml")));
        assert!(!ctx.admits(Path::new("README.md")));
    }

    #[test]
    fn empty_includes_capture_everything_but_excludes() {
        let ctx = BuildContext::capture("./assets", &[], &strings(&["node_modules"])).unwrap();
        assert!(ctx.admits(Path::new("package.json")));
        assert!(ctx.admits(Path::new("app/app.js")));
        assert!(!ctx.admits(Path::new("node_modules")));
        assert!(!ctx.admits(Path::new("node_modules/left-pad/index.js")));
        assert!(ctx.prunes(Path::new("node_modules")));
    }

    #[test]
    fn prunes_directories_no_include_can_reach() {
        let ctx = app_source();
        assert!(ctx.prunes(Path::new(".git")));
        assert!(ctx.prunes(Path::new("deps")));
        assert!(ctx.prunes(Path::new("_build")));
        assert!(ctx.prunes(Path::new("assets")));
        assert!(ctx.prunes(Path::new("priv/static")));
        assert!(!ctx.prunes(Path::new("priv")));
        assert!(!ctx.prunes(Path::new("priv/repo")));
        assert!(!ctx.prunes(Path::new("lib/changelog")));

        let nested = BuildContext::capture(".", &strings(&["src/**/*.rs", "*/fixtures"]), &[])
            .unwrap();
        assert!(!nested.prunes(Path::new("src/a/b")));
        assert!(!nested.prunes(Path::new("tests")));
        assert!(nested.prunes(Path::new("tests/unit")));
        assert!(!nested.prunes(Path::new("tests/fixtures/data")));
    }

    #[test]
    fn exclude_overrides_include() {
        let ctx = BuildContext::capture(
            ".",
            &strings(&["lib", "deps"]),
            &strings(&["deps", "lib/**/*.tmp"]),
        )
        .unwrap();
        assert!(ctx.admits(Path::new("lib/a.ex")));
        assert!(!ctx.admits(Path::new("lib/nested/b.tmp")));
        assert!(!ctx.admits(Path::new("deps/phoenix/mix.exs")));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let ctx = BuildContext::capture(".", &strings(&["config/"]), &[]).unwrap();
        assert!(ctx.admits(Path::new("config/runtime.exs")));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let err = BuildContext::capture(".", &strings(&["lib/[unclosed"]), &[]).unwrap_err();
        assert!(matches!(err, ShipyardError::InvalidPattern { .. }));
    }

    #[test]
    fn fingerprint_tracks_identity() {
        let a = app_source();
        let b = app_source();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = BuildContext::capture(".", &strings(&["lib"]), &[]).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());

        let d = BuildContext::capture(".", &[], &strings(&["lib"])).unwrap();
        assert_ne!(c.fingerprint(), d.fingerprint());
    }

    #[test]
    fn patterns_preserve_order() {
        let ctx = app_source();
        assert_eq!(ctx.includes().next(), Some("config"));
        assert_eq!(ctx.excludes().count(), 0);
    }
}
