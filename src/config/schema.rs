//! Configuration schema for Shipyard
//!
//! Every image reference, cache name, path and command the standard pipeline
//! uses lives here, so several pipeline configurations can coexist.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Content-digest pinned image holding the legacy WordPress assets
pub const LEGACY_ASSETS_IMAGE: &str = "ghcr.io/thechangelog/changelog-legacy-assets@sha256:4f1d2aa7036836bd59ff3af74bfd054c33a1ed558514a8dd91062a14804d7153";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Image references
    pub images: ImagesConfig,

    /// Application source capture
    pub source: SourceConfig,

    /// Cache volume names
    pub caches: CachesConfig,

    /// Dependency fetch & compile stage
    pub deps: DepsConfig,

    /// Static asset stage
    pub assets: AssetsConfig,

    /// Legacy asset import stage
    pub legacy: LegacyConfig,

    /// Release packaging stage
    pub release: ReleaseConfig,

    /// Environment passed to every command, layered over the defaults
    #[serde(deserialize_with = "merge_default_env")]
    pub env: BTreeMap<String, String>,
}

fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([("MIX_ENV".to_string(), "prod".to_string())])
}

fn merge_default_env<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut env = default_env();
    env.extend(BTreeMap::<String, String>::deserialize(deserializer)?);
    Ok(env)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            images: ImagesConfig::default(),
            source: SourceConfig::default(),
            caches: CachesConfig::default(),
            deps: DepsConfig::default(),
            assets: AssetsConfig::default(),
            legacy: LegacyConfig::default(),
            release: ReleaseConfig::default(),
            env: default_env(),
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Image references
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Base image the pipeline starts from
    pub base: String,

    /// Digest-pinned image the legacy assets are copied from
    pub legacy_assets: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            base: "hexpm/elixir:1.14.4-erlang-25.3-debian-bullseye-20230227-slim".to_string(),
            legacy_assets: LEGACY_ASSETS_IMAGE.to_string(),
        }
    }
}

/// Application source capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Host directory holding the application
    pub root: PathBuf,

    /// Subpaths copied into the image; everything else stays out
    pub include: Vec<String>,

    /// Application root inside the image
    pub app_root: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: strings(&["config", "lib", "priv/repo", "test", "mix.exs", "mix.lock"]),
            app_root: "/app".to_string(),
        }
    }
}

/// Cache volume names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
    /// Prefix added to every engine-level volume name
    pub prefix: String,

    /// Fetched dependency sources
    pub deps: String,

    /// Compiled build artifacts
    pub build: String,

    /// Installed asset tool packages
    pub node_modules: String,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            deps: "app-deps".to_string(),
            build: "app-build".to_string(),
            node_modules: "app-node-modules".to_string(),
        }
    }
}

/// Dependency fetch & compile stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepsConfig {
    /// Where fetched dependencies live
    pub deps_path: String,

    /// Where compiled artifacts live
    pub build_path: String,

    pub fetch: Vec<String>,
    pub compile_deps: Vec<String>,
    pub compile: Vec<String>,

    /// Shell glob that must match compiled output
    pub compiled_glob: String,
}

impl Default for DepsConfig {
    fn default() -> Self {
        Self {
            deps_path: "/app/deps".to_string(),
            build_path: "/app/_build".to_string(),
            fetch: strings(&["mix", "deps.get"]),
            compile_deps: strings(&["mix", "deps.compile"]),
            compile: strings(&["mix", "compile"]),
            compiled_glob: "/app/_build/$MIX_ENV/lib/*/ebin".to_string(),
        }
    }
}

/// Static asset stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Asset sources, relative to the source root
    pub dir: PathBuf,

    /// Patterns left out of the asset capture
    pub exclude: Vec<String>,

    /// Asset directory inside the image
    pub target: String,

    /// Package directory the cache is mounted at
    pub packages_path: String,

    /// Lockfile-exact install
    pub install: Vec<String>,
    pub compile: Vec<String>,
    pub digest: Vec<String>,

    /// File the digest step must produce
    pub manifest: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("assets"),
            exclude: strings(&["node_modules"]),
            target: "/app/assets".to_string(),
            packages_path: "/app/assets/node_modules".to_string(),
            install: strings(&["yarn", "install", "--frozen-lockfile"]),
            compile: strings(&["yarn", "run", "compile"]),
            digest: strings(&["mix", "phx.digest", "--no-vsn"]),
            manifest: "/app/priv/static/cache_manifest.json".to_string(),
        }
    }
}

/// Legacy asset import stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Directory inside the legacy image
    pub source_path: String,

    /// Destination inside the application image
    pub target: String,

    /// Subdirectory that must be non-empty after import
    pub probe: String,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            source_path: "/var/www/wp-content".to_string(),
            target: "/app/priv/static/wp-content".to_string(),
            probe: "uploads".to_string(),
        }
    }
}

/// Release packaging stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub generate: Vec<String>,
    pub build: Vec<String>,

    /// Output path of the self-contained release
    pub path: String,

    /// Executable name under `<path>/bin`
    pub binary: String,

    /// Subcommand used as the health probe
    pub version_subcommand: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            generate: strings(&["mix", "phx.gen.release"]),
            build: strings(&["mix", "release", "--path"]),
            path: "/app.release".to_string(),
            binary: "changelog".to_string(),
            version_subcommand: "version".to_string(),
        }
    }
}

impl ReleaseConfig {
    /// Full release build command, output path appended
    pub fn build_command(&self) -> Vec<String> {
        let mut argv = self.build.clone();
        argv.push(self.path.clone());
        argv
    }

    /// Command invoking the packaged executable's version subcommand
    pub fn probe_command(&self) -> Vec<String> {
        vec![
            format!("{}/bin/{}", self.path.trim_end_matches('/'), self.binary),
            self.version_subcommand.clone(),
        ]
    }
}
