//! The standard application image stages
//!
//! Each function builds one stage from configuration. Stage order matters:
//! every stage expects the image produced by the one before it.

use crate::config::Config;
use crate::context::BuildContext;
use crate::engine::DirectorySource;
use crate::error::ShipyardResult;
use crate::pipeline::operation::{Operation, Verify};
use crate::pipeline::stage::Stage;

pub const SOURCE: &str = "source";
pub const DEPS: &str = "deps";
pub const ASSETS: &str = "assets";
pub const LEGACY_ASSETS: &str = "legacy-assets";
pub const RELEASE: &str = "release";

/// Attach the allow-listed application sources at the app root.
///
/// Only the listed subpaths are captured so unrelated edits (docs, CI
/// files) don't invalidate the dependency and compile caches.
pub fn source(config: &Config) -> ShipyardResult<Stage> {
    let ctx = BuildContext::capture(&config.source.root, &config.source.include, &[])?;

    Ok(Stage::new(SOURCE).then(Operation::Attach {
        source: DirectorySource::Host(ctx),
        target: config.source.app_root.clone(),
        set_workdir: true,
    }))
}

/// Fetch and compile dependencies, then the application.
///
/// Dependency sources and compiled output sit in separate caches because
/// they are invalidated independently.
pub fn deps(config: &Config) -> Stage {
    let deps = &config.deps;

    Stage::new(DEPS)
        .then(Operation::mount_cache(&config.caches.deps, &deps.deps_path))
        .then(Operation::note("Fetch app deps..."))
        .then(Operation::run(deps.fetch.iter().cloned()))
        .then(Operation::note("Ensure app deps are present & OK..."))
        .then(Operation::Verify(Verify::non_empty_dir(&deps.deps_path)))
        .then(Operation::mount_cache(&config.caches.build, &deps.build_path))
        .then(Operation::note("Compile app deps..."))
        .then(Operation::run(deps.compile_deps.iter().cloned()))
        .then(Operation::note("Compile app..."))
        .then(Operation::run(deps.compile.iter().cloned()))
        .then(Operation::note("Ensure bytecode is present & OK..."))
        .then(Operation::Verify(Verify::glob(&deps.compiled_glob)))
}

/// Install asset packages, compile and digest static assets.
///
/// Any local package directory is excluded from the capture so it cannot
/// shadow the cache mounted at the same path.
pub fn assets(config: &Config) -> ShipyardResult<Stage> {
    let assets = &config.assets;
    let ctx = BuildContext::capture(
        config.source.root.join(&assets.dir),
        &[],
        &assets.exclude,
    )?;

    Ok(Stage::new(ASSETS)
        .then(Operation::Attach {
            source: DirectorySource::Host(ctx),
            target: assets.target.clone(),
            set_workdir: true,
        })
        .then(Operation::mount_cache(
            &config.caches.node_modules,
            &assets.packages_path,
        ))
        .then(Operation::run(assets.install.iter().cloned()))
        .then(Operation::run(assets.compile.iter().cloned()))
        .then(Operation::workdir(&config.source.app_root))
        .then(Operation::run(assets.digest.iter().cloned()))
        .then(Operation::note("Ensure static assets are present & OK..."))
        .then(Operation::Verify(Verify::file(&assets.manifest))))
}

/// Copy legacy assets out of the digest-pinned image.
pub fn legacy_assets(config: &Config) -> Stage {
    let legacy = &config.legacy;
    let probe = format!("{}/{}", legacy.target.trim_end_matches('/'), legacy.probe);

    Stage::new(LEGACY_ASSETS)
        .then(Operation::Attach {
            source: DirectorySource::Image {
                reference: config.images.legacy_assets.clone(),
                path: legacy.source_path.clone(),
            },
            target: legacy.target.clone(),
            set_workdir: false,
        })
        .then(Operation::note("Ensure legacy assets are present & OK..."))
        .then(Operation::Verify(Verify::non_empty_dir(&probe)))
}

/// Generate release files, build the release and probe its version.
pub fn release(config: &Config) -> Stage {
    let release = &config.release;

    Stage::new(RELEASE)
        .then(Operation::note("Generate release files..."))
        .then(Operation::run(release.generate.iter().cloned()))
        .then(Operation::note("Create a self-contained release..."))
        .then(Operation::run(release.build_command()))
        .then(Operation::note("Check release version..."))
        .then(Operation::Verify(Verify::probe(release.probe_command())))
}

/// All standard stages in execution order
pub fn standard(config: &Config) -> ShipyardResult<Vec<Stage>> {
    Ok(vec![
        source(config)?,
        deps(config),
        assets(config)?,
        legacy_assets(config),
        release(config),
    ])
}
