//! Podman execution engine
//!
//! Every image transition is a container that is created or run from the
//! current snapshot and committed into a new one. Earlier snapshots are left
//! untouched, which keeps `ImageState` values independently usable.

use crate::cache::CacheVolume;
use crate::context::BuildContext;
use crate::engine::{DirectorySource, ExecOutput, ExecResult, ExecutionEngine, ImageState};
use crate::error::{ShipyardError, ShipyardResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Container engine using a local rootless Podman
pub struct PodmanEngine {
    staging_root: PathBuf,
}

impl PodmanEngine {
    /// Create an engine staging host directories under the data directory
    pub fn new() -> ShipyardResult<Self> {
        let dir = dirs::data_local_dir()
            .ok_or_else(|| ShipyardError::Internal("Could not determine data directory".to_string()))?
            .join("shipyard")
            .join("contexts");
        Ok(Self::with_staging_root(dir))
    }

    /// Create an engine staging host directories under `staging_root`
    pub fn with_staging_root(staging_root: PathBuf) -> Self {
        Self { staging_root }
    }

    /// Check if Podman is installed
    async fn podman_installed() -> bool {
        Command::new("podman")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Execute a Podman command and return the output
    async fn exec_podman(&self, args: &[&str]) -> ShipyardResult<std::process::Output> {
        debug!("Executing: podman {:?}", args);

        Command::new("podman")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ShipyardError::command_failed(format!("podman {:?}", args), e))
    }

    /// Execute a Podman command that must succeed, returning trimmed stdout
    async fn podman_checked(&self, args: &[&str]) -> ShipyardResult<String> {
        let output = self.exec_podman(args).await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ShipyardError::command_exec(
                format!("podman {}", args.join(" ")),
                stderr,
            ))
        }
    }

    /// Check if image exists locally
    async fn image_exists(&self, image: &str) -> ShipyardResult<bool> {
        let output = self.exec_podman(&["image", "exists", image]).await?;
        Ok(output.status.success())
    }

    /// Pull an image unless it is already present
    async fn ensure_image(&self, image: &str) -> ShipyardResult<()> {
        if self.image_exists(image).await? {
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let output = self.exec_podman(&["pull", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ShipyardError::ImagePull {
                image: image.to_string(),
                reason: stderr.to_string(),
            })
        }
    }

    /// Remove a container, ignoring failures
    async fn remove_container(&self, name: &str) {
        if let Err(e) = self.exec_podman(&["rm", "-f", name]).await {
            debug!("Failed to remove container {}: {}", name, e);
        }
    }

    fn container_name(purpose: &str) -> String {
        format!("shipyard-{}-{}", purpose, uuid::Uuid::new_v4())
    }

    /// Fresh staging directory for one attach
    async fn staging_dir(&self) -> ShipyardResult<PathBuf> {
        let dir = self.staging_root.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ShipyardError::io(format!("creating staging directory {}", dir.display()), e))?;
        Ok(dir)
    }

    /// Copy the directory at `path` out of `reference` into `dest`
    async fn extract_from_image(&self, reference: &str, path: &str, dest: &Path) -> ShipyardResult<()> {
        self.ensure_image(reference).await?;

        let name = Self::container_name("extract");
        self.podman_checked(&["create", "--name", &name, reference, "sh"])
            .await?;

        let src = format!("{}:{}", name, path);
        let dest = dest.to_string_lossy();
        let result = self.podman_checked(&["cp", &src, &dest]).await;
        self.remove_container(&name).await;
        result.map(|_| ())
    }

    /// Copy the contents of host `dir` into a snapshot of `image` at `target`
    async fn commit_directory(&self, image: &str, dir: &Path, target: &str) -> ShipyardResult<String> {
        let name = Self::container_name("attach");
        self.podman_checked(&["create", "--name", &name, image, "sh"])
            .await?;

        let src = format!("{}/.", dir.display());
        let dest = format!("{}:{}", name, target);
        let result = match self.podman_checked(&["cp", &src, &dest]).await {
            Ok(_) => self.podman_checked(&["commit", "--quiet", &name]).await,
            Err(e) => Err(e),
        };
        self.remove_container(&name).await;
        result.map(|id| last_line(&id))
    }

    /// Materialise the source into a staging directory and commit it
    async fn attach(&self, state: &ImageState, source: &DirectorySource, target: &str) -> ShipyardResult<String> {
        let staging = self.staging_dir().await?;

        let result: ShipyardResult<String> = async {
            let content = match source {
                DirectorySource::Host(ctx) => {
                    let fingerprint = ctx.fingerprint();
                    let ctx = ctx.clone();
                    let dest = staging.clone();
                    let copied = tokio::task::spawn_blocking(move || copy_filtered(&ctx, &dest))
                        .await
                        .map_err(|e| ShipyardError::Internal(format!("context copy task failed: {}", e)))??;
                    debug!("Staged {} files from {} ({})", copied, source, fingerprint);
                    staging.clone()
                }
                DirectorySource::Image { reference, path } => {
                    let dest = staging.join("extracted");
                    self.extract_from_image(reference, path, &dest).await?;
                    dest
                }
            };
            self.commit_directory(&state.image, &content, target).await
        }
        .await;

        // Clean up staging directory (best-effort)
        let _ = tokio::fs::remove_dir_all(&staging).await;

        result
    }

    async fn volume_exists(&self, name: &str) -> ShipyardResult<bool> {
        let output = self.exec_podman(&["volume", "exists", name]).await?;
        Ok(output.status.success())
    }

    async fn volume_create(&self, volume: &CacheVolume) -> ShipyardResult<()> {
        let mut labels: Vec<(String, String)> = volume.labels().into_iter().collect();
        labels.sort();

        let mut args = vec!["volume".to_string(), "create".to_string()];
        for (k, v) in labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", k, v));
        }
        args.push(volume.volume_name.clone());

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec_podman(&args_refs).await?;

        if output.status.success() {
            info!("Created cache volume: {}", volume.volume_name);
            Ok(())
        } else {
            Err(ShipyardError::CacheVolumeCreate {
                name: volume.volume_name.clone(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

/// `podman run` arguments for `argv` in the state's workdir, mounts and env
fn run_args(flags: &[&str], state: &ImageState, argv: &[String]) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    args.extend(flags.iter().map(|f| f.to_string()));
    args.push("-w".to_string());
    args.push(state.workdir.clone());

    for mount in &state.mounts {
        args.push("-v".to_string());
        args.push(mount.volume_arg());
    }

    for pair in state.env_pairs() {
        args.push("-e".to_string());
        args.push(pair);
    }

    args.push(state.image.clone());
    args.extend(argv.iter().cloned());
    args
}

fn exec_output(output: &std::process::Output) -> ExecOutput {
    ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

fn last_line(s: &str) -> String {
    s.lines().last().unwrap_or_default().trim().to_string()
}

/// Copy every file admitted by `ctx` into `dest`, preserving layout
fn copy_filtered(ctx: &BuildContext, dest: &Path) -> ShipyardResult<usize> {
    if !ctx.source.is_dir() {
        return Err(ShipyardError::io(
            format!("reading context {}", ctx.source.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "source directory not found"),
        ));
    }

    let root = ctx.source.as_path();
    let walker = WalkDir::new(root).min_depth(1).into_iter().filter_entry(|entry| {
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        !(entry.file_type().is_dir() && ctx.prunes(rel))
    });

    let mut copied = 0;
    for entry in walker {
        let entry = entry.map_err(|e| {
            let context = format!("walking {}", root.display());
            match e.into_io_error() {
                Some(io) => ShipyardError::io(context, io),
                None => ShipyardError::Internal(context),
            }
        })?;

        if entry.file_type().is_dir() {
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !ctx.admits(rel) {
            continue;
        }

        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ShipyardError::io(format!("creating {}", parent.display()), e))?;
        }

        if entry.path_is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .map_err(|e| ShipyardError::io(format!("copying {}", entry.path().display()), e))?;
        }
        copied += 1;
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> ShipyardResult<()> {
    let link = std::fs::read_link(src)
        .map_err(|e| ShipyardError::io(format!("reading link {}", src.display()), e))?;
    std::os::unix::fs::symlink(&link, dest)
        .map_err(|e| ShipyardError::io(format!("creating link {}", dest.display()), e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> ShipyardResult<()> {
    std::fs::copy(src, dest)
        .map(|_| ())
        .map_err(|e| ShipyardError::io(format!("copying {}", src.display()), e))
}

#[async_trait]
impl ExecutionEngine for PodmanEngine {
    async fn from_image(&self, reference: &str) -> ShipyardResult<ImageState> {
        if !Self::podman_installed().await {
            return Err(ShipyardError::PodmanNotFound);
        }
        self.ensure_image(reference).await?;
        Ok(ImageState::new(reference))
    }

    async fn with_directory(
        &self,
        state: &ImageState,
        source: &DirectorySource,
        target: &str,
    ) -> ShipyardResult<ImageState> {
        let image = self.attach(state, source, target).await?;
        debug!("Attached {} at {} -> {}", source, target, image);
        Ok(state.with_image(image))
    }

    async fn with_mounted_cache(
        &self,
        state: &ImageState,
        volume: &CacheVolume,
        target: &str,
    ) -> ShipyardResult<ImageState> {
        if !self.volume_exists(&volume.volume_name).await? {
            self.volume_create(volume).await?;
        } else {
            debug!("Reusing cache volume: {}", volume.volume_name);
        }
        Ok(state.with_mount(volume.clone(), target))
    }

    async fn exec(&self, state: &ImageState, argv: &[String]) -> ShipyardResult<ExecResult> {
        let name = Self::container_name("step");
        let args = run_args(&["--name", &name], state, argv);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = match self.exec_podman(&args_refs).await {
            Ok(output) => output,
            Err(e) => {
                self.remove_container(&name).await;
                return Err(e);
            }
        };

        let output = exec_output(&output);

        let next = if output.success() {
            let committed = self.podman_checked(&["commit", "--quiet", &name]).await;
            self.remove_container(&name).await;
            state.with_image(last_line(&committed?))
        } else {
            self.remove_container(&name).await;
            state.clone()
        };

        Ok(ExecResult { output, state: next })
    }

    async fn check(&self, state: &ImageState, argv: &[String]) -> ShipyardResult<ExecOutput> {
        let args = run_args(&["--rm"], state, argv);
        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec_podman(&args_refs).await?;
        Ok(exec_output(&output))
    }

    async fn cache_exists(&self, volume: &CacheVolume) -> ShipyardResult<bool> {
        self.volume_exists(&volume.volume_name).await
    }

    fn engine_name(&self) -> &'static str {
        "Podman"
    }
}
