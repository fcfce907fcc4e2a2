//! Stage execution
//!
//! `Stage::apply` is the single interpreter for operation lists. Commands run
//! strictly in order and the first failure ends the stage.

use crate::cache::CacheRegistry;
use crate::engine::{ExecOutput, ExecutionEngine, ImageState};
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::operation::Operation;
use serde::Serialize;
use tracing::{debug, info};

/// A named, ordered unit of image transformation
#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub name: String,
    pub operations: Vec<Operation>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    /// Append an operation
    pub fn then(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Number of Run and Verify operations
    pub fn command_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_command()).count()
    }

    /// Run every operation against `state`, returning the resulting state.
    ///
    /// The input state is not modified; on error nothing is returned and the
    /// caller still holds the state it passed in.
    pub async fn apply(
        &self,
        engine: &dyn ExecutionEngine,
        caches: &CacheRegistry,
        state: &ImageState,
    ) -> ShipyardResult<ImageState> {
        info!(stage = %self.name, "Starting stage");

        let mut current = state.clone();
        let mut command_index = 0;

        for operation in &self.operations {
            debug!(stage = %self.name, "{}", operation);

            current = match operation {
                Operation::Attach {
                    source,
                    target,
                    set_workdir,
                } => {
                    let next = engine
                        .with_directory(&current, source, target)
                        .await
                        .map_err(|e| ShipyardError::Attach {
                            stage: self.name.clone(),
                            target: format!("{} at {}", source, target),
                            reason: e.to_string(),
                        })?;
                    if *set_workdir {
                        next.with_workdir(target.as_str())
                    } else {
                        next
                    }
                }
                Operation::MountCache { cache, target } => {
                    let volume = caches.acquire(cache);
                    engine
                        .with_mounted_cache(&current, &volume, target)
                        .await
                        .map_err(|e| ShipyardError::engine(&self.name, e))?
                }
                Operation::Run { argv } => {
                    let index = command_index;
                    command_index += 1;
                    let (next, output) = self.exec(engine, &current, argv).await?;
                    if !output.success() {
                        return Err(ShipyardError::Command {
                            stage: self.name.clone(),
                            command_index: index,
                            command: argv.join(" "),
                            exit_status: output.exit_code,
                            stderr_tail: output.tail(),
                        });
                    }
                    next
                }
                Operation::Verify(verify) => {
                    let index = command_index;
                    command_index += 1;
                    let output = engine
                        .check(&current, &verify.argv)
                        .await
                        .map_err(|e| ShipyardError::engine(&self.name, e))?;
                    if !output.success() {
                        return Err(ShipyardError::Verification {
                            stage: self.name.clone(),
                            command_index: index,
                            command: verify.argv.join(" "),
                            exit_status: output.exit_code,
                            stderr_tail: output.tail(),
                        });
                    }
                    current
                }
                Operation::Workdir { path } => current.with_workdir(path.as_str()),
                Operation::Note { message } => {
                    info!(stage = %self.name, "{}", message);
                    current
                }
            };
        }

        info!(stage = %self.name, commands = command_index, "Stage complete");
        Ok(current)
    }

    async fn exec(
        &self,
        engine: &dyn ExecutionEngine,
        state: &ImageState,
        argv: &[String],
    ) -> ShipyardResult<(ImageState, ExecOutput)> {
        let result = engine
            .exec(state, argv)
            .await
            .map_err(|e| ShipyardError::engine(&self.name, e))?;
        Ok((result.state, result.output))
    }
}
