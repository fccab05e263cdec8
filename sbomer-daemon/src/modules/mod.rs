//! Stage registry.
//!
//! Each stage is wrapped in a [`ModuleHandle`] so the daemon can drive the
//! discovery scheduler and the job processor through one [`DynPipeline`]
//! interface.

pub mod fetcher;
pub mod processor;

use sbomer_core::pipeline::DynPipeline;

use crate::health::ModuleHealth;

/// A registered stage.
pub struct ModuleHandle {
    /// Stage name for logging and health reporting.
    pub name: String,
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            pipeline,
        }
    }
}

/// Stages in start order.
///
/// Consumers are registered before producers: stages start in registration
/// order and stop in reverse, so the scheduler stops publishing before the
/// processor drains.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Starts every stage in registration order.
    ///
    /// On failure the stages already started are stopped again before the
    /// error is returned.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for index in 0..self.modules.len() {
            let handle = &mut self.modules[index];
            tracing::info!(module = %handle.name, "starting module");

            if let Err(e) = handle.pipeline.start().await {
                let failed = handle.name.clone();
                tracing::warn!(module = %failed, error = %e, "startup failed, rolling back");
                for started in self.modules[..index].iter_mut().rev() {
                    if let Err(stop_err) = started.pipeline.stop().await {
                        tracing::error!(
                            module = %started.name,
                            error = %stop_err,
                            "rollback stop failed"
                        );
                    }
                }
                return Err(anyhow::anyhow!("failed to start module '{}': {}", failed, e));
            }
            tracing::info!(module = %handle.name, "module started");
        }
        Ok(())
    }

    /// Stops every stage in reverse registration order.
    ///
    /// Keeps going past failures and reports them together.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        for handle in self.modules.iter_mut().rev() {
            tracing::info!(module = %handle.name, "stopping module");
            match handle.pipeline.stop().await {
                Ok(()) => tracing::info!(module = %handle.name, "module stopped"),
                Err(e) => {
                    tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                    errors.push(format!("{}: {}", handle.name, e));
                }
            }
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }
        Ok(())
    }

    pub async fn health_statuses(&self) -> Vec<ModuleHealth> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            statuses.push(ModuleHealth {
                name: handle.name.clone(),
                status: handle.pipeline.health_check().await,
            });
        }
        statuses
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}
