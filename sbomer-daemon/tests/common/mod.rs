//! Recording pipeline for lifecycle tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sbomer_core::error::{PipelineError, SbomerError};
use sbomer_core::pipeline::{HealthStatus, Pipeline};
use sbomer_daemon::modules::ModuleHandle;

/// Shared `"<name>:<event>"` log across pipelines.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub struct RecordingPipeline {
    name: String,
    log: EventLog,
    running: bool,
    fail_start: bool,
    fail_stop: bool,
    health: HealthStatus,
}

impl RecordingPipeline {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_owned(),
            log: Arc::clone(log),
            running: false,
            fail_start: false,
            fail_stop: false,
            health: HealthStatus::Healthy,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn into_handle(self) -> ModuleHandle {
        ModuleHandle::new(self.name.clone(), Box::new(self))
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(format!("{}:{event}", self.name));
    }
}

impl Pipeline for RecordingPipeline {
    async fn start(&mut self) -> Result<(), SbomerError> {
        if self.fail_start {
            self.record("start-failed");
            return Err(PipelineError::InitFailed("boom".to_owned()).into());
        }
        if self.running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.running = true;
        self.record("start");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SbomerError> {
        if !self.running {
            return Err(PipelineError::NotRunning.into());
        }
        self.running = false;
        self.record("stop");
        if self.fail_stop {
            return Err(PipelineError::InitFailed("stuck".to_owned()).into());
        }
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.running {
            self.health.clone()
        } else {
            HealthStatus::Unhealthy("not running".to_owned())
        }
    }
}
