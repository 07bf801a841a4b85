// src/job.rs - End-to-end plot job: startup, optional homing and priming, plot, park, cook, finish
use crate::config::Config;
use crate::controller::{Controller, ControllerError};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::gcode::{GCodeTranslator, TranslateError};
use crate::homing::{HomingController, HomingError};
use crate::operation::Operation;
use crate::progress::ProgressSink;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Translation failed: {0}")]
    Translate(#[from] TranslateError),
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Homing failed: {0}")]
    Homing(#[from] HomingError),
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),
}

/// What the operator asked for on this run.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub file: Option<PathBuf>,
    pub home: bool,
    pub prime: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { operations: usize, batches: usize },
    /// No input file was given; pre-job steps still ran.
    NoFile,
    FileNotFound(PathBuf),
}

/// Sequences one run of the plotter against a dispatcher's controller.
#[derive(Debug, Clone)]
pub struct PlotJob {
    config: Config,
    translator: GCodeTranslator,
    homing: HomingController,
}

impl PlotJob {
    pub fn new(config: Config) -> Self {
        let translator = GCodeTranslator::new(config.translate.clone());
        let homing = HomingController::new(&config.homing);
        Self { config, translator, homing }
    }

    /// Brings the controller to a known state: empty queue, no alarms, tool off.
    pub async fn startup<C: Controller>(&self, dispatcher: &mut Dispatcher<C>) -> Result<(), JobError> {
        let controller = dispatcher.controller_mut();
        controller.clear_queue().await?;
        // Alarms left over from a previous run are cleared, never fatal
        if let Err(e) = controller.clear_alarms().await {
            tracing::warn!("Failed to clear controller alarms: {}", e);
        }
        self.homing.configure(controller).await?;
        dispatcher.execute(&[Operation::ToolOff]).await?;
        Ok(())
    }

    pub async fn run<C: Controller>(
        &self,
        dispatcher: &mut Dispatcher<C>,
        options: &JobOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<JobOutcome, JobError> {
        let span = tracing::info_span!("job", id = %uuid::Uuid::new_v4());
        self.run_inner(dispatcher, options, progress).instrument(span).await
    }

    async fn run_inner<C: Controller>(
        &self,
        dispatcher: &mut Dispatcher<C>,
        options: &JobOptions,
        progress: &mut dyn ProgressSink,
    ) -> Result<JobOutcome, JobError> {
        self.startup(dispatcher).await?;

        if options.home {
            self.homing.home(dispatcher.controller_mut()).await?;
        }

        if options.prime {
            if self.config.prime.ops.is_empty() {
                tracing::warn!("Priming requested but no [prime] routine is configured");
            } else {
                tracing::info!("Priming applicator");
                dispatcher.execute(&self.config.prime.ops).await?;
            }
        }

        let Some(path) = options.file.as_ref() else {
            tracing::warn!("Please provide a file to plot");
            return Ok(JobOutcome::NoFile);
        };

        let queue = match self.translator.translate_file(path).await {
            Ok(queue) => queue,
            Err(TranslateError::FileNotFound(path)) => {
                tracing::warn!("Input file was not found: {}", path.display());
                return Ok(JobOutcome::FileNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Plotting {} operations", queue.len());
        let report = dispatcher.dispatch(queue.ops(), progress).await?;

        if let Some([x, y, z]) = self.config.job.park {
            tracing::info!("Parking arm");
            dispatcher.execute(&[Operation::Move { x, y, z }]).await?;
        }

        if self.config.job.cook_secs > 0 {
            cook_timer(
                Duration::from_secs(self.config.job.cook_secs),
                Duration::from_secs(self.config.job.cook_report_secs),
            )
            .await;
        }

        if !self.config.finish.ops.is_empty() {
            tracing::info!("Running finish routine");
            dispatcher.execute(&self.config.finish.ops).await?;
        }

        Ok(JobOutcome::Completed {
            operations: report.operations,
            batches: report.batches,
        })
    }
}

/// Fixed dwell after the plot, logging the remaining time every `report_every`.
pub async fn cook_timer(total: Duration, report_every: Duration) {
    tracing::info!("Cook time: {:.0}s", total.as_secs_f64());
    let step = if report_every.is_zero() { total } else { report_every };
    let mut remaining = total;
    while !remaining.is_zero() {
        let wait = remaining.min(step);
        tokio::time::sleep(wait).await;
        remaining -= wait;
        if !remaining.is_zero() {
            tracing::info!("Cook time remaining: {:.0}s", remaining.as_secs_f64());
        }
    }
    tracing::info!("Cook time done");
}
