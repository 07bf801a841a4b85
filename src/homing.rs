// src/homing.rs - Homing with settle detection
use crate::config::HomingConfig;
use crate::controller::{Controller, ControllerError};
use crate::operation::Pose;
use crate::poll::{PollError, Poller};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomingError {
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("Arm did not settle after {polls} pose readings ({waited:?})")]
    NotSettled { polls: usize, waited: Duration },
}

/// Result of a completed homing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingReport {
    /// Zero-based index of the pose reading that completed the stable run.
    /// The reading taken right after issuing home is poll 0.
    pub settled_at_poll: usize,
    pub pose: Pose,
    pub waited: Duration,
}

/// Drives the arm to its reference pose.
///
/// The controller has no "homing finished" signal, so completion is inferred
/// from stillness: `stable_polls` consecutive identical pose readings.
#[derive(Debug, Clone)]
pub struct HomingController {
    stable_polls: u32,
    home_pose: Option<Pose>,
    poller: Poller,
}

impl HomingController {
    pub fn new(config: &HomingConfig) -> Self {
        Self {
            stable_polls: config.stable_polls,
            home_pose: config.home_pose,
            poller: Poller::new(config.poll_interval(), config.timeout()),
        }
    }

    /// Sets the reference pose the next homing pass moves to.
    pub async fn configure<C: Controller + ?Sized>(&self, controller: &mut C) -> Result<(), HomingError> {
        if let Some(pose) = self.home_pose {
            tracing::debug!("Setting home pose to {:?}", pose);
            controller.set_home_params(pose).await?;
        }
        Ok(())
    }

    pub async fn home<C: Controller + ?Sized>(&self, controller: &mut C) -> Result<HomingReport, HomingError> {
        tracing::info!("Homing arm");
        controller.enqueue_home().await?;
        controller.start_execution().await?;

        let result = self.wait_settled(controller).await;

        // Leave the queue empty either way so the next job starts clean
        let cleanup = async {
            controller.stop_execution().await?;
            controller.clear_queue().await
        }
        .await;

        let report = result?;
        cleanup?;
        tracing::info!(
            "Done homing: settled at {:?} after {} readings",
            report.pose,
            report.settled_at_poll + 1
        );
        Ok(report)
    }

    /// Polls pose until it has stayed identical for `stable_polls` readings.
    pub async fn wait_settled<C: Controller + ?Sized>(
        &self,
        controller: &mut C,
    ) -> Result<HomingReport, HomingError> {
        let threshold = self.stable_polls;
        let mut last = controller.pose().await?;
        let mut stable = 0u32;

        let outcome = self
            .poller
            .until(async || {
                let pose = controller.pose().await?;
                if pose == last {
                    stable += 1;
                } else {
                    stable = 0;
                }
                last = pose;
                Ok::<_, ControllerError>(stable >= threshold)
            })
            .await;

        match outcome {
            Ok(polled) => Ok(HomingReport {
                settled_at_poll: polled.polls,
                pose: last,
                waited: polled.waited,
            }),
            Err(PollError::Source(e)) => Err(e.into()),
            Err(PollError::TimedOut { polls, waited }) => {
                tracing::error!("Arm did not settle within {:?}", waited);
                Err(HomingError::NotSettled { polls, waited })
            }
        }
    }
}
