// src/dispatch.rs - Batched delivery of operations to the controller queue
use crate::config::ControllerConfig;
use crate::controller::{Controller, ControllerError};
use crate::operation::{MoveMode, Operation, QueueIndex, ToolState};
use crate::poll::{PollError, Poller};
use crate::progress::{NoProgress, ProgressSink};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Chunk size {chunk_size} must be at least 1 and below the controller buffer capacity {capacity}")]
    ChunkSize { chunk_size: usize, capacity: usize },
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("Controller did not reach {to_index} within {waited:?} (last seen {last_seen})")]
    DrainTimeout {
        to_index: QueueIndex,
        last_seen: QueueIndex,
        waited: Duration,
    },
}

/// Pacing parameters for [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub chunk_size: usize,
    pub buffer_capacity: usize,
    pub poll_interval: Duration,
    pub drain_timeout: Duration,
    pub move_mode: MoveMode,
}

impl From<&ControllerConfig> for DispatchSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            buffer_capacity: config.buffer_capacity,
            poll_interval: config.poll_interval(),
            drain_timeout: config.drain_timeout(),
            move_mode: config.move_mode,
        }
    }
}

/// Summary of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub batches: usize,
    pub operations: usize,
}

/// Owns the controller and feeds it one bounded batch at a time.
///
/// A batch is submitted, executed, and fully drained before the next one is
/// submitted, so the controller never holds more than `chunk_size` commands
/// and execution order matches queue order across batch boundaries.
pub struct Dispatcher<C: Controller> {
    controller: C,
    settings: DispatchSettings,
    poller: Poller,
}

impl<C: Controller> Dispatcher<C> {
    pub fn new(controller: C, settings: DispatchSettings) -> Result<Self, DispatchError> {
        if settings.chunk_size == 0 || settings.chunk_size >= settings.buffer_capacity {
            return Err(DispatchError::ChunkSize {
                chunk_size: settings.chunk_size,
                capacity: settings.buffer_capacity,
            });
        }
        let poller = Poller::new(settings.poll_interval, settings.drain_timeout);
        Ok(Self { controller, settings, poller })
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Lends the controller to components that drive it directly, such as homing.
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn into_controller(self) -> C {
        self.controller
    }

    /// Splits `ops` into the batches [`dispatch`](Self::dispatch) would submit.
    pub fn batches<'a>(&self, ops: &'a [Operation]) -> std::slice::Chunks<'a, Operation> {
        ops.chunks(self.settings.chunk_size)
    }

    /// Runs a short fixed routine without progress reporting.
    pub async fn execute(&mut self, ops: &[Operation]) -> Result<DispatchReport, DispatchError> {
        self.dispatch(ops, &mut NoProgress).await
    }

    pub async fn dispatch(
        &mut self,
        ops: &[Operation],
        progress: &mut dyn ProgressSink,
    ) -> Result<DispatchReport, DispatchError> {
        let total_batches = ops.len().div_ceil(self.settings.chunk_size);
        tracing::debug!(
            "Dispatching {} operations in {} batches of up to {}",
            ops.len(),
            total_batches,
            self.settings.chunk_size
        );

        let mut report = DispatchReport::default();
        for (number, batch) in ops.chunks(self.settings.chunk_size).enumerate() {
            let mut to_index = QueueIndex::default();
            for op in batch {
                to_index = self.submit(op).await?;
            }
            tracing::debug!(
                "Batch {}/{}: {} operations queued up to {}",
                number + 1,
                total_batches,
                batch.len(),
                to_index
            );

            self.controller.start_execution().await?;
            self.drain(to_index).await?;
            self.controller.stop_execution().await?;
            self.controller.clear_queue().await?;

            report.batches += 1;
            report.operations += batch.len();
            progress.render(ops, report.operations);
        }
        self.controller.clear_queue().await?;

        Ok(report)
    }

    async fn submit(&mut self, op: &Operation) -> Result<QueueIndex, ControllerError> {
        let controller = &mut self.controller;
        match *op {
            Operation::Move { x, y, z } => {
                controller.enqueue_move(x, y, z, self.settings.move_mode).await
            }
            Operation::ToolOn => controller.enqueue_tool_state(ToolState::On).await,
            Operation::ToolOff | Operation::ToolDisable => {
                controller.enqueue_tool_state(ToolState::Off).await
            }
            Operation::Wait { duration_ms } => controller.enqueue_wait(duration_ms).await,
            Operation::SetFeedrate { units_per_min } => {
                controller.enqueue_feedrate(units_per_min).await
            }
            Operation::SetDigitalOutput { port, level } => {
                controller.enqueue_digital_output(port, level).await
            }
            Operation::Home => controller.enqueue_home().await,
        }
    }

    /// Blocks until the controller reports it has reached `to_index`.
    async fn drain(&mut self, to_index: QueueIndex) -> Result<(), DispatchError> {
        let poller = self.poller;
        let controller = &mut self.controller;
        let mut last_seen = QueueIndex::default();

        let outcome = poller
            .until(async || {
                let current = controller.current_execution_index().await?;
                last_seen = current;
                Ok::<_, ControllerError>(current >= to_index)
            })
            .await;

        match outcome {
            Ok(polled) => {
                tracing::trace!("Drained to {} after {} polls", to_index, polled.polls);
                Ok(())
            }
            Err(PollError::Source(e)) => Err(e.into()),
            Err(PollError::TimedOut { waited, .. }) => {
                tracing::error!(
                    "Controller stuck at {} waiting for {} after {:?}",
                    last_seen,
                    to_index,
                    waited
                );
                if let Err(e) = self.controller.stop_execution().await {
                    tracing::warn!("Failed to stop execution after drain timeout: {}", e);
                }
                Err(DispatchError::DrainTimeout { to_index, last_seen, waited })
            }
        }
    }

    /// Disconnects the controller, consuming the dispatcher.
    pub async fn shutdown(mut self) -> Result<(), ControllerError> {
        self.controller.disconnect().await
    }
}
