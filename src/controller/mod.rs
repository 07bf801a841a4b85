// src/controller/mod.rs - Controller abstraction over the arm's queued command interface
pub mod dobot;
pub mod sim;

use crate::operation::{MoveMode, Pose, QueueIndex, ToolState};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use dobot::{DobotController, DobotOptions};
pub use sim::{SimController, SimEvent};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller not found on {0}")]
    NotFound(String),
    #[error("Controller on {0} is occupied by another process")]
    Occupied(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No response from controller within {0:?}")]
    Timeout(Duration),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Controller queue overflow (capacity {capacity})")]
    BufferOverflow { capacity: usize },
    #[error("Controller disconnected")]
    Disconnected,
}

/// Primitives of an arm controller with an onboard, index-tracked command queue.
///
/// Every `enqueue_*` call returns the queue index the controller assigned to the
/// command. Queued commands only run between `start_execution` and
/// `stop_execution`.
#[async_trait]
pub trait Controller: Send {
    async fn clear_alarms(&mut self) -> Result<(), ControllerError>;

    async fn enqueue_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        mode: MoveMode,
    ) -> Result<QueueIndex, ControllerError>;
    async fn enqueue_wait(&mut self, duration_ms: u32) -> Result<QueueIndex, ControllerError>;
    async fn enqueue_digital_output(&mut self, port: u8, level: bool) -> Result<QueueIndex, ControllerError>;
    async fn enqueue_tool_state(&mut self, state: ToolState) -> Result<QueueIndex, ControllerError>;
    async fn enqueue_feedrate(&mut self, units_per_min: f64) -> Result<QueueIndex, ControllerError>;
    async fn enqueue_home(&mut self) -> Result<QueueIndex, ControllerError>;

    async fn set_home_params(&mut self, pose: Pose) -> Result<(), ControllerError>;

    async fn start_execution(&mut self) -> Result<(), ControllerError>;
    async fn stop_execution(&mut self) -> Result<(), ControllerError>;
    async fn clear_queue(&mut self) -> Result<(), ControllerError>;

    /// Index of the command the controller is currently executing.
    async fn current_execution_index(&mut self) -> Result<QueueIndex, ControllerError>;
    async fn pose(&mut self) -> Result<Pose, ControllerError>;

    async fn disconnect(&mut self) -> Result<(), ControllerError>;
}

#[async_trait]
impl<C: Controller + ?Sized> Controller for Box<C> {
    async fn clear_alarms(&mut self) -> Result<(), ControllerError> {
        (**self).clear_alarms().await
    }
    async fn enqueue_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        mode: MoveMode,
    ) -> Result<QueueIndex, ControllerError> {
        (**self).enqueue_move(x, y, z, mode).await
    }
    async fn enqueue_wait(&mut self, duration_ms: u32) -> Result<QueueIndex, ControllerError> {
        (**self).enqueue_wait(duration_ms).await
    }
    async fn enqueue_digital_output(&mut self, port: u8, level: bool) -> Result<QueueIndex, ControllerError> {
        (**self).enqueue_digital_output(port, level).await
    }
    async fn enqueue_tool_state(&mut self, state: ToolState) -> Result<QueueIndex, ControllerError> {
        (**self).enqueue_tool_state(state).await
    }
    async fn enqueue_feedrate(&mut self, units_per_min: f64) -> Result<QueueIndex, ControllerError> {
        (**self).enqueue_feedrate(units_per_min).await
    }
    async fn enqueue_home(&mut self) -> Result<QueueIndex, ControllerError> {
        (**self).enqueue_home().await
    }
    async fn set_home_params(&mut self, pose: Pose) -> Result<(), ControllerError> {
        (**self).set_home_params(pose).await
    }
    async fn start_execution(&mut self) -> Result<(), ControllerError> {
        (**self).start_execution().await
    }
    async fn stop_execution(&mut self) -> Result<(), ControllerError> {
        (**self).stop_execution().await
    }
    async fn clear_queue(&mut self) -> Result<(), ControllerError> {
        (**self).clear_queue().await
    }
    async fn current_execution_index(&mut self) -> Result<QueueIndex, ControllerError> {
        (**self).current_execution_index().await
    }
    async fn pose(&mut self) -> Result<Pose, ControllerError> {
        (**self).pose().await
    }
    async fn disconnect(&mut self) -> Result<(), ControllerError> {
        (**self).disconnect().await
    }
}
