//! Drives a desktop robot arm to plot G-code onto a surface with a switchable
//! applicator.
//!
//! G-code is translated into an [`operation::CommandQueue`], then fed to the
//! arm's controller in bounded batches by [`dispatch::Dispatcher`] so its small
//! onboard queue never overflows.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod gcode;
pub mod homing;
pub mod job;
pub mod operation;
pub mod poll;
pub mod progress;

pub use config::{Config, ConfigError};
pub use controller::{Controller, ControllerError, DobotController, DobotOptions, SimController};
pub use dispatch::{DispatchError, DispatchReport, DispatchSettings, Dispatcher};
pub use gcode::{GCodeTranslator, TranslateError};
pub use homing::{HomingController, HomingError, HomingReport};
pub use job::{JobError, JobOptions, JobOutcome, PlotJob};
pub use operation::{CommandQueue, MoveMode, Operation, Pose, QueueIndex, ToolState};
pub use progress::{LogProgress, NoProgress, ProgressSink};
