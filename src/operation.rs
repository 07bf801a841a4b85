// src/operation.rs - Device operation vocabulary
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single device operation, produced by the translator and consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Move { x: f64, y: f64, z: f64 },
    ToolOn,
    ToolOff,
    /// Final applicator shutoff, always the last operation of a job queue.
    ToolDisable,
    Wait { duration_ms: u32 },
    SetFeedrate { units_per_min: f64 },
    SetDigitalOutput { port: u8, level: bool },
    Home,
}

impl Operation {
    pub fn is_move(&self) -> bool {
        matches!(self, Operation::Move { .. })
    }

    /// Whether this operation lifts the pen when replaying a job.
    pub fn lifts_pen(&self) -> bool {
        matches!(
            self,
            Operation::Wait { .. } | Operation::ToolOff | Operation::ToolDisable
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Move { x, y, z } => write!(f, "<MOVE x={} y={} z={}>", x, y, z),
            Operation::ToolOn => write!(f, "<TOOL_ON>"),
            Operation::ToolOff => write!(f, "<TOOL_OFF>"),
            Operation::ToolDisable => write!(f, "<TOOL_DISABLE>"),
            Operation::Wait { duration_ms } => write!(f, "<WAIT ms={}>", duration_ms),
            Operation::SetFeedrate { units_per_min } => write!(f, "<FEEDRATE feed={}>", units_per_min),
            Operation::SetDigitalOutput { port, level } => {
                write!(f, "<SETIO port={} level={}>", port, u8::from(*level))
            }
            Operation::Home => write!(f, "<HOME>"),
        }
    }
}

/// An ordered operation sequence for one job.
///
/// Always terminated by exactly one [`Operation::ToolDisable`], so the
/// applicator is off when the queue drains no matter what the source said.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandQueue {
    ops: Vec<Operation>,
}

impl CommandQueue {
    /// Builds a queue from `ops` and appends the terminating `ToolDisable`.
    pub fn from_ops(ops: Vec<Operation>) -> Self {
        let mut ops = ops;
        ops.push(Operation::ToolDisable);
        Self { ops }
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn move_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_move()).count()
    }
}

impl AsRef<[Operation]> for CommandQueue {
    fn as_ref(&self) -> &[Operation] {
        &self.ops
    }
}

/// Index the controller assigns to every accepted queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct QueueIndex(pub u64);

impl fmt::Display for QueueIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Spatial snapshot reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub r: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, r: f64) -> Self {
        Self { x, y, z, r }
    }
}

/// Point-to-point interpolation used for queued moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveMode {
    /// Straight line in cartesian space.
    #[default]
    Linear,
    /// Joint-interpolated move to a cartesian target.
    Joint,
    /// Lift, travel, lower.
    Jump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    On,
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_always_terminated() {
        let queue = CommandQueue::from_ops(Vec::new());
        assert_eq!(queue.ops(), &[Operation::ToolDisable]);

        let queue = CommandQueue::from_ops(vec![Operation::ToolOn, Operation::ToolDisable]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.ops().last(), Some(&Operation::ToolDisable));
    }

    #[test]
    fn operations_deserialize_from_toml_tables() {
        #[derive(Deserialize)]
        struct Routine {
            ops: Vec<Operation>,
        }
        let routine: Routine = toml::from_str(
            r#"
            [[ops]]
            op = "set_digital_output"
            port = 17
            level = true

            [[ops]]
            op = "wait"
            duration_ms = 300

            [[ops]]
            op = "move"
            x = 1.0
            y = 2.0
            z = 3.0
            "#,
        )
        .unwrap();
        assert_eq!(
            routine.ops,
            vec![
                Operation::SetDigitalOutput { port: 17, level: true },
                Operation::Wait { duration_ms: 300 },
                Operation::Move { x: 1.0, y: 2.0, z: 3.0 },
            ]
        );
    }

    #[test]
    fn display_matches_log_format() {
        assert_eq!(Operation::Wait { duration_ms: 500 }.to_string(), "<WAIT ms=500>");
        assert_eq!(
            Operation::SetDigitalOutput { port: 17, level: false }.to_string(),
            "<SETIO port=17 level=0>"
        );
    }
}
