// src/controller/sim.rs - In-process controller simulation
use crate::controller::{Controller, ControllerError};
use crate::operation::{MoveMode, Pose, QueueIndex, ToolState};
use async_trait::async_trait;
use std::collections::VecDeque;

/// A command as the simulated controller stores it in its queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Move { x: f64, y: f64, z: f64, mode: MoveMode },
    Wait(u32),
    DigitalOutput { port: u8, level: bool },
    Tool(ToolState),
    Feedrate(f64),
    Home,
}

/// Every primitive call, in the order the simulator received it.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    ClearAlarms,
    Enqueue { index: QueueIndex, command: SimCommand },
    SetHomeParams(Pose),
    Start,
    Stop,
    Clear,
    IndexQuery(QueueIndex),
    PoseQuery(Pose),
    Disconnect,
}

/// Simulated controller with a bounded onboard queue.
///
/// Execution only advances when the controller is queried (index or pose)
/// while started, by `drain_per_poll` commands per query. A `drain_per_poll`
/// of zero models a controller that never makes progress.
#[derive(Debug)]
pub struct SimController {
    capacity: usize,
    drain_per_poll: usize,
    next_index: u64,
    current: QueueIndex,
    pending: VecDeque<(QueueIndex, SimCommand)>,
    running: bool,
    connected: bool,
    poses: Vec<Pose>,
    pose_reads: usize,
    fail_at_enqueue: Option<usize>,
    enqueued: usize,
    high_water: usize,
    executed: Vec<SimCommand>,
    events: Vec<SimEvent>,
}

impl SimController {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            drain_per_poll: 1,
            next_index: 1,
            current: QueueIndex(0),
            pending: VecDeque::new(),
            running: false,
            connected: true,
            poses: Vec::new(),
            pose_reads: 0,
            fail_at_enqueue: None,
            enqueued: 0,
            high_water: 0,
            executed: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_drain_per_poll(mut self, drain_per_poll: usize) -> Self {
        self.drain_per_poll = drain_per_poll;
        self
    }

    /// Poses returned by successive `pose` calls; the last one repeats.
    pub fn with_pose_script(mut self, poses: Vec<Pose>) -> Self {
        self.poses = poses;
        self
    }

    /// Makes the n-th enqueue (zero-based) fail as if the link dropped.
    pub fn with_failure_at_enqueue(mut self, n: usize) -> Self {
        self.fail_at_enqueue = Some(n);
        self
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Commands the simulated arm has finished, in execution order.
    pub fn executed(&self) -> &[SimCommand] {
        &self.executed
    }

    /// Largest number of commands that were ever waiting in the queue at once.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn pose_reads(&self) -> usize {
        self.pose_reads
    }

    fn ensure_connected(&self) -> Result<(), ControllerError> {
        if self.connected {
            Ok(())
        } else {
            Err(ControllerError::Disconnected)
        }
    }

    fn enqueue(&mut self, command: SimCommand) -> Result<QueueIndex, ControllerError> {
        self.ensure_connected()?;
        if self.fail_at_enqueue == Some(self.enqueued) {
            self.connected = false;
            return Err(ControllerError::Disconnected);
        }
        self.enqueued += 1;
        if self.pending.len() >= self.capacity {
            return Err(ControllerError::BufferOverflow { capacity: self.capacity });
        }
        let index = QueueIndex(self.next_index);
        self.next_index += 1;
        self.pending.push_back((index, command.clone()));
        self.high_water = self.high_water.max(self.pending.len());
        self.events.push(SimEvent::Enqueue { index, command });
        Ok(index)
    }

    fn advance(&mut self) {
        if !self.running {
            return;
        }
        for _ in 0..self.drain_per_poll {
            let Some((index, command)) = self.pending.pop_front() else {
                break;
            };
            self.current = index;
            self.executed.push(command);
        }
    }
}

#[async_trait]
impl Controller for SimController {
    async fn clear_alarms(&mut self) -> Result<(), ControllerError> {
        self.ensure_connected()?;
        self.events.push(SimEvent::ClearAlarms);
        Ok(())
    }

    async fn enqueue_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        mode: MoveMode,
    ) -> Result<QueueIndex, ControllerError> {
        self.enqueue(SimCommand::Move { x, y, z, mode })
    }

    async fn enqueue_wait(&mut self, duration_ms: u32) -> Result<QueueIndex, ControllerError> {
        self.enqueue(SimCommand::Wait(duration_ms))
    }

    async fn enqueue_digital_output(&mut self, port: u8, level: bool) -> Result<QueueIndex, ControllerError> {
        self.enqueue(SimCommand::DigitalOutput { port, level })
    }

    async fn enqueue_tool_state(&mut self, state: ToolState) -> Result<QueueIndex, ControllerError> {
        self.enqueue(SimCommand::Tool(state))
    }

    async fn enqueue_feedrate(&mut self, units_per_min: f64) -> Result<QueueIndex, ControllerError> {
        self.enqueue(SimCommand::Feedrate(units_per_min))
    }

    async fn enqueue_home(&mut self) -> Result<QueueIndex, ControllerError> {
        self.enqueue(SimCommand::Home)
    }

    async fn set_home_params(&mut self, pose: Pose) -> Result<(), ControllerError> {
        self.ensure_connected()?;
        self.events.push(SimEvent::SetHomeParams(pose));
        Ok(())
    }

    async fn start_execution(&mut self) -> Result<(), ControllerError> {
        self.ensure_connected()?;
        self.running = true;
        self.events.push(SimEvent::Start);
        Ok(())
    }

    async fn stop_execution(&mut self) -> Result<(), ControllerError> {
        self.ensure_connected()?;
        self.running = false;
        self.events.push(SimEvent::Stop);
        Ok(())
    }

    async fn clear_queue(&mut self) -> Result<(), ControllerError> {
        self.ensure_connected()?;
        self.pending.clear();
        self.events.push(SimEvent::Clear);
        Ok(())
    }

    async fn current_execution_index(&mut self) -> Result<QueueIndex, ControllerError> {
        self.ensure_connected()?;
        self.advance();
        self.events.push(SimEvent::IndexQuery(self.current));
        Ok(self.current)
    }

    async fn pose(&mut self) -> Result<Pose, ControllerError> {
        self.ensure_connected()?;
        self.advance();
        let pose = self
            .poses
            .get(self.pose_reads)
            .or(self.poses.last())
            .copied()
            .unwrap_or_default();
        self.pose_reads += 1;
        self.events.push(SimEvent::PoseQuery(pose));
        Ok(pose)
    }

    async fn disconnect(&mut self) -> Result<(), ControllerError> {
        if self.connected {
            self.connected = false;
            self.events.push(SimEvent::Disconnect);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_indices_are_monotonic_across_clears() {
        let mut sim = SimController::new(4);
        let a = sim.enqueue_wait(1).await.unwrap();
        sim.clear_queue().await.unwrap();
        let b = sim.enqueue_wait(1).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_overflow_is_reported() {
        let mut sim = SimController::new(2);
        sim.enqueue_wait(1).await.unwrap();
        sim.enqueue_wait(1).await.unwrap();
        let err = sim.enqueue_wait(1).await.unwrap_err();
        assert!(matches!(err, ControllerError::BufferOverflow { capacity: 2 }));
    }

    #[tokio::test]
    async fn test_execution_needs_start() {
        let mut sim = SimController::new(4).with_drain_per_poll(2);
        sim.enqueue_wait(1).await.unwrap();
        let last = sim.enqueue_wait(2).await.unwrap();
        assert_eq!(sim.current_execution_index().await.unwrap(), QueueIndex(0));
        sim.start_execution().await.unwrap();
        assert_eq!(sim.current_execution_index().await.unwrap(), last);
        assert_eq!(sim.executed(), &[SimCommand::Wait(1), SimCommand::Wait(2)]);
    }

    #[tokio::test]
    async fn test_pose_script_repeats_last() {
        let a = Pose::new(1.0, 0.0, 0.0, 0.0);
        let b = Pose::new(2.0, 0.0, 0.0, 0.0);
        let mut sim = SimController::new(4).with_pose_script(vec![a, b]);
        assert_eq!(sim.pose().await.unwrap(), a);
        assert_eq!(sim.pose().await.unwrap(), b);
        assert_eq!(sim.pose().await.unwrap(), b);
        assert_eq!(sim.pose_reads(), 3);
    }

    #[tokio::test]
    async fn test_calls_fail_after_disconnect() {
        let mut sim = SimController::new(4);
        sim.disconnect().await.unwrap();
        assert!(matches!(sim.start_execution().await, Err(ControllerError::Disconnected)));
    }
}
