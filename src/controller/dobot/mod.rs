// src/controller/dobot/mod.rs - Serial driver for Dobot-protocol arm controllers
pub mod protocol;

use crate::controller::{Controller, ControllerError};
use crate::operation::{MoveMode, Pose, QueueIndex, ToolState};
use async_trait::async_trait;
use protocol::{id, ptp_mode, Packet, ParamReader, Params, HEADER};
use serial2_tokio::SerialPort;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::time::timeout;

/// Calibration and link settings for a Dobot controller.
#[derive(Debug, Clone)]
pub struct DobotOptions {
    pub response_timeout: Duration,
    /// Gripper level that turns the applicator on.
    pub tool_on_level: bool,
    /// Feed rate mapped to 100% PTP velocity.
    pub max_feed_rate: f64,
}

impl Default for DobotOptions {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(1000),
            tool_on_level: false,
            max_feed_rate: 6000.0,
        }
    }
}

/// Request/response driver over a serial link.
pub struct DobotController {
    port: Option<SerialPort>,
    port_name: String,
    options: DobotOptions,
}

impl DobotController {
    /// Opens the serial port, mapping the OS error to the vendor connect status.
    pub async fn connect(port_name: &str, baud: u32, options: DobotOptions) -> Result<Self, ControllerError> {
        tracing::info!("Connecting to controller on {} at {} baud", port_name, baud);

        let port = SerialPort::open(port_name, baud).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ControllerError::NotFound(port_name.to_string()),
            ErrorKind::ResourceBusy | ErrorKind::PermissionDenied => {
                ControllerError::Occupied(port_name.to_string())
            }
            _ => ControllerError::Io(e),
        })?;

        tracing::info!("Connected to controller on {}", port_name);
        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
            options,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    async fn request(&mut self, packet: Packet) -> Result<Packet, ControllerError> {
        let frame = packet.encode()?;
        let port = self.port.as_ref().ok_or(ControllerError::Disconnected)?;

        tracing::trace!("Serial TX: {:02X?}", frame);
        write_all(port, &frame).await?;

        let response = timeout(self.options.response_timeout, read_packet(port))
            .await
            .map_err(|_| ControllerError::Timeout(self.options.response_timeout))??;
        tracing::trace!("Serial RX: id={} params={:02X?}", response.id, response.params);

        if response.id != packet.id {
            return Err(ControllerError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, packet.id
            )));
        }
        Ok(response)
    }

    async fn queued(&mut self, command: u8, params: Vec<u8>) -> Result<QueueIndex, ControllerError> {
        let response = self.request(Packet::queued(command, params)).await?;
        Ok(QueueIndex(response.queue_index()?))
    }

    async fn immediate(&mut self, command: u8, params: Vec<u8>) -> Result<(), ControllerError> {
        self.request(Packet::write(command, params)).await.map(|_| ())
    }

    fn velocity_ratio(&self, units_per_min: f64) -> f32 {
        (units_per_min / self.options.max_feed_rate * 100.0).clamp(1.0, 100.0) as f32
    }
}

async fn write_all(port: &SerialPort, mut buf: &[u8]) -> Result<(), ControllerError> {
    while !buf.is_empty() {
        let written = port.write(buf).await?;
        if written == 0 {
            return Err(ControllerError::Disconnected);
        }
        buf = &buf[written..];
    }
    Ok(())
}

async fn read_exact(port: &SerialPort, buf: &mut [u8]) -> Result<(), ControllerError> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = port.read(&mut buf[filled..]).await?;
        if read == 0 {
            return Err(ControllerError::Disconnected);
        }
        filled += read;
    }
    Ok(())
}

async fn read_packet(port: &SerialPort) -> Result<Packet, ControllerError> {
    // Resync on the two-byte header, dropping any line noise before it
    let mut matched = 0;
    let mut byte = [0u8; 1];
    while matched < HEADER.len() {
        read_exact(port, &mut byte).await?;
        if byte[0] == HEADER[matched] {
            matched += 1;
        } else if byte[0] == HEADER[0] {
            matched = 1;
        } else {
            matched = 0;
        }
    }

    read_exact(port, &mut byte).await?;
    let len = byte[0] as usize;
    let mut payload = vec![0u8; len];
    read_exact(port, &mut payload).await?;
    read_exact(port, &mut byte).await?;
    Packet::decode_payload(&payload, byte[0])
}

#[async_trait]
impl Controller for DobotController {
    async fn clear_alarms(&mut self) -> Result<(), ControllerError> {
        self.immediate(id::CLEAR_ALL_ALARMS, Vec::new()).await
    }

    async fn enqueue_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        mode: MoveMode,
    ) -> Result<QueueIndex, ControllerError> {
        let mode = match mode {
            MoveMode::Linear => ptp_mode::MOVL_XYZ,
            MoveMode::Joint => ptp_mode::MOVJ_XYZ,
            MoveMode::Jump => ptp_mode::JUMP_XYZ,
        };
        let params = Params::new()
            .u8(mode)
            .f32(x as f32)
            .f32(y as f32)
            .f32(z as f32)
            .f32(0.0)
            .build();
        self.queued(id::PTP_CMD, params).await
    }

    async fn enqueue_wait(&mut self, duration_ms: u32) -> Result<QueueIndex, ControllerError> {
        self.queued(id::WAIT_CMD, Params::new().u32(duration_ms).build()).await
    }

    async fn enqueue_digital_output(&mut self, port: u8, level: bool) -> Result<QueueIndex, ControllerError> {
        let params = Params::new().u8(port).u8(u8::from(level)).build();
        self.queued(id::IO_DO, params).await
    }

    async fn enqueue_tool_state(&mut self, state: ToolState) -> Result<QueueIndex, ControllerError> {
        let level = match state {
            ToolState::On => self.options.tool_on_level,
            ToolState::Off => !self.options.tool_on_level,
        };
        let params = Params::new().u8(1).u8(u8::from(level)).build();
        self.queued(id::END_EFFECTOR_GRIPPER, params).await
    }

    async fn enqueue_feedrate(&mut self, units_per_min: f64) -> Result<QueueIndex, ControllerError> {
        let ratio = self.velocity_ratio(units_per_min);
        let params = Params::new().f32(ratio).f32(ratio).build();
        self.queued(id::PTP_COMMON_PARAMS, params).await
    }

    async fn enqueue_home(&mut self) -> Result<QueueIndex, ControllerError> {
        self.queued(id::HOME_CMD, Params::new().u32(0).build()).await
    }

    async fn set_home_params(&mut self, pose: Pose) -> Result<(), ControllerError> {
        let params = Params::new()
            .f32(pose.x as f32)
            .f32(pose.y as f32)
            .f32(pose.z as f32)
            .f32(pose.r as f32)
            .build();
        self.immediate(id::HOME_PARAMS, params).await
    }

    async fn start_execution(&mut self) -> Result<(), ControllerError> {
        self.immediate(id::QUEUED_START_EXEC, Vec::new()).await
    }

    async fn stop_execution(&mut self) -> Result<(), ControllerError> {
        self.immediate(id::QUEUED_STOP_EXEC, Vec::new()).await
    }

    async fn clear_queue(&mut self) -> Result<(), ControllerError> {
        self.immediate(id::QUEUED_CLEAR, Vec::new()).await
    }

    async fn current_execution_index(&mut self) -> Result<QueueIndex, ControllerError> {
        let response = self.request(Packet::read(id::QUEUED_CURRENT_INDEX)).await?;
        Ok(QueueIndex(ParamReader::new(&response.params).u64()?))
    }

    async fn pose(&mut self) -> Result<Pose, ControllerError> {
        let response = self.request(Packet::read(id::GET_POSE)).await?;
        let mut reader = ParamReader::new(&response.params);
        Ok(Pose::new(
            reader.f32()? as f64,
            reader.f32()? as f64,
            reader.f32()? as f64,
            reader.f32()? as f64,
        ))
    }

    async fn disconnect(&mut self) -> Result<(), ControllerError> {
        if self.port.take().is_some() {
            tracing::info!("Disconnected from controller on {}", self.port_name);
        }
        Ok(())
    }
}
