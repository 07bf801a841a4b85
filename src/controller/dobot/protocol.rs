//! Dobot serial packet framing
//!
//! ```text
//! 0xAA 0xAA | len | id | ctrl | params... | checksum
//! ```
//!
//! `len` counts `id`, `ctrl` and the params. `ctrl` bit 0 marks a write,
//! bit 1 asks the controller to queue the command instead of running it
//! immediately. The checksum is the two's complement of the byte sum of
//! `id`, `ctrl` and the params. Numbers are little-endian.

use crate::controller::ControllerError;

pub const HEADER: [u8; 2] = [0xAA, 0xAA];
/// Params longer than this do not fit the one-byte length field.
pub const MAX_PARAMS: usize = u8::MAX as usize - 2;

pub mod id {
    pub const GET_POSE: u8 = 10;
    pub const CLEAR_ALL_ALARMS: u8 = 20;
    pub const HOME_PARAMS: u8 = 30;
    pub const HOME_CMD: u8 = 31;
    pub const END_EFFECTOR_GRIPPER: u8 = 63;
    pub const PTP_COMMON_PARAMS: u8 = 83;
    pub const PTP_CMD: u8 = 84;
    pub const WAIT_CMD: u8 = 110;
    pub const IO_DO: u8 = 131;
    pub const QUEUED_START_EXEC: u8 = 240;
    pub const QUEUED_STOP_EXEC: u8 = 241;
    pub const QUEUED_CLEAR: u8 = 245;
    pub const QUEUED_CURRENT_INDEX: u8 = 246;
}

/// PTP modes addressed by cartesian target.
pub mod ptp_mode {
    pub const JUMP_XYZ: u8 = 0;
    pub const MOVJ_XYZ: u8 = 1;
    pub const MOVL_XYZ: u8 = 2;
}

const CTRL_WRITE: u8 = 0x01;
const CTRL_QUEUED: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub write: bool,
    pub queued: bool,
    pub params: Vec<u8>,
}

impl Packet {
    pub fn read(id: u8) -> Self {
        Self { id, write: false, queued: false, params: Vec::new() }
    }

    pub fn write(id: u8, params: Vec<u8>) -> Self {
        Self { id, write: true, queued: false, params }
    }

    pub fn queued(id: u8, params: Vec<u8>) -> Self {
        Self { id, write: true, queued: true, params }
    }

    fn ctrl(&self) -> u8 {
        let mut ctrl = 0;
        if self.write {
            ctrl |= CTRL_WRITE;
        }
        if self.queued {
            ctrl |= CTRL_QUEUED;
        }
        ctrl
    }

    pub fn encode(&self) -> Result<Vec<u8>, ControllerError> {
        if self.params.len() > MAX_PARAMS {
            return Err(ControllerError::Protocol(format!(
                "params too long for command {}: {} bytes",
                self.id,
                self.params.len()
            )));
        }
        let ctrl = self.ctrl();
        let mut frame = Vec::with_capacity(self.params.len() + 6);
        frame.extend_from_slice(&HEADER);
        frame.push(self.params.len() as u8 + 2);
        frame.push(self.id);
        frame.push(ctrl);
        frame.extend_from_slice(&self.params);
        frame.push(checksum(self.id, ctrl, &self.params));
        Ok(frame)
    }

    /// Builds a packet from the bytes following the length field.
    pub fn decode_payload(payload: &[u8], received_checksum: u8) -> Result<Self, ControllerError> {
        let [id, ctrl, params @ ..] = payload else {
            return Err(ControllerError::Protocol(format!(
                "payload too short: {} bytes",
                payload.len()
            )));
        };
        let expected = checksum(*id, *ctrl, params);
        if expected != received_checksum {
            return Err(ControllerError::Protocol(format!(
                "bad checksum for command {}: expected {:#04x}, got {:#04x}",
                id, expected, received_checksum
            )));
        }
        Ok(Self {
            id: *id,
            write: ctrl & CTRL_WRITE != 0,
            queued: ctrl & CTRL_QUEUED != 0,
            params: params.to_vec(),
        })
    }

    /// The queue index carried by a queued command's response.
    pub fn queue_index(&self) -> Result<u64, ControllerError> {
        ParamReader::new(&self.params).u64()
    }
}

pub fn checksum(id: u8, ctrl: u8, params: &[u8]) -> u8 {
    let sum = params
        .iter()
        .fold(id.wrapping_add(ctrl), |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Little-endian param builder.
#[derive(Debug, Default)]
pub struct Params(Vec<u8>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(mut self, v: f32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

/// Little-endian param reader.
pub struct ParamReader<'a> {
    bytes: &'a [u8],
}

impl<'a> ParamReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ControllerError> {
        let Some((head, rest)) = self.bytes.split_first_chunk::<N>() else {
            return Err(ControllerError::Protocol(format!(
                "response too short: wanted {} more bytes, have {}",
                N,
                self.bytes.len()
            )));
        };
        self.bytes = rest;
        Ok(*head)
    }

    pub fn u64(&mut self) -> Result<u64, ControllerError> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    pub fn f32(&mut self) -> Result<f32, ControllerError> {
        Ok(f32::from_le_bytes(self.take::<4>()?))
    }
}
