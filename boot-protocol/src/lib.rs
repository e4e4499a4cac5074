// SPDX-License-Identifier: MIT

//! Serial upgrade protocol shared by the bootloader and the boot manager.
//!
//! Every message on the link is an 8-byte header followed by an optional
//! payload. The same crate serves both ends: the bootloader encodes
//! responses and handles requests, a manager built on top of this crate
//! encodes requests and handles responses.

#![no_std]

pub mod crc;
pub mod frame;


use frame::Frame;

/// Maximum number of firmware bytes carried by one FLASH message.
pub const DATA_PAYLOAD_SIZE: usize = 1024;

/// Message source byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Source {
    /// Boot manager (PC side).
    Manager = 0x2B,
    /// Bootloader (embedded side).
    Loader = 0xB2,
}

impl TryFrom<u8> for Source {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            0x2B => Ok(Source::Manager),
            0xB2 => Ok(Source::Loader),
            other => Err(other),
        }
    }
}

/// Protocol command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    Connect = 0x10,
    ConnectRsp = 0x11,
    Prepare = 0x20,
    PrepareRsp = 0x21,
    Flash = 0x30,
    FlashRsp = 0x31,
    Exit = 0x40,
    ExitRsp = 0x41,
    Info = 0xA0,
    InfoRsp = 0xA1,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            0x10 => Ok(Command::Connect),
            0x11 => Ok(Command::ConnectRsp),
            0x20 => Ok(Command::Prepare),
            0x21 => Ok(Command::PrepareRsp),
            0x30 => Ok(Command::Flash),
            0x31 => Ok(Command::FlashRsp),
            0x40 => Ok(Command::Exit),
            0x41 => Ok(Command::ExitRsp),
            0xA0 => Ok(Command::Info),
            0xA1 => Ok(Command::InfoRsp),
            other => Err(other),
        }
    }
}

/// Status byte carried by every response.
///
/// This is a bitmask: independent validation predicates OR their result
/// into the same byte, so a single response can report several failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(u8);

impl Status {
    pub const OK: Status = Status(0x00);
    /// Generic pre/post validation failure.
    pub const VALIDATION: Status = Status(0x01);
    /// Command received in the wrong upgrade state.
    pub const INVALID_REQUEST: Status = Status(0x02);
    /// Flash write or readback failed.
    pub const FLASH_WRITE: Status = Status(0x04);
    /// Flash erase failed.
    pub const FLASH_ERASE: Status = Status(0x08);
    /// Declared image size above the configured maximum.
    pub const FW_SIZE: Status = Status(0x10);
    /// Declared software version outside the configured bounds.
    pub const FW_VER: Status = Status(0x20);
    /// Declared hardware version outside the configured bounds.
    pub const HW_VER: Status = Status(0x40);
    /// ECDSA verification failed.
    pub const SIGNATURE: Status = Status(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        Status(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    /// Human-readable description of the lowest set error bit.
    pub fn describe(self) -> &'static str {
        if self.is_ok() {
            "OK"
        } else if self.contains(Status::VALIDATION) {
            "ERROR - VALIDATION"
        } else if self.contains(Status::INVALID_REQUEST) {
            "ERROR - INVALID REQUEST"
        } else if self.contains(Status::FLASH_WRITE) {
            "ERROR - WRITE TO FLASH"
        } else if self.contains(Status::FLASH_ERASE) {
            "ERROR - FLASH PREPARE (ERASE)"
        } else if self.contains(Status::FW_SIZE) {
            "ERROR - FW SIZE"
        } else if self.contains(Status::FW_VER) {
            "ERROR - FW VERSION"
        } else if self.contains(Status::HW_VER) {
            "ERROR - HW VERSION"
        } else {
            "ERROR - SIGNATURE"
        }
    }
}

impl core::ops::BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for Status {
    fn bitor_assign(&mut self, rhs: Status) {
        self.0 |= rhs.0;
    }
}

/// Errors from [`encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    PayloadTooLong,
    BufferTooSmall,
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PayloadTooLong => write!(f, "payload too long for one message"),
            Self::BufferTooSmall => write!(f, "output buffer too small"),
        }
    }
}

/// Serialize one message into `out`, returning the number of bytes written.
pub fn encode(
    source: Source,
    command: Command,
    status: Status,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize, EncodeError> {
    if payload.len() > frame::PAYLOAD_MAX {
        return Err(EncodeError::PayloadTooLong);
    }
    let total = frame::WIRE_HEADER_SIZE + payload.len();
    if out.len() < total {
        return Err(EncodeError::BufferTooSmall);
    }

    let length = payload.len() as u16;
    out[0..2].copy_from_slice(&frame::PREAMBLE.to_le_bytes());
    out[2..4].copy_from_slice(&length.to_le_bytes());
    out[4] = source as u8;
    out[5] = command as u8;
    out[6] = status.bits();
    out[7] = message_crc(length, source as u8, command as u8, status.bits(), payload);
    out[8..total].copy_from_slice(payload);
    Ok(total)
}

/// Message CRC, XOR-composed from the per-field CRCs.
///
/// The composition (rather than a single pass over the concatenated bytes)
/// is part of the wire format. The preamble and the CRC byte itself are not
/// covered; an empty payload contributes nothing.
pub fn message_crc(length: u16, source: u8, command: u8, status: u8, payload: &[u8]) -> u8 {
    let mut crc = crc::crc8(&length.to_le_bytes());
    crc ^= crc::crc8(&[source]);
    crc ^= crc::crc8(&[command]);
    crc ^= crc::crc8(&[status]);
    if !payload.is_empty() {
        crc ^= crc::crc8(payload);
    }
    crc
}

/// Receive-side callbacks, one per message.
///
/// All methods default to doing nothing, so each role only implements the
/// direction it cares about: the bootloader overrides the request callbacks,
/// a boot manager overrides the response callbacks.
pub trait MessageHandler {
    fn on_connect(&mut self) {}
    fn on_connect_rsp(&mut self, _status: Status) {}
    fn on_prepare(&mut self, _header: &[u8]) {}
    fn on_prepare_rsp(&mut self, _status: Status) {}
    fn on_flash(&mut self, _data: &[u8]) {}
    fn on_flash_rsp(&mut self, _status: Status) {}
    fn on_exit(&mut self) {}
    fn on_exit_rsp(&mut self, _status: Status) {}
    fn on_info(&mut self) {}
    fn on_info_rsp(&mut self, _boot_ver: &[u8], _status: Status) {}
}

/// Errors from [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchError {
    UnknownSource(u8),
    UnknownCommand(u8),
}

/// Route one CRC-valid frame to the matching handler callback.
pub fn dispatch(frame: &Frame<'_>, handler: &mut impl MessageHandler) -> Result<(), DispatchError> {
    Source::try_from(frame.source).map_err(DispatchError::UnknownSource)?;
    let command = Command::try_from(frame.command).map_err(DispatchError::UnknownCommand)?;
    let status = Status::from_bits(frame.status);

    match command {
        Command::Connect => handler.on_connect(),
        Command::ConnectRsp => handler.on_connect_rsp(status),
        Command::Prepare => handler.on_prepare(frame.payload),
        Command::PrepareRsp => handler.on_prepare_rsp(status),
        Command::Flash => handler.on_flash(frame.payload),
        Command::FlashRsp => handler.on_flash_rsp(status),
        Command::Exit => handler.on_exit(),
        Command::ExitRsp => handler.on_exit_rsp(status),
        Command::Info => handler.on_info(),
        Command::InfoRsp => handler.on_info_rsp(frame.payload, status),
    }
    Ok(())
}
