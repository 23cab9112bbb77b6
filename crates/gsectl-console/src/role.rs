//! Device roles.
//!
//! A connection serves exactly one device in exactly one direction. The role
//! picks the frame schema and the registry bucket.

use std::fmt;
use std::str::FromStr;

use gsectl_frame::{Schema, ECU_COMMAND, ECU_TELEMETRY, GSE_COMMAND, GSE_TELEMETRY};
use serde::Serialize;

use crate::request::ParseError;

/// Remote device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Ground support equipment.
    Gse,
    /// Engine control unit.
    Ecu,
}

impl Device {
    pub const ALL: [Device; 2] = [Device::Gse, Device::Ecu];

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Gse => "gse",
            Device::Ecu => "ecu",
        }
    }

    /// Layout of frames this device streams to us.
    pub fn telemetry_schema(self) -> &'static Schema {
        match self {
            Device::Gse => &GSE_TELEMETRY,
            Device::Ecu => &ECU_TELEMETRY,
        }
    }

    /// Layout of frames we send to this device.
    pub fn command_schema(self) -> &'static Schema {
        match self {
            Device::Gse => &GSE_COMMAND,
            Device::Ecu => &ECU_COMMAND,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gse" => Ok(Device::Gse),
            "ecu" => Ok(Device::Ecu),
            _ => Err(ParseError::InvalidDevice(s.to_string())),
        }
    }
}

/// Which way frames flow on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Device → console (`input add`).
    Telemetry,
    /// Console → device (`output add`).
    Command,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Telemetry => "telemetry",
            Direction::Command => "command",
        })
    }
}

/// Device × direction tag carried by every registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Role {
    pub device: Device,
    pub direction: Direction,
}

impl Role {
    pub const fn telemetry(device: Device) -> Self {
        Self {
            device,
            direction: Direction::Telemetry,
        }
    }

    pub const fn command(device: Device) -> Self {
        Self {
            device,
            direction: Direction::Command,
        }
    }

    /// Frame layout used on this connection.
    pub fn schema(&self) -> &'static Schema {
        match self.direction {
            Direction::Telemetry => self.device.telemetry_schema(),
            Direction::Command => self.device.command_schema(),
        }
    }

    pub fn is_readable(&self) -> bool {
        self.direction == Direction::Telemetry
    }

    pub fn is_writable(&self) -> bool {
        self.direction == Direction::Command
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.device, self.direction)
    }
}
