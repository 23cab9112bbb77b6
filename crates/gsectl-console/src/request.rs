//! Operator requests and the text command surface.
//!
//! ```text
//! command <gse|ecu> setall <v,v,...>       v = 0|1, one per command field
//! command <gse|ecu> set <field>=<0|1>
//! input  add <host:port> [gse|ecu]          telemetry link (default gse)
//! output add <host:port> [gse|ecu]          command link (default gse)
//! input  remove <id|host:port>
//! output remove <id|host:port>
//! status
//! shutdown | quit | exit
//! ```

use std::fmt;

use bytes::Bytes;
use gsectl_transport::Endpoint;

use crate::registry::{ConnectionId, ConnectionInfo};
use crate::role::{Device, Direction};

/// Errors in operator text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid device {0:?} (expected gse or ecu)")]
    InvalidDevice(String),

    #[error("invalid value {0:?} (expected 0 or 1)")]
    InvalidValue(String),

    #[error("{0}")]
    InvalidEndpoint(String),
}

const COMMAND_USAGE: &str = "command <gse|ecu> setall <v,v,...> | command <gse|ecu> set <field>=<0|1>";
const INPUT_USAGE: &str = "input add <host:port> [gse|ecu] | input remove <id|host:port>";
const OUTPUT_USAGE: &str = "output add <host:port> [gse|ecu] | output remove <id|host:port>";

/// Change to a device's command state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Replace every field, in schema order.
    SetAll(Vec<bool>),
    /// Change one field by name.
    Set { field: String, value: bool },
}

/// Which connection an operator removal targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(ConnectionId),
    Endpoint(Endpoint),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "#{id}"),
            Target::Endpoint(endpoint) => write!(f, "{endpoint}"),
        }
    }
}

/// A structured request for the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Command {
        device: Device,
        action: CommandAction,
    },
    Connect {
        direction: Direction,
        endpoint: Endpoint,
        device: Device,
    },
    Disconnect {
        direction: Direction,
        target: Target,
    },
    Status,
    Shutdown,
}

/// Successful result of a request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A command frame went out.
    Sent {
        device: Device,
        frame: Bytes,
        delivered: Vec<ConnectionId>,
        /// Connections that failed the write and were removed.
        failed: Vec<ConnectionId>,
    },
    Connected(ConnectionInfo),
    Disconnected(ConnectionInfo),
    Status(Vec<ConnectionInfo>),
    ShuttingDown,
}

/// Parse one line of operator input.
pub fn parse_line(line: &str) -> Result<Request, ParseError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(ParseError::Empty)?;
    let rest: Vec<&str> = words.collect();

    match verb.to_ascii_lowercase().as_str() {
        "command" => parse_command(&rest),
        "input" => parse_link(Direction::Telemetry, &rest, INPUT_USAGE),
        "output" => parse_link(Direction::Command, &rest, OUTPUT_USAGE),
        "status" if rest.is_empty() => Ok(Request::Status),
        "status" => Err(ParseError::Usage("status")),
        "shutdown" | "quit" | "exit" => Ok(Request::Shutdown),
        _ => Err(ParseError::UnknownCommand(verb.to_string())),
    }
}

fn parse_command(args: &[&str]) -> Result<Request, ParseError> {
    let [device, op, tail @ ..] = args else {
        return Err(ParseError::Usage(COMMAND_USAGE));
    };
    let device: Device = device.parse()?;

    let action = match op.to_ascii_lowercase().as_str() {
        "setall" => {
            // Tolerate "1, 0, 1" as well as "1,0,1".
            let joined = tail.concat();
            if joined.is_empty() {
                return Err(ParseError::Usage(COMMAND_USAGE));
            }
            let values = joined
                .split(',')
                .map(parse_bit)
                .collect::<Result<Vec<_>, _>>()?;
            CommandAction::SetAll(values)
        }
        "set" => {
            let [assignment] = tail else {
                return Err(ParseError::Usage(COMMAND_USAGE));
            };
            let (field, value) = assignment
                .split_once('=')
                .ok_or(ParseError::Usage(COMMAND_USAGE))?;
            if field.is_empty() {
                return Err(ParseError::Usage(COMMAND_USAGE));
            }
            CommandAction::Set {
                field: field.to_string(),
                value: parse_bit(value)?,
            }
        }
        _ => return Err(ParseError::Usage(COMMAND_USAGE)),
    };

    Ok(Request::Command { device, action })
}

fn parse_link(direction: Direction, args: &[&str], usage: &'static str) -> Result<Request, ParseError> {
    match args {
        [op, addr, device @ ..] if op.eq_ignore_ascii_case("add") && device.len() <= 1 => {
            let endpoint = parse_endpoint(addr)?;
            let device = match device.first() {
                Some(device) => device.parse()?,
                None => Device::Gse,
            };
            Ok(Request::Connect {
                direction,
                endpoint,
                device,
            })
        }
        [op, target] if op.eq_ignore_ascii_case("remove") => {
            let digits = target.strip_prefix('#').unwrap_or(target);
            let target = match digits.parse::<u64>() {
                Ok(raw) => Target::Id(ConnectionId::new(raw)),
                Err(_) => Target::Endpoint(parse_endpoint(target)?),
            };
            Ok(Request::Disconnect { direction, target })
        }
        _ => Err(ParseError::Usage(usage)),
    }
}

fn parse_bit(raw: &str) -> Result<bool, ParseError> {
    match raw.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ParseError::InvalidValue(other.to_string())),
    }
}

fn parse_endpoint(raw: &str) -> Result<Endpoint, ParseError> {
    raw.parse()
        .map_err(|err: gsectl_transport::TransportError| ParseError::InvalidEndpoint(err.to_string()))
}
