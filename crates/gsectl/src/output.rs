use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::UNIX_EPOCH;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gsectl_console::{ConnectionId, ConnectionInfo, Device, Outcome, TelemetryReading};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutcomeOutput<'a> {
    Sent {
        device: Device,
        frame: String,
        delivered: &'a [ConnectionId],
        failed: &'a [ConnectionId],
    },
    Connected {
        connection: &'a ConnectionInfo,
    },
    Disconnected {
        connection: &'a ConnectionInfo,
    },
    Status {
        connections: &'a [ConnectionInfo],
    },
    ShuttingDown,
}

pub fn print_outcome(outcome: &Outcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&outcome_output(outcome)),
        OutputFormat::Table | OutputFormat::Pretty => match outcome {
            Outcome::Status(infos) => print_connections(infos, format),
            other => println!("{}", describe(other)),
        },
    }
}

fn outcome_output(outcome: &Outcome) -> OutcomeOutput<'_> {
    match outcome {
        Outcome::Sent {
            device,
            frame,
            delivered,
            failed,
        } => OutcomeOutput::Sent {
            device: *device,
            frame: hex(frame),
            delivered,
            failed,
        },
        Outcome::Connected(info) => OutcomeOutput::Connected { connection: info },
        Outcome::Disconnected(info) => OutcomeOutput::Disconnected { connection: info },
        Outcome::Status(infos) => OutcomeOutput::Status { connections: infos },
        Outcome::ShuttingDown => OutcomeOutput::ShuttingDown,
    }
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Sent {
            device,
            frame,
            delivered,
            failed,
        } => {
            let mut line = format!(
                "sent {device} command to {} connection(s): {}",
                delivered.len(),
                hex(frame)
            );
            if !failed.is_empty() {
                let _ = write!(line, " ({} failed and removed)", failed.len());
            }
            line
        }
        Outcome::Connected(info) => {
            format!("connected #{} {} {}", info.id, info.role, info.endpoint)
        }
        Outcome::Disconnected(info) => {
            format!("disconnected #{} {} {}", info.id, info.role, info.endpoint)
        }
        Outcome::Status(infos) => format!("{} connection(s)", infos.len()),
        Outcome::ShuttingDown => "shutting down".to_string(),
    }
}

pub fn print_connections(infos: &[ConnectionInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&OutcomeOutput::Status { connections: infos }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "ROLE", "ENDPOINT", "FRAMES", "REJECTED", "BUFFERED"]);
            for info in infos {
                table.add_row(vec![
                    info.id.to_string(),
                    info.role.to_string(),
                    info.endpoint.clone(),
                    info.frames.to_string(),
                    info.rejected.to_string(),
                    info.buffered.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if infos.is_empty() {
                println!("no connections");
            }
            for info in infos {
                println!(
                    "#{} {} {} frames={} rejected={}",
                    info.id, info.role, info.endpoint, info.frames, info.rejected
                );
            }
        }
    }
}

pub fn print_reading(device: Device, reading: Option<&TelemetryReading>, format: OutputFormat) {
    let Some(reading) = reading else {
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "device": device, "reading": null })),
            _ => println!("no {device} telemetry yet"),
        }
        return;
    };

    match format {
        OutputFormat::Json => print_json(reading),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in reading.fields() {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!(
                "{device} reading #{} at {}",
                reading.sequence,
                unix_millis(reading)
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let fields: Vec<String> = reading
                .fields()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{device} #{} {}", reading.sequence, fields.join(" "));
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn unix_millis(reading: &TelemetryReading) -> u128 {
    reading
        .received_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
