use std::time::Duration;

use clap::{Args, Subcommand};
use gsectl_console::{ConsoleConfig, Device, Direction, Request};
use gsectl_transport::Endpoint;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod console;
pub mod fake;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the operator console (reads commands from stdin).
    Console(ConsoleArgs),
    /// Simulate a GSE or ECU device for bench testing.
    FakeDevice(FakeDeviceArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Console(args) => console::run(args, format),
        Command::FakeDevice(args) => fake::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// Telemetry link to open at startup, as host:port[/gse|ecu]. Repeatable.
    #[arg(long = "input", value_name = "ENDPOINT")]
    pub inputs: Vec<String>,
    /// Command link to open at startup, as host:port[/gse|ecu]. Repeatable.
    #[arg(long = "output", value_name = "ENDPOINT")]
    pub outputs: Vec<String>,
    /// Longest idle wait of the console loop (e.g. 1s, 250ms).
    #[arg(long, env = "GSECTL_POLL_TIMEOUT", default_value = "1s")]
    pub poll_timeout: String,
    /// Timeout for opening a device link.
    #[arg(long, env = "GSECTL_CONNECT_TIMEOUT", default_value = "5s")]
    pub connect_timeout: String,
    /// Timeout for delivering one command frame.
    #[arg(long, env = "GSECTL_WRITE_TIMEOUT", default_value = "1s")]
    pub write_timeout: String,
}

impl ConsoleArgs {
    pub fn config(&self) -> CliResult<ConsoleConfig> {
        Ok(ConsoleConfig {
            poll_timeout: parse_duration(&self.poll_timeout)?,
            connect_timeout: parse_duration(&self.connect_timeout)?,
            write_timeout: parse_duration(&self.write_timeout)?,
            ..ConsoleConfig::default()
        })
    }

    /// Connect requests for the startup links, inputs first.
    pub fn links(&self) -> CliResult<Vec<Request>> {
        let inputs = self.inputs.iter().map(|s| (Direction::Telemetry, s));
        let outputs = self.outputs.iter().map(|s| (Direction::Command, s));
        inputs
            .chain(outputs)
            .map(|(direction, spec)| {
                let (endpoint, device) = parse_link(spec)?;
                Ok(Request::Connect {
                    direction,
                    endpoint,
                    device,
                })
            })
            .collect()
    }
}

#[derive(Args, Debug)]
pub struct FakeDeviceArgs {
    /// Address to listen on (host:port; port 0 picks a free one).
    pub bind: String,
    /// Which device to impersonate.
    #[arg(long, default_value = "gse")]
    pub device: Device,
    /// Telemetry period (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `host:port` with an optional `/gse` or `/ecu` suffix (default gse).
pub fn parse_link(spec: &str) -> CliResult<(Endpoint, Device)> {
    let (addr, device) = match spec.rsplit_once('/') {
        Some((addr, device)) => {
            let device = device
                .parse()
                .map_err(|err| CliError::new(USAGE, format!("invalid link {spec:?}: {err}")))?;
            (addr, device)
        }
        None => (spec, Device::Gse),
    };
    let endpoint = addr
        .parse()
        .map_err(|err| transport_error("invalid link", err))?;
    Ok((endpoint, device))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
