mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "gsectl", version, about = "GSE/ECU ground support console")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "GSECTL_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "GSECTL_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_with_links() {
        let cli = Cli::try_parse_from([
            "gsectl",
            "console",
            "--input",
            "127.0.0.1:5001",
            "--output",
            "127.0.0.1:5002/ecu",
            "--poll-timeout",
            "250ms",
        ])
        .expect("console args should parse");

        match cli.command {
            Command::Console(args) => {
                assert_eq!(args.inputs, vec!["127.0.0.1:5001"]);
                assert_eq!(args.outputs, vec!["127.0.0.1:5002/ecu"]);
                assert_eq!(args.poll_timeout, "250ms");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_fake_device() {
        let cli = Cli::try_parse_from([
            "gsectl",
            "fake-device",
            "0.0.0.0:5001",
            "--device",
            "ecu",
            "--interval",
            "50ms",
        ])
        .expect("fake-device args should parse");
        assert!(matches!(cli.command, Command::FakeDevice(_)));
    }

    #[test]
    fn rejects_unknown_fake_device_kind() {
        let err = Cli::try_parse_from(["gsectl", "fake-device", "0.0.0.0:5001", "--device", "pad"])
            .expect_err("unknown device should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["gsectl", "version", "--format", "json"])
            .expect("global flag should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
