use std::io::BufRead;
use std::thread;

use gsectl_console::{parse_line, ConsoleHandle, Device, Outcome};
use tokio::runtime::Runtime;

use crate::cmd::ConsoleArgs;
use crate::exit::{console_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_outcome, print_reading, OutputFormat};

const HELP: &str = "\
commands:
  command <gse|ecu> setall <v,v,...>     set every command field (0/1 each)
  command <gse|ecu> set <field>=<0|1>    set one field, keep the rest
  input add <host:port> [gse|ecu]        open a telemetry link
  output add <host:port> [gse|ecu]       open a command link
  input remove <id|host:port>
  output remove <id|host:port>
  status                                 list links
  show <gse|ecu>                         latest telemetry
  help
  shutdown | quit | exit";

/// What the stdin loop does after a line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub fn run(args: ConsoleArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.config()?;
    let links = args.links()?;

    let runtime = Runtime::new().map_err(|err| io_error("runtime setup failed", err))?;
    let (handle, task) = {
        let _guard = runtime.enter();
        gsectl_console::spawn(config)
    };

    let token = handle.shutdown_token();
    ctrlc::set_handler(move || token.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;

    for request in links {
        match runtime.block_on(handle.submit(request)) {
            Ok(outcome) => print_outcome(&outcome, format),
            Err(err) => {
                handle.shutdown();
                let _ = runtime.block_on(task);
                return Err(console_error("startup link failed", err));
            }
        }
    }

    let operator = handle.clone();
    thread::spawn(move || {
        read_operator_lines(&operator, format);
        operator.shutdown();
    });
    drop(handle);

    runtime
        .block_on(task)
        .map_err(|err| CliError::new(INTERNAL, format!("console task failed: {err}")))?;
    tracing::info!("console exited");
    Ok(SUCCESS)
}

fn read_operator_lines(handle: &ConsoleHandle, format: OutputFormat) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "stdin read failed");
                return;
            }
        };
        if handle_line(handle, &line, format) == Flow::Stop {
            return;
        }
    }
}

fn handle_line(handle: &ConsoleHandle, line: &str, format: OutputFormat) -> Flow {
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (None, _, _) => return Flow::Continue,
        (Some("help"), None, _) => {
            println!("{HELP}");
            return Flow::Continue;
        }
        (Some("show"), Some(device), None) => {
            match device.parse::<Device>() {
                Ok(device) => {
                    let latest = handle.snapshot().latest(device);
                    print_reading(device, latest.as_deref(), format);
                }
                Err(err) => eprintln!("error: {err}"),
            }
            return Flow::Continue;
        }
        _ => {}
    }

    let request = match parse_line(line) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("error: {err} (try `help`)");
            return Flow::Continue;
        }
    };

    match handle.blocking_submit(request) {
        Ok(outcome) => {
            print_outcome(&outcome, format);
            if matches!(outcome, Outcome::ShuttingDown) {
                return Flow::Stop;
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            if handle.is_closed() {
                return Flow::Stop;
            }
        }
    }
    Flow::Continue
}
