//! Bench stand-in for a GSE or ECU board.
//!
//! Accepts any number of controllers, streams the same telemetry frame to
//! all of them every interval, and logs every command frame it receives.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use gsectl_console::Device;
use gsectl_frame::{encode, FieldKind, Schema, StreamDecoder, Value};
use gsectl_transport::{bind, Endpoint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;

use crate::cmd::{parse_duration, FakeDeviceArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: FakeDeviceArgs) -> CliResult<i32> {
    let endpoint: Endpoint = args
        .bind
        .parse()
        .map_err(|err| transport_error("invalid bind address", err))?;
    let interval = parse_duration(&args.interval)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let runtime = Runtime::new().map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(async {
        let listener = bind(&endpoint)
            .await
            .map_err(|err| transport_error("bind failed", err))?;
        serve(listener, args.device, interval, running).await
    })?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

async fn serve(
    listener: TcpListener,
    device: Device,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> CliResult<()> {
    let schema = device.telemetry_schema();
    let (frames, _) = broadcast::channel::<Bytes>(16);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(%device, interval_ms = interval.as_millis() as u64, "fake device running");
    while running.load(Ordering::SeqCst) {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::info!(%peer, "controller connected");
                    tokio::spawn(serve_controller(socket, peer, device, frames.subscribe()));
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            },
            _ = ticker.tick() => {
                let frame = encode(schema, &telemetry_values(schema, unix_seconds()))
                    .map_err(|err| frame_error("telemetry encode failed", err))?;
                // No receivers just means no controller is connected.
                let _ = frames.send(frame);
            }
        }
    }

    tracing::info!("fake device stopped");
    Ok(())
}

async fn serve_controller(
    socket: TcpStream,
    peer: SocketAddr,
    device: Device,
    mut frames: broadcast::Receiver<Bytes>,
) {
    let (mut reader, mut writer) = socket.into_split();
    let schema = device.command_schema();
    let mut decoder = StreamDecoder::new(schema);
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        buf.reserve(1024);
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if let Err(err) = writer.write_all(&frame).await {
                        tracing::warn!(%peer, error = %err, "telemetry send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(%peer, skipped, "controller lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    decoder.feed(&buf.split());
                    for command in decoder.drain() {
                        match command {
                            Ok(values) => tracing::info!(
                                %peer,
                                command = %describe_command(schema, &values),
                                "command received"
                            ),
                            Err(err) => tracing::warn!(%peer, error = %err, "bad command frame"),
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%peer, error = %err, "read failed");
                    break;
                }
            },
        }
    }
    tracing::info!(%peer, "controller disconnected");
}

/// Telemetry with every flag set and floats alternating 1.0 / 2.0.
fn telemetry_values(schema: &Schema, timestamp: u32) -> Vec<Value> {
    let mut floats = 0u32;
    schema
        .fields
        .iter()
        .map(|field| match field.kind {
            FieldKind::U32 => Value::U32(timestamp),
            FieldKind::Bool => Value::Bool(true),
            FieldKind::F32 => {
                floats += 1;
                Value::F32(if floats % 2 == 1 { 1.0 } else { 2.0 })
            }
        })
        .collect()
}

fn describe_command(schema: &Schema, values: &[Value]) -> String {
    schema
        .field_names()
        .zip(values)
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
