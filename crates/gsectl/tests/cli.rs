#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use gsectl_frame::{checksum, decode, Value, GSE_TELEMETRY};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("ephemeral bind should work")
        .local_addr()
        .expect("local addr")
        .port()
}

fn accept_within(listener: &TcpListener, timeout: Duration) -> TcpStream {
    listener
        .set_nonblocking(true)
        .expect("listener should switch to nonblocking");
    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_nonblocking(false)
                    .expect("stream should switch to blocking");
                return stream;
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => panic!("accept failed: {err}"),
        }
        if start.elapsed() >= timeout {
            panic!("accept timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn connect_within(addr: SocketAddr, timeout: Duration) -> TcpStream {
    let start = Instant::now();
    loop {
        if let Ok(stream) = TcpStream::connect(addr) {
            return stream;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_gsectl"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("gsectl {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn console_sends_operator_command_to_output_link() {
    let device = TcpListener::bind("127.0.0.1:0").expect("device should bind");
    let addr = device.local_addr().expect("local addr");

    let mut child = Command::new(env!("CARGO_BIN_EXE_gsectl"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("console")
        .arg("--output")
        .arg(format!("{addr}/gse"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("console should start");

    let mut socket = accept_within(&device, Duration::from_secs(5));
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should apply");

    {
        let stdin = child.stdin.as_mut().expect("stdin should be piped");
        stdin
            .write_all(b"command gse setall 1,0,0,0,0,0,0,0,0,0,0,0\nquit\n")
            .expect("stdin write should work");
    }

    let mut frame = [0u8; 16];
    socket.read_exact(&mut frame).expect("command frame should arrive");
    assert_eq!(frame[0], 1);
    assert!(frame[1..12].iter().all(|b| *b == 0));
    assert_eq!(
        u32::from_le_bytes(frame[12..].try_into().unwrap()),
        checksum(&frame[..12])
    );

    let output = child.wait_with_output().expect("console should exit");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"event\":\"connected\""));
    assert!(stdout.contains("\"event\":\"sent\""));
    assert!(stdout.contains("\"event\":\"shutting_down\""));
}

#[test]
fn console_rejects_malformed_link_with_usage_code() {
    let output = Command::new(env!("CARGO_BIN_EXE_gsectl"))
        .arg("console")
        .arg("--input")
        .arg("no-port-here")
        .stdin(Stdio::null())
        .output()
        .expect("console should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn console_refused_startup_link_returns_3() {
    let port = free_port();
    let output = Command::new(env!("CARGO_BIN_EXE_gsectl"))
        .arg("--log-level")
        .arg("error")
        .arg("console")
        .arg("--output")
        .arg(format!("127.0.0.1:{port}"))
        .stdin(Stdio::null())
        .output()
        .expect("console should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("startup link failed"));
}

#[test]
fn fake_device_streams_gse_telemetry() {
    let port = free_port();
    let mut child = Command::new(env!("CARGO_BIN_EXE_gsectl"))
        .arg("--log-level")
        .arg("error")
        .arg("fake-device")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--interval")
        .arg("20ms")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("fake-device should start");

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let mut socket = connect_within(addr, Duration::from_secs(5));
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should apply");

    let mut frame = vec![0u8; GSE_TELEMETRY.size()];
    socket.read_exact(&mut frame).expect("telemetry frame should arrive");
    let values = decode(&GSE_TELEMETRY, &frame).expect("frame should decode");
    assert_eq!(values[1], Value::Bool(true));
    assert_eq!(values[4], Value::F32(1.0));

    let _ = child.kill();
    let _ = child.wait();
}
