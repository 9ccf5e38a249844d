#![cfg(target_os = "linux")]

use std::io::{BufRead as _, BufReader, Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, sleep};
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(10);

struct Listener {
    child: Child,
    port: u16,
}

impl Listener {
    fn start(config: &Path, port: u16) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_ftpd-listener"))
            .arg(config)
            .arg("--isolation")
            .arg("none")
            .env("FTPD_LOG", "debug")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn ftpd-listener");
        Listener { child, port }
    }

    fn connect(&self) -> BufReader<TcpStream> {
        connect(self.port)
    }

    /// Connects until the greeting is `want`, dropping refused sessions.
    fn connect_expecting(&self, want: &str) -> BufReader<TcpStream> {
        let start = Instant::now();
        loop {
            let mut conn = self.connect();
            let got = read_reply(&mut conn);
            if got == want {
                return conn;
            }
            assert!(
                start.elapsed() < DEADLINE,
                "still greeted with {got:?}, wanted {want:?}"
            );
            drop(conn);
            sleep(Duration::from_millis(50));
        }
    }

    fn hang_up(&self) {
        unsafe { libc::kill(self.child.id() as libc::pid_t, libc::SIGHUP) };
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A listener that detached itself; found again through its config path.
struct Daemon {
    config: PathBuf,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let needle = self.config.as_os_str().as_bytes();
        let Ok(procs) = std::fs::read_dir("/proc") else {
            return;
        };
        for entry in procs.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<libc::pid_t>() else {
                continue;
            };
            let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else {
                continue;
            };
            if cmdline.split(|b| *b == 0).any(|arg| arg == needle) {
                unsafe { libc::kill(pid, libc::SIGKILL) };
            }
        }
    }
}

fn connect(port: u16) -> BufReader<TcpStream> {
    let start = Instant::now();
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(s) => {
                s.set_read_timeout(Some(DEADLINE)).unwrap();
                return BufReader::new(s);
            }
            Err(_) if start.elapsed() < DEADLINE => sleep(Duration::from_millis(20)),
            Err(err) => panic!("listener never came up: {err}"),
        }
    }
}

fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn write_config(path: &Path, port: u16, max_per_ip: u32) {
    write_config_with(path, port, max_per_ip, serde_json::json!({}));
}

fn write_config_with(path: &Path, port: u16, max_per_ip: u32, extra: serde_json::Value) {
    let mut doc = serde_json::json!({
        "listen_address": "127.0.0.1",
        "listen_port": port,
        "max_per_ip": max_per_ip,
    });
    if let (Some(doc), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        doc.extend(extra.clone());
    }
    std::fs::write(path, serde_json::to_vec(&doc).unwrap()).unwrap();
}

fn read_reply(conn: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    conn.read_line(&mut line).expect("read reply");
    line
}

fn send(conn: &mut BufReader<TcpStream>, cmd: &str) {
    conn.get_mut().write_all(cmd.as_bytes()).unwrap();
}

const IP_LIMIT: &str = "421 There are too many connections from your internet address.\r\n";

#[test]
fn serves_limits_reaps_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("ftpd.json");
    let port = free_port();
    write_config(&config, port, 1);
    let listener = Listener::start(&config, port);

    let mut first = listener.connect_expecting("220 Ready.\r\n");
    send(&mut first, "OPTS UTF8 ON\r\n");
    assert_eq!(read_reply(&mut first), "200 Always in UTF8 mode.\r\n");

    let mut second = listener.connect();
    assert_eq!(read_reply(&mut second), IP_LIMIT);
    drop(second);

    // Once the first worker exits and is reaped the address has room again.
    send(&mut first, "QUIT\r\n");
    assert_eq!(read_reply(&mut first), "221 Goodbye.\r\n");
    drop(first);
    let mut third = listener.connect_expecting("220 Ready.\r\n");

    // Raise the limit and ask for a reload; a second session now fits.
    write_config(&config, port, 2);
    listener.hang_up();
    let mut fourth = listener.connect_expecting("220 Ready.\r\n");

    send(&mut third, "NOOP\r\n");
    assert_eq!(read_reply(&mut third), "200 NOOP ok.\r\n");
    send(&mut fourth, "QUIT\r\n");
    assert_eq!(read_reply(&mut fourth), "221 Goodbye.\r\n");
}

#[test]
fn accept_timeout_keeps_listening() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("ftpd.json");
    let port = free_port();
    write_config_with(
        &config,
        port,
        4,
        serde_json::json!({ "accept_timeout_secs": 1 }),
    );
    let listener = Listener::start(&config, port);
    drop(listener.connect_expecting("220 Ready.\r\n"));

    // Several accept waits expire with nobody connecting.
    sleep(Duration::from_millis(2500));

    let mut conn = listener.connect();
    assert_eq!(read_reply(&mut conn), "220 Ready.\r\n");
    send(&mut conn, "QUIT\r\n");
    assert_eq!(read_reply(&mut conn), "221 Goodbye.\r\n");
}

#[test]
fn background_mode_releases_the_callers_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("ftpd.json");
    let port = free_port();
    write_config_with(&config, port, 4, serde_json::json!({ "background": true }));

    let mut launcher = Command::new(env!("CARGO_BIN_EXE_ftpd-listener"))
        .arg(&config)
        .arg("--isolation")
        .arg("none")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn ftpd-listener");
    let mut stderr = launcher.stderr.take().unwrap();
    let status = launcher.wait().unwrap();
    let _daemon = Daemon {
        config: config.clone(),
    };
    assert!(status.success(), "foreground process exited with {status}");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut out = Vec::new();
        let _ = stderr.read_to_end(&mut out);
        let _ = tx.send(out);
    });
    let out = rx
        .recv_timeout(DEADLINE)
        .expect("detached listener still holds the caller's stderr");
    assert!(out.is_empty(), "{}", String::from_utf8_lossy(&out));

    let mut conn = connect(port);
    assert_eq!(read_reply(&mut conn), "220 Ready.\r\n");
}

#[test]
fn refuses_dual_family_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("ftpd.json");
    std::fs::write(&config, br#"{"listen": true, "listen_ipv6": true}"#).unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_ftpd-listener"))
        .arg(&config)
        .output()
        .expect("run ftpd-listener");
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("IPv4 and IPv6"), "{stderr}");
}

#[test]
fn print_config_reports_effective_values() {
    let out = Command::new(env!("CARGO_BIN_EXE_ftpd-listener"))
        .args(["--print-config", "--listen-port", "2121"])
        .output()
        .expect("run ftpd-listener");
    assert!(out.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(doc["listen_port"], 2121);
    assert_eq!(doc["listen"], true);
}
