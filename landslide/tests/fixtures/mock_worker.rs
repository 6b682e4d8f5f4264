//! Test fixture: a tiny stand-in worker that speaks just enough of the
//! handshake/exploration protocol to let integration tests exercise the
//! dispatcher without a real model-checking simulator.

use serde::Serialize;
use std::env;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WorkerMessage {
    Hello { job_id: u64 },
    DiscoveredPp { directive: String, short: String, long: String, priority: u32 },
    Completion { elapsed_branches: u64 },
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis()
}

fn job_id_from_config_name(name: &str) -> u64 {
    name.strip_prefix("config-")
        .and_then(|rest| rest.split('.').next())
        .and_then(|id| id.parse().ok())
        .expect("mock worker config file name must embed a job id")
}

fn append_log(line: &str) {
    if let Ok(path) = env::var("LANDSLIDE_MOCK_LOG") {
        if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

fn send(stream: &mut UnixStream, msg: &WorkerMessage) {
    let mut line = serde_json::to_string(msg).expect("message always serializes");
    line.push('\n');
    stream.write_all(line.as_bytes()).expect("write to session socket");
    stream.flush().expect("flush session socket");
}

fn main() {
    let config_name = env::args().nth(1).expect("mock worker requires a config file name argument");
    let job_id = job_id_from_config_name(&config_name);
    append_log(&format!("{job_id} start {}", now_millis()));

    if let Ok(ms) = env::var("LANDSLIDE_MOCK_HOLD_MS") {
        if let Ok(ms) = ms.parse() {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    let sock_path = env::var("LANDSLIDE_SESSION_SOCK").expect("LANDSLIDE_SESSION_SOCK must be set");
    let mut stream = UnixStream::connect(&sock_path).expect("connect to parent session socket");
    send(&mut stream, &WorkerMessage::Hello { job_id });
    append_log(&format!("{job_id} hello {}", now_millis()));

    if let Ok(directive) = env::var("LANDSLIDE_MOCK_DISCOVER") {
        let priority: u32 = env::var("LANDSLIDE_MOCK_DISCOVER_PRIORITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1 << 2);
        send(
            &mut stream,
            &WorkerMessage::DiscoveredPp {
                short: directive.clone(),
                long: format!("<{directive}>"),
                directive,
                priority,
            },
        );
    }

    send(&mut stream, &WorkerMessage::Completion { elapsed_branches: 10 });
}
