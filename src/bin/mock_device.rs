//! Mock device binary for integration testing
//!
//! Stands in for a running emulator: it accepts button frames over
//! WebSocket, registers itself in an emulator info file, and writes a
//! `TEST_STATE:` line to stdout for every frame, so the log monitor can
//! read it exactly like the device tool's log tail.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use clap::Parser;
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "mock_device", about = "Fake emulator input endpoint")]
struct Args {
    /// Emulator info file to write
    info_path: PathBuf,

    /// Platform to register as
    #[arg(long, default_value = "basalt")]
    platform: String,

    /// Drop this many connections before completing a handshake
    #[arg(long, default_value = "0")]
    refuse_first: u32,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("mock_device: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> std::io::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let pid = std::process::id();

    let mut info = serde_json::Map::new();
    info.insert(
        args.platform.clone(),
        json!({
            "4.4": {
                "qemu": { "pid": pid, "port": port },
                "pypkjs": { "pid": pid, "port": port },
                "version": "4.4",
            }
        }),
    );
    std::fs::write(&args.info_path, serde_json::Value::Object(info).to_string())?;

    emit(&format!("[mock] listening on 127.0.0.1:{}", port))?;
    emit("TEST_STATE:init,t=0:00,m=New,r=0,p=0")?;

    let state = Arc::new(DeviceState {
        refuse: AtomicU32::new(args.refuse_first),
        frames: AtomicU32::new(0),
    });

    loop {
        let (stream, _) = listener.accept().await?;
        if state.refuse_connection() {
            drop(stream);
            emit("[mock] refused connection")?;
            continue;
        }
        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
    }
}

struct DeviceState {
    refuse: AtomicU32,
    frames: AtomicU32,
}

impl DeviceState {
    fn refuse_connection(&self) -> bool {
        self.refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<DeviceState>) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("mock_device: handshake failed: {e}");
            return;
        }
    };

    while let Some(message) = ws.next().await {
        let data = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let line = match data.as_slice() {
            [0x0B, 0x08, mask] => {
                let n = state.frames.fetch_add(1, Ordering::SeqCst) + 1;
                format!("TEST_STATE:{},mask={},n={}", tag_for(*mask), mask, n)
            }
            other => format!("[mock] ignored frame {:02x?}", other),
        };

        // Stdout gone means nobody is watching; stop serving
        if emit(&line).is_err() {
            std::process::exit(0);
        }
    }
}

fn tag_for(mask: u8) -> &'static str {
    match mask {
        0 => "release",
        1 => "button_back",
        2 => "button_up",
        4 => "button_select",
        8 => "button_down",
        _ => "buttons",
    }
}

fn emit(line: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()
}
