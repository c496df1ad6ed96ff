//! SFT 요청자 (클라이언트) - Segmented File Transfer
//!
//! 파일 이름을 요청하고 세그먼트마다 체크섬을 검증해 ACK/NAK 응답
//! - 수신 실패 시 재연결 후 전체 재시도 (기본 5회)
//! - 모든 세그먼트가 검증된 경우에만 저장
//!
//! 사용법:
//!   cargo run --release --bin sft-requester -- [OPTIONS]
//!
//! 예시:
//!   # 대화형 요청
//!   cargo run --release --bin sft-requester -- --server 127.0.0.1:12345
//!
//!   # 파일 하나만 받고 종료
//!   cargo run --release --bin sft-requester -- -s 127.0.0.1:12345 -f data.bin -o downloads

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sft::{Config, Requester, TransferEvent};

/// 클라이언트 설정
struct ClientConfig {
    file: Option<String>,
    config: Config,
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut client = ClientConfig {
        file: None,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    client.config.server_addr = args[i + 1].clone();
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    client.config.download_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    client.file = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--retries" | "-r" => {
                if i + 1 < args.len() {
                    client.config.max_transfer_retries = args[i + 1].parse().expect("valid number required");
                    i += 1;
                }
            }
            "--connect-retries" => {
                if i + 1 < args.len() {
                    client.config.max_connect_retries = args[i + 1].parse().expect("valid number required");
                    i += 1;
                }
            }
            "--timeout" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().expect("valid number required");
                    client.config.idle_timeout_ms = secs * 1000;
                    client.config.connect_timeout_ms = secs * 1000;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"SFT Requester - Segmented File Transfer client

Requests files and verifies each 512-byte segment, answering ACK or NAK.

Usage:
  cargo run --release --bin sft-requester -- [OPTIONS]

Options:
  -s, --server <ADDR>       Provider address (default: localhost:12345)
  -o, --output <DIR>        Download directory (default: downloads)
  -f, --file <NAME>         Request one file and exit (otherwise interactive)
  -r, --retries <N>         Max whole-transfer attempts (default: 5)
  --connect-retries <N>     Max connection attempts (default: 3)
  --timeout <SECS>          Connect and idle timeout (default: 30)
  -h, --help                Print this help

Environment:
  RUST_LOG                  Log filter (default: info)
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    client
}

fn print_event(event: &TransferEvent) {
    match event {
        TransferEvent::Started {
            segment_count,
            attempt,
            ..
        } => println!(
            "Transfer started (attempt {}). Expected {} segments.",
            attempt, segment_count
        ),
        TransferEvent::Segment {
            index,
            status,
            message,
            error_simulated,
        } => println!(
            "Segment {}: {} - {} (Error simulated: {})",
            index, status, message, error_simulated
        ),
        TransferEvent::PassFailed { attempt, reason } => {
            println!("Attempt {} failed: {}", attempt, reason)
        }
        TransferEvent::Completed {
            path,
            total_segments,
        } => println!(
            "Transfer complete. Saved file: {} ({} segments)",
            path.display(),
            total_segments
        ),
        TransferEvent::Failed { reason } => println!("Transfer failed: {}", reason),
    }
}

async fn fetch(requester: &Requester, filename: &str) -> bool {
    let mut handle = requester.spawn(filename);
    while let Some(event) = handle.events.recv().await {
        print_event(&event);
    }

    match handle.wait().await {
        Ok(path) => {
            info!("Saved {:?}", path);
            true
        }
        Err(e) => {
            warn!("Request for {} failed: {}", filename, e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client = parse_args();
    client.config.validate()?;

    info!("SFT Requester starting...");
    info!("Server address: {}", client.config.server_addr);
    info!("Download directory: {:?}", client.config.download_dir);

    let requester = Requester::new(client.config);

    if let Some(file) = client.file {
        if !fetch(&requester, &file).await {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(b"\nEnter filename to request (or 'quit' to exit): ")
            .await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let filename = line.trim();

        if filename.is_empty() {
            continue;
        }
        if filename.eq_ignore_ascii_case("quit") {
            if let Err(e) = requester.send_quit().await {
                warn!("Could not notify provider: {}", e);
            }
            break;
        }

        fetch(&requester, filename).await;
    }

    info!("Client shutting down...");
    Ok(())
}
