//! SFT 제공자 (서버) - Segmented File Transfer
//!
//! 요청받은 파일을 512바이트 세그먼트로 나눠 ACK/NAK 방식으로 전송
//! - 세그먼트마다 16비트 체크섬
//! - 테스트용 에러 주입 (확률 지정)
//!
//! 사용법:
//!   cargo run --release --bin sft-provider -- [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리 파일 제공
//!   cargo run --release --bin sft-provider -- --bind 0.0.0.0:12345
//!
//!   # 80% 확률 에러 주입
//!   cargo run --release --bin sft-provider -- -d ./files --error-rate 0.8

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sft::{Config, InjectionPoint, Provider};

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.listen_addr = args[i + 1].clone();
                    i += 1;
                }
            }
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    config.serve_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--error-rate" | "-e" => {
                if i + 1 < args.len() {
                    config.error_probability = args[i + 1].parse().expect("valid number required");
                    i += 1;
                }
            }
            "--in-transit" => {
                config.injection_point = InjectionPoint::InTransit;
            }
            "--lossy" => {
                config.error_probability = Config::lossy().error_probability;
            }
            "--timeout" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().expect("valid number required");
                    config.idle_timeout_ms = secs * 1000;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"SFT Provider - Segmented File Transfer server

Serves files in 512-byte checksummed segments with ACK/NAK retransmission.

Usage:
  cargo run --release --bin sft-provider -- [OPTIONS]

Options:
  -b, --bind <ADDR>         Listen address (default: 0.0.0.0:12345)
  -d, --dir <PATH>          Directory to serve files from (default: .)
  -e, --error-rate <P>      Simulated error probability 0.0~1.0 (default: 0.0)
  --lossy                   Shortcut for --error-rate 0.8
  --in-transit              Corrupt after checksumming so the requester NAKs
  --timeout <SECS>          Idle timeout for acknowledgments (default: 30)
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

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();
    config.validate()?;

    info!("SFT Provider starting...");
    info!("Bind address: {}", config.listen_addr);
    info!("Serve directory: {:?}", config.serve_dir);
    info!("Error probability: {:.1}%", config.error_probability * 100.0);
    info!("Injection point: {:?}", config.injection_point);
    info!("Idle timeout: {}ms", config.idle_timeout_ms);

    let provider = Arc::new(Provider::new(config));
    let listener = provider.bind().await?;

    let serving = provider.clone();
    let mut server = tokio::spawn(async move { serving.serve(listener).await });

    tokio::select! {
        result = &mut server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down...");
            provider.stop();
            server.await??;
        }
    }

    let stats = provider.get_stats();
    info!(
        "Sessions: {} ({} completed, {} failed)",
        stats.sessions, stats.completed, stats.failed
    );
    info!("Totals: {}", stats.transfer.summary());

    Ok(())
}
