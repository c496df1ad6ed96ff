//! # SFT (Segmented File Transfer)
//!
//! TCP 기반 체크섬 검증형 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **고정 크기 세그먼트**: 512 bytes 단위 분할, 인덱스 순 재조립
//! - **16비트 체크섬**: 세그먼트마다 1의 보수 합 검증
//! - **ACK/NAK**: 세그먼트 하나씩 확인, NAK 시 원본 한 번 재전송
//! - **전체 재시도**: 수신 패스 실패 시 재연결 후 처음부터 (최대 5회)
//! - **에러 주입**: 테스트용으로 세그먼트 바이트 하나를 손상
//! - **길이 접두 프레이밍**: 바이트 스트림 위의 개별 메시지

pub mod checksum;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod inject;
pub mod message;
pub mod provider;
pub mod requester;
pub mod segment;
pub mod stats;
pub mod storage;

pub use config::Config;
pub use connection::{Connection, ConnectionManager};
pub use error::{Error, Result};
pub use event::{CancelNotifier, SegmentStatus, TransferEvent};
pub use inject::{ErrorInjector, InjectionPoint};
pub use message::{Packet, SegmentData, Token};
pub use provider::{Provider, SessionOutcome};
pub use requester::{Requester, TransferHandle, TransferSession};
pub use segment::{Segment, SegmentIndex};
pub use stats::{ProviderStats, TransferStats};

/// 세그먼트 크기 (바이트)
pub const SEGMENT_SIZE: usize = 512;

/// 전송 가능한 최소 파일 크기 (바이트)
pub const MIN_FILE_SIZE: usize = 2000;

/// 기본 최대 전체 전송 시도 횟수
pub const MAX_TRANSFER_RETRIES: u32 = 5;

/// 기본 최대 연결 시도 횟수
pub const MAX_CONNECT_RETRIES: u32 = 3;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 12345;

/// 프레임 페이로드 최대 크기 (64KB)
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// 원시 요청/토큰 한 번 읽기 최대 크기
pub const MAX_TOKEN_LEN: usize = 1024;
