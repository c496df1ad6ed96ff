//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// SFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Json(#[from] serde_json::Error),

    #[error("연결 실패: {addr} ({attempts}회 시도): {reason}")]
    ConnectionFailed {
        addr: String,
        attempts: u32,
        reason: String,
    },

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("유효하지 않은 패킷: {0}")]
    MalformedPacket(String),

    #[error("타임아웃: {0}ms 동안 응답 없음")]
    Timeout(u64),

    #[error("원격 에러: {0}")]
    RemoteError(String),

    #[error("체크섬 불일치: seq={index}, expected {expected:04X}, got {got:04X}")]
    ChecksumMismatch { index: u32, expected: u16, got: u16 },

    #[error("불완전한 전송: expected {expected} segments, got {got}")]
    IncompleteTransfer { expected: usize, got: usize },

    #[error("전송 재시도 소진: {attempts}회 시도, 마지막 에러: {last_error}")]
    TransferExhausted { attempts: u32, last_error: String },

    #[error("파일 저장 실패: {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("파일 없음: {0}")]
    FileNotFound(String),

    #[error("파일이 너무 작음: {size} bytes (최소 {min} bytes)")]
    FileTooSmall { size: usize, min: usize },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFilename(String),

    #[error("유효하지 않은 세그먼트 크기: {0}")]
    InvalidSegmentSize(usize),

    #[error("응답 토큰 불일치: expected {expected}, got {got:?}")]
    AbortedAckMismatch { expected: &'static str, got: String },

    #[error("재전송 실패: seq={index}, got {got:?}")]
    AbortedRetryFailed { index: u32, got: String },

    #[error("ACK 대기 타임아웃: {0}")]
    AbortedTimeout(String),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("전송 취소")]
    Cancelled,

    #[error("알 수 없는 에러: {0}")]
    Unknown(String),
}

impl Error {
    /// 전체 전송 재시도로 복구 가능한 에러인지 여부
    ///
    /// 수신 패스 중에 발생한 전송 계층 문제만 해당된다.
    /// 원격 에러, 연결 실패, 저장 실패는 재시도하지 않는다.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::MalformedPacket(_)
                | Error::ConnectionClosed
                | Error::Timeout(_)
                | Error::ChecksumMismatch { .. }
                | Error::Io(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::ConnectionClosed.is_transient());
        assert!(Error::Timeout(30_000).is_transient());
        assert!(Error::MalformedPacket("bad".into()).is_transient());
        assert!(Error::ChecksumMismatch {
            index: 1,
            expected: 0x1234,
            got: 0x1235
        }
        .is_transient());

        assert!(!Error::RemoteError("File not found".into()).is_transient());
        assert!(!Error::ConnectionFailed {
            addr: "127.0.0.1:1".into(),
            attempts: 3,
            reason: "refused".into()
        }
        .is_transient());
        assert!(!Error::TransferExhausted {
            attempts: 5,
            last_error: "연결 종료".into()
        }
        .is_transient());
    }
}
