//! 프로토콜 메시지 정의
//!
//! 프레임으로 감싸는 메시지는 `Packet` 세 종류뿐이다.
//! 파일 이름 요청과 OK/ACK/NAK 응답은 프레임 없이 원시 바이트로 보낸다.
//!
//! 와이어 형식은 JSON 객체이며 필드 이름으로 종류를 구분한다:
//! - SegmentCount: `{"segment_count": N}`
//! - SegmentData: `{"seq_num": i, "data": [..], "checksum": c, "error_simulated": b}`
//! - ErrorNotice: `{"error": "..."}` 또는 `{"status": "error", "message": "..."}`

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::segment::SegmentIndex;
use crate::{Error, Result, SEGMENT_SIZE};

/// 세그먼트 데이터 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentData {
    /// 세그먼트 인덱스
    pub index: SegmentIndex,

    /// 전송된 데이터 (주입된 손상 포함)
    pub payload: Bytes,

    /// 전송된 데이터에 대한 체크섬
    pub checksum: u16,

    /// 에러 주입 여부
    pub error_simulated: bool,
}

impl SegmentData {
    /// 전송할 데이터로 메시지 생성 (체크섬 계산 포함)
    pub fn new(index: SegmentIndex, payload: Bytes, error_simulated: bool) -> Self {
        let checksum = crate::checksum::compute(&payload);
        Self {
            index,
            payload,
            checksum,
            error_simulated,
        }
    }

    /// 체크섬 검증
    pub fn verify(&self) -> bool {
        crate::checksum::verify(&self.payload, self.checksum)
    }
}

/// 통합 패킷 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// 세그먼트 수 알림
    SegmentCount { count: u32 },

    /// 세그먼트 데이터
    SegmentData(SegmentData),

    /// 에러 알림 (파일 없음, 너무 작음 등)
    ErrorNotice { reason: String },
}

impl Packet {
    pub fn error(reason: impl Into<String>) -> Self {
        Packet::ErrorNotice {
            reason: reason.into(),
        }
    }

    /// 로그용 패킷 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::SegmentCount { .. } => "SegmentCount",
            Packet::SegmentData(_) => "SegmentData",
            Packet::ErrorNotice { .. } => "ErrorNotice",
        }
    }

    /// JSON 바이트로 직렬화 (길이 접두사 제외)
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&WirePacket::from(self))?)
    }

    /// JSON 바이트에서 역직렬화
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: WirePacket = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedPacket(e.to_string()))?;
        Packet::try_from(wire)
    }
}

/// 와이어 표현 (필드 이름으로 구분되는 JSON 객체)
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePacket {
    SegmentData {
        seq_num: u32,
        data: Vec<u8>,
        checksum: u16,
        #[serde(default)]
        error_simulated: bool,
    },
    SegmentCount {
        segment_count: u32,
    },
    Error {
        error: String,
    },
    Status {
        status: String,
        message: String,
    },
}

impl From<&Packet> for WirePacket {
    fn from(packet: &Packet) -> Self {
        match packet {
            Packet::SegmentCount { count } => WirePacket::SegmentCount {
                segment_count: *count,
            },
            Packet::SegmentData(seg) => WirePacket::SegmentData {
                seq_num: seg.index,
                data: seg.payload.to_vec(),
                checksum: seg.checksum,
                error_simulated: seg.error_simulated,
            },
            Packet::ErrorNotice { reason } => WirePacket::Error {
                error: reason.clone(),
            },
        }
    }
}

impl TryFrom<WirePacket> for Packet {
    type Error = Error;

    fn try_from(wire: WirePacket) -> Result<Self> {
        match wire {
            WirePacket::SegmentData {
                seq_num,
                data,
                checksum,
                error_simulated,
            } => {
                if data.len() > SEGMENT_SIZE {
                    return Err(Error::MalformedPacket(format!(
                        "segment {} payload too large: {} bytes",
                        seq_num,
                        data.len()
                    )));
                }
                Ok(Packet::SegmentData(SegmentData {
                    index: seq_num,
                    payload: Bytes::from(data),
                    checksum,
                    error_simulated,
                }))
            }
            WirePacket::SegmentCount { segment_count } => Ok(Packet::SegmentCount {
                count: segment_count,
            }),
            WirePacket::Error { error } => Ok(Packet::ErrorNotice { reason: error }),
            WirePacket::Status { status, message } => {
                if status != "error" {
                    return Err(Error::MalformedPacket(format!("unknown status: {}", status)));
                }
                Ok(Packet::ErrorNotice { reason: message })
            }
        }
    }
}

/// 프레임 없는 원시 응답 토큰
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 세그먼트 수 확인
    Ok,

    /// 세그먼트 수신 성공
    Ack,

    /// 세그먼트 체크섬 불일치
    Nak,

    /// 세션 종료 요청
    Quit,

    /// 알 수 없는 응답
    Other(String),
}

impl Token {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Token::Ok => b"OK",
            Token::Ack => b"ACK",
            Token::Nak => b"NAK",
            Token::Quit => b"quit",
            Token::Other(s) => s.as_bytes(),
        }
    }

    /// 수신 바이트 분류
    ///
    /// ACK/NAK는 접두사로 판정한다.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim();
        if text == "OK" {
            Token::Ok
        } else if text.starts_with("ACK") {
            Token::Ack
        } else if text.starts_with("NAK") {
            Token::Nak
        } else if text.eq_ignore_ascii_case("quit") {
            Token::Quit
        } else {
            Token::Other(text.to_string())
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}
