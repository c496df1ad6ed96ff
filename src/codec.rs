//! 패킷 프레이밍
//!
//! ```text
//! ┌────────────────┬──────────────────────────────┐
//! │ Length (u32 BE)│ JSON payload (Length bytes)  │
//! └────────────────┴──────────────────────────────┘
//! ```
//!
//! `read_packet` 한 번은 정확히 패킷 하나를 돌려준다.
//! 바이트 스트림 위에서 메시지 경계를 복원하는 유일한 수단이다.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::message::{Packet, Token};
use crate::{Error, Result, MAX_FRAME_LEN, MAX_TOKEN_LEN};

/// 길이 접두사 크기
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// 에러 로그에 남길 페이로드 미리보기 최대 길이
const PREVIEW_LEN: usize = 100;

/// 패킷을 프레임 바이트로 인코딩
pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let payload = packet.to_json()?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// 프레임 페이로드 디코딩
pub fn decode_payload(payload: &[u8]) -> Result<Packet> {
    Packet::from_json(payload).map_err(|e| {
        debug!(
            "패킷 파싱 실패: {} (preview: {:?})",
            e,
            String::from_utf8_lossy(&payload[..payload.len().min(PREVIEW_LEN)])
        );
        e
    })
}

/// 패킷 하나 전송
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// 패킷 하나 수신
///
/// 접두사나 페이로드를 읽는 도중 연결이 끊기면 `ConnectionClosed`.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    read_exact_or_closed(reader, &mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::MalformedPacket(format!(
            "frame too large: {} bytes (max {})",
            len, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; len];
    read_exact_or_closed(reader, &mut payload).await?;

    decode_payload(&payload)
}

/// 타임아웃 포함 패킷 수신
pub async fn read_packet_timeout<R>(reader: &mut R, idle: Duration) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    timeout(idle, read_packet(reader))
        .await
        .map_err(|_| Error::Timeout(idle.as_millis() as u64))?
}

/// 조기 EOF를 `ConnectionClosed`로 변환하는 read_exact
async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

/// 원시 바이트 한 번 읽기 (파일 이름 요청, 응답 토큰용)
///
/// 최대 `MAX_TOKEN_LEN` 바이트. 연결이 닫혀 있으면 `ConnectionClosed`.
pub async fn read_raw<R>(reader: &mut R, idle: Duration) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_TOKEN_LEN];
    let n = timeout(idle, reader.read(&mut buf))
        .await
        .map_err(|_| Error::Timeout(idle.as_millis() as u64))??;

    if n == 0 {
        return Err(Error::ConnectionClosed);
    }
    buf.truncate(n);
    Ok(buf)
}

/// 응답 토큰 수신
pub async fn read_token<R>(reader: &mut R, idle: Duration) -> Result<Token>
where
    R: AsyncRead + Unpin,
{
    let raw = read_raw(reader, idle).await?;
    Ok(Token::parse(&raw))
}

/// 원시 바이트 전송
pub async fn write_raw<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// 응답 토큰 전송
pub async fn write_token<W>(writer: &mut W, token: &Token) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_raw(writer, token.as_bytes()).await
}
