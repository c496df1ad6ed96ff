//! 요청자 (클라이언트측)
//!
//! - 파일 이름 요청 → 세그먼트 수 확인 → 세그먼트별 검증 후 ACK/NAK
//! - 수신 패스가 실패하면 재연결 후 처음부터 다시 요청 (최대 `max_transfer_retries`회)
//! - 모든 세그먼트가 모였을 때만 저장

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{read_packet_timeout, write_raw, write_token};
use crate::connection::ConnectionManager;
use crate::event::{CancelNotifier, EventReceiver, EventSink, SegmentStatus, TransferEvent};
use crate::message::{Packet, SegmentData, Token};
use crate::segment::{reassemble, SegmentIndex};
use crate::stats::TransferStats;
use crate::{checksum, storage, Config, Error, Result};

/// 요청자 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterState {
    Requesting,
    AwaitingCount,
    Receiving(SegmentIndex),
    Reassembling,
    Saved,
    Failed,
}

/// 요청 하나의 전송 세션
#[derive(Debug)]
pub struct TransferSession {
    /// 요청한 파일 이름
    pub filename: String,

    /// 예상 세그먼트 수
    pub segment_count: u32,

    /// 검증된 세그먼트 (인덱스 -> 데이터)
    segments: BTreeMap<SegmentIndex, Bytes>,

    /// 전체 전송 재시도 횟수
    pub retries: u32,

    /// 최대 전체 전송 시도 횟수
    pub max_retries: u32,

    /// 현재 상태
    pub state: RequesterState,

    /// 전송 통계
    pub stats: TransferStats,
}

impl TransferSession {
    pub fn new(filename: impl Into<String>, max_retries: u32) -> Self {
        Self {
            filename: filename.into(),
            segment_count: 0,
            segments: BTreeMap::new(),
            retries: 0,
            max_retries,
            state: RequesterState::Requesting,
            stats: TransferStats::new(),
        }
    }

    fn transition(&mut self, next: RequesterState) {
        debug!("요청자 상태: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// 검증된 세그먼트 저장
    pub fn store(&mut self, index: SegmentIndex, payload: Bytes) {
        self.stats.completed_segments += 1;
        self.segments.insert(index, payload);
    }

    pub fn received(&self) -> usize {
        self.segments.len()
    }

    /// 0..N-1 인덱스를 모두 가지고 있는지
    pub fn is_complete(&self) -> bool {
        self.segment_count > 0
            && self.segments.len() == self.segment_count as usize
            && self
                .segments
                .keys()
                .enumerate()
                .all(|(i, &index)| i == index as usize)
    }

    /// 재시도 전 초기화
    fn reset_pass(&mut self) {
        self.segments.clear();
        self.stats.completed_segments = 0;
    }

    /// 순서대로 재조립
    pub fn reassemble(&self) -> Result<Bytes> {
        reassemble(&self.segments, self.segment_count as usize)
    }
}

/// 수신 패스 하나 실행 (연결 하나)
///
/// 성공하면 세션이 완전한 상태. 실패 에러는 재시도 정책이 분류한다.
pub async fn run_pass<S>(
    stream: &mut S,
    session: &mut TransferSession,
    config: &Config,
    events: &EventSink,
    attempt: u32,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let idle = config.idle_timeout();

    session.transition(RequesterState::Requesting);
    debug!("파일 요청 전송: {}", session.filename);
    write_raw(stream, session.filename.as_bytes()).await?;

    session.transition(RequesterState::AwaitingCount);
    let count = match read_packet_timeout(stream, idle).await? {
        Packet::SegmentCount { count: 0 } => {
            return Err(Error::MalformedPacket("segment count is zero".into()));
        }
        Packet::SegmentCount { count } => count,
        Packet::ErrorNotice { reason } => {
            error!("제공자 에러: {}", reason);
            return Err(Error::RemoteError(reason));
        }
        other => {
            return Err(Error::MalformedPacket(format!(
                "expected SegmentCount, got {}",
                other.kind()
            )));
        }
    };

    debug!("예상 세그먼트 수: {}", count);
    write_token(stream, &Token::Ok).await?;

    session.segment_count = count;
    session.stats.total_segments = count as u64;
    session.reset_pass();
    events.emit(TransferEvent::Started {
        filename: session.filename.clone(),
        segment_count: count,
        attempt,
    });

    for index in 0..count {
        session.transition(RequesterState::Receiving(index));
        receive_segment(stream, session, idle, events, index).await?;
    }

    if !session.is_complete() {
        return Err(Error::IncompleteTransfer {
            expected: count as usize,
            got: session.received(),
        });
    }
    Ok(())
}

/// 기대 인덱스의 세그먼트 하나 수신
async fn read_segment<S>(stream: &mut S, idle: std::time::Duration, index: SegmentIndex) -> Result<SegmentData>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match read_packet_timeout(stream, idle).await? {
        Packet::SegmentData(seg) if seg.index == index => Ok(seg),
        Packet::SegmentData(seg) => Err(Error::MalformedPacket(format!(
            "expected segment {}, got {}",
            index, seg.index
        ))),
        Packet::ErrorNotice { reason } => Err(Error::RemoteError(reason)),
        other => Err(Error::MalformedPacket(format!(
            "expected SegmentData, got {}",
            other.kind()
        ))),
    }
}

/// 세그먼트 하나 수신/검증 (불일치 시 NAK 후 재전송 한 번)
async fn receive_segment<S>(
    stream: &mut S,
    session: &mut TransferSession,
    idle: std::time::Duration,
    events: &EventSink,
    index: SegmentIndex,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let seg = match read_segment(stream, idle, index).await {
        Ok(seg) => seg,
        Err(e) => {
            events.segment(index, SegmentStatus::Error, "Failed to receive segment", false);
            return Err(e);
        }
    };
    session.stats.record_packet(seg.payload.len(), seg.error_simulated);

    if seg.verify() {
        session.store(index, seg.payload);
        write_token(stream, &Token::Ack).await?;
        events.segment(
            index,
            SegmentStatus::Success,
            "Segment received successfully",
            seg.error_simulated,
        );
        return Ok(());
    }

    warn!("세그먼트 {} 체크섬 불일치", index);
    session.stats.checksum_failures += 1;
    session.stats.total_naks += 1;
    write_token(stream, &Token::Nak).await?;
    events.segment(
        index,
        SegmentStatus::Error,
        "Checksum verification failed",
        seg.error_simulated,
    );

    let retry = match read_segment(stream, idle, index).await {
        Ok(seg) => seg,
        Err(e) => {
            events.segment(
                index,
                SegmentStatus::Error,
                "Failed to receive retransmitted segment",
                false,
            );
            return Err(e);
        }
    };
    session.stats.record_packet(retry.payload.len(), retry.error_simulated);
    session.stats.retransmitted_segments += 1;

    if retry.verify() {
        session.store(index, retry.payload);
        write_token(stream, &Token::Ack).await?;
        events.segment(
            index,
            SegmentStatus::Retry,
            "Retransmission successful",
            retry.error_simulated,
        );
        return Ok(());
    }

    warn!("세그먼트 {} 재전송도 체크섬 불일치", index);
    session.stats.checksum_failures += 1;
    events.segment(
        index,
        SegmentStatus::Error,
        "Retransmission checksum failed",
        retry.error_simulated,
    );
    // 제공자는 ACK가 아니면 세션을 중단한다
    if let Err(e) = write_token(stream, &Token::Nak).await {
        debug!("재전송 NAK 전송 실패: {}", e);
    }
    Err(Error::ChecksumMismatch {
        index,
        expected: retry.checksum,
        got: checksum::compute(&retry.payload),
    })
}

/// 진행 중인 전송 핸들
pub struct TransferHandle {
    /// 진행 이벤트 (순서 보장)
    pub events: EventReceiver,

    join: JoinHandle<Result<PathBuf>>,

    cancel: CancelNotifier,
}

impl TransferHandle {
    /// 전송 완료 대기
    pub async fn wait(self) -> Result<PathBuf> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Unknown(e.to_string())),
        }
    }

    /// 전송 취소 (소켓이 닫히고 상대는 연결 종료로 인식)
    ///
    /// 아직 종료 이벤트가 나가지 않았으면 `Failed`를 마지막 이벤트로 보낸다.
    pub fn abort(&self) {
        if !self.join.is_finished() && self.cancel.fail(Error::Cancelled.to_string()) {
            debug!("전송 취소 이벤트 발행");
        }
        self.join.abort();
    }
}

/// 요청자
#[derive(Debug, Clone)]
pub struct Requester {
    config: Config,
    connector: ConnectionManager,
}

impl Requester {
    pub fn new(config: Config) -> Self {
        Self {
            connector: ConnectionManager::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 파일 요청 (이벤트 없음)
    pub async fn request_file(&self, filename: &str) -> Result<PathBuf> {
        self.request_file_with_events(filename, EventSink::none()).await
    }

    /// 전용 태스크에서 파일 요청
    ///
    /// 태스크가 소켓을 단독 소유하고 이벤트 채널로 진행 상황을 알린다.
    pub fn spawn(&self, filename: impl Into<String>) -> TransferHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let requester = self.clone();
        let filename = filename.into();
        let sink = EventSink::new(tx);
        let cancel = sink.notifier();

        let join = tokio::spawn(async move {
            requester.request_file_with_events(&filename, sink).await
        });

        TransferHandle {
            events: rx,
            join,
            cancel,
        }
    }

    /// 파일 요청 (종료 이벤트 정확히 하나 발행)
    pub async fn request_file_with_events(&self, filename: &str, events: EventSink) -> Result<PathBuf> {
        match self.transfer(filename, &events).await {
            Ok((path, total_segments)) => {
                events.emit(TransferEvent::Completed {
                    path: path.clone(),
                    total_segments,
                });
                Ok(path)
            }
            Err(e) => {
                events.emit(TransferEvent::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn transfer(&self, filename: &str, events: &EventSink) -> Result<(PathBuf, u32)> {
        let filename = filename.trim();
        let destination = storage::resolve(&self.config.download_dir, filename)?;

        let mut session = TransferSession::new(filename, self.config.max_transfer_retries.max(1));

        loop {
            let attempt = session.retries + 1;
            info!(
                "전송 시도 {}/{}: {}",
                attempt, session.max_retries, session.filename
            );

            let mut conn = self.connector.connect(&self.config.server_addr).await?;
            let result = run_pass(conn.stream_mut(), &mut session, &self.config, events, attempt).await;
            conn.close().await;

            match result {
                Ok(()) => break,
                Err(e) if e.is_transient() => {
                    session.retries += 1;
                    session.stats.transfer_retries += 1;
                    warn!("전송 시도 {} 실패: {}", attempt, e);
                    events.emit(TransferEvent::PassFailed {
                        attempt,
                        reason: e.to_string(),
                    });

                    if session.retries >= session.max_retries {
                        session.transition(RequesterState::Failed);
                        error!("{}회 시도 후 전송 실패", session.retries);
                        return Err(Error::TransferExhausted {
                            attempts: session.retries,
                            last_error: e.to_string(),
                        });
                    }
                    session.reset_pass();
                }
                Err(e) => {
                    session.transition(RequesterState::Failed);
                    return Err(e);
                }
            }
        }

        session.transition(RequesterState::Reassembling);
        let data = session.reassemble()?;

        if let Err(e) = storage::write_atomic(&destination, &data).await {
            session.transition(RequesterState::Failed);
            error!("파일 저장 실패: {}", e);
            return Err(e);
        }

        session.transition(RequesterState::Saved);
        info!(
            "파일 저장 완료: {:?} ({} bytes) | {}",
            destination,
            data.len(),
            session.stats.summary()
        );
        Ok((destination, session.segment_count))
    }

    /// 제공자에 종료 토큰 전송
    pub async fn send_quit(&self) -> Result<()> {
        let mut conn = self.connector.connect(&self.config.server_addr).await?;
        write_token(conn.stream_mut(), &Token::Quit).await?;
        conn.close().await;
        Ok(())
    }
}
