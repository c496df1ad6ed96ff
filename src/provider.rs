//! 제공자 (서버측)
//!
//! - 연결 하나를 끝까지 처리한 뒤 다음 연결 수락
//! - 파일 검증 → 세그먼트 수 알림 → 세그먼트별 전송/ACK 대기
//! - NAK 시 원본 데이터로 한 번만 재전송

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::codec::{read_raw, read_token, write_packet};
use crate::inject::ErrorInjector;
use crate::message::{Packet, SegmentData, Token};
use crate::segment::{fragment_default, Segment, SegmentIndex};
use crate::stats::{ProviderStats, TransferStats};
use crate::{storage, Config, Error, Result, MIN_FILE_SIZE};

/// 제공자 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    AwaitRequest,
    Validating,
    Announcing,
    Sending(SegmentIndex),
    Done,
    Aborted,
}

/// 세션 종료 결과 (정상 종료만, 나머지는 `Error`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// 모든 세그먼트 전송 및 확인 완료
    Completed { filename: String, segments: u32 },

    /// 빈 요청 또는 종료 토큰
    Quit,
}

/// 세션 하나의 상태 (연결 하나에 대응)
struct ProviderSession<'a, S> {
    stream: &'a mut S,
    config: &'a Config,
    injector: &'a ErrorInjector,
    state: ProviderState,
    stats: TransferStats,
}

impl<'a, S> ProviderSession<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: &'a mut S, config: &'a Config, injector: &'a ErrorInjector) -> Self {
        Self {
            stream,
            config,
            injector,
            state: ProviderState::AwaitRequest,
            stats: TransferStats::new(),
        }
    }

    fn transition(&mut self, next: ProviderState) {
        debug!("제공자 상태: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn run(&mut self) -> Result<SessionOutcome> {
        let filename = match self.await_request().await? {
            Some(name) => name,
            None => {
                self.transition(ProviderState::Done);
                return Ok(SessionOutcome::Quit);
            }
        };

        self.transition(ProviderState::Validating);
        let data = self.validate(&filename).await?;

        self.transition(ProviderState::Announcing);
        let segments = fragment_default(&data);
        info!("파일 분할: {} -> {} segments", filename, segments.len());
        self.announce(segments.len() as u32).await?;

        self.stats.total_segments = segments.len() as u64;
        for segment in &segments {
            self.transition(ProviderState::Sending(segment.index));
            self.send_segment(segment).await?;
        }

        self.transition(ProviderState::Done);
        info!("전송 완료: {} | {}", filename, self.stats.summary());
        Ok(SessionOutcome::Completed {
            filename,
            segments: segments.len() as u32,
        })
    }

    /// 파일 이름 요청 수신 (프레임 없는 원시 바이트)
    async fn await_request(&mut self) -> Result<Option<String>> {
        let raw = match read_raw(&mut *self.stream, self.config.idle_timeout()).await {
            Ok(raw) => raw,
            Err(Error::ConnectionClosed) => {
                debug!("요청 없이 연결 종료");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let filename = String::from_utf8_lossy(&raw).trim().to_string();
        if filename.is_empty() {
            warn!("빈 파일 이름 수신");
            return Ok(None);
        }
        if Token::parse(filename.as_bytes()) == Token::Quit {
            info!("종료 요청 수신");
            return Ok(None);
        }

        info!("파일 요청: {}", filename);
        Ok(Some(filename))
    }

    /// 파일 열기 및 크기 검증
    ///
    /// 실패 시 ErrorNotice를 보내고 에러 반환.
    async fn validate(&mut self, filename: &str) -> Result<Bytes> {
        let path = match storage::resolve(&self.config.serve_dir, filename) {
            Ok(path) => path,
            Err(e) => {
                self.reject("Invalid filename").await?;
                return Err(e);
            }
        };

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("파일 없음: {:?}", path);
                self.reject("File not found").await?;
                return Err(Error::FileNotFound(filename.to_string()));
            }
            Err(e) => {
                warn!("파일 읽기 실패: {:?}: {}", path, e);
                self.reject(e.to_string()).await?;
                return Err(e.into());
            }
        };

        if data.len() < MIN_FILE_SIZE {
            warn!("파일이 너무 작음: {} ({} bytes)", filename, data.len());
            self.reject(format!("File is too small (must be > {} bytes)", MIN_FILE_SIZE))
                .await?;
            return Err(Error::FileTooSmall {
                size: data.len(),
                min: MIN_FILE_SIZE,
            });
        }

        Ok(Bytes::from(data))
    }

    async fn reject(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(ProviderState::Aborted);
        write_packet(&mut *self.stream, &Packet::error(reason)).await
    }

    /// 세그먼트 수 알림 후 OK 대기
    async fn announce(&mut self, count: u32) -> Result<()> {
        write_packet(&mut *self.stream, &Packet::SegmentCount { count }).await?;

        match read_token(&mut *self.stream, self.config.idle_timeout()).await {
            Ok(Token::Ok) => Ok(()),
            Ok(other) => {
                error!("OK 대신 {:?} 수신", other);
                self.abort(Error::AbortedAckMismatch {
                    expected: "OK",
                    got: other.to_string(),
                })
            }
            Err(Error::Timeout(ms)) => {
                error!("세그먼트 수 확인 타임아웃");
                self.abort(Error::AbortedAckMismatch {
                    expected: "OK",
                    got: format!("timeout after {}ms", ms),
                })
            }
            Err(e) => self.abort(e),
        }
    }

    /// 세그먼트 하나 전송 (NAK 시 한 번 재전송)
    async fn send_segment(&mut self, segment: &Segment) -> Result<()> {
        let index = segment.index;
        let packet = self.injector.prepare(segment);
        let injected = packet.error_simulated;
        if injected {
            warn!("세그먼트 {} 에러 주입 ({:?})", index, self.injector.point());
        }

        let len = packet.payload.len();
        write_packet(&mut *self.stream, &Packet::SegmentData(packet)).await?;
        self.stats.record_packet(len, injected);
        info!("세그먼트 {} 전송: {} bytes, 에러 주입={}", index, len, injected);

        match self.await_ack(index).await? {
            Token::Ack => {
                self.stats.completed_segments += 1;
                Ok(())
            }
            Token::Nak => {
                warn!("세그먼트 {} NAK 수신, 원본 재전송", index);
                self.stats.total_naks += 1;
                self.retransmit(segment).await
            }
            other => self.abort(Error::AbortedAckMismatch {
                expected: "ACK/NAK",
                got: other.to_string(),
            }),
        }
    }

    /// 원본 데이터로 재전송, 반드시 ACK 필요
    async fn retransmit(&mut self, segment: &Segment) -> Result<()> {
        let index = segment.index;
        let packet = SegmentData::new(index, segment.payload.clone(), false);
        write_packet(&mut *self.stream, &Packet::SegmentData(packet)).await?;
        self.stats.record_packet(segment.len(), false);
        self.stats.retransmitted_segments += 1;
        info!("세그먼트 {} 재전송: {} bytes", index, segment.len());

        match self.await_ack(index).await? {
            Token::Ack => {
                self.stats.completed_segments += 1;
                Ok(())
            }
            other => {
                error!("세그먼트 {} 재전송 후 ACK 대신 {:?} 수신", index, other);
                self.abort(Error::AbortedRetryFailed {
                    index,
                    got: other.to_string(),
                })
            }
        }
    }

    /// 세그먼트 응답 토큰 대기 (타임아웃은 치명적)
    async fn await_ack(&mut self, index: SegmentIndex) -> Result<Token> {
        match read_token(&mut *self.stream, self.config.idle_timeout()).await {
            Ok(token) => Ok(token),
            Err(Error::Timeout(ms)) => {
                error!("세그먼트 {} ACK 대기 타임아웃", index);
                self.abort(Error::AbortedTimeout(format!(
                    "segment {}: no response within {}ms",
                    index, ms
                )))
            }
            Err(e) => self.abort(e),
        }
    }

    fn abort<T>(&mut self, err: Error) -> Result<T> {
        self.transition(ProviderState::Aborted);
        Err(err)
    }
}

/// 제공자
pub struct Provider {
    /// 설정
    config: Config,

    /// 에러 주입 정책
    injector: ErrorInjector,

    /// 누적 통계
    stats: RwLock<ProviderStats>,

    /// 실행 중 플래그
    running: AtomicBool,
}

impl Provider {
    /// 새 제공자 생성
    pub fn new(config: Config) -> Self {
        Self {
            injector: ErrorInjector::new(config.error_probability).with_point(config.injection_point),
            config,
            stats: RwLock::new(ProviderStats::default()),
            running: AtomicBool::new(false),
        }
    }

    /// 에러 주입 정책 교체
    pub fn with_injector(mut self, injector: ErrorInjector) -> Self {
        self.injector = injector;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 설정된 주소에 바인딩
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.listen_addr.as_str()).await?;
        info!("SFT Provider listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// 연결 수락 루프
    ///
    /// 한 번에 한 연결만 처리한다. 세션 실패는 기록만 하고 루프는 계속된다.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "제공자 시작: serve_dir={:?}, 에러 주입 확률={:.2}",
            self.config.serve_dir,
            self.injector.probability()
        );

        while self.running.load(Ordering::SeqCst) {
            let accepted =
                match tokio::time::timeout(Duration::from_millis(100), listener.accept()).await {
                    Ok(result) => result,
                    Err(_) => continue,
                };

            match accepted {
                Ok((mut stream, addr)) => {
                    info!("클라이언트 연결: {}", addr);
                    let _ = self.serve_connection(&mut stream, addr).await;
                    if let Err(e) = stream.shutdown().await {
                        debug!("연결 종료 중 에러 (무시): {}", e);
                    }
                    info!("클라이언트 연결 종료: {}", addr);
                }
                Err(e) => {
                    warn!("수락 에러: {}", e);
                }
            }
        }

        info!("제공자 정지");
        Ok(())
    }

    /// 연결 하나 처리 후 결과 기록
    pub async fn serve_connection<S>(&self, stream: &mut S, addr: SocketAddr) -> Result<SessionOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = ProviderSession::new(stream, &self.config, &self.injector);
        let result = session.run().await;

        match &result {
            Ok(SessionOutcome::Completed { filename, segments }) => {
                info!("세션 완료 ({}): {} ({} segments)", addr, filename, segments);
                self.stats.write().merge(&session.stats, true);
            }
            Ok(SessionOutcome::Quit) => {
                info!("세션 종료 ({})", addr);
            }
            Err(e) => {
                error!("세션 실패 ({}): {}", addr, e);
                self.stats.write().merge(&session.stats, false);
            }
        }

        result
    }

    /// 정지 (현재 세션 처리 후 루프 종료)
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 통계 반환
    pub fn get_stats(&self) -> ProviderStats {
        self.stats.read().clone()
    }
}
