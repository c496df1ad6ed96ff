//! 연결 관리자 (요청자측)
//!
//! - 재시도 횟수 제한이 있는 TCP 연결
//! - 연결 거부/타임아웃 시 지수 백오프 (2^attempt)
//! - 그 외 에러는 즉시 중단

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{Config, Error, Result};

/// 일회용 전송 연결
///
/// 요청 하나와 그 응답 전송에만 쓰이고 닫힌다.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        Ok(Self {
            stream,
            peer_addr,
            local_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    /// 쓰기 방향 종료 후 연결 닫기
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("연결 종료 중 에러 (무시): {}", e);
        }
    }
}

/// 연결 관리자
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    config: Config,
}

impl ConnectionManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 재시도 대상 에러 여부 (거부, 타임아웃)
    fn is_retryable(kind: ErrorKind) -> bool {
        matches!(kind, ErrorKind::ConnectionRefused | ErrorKind::TimedOut)
    }

    /// 제공자에 연결
    ///
    /// `addr`는 `host:port` 형식이며 시도마다 이름을 다시 해석한다.
    pub async fn connect(&self, addr: &str) -> Result<Connection> {
        let stream = self.connect_with(addr, || TcpStream::connect(addr)).await?;
        let conn = Connection::new(stream)?;
        info!("제공자 연결: {} (local {})", conn.peer_addr(), conn.local_addr());
        Ok(conn)
    }

    /// 주어진 다이얼 함수로 재시도 정책 적용
    pub async fn connect_with<T, F, Fut>(&self, addr: &str, mut dial: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<T>>,
    {
        let max_attempts = self.config.max_connect_retries.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            let result = match timeout(self.config.connect_timeout(), dial()).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(ErrorKind::TimedOut, "connect timed out")),
            };

            match result {
                Ok(stream) => return Ok(stream),
                Err(e) if Self::is_retryable(e.kind()) => {
                    last_reason = e.to_string();
                    if attempt == max_attempts {
                        break;
                    }
                    let wait = self.config.backoff(attempt);
                    warn!(
                        "연결 시도 {}/{} 실패: {}. {:?} 후 재시도",
                        attempt, max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!("연결 에러: {}", e);
                    return Err(Error::ConnectionFailed {
                        addr: addr.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }

        warn!("{}회 시도 후 연결 실패: {}", max_attempts, addr);
        Err(Error::ConnectionFailed {
            addr: addr.to_string(),
            attempts: max_attempts,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let manager = ConnectionManager::new(Config::local_test());
        let conn = manager.connect(&addr.to_string()).await.unwrap();
        assert_eq!(conn.peer_addr(), addr);

        accept.await.unwrap();
        conn.close().await;
    }

    #[tokio::test]
    async fn test_refused_exhausts_retries() {
        // 바인드 후 바로 닫아서 거부되는 포트 확보
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config {
            max_connect_retries: 3,
            ..Config::local_test()
        };
        let manager = ConnectionManager::new(config);

        let start = Instant::now();
        let result = manager.connect(&addr.to_string()).await;
        match result {
            Err(Error::ConnectionFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
        // 백오프 2ms + 4ms
        assert!(start.elapsed().as_millis() >= 6);
    }

    #[tokio::test]
    async fn test_other_error_aborts_immediately() {
        let manager = ConnectionManager::new(Config::local_test());
        let mut calls = 0u32;

        let result: Result<()> = manager
            .connect_with("127.0.0.1:1", || {
                calls += 1;
                async {
                    Err(std::io::Error::new(
                        ErrorKind::PermissionDenied,
                        "permission denied",
                    ))
                }
            })
            .await;

        match result {
            Err(Error::ConnectionFailed { attempts, reason, .. }) => {
                assert_eq!(attempts, 1);
                assert!(reason.contains("permission denied"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_refused_then_connected() {
        let manager = ConnectionManager::new(Config::local_test());
        let mut calls = 0u32;

        let result = manager
            .connect_with("127.0.0.1:1", || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err(std::io::Error::from(ErrorKind::ConnectionRefused))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails() {
        let manager = ConnectionManager::new(Config::local_test());
        let result = manager.connect("no-such-host.invalid:12345").await;
        assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
    }
}
