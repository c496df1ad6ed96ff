//! 프로토콜 설정

use std::path::PathBuf;
use std::time::Duration;

use crate::inject::InjectionPoint;
use crate::{Error, Result, DEFAULT_PORT, MAX_CONNECT_RETRIES, MAX_TRANSFER_RETRIES};

/// SFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 제공자 바인드 주소 (`host:port`)
    pub listen_addr: String,

    /// 요청자가 접속할 제공자 주소 (`host:port`, 호스트 이름 허용)
    pub server_addr: String,

    /// 제공자가 파일을 찾는 디렉터리
    pub serve_dir: PathBuf,

    /// 요청자가 수신 파일을 저장하는 디렉터리
    pub download_dir: PathBuf,

    /// 세그먼트별 에러 주입 확률 (0.0 ~ 1.0)
    pub error_probability: f64,

    /// 에러 주입 위치 (체크섬 계산 전/후)
    pub injection_point: InjectionPoint,

    /// 블로킹 읽기 유휴 타임아웃 (밀리초)
    pub idle_timeout_ms: u64,

    /// 연결 시도당 타임아웃 (밀리초)
    pub connect_timeout_ms: u64,

    /// 연결 재시도 백오프 단위 (밀리초)
    /// 대기 시간 = 2^attempt × backoff_unit
    pub backoff_unit_ms: u64,

    /// 최대 연결 시도 횟수
    pub max_connect_retries: u32,

    /// 최대 전체 전송 시도 횟수
    pub max_transfer_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            server_addr: format!("localhost:{}", DEFAULT_PORT),
            serve_dir: PathBuf::from("."),
            download_dir: PathBuf::from("downloads"),
            error_probability: 0.0,
            injection_point: InjectionPoint::BeforeChecksum,
            idle_timeout_ms: 30_000,          // 30초
            connect_timeout_ms: 30_000,       // 30초
            backoff_unit_ms: 1000,            // 2, 4, 8초
            max_connect_retries: MAX_CONNECT_RETRIES,
            max_transfer_retries: MAX_TRANSFER_RETRIES,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 에러 주입이 잦은 데모용 설정
    pub fn lossy() -> Self {
        Self {
            error_probability: 0.8,
            ..Self::default()
        }
    }

    /// 루프백 테스트용 설정 (짧은 타임아웃, 밀리초 백오프)
    pub fn local_test() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            idle_timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            backoff_unit_ms: 1,
            ..Self::default()
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// n번째 시도 실패 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(factor))
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        for (name, addr) in [("listen_addr", &self.listen_addr), ("server_addr", &self.server_addr)] {
            if !has_host_and_port(addr) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be host:port, got {:?}",
                    name, addr
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.error_probability) {
            return Err(Error::InvalidConfig(format!(
                "error_probability must be within [0, 1], got {}",
                self.error_probability
            )));
        }
        if self.max_connect_retries == 0 {
            return Err(Error::InvalidConfig("max_connect_retries must be > 0".into()));
        }
        if self.max_transfer_retries == 0 {
            return Err(Error::InvalidConfig("max_transfer_retries must be > 0".into()));
        }
        if self.idle_timeout_ms == 0 {
            return Err(Error::InvalidConfig("idle_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// `host:port` 형식 여부 (IPv6는 `[addr]:port`)
fn has_host_and_port(addr: &str) -> bool {
    match addr.trim().rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_transfer_retries, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_doubles() {
        let config = Config::default();
        assert_eq!(config.backoff(1), Duration::from_secs(2));
        assert_eq!(config.backoff(2), Duration::from_secs(4));
        assert_eq!(config.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_rejects_bad_probability() {
        let config = Config {
            error_probability: 1.5,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_address_forms() {
        let config = Config {
            server_addr: "localhost:12345".into(),
            listen_addr: "[::1]:0".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        for bad in ["localhost", ":12345", "host:port", "host:70000"] {
            let config = Config {
                server_addr: bad.into(),
                ..Config::default()
            };
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
