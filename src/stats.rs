//! 전송 통계

use std::time::{Duration, Instant};

/// 세션 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 총 세그먼트 수
    pub total_segments: u64,

    /// 확인(ACK)된 세그먼트 수
    pub completed_segments: u64,

    /// 전송/수신한 데이터 바이트 (재전송 포함)
    pub total_bytes: u64,

    /// 전송/수신한 세그먼트 패킷 수 (재전송 포함)
    pub total_packets: u64,

    /// 에러가 주입된 세그먼트 수
    pub injected_errors: u64,

    /// 체크섬 불일치 수
    pub checksum_failures: u64,

    /// 총 NAK 수
    pub total_naks: u64,

    /// 재전송 세그먼트 수
    pub retransmitted_segments: u64,

    /// 전체 전송 재시도 수
    pub transfer_retries: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_segments: 0,
            completed_segments: 0,
            total_bytes: 0,
            total_packets: 0,
            injected_errors: 0,
            checksum_failures: 0,
            total_naks: 0,
            retransmitted_segments: 0,
            transfer_retries: 0,
        }
    }

    /// 세그먼트 패킷 하나 기록
    pub fn record_packet(&mut self, bytes: usize, injected: bool) {
        self.total_packets += 1;
        self.total_bytes += bytes as u64;
        if injected {
            self.injected_errors += 1;
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn overall_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.total_packets == 0 {
            return 0.0;
        }
        self.retransmitted_segments as f64 / self.total_packets as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Segments: {}/{} | Bytes: {} | Injected: {} | NAKs: {} | Retransmits: {} | Retries: {}",
            self.elapsed().as_secs_f64(),
            self.completed_segments,
            self.total_segments,
            self.total_bytes,
            self.injected_errors,
            self.total_naks,
            self.retransmitted_segments,
            self.transfer_retries,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 제공자 누적 통계 (세션 전체)
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    /// 처리한 세션 수
    pub sessions: u64,

    /// 전송 완료 세션 수
    pub completed: u64,

    /// 실패/중단 세션 수
    pub failed: u64,

    /// 세션별 통계 누적
    pub transfer: TransferStats,
}

impl ProviderStats {
    /// 세션 하나 결과 합산
    pub fn merge(&mut self, session: &TransferStats, success: bool) {
        self.sessions += 1;
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }

        let total = &mut self.transfer;
        total.total_segments += session.total_segments;
        total.completed_segments += session.completed_segments;
        total.total_bytes += session.total_bytes;
        total.total_packets += session.total_packets;
        total.injected_errors += session.injected_errors;
        total.checksum_failures += session.checksum_failures;
        total.total_naks += session.total_naks;
        total.retransmitted_segments += session.retransmitted_segments;
        total.transfer_retries += session.transfer_retries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut session = TransferStats::new();
        session.total_segments = 4;
        session.record_packet(512, true);
        session.record_packet(512, false);
        session.retransmitted_segments = 1;
        session.total_naks = 1;

        assert_eq!(session.total_bytes, 1024);
        assert_eq!(session.injected_errors, 1);
        assert!((session.retransmit_ratio() - 0.5).abs() < f64::EPSILON);

        let mut provider = ProviderStats::default();
        provider.merge(&session, true);
        provider.merge(&session, false);

        assert_eq!(provider.sessions, 2);
        assert_eq!(provider.completed, 1);
        assert_eq!(provider.failed, 1);
        assert_eq!(provider.transfer.total_packets, 4);
        assert_eq!(provider.transfer.total_naks, 2);
    }
}
