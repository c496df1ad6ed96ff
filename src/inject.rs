//! 에러 주입기 (테스트 하네스, 제공자 전용)
//!
//! 확률에 따라 세그먼트의 바이트 하나를 `(원래 값 + 1) mod 256`으로 바꾼다.
//! 손상 여부는 패킷의 `error_simulated` 플래그로 함께 전달된다.
//!
//! 주입 위치는 두 가지:
//! - `BeforeChecksum`: 손상된 데이터로 체크섬 계산 (송신측 손상, 수신측이 검출할 수 없음)
//! - `InTransit`: 원본으로 체크섬 계산 후 손상 (채널 손상, 수신측이 NAK)

use std::collections::HashSet;

use bytes::{Bytes, BytesMut};
use rand::Rng;

use crate::checksum;
use crate::message::SegmentData;
use crate::segment::{Segment, SegmentIndex};

/// 스레드 로컬 RNG로 에러 주입
pub fn inject(payload: &Bytes, probability: f64) -> (Bytes, bool) {
    inject_with(&mut rand::thread_rng(), payload, probability)
}

/// 주어진 RNG로 에러 주입
///
/// 반환값: (전송할 데이터, 손상 여부)
pub fn inject_with<R: Rng>(rng: &mut R, payload: &Bytes, probability: f64) -> (Bytes, bool) {
    let probability = normalize(probability);
    if payload.is_empty() || !rng.gen_bool(probability) {
        return (payload.clone(), false);
    }

    let pos = rng.gen_range(0..payload.len());
    (corrupt_at(payload, pos), true)
}

/// 확률을 [0, 1]로 제한 (NaN은 0)
fn normalize(probability: f64) -> f64 {
    if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    }
}

/// 지정 위치 바이트 하나를 +1
fn corrupt_at(payload: &Bytes, pos: usize) -> Bytes {
    let mut buf = BytesMut::from(&payload[..]);
    buf[pos] = buf[pos].wrapping_add(1);
    buf.freeze()
}

/// 에러 주입 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionPoint {
    /// 체크섬 계산 전 (체크섬이 전송 바이트와 일치)
    #[default]
    BeforeChecksum,

    /// 체크섬 계산 후 (전송 중 손상처럼 동작)
    InTransit,
}

/// 세그먼트별 에러 주입 정책
#[derive(Debug, Clone, Default)]
pub struct ErrorInjector {
    /// 세그먼트별 손상 확률
    probability: f64,

    /// 주입 위치
    point: InjectionPoint,

    /// 확률과 무관하게 항상 손상시킬 세그먼트
    forced: HashSet<SegmentIndex>,
}

impl ErrorInjector {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: normalize(probability),
            point: InjectionPoint::default(),
            forced: HashSet::new(),
        }
    }

    /// 주입 위치 지정
    pub fn with_point(mut self, point: InjectionPoint) -> Self {
        self.point = point;
        self
    }

    /// 에러 주입 없음
    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    /// 특정 세그먼트를 항상 손상
    pub fn force_segments(mut self, indices: impl IntoIterator<Item = SegmentIndex>) -> Self {
        self.forced.extend(indices);
        self
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn point(&self) -> InjectionPoint {
        self.point
    }

    /// 세그먼트 하나에 정책 적용
    pub fn apply(&self, index: SegmentIndex, payload: &Bytes) -> (Bytes, bool) {
        let probability = if self.forced.contains(&index) {
            1.0
        } else {
            self.probability
        };
        inject(payload, probability)
    }

    /// 전송할 세그먼트 메시지 생성 (주입 위치에 따라 체크섬 대상이 다름)
    pub fn prepare(&self, segment: &Segment) -> SegmentData {
        let (payload, injected) = self.apply(segment.index, &segment.payload);
        let checksum = match self.point {
            InjectionPoint::BeforeChecksum => checksum::compute(&payload),
            InjectionPoint::InTransit => checksum::compute(&segment.payload),
        };

        SegmentData {
            index: segment.index,
            payload,
            checksum,
            error_simulated: injected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample() -> Bytes {
        Bytes::from((0..512).map(|i| (i % 256) as u8).collect::<Vec<_>>())
    }

    fn diff_count(a: &[u8], b: &[u8]) -> usize {
        a.iter().zip(b).filter(|(x, y)| x != y).count()
    }

    #[test]
    fn test_zero_probability_unchanged() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = sample();
        for _ in 0..200 {
            let (out, corrupted) = inject_with(&mut rng, &data, 0.0);
            assert!(!corrupted);
            assert_eq!(out, data);
        }
    }

    #[test]
    fn test_full_probability_one_byte() {
        let mut rng = StdRng::seed_from_u64(42);
        let data = sample();
        for _ in 0..200 {
            let (out, corrupted) = inject_with(&mut rng, &data, 1.0);
            assert!(corrupted);
            assert_eq!(out.len(), data.len());
            assert_eq!(diff_count(&out, &data), 1);

            let pos = out.iter().zip(data.iter()).position(|(x, y)| x != y).unwrap();
            assert_eq!(out[pos], data[pos].wrapping_add(1));
        }
    }

    #[test]
    fn test_empty_payload_never_corrupted() {
        let (out, corrupted) = inject(&Bytes::new(), 1.0);
        assert!(!corrupted);
        assert!(out.is_empty());
    }

    #[test]
    fn test_forced_segments() {
        let injector = ErrorInjector::disabled().force_segments([2]);
        let data = sample();

        let (out, corrupted) = injector.apply(1, &data);
        assert!(!corrupted);
        assert_eq!(out, data);

        let (out, corrupted) = injector.apply(2, &data);
        assert!(corrupted);
        assert_eq!(diff_count(&out, &data), 1);
    }

    #[test]
    fn test_prepare_before_checksum_verifies() {
        let injector = ErrorInjector::new(1.0);
        let segment = Segment::new(0, sample());

        let packet = injector.prepare(&segment);
        assert!(packet.error_simulated);
        assert_ne!(packet.payload, segment.payload);
        // 체크섬이 손상된 바이트를 덮으므로 검증 통과
        assert!(packet.verify());
    }

    #[test]
    fn test_prepare_in_transit_detected() {
        let injector = ErrorInjector::new(1.0).with_point(InjectionPoint::InTransit);
        let segment = Segment::new(3, sample());

        let packet = injector.prepare(&segment);
        assert!(packet.error_simulated);
        assert_eq!(packet.checksum, checksum::compute(&segment.payload));
        assert!(!packet.verify());
    }
}
