//! 세그먼트 분할과 재조립
//!
//! - Segment: 파일을 고정 크기로 자른 조각 (마지막 조각만 짧을 수 있음)
//! - 인덱스는 0부터 연속이며 분할 시점에 한 번만 부여된다

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::{Error, Result, SEGMENT_SIZE};

/// 세그먼트 인덱스 (0부터)
pub type SegmentIndex = u32;

/// 세그먼트 (전송 단위)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 세그먼트 인덱스
    pub index: SegmentIndex,

    /// 실제 데이터
    pub payload: Bytes,
}

impl Segment {
    pub fn new(index: SegmentIndex, payload: Bytes) -> Self {
        Self { index, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// 세그먼트 수 계산 (올림)
pub fn segment_count(len: usize, size: usize) -> usize {
    (len + size - 1) / size
}

/// 데이터를 세그먼트들로 분할
///
/// 입력을 빈틈이나 겹침 없이 나눈다. 복사 없이 `Bytes`를 잘라 쓴다.
pub fn fragment(data: &Bytes, size: usize) -> Result<Vec<Segment>> {
    if size == 0 {
        return Err(Error::InvalidSegmentSize(size));
    }

    let total = segment_count(data.len(), size);
    Ok((0..total)
        .map(|idx| {
            let start = idx * size;
            let end = (start + size).min(data.len());
            Segment::new(idx as SegmentIndex, data.slice(start..end))
        })
        .collect())
}

/// 기본 크기(512 bytes)로 분할
pub fn fragment_default(data: &Bytes) -> Vec<Segment> {
    // SEGMENT_SIZE는 0이 아니므로 실패하지 않음
    fragment(data, SEGMENT_SIZE).unwrap_or_default()
}

/// 인덱스 순서대로 재조립
///
/// 맵이 정확히 0..count-1 을 가지고 있을 때만 성공한다.
pub fn reassemble(segments: &BTreeMap<SegmentIndex, Bytes>, count: usize) -> Result<Bytes> {
    let complete = segments.len() == count
        && segments
            .keys()
            .enumerate()
            .all(|(expected, &index)| index as usize == expected);

    if !complete {
        return Err(Error::IncompleteTransfer {
            expected: count,
            got: segments.len(),
        });
    }

    let total_len = segments.values().map(Bytes::len).sum();
    let mut buf = BytesMut::with_capacity(total_len);
    for payload in segments.values() {
        buf.extend_from_slice(payload);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(len: usize) {
        let data: Bytes = (0..len).map(|i| (i % 253) as u8).collect::<Vec<_>>().into();
        let segments = fragment_default(&data);

        assert_eq!(segments.len(), segment_count(len, SEGMENT_SIZE));
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index as usize, i);
            assert!(segment.len() <= SEGMENT_SIZE);
            if i + 1 < segments.len() {
                assert_eq!(segment.len(), SEGMENT_SIZE);
            }
        }

        let map: BTreeMap<_, _> = segments
            .into_iter()
            .map(|s| (s.index, s.payload))
            .collect();
        let restored = reassemble(&map, map.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_fragment_reassemble_lengths() {
        roundtrip(0);
        roundtrip(512);
        roundtrip(513);
        roundtrip(2048);
        roundtrip(100_003);
    }

    #[test]
    fn test_last_segment_length() {
        let data = Bytes::from(vec![7u8; 1300]);
        let segments = fragment(&data, 512).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].len(), 1300 % 512);

        let exact = Bytes::from(vec![7u8; 1024]);
        let segments = fragment(&exact, 512).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].len(), 512);
    }

    #[test]
    fn test_zero_size_rejected() {
        let data = Bytes::from_static(b"abc");
        assert!(matches!(
            fragment(&data, 0),
            Err(Error::InvalidSegmentSize(0))
        ));
    }

    #[test]
    fn test_reassemble_missing_index() {
        let mut map = BTreeMap::new();
        map.insert(0, Bytes::from_static(b"aa"));
        map.insert(2, Bytes::from_static(b"cc"));

        assert!(matches!(
            reassemble(&map, 3),
            Err(Error::IncompleteTransfer { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_reassemble_out_of_range_index() {
        let mut map = BTreeMap::new();
        map.insert(0, Bytes::from_static(b"aa"));
        map.insert(5, Bytes::from_static(b"ff"));

        assert!(reassemble(&map, 2).is_err());
    }
}
