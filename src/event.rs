//! 전송 진행 이벤트
//!
//! 전송 워커가 생산하고 호출자가 소비하는 순서 보장 채널.
//! 순서: 시도마다 `Started`, 인덱스 순의 `Segment`, 실패한 시도는 `PassFailed`,
//! 마지막에 `Completed` 또는 `Failed` 정확히 하나.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::segment::SegmentIndex;

/// 세그먼트 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// 첫 수신에 검증 성공
    Success,
    /// 재전송으로 검증 성공
    Retry,
    /// 검증 실패 또는 수신 실패
    Error,
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SegmentStatus::Success => "success",
            SegmentStatus::Retry => "retry",
            SegmentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// 진행 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Started {
        filename: String,
        segment_count: u32,
        attempt: u32,
    },
    Segment {
        index: SegmentIndex,
        status: SegmentStatus,
        message: String,
        error_simulated: bool,
    },
    PassFailed {
        attempt: u32,
        reason: String,
    },
    Completed {
        path: PathBuf,
        total_segments: u32,
    },
    Failed {
        reason: String,
    },
}

impl TransferEvent {
    /// 종료 이벤트 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferEvent::Completed { .. } | TransferEvent::Failed { .. })
    }
}

pub type EventSender = mpsc::UnboundedSender<TransferEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransferEvent>;

/// 이벤트 발행기 (채널이 없으면 아무것도 하지 않음)
///
/// 종료 이벤트가 나간 뒤에는 아무것도 보내지 않는다.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<EventSender>,
    finished: Arc<Mutex<bool>>,
}

impl EventSink {
    pub fn new(tx: EventSender) -> Self {
        Self {
            tx: Some(tx),
            finished: Arc::new(Mutex::new(false)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: TransferEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        let mut finished = self.finished.lock();
        if *finished {
            return;
        }
        if event.is_terminal() {
            *finished = true;
        }
        // 수신측이 먼저 사라져도 전송은 계속한다
        let _ = tx.send(event);
    }

    /// 워커 밖에서 종료 이벤트를 보낼 수 있는 약한 핸들
    ///
    /// 채널을 열어 두지 않으므로 워커가 끝나면 수신측은 `None`을 받는다.
    pub fn notifier(&self) -> CancelNotifier {
        CancelNotifier {
            tx: self.tx.as_ref().map(|tx| tx.downgrade()),
            finished: self.finished.clone(),
        }
    }

    pub(crate) fn segment(
        &self,
        index: SegmentIndex,
        status: SegmentStatus,
        message: impl Into<String>,
        error_simulated: bool,
    ) {
        self.emit(TransferEvent::Segment {
            index,
            status,
            message: message.into(),
            error_simulated,
        });
    }
}

/// 취소 시 `Failed` 이벤트 발행
#[derive(Debug, Clone)]
pub struct CancelNotifier {
    tx: Option<mpsc::WeakUnboundedSender<TransferEvent>>,
    finished: Arc<Mutex<bool>>,
}

impl CancelNotifier {
    /// 아직 종료 이벤트가 없으면 `Failed`를 보내고 이후 이벤트를 막는다
    ///
    /// 보냈으면 true.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let mut finished = self.finished.lock();
        if *finished {
            return false;
        }
        *finished = true;

        match self.tx.as_ref().and_then(|tx| tx.upgrade()) {
            Some(tx) => tx
                .send(TransferEvent::Failed {
                    reason: reason.into(),
                })
                .is_ok(),
            None => false,
        }
    }
}
