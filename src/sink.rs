//! 디버그 이벤트 싱크
//!
//! 컨트롤러는 콘솔에 직접 쓰지 않는다. 주요 시점마다 [`ControllerEvent`] 를
//! 만들어 주입된 [`DebugSink`] 로 넘긴다.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

/// 컨트롤러 진단 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// 데이터그램 송신
    DatagramSent { sequence_number: u64, send_time_ms: u64 },

    /// ACK 수신
    AckReceived {
        sequence_number: u64,
        send_time_ms: u64,
        recv_time_ms: u64,
        ack_time_ms: u64,
        rtt_ms: u64,
    },

    /// Poisson 관측 갱신
    Observation {
        now_ms: u64,
        arrivals: u64,
        elapsed_ms: u64,
    },

    /// 예측 한 단계 (horizon 내부)
    Forecast {
        step: u32,
        quantile_rate: f64,
        caught_up: bool,
    },

    /// 윈도우 재계산 완료
    WindowUpdated {
        now_ms: u64,
        window: f64,
        max_rate: f64,
        max_rate_future: f64,
        qmin_rate: f64,
        avg_rtt_ms: f64,
        min_rtt_ms: u64,
    },

    /// 윈도우 조회
    WindowQueried { window: u32 },
}

/// 진단 이벤트 수신자
pub trait DebugSink: Send {
    fn record(&self, event: ControllerEvent);
}

/// 모든 이벤트 무시
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn record(&self, _event: ControllerEvent) {}
}

/// `tracing` 으로 이벤트 전달
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn record(&self, event: ControllerEvent) {
        match event {
            ControllerEvent::DatagramSent {
                sequence_number,
                send_time_ms,
            } => {
                debug!("At time {} sent datagram {}", send_time_ms, sequence_number);
            }
            ControllerEvent::AckReceived {
                sequence_number,
                send_time_ms,
                recv_time_ms,
                ack_time_ms,
                rtt_ms,
            } => {
                debug!(
                    "At time {} received ack for datagram {} (send @ {}, received @ {} by receiver's clock, rtt {}ms)",
                    ack_time_ms, sequence_number, send_time_ms, recv_time_ms, rtt_ms
                );
            }
            ControllerEvent::Observation {
                now_ms,
                arrivals,
                elapsed_ms,
            } => {
                trace!(now_ms, arrivals, elapsed_ms, "observation");
            }
            ControllerEvent::Forecast {
                step,
                quantile_rate,
                caught_up,
            } => {
                trace!(step, quantile_rate, caught_up, "forecast step");
            }
            ControllerEvent::WindowUpdated {
                now_ms,
                window,
                max_rate,
                max_rate_future,
                qmin_rate,
                avg_rtt_ms,
                min_rtt_ms,
            } => {
                debug!(
                    now_ms,
                    window,
                    max_rate,
                    max_rate_future,
                    qmin_rate,
                    avg_rtt_ms,
                    min_rtt_ms,
                    "window updated"
                );
            }
            ControllerEvent::WindowQueried { window } => {
                debug!("window size is {}", window);
            }
        }
    }
}

/// 이벤트를 메모리에 수집 (테스트/시뮬레이터용)
///
/// 복제본은 같은 버퍼를 공유한다.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<ControllerEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집된 이벤트 복사본
    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events.lock().clone()
    }

    /// 수집된 이벤트를 꺼내고 비움
    pub fn drain(&self) -> Vec<ControllerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl DebugSink for MemorySink {
    fn record(&self, event: ControllerEvent) {
        self.events.lock().push(event);
    }
}
