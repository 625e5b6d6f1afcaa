//! # Sprout
//!
//! 데이터그램 전송용 확률적 도착률 예측 혼잡 제어기
//!
//! ## 핵심 특징
//! - **베이지안 관측**: 틱(20ms)마다 ACK 도착 수를 Poisson 우도로 반영
//! - **랜덤 워크 예측**: 가우시안 확산으로 최소 RTT 만큼 앞의 용량 분포 예측
//! - **보수적 윈도우**: 예측 분포의 분위수 × 목표 RTT 로 in-flight 데이터그램 수 결정
//! - **RTT 필터**: 최근 RTT 샘플 최대값으로 재전송 타임아웃 상한 제공
//! - **주입형 진단**: 콘솔 출력 없이 [`DebugSink`] 로 이벤트 전달
//!
//! 소켓 I/O, 프레이밍, 재전송은 호출자(전송 계층)의 책임이다.
//!
//! ```
//! use sprout::Controller;
//!
//! let mut cc = Controller::new(false);
//! cc.datagram_was_sent(1, 1000);
//! cc.ack_received(1, 1000, 1020, 1040);
//! assert!(cc.window_size() >= 4);
//! ```

pub mod belief;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod sink;
pub mod stats;

pub use belief::{poisson_ln_pdf, poisson_pdf, BeliefDistribution, BinLayout, DiffusionKernel};
pub use config::{Config, MIN_WINDOW};
pub use controller::{Controller, RateEstimate};
pub use error::{Error, Result};
pub use filter::ExtremumFilter;
pub use sink::{ControllerEvent, DebugSink, MemorySink, NullSink, TracingSink};
pub use stats::ControllerStats;
