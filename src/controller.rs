//! 도착률 신뢰 기반 혼잡 제어기
//!
//! ACK 마다 다음을 수행한다.
//! 1. RTT 평활 평균과 RTT 필터 갱신
//! 2. 틱(기본 20ms) 경계마다 관측된 ACK 수로 신뢰 분포를 Poisson 갱신
//! 3. 재계산이 필요하면 RTT 최소값 만큼 앞을 랜덤 워크로 예측
//! 4. 현재/예측 분포의 분위수로 윈도우 결정
//!
//! 시간은 모두 호출자가 넘겨준 밀리초 타임스탬프를 사용한다.

use std::fmt;

use crate::belief::{BeliefDistribution, BinLayout, DiffusionKernel};
use crate::config::Config;
use crate::error::Result;
use crate::filter::ExtremumFilter;
use crate::sink::{ControllerEvent, DebugSink, NullSink, TracingSink};
use crate::stats::ControllerStats;

/// 마지막 윈도우 결정에 사용된 도착률 추정치 (packets/sec)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimate {
    /// 현재 분포의 분위수
    pub max_rate: f64,

    /// 최종 예측 분포의 분위수 (진단용)
    pub max_rate_future: f64,

    /// 예측 단계별 분위수의 최대값
    pub qmin_rate: f64,

    /// 윈도우 계산에 사용된 도착률
    pub forward_rate: f64,
}

/// 관측 경계: 시각과 그 시점의 누적 ACK 기준값
#[derive(Debug, Clone, Copy)]
struct ObservationBoundary {
    time_ms: u64,
    acked: u64,
}

/// 도착률 신뢰 분포 기반 윈도우 컨트롤러
pub struct Controller {
    config: Config,
    layout: BinLayout,
    kernel: DiffusionKernel,
    sink: Box<dyn DebugSink>,

    /// 최근 RTT 샘플 (밀리초)
    rtt_filter: ExtremumFilter,

    /// 현재 도착률 신뢰 분포
    belief: BeliefDistribution,

    /// 예측 분포
    future: BeliefDistribution,

    /// 확산 출력 버퍼
    scratch: BeliefDistribution,

    /// 지수 평활 평균 RTT (밀리초)
    avg_rtt: f64,

    observation: Option<ObservationBoundary>,

    /// 예측이 실제 시간에 맞춰 진행된 기준 시각
    mode_stamp: Option<u64>,

    /// 새 관측 이후 윈도우 재계산 필요
    require_update: bool,

    highest_sent: u64,
    highest_acked: u64,

    window: f64,
    estimate: Option<RateEstimate>,
    stats: ControllerStats,
}

impl Controller {
    /// 기본 설정 컨트롤러
    ///
    /// `debug` 가 true 이면 이벤트를 `tracing` 으로 출력한다.
    pub fn new(debug: bool) -> Self {
        let sink: Box<dyn DebugSink> = if debug {
            Box::new(TracingSink)
        } else {
            Box::new(NullSink)
        };
        Self::build(Config::default(), sink)
    }

    /// 설정과 이벤트 싱크를 지정해 생성
    pub fn with_config(config: Config, sink: Box<dyn DebugSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, sink))
    }

    fn build(config: Config, sink: Box<dyn DebugSink>) -> Self {
        let layout = BinLayout::new(&config);
        let kernel = DiffusionKernel::from_config(&config);
        let rtt_filter = ExtremumFilter::new(config.rtt_filter_capacity, config.rtt_filter_default)
            .with_ceiling(config.rate_ceiling_ms());
        let num_bins = config.num_bins;

        Self {
            layout,
            kernel,
            sink,
            rtt_filter,
            belief: BeliefDistribution::uniform(num_bins),
            future: BeliefDistribution::uniform(num_bins),
            scratch: BeliefDistribution::uniform(num_bins),
            avg_rtt: 0.0,
            observation: None,
            mode_stamp: None,
            require_update: false,
            highest_sent: 0,
            highest_acked: 0,
            window: config.initial_window as f64,
            estimate: None,
            stats: ControllerStats::new(),
            config,
        }
    }

    /// 현재 윈도우 (데이터그램 수), 최소 윈도우 미만으로 내려가지 않음
    pub fn window_size(&self) -> u32 {
        let window = self.window.max(self.config.min_window as f64).floor() as u32;
        self.sink.record(ControllerEvent::WindowQueried { window });
        window
    }

    /// 데이터그램 송신 기록
    pub fn datagram_was_sent(&mut self, sequence_number: u64, send_time_ms: u64) {
        self.highest_sent = self.highest_sent.max(sequence_number);
        self.stats.datagrams_sent += 1;
        self.sink.record(ControllerEvent::DatagramSent {
            sequence_number,
            send_time_ms,
        });
    }

    /// ACK 수신 처리
    ///
    /// 타임스탬프 일관성은 검증하지 않는다. `ack_time_ms < send_time_ms` 이면
    /// RTT 가 매우 큰 값이 된다.
    pub fn ack_received(
        &mut self,
        sequence_number_acked: u64,
        send_time_ms: u64,
        recv_time_ms: u64,
        ack_time_ms: u64,
    ) {
        let rtt = ack_time_ms.wrapping_sub(send_time_ms);

        self.avg_rtt += (rtt as f64 - self.avg_rtt) / self.config.rtt_smooth;
        self.rtt_filter.push(rtt);
        self.highest_acked = self.highest_acked.max(sequence_number_acked);
        self.stats.acks_received += 1;

        self.evolve(ack_time_ms);

        self.sink.record(ControllerEvent::AckReceived {
            sequence_number: sequence_number_acked,
            send_time_ms,
            recv_time_ms,
            ack_time_ms,
            rtt_ms: rtt,
        });
    }

    /// 재전송 타이머 상한 (밀리초): RTT 필터의 최대값
    pub fn timeout_ms(&self) -> u64 {
        self.rtt_filter.max()
    }

    fn evolve(&mut self, now: u64) {
        self.observe(now);

        let Some(mode_stamp) = self.mode_stamp else {
            self.mode_stamp = Some(now);
            return;
        };

        let tick = self.config.tick_length_ms;
        let elapsed = now.saturating_sub(mode_stamp);
        if !self.require_update || elapsed < tick {
            return;
        }
        self.require_update = false;

        let qmin_rate = self.forecast(mode_stamp, elapsed);
        self.decide_window(now, qmin_rate);
    }

    /// 틱 경계를 넘었으면 경계 이후 ACK 수로 Poisson 관측 갱신
    fn observe(&mut self, now: u64) {
        let boundary = match self.observation {
            Some(boundary) => boundary,
            None => {
                self.observation = Some(ObservationBoundary {
                    time_ms: now,
                    acked: self.highest_acked,
                });
                return;
            }
        };

        let elapsed_ms = now.saturating_sub(boundary.time_ms);
        if elapsed_ms < self.config.tick_length_ms {
            return;
        }

        let arrivals = self.highest_acked.saturating_sub(boundary.acked);
        self.belief.normalize();
        self.belief
            .observe(&self.layout, arrivals, 0.001 * elapsed_ms as f64);
        self.require_update = true;

        self.observation = Some(ObservationBoundary {
            time_ms: now,
            acked: self.highest_acked,
        });

        self.stats.observations += 1;
        self.stats.observed_arrivals += arrivals;
        self.sink.record(ControllerEvent::Observation {
            now_ms: now,
            arrivals,
            elapsed_ms,
        });
    }

    /// `elapsed + horizon` 까지 틱 단위로 확산 예측, 단계별 분위수 최대값 반환
    ///
    /// 실제 경과 시간 안에 드는 단계는 현재 분포에도 반영하고, mode_stamp 는
    /// 그만큼만 전진한다.
    fn forecast(&mut self, mode_stamp: u64, elapsed: u64) -> f64 {
        let tick = self.config.tick_length_ms;
        let mass = self.config.confidence_mass();
        let horizon = self.rtt_filter.min();
        let limit = elapsed.saturating_add(horizon);

        self.belief.normalize();
        self.future.copy_from(&self.belief);

        let mut qmin_rate = 1.0;
        let mut offset = 0u64;
        let mut caught_up = 0u64;
        let mut step = 0u32;

        while offset.saturating_add(tick) < limit {
            self.future.normalize();
            self.future.diffuse_into(&self.kernel, &mut self.scratch);
            std::mem::swap(&mut self.future, &mut self.scratch);

            let crossed = offset + tick < elapsed;
            if crossed {
                self.belief.copy_from(&self.future);
                caught_up += tick;
                self.stats.catch_up_steps += 1;
            }

            self.future.normalize();
            let quantile_rate = self.future.quantile(&self.layout, mass);
            if quantile_rate >= qmin_rate {
                qmin_rate = quantile_rate;
            }

            self.sink.record(ControllerEvent::Forecast {
                step,
                quantile_rate,
                caught_up: crossed,
            });
            offset += tick;
            step += 1;
        }

        self.mode_stamp = Some(mode_stamp + caught_up);
        self.stats.forecast_runs += 1;
        self.stats.forecast_steps += step as u64;
        qmin_rate
    }

    /// 도착률 추정치를 윈도우로 환산
    ///
    /// `window = rate * rtt_target - floor(avg_rtt / min_rtt)`
    fn decide_window(&mut self, now: u64, qmin_rate: f64) {
        let mass = self.config.confidence_mass();

        self.belief.normalize();
        self.future.normalize();
        let max_rate = self.belief.quantile(&self.layout, mass);
        let max_rate_future = self.future.quantile(&self.layout, mass);

        let forward_rate = max_rate.max(qmin_rate).floor();
        let min_rtt = self.rtt_filter.min().max(1);
        let queueing = (self.avg_rtt / min_rtt as f64).floor();

        let min_window = self.config.min_window as f64;
        let mut window = forward_rate * self.config.rtt_target_seconds() - queueing;
        if window < min_window {
            window = min_window;
            self.stats.window_floor_hits += 1;
        }
        self.window = window;

        self.estimate = Some(RateEstimate {
            max_rate,
            max_rate_future,
            qmin_rate,
            forward_rate,
        });
        self.stats.window_updates += 1;
        self.sink.record(ControllerEvent::WindowUpdated {
            now_ms: now,
            window,
            max_rate,
            max_rate_future,
            qmin_rate,
            avg_rtt_ms: self.avg_rtt,
            min_rtt_ms: min_rtt,
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 마지막 윈도우 결정의 추정치 (아직 없으면 None)
    pub fn estimate(&self) -> Option<RateEstimate> {
        self.estimate
    }

    pub fn average_rtt_ms(&self) -> f64 {
        self.avg_rtt
    }

    /// RTT 필터 최소값 (상한 적용)
    pub fn min_rtt_ms(&self) -> u64 {
        self.rtt_filter.min()
    }

    pub fn belief(&self) -> &BeliefDistribution {
        &self.belief
    }

    pub fn forecast_belief(&self) -> &BeliefDistribution {
        &self.future
    }

    pub fn layout(&self) -> &BinLayout {
        &self.layout
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn highest_sent(&self) -> u64 {
        self.highest_sent
    }

    pub fn highest_acked(&self) -> u64 {
        self.highest_acked
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("window", &self.window)
            .field("avg_rtt", &self.avg_rtt)
            .field("rtt_filter", &self.rtt_filter)
            .field("mode_stamp", &self.mode_stamp)
            .field("highest_sent", &self.highest_sent)
            .field("highest_acked", &self.highest_acked)
            .field("estimate", &self.estimate)
            .finish_non_exhaustive()
    }
}
