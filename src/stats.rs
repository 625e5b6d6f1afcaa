//! 컨트롤러 통계

/// 컨트롤러 동작 누적 카운터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// 송신 이벤트 수
    pub datagrams_sent: u64,

    /// ACK 이벤트 수
    pub acks_received: u64,

    /// Poisson 관측 갱신 횟수
    pub observations: u64,

    /// 관측된 총 도착 수
    pub observed_arrivals: u64,

    /// 예측 실행 횟수
    pub forecast_runs: u64,

    /// 예측 확산 단계 수 (horizon 포함)
    pub forecast_steps: u64,

    /// 현재 분포에 반영된 확산 단계 수
    pub catch_up_steps: u64,

    /// 윈도우 재계산 횟수
    pub window_updates: u64,

    /// 최소 윈도우로 제한된 횟수
    pub window_floor_hits: u64,
}

impl ControllerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 예측 실행당 평균 확산 단계 수
    pub fn average_forecast_steps(&self) -> f64 {
        if self.forecast_runs == 0 {
            return 0.0;
        }
        self.forecast_steps as f64 / self.forecast_runs as f64
    }

    /// 관측 틱당 평균 도착 수
    pub fn average_arrivals_per_observation(&self) -> f64 {
        if self.observations == 0 {
            return 0.0;
        }
        self.observed_arrivals as f64 / self.observations as f64
    }

    /// 통계 리셋
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Sent: {} | Acks: {} | Observations: {} ({:.2} arrivals/tick) | Forecasts: {} ({:.1} steps/run, {} caught up) | Window updates: {} (floor {})",
            self.datagrams_sent,
            self.acks_received,
            self.observations,
            self.average_arrivals_per_observation(),
            self.forecast_runs,
            self.average_forecast_steps(),
            self.catch_up_steps,
            self.window_updates,
            self.window_floor_hits,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages() {
        let mut stats = ControllerStats::new();
        assert_eq!(stats.average_forecast_steps(), 0.0);
        assert_eq!(stats.average_arrivals_per_observation(), 0.0);

        stats.forecast_runs = 4;
        stats.forecast_steps = 10;
        stats.observations = 5;
        stats.observed_arrivals = 20;
        assert_eq!(stats.average_forecast_steps(), 2.5);
        assert_eq!(stats.average_arrivals_per_observation(), 4.0);

        let summary = stats.summary();
        assert!(summary.contains("Forecasts: 4"));

        stats.reset();
        assert_eq!(stats, ControllerStats::default());
    }
}
