//! 컨트롤러 설정

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::belief::BinLayout;
use crate::error::{Error, Result};

/// 기본 최대 도착률 (packets/sec)
pub const DEFAULT_MAX_ARRIVAL_RATE: f64 = 1000.0;

/// 기본 빈(bin) 개수
pub const DEFAULT_NUM_BINS: usize = 128;

/// 기본 틱 길이 (밀리초)
pub const DEFAULT_TICK_LENGTH_MS: u64 = 20;

/// 기본 최소 윈도우 (데이터그램 수)
pub const MIN_WINDOW: u32 = 4;

/// Sprout 컨트롤러 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 추정 가능한 최대 도착률 (packets/sec)
    /// 빈은 [0, max_arrival_rate) 구간을 균등 분할한다
    pub max_arrival_rate: f64,

    /// 신뢰 분포의 빈 개수
    pub num_bins: usize,

    /// 관측/예측 틱 길이 (밀리초)
    pub tick_length_ms: u64,

    /// 랜덤 워크 확산 속도 (packets/sec per sqrt(sec))
    pub brownian_motion_rate: f64,

    /// 목표 RTT (밀리초), 도착률을 윈도우로 환산할 때 사용
    pub rtt_target_ms: f64,

    /// 분위수 신뢰도 (0.0 ~ 1.0)
    /// 누적 확률이 1 - rtt_confidence 에 도달하는 빈을 선택
    pub rtt_confidence: f64,

    /// 평균 RTT 지수 평활 상수
    pub rtt_smooth: f64,

    /// RTT 필터 용량 (샘플 수)
    pub rtt_filter_capacity: usize,

    /// RTT 필터 초기값 (밀리초)
    pub rtt_filter_default: u64,

    /// 최소 윈도우
    pub min_window: u32,

    /// 초기 윈도우 (첫 예측 이전)
    pub initial_window: u32,

    /// 확산 커널 폭 (표준편차 배수)
    pub diffusion_span_sigmas: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_arrival_rate: DEFAULT_MAX_ARRIVAL_RATE,
            num_bins: DEFAULT_NUM_BINS,
            tick_length_ms: DEFAULT_TICK_LENGTH_MS,
            brownian_motion_rate: 200.0,
            rtt_target_ms: 75.0,
            rtt_confidence: 0.50,
            rtt_smooth: 15.0,
            rtt_filter_capacity: 5,
            rtt_filter_default: u64::MAX, // 샘플 없음
            min_window: MIN_WINDOW,
            initial_window: 50,
            diffusion_span_sigmas: 5.0,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 저지연 우선 설정
    /// 목표 RTT를 줄이고 더 보수적인 분위수를 사용
    pub fn low_latency() -> Self {
        Self {
            rtt_target_ms: 50.0,
            rtt_confidence: 0.95,
            ..Self::default()
        }
    }

    /// 고처리량 설정
    pub fn high_throughput() -> Self {
        Self {
            max_arrival_rate: 10_000.0,
            num_bins: 256,
            brownian_motion_rate: 2000.0,
            rtt_target_ms: 100.0,
            rtt_confidence: 0.25,
            initial_window: 100,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    /// 확산을 키워 급격한 용량 변화를 빠르게 따라간다
    pub fn unstable_network() -> Self {
        Self {
            brownian_motion_rate: 400.0,
            rtt_confidence: 0.80,
            rtt_smooth: 8.0,
            rtt_filter_capacity: 10,
            ..Self::default()
        }
    }

    /// TOML 문자열에서 설정 로드 (누락된 필드는 기본값)
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정 로드
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
            Error::InvalidConfig {
                field,
                reason: reason.into(),
            }
        }

        if !(self.max_arrival_rate.is_finite() && self.max_arrival_rate > 0.0) {
            return Err(invalid("max_arrival_rate", "양의 유한값이어야 함"));
        }
        if self.num_bins == 0 {
            return Err(invalid("num_bins", "0보다 커야 함"));
        }
        if self.tick_length_ms == 0 {
            return Err(invalid("tick_length_ms", "0보다 커야 함"));
        }
        if !(self.brownian_motion_rate.is_finite() && self.brownian_motion_rate > 0.0) {
            return Err(invalid("brownian_motion_rate", "양의 유한값이어야 함"));
        }
        if !(self.rtt_target_ms.is_finite() && self.rtt_target_ms >= 0.0) {
            return Err(invalid("rtt_target_ms", "음수가 아닌 유한값이어야 함"));
        }
        if !(0.0..=1.0).contains(&self.rtt_confidence) {
            return Err(invalid(
                "rtt_confidence",
                format!("0.0 ~ 1.0 범위여야 함: {}", self.rtt_confidence),
            ));
        }
        if !(self.rtt_smooth.is_finite() && self.rtt_smooth >= 1.0) {
            return Err(invalid("rtt_smooth", "1.0 이상이어야 함"));
        }
        if self.rtt_filter_capacity == 0 {
            return Err(invalid("rtt_filter_capacity", "0보다 커야 함"));
        }
        if self.initial_window < self.min_window {
            return Err(invalid(
                "initial_window",
                format!("min_window({}) 이상이어야 함", self.min_window),
            ));
        }
        if !(self.diffusion_span_sigmas.is_finite() && self.diffusion_span_sigmas > 0.0) {
            return Err(invalid("diffusion_span_sigmas", "양의 유한값이어야 함"));
        }
        Ok(())
    }

    /// 빈 폭 (packets/sec)
    pub fn bin_width(&self) -> f64 {
        self.max_arrival_rate / self.num_bins as f64
    }

    /// RTT 필터 최소값 상한 (밀리초)
    /// 마지막 빈 바로 위의 대표값, 기본 설정에서 1003
    pub fn rate_ceiling_ms(&self) -> u64 {
        BinLayout::new(self).value(self.num_bins) as u64
    }

    /// 틱 길이 (초)
    pub fn tick_seconds(&self) -> f64 {
        0.001 * self.tick_length_ms as f64
    }

    /// 한 틱 동안의 확산 표준편차
    pub fn diffusion_stddev(&self) -> f64 {
        self.brownian_motion_rate * self.tick_seconds().sqrt()
    }

    /// 분위수 추출 누적 확률 목표
    pub fn confidence_mass(&self) -> f64 {
        1.0 - self.rtt_confidence
    }

    /// 목표 RTT (초)
    pub fn rtt_target_seconds(&self) -> f64 {
        self.rtt_target_ms / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_bins() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!((config.bin_width() - 7.8125).abs() < 1e-12);
        assert_eq!(config.rate_ceiling_ms(), 1003);

        let layout = BinLayout::new(&config);
        assert_eq!(layout.width, config.bin_width());
        assert!((layout.value(0) - 3.90625).abs() < 1e-12);
        assert_eq!(layout.floor(2), 2.0 * config.bin_width());
        assert_eq!(layout.ceil(2), layout.floor(3));
    }

    #[test]
    fn test_presets_are_valid() {
        for config in [
            Config::low_latency(),
            Config::high_throughput(),
            Config::unstable_network(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = Config {
            rtt_confidence: 1.5,
            ..Config::default()
        };
        match config.validate() {
            Err(Error::InvalidConfig { field, .. }) => assert_eq!(field, "rtt_confidence"),
            other => panic!("unexpected: {:?}", other),
        }

        let config = Config {
            rtt_filter_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            initial_window: 2,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = Config::from_toml_str("rtt_target_ms = 100.0\nnum_bins = 64\n").unwrap();
        assert_eq!(config.rtt_target_ms, 100.0);
        assert_eq!(config.num_bins, 64);
        assert_eq!(config.tick_length_ms, DEFAULT_TICK_LENGTH_MS);
    }

    #[test]
    fn test_toml_parse_error() {
        assert!(matches!(
            Config::from_toml_str("num_bins = \"many\""),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "brownian_motion_rate = 300.0").unwrap();
        writeln!(file, "min_window = 2").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.brownian_motion_rate, 300.0);
        assert_eq!(config.min_window, 2);

        assert!(matches!(
            Config::from_file("/nonexistent/sprout.toml"),
            Err(Error::Io(_))
        ));
    }
}
