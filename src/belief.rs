//! 도착률 신뢰 분포
//!
//! `[0, max_arrival_rate)` 구간을 균등 폭 빈으로 나눈 이산 확률 분포.
//! 관측(Poisson 우도 곱)과 예측(가우시안 랜덤 워크 확산) 두 가지 방식으로 갱신된다.

use statrs::distribution::{ContinuousCDF, Discrete, Normal, Poisson};

use crate::config::Config;

/// Poisson 확률질량 `P(X = counts | λ = rate)`
///
/// `rate == 0` 이면 분포가 정의되지 않으므로 `counts == 0` 일 때 1, 아니면 0.
pub fn poisson_pdf(rate: f64, counts: u64) -> f64 {
    if rate == 0.0 {
        return if counts == 0 { 1.0 } else { 0.0 };
    }
    Poisson::new(rate).map(|d| d.pmf(counts)).unwrap_or(0.0)
}

/// [`poisson_pdf`] 의 자연로그. 확률 0 은 `-inf`
pub fn poisson_ln_pdf(rate: f64, counts: u64) -> f64 {
    if rate == 0.0 {
        return if counts == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    Poisson::new(rate)
        .map(|d| d.ln_pmf(counts))
        .unwrap_or(f64::NEG_INFINITY)
}

/// 빈 경계 정보
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinLayout {
    pub num_bins: usize,
    pub width: f64,
}

impl BinLayout {
    pub fn new(config: &Config) -> Self {
        Self {
            num_bins: config.num_bins,
            width: config.bin_width(),
        }
    }

    /// 빈 i의 중앙값
    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        (i as f64 + 0.5) * self.width
    }

    #[inline]
    pub fn floor(&self, i: usize) -> f64 {
        i as f64 * self.width
    }

    #[inline]
    pub fn ceil(&self, i: usize) -> f64 {
        (i + 1) as f64 * self.width
    }
}

/// 한 틱 동안의 가우시안 랜덤 워크 전이 커널
///
/// 빈 중앙값 기준으로 목적지 빈의 상/하한까지의 거리는 `(d ± 0.5) * width` 로
/// 출발 빈과 무관하므로, 오프셋 `d` 별 전이 확률을 한 번만 계산한다.
#[derive(Debug, Clone)]
pub struct DiffusionKernel {
    /// 첫 번째 가중치의 빈 오프셋 (음수)
    first_offset: i64,

    /// 오프셋별 전이 확률
    weights: Vec<f64>,

    stddev: f64,
}

impl DiffusionKernel {
    /// `stddev` (packets/sec) 정규분포, `span_sigmas` 표준편차 범위까지 전개
    ///
    /// # Panics
    /// `stddev` 가 양의 유한값이 아니면 패닉
    pub fn new(layout: &BinLayout, stddev: f64, span_sigmas: f64) -> Self {
        let normal = Normal::new(0.0, stddev)
            .unwrap_or_else(|e| panic!("invalid diffusion stddev {}: {}", stddev, e));

        let w = layout.width;
        let reach = span_sigmas * stddev;
        // 빈 0 기준 전개 범위, 모든 출발 빈에 대해 동일
        let first = ((layout.value(0) - reach) / w).floor() as i64;
        let last = ((layout.value(0) + reach) / w).ceil() as i64;

        let weights = (first..=last)
            .map(|d| {
                let upper = (d as f64 + 0.5) * w;
                let lower = (d as f64 - 0.5) * w;
                normal.cdf(upper) - normal.cdf(lower)
            })
            .collect();

        Self {
            first_offset: first,
            weights,
            stddev,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &BinLayout::new(config),
            config.diffusion_stddev(),
            config.diffusion_span_sigmas,
        )
    }

    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    /// (오프셋, 전이 확률) 순회
    pub fn taps(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.weights
            .iter()
            .enumerate()
            .map(move |(k, &w)| (self.first_offset + k as i64, w))
    }
}

/// 빈별 가중치 분포
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefDistribution {
    weights: Vec<f64>,
}

impl BeliefDistribution {
    /// 모든 가중치가 1인 (정규화 전) 균등 분포
    pub fn uniform(num_bins: usize) -> Self {
        Self {
            weights: vec![1.0; num_bins],
        }
    }

    /// 임의 가중치로 생성 (정규화하지 않음)
    pub fn from_weights(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// 합이 1이 되도록 정규화
    ///
    /// # Panics
    /// 합이 0 이하이거나 정규화된 가중치에 NaN 이 나타나면 패닉.
    /// 수치 불안정(언더플로우 등)을 조용히 덮지 않는다.
    pub fn normalize(&mut self) {
        let sum = self.total();
        assert!(sum > 0.0, "belief distribution degenerate: total weight {}", sum);
        for (i, w) in self.weights.iter_mut().enumerate() {
            *w /= sum;
            assert!(!w.is_nan(), "belief weight {} is NaN after normalization", i);
        }
    }

    /// 관측 갱신: `elapsed_secs` 동안 `counts`개 도착 관측에 대한 Poisson 우도 곱
    ///
    /// 로그 공간에서 곱한 뒤 최대값으로 나눠 지수화한다. 긴 공백 뒤의 관측처럼
    /// 모든 빈의 우도가 f64 범위 아래로 떨어져도 상대 비율은 유지된다.
    /// 결과는 정규화되지 않은 가중치이며 최대 가중치가 1 이다.
    pub fn observe(&mut self, layout: &BinLayout, counts: u64, elapsed_secs: f64) {
        for (i, w) in self.weights.iter_mut().enumerate() {
            *w = w.ln() + poisson_ln_pdf(layout.value(i) * elapsed_secs, counts);
        }

        let peak = self
            .weights
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if peak == f64::NEG_INFINITY {
            // 모든 빈의 우도가 정확히 0: 실제 퇴화, normalize 에서 패닉
            self.weights.iter_mut().for_each(|w| *w = 0.0);
            return;
        }

        for w in self.weights.iter_mut() {
            *w = (*w - peak).exp();
        }
    }

    /// 한 틱 확산 결과를 `out` 에 기록 (`out` 은 덮어씀)
    ///
    /// 범위 밖으로 나가는 확률질량은 버린다.
    pub fn diffuse_into(&self, kernel: &DiffusionKernel, out: &mut BeliefDistribution) {
        let n = self.weights.len();
        out.weights.clear();
        out.weights.resize(n, 0.0);

        for (i, &mass) in self.weights.iter().enumerate() {
            if mass == 0.0 {
                continue;
            }
            for (offset, p) in kernel.taps() {
                let v = i as i64 + offset;
                if v < 0 || v >= n as i64 {
                    continue;
                }
                out.weights[v as usize] += mass * p;
            }
        }
    }

    /// 누적 확률이 `mass` 에 처음 도달하는 빈의 중앙값
    ///
    /// `mass <= 0` 이면 0.0
    pub fn quantile(&self, layout: &BinLayout, mass: f64) -> f64 {
        let mut acc = 0.0;
        let mut rate = 0.0;
        for (i, &w) in self.weights.iter().enumerate() {
            if acc >= mass {
                break;
            }
            acc += w;
            rate = layout.value(i);
        }
        rate
    }

    /// 가중 평균 도착률
    pub fn mean(&self, layout: &BinLayout) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        self.weights
            .iter()
            .enumerate()
            .map(|(i, &w)| w * layout.value(i))
            .sum::<f64>()
            / total
    }

    /// 다른 분포의 가중치를 복사 (재할당 없음)
    pub fn copy_from(&mut self, other: &BeliefDistribution) {
        self.weights.clone_from(&other.weights);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> BinLayout {
        BinLayout::new(&Config::default())
    }

    fn kernel() -> DiffusionKernel {
        DiffusionKernel::from_config(&Config::default())
    }

    fn spike(at: usize) -> BeliefDistribution {
        let mut weights = vec![0.0; 128];
        weights[at] = 1.0;
        BeliefDistribution::from_weights(weights)
    }

    fn assert_normalized(dist: &BeliefDistribution) {
        assert!((dist.total() - 1.0).abs() < 1e-9, "total {}", dist.total());
        assert!(dist.weights().iter().all(|&w| w >= 0.0 && w.is_finite()));
    }

    #[test]
    fn test_poisson_zero_rate() {
        assert_eq!(poisson_pdf(0.0, 0), 1.0);
        assert_eq!(poisson_pdf(0.0, 1), 0.0);
        assert_eq!(poisson_pdf(0.0, 17), 0.0);
    }

    #[test]
    fn test_poisson_values() {
        // P(X=1 | λ=1) = e^-1
        assert!((poisson_pdf(1.0, 1) - (-1.0f64).exp()).abs() < 1e-12);
        // P(X=0 | λ=2) = e^-2
        assert!((poisson_pdf(2.0, 0) - (-2.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_poisson_ln_pdf() {
        assert_eq!(poisson_ln_pdf(0.0, 0), 0.0);
        assert_eq!(poisson_ln_pdf(0.0, 3), f64::NEG_INFINITY);
        assert!((poisson_ln_pdf(1.0, 1) + 1.0).abs() < 1e-12);
        // pmf 는 언더플로우해도 로그값은 유한
        assert_eq!(poisson_pdf(800.0, 1), 0.0);
        let ln = poisson_ln_pdf(800.0, 1);
        assert!(ln.is_finite() && (ln - (800.0f64.ln() - 800.0)).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_uniform() {
        let mut dist = BeliefDistribution::uniform(128);
        dist.normalize();
        assert_normalized(&dist);
        assert!((dist.weights()[0] - 1.0 / 128.0).abs() < 1e-15);
    }

    #[test]
    #[should_panic(expected = "degenerate")]
    fn test_normalize_zero_total_panics() {
        let mut dist = BeliefDistribution::from_weights(vec![0.0; 8]);
        dist.normalize();
    }

    #[test]
    #[should_panic(expected = "NaN")]
    fn test_normalize_nan_panics() {
        // inf / inf = NaN
        let mut dist = BeliefDistribution::from_weights(vec![1.0, f64::INFINITY, 1.0]);
        dist.normalize();
    }

    #[test]
    fn test_observation_keeps_normalization() {
        let layout = layout();
        let mut dist = BeliefDistribution::uniform(128);
        for counts in [0, 1, 3, 1, 0, 2] {
            dist.normalize();
            dist.observe(&layout, counts, 0.02);
            dist.normalize();
            assert_normalized(&dist);
        }
    }

    #[test]
    fn test_log_space_observation_matches_direct_product() {
        let layout = layout();
        let mut direct = BeliefDistribution::uniform(128);
        direct.normalize();
        let mut logged = direct.clone();

        for (i, w) in direct.weights.iter_mut().enumerate() {
            *w *= poisson_pdf(layout.value(i) * 0.02, 2);
        }
        direct.normalize();
        logged.observe(&layout, 2, 0.02);
        logged.normalize();

        for (a, b) in direct.weights().iter().zip(logged.weights()) {
            assert!((a - b).abs() < 1e-12, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_observation_after_long_gap_stays_finite() {
        let layout = layout();
        let mut dist = BeliefDistribution::uniform(128);
        dist.normalize();
        // 200초 동안 1개 도착: 최저 빈의 λ 도 780 이라 pmf 는 전부 0 으로 언더플로우
        assert!((0..128).all(|i| poisson_pdf(layout.value(i) * 200.0, 1) == 0.0));

        dist.observe(&layout, 1, 200.0);
        dist.normalize();
        assert_normalized(&dist);
        // 가장 낮은 도착률이 가장 그럴듯함
        assert!(dist.weights()[0] > 0.99);
    }

    #[test]
    #[should_panic(expected = "degenerate")]
    fn test_impossible_observation_still_fatal() {
        let layout = layout();
        // λ = 0 에서 도착 관측은 모든 빈에서 불가능
        let mut dist = BeliefDistribution::uniform(128);
        dist.observe(&layout, 3, 0.0);
        dist.normalize();
    }

    #[test]
    fn test_observation_concentrates_near_true_rate() {
        let layout = layout();
        let mut dist = BeliefDistribution::uniform(128);
        // 100ms 마다 20개 도착 = 200 packets/sec
        for _ in 0..30 {
            dist.normalize();
            dist.observe(&layout, 20, 0.1);
        }
        dist.normalize();
        let median = dist.quantile(&layout, 0.5);
        assert!((median - 200.0).abs() < 20.0, "median {}", median);
    }

    #[test]
    fn test_kernel_is_symmetric_and_bounded() {
        let kernel = kernel();
        let taps: Vec<(i64, f64)> = kernel.taps().collect();
        // σ ≈ 28.28, 5σ / 7.8125 ≈ 18.1
        assert_eq!(taps.first().unwrap().0, -18);
        assert_eq!(taps.last().unwrap().0, 19);
        let total: f64 = taps.iter().map(|&(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-5);
        let p = |d: i64| taps.iter().find(|&&(o, _)| o == d).unwrap().1;
        assert!((p(3) - p(-3)).abs() < 1e-12);
        assert!(p(0) > p(1));
    }

    #[test]
    fn test_diffusion_conserves_mass_away_from_edges() {
        let kernel = kernel();
        let mut out = BeliefDistribution::uniform(128);
        spike(64).diffuse_into(&kernel, &mut out);
        assert!((out.total() - 1.0).abs() < 1e-5, "total {}", out.total());
        assert!(out.weights().iter().all(|&w| w >= 0.0));
        // 중심이 유지됨
        let peak = out
            .weights()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 64);
    }

    #[test]
    fn test_diffusion_leaks_at_edges() {
        let kernel = kernel();
        let mut out = BeliefDistribution::uniform(128);
        spike(0).diffuse_into(&kernel, &mut out);
        let total = out.total();
        assert!(total < 0.6 && total > 0.4, "total {}", total);

        let mut dist = BeliefDistribution::uniform(128);
        dist.normalize();
        dist.diffuse_into(&kernel, &mut out);
        // 경계로 샌 만큼만 감소
        assert!(out.total() < 1.0);
        assert!(out.total() > 0.9);
    }

    #[test]
    fn test_quantile_monotone_in_mass() {
        let layout = layout();
        let kernel = kernel();
        let mut dist = BeliefDistribution::uniform(128);
        spike(40).diffuse_into(&kernel, &mut dist);
        dist.normalize();

        let mut prev = 0.0;
        for step in 0..=20 {
            let mass = step as f64 / 20.0;
            let q = dist.quantile(&layout, mass);
            assert!(q >= prev, "mass {} gave {} < {}", mass, q, prev);
            prev = q;
        }
    }

    #[test]
    fn test_quantile_of_spike() {
        let layout = layout();
        let dist = spike(10);
        assert_eq!(dist.quantile(&layout, 0.5), layout.value(10));
        assert_eq!(dist.quantile(&layout, 0.0), 0.0);
    }

    #[test]
    fn test_mean() {
        let layout = layout();
        let mut dist = BeliefDistribution::uniform(128);
        dist.normalize();
        assert!((dist.mean(&layout) - 500.0).abs() < 1e-9);
    }
}
