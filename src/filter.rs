//! 고정 용량 원형 버퍼 극값 필터
//!
//! 최근 RTT 샘플 `capacity`개를 유지하고 최대/최소를 전체 스캔으로 계산한다.

/// 원형 버퍼 기반 최대/최소 필터
#[derive(Debug, Clone)]
pub struct ExtremumFilter {
    /// 샘플 저장소 (항상 capacity개가 유효)
    samples: Vec<u64>,

    /// 다음에 덮어쓸 위치
    cursor: usize,

    /// min() 결과 상한
    ceiling: u64,
}

impl ExtremumFilter {
    /// `capacity`개 슬롯을 모두 `default`로 채운 필터 생성
    ///
    /// # Panics
    /// `capacity`가 0이면 패닉
    pub fn new(capacity: usize, default: u64) -> Self {
        assert!(capacity > 0, "ExtremumFilter capacity must be positive");
        Self {
            samples: vec![default; capacity],
            cursor: 0,
            ceiling: u64::MAX,
        }
    }

    /// min() 상한 지정
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// 가장 오래된 슬롯에 샘플 기록
    pub fn push(&mut self, sample: u64) {
        self.samples[self.cursor] = sample;
        self.cursor += 1;
        if self.cursor >= self.samples.len() {
            self.cursor = 0;
        }
    }

    /// 저장된 샘플 중 최대값
    pub fn max(&self) -> u64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// 저장된 샘플 중 최소값 (ceiling 으로 상한 제한)
    pub fn min(&self) -> u64 {
        self.samples
            .iter()
            .copied()
            .min()
            .unwrap_or(u64::MAX)
            .min(self.ceiling)
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// 저장 순서와 무관한 샘플 슬라이스
    pub fn samples(&self) -> &[u64] {
        &self.samples
    }
}
