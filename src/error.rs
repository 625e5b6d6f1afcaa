//! 에러 타입 정의

use thiserror::Error;

/// Sprout 에러 타입
///
/// 컨트롤러의 hot path(이벤트 처리, 윈도우 조회)는 에러를 반환하지 않는다.
/// 복구 가능한 에러는 설정 로딩/검증 경계에서만 발생한다.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("설정 파싱 에러: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("유효하지 않은 설정: {field} ({reason})")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
