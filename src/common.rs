//! 全局基础类型与错误定义

use std::sync::Arc;
use thiserror::Error;

// ── ID 类型别名 ───────────────────────────────────────────────────────────────

/// Schema 内容校验和（由 schema 加载层给出）
pub type SchemaChecksum = String;
/// Header 内容指纹，仅用于诊断输出与确定性排序
pub type HeaderId       = u32;

/// 加载失败时传递给所有等待者的错误
pub type LoadError = Arc<dyn std::error::Error + Send + Sync + 'static>;

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SegmentIndexError {
    #[error("segment header not in index: {0}")]
    UnknownHeader(String),
    #[error("segment header has no load slot: {0}")]
    NoLoadSlot(String),
    #[error("segment header already in index: {0}")]
    HeaderExists(String),
    #[error("segment header is still loading: {0}")]
    HeaderLoading(String),
    #[error("fact group not in index: {0}")]
    UnknownFactGroup(String),
    #[error("segment cache actor is not running")]
    ActorUnavailable,
    #[error("invalid configuration: {detail}")]
    Config { detail: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SegmentIndexError>;

/// 把任意错误包装成可共享的 [`LoadError`]
pub fn load_error<E>(err: E) -> LoadError
where
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_header() {
        let err = SegmentIndexError::UnknownHeader("sales.unit_sales".into());
        assert_eq!(err.to_string(), "segment header not in index: sales.unit_sales");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "sink closed");
        let err: SegmentIndexError = io.into();
        assert!(matches!(err, SegmentIndexError::Io(_)));
    }

    #[test]
    fn load_error_is_shareable() {
        let e = load_error(std::io::Error::new(std::io::ErrorKind::Other, "sql timeout"));
        let e2 = Arc::clone(&e);
        assert_eq!(e2.to_string(), "sql timeout");
    }
}
