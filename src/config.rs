//! 索引配置
//!
//! 全部字段都有默认值，TOML 中缺省的键取 [`SegmentIndexConfig::default`]：
//!
//! ```toml
//! check_owner_thread         = true
//! enable_rollup_combinations = true
//! max_rollup_tuples          = 100000
//! actor_queue_capacity       = 1024
//! ```

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::common::{Result, SegmentIndexError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentIndexConfig {
    /// 每次调用都断言处于索引所属线程
    pub check_owner_thread:         bool,
    /// 关闭后 rollup 搜索只返回单 segment 组合
    pub enable_rollup_combinations: bool,
    /// 笛卡尔积枚举的元组上限，超过则放弃该维度
    pub max_rollup_tuples:          usize,
    /// actor 命令队列容量
    pub actor_queue_capacity:       usize,
}

impl Default for SegmentIndexConfig {
    fn default() -> Self {
        Self {
            check_owner_thread:         true,
            enable_rollup_combinations: true,
            max_rollup_tuples:          100_000,
            actor_queue_capacity:       1024,
        }
    }
}

impl SegmentIndexConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SegmentIndexError::Config { detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_toml_str(&content).map_err(|e| match e {
            SegmentIndexError::Config { detail } => SegmentIndexError::Config {
                detail: format!("{}: {detail}", path.display()),
            },
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.max_rollup_tuples == 0 {
            return Err(SegmentIndexError::Config {
                detail: "max_rollup_tuples must be at least 1".into(),
            });
        }
        if self.actor_queue_capacity == 0 {
            return Err(SegmentIndexError::Config {
                detail: "actor_queue_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}
