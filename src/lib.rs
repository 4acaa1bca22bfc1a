//! # olap-segment-index
//!
//! OLAP 查询引擎的聚合 segment 缓存索引：
//! - **精确查找**：请求的维度键、谓词与某个已缓存 segment 完全一致
//! - **Rollup 搜索**：找一组更细粒度的 segment，在多余维度上求和后恰好还原请求
//! - **区域失效**：flush 时找出与失效区域相交的全部 segment
//! - **加载生命周期**：登记 → 加载中 → 已加载 / 失败删除
//!
//! ## 整体架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SegmentCacheActor  (专用线程 + crossbeam 命令队列)        │
//! │     ▲ SegmentCacheHandle × N  (查询线程 / SQL 加载线程)    │
//! │     │                                                      │
//! │  SegmentCacheIndex<B, C>                                   │
//! │   ├─ header_map      header → 加载槽 / 延迟删除            │
//! │   ├─ bitkey_map      (事实分组, 维度键) → headers          │
//! │   ├─ fact_map        事实分组 → 维度键偏序集 + converter   │
//! │   └─ fuzzy_fact_map  身份(忽略谓词) → headers              │
//! │          │                                                 │
//! │          ├─ PartiallyOrderedSet<BitKey>  祖先维度查询       │
//! │          └─ rollup  等价类 + 笛卡尔积覆盖搜索               │
//! │                                                            │
//! │  SegmentHeader = SegmentIdentity + BitKey + SegmentColumn* │
//! │  SegmentFuture<B>  (任意线程阻塞等待 segment body)          │
//! └──────────────────────────────────────────────────────────┘
//! ```

// ── 值类型 ────────────────────────────────────────────────────────────────────
pub mod common;
pub mod config;
pub mod bitkey;
pub mod value;
pub mod column;
pub mod header;

// ── 索引 ──────────────────────────────────────────────────────────────────────
pub mod poset;
pub mod slot;
pub mod rollup;
pub mod cache_index;
pub mod actor;

pub use actor::{SegmentCacheActor, SegmentCacheHandle};
pub use bitkey::BitKey;
pub use cache_index::{RemoveOutcome, SegmentCacheIndex};
pub use column::SegmentColumn;
pub use common::{LoadError, Result, SegmentIndexError};
pub use config::SegmentIndexConfig;
pub use header::{SegmentHeader, SegmentIdentity};
pub use slot::SegmentFuture;
pub use value::Value;
