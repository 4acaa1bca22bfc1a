//! Segment 缓存索引
//!
//! 四张协调一致的映射表：
//!
//! ```text
//!   header_map      SegmentHeader → HeaderInfo（加载槽 / 延迟删除标记）
//!   bitkey_map      (事实分组, 维度键) → [SegmentHeader]      精确查找
//!   fact_map        事实分组 → FactInfo（header 列表 + 维度键偏序集 + converter）
//!   fuzzy_fact_map  身份（忽略谓词）→ [SegmentHeader]        区域失效
//! ```
//!
//! 索引不做内部同步：所有方法都必须在创建它的线程上调用
//! （见 [`crate::actor`]）。

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};
use crate::bitkey::BitKey;
use crate::column::SegmentColumn;
use crate::common::{LoadError, Result, SegmentIndexError};
use crate::config::SegmentIndexConfig;
use crate::header::{BitkeyKey, FactKey, SegmentHeader, SegmentIdentity};
use crate::poset::PartiallyOrderedSet;
use crate::rollup::find_rollup_candidates_among;
use crate::slot::SegmentFuture;
use crate::value::Value;

// ── 内部记录 ──────────────────────────────────────────────────────────────────

struct HeaderInfo<B> {
    /// None：可直接查询；Some 且未完成：加载中
    slot:            Option<SegmentFuture<B>>,
    /// 加载中收到 remove，等加载结束后再删
    pending_removal: bool,
}

impl<B> HeaderInfo<B> {
    fn is_loading(&self) -> bool {
        self.slot.as_ref().is_some_and(|s| !s.is_done())
    }
}

struct FactInfo<C> {
    headers:   Vec<SegmentHeader>,
    bitkeys:   PartiallyOrderedSet<BitKey>,
    converter: Option<C>,
}

impl<C> FactInfo<C> {
    fn new(converter: Option<C>) -> Self {
        Self { headers: Vec::new(), bitkeys: PartiallyOrderedSet::new(), converter }
    }
}

/// `remove` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// 正在加载，加载结束后自动删除
    Deferred,
    /// 索引中没有该 header
    Absent,
}

// ── SegmentCacheIndex ─────────────────────────────────────────────────────────

/// `B`：segment body；`C`：调用方挂在事实分组上的 converter。两者对索引都是不透明的。
pub struct SegmentCacheIndex<B, C> {
    config:         SegmentIndexConfig,
    owner:          ThreadId,
    header_map:     HashMap<SegmentHeader, HeaderInfo<B>>,
    bitkey_map:     HashMap<BitkeyKey, Vec<SegmentHeader>>,
    fact_map:       HashMap<FactKey, FactInfo<C>>,
    fuzzy_fact_map: HashMap<SegmentIdentity, Vec<SegmentHeader>>,
}

impl<B, C: Clone> SegmentCacheIndex<B, C> {
    /// 在当前线程上创建索引，当前线程即所属线程
    pub fn new(config: SegmentIndexConfig) -> Self {
        Self {
            config,
            owner:          thread::current().id(),
            header_map:     HashMap::new(),
            bitkey_map:     HashMap::new(),
            fact_map:       HashMap::new(),
            fuzzy_fact_map: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SegmentIndexConfig { &self.config }

    fn check_thread(&self) {
        if self.config.check_owner_thread {
            assert_eq!(
                thread::current().id(), self.owner,
                "segment cache index used outside its owning thread",
            );
        }
    }

    // ── 生命周期 ──────────────────────────────────────────────────────────────

    /// 登记 header；已存在时返回 false，
    /// 除非它尚无加载槽而本次声明 `loading`，此时创建槽并返回 true。
    pub fn add(&mut self, header: SegmentHeader, loading: bool, converter: Option<C>) -> bool {
        self.check_thread();

        if let Some(info) = self.header_map.get_mut(&header) {
            if loading && info.slot.is_none() {
                info.slot = Some(SegmentFuture::new());
                debug!(header = %header, "segment index: existing header now loading");
                return true;
            }
            return false;
        }

        let fact = self.fact_map
            .entry(header.fact_key())
            .or_insert_with(|| FactInfo::new(None));
        if fact.converter.is_none() {
            fact.converter = converter;
        }
        fact.headers.push(header.clone());
        fact.bitkeys.insert(header.bitkey().clone());

        self.bitkey_map.entry(header.bitkey_key()).or_default().push(header.clone());
        self.fuzzy_fact_map.entry(header.identity().clone()).or_default().push(header.clone());

        debug!(header = %header, loading, "segment index: add");
        self.header_map.insert(header, HeaderInfo {
            slot: loading.then(SegmentFuture::new),
            pending_removal: false,
        });
        true
    }

    /// 删除 header；加载中则延迟到加载结束
    pub fn remove(&mut self, header: &SegmentHeader) -> RemoveOutcome {
        self.check_thread();

        let Some(info) = self.header_map.get_mut(header) else {
            debug!(header = %header, "segment index: remove of absent header");
            return RemoveOutcome::Absent;
        };
        if info.is_loading() {
            info.pending_removal = true;
            debug!(header = %header, "segment index: remove deferred until load settles");
            return RemoveOutcome::Deferred;
        }

        self.header_map.remove(header);
        self.unlink(header);
        debug!(header = %header, "segment index: remove");
        RemoveOutcome::Removed
    }

    /// 从三张分组表中摘除 header，分组空了就整体删除
    fn unlink(&mut self, header: &SegmentHeader) {
        let bitkey_key = header.bitkey_key();
        let mut bitkey_emptied = false;
        if let Some(list) = self.bitkey_map.get_mut(&bitkey_key) {
            list.retain(|h| h != header);
            if list.is_empty() {
                self.bitkey_map.remove(&bitkey_key);
                bitkey_emptied = true;
            }
        }

        let fact_key = header.fact_key();
        if let Some(fact) = self.fact_map.get_mut(&fact_key) {
            fact.headers.retain(|h| h != header);
            if bitkey_emptied {
                fact.bitkeys.remove(header.bitkey());
            }
            if fact.headers.is_empty() {
                self.fact_map.remove(&fact_key);
            }
        }

        if let Some(list) = self.fuzzy_fact_map.get_mut(header.identity()) {
            list.retain(|h| h != header);
            if list.is_empty() {
                self.fuzzy_fact_map.remove(header.identity());
            }
        }
    }

    /// 加载成功：完成加载槽；若期间收到过 remove，随即删除
    pub fn load_succeeded(&mut self, header: &SegmentHeader, body: B) -> Result<()> {
        self.check_thread();

        let info = self.header_map.get(header)
            .ok_or_else(|| SegmentIndexError::UnknownHeader(header.to_string()))?;
        let slot = info.slot.as_ref()
            .ok_or_else(|| SegmentIndexError::NoLoadSlot(header.to_string()))?;
        if !slot.complete(Ok(std::sync::Arc::new(body))) {
            warn!(header = %header, "segment index: duplicate load result ignored");
        }
        debug!(header = %header, "segment index: load succeeded");

        let pending_removal = info.pending_removal;
        if pending_removal {
            self.remove(header);
        }
        Ok(())
    }

    /// 加载失败：把错误交给等待者，并无条件删除 header
    pub fn load_failed(&mut self, header: &SegmentHeader, error: LoadError) -> Result<()> {
        self.check_thread();

        let info = self.header_map.get(header)
            .ok_or_else(|| SegmentIndexError::UnknownHeader(header.to_string()))?;
        let slot = info.slot.as_ref()
            .ok_or_else(|| SegmentIndexError::NoLoadSlot(header.to_string()))?;
        debug!(header = %header, error = %error, "segment index: load failed");
        if !slot.complete(Err(error)) {
            warn!(header = %header, "segment index: duplicate load result ignored");
        }

        self.remove(header);
        Ok(())
    }

    /// 用新 header 替换旧 header（例如排除了某个区域），保留已完成的加载结果
    ///
    /// 旧 header 仍在加载时返回 [`SegmentIndexError::HeaderLoading`]，
    /// 调用方可以改用 `remove`（延迟到加载结束）。
    pub fn update(&mut self, old: &SegmentHeader, new: SegmentHeader) -> Result<()> {
        self.check_thread();

        let Some(info) = self.header_map.get(old) else {
            return Err(SegmentIndexError::UnknownHeader(old.to_string()));
        };
        // 加载线程仍持有旧 header，完成时必须能找到它
        if info.is_loading() {
            return Err(SegmentIndexError::HeaderLoading(old.to_string()));
        }
        if old == &new {
            return Ok(());
        }
        if self.header_map.contains_key(&new) {
            return Err(SegmentIndexError::HeaderExists(new.to_string()));
        }

        let converter = self.fact_map.get(&old.fact_key()).and_then(|f| f.converter.clone());
        let info = self.header_map.remove(old);
        self.unlink(old);
        self.add(new.clone(), false, converter);
        if let (Some(info), Some(entry)) = (info, self.header_map.get_mut(&new)) {
            *entry = info;
        }
        debug!(old = %old, new = %new, "segment index: update");
        Ok(())
    }

    // ── 访问器 ────────────────────────────────────────────────────────────────

    /// 加载槽；header 不存在或从未声明加载时为 None
    pub fn get_future(&self, header: &SegmentHeader) -> Option<SegmentFuture<B>> {
        self.check_thread();
        self.header_map.get(header).and_then(|info| info.slot.clone())
    }

    pub fn get_converter(
        &self,
        identity:            &SegmentIdentity,
        compound_predicates: &[String],
    ) -> Option<C> {
        self.check_thread();
        self.fact_map
            .get(&fact_key(identity, compound_predicates))
            .and_then(|f| f.converter.clone())
    }

    /// 事实分组必须已经通过 `add` 建立
    pub fn set_converter(
        &mut self,
        identity:            &SegmentIdentity,
        compound_predicates: &[String],
        converter:           C,
    ) -> Result<()> {
        self.check_thread();
        let key = fact_key(identity, compound_predicates);
        let fact = self.fact_map
            .get_mut(&key)
            .ok_or_else(|| SegmentIndexError::UnknownFactGroup(key.to_string()))?;
        fact.converter = Some(converter);
        Ok(())
    }

    pub fn contains(&self, header: &SegmentHeader) -> bool {
        self.check_thread();
        self.header_map.contains_key(header)
    }

    pub fn is_loading(&self, header: &SegmentHeader) -> bool {
        self.check_thread();
        self.header_map.get(header).is_some_and(|i| i.is_loading())
    }

    pub fn header_count(&self) -> usize {
        self.check_thread();
        self.header_map.len()
    }

    // ── 查询 ──────────────────────────────────────────────────────────────────

    /// 精确查找：维度键与谓词完全一致，且每个坐标值都落在 header 的约束内
    pub fn locate(
        &self,
        identity:            &SegmentIdentity,
        bitkey:              &BitKey,
        coordinates:         &BTreeMap<String, Value>,
        compound_predicates: &[String],
    ) -> Vec<SegmentHeader> {
        self.check_thread();

        let key = BitkeyKey {
            fact:   fact_key(identity, compound_predicates),
            bitkey: bitkey.clone(),
        };
        let Some(list) = self.bitkey_map.get(&key) else { return Vec::new() };
        list.iter()
            .filter(|h| matches(h, coordinates, compound_predicates))
            .cloned()
            .collect()
    }

    /// Rollup 候选：在所有 ⊇ `bitkey` 的维度上搜索，额外列少的维度排在前面
    pub fn find_rollup_candidates(
        &self,
        identity:            &SegmentIdentity,
        bitkey:              &BitKey,
        coordinates:         &BTreeMap<String, Value>,
        compound_predicates: &[String],
    ) -> Vec<Vec<SegmentHeader>> {
        self.check_thread();

        let fact = fact_key(identity, compound_predicates);
        let Some(info) = self.fact_map.get(&fact) else { return Vec::new() };

        let mut ancestors: Vec<&BitKey> = info.bitkeys.ancestors(bitkey);
        ancestors.sort_by(|a, b| a.cardinality().cmp(&b.cardinality()).then_with(|| a.cmp(b)));

        let mut result = Vec::new();
        let mut key = BitkeyKey { fact, bitkey: BitKey::new() };
        for ancestor in ancestors {
            key.bitkey = ancestor.clone();
            let Some(headers) = self.bitkey_map.get(&key) else { continue };
            let groups = find_rollup_candidates_among(headers, coordinates, &self.config);
            trace!(bitkey = %ancestor, groups = groups.len(), "segment index: rollup dimensionality");
            result.extend(groups);
        }
        result
    }

    /// 与失效区域可能相交的所有 header（忽略复合谓词）
    pub fn intersect_region(
        &self,
        identity: &SegmentIdentity,
        region:   &[SegmentColumn],
    ) -> Vec<SegmentHeader> {
        self.check_thread();

        let Some(list) = self.fuzzy_fact_map.get(identity) else { return Vec::new() };
        list.iter()
            .filter(|h| {
                region.iter().all(|rc| match h.constrained_column(&rc.expression) {
                    // 该列已被聚合掉，所有值都在
                    None => true,
                    Some(hc) => hc.intersects(rc),
                })
            })
            .cloned()
            .collect()
    }

    // ── 诊断 ──────────────────────────────────────────────────────────────────

    /// 按维度分组、组内按 header id 输出全部 header
    pub fn print_cache_state<W: Write>(&self, mut sink: W) -> Result<()> {
        self.check_thread();

        let mut groups: Vec<(&BitkeyKey, &Vec<SegmentHeader>)> = self.bitkey_map.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));

        writeln!(sink, "segment cache: {} headers in {} groups", self.header_map.len(), groups.len())?;
        for (key, headers) in groups {
            writeln!(sink, "{} key={}", key.fact, key.bitkey)?;
            let mut headers: Vec<&SegmentHeader> = headers.iter().collect();
            headers.sort_by_key(|h| h.unique_id());
            for h in headers {
                let state = match self.header_map.get(h) {
                    Some(i) if i.is_loading() && i.pending_removal => "loading, removal pending",
                    Some(i) if i.is_loading() => "loading",
                    Some(i) if i.slot.is_some() => "loaded",
                    _ => "ready",
                };
                writeln!(sink, "  {h} ({state})")?;
            }
        }
        Ok(())
    }
}

fn fact_key(identity: &SegmentIdentity, compound_predicates: &[String]) -> FactKey {
    FactKey { identity: identity.clone(), predicates: compound_predicates.to_vec() }
}

fn matches(
    header:              &SegmentHeader,
    coordinates:         &BTreeMap<String, Value>,
    compound_predicates: &[String],
) -> bool {
    if header.compound_predicates() != compound_predicates {
        return false;
    }
    coordinates.iter().all(|(expression, value)| {
        let Some(column) = header.constrained_column(expression) else { return false };
        let excluded = header.excluded_region(expression).is_some_and(|r| r.contains(value));
        !excluded && column.contains(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::load_error;

    type Index = SegmentCacheIndex<String, &'static str>;

    fn identity() -> SegmentIdentity {
        SegmentIdentity::new("FoodMart", "c0ffee", "Sales", "Unit Sales", "sales_fact_1997")
    }

    fn year_header(years: Option<&[i64]>) -> SegmentHeader {
        let column = match years {
            None => SegmentColumn::wildcard("time.year", Some(2)),
            Some(ys) => SegmentColumn::with_values("time.year", ys.iter().copied(), Some(2)),
        };
        SegmentHeader::new(identity(), BitKey::from_bits([0]), vec![column], vec![], vec![])
    }

    fn coords(year: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("time.year".to_string(), Value::from(year))])
    }

    fn sql_error() -> LoadError {
        load_error(std::io::Error::new(std::io::ErrorKind::Other, "sql failed"))
    }

    #[test]
    fn add_twice_is_idempotent() {
        let mut index = Index::new(SegmentIndexConfig::default());
        let h = year_header(None);
        assert!(index.add(h.clone(), false, None));
        assert!(!index.add(h.clone(), false, None));
        assert_eq!(index.header_count(), 1);
        // 已有 header 第一次声明加载时创建槽
        assert!(index.add(h.clone(), true, None));
        assert!(!index.add(h.clone(), true, None));
        assert!(index.is_loading(&h));
    }

    #[test]
    fn locate_honours_values_and_excluded_regions() {
        let mut index = Index::new(SegmentIndexConfig::default());
        let h = year_header(Some(&[1997]));
        index.add(h.clone(), false, None);

        let key = BitKey::from_bits([0]);
        assert_eq!(index.locate(&identity(), &key, &coords(1997), &[]), vec![h.clone()]);
        assert!(index.locate(&identity(), &key, &coords(1998), &[]).is_empty());
        assert!(index.locate(&identity(), &key, &coords(1997), &["x > 1".into()]).is_empty());

        let trimmed = h.with_excluded_regions(&[SegmentColumn::with_values("time.year", [1997], None)]);
        index.update(&h, trimmed.clone()).unwrap();
        assert!(index.locate(&identity(), &key, &coords(1997), &[]).is_empty());
        assert!(index.contains(&trimmed));
        assert!(!index.contains(&h));
        assert_eq!(index.header_count(), 1);
    }

    #[test]
    fn update_is_refused_until_the_load_settles() {
        let mut index = Index::new(SegmentIndexConfig::default());
        assert!(index.config().check_owner_thread);
        let h = year_header(None);
        let trimmed = h.with_excluded_regions(&[SegmentColumn::with_values("time.year", [1998], None)]);
        index.add(h.clone(), true, None);
        let future = index.get_future(&h).unwrap();

        assert!(matches!(index.update(&h, trimmed.clone()), Err(SegmentIndexError::HeaderLoading(_))));
        assert!(index.contains(&h) && !index.contains(&trimmed));

        // 加载线程按原 header 报告完成
        index.load_succeeded(&h, "cells".to_string()).unwrap();
        assert_eq!(future.wait().unwrap().as_str(), "cells");

        index.update(&h, trimmed.clone()).unwrap();
        let moved = index.get_future(&trimmed).unwrap();
        assert_eq!(moved.try_get().unwrap().unwrap().as_str(), "cells");
        assert!(!index.is_loading(&trimmed));
        assert_eq!(index.remove(&trimmed), RemoveOutcome::Removed);
        assert_eq!(index.header_count(), 0);
    }

    #[test]
    fn remove_during_load_is_deferred() {
        let mut index = Index::new(SegmentIndexConfig::default());
        let h = year_header(None);
        index.add(h.clone(), true, None);
        let future = index.get_future(&h).unwrap();
        assert!(!future.is_done());

        assert_eq!(index.remove(&h), RemoveOutcome::Deferred);
        assert!(index.contains(&h));

        index.load_succeeded(&h, "cells".to_string()).unwrap();
        assert_eq!(future.wait().unwrap().as_str(), "cells");
        assert!(!index.contains(&h));
        assert_eq!(index.remove(&h), RemoveOutcome::Absent);
    }

    #[test]
    fn load_failure_evicts_and_propagates() {
        let mut index = Index::new(SegmentIndexConfig::default());
        let h = year_header(None);
        index.add(h.clone(), true, None);
        let future = index.get_future(&h).unwrap();
        index.load_failed(&h, sql_error()).unwrap();
        assert_eq!(future.wait().unwrap_err().to_string(), "sql failed");
        assert!(!index.contains(&h));
        assert!(index.find_rollup_candidates(&identity(), &BitKey::from_bits([0]), &coords(1997), &[]).is_empty());
    }

    #[test]
    fn lifecycle_misuse_is_reported() {
        let mut index = Index::new(SegmentIndexConfig::default());
        let h = year_header(None);
        assert!(matches!(
            index.load_succeeded(&h, String::new()),
            Err(SegmentIndexError::UnknownHeader(_))
        ));
        index.add(h.clone(), false, None);
        assert!(matches!(index.load_failed(&h, sql_error()), Err(SegmentIndexError::NoLoadSlot(_))));
        assert!(matches!(
            index.set_converter(&identity(), &["p".into()], "conv"),
            Err(SegmentIndexError::UnknownFactGroup(_))
        ));
    }

    #[test]
    fn converter_is_stored_per_fact_group() {
        let mut index = Index::new(SegmentIndexConfig::default());
        index.add(year_header(None), false, Some("first"));
        index.add(year_header(Some(&[1997])), false, Some("ignored"));
        assert_eq!(index.get_converter(&identity(), &[]), Some("first"));
        index.set_converter(&identity(), &[], "second").unwrap();
        assert_eq!(index.get_converter(&identity(), &[]), Some("second"));
        assert_eq!(index.get_converter(&identity(), &["p".into()]), None);
    }

    #[test]
    fn fact_group_is_dropped_when_empty() {
        let mut index = Index::new(SegmentIndexConfig::default());
        let h = year_header(None);
        index.add(h.clone(), false, Some("conv"));
        assert_eq!(index.remove(&h), RemoveOutcome::Removed);
        assert_eq!(index.get_converter(&identity(), &[]), None);
        assert!(index.intersect_region(&identity(), &[]).is_empty());
        assert!(index.bitkey_map.is_empty() && index.fact_map.is_empty() && index.fuzzy_fact_map.is_empty());
    }

    #[test]
    fn print_cache_state_lists_headers_with_state() {
        let mut index = Index::new(SegmentIndexConfig::default());
        index.add(year_header(None), false, None);
        index.add(year_header(Some(&[1997])), true, None);
        let mut out = Vec::new();
        index.print_cache_state(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("segment cache: 2 headers in 1 groups"));
        assert!(text.contains("(loading)"));
        assert!(text.contains("(ready)"));
    }

    #[test]
    #[should_panic(expected = "outside its owning thread")]
    fn foreign_thread_access_panics() {
        let index = Index::new(SegmentIndexConfig::default());
        let index = std::sync::Mutex::new(index);
        std::thread::scope(|s| {
            let r = s.spawn(|| index.lock().unwrap().header_count()).join();
            if let Err(p) = r {
                std::panic::resume_unwind(p);
            }
        });
    }
}
