//! Rollup 候选搜索
//!
//! 给定同一维度键下的一批 header，找出能够（单独或联合）还原请求结果的
//! header 组：请求坐标之外的列（extra 列）在聚合时被求和消去。
//!
//! ```text
//!   1. 过滤：有排除区域 / 坐标值不在约束内  → 跳过
//!   2. extra 列全部通配                     → 单 segment 组（排在前面）
//!   3. 其余 header 作为联合候选：
//!        每个 extra 列 → 值按“被哪些候选包含”分成等价类
//!        值的种类 < 列基数（且无通配候选）  → 放弃该维度
//!        枚举等价类的笛卡尔积，每个元组找一个覆盖它的候选（贪心）
//!        全部覆盖                           → 一个联合组，追加在单 segment 组之后
//! ```
//!
//! 所有放弃条件都不是错误，只表示该粒度上没有可用的 rollup。

use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;
use crate::bitkey::BitKey;
use crate::column::SegmentColumn;
use crate::config::SegmentIndexConfig;
use crate::header::SegmentHeader;
use crate::value::Value;

/// 需要与其他 header 联合的候选
struct Candidate<'a> {
    header: &'a SegmentHeader,
    /// 不在请求坐标中的列
    extra:  Vec<&'a SegmentColumn>,
}

impl<'a> Candidate<'a> {
    fn column(&self, expression: &str) -> Option<&'a SegmentColumn> {
        self.extra.iter().copied().find(|c| c.expression == expression)
    }
}

/// 单个 extra 列的等价类划分
struct ColumnClasses<'a> {
    expression: &'a str,
    /// 每个等价类的成员签名：包含该类值的候选下标集合
    signatures: Vec<BitKey>,
}

/// 在同一维度键的 header 中寻找 rollup 组
pub fn find_rollup_candidates_among(
    headers:     &[SegmentHeader],
    coordinates: &BTreeMap<String, Value>,
    config:      &SegmentIndexConfig,
) -> Vec<Vec<SegmentHeader>> {
    let mut singletons: Vec<Vec<SegmentHeader>> = Vec::new();
    let mut candidates: Vec<Candidate<'_>> = Vec::new();

    'header: for header in headers {
        if !header.excluded_regions().is_empty() {
            trace!(header = %header, "rollup: skip header with excluded regions");
            continue;
        }
        for (expression, value) in coordinates {
            match header.constrained_column(expression) {
                Some(col) if col.contains(value) => {}
                _ => continue 'header,
            }
        }
        let extra: Vec<&SegmentColumn> = header.columns().iter()
            .filter(|c| !coordinates.contains_key(&c.expression))
            .collect();
        if extra.iter().all(|c| c.is_wildcard()) {
            singletons.push(vec![header.clone()]);
        } else {
            candidates.push(Candidate { header, extra });
        }
    }

    // 单 segment 组排在前面，联合组追加在后
    let mut groups = singletons;
    if !candidates.is_empty() && config.enable_rollup_combinations {
        groups.extend(combine(&candidates, config));
    }
    groups
}

/// 尝试用若干候选拼出完整覆盖
fn combine(candidates: &[Candidate<'_>], config: &SegmentIndexConfig) -> Option<Vec<SegmentHeader>> {
    let expressions: BTreeSet<&str> = candidates.iter()
        .flat_map(|c| c.extra.iter().filter(|col| !col.is_wildcard()))
        .map(|col| col.expression.as_str())
        .collect();

    let mut columns: Vec<ColumnClasses<'_>> = Vec::with_capacity(expressions.len());
    for expression in expressions {
        columns.push(equivalence_classes(expression, candidates)?);
    }

    let mut total: usize = 1;
    for col in &columns {
        total = match total.checked_mul(col.signatures.len()) {
            Some(t) if t <= config.max_rollup_tuples => t,
            _ => {
                trace!(limit = config.max_rollup_tuples, "rollup: tuple enumeration over limit");
                return None;
            }
        };
    }

    let everyone = BitKey::from_bits(0..candidates.len());
    let mut selected = BitKey::new();
    let mut order: Vec<usize> = Vec::new();
    let mut cursor = vec![0usize; columns.len()];

    for _ in 0..total {
        let mut covering = everyone.clone();
        for (col, &class) in columns.iter().zip(&cursor) {
            covering = covering.and(&col.signatures[class]);
        }
        if !covering.intersects(&selected) {
            // 贪心：取第一个能覆盖该元组的未选候选
            let Some(pick) = covering.iter().next() else {
                trace!(
                    tuple = ?columns.iter().zip(&cursor).map(|(c, &i)| (c.expression, i)).collect::<Vec<_>>(),
                    "rollup: uncovered tuple"
                );
                return None;
            };
            selected.set(pick);
            order.push(pick);
        }
        advance(&mut cursor, &columns);
    }

    trace!(headers = order.len(), tuples = total, "rollup: combination found");
    Some(order.into_iter().map(|i| candidates[i].header.clone()).collect())
}

/// 把某一列的值按成员签名归类
///
/// 通配（或缺少该列）的候选包含全部值；若存在这样的候选，未被任何显式
/// 候选列出的值单独成为一类。
fn equivalence_classes<'a>(
    expression: &'a str,
    candidates: &[Candidate<'_>],
) -> Option<ColumnClasses<'a>> {
    let mut wildcard = BitKey::new();
    let mut members: BTreeMap<&Value, BitKey> = BTreeMap::new();
    let mut cardinality: Option<u64> = None;

    for (i, cand) in candidates.iter().enumerate() {
        let Some(col) = cand.column(expression) else {
            wildcard.set(i);
            continue;
        };
        if let Some(count) = col.value_count {
            cardinality = Some(cardinality.map_or(count, |c| c.max(count)));
        }
        match &col.values {
            None => wildcard.set(i),
            Some(values) => {
                for v in values {
                    members.entry(v).or_default().set(i);
                }
            }
        }
    }

    let Some(cardinality) = cardinality else {
        trace!(column = expression, "rollup: column cardinality unknown");
        return None;
    };

    let mut signatures: BTreeSet<BitKey> = members.values()
        .map(|m| m.or(&wildcard))
        .collect();
    if (members.len() as u64) < cardinality {
        if wildcard.is_empty() {
            trace!(
                column = expression, found = members.len(), cardinality,
                "rollup: cached values do not cover column"
            );
            return None;
        }
        signatures.insert(wildcard);
    }

    Some(ColumnClasses { expression, signatures: signatures.into_iter().collect() })
}

/// 笛卡尔积游标 +1（最后一列变化最快）
fn advance(cursor: &mut [usize], columns: &[ColumnClasses<'_>]) {
    for i in (0..cursor.len()).rev() {
        cursor[i] += 1;
        if cursor[i] < columns[i].signatures.len() {
            return;
        }
        cursor[i] = 0;
    }
}
