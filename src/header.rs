//! Segment Header：segment 的完整身份
//!
//! Header 是不可变值类型，直接作为索引各 map 的 key。
//! 排除区域（excluded region）不会原地修改 header，而是通过
//! [`SegmentHeader::with_excluded_regions`] 生成新 header 再交给索引 `update`。

use std::fmt;
use std::hash::{Hash, Hasher};
use byteorder::{LittleEndian, WriteBytesExt};
use crate::bitkey::BitKey;
use crate::column::SegmentColumn;
use crate::common::{HeaderId, SchemaChecksum};

// ── 身份字段 ──────────────────────────────────────────────────────────────────

/// schema / cube / measure / 事实表，同一组内的 segment 只在维度与谓词上不同
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentIdentity {
    pub schema_name:     String,
    pub schema_checksum: SchemaChecksum,
    pub cube_name:       String,
    pub measure_name:    String,
    pub fact_table_name: String,
}

impl SegmentIdentity {
    pub fn new(
        schema_name:     &str,
        schema_checksum: &str,
        cube_name:       &str,
        measure_name:    &str,
        fact_table_name: &str,
    ) -> Self {
        Self {
            schema_name:     schema_name.into(),
            schema_checksum: schema_checksum.into(),
            cube_name:       cube_name.into(),
            measure_name:    measure_name.into(),
            fact_table_name: fact_table_name.into(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        for s in [
            &self.schema_name, &self.schema_checksum, &self.cube_name,
            &self.measure_name, &self.fact_table_name,
        ] {
            encode_str(s, out);
        }
    }
}

impl fmt::Display for SegmentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f, "{}[{}].{}.{}@{}",
            self.schema_name, self.schema_checksum, self.cube_name,
            self.measure_name, self.fact_table_name,
        )
    }
}

// ── 索引内部分组键 ─────────────────────────────────────────────────────────────

/// 事实分组：身份 + 复合谓词（谓词必须完全一致）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct FactKey {
    pub identity:   SegmentIdentity,
    pub predicates: Vec<String>,
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)?;
        if !self.predicates.is_empty() {
            write!(f, " where {}", self.predicates.join(" and "))?;
        }
        Ok(())
    }
}

/// 精确维度分组：事实分组 + 维度键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BitkeyKey {
    pub fact:   FactKey,
    pub bitkey: BitKey,
}

// ── Header ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SegmentHeader {
    identity:            SegmentIdentity,
    bitkey:              BitKey,
    /// 按列表达式排序
    columns:             Vec<SegmentColumn>,
    excluded_regions:    Vec<SegmentColumn>,
    compound_predicates: Vec<String>,
    unique_id:           HeaderId,
}

impl SegmentHeader {
    pub fn new(
        identity:            SegmentIdentity,
        bitkey:              BitKey,
        mut columns:         Vec<SegmentColumn>,
        mut excluded_regions: Vec<SegmentColumn>,
        compound_predicates: Vec<String>,
    ) -> Self {
        columns.sort_by(|a, b| a.expression.cmp(&b.expression));
        excluded_regions.sort_by(|a, b| a.expression.cmp(&b.expression));
        let mut header = Self {
            identity, bitkey, columns, excluded_regions, compound_predicates,
            unique_id: 0,
        };
        header.unique_id = crc32fast::hash(&header.encode());
        header
    }

    pub fn identity(&self) -> &SegmentIdentity { &self.identity }
    pub fn bitkey(&self) -> &BitKey { &self.bitkey }
    pub fn columns(&self) -> &[SegmentColumn] { &self.columns }
    pub fn excluded_regions(&self) -> &[SegmentColumn] { &self.excluded_regions }
    pub fn compound_predicates(&self) -> &[String] { &self.compound_predicates }
    pub fn unique_id(&self) -> HeaderId { self.unique_id }

    pub fn constrained_column(&self, expression: &str) -> Option<&SegmentColumn> {
        self.columns
            .binary_search_by(|c| c.expression.as_str().cmp(expression))
            .ok()
            .map(|i| &self.columns[i])
    }

    pub fn excluded_region(&self, expression: &str) -> Option<&SegmentColumn> {
        self.excluded_regions.iter().find(|c| c.expression == expression)
    }

    /// 追加排除区域后的新 header；同一列上的排除区域会合并
    pub fn with_excluded_regions(&self, regions: &[SegmentColumn]) -> SegmentHeader {
        let mut excluded = self.excluded_regions.clone();
        for region in regions {
            match excluded.iter_mut().find(|c| c.expression == region.expression) {
                Some(existing) => *existing = existing.merge(region),
                None => excluded.push(region.clone()),
            }
        }
        SegmentHeader::new(
            self.identity.clone(),
            self.bitkey.clone(),
            self.columns.clone(),
            excluded,
            self.compound_predicates.clone(),
        )
    }

    pub(crate) fn fact_key(&self) -> FactKey {
        FactKey {
            identity:   self.identity.clone(),
            predicates: self.compound_predicates.clone(),
        }
    }

    pub(crate) fn bitkey_key(&self) -> BitkeyKey {
        BitkeyKey { fact: self.fact_key(), bitkey: self.bitkey.clone() }
    }

    /// 规范编码：所有身份字段、维度键字、列、排除区域、谓词
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // 写入 Vec 不会失败
        self.identity.encode(&mut out);
        let words = self.bitkey.words();
        let _ = out.write_u32::<LittleEndian>(words.len() as u32);
        for &w in words {
            let _ = out.write_u64::<LittleEndian>(w);
        }
        for group in [&self.columns, &self.excluded_regions] {
            let _ = out.write_u32::<LittleEndian>(group.len() as u32);
            for c in group {
                c.encode(&mut out);
            }
        }
        let _ = out.write_u32::<LittleEndian>(self.compound_predicates.len() as u32);
        for p in &self.compound_predicates {
            encode_str(p, &mut out);
        }
        out
    }
}

// unique_id 是其余字段的函数，不参与比较
impl PartialEq for SegmentHeader {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.bitkey == other.bitkey
            && self.columns == other.columns
            && self.excluded_regions == other.excluded_regions
            && self.compound_predicates == other.compound_predicates
    }
}

impl Eq for SegmentHeader {}

impl Hash for SegmentHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
        self.bitkey.hash(state);
        self.columns.hash(state);
        self.excluded_regions.hash(state);
        self.compound_predicates.hash(state);
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x} {} key={} [", self.unique_id, self.identity, self.bitkey)?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 { write!(f, "; ")?; }
            write!(f, "{c}")?;
        }
        write!(f, "]")?;
        if !self.excluded_regions.is_empty() {
            write!(f, " excluding [")?;
            for (i, c) in self.excluded_regions.iter().enumerate() {
                if i > 0 { write!(f, "; ")?; }
                write!(f, "{c}")?;
            }
            write!(f, "]")?;
        }
        if !self.compound_predicates.is_empty() {
            write!(f, " where {}", self.compound_predicates.join(" and "))?;
        }
        Ok(())
    }
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    // 写入 Vec 不会失败
    let _ = out.write_u32::<LittleEndian>(s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}
