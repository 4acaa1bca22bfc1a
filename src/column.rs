//! 单列约束（Segment Column）

use std::collections::BTreeSet;
use byteorder::{LittleEndian, WriteBytesExt};
use crate::value::Value;

/// segment 在某一列上的约束
///
/// `values == None` 表示通配：该列的每个值都在 segment 内。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentColumn {
    pub expression:  String,
    pub values:      Option<BTreeSet<Value>>,
    /// 列值域的总基数；未知为 None
    pub value_count: Option<u64>,
}

impl SegmentColumn {
    pub fn wildcard(expression: &str, value_count: Option<u64>) -> Self {
        Self { expression: expression.into(), values: None, value_count }
    }

    pub fn with_values<I, V>(expression: &str, values: I, value_count: Option<u64>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            expression: expression.into(),
            values: Some(values.into_iter().map(Into::into).collect()),
            value_count,
        }
    }

    pub fn is_wildcard(&self) -> bool { self.values.is_none() }

    pub fn contains(&self, value: &Value) -> bool {
        self.values.as_ref().map_or(true, |vs| vs.contains(value))
    }

    /// 两个约束是否可能有公共值；任一侧通配都视为相交
    pub fn intersects(&self, other: &SegmentColumn) -> bool {
        match (&self.values, &other.values) {
            (Some(a), Some(b)) => {
                let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
                small.iter().any(|v| large.contains(v))
            }
            _ => true,
        }
    }

    /// 同一列两个约束的并集；通配吸收一切
    pub fn merge(&self, other: &SegmentColumn) -> SegmentColumn {
        debug_assert_eq!(self.expression, other.expression);
        let values = match (&self.values, &other.values) {
            (Some(a), Some(b)) => Some(a.union(b).cloned().collect()),
            _ => None,
        };
        let value_count = match (self.value_count, other.value_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        SegmentColumn { expression: self.expression.clone(), values, value_count }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        // 写入 Vec 不会失败
        let _ = out.write_u32::<LittleEndian>(self.expression.len() as u32);
        out.extend_from_slice(self.expression.as_bytes());
        let _ = out.write_i64::<LittleEndian>(self.value_count.map_or(-1, |c| c as i64));
        match &self.values {
            None => out.push(0),
            Some(vs) => {
                out.push(1);
                let _ = out.write_u32::<LittleEndian>(vs.len() as u32);
                for v in vs {
                    v.encode(out);
                }
            }
        }
    }
}

impl std::fmt::Display for SegmentColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=", self.expression)?;
        match &self.values {
            None => write!(f, "*")?,
            Some(vs) => {
                write!(f, "{{")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")?;
            }
        }
        match self.value_count {
            Some(c) => write!(f, " (of {c})"),
            None    => Ok(()),
        }
    }
}
