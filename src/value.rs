//! 列值（运行时表示）
//!
//! segment 约束集合中的元素与请求坐标都用 [`Value`] 表示。
//! 为了能放进 `BTreeSet` / `HashMap`，浮点按 IEEE 全序比较、按位哈希。

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use byteorder::{LittleEndian, WriteBytesExt};

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Str(String),
}

impl Value {
    // 不同类型之间按固定顺序排列
    fn rank(&self) -> u8 {
        match self {
            Self::Null       => 0,
            Self::Bool(_)    => 1,
            Self::Int64(_)   => 2,
            Self::Float64(_) => 3,
            Self::Str(_)     => 4,
        }
    }

    /// 规范字节编码（tag + 小端负载），用于 header 指纹
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.rank());
        // 写入 Vec 不会失败
        let _ = match self {
            Self::Null       => Ok(()),
            Self::Bool(b)    => out.write_u8(*b as u8),
            Self::Int64(v)   => out.write_i64::<LittleEndian>(*v),
            Self::Float64(v) => out.write_u64::<LittleEndian>(v.to_bits()),
            Self::Str(s)     => {
                let r = out.write_u32::<LittleEndian>(s.len() as u32);
                out.extend_from_slice(s.as_bytes());
                r
            }
        };
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a),    Self::Bool(b))    => a.cmp(b),
            (Self::Int64(a),   Self::Int64(b))   => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Str(a),     Self::Str(b))     => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null       => {}
            Self::Bool(b)    => b.hash(state),
            Self::Int64(v)   => v.hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::Str(s)     => s.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Self::Bool(v) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Self::Int64(v) }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self { Self::Int64(v as i64) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Self::Float64(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Self::Str(v.into()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Self::Str(v) }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null       => write!(f, "NULL"),
            Self::Bool(v)    => write!(f, "{v}"),
            Self::Int64(v)   => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Str(s)     => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn mixed_values_sort_by_type_then_value() {
        let set: BTreeSet<Value> = [
            Value::from("East"), Value::from(2012), Value::Null,
            Value::from(1.5), Value::from(1997), Value::from(false),
        ].into_iter().collect();
        let ordered: Vec<String> = set.iter().map(|v| v.to_string()).collect();
        assert_eq!(ordered, ["NULL", "false", "1997", "2012", "1.5", "East"]);
    }

    #[test]
    fn float_equality_is_bitwise_total() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_ne!(Value::from(1.0), Value::from(1i64));
    }

    #[test]
    fn encoding_distinguishes_types() {
        let (mut a, mut b) = (Vec::new(), Vec::new());
        Value::from(1i64).encode(&mut a);
        Value::from(1.0).encode(&mut b);
        assert_ne!(a, b);
    }
}
