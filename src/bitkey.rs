//! 维度键（Dimensionality Key）
//!
//! 位向量：第 i 位为 1 表示 schema 中编号为 i 的列被该 segment 约束。
//! 内部按 64 位字存储，并始终去掉末尾的全零字，因此相等 / 哈希 / 排序
//! 都是结构化的，与构造时声明的容量无关。

use std::fmt;

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitKey {
    words: Vec<u64>,
}

impl BitKey {
    pub fn new() -> Self { Self::default() }

    /// 预分配 `bits` 位的空键
    pub fn with_capacity(bits: usize) -> Self {
        Self { words: Vec::with_capacity(bits.div_ceil(WORD_BITS)) }
    }

    pub fn from_bits<I: IntoIterator<Item = usize>>(bits: I) -> Self {
        let mut key = Self::new();
        for b in bits {
            key.set(b);
        }
        key
    }

    pub fn set(&mut self, bit: usize) {
        let w = bit / WORD_BITS;
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        self.words[w] |= 1u64 << (bit % WORD_BITS);
    }

    pub fn clear(&mut self, bit: usize) {
        let w = bit / WORD_BITS;
        if let Some(word) = self.words.get_mut(w) {
            *word &= !(1u64 << (bit % WORD_BITS));
            self.trim();
        }
    }

    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(bit / WORD_BITS)
            .map(|w| w & (1u64 << (bit % WORD_BITS)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    /// 置位数量
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// `self ⊇ other`（非严格）
    pub fn is_superset_of(&self, other: &BitKey) -> bool {
        other.words.iter().enumerate().all(|(i, &w)| {
            let mine = self.words.get(i).copied().unwrap_or(0);
            mine & w == w
        })
    }

    pub fn is_subset_of(&self, other: &BitKey) -> bool {
        other.is_superset_of(self)
    }

    pub fn intersects(&self, other: &BitKey) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    pub fn or(&self, other: &BitKey) -> BitKey {
        let n = self.words.len().max(other.words.len());
        let words = (0..n)
            .map(|i| {
                self.words.get(i).copied().unwrap_or(0) | other.words.get(i).copied().unwrap_or(0)
            })
            .collect();
        Self { words }
    }

    pub fn and(&self, other: &BitKey) -> BitKey {
        let mut key = Self {
            words: self.words.iter().zip(&other.words).map(|(a, b)| a & b).collect(),
        };
        key.trim();
        key
    }

    /// `self \ other`
    pub fn and_not(&self, other: &BitKey) -> BitKey {
        let mut key = Self {
            words: self.words.iter().enumerate()
                .map(|(i, &w)| w & !other.words.get(i).copied().unwrap_or(0))
                .collect(),
        };
        key.trim();
        key
    }

    /// 按升序遍历置位
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS).filter(move |b| w & (1u64 << b) != 0).map(move |b| i * WORD_BITS + b)
        })
    }

    /// 小端字序的原始字，供 header 指纹编码使用
    pub(crate) fn words(&self) -> &[u64] { &self.words }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<usize> for BitKey {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_bits(iter)
    }
}

impl fmt::Display for BitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (n, bit) in self.iter().enumerate() {
            if n > 0 { write!(f, ", ")?; }
            write!(f, "{bit}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equality_ignores_capacity_and_cleared_bits() {
        let mut a = BitKey::with_capacity(256);
        a.set(3);
        a.set(130);
        a.clear(130);
        assert_eq!(a, BitKey::from_bits([3]));
        assert_eq!(a.to_string(), "{3}");
    }

    #[test]
    fn superset_across_word_boundaries() {
        let big = BitKey::from_bits([1, 64, 65, 200]);
        let small = BitKey::from_bits([64, 200]);
        assert!(big.is_superset_of(&small));
        assert!(small.is_subset_of(&big));
        assert!(!small.is_superset_of(&big));
        assert!(big.is_superset_of(&BitKey::new()));
        assert_eq!(big.and_not(&small), BitKey::from_bits([1, 65]));
        assert_eq!(big.cardinality(), 4);
    }

    proptest! {
        #[test]
        fn subset_laws(a in proptest::collection::vec(0usize..192, 0..12),
                       b in proptest::collection::vec(0usize..192, 0..12)) {
            let ka = BitKey::from_bits(a.iter().copied());
            let kb = BitKey::from_bits(b.iter().copied());
            let union = ka.or(&kb);
            prop_assert!(union.is_superset_of(&ka));
            prop_assert!(union.is_superset_of(&kb));
            prop_assert!(ka.is_superset_of(&ka.and(&kb)));
            prop_assert_eq!(ka.is_superset_of(&kb), kb.and_not(&ka).is_empty());
            prop_assert_eq!(union.cardinality(),
                            ka.cardinality() + kb.cardinality() - ka.and(&kb).cardinality());
        }
    }
}
