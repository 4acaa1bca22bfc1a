//! 偏序集（Partially Ordered Set）
//!
//! 维护元素间的覆盖关系图（Hasse 图）：每个节点记录直接上界（parents）
//! 与直接下界（children）。祖先查询从顶层节点出发，只向下进入仍然 ≥ 查询值
//! 的分支，不必扫描全部元素。

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use crate::bitkey::BitKey;

/// 偏序比较：`a.is_below(b)` 表示 a ≤ b
pub trait PartialOrder {
    fn is_below(&self, other: &Self) -> bool;
}

/// 维度键按子集关系排序：子集在下，超集在上
impl PartialOrder for BitKey {
    fn is_below(&self, other: &Self) -> bool { self.is_subset_of(other) }
}

#[derive(Debug)]
struct Node<T> {
    value:    T,
    parents:  Vec<usize>,
    children: Vec<usize>,
}

#[derive(Debug)]
pub struct PartiallyOrderedSet<T> {
    nodes: Vec<Option<Node<T>>>,
    free:  Vec<usize>,
    index: HashMap<T, usize>,
    /// 没有上界的节点
    tops:  Vec<usize>,
}

impl<T> Default for PartiallyOrderedSet<T> {
    fn default() -> Self {
        Self { nodes: Vec::new(), free: Vec::new(), index: HashMap::new(), tops: Vec::new() }
    }
}

impl<T: PartialOrder + Clone + Eq + Hash> PartiallyOrderedSet<T> {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.index.len() }
    pub fn is_empty(&self) -> bool { self.index.is_empty() }
    pub fn contains(&self, value: &T) -> bool { self.index.contains_key(value) }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().flatten().map(|n| &n.value)
    }

    /// 插入元素；已存在返回 false
    pub fn insert(&mut self, value: T) -> bool {
        if self.index.contains_key(&value) {
            return false;
        }

        let greater = self.ancestor_ids(&value);
        let parents: Vec<usize> = greater.iter().copied()
            .filter(|&p| {
                !greater.iter().any(|&q| q != p && self.node(q).value.is_below(&self.node(p).value))
            })
            .collect();

        let lesser: Vec<usize> = self.live_ids()
            .filter(|&id| self.node(id).value.is_below(&value))
            .collect();
        let children: Vec<usize> = lesser.iter().copied()
            .filter(|&c| {
                !lesser.iter().any(|&q| q != c && self.node(c).value.is_below(&self.node(q).value))
            })
            .collect();

        // 新节点插在 p 与 c 之间，原有的直接边失效
        for &p in &parents {
            for &c in &children {
                self.unlink(p, c);
            }
        }

        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        };
        self.nodes[id] = Some(Node {
            value: value.clone(),
            parents: parents.clone(),
            children: children.clone(),
        });
        for &p in &parents {
            self.node_mut(p).children.push(id);
        }
        for &c in &children {
            self.node_mut(c).parents.push(id);
        }
        self.tops.retain(|t| !children.contains(t));
        if parents.is_empty() {
            self.tops.push(id);
        }
        self.index.insert(value, id);
        true
    }

    /// 删除元素；不存在返回 false
    pub fn remove(&mut self, value: &T) -> bool {
        let Some(id) = self.index.remove(value) else { return false };
        let Some(node) = self.nodes[id].take() else { return false };
        self.free.push(id);
        self.tops.retain(|&t| t != id);

        for &p in &node.parents {
            self.node_mut(p).children.retain(|&c| c != id);
        }
        for &c in &node.children {
            self.node_mut(c).parents.retain(|&p| p != id);
        }
        // 重新连接：没有其他路径时 p 直接覆盖 c
        for &c in &node.children {
            for &p in &node.parents {
                if !self.reaches_up(c, p) {
                    self.node_mut(p).children.push(c);
                    self.node_mut(c).parents.push(p);
                }
            }
            if self.node(c).parents.is_empty() {
                self.tops.push(c);
            }
        }
        true
    }

    /// 所有 ≥ `value` 的元素（含自身），顺序不保证
    pub fn ancestors(&self, value: &T) -> Vec<&T> {
        self.ancestor_ids(value).into_iter().map(|id| &self.node(id).value).collect()
    }

    fn ancestor_ids(&self, value: &T) -> Vec<usize> {
        let mut seen: HashSet<usize> = HashSet::new();
        let mut stack: Vec<usize> = self.tops.iter().copied()
            .filter(|&t| value.is_below(&self.node(t).value))
            .collect();
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            for &c in &self.node(id).children {
                if !seen.contains(&c) && value.is_below(&self.node(c).value) {
                    stack.push(c);
                }
            }
        }
        out
    }

    fn reaches_up(&self, from: usize, to: usize) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.node(id).parents.iter().copied());
            }
        }
        false
    }

    fn unlink(&mut self, parent: usize, child: usize) {
        self.node_mut(parent).children.retain(|&c| c != child);
        self.node_mut(child).parents.retain(|&p| p != parent);
    }

    fn live_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().enumerate().filter(|(_, n)| n.is_some()).map(|(i, _)| i)
    }

    fn node(&self, id: usize) -> &Node<T> {
        match &self.nodes[id] {
            Some(n) => n,
            None => unreachable!("dangling poset node {id}"),
        }
    }

    fn node_mut(&mut self, id: usize) -> &mut Node<T> {
        match &mut self.nodes[id] {
            Some(n) => n,
            None => unreachable!("dangling poset node {id}"),
        }
    }
}
