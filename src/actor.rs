//! 索引所属线程（actor）
//!
//! 索引本身不加锁。[`SegmentCacheActor`] 启动一个专用线程，在该线程上创建
//! 索引，并按顺序执行经 `crossbeam-channel` 送来的命令；每条命令通过自己的
//! 单元素通道回传结果。加载线程完成 SQL 之后调用
//! [`SegmentCacheHandle::load_succeeded`] / [`SegmentCacheHandle::load_failed`]，
//! 结果就被转送回所属线程执行。

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};
use crossbeam_channel::{bounded, Sender};
use tracing::debug;
use crate::bitkey::BitKey;
use crate::cache_index::{RemoveOutcome, SegmentCacheIndex};
use crate::column::SegmentColumn;
use crate::common::{LoadError, Result, SegmentIndexError};
use crate::config::SegmentIndexConfig;
use crate::header::{SegmentHeader, SegmentIdentity};
use crate::slot::SegmentFuture;
use crate::value::Value;

type Command<B, C> = Box<dyn FnOnce(&mut SegmentCacheIndex<B, C>) + Send>;

enum Message<B, C> {
    Execute(Command<B, C>),
    Shutdown,
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// 可跨线程克隆的命令入口
pub struct SegmentCacheHandle<B, C> {
    tx: Sender<Message<B, C>>,
}

impl<B, C> Clone for SegmentCacheHandle<B, C> {
    fn clone(&self) -> Self { Self { tx: self.tx.clone() } }
}

impl<B, C> SegmentCacheHandle<B, C>
where
    B: Send + Sync + 'static,
    C: Clone + Send + 'static,
{
    /// 在所属线程上执行任意命令并等待结果
    pub fn execute<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut SegmentCacheIndex<B, C>) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        let command: Command<B, C> = Box::new(move |index| {
            let _ = reply_tx.send(f(index));
        });
        self.tx
            .send(Message::Execute(command))
            .map_err(|_| SegmentIndexError::ActorUnavailable)?;
        reply_rx.recv().map_err(|_| SegmentIndexError::ActorUnavailable)
    }

    pub fn add(&self, header: SegmentHeader, loading: bool, converter: Option<C>) -> Result<bool> {
        self.execute(move |index| index.add(header, loading, converter))
    }

    pub fn remove(&self, header: SegmentHeader) -> Result<RemoveOutcome> {
        self.execute(move |index| index.remove(&header))
    }

    pub fn update(&self, old: SegmentHeader, new: SegmentHeader) -> Result<()> {
        self.execute(move |index| index.update(&old, new))?
    }

    pub fn load_succeeded(&self, header: SegmentHeader, body: B) -> Result<()> {
        self.execute(move |index| index.load_succeeded(&header, body))?
    }

    pub fn load_failed(&self, header: SegmentHeader, error: LoadError) -> Result<()> {
        self.execute(move |index| index.load_failed(&header, error))?
    }

    pub fn get_future(&self, header: SegmentHeader) -> Result<Option<SegmentFuture<B>>> {
        self.execute(move |index| index.get_future(&header))
    }

    pub fn get_converter(
        &self,
        identity:            SegmentIdentity,
        compound_predicates: Vec<String>,
    ) -> Result<Option<C>> {
        self.execute(move |index| index.get_converter(&identity, &compound_predicates))
    }

    pub fn set_converter(
        &self,
        identity:            SegmentIdentity,
        compound_predicates: Vec<String>,
        converter:           C,
    ) -> Result<()> {
        self.execute(move |index| index.set_converter(&identity, &compound_predicates, converter))?
    }

    pub fn locate(
        &self,
        identity:            SegmentIdentity,
        bitkey:              BitKey,
        coordinates:         BTreeMap<String, Value>,
        compound_predicates: Vec<String>,
    ) -> Result<Vec<SegmentHeader>> {
        self.execute(move |index| {
            index.locate(&identity, &bitkey, &coordinates, &compound_predicates)
        })
    }

    pub fn find_rollup_candidates(
        &self,
        identity:            SegmentIdentity,
        bitkey:              BitKey,
        coordinates:         BTreeMap<String, Value>,
        compound_predicates: Vec<String>,
    ) -> Result<Vec<Vec<SegmentHeader>>> {
        self.execute(move |index| {
            index.find_rollup_candidates(&identity, &bitkey, &coordinates, &compound_predicates)
        })
    }

    pub fn intersect_region(
        &self,
        identity: SegmentIdentity,
        region:   Vec<SegmentColumn>,
    ) -> Result<Vec<SegmentHeader>> {
        self.execute(move |index| index.intersect_region(&identity, &region))
    }

    pub fn is_loading(&self, header: SegmentHeader) -> Result<bool> {
        self.execute(move |index| index.is_loading(&header))
    }

    pub fn header_count(&self) -> Result<usize> {
        self.execute(|index| index.header_count())
    }

    /// `print_cache_state` 的文本结果
    pub fn cache_state(&self) -> Result<String> {
        self.execute(|index| -> Result<String> {
            let mut out = Vec::new();
            index.print_cache_state(&mut out)?;
            Ok(String::from_utf8_lossy(&out).into_owned())
        })?
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

/// 拥有索引线程；drop 时停止并回收线程
pub struct SegmentCacheActor<B, C> {
    handle: SegmentCacheHandle<B, C>,
    thread: Option<JoinHandle<()>>,
}

impl<B, C> SegmentCacheActor<B, C>
where
    B: Send + Sync + 'static,
    C: Clone + Send + 'static,
{
    pub fn spawn(config: SegmentIndexConfig) -> Result<Self> {
        let (tx, rx) = bounded::<Message<B, C>>(config.actor_queue_capacity);
        let thread = thread::Builder::new()
            .name("segment-cache-index".into())
            .spawn(move || {
                let mut index = SegmentCacheIndex::new(config);
                while let Ok(message) = rx.recv() {
                    match message {
                        Message::Execute(command) => command(&mut index),
                        Message::Shutdown => break,
                    }
                }
                debug!(headers = index.header_count(), "segment cache actor stopped");
            })?;
        Ok(Self { handle: SegmentCacheHandle { tx }, thread: Some(thread) })
    }

    pub fn handle(&self) -> SegmentCacheHandle<B, C> { self.handle.clone() }
}

impl<B, C> Drop for SegmentCacheActor<B, C> {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
