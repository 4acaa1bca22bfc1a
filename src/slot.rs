//! 加载槽（Load Slot）
//!
//! 一个 segment body 的一次性结果槽。任何线程都可以阻塞等待；
//! 完成只生效一次，之后的重复完成被忽略。

use std::sync::Arc;
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use crate::common::LoadError;

pub type LoadResult<B> = std::result::Result<Arc<B>, LoadError>;

struct Inner<B> {
    result: Mutex<Option<LoadResult<B>>>,
    ready:  Condvar,
}

/// 可克隆的等待句柄
pub struct SegmentFuture<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for SegmentFuture<B> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<B> std::fmt::Debug for SegmentFuture<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentFuture").field("done", &self.is_done()).finish()
    }
}

impl<B> SegmentFuture<B> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner { result: Mutex::new(None), ready: Condvar::new() }),
        }
    }

    pub fn is_done(&self) -> bool { self.inner.result.lock().is_some() }

    /// 非阻塞读取
    pub fn try_get(&self) -> Option<LoadResult<B>> {
        self.inner.result.lock().clone()
    }

    /// 阻塞直到完成
    pub fn wait(&self) -> LoadResult<B> {
        let mut guard = self.inner.result.lock();
        loop {
            if let Some(r) = guard.as_ref() {
                return r.clone();
            }
            self.inner.ready.wait(&mut guard);
        }
    }

    /// 最多等待 `timeout`；超时返回 None
    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadResult<B>> {
        let mut guard = self.inner.result.lock();
        if guard.is_none() {
            let _ = self.inner.ready.wait_while_for(&mut guard, |r| r.is_none(), timeout);
        }
        guard.clone()
    }

    /// 写入结果；已完成时返回 false 且不覆盖
    pub(crate) fn complete(&self, result: LoadResult<B>) -> bool {
        let mut guard = self.inner.result.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(result);
        self.inner.ready.notify_all();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::load_error;
    use std::thread;

    #[test]
    fn first_completion_wins() {
        let f: SegmentFuture<u32> = SegmentFuture::new();
        assert!(!f.is_done());
        assert!(f.try_get().is_none());
        assert!(f.complete(Ok(Arc::new(7))));
        assert!(!f.complete(Ok(Arc::new(8))));
        assert_eq!(*f.wait().unwrap(), 7);
    }

    #[test]
    fn waiter_on_another_thread_sees_failure() {
        let f: SegmentFuture<String> = SegmentFuture::new();
        let waiter = {
            let f = f.clone();
            thread::spawn(move || f.wait().map(|b| b.to_string()).map_err(|e| e.to_string()))
        };
        f.complete(Err(load_error(std::io::Error::new(std::io::ErrorKind::Other, "boom"))));
        assert_eq!(waiter.join().unwrap(), Err("boom".to_string()));
    }

    #[test]
    fn wait_timeout_returns_none_when_pending() {
        let f: SegmentFuture<u8> = SegmentFuture::new();
        assert!(f.wait_timeout(Duration::from_millis(10)).is_none());
        f.complete(Ok(Arc::new(1)));
        assert!(f.wait_timeout(Duration::from_millis(10)).is_some());
    }
}
