//! Reusable-object pools: acquire/release with reset-on-release discipline.

use crossbeam::queue::SegQueue;
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use crate::http::{request::Parser, request::RequestState, response::ResponseState};

/// Size of a pooled scratch buffer, used for body draining and other
/// short-lived reads.
pub(crate) const SCRATCH_LEN: usize = 4 * 1024;

/// Initial capacity of a pooled head buffer (request head or response head).
pub(crate) const HEAD_CAPACITY: usize = 16 * 1024;

/// A type that can live in a [`Pool`].
///
/// `reset` runs on release and must return the object to its freshly
/// constructed observable state while retaining allocated capacity.
pub(crate) trait Poolable: Send + 'static {
    fn fresh() -> Self;
    fn reset(&mut self);
}

struct PoolInner<T> {
    items: SegQueue<T>,
    max_idle: usize,
}

/// Concurrency-safe pool of one reusable type. Cheap to clone; clones share
/// the same storage.
///
/// `acquire` pops a recycled object or allocates a fresh one when the pool
/// is empty; release happens when the returned [`Pooled`] guard drops. Both
/// are amortized O(1); growth occurs only on an empty pool.
pub(crate) struct Pool<T: Poolable> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Poolable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Poolable> Pool<T> {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                items: SegQueue::new(),
                max_idle,
            }),
        }
    }

    pub(crate) fn acquire(&self) -> Pooled<T> {
        Pooled {
            item: Some(self.inner.items.pop().unwrap_or_else(T::fresh)),
            pool: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.inner.items.len()
    }
}

/// RAII handle to a pooled object. Dropping the guard resets the object and
/// returns it to the pool, so release happens exactly once on every exit
/// path.
pub(crate) struct Pooled<T: Poolable> {
    item: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item taken")
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item taken")
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(mut item) = self.item.take() {
            item.reset();
            if self.pool.items.len() < self.pool.max_idle {
                self.pool.items.push(item);
            }
        }
    }
}

/// Fixed-size zeroed buffer for transient reads.
pub(crate) struct Scratch(pub(crate) Vec<u8>);

impl Poolable for Scratch {
    fn fresh() -> Self {
        Scratch(vec![0; SCRATCH_LEN])
    }

    fn reset(&mut self) {}
}

/// Growable buffer sized for a full message head.
pub(crate) struct HeadBuf(pub(crate) Vec<u8>);

impl Poolable for HeadBuf {
    fn fresh() -> Self {
        HeadBuf(Vec::with_capacity(HEAD_CAPACITY))
    }

    fn reset(&mut self) {
        self.0.clear();
    }
}

/// The engine's pools, one per reusable type. Create once and share across
/// connections.
///
/// # Examples
///
/// ```
/// use filament::Pools;
///
/// let pools = Pools::new();
/// let more_refs = pools.clone();
/// ```
pub struct Pools {
    pub(crate) parsers: Pool<Parser>,
    pub(crate) requests: Pool<RequestState>,
    pub(crate) responses: Pool<ResponseState>,
    pub(crate) scratch: Pool<Scratch>,
    pub(crate) heads: Pool<HeadBuf>,
}

impl Pools {
    /// Creates the pool set. Each pool keeps at most a bounded number of
    /// idle objects; beyond that, released objects are dropped.
    pub fn new() -> Arc<Self> {
        const MAX_IDLE: usize = 256;

        Arc::new(Self {
            parsers: Pool::new(MAX_IDLE),
            requests: Pool::new(MAX_IDLE),
            responses: Pool::new(MAX_IDLE),
            scratch: Pool::new(MAX_IDLE),
            heads: Pool::new(MAX_IDLE),
        })
    }
}
