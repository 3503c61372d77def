use std::sync::Arc;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::types::{Result, TrellisError};

/// Handle to the data-parallel worker pool.
///
/// Every parallel phase in the crate goes through an explicit runtime handle
/// rather than a hidden process-wide singleton, so callers control sizing and
/// lifetime. Cloning is cheap and shares the underlying pool.
#[derive(Clone)]
pub struct ParallelRuntime {
    pool: Arc<rayon::ThreadPool>,
}

impl ParallelRuntime {
    /// Builds a runtime with `num_threads` workers. Zero means one worker per
    /// available core.
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("trellis-worker-{i}"))
            .build()
            .map_err(|e| TrellisError::ResourceExhausted(format!("worker pool: {e}")))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `f` inside the pool so nested parallel iterators execute on this
    /// runtime's workers.
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(f)
    }

    /// Data-parallel for-each over `0..n` with work stealing.
    pub fn do_all<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        self.pool.install(|| (0..n).into_par_iter().for_each(|i| f(i)));
    }

    /// Runs `f(worker_index, worker_count)` exactly once on every worker.
    pub fn on_each<F>(&self, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        self.pool.broadcast(|ctx| f(ctx.index(), ctx.num_threads()));
    }

    /// Reduction accumulator over `0..n`.
    pub fn reduce<T, M, F>(&self, n: usize, identity: T, map: M, fold: F) -> T
    where
        T: Send + Sync + Clone,
        M: Fn(usize) -> T + Sync,
        F: Fn(T, T) -> T + Sync,
    {
        self.pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(&map)
                .reduce(|| identity.clone(), &fold)
        })
    }

    pub fn fill<T>(&self, dst: &mut [T], value: T)
    where
        T: Copy + Send + Sync,
    {
        self.pool
            .install(|| dst.par_iter_mut().for_each(|slot| *slot = value));
    }

    pub fn copy<T>(&self, src: &[T], dst: &mut [T])
    where
        T: Copy + Send + Sync,
    {
        debug_assert_eq!(src.len(), dst.len());
        self.pool.install(|| {
            dst.par_iter_mut()
                .zip(src.par_iter())
                .for_each(|(d, s)| *d = *s)
        });
    }

    pub fn iota(&self, dst: &mut [u64], start: u64) {
        self.pool.install(|| {
            dst.par_iter_mut()
                .enumerate()
                .for_each(|(i, slot)| *slot = start + i as u64)
        });
    }

    /// In-place inclusive prefix sum.
    ///
    /// Blocked two-pass scheme: per-block totals, a serial exclusive scan of
    /// the totals, then a parallel rebase of every block.
    pub fn prefix_sum(&self, data: &mut [u64]) {
        const SEQUENTIAL_CUTOFF: usize = 1 << 14;

        let workers = self.num_threads();
        if data.len() < SEQUENTIAL_CUTOFF || workers < 2 {
            let mut acc = 0u64;
            for v in data.iter_mut() {
                acc += *v;
                *v = acc;
            }
            return;
        }

        let chunk_len = data.len().div_ceil(workers);
        let mut block_bases: Vec<u64> = self
            .pool
            .install(|| data.par_chunks(chunk_len).map(|c| c.iter().sum()).collect());
        let mut running = 0u64;
        for base in block_bases.iter_mut() {
            let total = *base;
            *base = running;
            running += total;
        }
        self.pool.install(|| {
            data.par_chunks_mut(chunk_len)
                .zip(block_bases.par_iter())
                .for_each(|(chunk, base)| {
                    let mut acc = *base;
                    for v in chunk.iter_mut() {
                        acc += *v;
                        *v = acc;
                    }
                })
        });
    }
}

/// Splits `0..total` into `nthreads` contiguous blocks and returns block
/// `tid` as a half-open range.
pub fn block_range(total: usize, tid: usize, nthreads: usize) -> (usize, usize) {
    let per = total.div_ceil(nthreads.max(1));
    let start = (per * tid).min(total);
    let end = (start + per).min(total);
    (start, end)
}

/// Splits `data` into the consecutive segments described by CSR-style
/// one-past-last `bounds`. The segments are disjoint, so they can be handed
/// to parallel workers for independent mutation.
pub fn split_segments_mut<'a, T>(mut data: &'a mut [T], bounds: &[u64]) -> Vec<&'a mut [T]> {
    let mut segments = Vec::with_capacity(bounds.len());
    let mut prev = 0usize;
    for &bound in bounds {
        let len = bound as usize - prev;
        let (segment, rest) = data.split_at_mut(len);
        segments.push(segment);
        data = rest;
        prev = bound as usize;
    }
    segments
}

/// Per-worker storage slots addressed by the worker's thread index, with one
/// extra slot for the calling thread. Each slot has its own lock, so workers
/// never contend with each other.
pub struct PerThread<T> {
    slots: Vec<Mutex<T>>,
}

impl<T: Default> PerThread<T> {
    pub fn new(runtime: &ParallelRuntime) -> Self {
        Self {
            slots: (0..runtime.num_threads() + 1)
                .map(|_| Mutex::new(T::default()))
                .collect(),
        }
    }
}

impl<T> PerThread<T> {
    /// The current thread's slot. Workers map to their pool index; any other
    /// thread maps to the reserved extra slot.
    pub fn local(&self) -> &Mutex<T> {
        let idx = rayon::current_thread_index().map_or(0, |i| i + 1);
        &self.slots[idx.min(self.slots.len() - 1)]
    }

    pub fn drain(self) -> impl Iterator<Item = T> {
        self.slots.into_iter().map(Mutex::into_inner)
    }
}
