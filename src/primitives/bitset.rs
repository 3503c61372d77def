use std::sync::atomic::{AtomicU64, Ordering};

use super::parallel::{split_segments_mut, ParallelRuntime};
use rayon::prelude::*;

const BITS_PER_WORD: usize = 64;

/// Fixed-size bit vector with data-parallel bulk operations.
///
/// Words are atomic so `set` is safe from concurrent workers; the bulk
/// operations partition the word array into non-overlapping ranges and need
/// no locking.
pub struct DynamicBitset {
    words: Vec<AtomicU64>,
    num_bits: usize,
}

impl DynamicBitset {
    pub fn new(num_bits: usize) -> Self {
        let num_words = num_bits.div_ceil(BITS_PER_WORD);
        Self {
            words: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
            num_bits,
        }
    }

    pub fn len(&self) -> usize {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Sets bit `index`; returns true if the bit was previously clear.
    pub fn set(&self, index: usize) -> bool {
        debug_assert!(index < self.num_bits);
        let mask = 1u64 << (index % BITS_PER_WORD);
        let old = self.words[index / BITS_PER_WORD].fetch_or(mask, Ordering::Relaxed);
        old & mask == 0
    }

    pub fn test(&self, index: usize) -> bool {
        debug_assert!(index < self.num_bits);
        let mask = 1u64 << (index % BITS_PER_WORD);
        self.words[index / BITS_PER_WORD].load(Ordering::Relaxed) & mask != 0
    }

    pub fn clear(&self, rt: &ParallelRuntime) {
        rt.do_all(self.words.len(), |i| {
            self.words[i].store(0, Ordering::Relaxed);
        });
    }

    pub fn or_with(&self, other: &Self, rt: &ParallelRuntime) {
        debug_assert_eq!(self.num_bits, other.num_bits);
        rt.do_all(self.words.len(), |i| {
            let w = self.words[i].load(Ordering::Relaxed) | other.words[i].load(Ordering::Relaxed);
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    pub fn and_with(&self, other: &Self, rt: &ParallelRuntime) {
        debug_assert_eq!(self.num_bits, other.num_bits);
        rt.do_all(self.words.len(), |i| {
            let w = self.words[i].load(Ordering::Relaxed) & other.words[i].load(Ordering::Relaxed);
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    pub fn xor_with(&self, other: &Self, rt: &ParallelRuntime) {
        debug_assert_eq!(self.num_bits, other.num_bits);
        rt.do_all(self.words.len(), |i| {
            let w = self.words[i].load(Ordering::Relaxed) ^ other.words[i].load(Ordering::Relaxed);
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    /// Complements every bit in place. The trailing partial word is masked so
    /// `count` stays exact.
    pub fn invert(&self, rt: &ParallelRuntime) {
        let tail = self.tail_mask();
        let last = self.words.len().wrapping_sub(1);
        rt.do_all(self.words.len(), |i| {
            let mut w = !self.words[i].load(Ordering::Relaxed);
            if i == last {
                w &= tail;
            }
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    /// `self = a | b`, writing into the destination without temporaries.
    pub fn assign_or(&self, a: &Self, b: &Self, rt: &ParallelRuntime) {
        debug_assert_eq!(self.num_bits, a.num_bits);
        debug_assert_eq!(self.num_bits, b.num_bits);
        rt.do_all(self.words.len(), |i| {
            let w = a.words[i].load(Ordering::Relaxed) | b.words[i].load(Ordering::Relaxed);
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    /// `self = a & b`.
    pub fn assign_and(&self, a: &Self, b: &Self, rt: &ParallelRuntime) {
        debug_assert_eq!(self.num_bits, a.num_bits);
        debug_assert_eq!(self.num_bits, b.num_bits);
        rt.do_all(self.words.len(), |i| {
            let w = a.words[i].load(Ordering::Relaxed) & b.words[i].load(Ordering::Relaxed);
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    /// `self = a ^ b`.
    pub fn assign_xor(&self, a: &Self, b: &Self, rt: &ParallelRuntime) {
        debug_assert_eq!(self.num_bits, a.num_bits);
        debug_assert_eq!(self.num_bits, b.num_bits);
        rt.do_all(self.words.len(), |i| {
            let w = a.words[i].load(Ordering::Relaxed) ^ b.words[i].load(Ordering::Relaxed);
            self.words[i].store(w, Ordering::Relaxed);
        });
    }

    /// Parallel popcount reduction.
    pub fn count(&self, rt: &ParallelRuntime) -> usize {
        rt.reduce(
            self.words.len(),
            0usize,
            |i| self.words[i].load(Ordering::Relaxed).count_ones() as usize,
            |a, b| a + b,
        )
    }

    /// Indices of all set bits in ascending order.
    ///
    /// Two-pass scheme: each block's set bits are counted, an exclusive scan
    /// of the counts yields each block's write position, and a second scan
    /// writes indices into disjoint output segments.
    pub fn offsets(&self, rt: &ParallelRuntime) -> Vec<u64> {
        if self.words.is_empty() {
            return Vec::new();
        }
        let chunk_words = self
            .words
            .len()
            .div_ceil(rt.num_threads().max(1))
            .max(1);

        let counts: Vec<usize> = rt.install(|| {
            self.words
                .par_chunks(chunk_words)
                .map(|chunk| {
                    chunk
                        .iter()
                        .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
                        .sum()
                })
                .collect()
        });
        let mut bounds: Vec<u64> = Vec::with_capacity(counts.len());
        let mut running = 0u64;
        for &c in &counts {
            running += c as u64;
            bounds.push(running);
        }

        let mut out = vec![0u64; running as usize];
        let segments = split_segments_mut(&mut out, &bounds);
        rt.install(|| {
            segments
                .into_par_iter()
                .zip(self.words.par_chunks(chunk_words))
                .enumerate()
                .for_each(|(chunk_idx, (segment, chunk))| {
                    let base_bit = chunk_idx * chunk_words * BITS_PER_WORD;
                    let mut k = 0;
                    for (word_idx, word) in chunk.iter().enumerate() {
                        let mut bits = word.load(Ordering::Relaxed);
                        while bits != 0 {
                            let b = bits.trailing_zeros() as usize;
                            segment[k] = (base_bit + word_idx * BITS_PER_WORD + b) as u64;
                            k += 1;
                            bits &= bits - 1;
                        }
                    }
                    debug_assert_eq!(k, segment.len());
                });
        });
        out
    }

    fn tail_mask(&self) -> u64 {
        let rem = self.num_bits % BITS_PER_WORD;
        if rem == 0 {
            u64::MAX
        } else {
            (1u64 << rem) - 1
        }
    }
}
