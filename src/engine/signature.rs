//! Growable bit-signatures keyed by component type id.
//!
//! A [`Signature`] identifies which component types are present on an entity
//! or archetype. It is a bit vector over `u64` words that grows on demand and
//! never shrinks implicitly, which means two signatures describing the same
//! component set can have different word counts.
//!
//! ## Two notions of equality
//!
//! * **Exact** (`==`, `Ord`): capacity-sensitive. Two signatures with the
//!   same bits but different word counts compare unequal. This is the cheap
//!   structural comparison.
//! * **Value** (`eq_ignoring_size`, `cmp_ignoring_size`): capacity-agnostic.
//!   Words absent from the shorter operand are treated as zero, and ordering
//!   is unsigned-magnitude with the most significant word first. The sorted
//!   archetype registry relies on this comparison, because archetype keys
//!   grow independently as component type ids are observed.
//!
//! ## Capacity discipline
//!
//! Logical operations (`and_into`, `or_into`, `xor_into`, `not_into`) write
//! into an explicit output signature and fail with [`CapacityError`] when the
//! output cannot hold the larger operand. Bits in the output beyond the
//! operands are zeroed.

use std::cmp::Ordering;

use crate::engine::error::CapacityError;
use crate::engine::types::WORD_BITS;


/// Growable bit vector identifying a set of component types.
///
/// ## Invariants
/// * `words` never shrinks implicitly; `set` and `set_range` grow it.
/// * Bits past `capacity()` read as zero.

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    words: Vec<u64>,
}

impl Signature {
    /// Creates an empty signature with zero capacity.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zeroed signature able to hold at least `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0u64; bits.div_ceil(WORD_BITS)],
        }
    }

    /// Builds a signature from a list of bit indices.
    pub fn from_bits(bits: &[usize]) -> Self {
        let mut signature = Signature::new();
        for &bit in bits {
            signature.set(bit);
        }
        signature
    }

    /// Current capacity in bits. Grows in whole-word steps.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Tests bit `bit`. Bits past the current capacity read as zero.
    #[inline]
    pub fn has(&self, bit: usize) -> bool {
        match self.words.get(bit / WORD_BITS) {
            Some(&word) => (word >> (bit % WORD_BITS)) & 1 == 1,
            None => false,
        }
    }

    /// Sets bit `bit`, growing the vector on demand.
    #[inline]
    pub fn set(&mut self, bit: usize) {
        let index = bit / WORD_BITS;
        if index >= self.words.len() {
            self.words.resize(index + 1, 0);
        }
        self.words[index] |= 1u64 << (bit % WORD_BITS);
    }

    /// Clears bit `bit`. A no-op past the current capacity.
    #[inline]
    pub fn clear(&mut self, bit: usize) {
        if let Some(word) = self.words.get_mut(bit / WORD_BITS) {
            *word &= !(1u64 << (bit % WORD_BITS));
        }
    }

    /// Sets every bit in the half-open range `[from, to)`, growing on demand.
    pub fn set_range(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }

        let last = to - 1;
        let index = last / WORD_BITS;
        if index >= self.words.len() {
            self.words.resize(index + 1, 0);
        }

        for word_index in (from / WORD_BITS)..=index {
            let word_base = word_index * WORD_BITS;
            let low = from.saturating_sub(word_base).min(WORD_BITS);
            let high = (to - word_base).min(WORD_BITS);

            // Mask of bits [low, high) within this word.
            let mask = if high - low == WORD_BITS {
                u64::MAX
            } else {
                ((1u64 << (high - low)) - 1) << low
            };
            self.words[word_index] |= mask;
        }
    }

    /// Number of set bits.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Number of set bits strictly below `bit`.
    pub fn count_ones_before(&self, bit: usize) -> usize {
        let full_words = bit / WORD_BITS;
        let mut count = self
            .words
            .iter()
            .take(full_words)
            .map(|word| word.count_ones() as usize)
            .sum();

        let partial = bit % WORD_BITS;
        if partial != 0 {
            if let Some(&word) = self.words.get(full_words) {
                count += (word & ((1u64 << partial) - 1)).count_ones() as usize;
            }
        }
        count
    }

    /// Index of the first set bit at or after `from`, if any.
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut word_index = from / WORD_BITS;
        let mut masked = *self.words.get(word_index)? & !((1u64 << (from % WORD_BITS)) - 1);

        loop {
            if masked != 0 {
                return Some(word_index * WORD_BITS + masked.trailing_zeros() as usize);
            }
            word_index += 1;
            masked = *self.words.get(word_index)?;
        }
    }

    /// Index of the first clear bit at or after `from`.
    ///
    /// ## Notes
    /// May answer `capacity()` (one past the stored words) when every stored
    /// bit from `from` on is set; setting that bit grows the vector.
    pub fn next_clear_bit(&self, from: usize) -> usize {
        if from >= self.capacity() {
            return from;
        }

        let mut word_index = from / WORD_BITS;
        let mut masked = self.words[word_index] | ((1u64 << (from % WORD_BITS)) - 1);

        loop {
            if masked != u64::MAX {
                return word_index * WORD_BITS + masked.trailing_ones() as usize;
            }
            word_index += 1;
            match self.words.get(word_index) {
                Some(&word) => masked = word,
                None => return self.capacity(),
            }
        }
    }

    /// Writes `self AND other` into `out`.
    ///
    /// ## Errors
    /// `CapacityError` if `out` is smaller than the larger operand. Output
    /// bits past the operands are zeroed.
    #[inline]
    pub fn and_into(&self, other: &Signature, out: &mut Signature) -> Result<(), CapacityError> {
        self.combine_into(other, out, |a, b| a & b)
    }

    /// Writes `self OR other` into `out`. Same capacity rules as [`Self::and_into`].
    #[inline]
    pub fn or_into(&self, other: &Signature, out: &mut Signature) -> Result<(), CapacityError> {
        self.combine_into(other, out, |a, b| a | b)
    }

    /// Writes `self XOR other` into `out`. Same capacity rules as [`Self::and_into`].
    #[inline]
    pub fn xor_into(&self, other: &Signature, out: &mut Signature) -> Result<(), CapacityError> {
        self.combine_into(other, out, |a, b| a ^ b)
    }

    /// Writes the bitwise complement of `self` (over `self`'s capacity) into
    /// `out`. Output bits past `self`'s capacity are zeroed.
    pub fn not_into(&self, out: &mut Signature) -> Result<(), CapacityError> {
        if out.words.len() < self.words.len() {
            return Err(CapacityError {
                required: self.capacity(),
                capacity: out.capacity(),
            });
        }

        for (index, word) in out.words.iter_mut().enumerate() {
            *word = match self.words.get(index) {
                Some(&own) => !own,
                None => 0,
            };
        }
        Ok(())
    }

    fn combine_into(
        &self,
        other: &Signature,
        out: &mut Signature,
        op: impl Fn(u64, u64) -> u64,
    ) -> Result<(), CapacityError> {
        let required = self.words.len().max(other.words.len());
        if out.words.len() < required {
            return Err(CapacityError {
                required: required * WORD_BITS,
                capacity: out.capacity(),
            });
        }

        for (index, word) in out.words.iter_mut().enumerate() {
            let a = self.words.get(index).copied().unwrap_or(0);
            let b = other.words.get(index).copied().unwrap_or(0);
            *word = op(a, b);
        }
        Ok(())
    }

    /// Returns `true` if every set bit of `self` is also set in `other`.
    pub fn is_subset_of(&self, other: &Signature) -> bool {
        self.words.iter().enumerate().all(|(index, &word)| {
            word & !other.words.get(index).copied().unwrap_or(0) == 0
        })
    }

    /// Returns `true` if `self` is a subset of `other` and value-unequal to it.
    #[inline]
    pub fn is_strict_subset_of(&self, other: &Signature) -> bool {
        self.is_subset_of(other) && !self.eq_ignoring_size(other)
    }

    /// Returns `true` if the two signatures share at least one set bit.
    pub fn intersects(&self, other: &Signature) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(&a, &b)| a & b != 0)
    }

    /// Capacity-agnostic equality: absent high words compare as zero.
    pub fn eq_ignoring_size(&self, other: &Signature) -> bool {
        self.cmp_ignoring_size(other) == Ordering::Equal
    }

    /// Capacity-agnostic total order: unsigned-magnitude comparison of the
    /// underlying words, most significant word first, absent words as zero.
    ///
    /// This is the ordering of the archetype registry.
    pub fn cmp_ignoring_size(&self, other: &Signature) -> Ordering {
        let width = self.words.len().max(other.words.len());
        for index in (0..width).rev() {
            let a = self.words.get(index).copied().unwrap_or(0);
            let b = other.words.get(index).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }

    /// Iterates over the indices of all set bits, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * WORD_BITS;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(base + tz)
            })
        })
    }
}

impl PartialOrd for Signature {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    /// Exact, capacity-sensitive ordering: shorter word vectors sort first,
    /// ties break on unsigned magnitude (most significant word first).
    fn cmp(&self, other: &Self) -> Ordering {
        self.words
            .len()
            .cmp(&other.words.len())
            .then_with(|| self.cmp_ignoring_size(other))
    }
}
