//! Generation of standard and interleaved randomized benchmarking sequences.
//!
//! A sequence is a list of random Clifford gates followed by a single recovery
//! gate chosen so that the whole list composes to the identity. The random
//! draws are the only source of entropy; everything else is deterministic.
//!
//! When an experiment averages over several loops of the same depth/variation
//! grid, each loop must replay exactly the sequences drawn on the first one.
//! [`SequenceBank`] implements this by caching every sequence under its
//! (depth index, variation) key.

use rand::Rng;
use rustc_hash::FxHashMap as HashMap;
use crate::clifford::{
    C1,
    CliffordError,
    CliffordGroup,
    CliffordResult,
    NUM_CLIFFORDS,
};
use CliffordError::DepthMismatch;

/// A randomized benchmarking gate sequence with its recovery gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RbSequence {
    // Number of random draws.
    depth: usize,
    // Random gates, possibly interleaved with a fixed gate; applied in order.
    gates: Vec<C1>,
    // Single element equal to the product of `gates`.
    total: C1,
    // Inverse of `total`.
    recovery: C1,
}

impl RbSequence {
    fn from_gates(group: &CliffordGroup, depth: usize, gates: Vec<C1>)
        -> CliffordResult<Self>
    {
        let total = group.total(gates.iter().copied())?;
        let recovery = group.invert(total);
        Ok(Self { depth, gates, total, recovery })
    }

    /// Return the number of random draws.
    pub fn depth(&self) -> usize { self.depth }

    /// Get a reference to the gates preceding the recovery gate.
    pub fn gates(&self) -> &Vec<C1> { &self.gates }

    /// Return the single element equivalent to all gates preceding the
    /// recovery gate.
    ///
    /// Sequencers that undo a sequence by playing this element in inverted
    /// order can use it in place of [`Self::recovery`].
    pub fn total(&self) -> C1 { self.total }

    /// Return the recovery gate.
    pub fn recovery(&self) -> C1 { self.recovery }

    /// Return the number of gates including the recovery gate.
    pub fn len(&self) -> usize { self.gates.len() + 1 }

    /// Return `false`; a sequence always contains its recovery gate.
    pub fn is_empty(&self) -> bool { false }

    /// Iterate over all gates in application order, ending with the recovery
    /// gate.
    pub fn iter(&self) -> impl Iterator<Item = C1> + '_ {
        self.gates.iter().copied().chain(std::iter::once(self.recovery))
    }

    /// Return the names of all gates in application order, ending with the
    /// recovery gate.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(C1::name).collect()
    }

    /// Return `true` if the full sequence, including the recovery gate,
    /// composes to the identity.
    pub fn resolves_to_identity(&self, group: &CliffordGroup) -> bool {
        group.total(self.iter())
            .map(C1::is_identity)
            .unwrap_or(false)
    }
}

/// Generate a standard RB sequence of `depth` uniformly random Cliffords plus
/// a recovery gate.
///
/// A depth of zero gives a sequence holding only the recovery gate, which is
/// the identity.
pub fn random_sequence<R>(group: &CliffordGroup, depth: usize, rng: &mut R)
    -> CliffordResult<RbSequence>
where R: Rng + ?Sized
{
    let gates: Vec<C1> = (0..depth).map(|_| C1::random(rng)).collect();
    RbSequence::from_gates(group, depth, gates)
}

/// Generate an interleaved RB sequence, where each of the `depth` random
/// Cliffords is followed by a copy of `gate`.
///
/// The result holds `2 * depth + 1` gates including the recovery gate, with
/// `gate` at every odd position.
pub fn interleaved_sequence<R>(
    group: &CliffordGroup,
    depth: usize,
    gate: C1,
    rng: &mut R,
) -> CliffordResult<RbSequence>
where R: Rng + ?Sized
{
    let gates: Vec<C1> =
        (0..depth)
        .flat_map(|_| [C1::random(rng), gate])
        .collect();
    RbSequence::from_gates(group, depth, gates)
}

/// Like [`interleaved_sequence`], but with the interleaved gate given by name.
///
/// Fails if `name` is not one of the 24 canonical Clifford names.
pub fn interleaved_sequence_named<R>(
    group: &CliffordGroup,
    depth: usize,
    name: &str,
    rng: &mut R,
) -> CliffordResult<RbSequence>
where R: Rng + ?Sized
{
    let gate: C1 = name.parse()?;
    interleaved_sequence(group, depth, gate, rng)
}

/// Build a sequence from explicit positions in the canonical Clifford table.
///
/// Fails if any index is outside `[0, 24)`.
pub fn sequence_from_indices<I>(group: &CliffordGroup, indices: I)
    -> CliffordResult<RbSequence>
where I: IntoIterator<Item = usize>
{
    let gates: Vec<C1> =
        indices.into_iter()
        .map(C1::from_index)
        .collect::<CliffordResult<_>>()?;
    RbSequence::from_gates(group, gates.len(), gates)
}

/// Cache of generated sequences for replay across averaging loops.
///
/// The first request for a (depth index, variation) key draws a fresh sequence;
/// every later request returns the cached one, regardless of the generator
/// state. A later request for the same key at a different depth is an error.
#[derive(Clone, Debug, Default)]
pub struct SequenceBank {
    interleave: Option<C1>,
    seqs: HashMap<(usize, usize), RbSequence>,
}

impl SequenceBank {
    /// Create a new, empty bank. If `interleave` is `Some`, interleaved
    /// sequences are generated.
    pub fn new(interleave: Option<C1>) -> Self {
        Self { interleave, seqs: HashMap::default() }
    }

    /// Return the interleaved gate, if any.
    pub fn interleave(&self) -> Option<C1> { self.interleave }

    /// Return the number of cached sequences.
    pub fn len(&self) -> usize { self.seqs.len() }

    /// Return `true` if no sequences have been generated yet.
    pub fn is_empty(&self) -> bool { self.seqs.is_empty() }

    /// Get a cached sequence.
    pub fn get(&self, depth_idx: usize, var: usize) -> Option<&RbSequence> {
        self.seqs.get(&(depth_idx, var))
    }

    /// Get the sequence for a (depth index, variation) key, drawing a new one
    /// of the given depth if the key has not been seen before.
    ///
    /// Fails if the key is cached with a different depth.
    pub fn get_or_generate<R>(
        &mut self,
        group: &CliffordGroup,
        depth_idx: usize,
        var: usize,
        depth: usize,
        rng: &mut R,
    ) -> CliffordResult<&RbSequence>
    where R: Rng + ?Sized
    {
        let key = (depth_idx, var);
        if let Some(cached) = self.seqs.get(&key) {
            if cached.depth() != depth {
                return Err(DepthMismatch {
                    depth_idx,
                    var,
                    cached: cached.depth(),
                    requested: depth,
                });
            }
        } else {
            let seq =
                match self.interleave {
                    Some(gate) => interleaved_sequence(group, depth, gate, rng)?,
                    None => random_sequence(group, depth, rng)?,
                };
            self.seqs.insert(key, seq);
        }
        Ok(&self.seqs[&key])
    }

    /// Remove all cached sequences.
    pub fn clear(&mut self) { self.seqs.clear(); }
}

/// Return the number of distinct single-qubit Clifford sequences of a given
/// depth, saturating at `u128::MAX`.
pub fn num_sequences(depth: usize) -> u128 {
    (0..depth).fold(1_u128, |acc, _| acc.saturating_mul(NUM_CLIFFORDS as u128))
}

#[cfg(test)]
mod tests {
    use rand::{ SeedableRng, rngs::StdRng };
    use super::*;

    #[test]
    fn zero_depth_is_identity() {
        let group = CliffordGroup::global().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let seq = random_sequence(group, 0, &mut rng).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.names(), vec!["I"]);
        assert!(seq.total().is_identity());
    }

    #[test]
    fn explicit_indices() {
        let group = CliffordGroup::global().unwrap();
        // X/2 twice is X, recovered by X
        let seq = sequence_from_indices(group, [4, 4]).unwrap();
        assert_eq!(seq.names(), vec!["X/2", "X/2", "X"]);
        assert_eq!(seq.total(), C1::X);
        assert!(seq.resolves_to_identity(group));
        assert!(sequence_from_indices(group, [3, 24]).is_err());
    }

    #[test]
    fn bank_replays() {
        let group = CliffordGroup::global().unwrap();
        let mut rng = StdRng::seed_from_u64(10546);
        let mut bank = SequenceBank::new(None);
        let first = bank.get_or_generate(group, 0, 0, 16, &mut rng)
            .unwrap().clone();
        let second = bank.get_or_generate(group, 0, 0, 16, &mut rng)
            .unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(bank.len(), 1);
        bank.get_or_generate(group, 0, 1, 16, &mut rng).unwrap();
        assert_eq!(bank.len(), 2);
    }

    #[test]
    fn bank_rejects_new_depth() {
        let group = CliffordGroup::global().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut bank = SequenceBank::new(None);
        bank.get_or_generate(group, 0, 0, 1, &mut rng).unwrap();
        let err = bank.get_or_generate(group, 0, 0, 50, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            DepthMismatch { depth_idx: 0, var: 0, cached: 1, requested: 50 },
        ));
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
        bank.clear();
        let seq = bank.get_or_generate(group, 0, 0, 50, &mut rng).unwrap();
        assert_eq!(seq.depth(), 50);
    }

    #[test]
    fn sequence_count() {
        assert_eq!(num_sequences(0), 1);
        assert_eq!(num_sequences(2), 576);
        assert_eq!(num_sequences(1000), u128::MAX);
    }
}
