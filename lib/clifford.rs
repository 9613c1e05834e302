//! The 24-element single-qubit Clifford group, represented as permutations of
//! the six cardinal points on the Bloch sphere.
//!
//! Every element is stored as its action on the ordered basis
//!
//! ```text
//!   0    1    2    3    4    5
//!  +Z   +X   +Y   -Z   -X   -Y
//! ```
//!
//! i.e. a 6×6 permutation matrix whose column `j` has a single 1 in the row of
//! the direction that basis vector `j` is sent to. Because every element is a
//! proper rotation, it is fully determined by where it sends +Z and +X, so the
//! pair of those two images (the [`Signature`]) is used for all lookups.
//!
//! The group table is generated from three π/2 rotations about the Z, X, and Y
//! axes. Ten primitive pulses (the identity plus ±π/2 and π rotations about
//! each axis) are obtained as powers of the generators, and the remaining
//! fourteen elements are two-pulse composites of the form `A,B`, which is read
//! as a matrix product (i.e. `B` is applied to the qubit first).
//!
//! # Example
//!
//! ```
//! use randbench::clifford::{ C1, CliffordGroup };
//!
//! let group = CliffordGroup::global().unwrap();
//! assert_eq!(group.len(), 24);
//!
//! // X/2 followed by another X/2 is a π rotation about X
//! let g = group.compose(C1::HalfX, C1::HalfX);
//! assert_eq!(g, C1::X);
//!
//! // every element has an inverse in the table
//! let ginv = group.invert(C1::HalfXHalfZ);
//! assert!(group.compose(C1::HalfXHalfZ, ginv).is_identity());
//! ```

use std::{ fmt, str::FromStr };
use itertools::Itertools;
use ndarray as nd;
use once_cell::sync::OnceCell;
use rand::Rng;
use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;
use tracing::debug;
use crate::ErrorKind;

#[derive(Debug, Error)]
pub enum CliffordError {
    /// Returned when a gate name does not match any of the 24 canonical
    /// Clifford names.
    #[error("unknown Clifford gate name {0:?}")]
    UnknownGate(String),

    /// Returned when a table index lies outside `[0, 24)`.
    #[error("Clifford table index {0} out of range")]
    IndexOutOfRange(usize),

    /// Returned when a cached sequence is requested at a different depth than
    /// the one it was drawn with.
    #[error("sequence ({depth_idx}, {var}) was drawn at depth {cached}, not {requested}")]
    DepthMismatch {
        depth_idx: usize,
        var: usize,
        cached: usize,
        requested: usize,
    },

    /// Returned when the generated group table does not consist of exactly the
    /// 24 expected elements; this indicates an error in the generator
    /// definitions rather than anything a caller can fix.
    #[error("inconsistent Clifford group table: {0}")]
    Inconsistent(String),
}
use CliffordError::*;
pub type CliffordResult<T> = Result<T, CliffordError>;

impl CliffordError {
    /// Return the broad category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnknownGate(_) | IndexOutOfRange(_) | DepthMismatch { .. }
                => ErrorKind::InvalidArgument,
            Inconsistent(_) => ErrorKind::Consistency,
        }
    }
}

/// Number of elements in the single-qubit Clifford group.
pub const NUM_CLIFFORDS: usize = 24;

/// Index of +Z in the cardinal basis.
pub const PZ: usize = 0;
/// Index of +X in the cardinal basis.
pub const PX: usize = 1;
/// Index of +Y in the cardinal basis.
pub const PY: usize = 2;
/// Index of -Z in the cardinal basis.
pub const MZ: usize = 3;
/// Index of -X in the cardinal basis.
pub const MX: usize = 4;
/// Index of -Y in the cardinal basis.
pub const MY: usize = 5;

/// Canonical identifier of a Clifford element: the images of +Z and +X.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(pub usize, pub usize);

impl Signature {
    /// Signature of the identity.
    pub const IDENTITY: Self = Self(PZ, PX);
}

/// Action of a rotation on the six cardinal directions.
///
/// Entry `j` holds the index of the direction that basis direction `j` is sent
/// to, which is the row index of the 1 in column `j` of the equivalent
/// permutation matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Action([usize; 6]);

impl Action {
    /// The identity action.
    pub const IDENTITY: Self = Self([0, 1, 2, 3, 4, 5]);

    /// π/2 rotation about Z.
    pub const HALF_Z: Self = Self([0, 2, 4, 3, 5, 1]);

    /// π/2 rotation about X.
    pub const HALF_X: Self = Self([5, 1, 0, 2, 4, 3]);

    /// π/2 rotation about Y.
    pub const HALF_Y: Self = Self([1, 3, 2, 4, 0, 5]);

    /// Create from an array of images, checking that it is a permutation.
    pub fn from_images(images: [usize; 6]) -> Option<Self> {
        let mut seen = [false; 6];
        for &k in images.iter() {
            if k >= 6 || seen[k] { return None; }
            seen[k] = true;
        }
        Some(Self(images))
    }

    /// Create from a 6×6 permutation matrix.
    ///
    /// Returns `None` if the matrix has the wrong shape or is not a permutation
    /// matrix.
    pub fn from_matrix(mat: &nd::Array2<i32>) -> Option<Self> {
        if mat.dim() != (6, 6) { return None; }
        let mut images = [0_usize; 6];
        for (j, col) in mat.columns().into_iter().enumerate() {
            if col.iter().any(|&a| a != 0 && a != 1) { return None; }
            let ones: Vec<usize> =
                col.iter().positions(|&a| a == 1).collect();
            if ones.len() != 1 { return None; }
            images[j] = ones[0];
        }
        Self::from_images(images)
    }

    /// Convert to the equivalent 6×6 permutation matrix.
    pub fn to_matrix(&self) -> nd::Array2<i32> {
        let mut mat: nd::Array2<i32> = nd::Array2::zeros((6, 6));
        self.0.iter().enumerate()
            .for_each(|(j, &k)| { mat[[k, j]] = 1; });
        mat
    }

    /// Get a reference to the underlying image array.
    pub fn images(&self) -> &[usize; 6] { &self.0 }

    /// Return the direction that `dir` is sent to.
    ///
    /// *Panics* if `dir` is not in `0..6`.
    pub fn apply(&self, dir: usize) -> usize { self.0[dir] }

    /// Return the matrix product `self · rhs`, i.e. the action of first
    /// applying `rhs` and then `self`.
    pub fn compose(&self, rhs: &Self) -> Self {
        let mut images = [0_usize; 6];
        images.iter_mut()
            .zip(rhs.0.iter())
            .for_each(|(img, &r)| { *img = self.0[r]; });
        Self(images)
    }

    /// Return the inverse action (the transpose of the permutation matrix).
    pub fn inverse(&self) -> Self {
        let mut images = [0_usize; 6];
        self.0.iter().enumerate()
            .for_each(|(j, &k)| { images[k] = j; });
        Self(images)
    }

    /// Return `self` composed with itself `n` times.
    pub fn pow(&self, n: usize) -> Self {
        (0..n).fold(Self::IDENTITY, |acc, _| self.compose(&acc))
    }

    /// Return the canonical signature.
    pub fn signature(&self) -> Signature { Signature(self.0[PZ], self.0[PX]) }

    /// Return `true` if antipodal directions stay antipodal.
    pub fn is_rotation(&self) -> bool {
        (0..3).all(|j| self.0[j + 3] == (self.0[j] + 3) % 6)
    }
}

impl Default for Action {
    fn default() -> Self { Self::IDENTITY }
}

/// Rotation axis of a primitive pulse.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Return the π/2 generator about this axis.
    pub fn generator(self) -> Action {
        match self {
            Self::X => Action::HALF_X,
            Self::Y => Action::HALF_Y,
            Self::Z => Action::HALF_Z,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Y => write!(f, "Y"),
            Self::Z => write!(f, "Z"),
        }
    }
}

/// A single physical rotation pulse, as played by a pulse sequencer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pulse {
    /// Rotation axis.
    pub axis: Axis,
    /// `true` for a π/2 rotation, `false` for a π rotation.
    pub half: bool,
    /// `true` if the rotation is taken in the negative sense.
    pub neg: bool,
}

impl Pulse {
    const fn new(axis: Axis, half: bool, neg: bool) -> Self {
        Self { axis, half, neg }
    }

    /// Return the same pulse rotated in the opposite sense.
    pub fn flipped(self) -> Self { Self { neg: !self.neg, ..self } }

    /// Return the action of the pulse on the cardinal directions.
    ///
    /// Negative π rotations have the same action as positive ones.
    pub fn action(&self) -> Action { self.action_with(self.axis.generator()) }

    // Action of the pulse given the π/2 generator about its axis.
    fn action_with(&self, generator: Action) -> Action {
        let quarter_turns = match (self.half, self.neg) {
            (true, false) => 1,
            (false, _) => 2,
            (true, true) => 3,
        };
        generator.pow(quarter_turns)
    }
}

impl fmt::Display for Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.neg { write!(f, "-")?; }
        write!(f, "{}", self.axis)?;
        if self.half { write!(f, "/2")?; }
        Ok(())
    }
}

const P_X: Pulse = Pulse::new(Axis::X, false, false);
const P_Y: Pulse = Pulse::new(Axis::Y, false, false);
const P_Z: Pulse = Pulse::new(Axis::Z, false, false);
const P_HX: Pulse = Pulse::new(Axis::X, true, false);
const P_HY: Pulse = Pulse::new(Axis::Y, true, false);
const P_HZ: Pulse = Pulse::new(Axis::Z, true, false);
const P_NHX: Pulse = Pulse::new(Axis::X, true, true);
const P_NHY: Pulse = Pulse::new(Axis::Y, true, true);
const P_NHZ: Pulse = Pulse::new(Axis::Z, true, true);

/// Identifier for an element of the single-qubit Clifford group.
///
/// Variants are listed in canonical table order. Composite elements are named
/// after their two pulses in matrix-product order, so e.g. `HalfXHalfZ`
/// (`"X/2,Z/2"`) plays Z/2 first and then X/2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum C1 {
    /// `Z`
    Z,
    /// `X`
    X,
    /// `Y`
    Y,
    /// `Z/2`
    HalfZ,
    /// `X/2`
    HalfX,
    /// `Y/2`
    HalfY,
    /// `-Z/2`
    NegHalfZ,
    /// `-X/2`
    NegHalfX,
    /// `-Y/2`
    NegHalfY,
    /// `I`
    I,
    /// `X,Z/2`
    XHalfZ,
    /// `X/2,Z/2`
    HalfXHalfZ,
    /// `-X/2,Z/2`
    NegHalfXHalfZ,
    /// `Y,Z/2`
    YHalfZ,
    /// `Y/2,Z/2`
    HalfYHalfZ,
    /// `-Y/2,Z/2`
    NegHalfYHalfZ,
    /// `X/2,Z`
    HalfXZ,
    /// `-X/2,Z`
    NegHalfXZ,
    /// `Y/2,Z`
    HalfYZ,
    /// `-Y/2,Z`
    NegHalfYZ,
    /// `X/2,-Z/2`
    HalfXNegHalfZ,
    /// `-X/2,-Z/2`
    NegHalfXNegHalfZ,
    /// `Y/2,-Z/2`
    HalfYNegHalfZ,
    /// `-Y/2,-Z/2`
    NegHalfYNegHalfZ,
}

impl C1 {
    /// All elements, in canonical table order.
    pub const ALL: [Self; NUM_CLIFFORDS] = [
        Self::Z, Self::X, Self::Y,
        Self::HalfZ, Self::HalfX, Self::HalfY,
        Self::NegHalfZ, Self::NegHalfX, Self::NegHalfY,
        Self::I,
        Self::XHalfZ, Self::HalfXHalfZ, Self::NegHalfXHalfZ,
        Self::YHalfZ, Self::HalfYHalfZ, Self::NegHalfYHalfZ,
        Self::HalfXZ, Self::NegHalfXZ, Self::HalfYZ, Self::NegHalfYZ,
        Self::HalfXNegHalfZ, Self::NegHalfXNegHalfZ,
        Self::HalfYNegHalfZ, Self::NegHalfYNegHalfZ,
    ];

    /// Return the position of `self` in the canonical table.
    pub fn index(self) -> usize { self as usize }

    /// Look up an element by its position in the canonical table.
    pub fn from_index(k: usize) -> CliffordResult<Self> {
        Self::ALL.get(k).copied().ok_or(IndexOutOfRange(k))
    }

    /// Sample an element uniformly.
    pub fn random<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized
    {
        Self::ALL[rng.gen_range(0..NUM_CLIFFORDS)]
    }

    /// Return `true` if `self` is `I`.
    pub fn is_identity(self) -> bool { matches!(self, Self::I) }

    /// Return `true` if `self` is one of the two-pulse composites.
    pub fn is_composite(self) -> bool { self.primitives().len() == 2 }

    /// Return the canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Z => "Z",
            Self::X => "X",
            Self::Y => "Y",
            Self::HalfZ => "Z/2",
            Self::HalfX => "X/2",
            Self::HalfY => "Y/2",
            Self::NegHalfZ => "-Z/2",
            Self::NegHalfX => "-X/2",
            Self::NegHalfY => "-Y/2",
            Self::I => "I",
            Self::XHalfZ => "X,Z/2",
            Self::HalfXHalfZ => "X/2,Z/2",
            Self::NegHalfXHalfZ => "-X/2,Z/2",
            Self::YHalfZ => "Y,Z/2",
            Self::HalfYHalfZ => "Y/2,Z/2",
            Self::NegHalfYHalfZ => "-Y/2,Z/2",
            Self::HalfXZ => "X/2,Z",
            Self::NegHalfXZ => "-X/2,Z",
            Self::HalfYZ => "Y/2,Z",
            Self::NegHalfYZ => "-Y/2,Z",
            Self::HalfXNegHalfZ => "X/2,-Z/2",
            Self::NegHalfXNegHalfZ => "-X/2,-Z/2",
            Self::HalfYNegHalfZ => "Y/2,-Z/2",
            Self::NegHalfYNegHalfZ => "-Y/2,-Z/2",
        }
    }

    /// Return the primitive pulses making up `self`, in name (matrix-product)
    /// order. The identity has no pulses.
    pub fn primitives(self) -> &'static [Pulse] {
        match self {
            Self::Z => &[P_Z],
            Self::X => &[P_X],
            Self::Y => &[P_Y],
            Self::HalfZ => &[P_HZ],
            Self::HalfX => &[P_HX],
            Self::HalfY => &[P_HY],
            Self::NegHalfZ => &[P_NHZ],
            Self::NegHalfX => &[P_NHX],
            Self::NegHalfY => &[P_NHY],
            Self::I => &[],
            Self::XHalfZ => &[P_X, P_HZ],
            Self::HalfXHalfZ => &[P_HX, P_HZ],
            Self::NegHalfXHalfZ => &[P_NHX, P_HZ],
            Self::YHalfZ => &[P_Y, P_HZ],
            Self::HalfYHalfZ => &[P_HY, P_HZ],
            Self::NegHalfYHalfZ => &[P_NHY, P_HZ],
            Self::HalfXZ => &[P_HX, P_Z],
            Self::NegHalfXZ => &[P_NHX, P_Z],
            Self::HalfYZ => &[P_HY, P_Z],
            Self::NegHalfYZ => &[P_NHY, P_Z],
            Self::HalfXNegHalfZ => &[P_HX, P_NHZ],
            Self::NegHalfXNegHalfZ => &[P_NHX, P_NHZ],
            Self::HalfYNegHalfZ => &[P_HY, P_NHZ],
            Self::NegHalfYNegHalfZ => &[P_NHY, P_NHZ],
        }
    }

    /// Return the pulses to play, in time order.
    ///
    /// Normally pulses are played right to left through the name. If
    /// `inverted`, they are instead played left to right with each pulse's
    /// sense flipped, which realizes the inverse of `self`.
    pub fn playback(self, inverted: bool) -> Vec<Pulse> {
        let prims = self.primitives();
        if inverted {
            prims.iter().map(|p| p.flipped()).collect()
        } else {
            prims.iter().rev().copied().collect()
        }
    }
}

impl fmt::Display for C1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for C1 {
    type Err = CliffordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL.iter()
            .find(|g| g.name() == upper)
            .copied()
            .ok_or_else(|| UnknownGate(s.to_string()))
    }
}

static GROUP: OnceCell<CliffordGroup> = OnceCell::new();

/// Immutable table of the 24 Clifford elements with precomputed products and
/// inverses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliffordGroup {
    actions: [Action; NUM_CLIFFORDS],
    by_signature: HashMap<Signature, C1>,
    products: [[C1; NUM_CLIFFORDS]; NUM_CLIFFORDS],
    inverses: [C1; NUM_CLIFFORDS],
}

impl CliffordGroup {
    /// Get the process-wide table, building it on first access.
    ///
    /// Fails only if the table cannot be built; see [`Self::build`].
    pub fn global() -> CliffordResult<&'static Self> {
        GROUP.get_or_try_init(Self::build)
    }

    /// Generate the group table from the three π/2 generators.
    ///
    /// Fails if the generators do not produce exactly the 24 elements of
    /// [`C1::ALL`], in order, closed under composition.
    pub fn build() -> CliffordResult<Self> { Self::build_from(Axis::generator) }

    // Generate the table from arbitrary π/2 generators, checking the result
    // against the canonical names and decompositions.
    fn build_from<G>(generator: G) -> CliffordResult<Self>
    where G: Fn(Axis) -> Action
    {
        let axes = [Axis::Z, Axis::X, Axis::Y];
        let pulse_action = |p: &Pulse| p.action_with(generator(p.axis));
        if let Some(ax) =
            axes.iter().find(|ax| generator(**ax).pow(4) != Action::IDENTITY)
        {
            return Err(Inconsistent(
                format!("generator about {ax} does not have order 4")));
        }
        if let Some(ax) =
            axes.iter().find(|ax| !generator(**ax).is_rotation())
        {
            return Err(Inconsistent(
                format!("generator about {ax} is not a proper rotation")));
        }

        // π rotations, then π/2, then -π/2
        let primitives: Vec<Pulse> =
            axes.iter().map(|&ax| Pulse::new(ax, false, false))
            .chain(axes.iter().map(|&ax| Pulse::new(ax, true, false)))
            .chain(axes.iter().map(|&ax| Pulse::new(ax, true, true)))
            .collect();

        let mut entries: Vec<(String, Action)> =
            Vec::with_capacity(NUM_CLIFFORDS);
        primitives.iter()
            .for_each(|p| { entries.push((p.to_string(), pulse_action(p))); });
        entries.push(("I".to_string(), Action::IDENTITY));

        let firsts = [P_X, P_HX, P_NHX, P_Y, P_HY, P_NHY];
        let seconds = [P_HZ, P_Z, P_NHZ];
        for (second, first) in seconds.iter().cartesian_product(firsts.iter()) {
            let action = pulse_action(first).compose(&pulse_action(second));
            let sig = action.signature();
            if let Some((dup, _)) =
                entries.iter().find(|(_, a)| a.signature() == sig)
            {
                debug!("discarding {first},{second}: duplicate of {dup}");
                continue;
            }
            entries.push((format!("{first},{second}"), action));
        }

        if entries.len() != NUM_CLIFFORDS {
            return Err(Inconsistent(
                format!("generated {} elements, expected {NUM_CLIFFORDS}",
                    entries.len())
            ));
        }

        let mut actions = [Action::IDENTITY; NUM_CLIFFORDS];
        let mut by_signature: HashMap<Signature, C1> = HashMap::default();
        for ((name, action), g) in entries.iter().zip(C1::ALL) {
            if name != g.name() {
                return Err(Inconsistent(
                    format!("table slot {} holds {name}, expected {g}",
                        g.index())
                ));
            }
            let from_pulses =
                g.primitives().iter()
                .fold(Action::IDENTITY, |acc, p| acc.compose(&pulse_action(p)));
            if from_pulses != *action {
                return Err(Inconsistent(
                    format!("pulse decomposition of {g} has the wrong action")));
            }
            if by_signature.insert(action.signature(), g).is_some() {
                return Err(Inconsistent(
                    format!("duplicate signature {:?}", action.signature())));
            }
            actions[g.index()] = *action;
        }

        let mut products = [[C1::I; NUM_CLIFFORDS]; NUM_CLIFFORDS];
        let mut inverses = [C1::I; NUM_CLIFFORDS];
        for (a, b) in C1::ALL.iter().cartesian_product(C1::ALL.iter()) {
            let ab = actions[a.index()].compose(&actions[b.index()]);
            let Some(&g) = by_signature.get(&ab.signature())
                else {
                    return Err(Inconsistent(
                        format!("product {a} · {b} is not in the table")));
                };
            products[a.index()][b.index()] = g;
            if g.is_identity() { inverses[a.index()] = *b; }
        }
        debug!("built Clifford group table with {NUM_CLIFFORDS} elements");
        Ok(Self { actions, by_signature, products, inverses })
    }

    /// Return the number of elements in the table.
    pub fn len(&self) -> usize { self.actions.len() }

    /// Return `false`.
    pub fn is_empty(&self) -> bool { self.actions.is_empty() }

    /// Get the action of an element.
    pub fn action(&self, g: C1) -> &Action { &self.actions[g.index()] }

    /// Get the permutation matrix of an element.
    pub fn matrix(&self, g: C1) -> nd::Array2<i32> {
        self.actions[g.index()].to_matrix()
    }

    /// Get the canonical signature of an element.
    pub fn signature(&self, g: C1) -> Signature {
        self.actions[g.index()].signature()
    }

    /// Find the element with a given signature.
    pub fn resolve(&self, sig: Signature) -> Option<C1> {
        self.by_signature.get(&sig).copied()
    }

    /// Iterate over all elements and their actions in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (C1, &Action)> + '_ {
        C1::ALL.into_iter().zip(self.actions.iter())
    }

    /// Return the element equal to the matrix product `a · b`, i.e. `b`
    /// followed by `a`.
    pub fn compose(&self, a: C1, b: C1) -> C1 {
        self.products[a.index()][b.index()]
    }

    /// Return the unique element whose product with `g` is the identity.
    pub fn invert(&self, g: C1) -> C1 { self.inverses[g.index()] }

    /// Return the single element equal to the rotation of a whole sequence of
    /// gates, where the first item in `gates` is applied first.
    ///
    /// The total is found by pushing the +Z and +X axes through every gate and
    /// matching the final pair of directions against the table.
    pub fn total<I>(&self, gates: I) -> CliffordResult<C1>
    where I: IntoIterator<Item = C1>
    {
        let (z, x) =
            gates.into_iter()
            .fold((PZ, PX), |(z, x), g| {
                let action = self.action(g);
                (action.apply(z), action.apply(x))
            });
        self.resolve(Signature(z, x))
            .ok_or_else(|| Inconsistent(
                format!("no element with signature ({z}, {x})")))
    }
}
