//! Readout error mitigation via calibration (confusion) matrices.
//!
//! A noisy single-shot classifier sorts each shot into one of *B* outcome bins.
//! Preparing each of *L* reference states and histogramming the results gives
//! an *L* × *B* matrix whose normalized rows are the conditional probabilities
//! P(bin | prepared state). Observed bin probabilities are then a linear
//! mixture of true state probabilities through this matrix, so multiplying raw
//! counts by its (pseudo-)inverse recovers estimates of the true state counts.
//!
//! Inversion can over-correct and produce small negative counts;
//! [`fix_negative_counts`] redistributes these with a fixed greedy procedure so
//! that the result is a valid, same-total histogram.
//!
//! # Example
//!
//! ```
//! use ndarray as nd;
//! use randbench::readout::{ ConfusionMatrix, fix_negative_counts };
//!
//! let conf = ConfusionMatrix::from_counts([
//!     ("g", vec![950.0,  50.0]),
//!     ("e", vec![100.0, 900.0]),
//! ]).unwrap();
//! let raw: nd::Array2<f64> = nd::array![[600.0, 400.0]];
//! let corrected = fix_negative_counts(&conf.correct(&raw).unwrap()).unwrap();
//! assert!((corrected.sum() - 1000.0).abs() < 1e-6);
//! assert!(corrected.iter().all(|&n| n >= 0.0));
//! ```

use itertools::Itertools;
use nalgebra as na;
use ndarray as nd;
use thiserror::Error;
use tracing::{ debug, warn };
use crate::ErrorKind;

#[derive(Debug, Error)]
pub enum ReadoutError {
    /// Returned when a calibration or count matrix has no rows or no columns.
    #[error("error in readout correction: empty matrix")]
    Empty,

    /// Returned when calibration rows have differing numbers of bins.
    #[error("error in confusion matrix creation: row {0} has a different length")]
    RaggedRows(usize),

    /// Returned when two matrices that must agree along an axis do not.
    #[error("error in readout correction: {what} has {found} entries, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Returned when a calibration row has no counts to normalize.
    #[error("error in confusion matrix creation: row {0} has zero total counts")]
    ZeroRow(usize),

    /// Returned when two calibrations to be joined have different labels.
    #[error("error in confusion matrix concatenation: labels differ")]
    LabelMismatch,

    /// Returned when a square confusion matrix cannot be inverted.
    #[error("error in readout correction: confusion matrix is singular")]
    Singular,

    /// Returned when the pseudo-inverse of a non-square confusion matrix
    /// cannot be computed.
    #[error("error in readout correction: pseudo-inverse failed: {0}")]
    PseudoInverse(&'static str),

    /// Returned when negative counts must be redistributed in a row whose
    /// total is not positive.
    #[error("error in negative count repair: row {row} has total {total}")]
    NonPositiveTotal { row: usize, total: f64 },

    /// Returned when per-shot outcome arrays for different qubits have
    /// different lengths.
    #[error("error in count sorting: outcome arrays have lengths {0} and {1}")]
    ShotMismatch(usize, usize),

    /// Returned when a count matrix is expected to hold a single row.
    #[error("error in population inference: expected a single row of counts, got {0}")]
    NotSingleRow(usize),

    /// Returned when a calibration label is too short to cover every qubit.
    #[error("error in population inference: label {label:?} does not cover {qubits} qubits")]
    ShortLabel { label: String, qubits: usize },

    /// Returned when a leakage qubit is not among the measured qubits.
    #[error("error in population inference: qubit {0} is not a measured qubit")]
    UnknownQubit(usize),

    /// Returned when secondary counts and leakage qubits are not supplied
    /// together.
    #[error("error in population inference: secondary counts and leakage qubits must be given together")]
    MissingSecondary,

    /// Returned when a count vector has no counts to normalize by.
    #[error("error in population inference: total counts are {0}")]
    ZeroTotal(f64),
}
use ReadoutError::*;
pub type ReadoutResult<T> = Result<T, ReadoutError>;

impl ReadoutError {
    /// Return the broad category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Singular | PseudoInverse(_) => ErrorKind::Numerical,
            NonPositiveTotal { .. } => ErrorKind::InvariantViolation,
            _ => ErrorKind::InvalidArgument,
        }
    }
}

/// Number of decimal places kept in corrected counts.
pub const CORRECTION_DECIMALS: i32 = 5;

// Determinants below this are treated as singular.
const SINGULAR_TOL: f64 = 1e-12;

// Singular values below this are dropped from pseudo-inverses.
const PINV_EPS: f64 = 1e-12;

/// Round to a fixed number of decimal places.
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10.0_f64.powi(decimals);
    (x * scale).round() / scale
}

/// A calibration matrix of outcome-bin counts for a set of prepared reference
/// states.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfusionMatrix {
    // Prepared state labels, e.g. "gg", "ge", ...; one per row.
    labels: Vec<String>,
    // Raw calibration counts, shape (labels, bins).
    counts: nd::Array2<f64>,
    // Row-normalized `counts`.
    probs: nd::Array2<f64>,
}

impl ConfusionMatrix {
    /// Build from raw calibration counts, one `(label, counts)` pair per
    /// prepared state.
    ///
    /// Fails if there are no rows, the rows have different lengths, or any row
    /// has a non-positive total.
    pub fn from_counts<I, S, J>(rows: I) -> ReadoutResult<Self>
    where
        I: IntoIterator<Item = (S, J)>,
        S: Into<String>,
        J: IntoIterator<Item = f64>,
    {
        let (labels, data): (Vec<String>, Vec<Vec<f64>>) =
            rows.into_iter()
            .map(|(label, counts)| (label.into(), counts.into_iter().collect()))
            .unzip();
        let nbins = data.first().map(|row| row.len()).ok_or(Empty)?;
        if let Some(r) = data.iter().position(|row| row.len() != nbins) {
            return Err(RaggedRows(r));
        }
        let flat: Vec<f64> = data.into_iter().flatten().collect();
        let counts = nd::Array2::from_shape_vec((labels.len(), nbins), flat)
            .map_err(|_| Empty)?;
        Self::from_array(labels, counts)
    }

    /// Build from a label list and a matrix of raw calibration counts.
    pub fn from_array<I, S>(labels: I, counts: nd::Array2<f64>)
        -> ReadoutResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() != counts.nrows() {
            return Err(ShapeMismatch {
                what: "label list",
                expected: counts.nrows(),
                found: labels.len(),
            });
        }
        let probs = normalize_rows(&counts)?;
        Ok(Self { labels, counts, probs })
    }

    /// Get a reference to the prepared-state labels, in row order.
    pub fn labels(&self) -> &Vec<String> { &self.labels }

    /// Get a reference to the raw calibration counts.
    pub fn counts(&self) -> &nd::Array2<f64> { &self.counts }

    /// Get a reference to the row-normalized matrix.
    pub fn matrix(&self) -> &nd::Array2<f64> { &self.probs }

    /// Return the number of prepared states.
    pub fn num_labels(&self) -> usize { self.probs.nrows() }

    /// Return the number of outcome bins.
    pub fn num_bins(&self) -> usize { self.probs.ncols() }

    /// Return `true` if the matrix is square and can be inverted exactly.
    pub fn is_square(&self) -> bool { self.num_labels() == self.num_bins() }

    /// Join the outcome bins of a second calibration of the same prepared
    /// states, e.g. the same states measured with a different readout.
    ///
    /// The result has the bins of `self` followed by those of `other`, and is
    /// re-normalized from the combined raw counts.
    pub fn concat_bins(&self, other: &Self) -> ReadoutResult<Self> {
        if self.labels != other.labels { return Err(LabelMismatch); }
        let counts =
            nd::concatenate(
                nd::Axis(1), &[self.counts.view(), other.counts.view()])
            .map_err(|_| ShapeMismatch {
                what: "second calibration",
                expected: self.num_labels(),
                found: other.num_labels(),
            })?;
        Self::from_array(self.labels.iter().cloned(), counts)
    }

    /// Correct a matrix of raw counts; see [`correct_counts`].
    pub fn correct(&self, raw: &nd::Array2<f64>)
        -> ReadoutResult<nd::Array2<f64>>
    {
        correct_counts(raw, &self.probs)
    }
}

fn normalize_rows(mat: &nd::Array2<f64>) -> ReadoutResult<nd::Array2<f64>> {
    if mat.is_empty() { return Err(Empty); }
    let mut out = mat.to_owned();
    for (r, mut row) in out.axis_iter_mut(nd::Axis(0)).enumerate() {
        let total: f64 = row.sum();
        if !(total > 0.0) { return Err(ZeroRow(r)); }
        row.mapv_inplace(|p| p / total);
    }
    Ok(out)
}

/// Undo readout errors in a matrix of raw counts.
///
/// `raw` has shape (*N*, *B*) with one observation per row, and `confusion`
/// has shape (*L*, *B*) with one prepared state per row; rows of `confusion`
/// need not be normalized. The transpose of the normalized confusion matrix is
/// inverted exactly if *L* = *B* and pseudo-inverted otherwise, then applied to
/// each raw row. Each corrected row is rescaled to the total of its raw row and
/// rounded to [`CORRECTION_DECIMALS`] places. The result has shape (*N*, *L*)
/// with columns ordered as the rows of `confusion`.
///
/// Fails if the bin counts disagree or a square confusion matrix is singular.
pub fn correct_counts(raw: &nd::Array2<f64>, confusion: &nd::Array2<f64>)
    -> ReadoutResult<nd::Array2<f64>>
{
    let (n, b) = raw.dim();
    let (l, b_conf) = confusion.dim();
    if b != b_conf {
        return Err(ShapeMismatch {
            what: "raw count row",
            expected: b_conf,
            found: b,
        });
    }
    let conf = normalize_rows(confusion)?;

    // columns correspond to prepared states
    let m: na::DMatrix<f64> = na::DMatrix::from_fn(b, l, |i, j| conf[[j, i]]);
    let inv: na::DMatrix<f64> =
        if l == b {
            if m.determinant().abs() < SINGULAR_TOL { return Err(Singular); }
            m.try_inverse().ok_or(Singular)?
        } else {
            debug!(labels = l, bins = b, "using pseudo-inverse");
            m.pseudo_inverse(PINV_EPS).map_err(PseudoInverse)?
        };
    if inv.iter().any(|x| !x.is_finite()) { return Err(Singular); }

    let mut out: nd::Array2<f64> = nd::Array2::zeros((n, l));
    out.axis_iter_mut(nd::Axis(0))
        .zip(raw.axis_iter(nd::Axis(0)))
        .for_each(|(mut out_row, raw_row)| {
            out_row.iter_mut().enumerate()
                .for_each(|(i, o)| {
                    *o = raw_row.iter().enumerate()
                        .map(|(k, nk)| inv[(i, k)] * nk)
                        .sum();
                });
            let raw_total: f64 = raw_row.sum();
            let out_total: f64 = out_row.sum();
            if out_total != 0.0 {
                out_row.mapv_inplace(|o| o * raw_total / out_total);
            }
            out_row.mapv_inplace(|o| round_to(o, CORRECTION_DECIMALS));
        });
    Ok(out)
}

/// Remove negative entries from each row of a count matrix while keeping row
/// totals fixed.
///
/// For each row, while any entry is negative, the most negative entry (the
/// first, on ties) has its magnitude divided evenly among the other *L* − 1
/// entries and is then set to zero. The row is finally rescaled to its
/// original total. Each pass makes one more entry nonnegative, so at most *L*
/// passes are made per row.
///
/// Fails if a row containing negative entries has a non-positive total.
pub fn fix_negative_counts(counts: &nd::Array2<f64>)
    -> ReadoutResult<nd::Array2<f64>>
{
    let mut out = counts.to_owned();
    let len = out.ncols();
    for (r, mut row) in out.axis_iter_mut(nd::Axis(0)).enumerate() {
        let total: f64 = row.sum();
        let mut passes: usize = 0;
        loop {
            let Some(k) = row.iter().position_min_by(|a, b| a.total_cmp(b))
                else { break };
            if row[k] >= 0.0 { break; }
            if !(total > 0.0) { return Err(NonPositiveTotal { row: r, total }); }
            let shift = row[k].abs() / (len - 1) as f64;
            row.mapv_inplace(|n| n + shift);
            row[k] = 0.0;
            passes += 1;
        }
        if passes > 0 {
            warn!(row = r, passes, "redistributed negative corrected counts");
            let new_total: f64 = row.sum();
            row.mapv_inplace(|n| n * total / new_total);
        }
    }
    Ok(out)
}

/// Histogram per-shot outcomes of two qubits into the bins `[n00, n01, n10,
/// n11]`, where qubit `a` is the higher-order bit.
///
/// Fails if the two arrays have different lengths.
pub fn sort_counts(a: &[bool], b: &[bool]) -> ReadoutResult<[usize; 4]> {
    if a.len() != b.len() { return Err(ShotMismatch(a.len(), b.len())); }
    let mut counts = [0_usize; 4];
    a.iter().zip(b)
        .for_each(|(&ak, &bk)| {
            counts[2 * usize::from(ak) + usize::from(bk)] += 1;
        });
    Ok(counts)
}

/// Histogram per-shot outcomes of a single qubit into the bins `[n0, n1]`.
pub fn sort_counts_1q(a: &[bool]) -> [usize; 2] {
    let n1 = a.iter().filter(|ak| **ak).count();
    [a.len() - n1, n1]
}

/// Convert a histogram to a single-row count matrix.
pub fn counts_row(counts: &[usize]) -> nd::Array2<f64> {
    nd::Array2::from_shape_fn((1, counts.len()), |(_, j)| counts[j] as f64)
}
