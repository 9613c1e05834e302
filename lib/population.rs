//! Per-qubit ground/excited/leaked (g/e/f) population inference from binned
//! counts.
//!
//! Each outcome bin is associated with a calibration label such as `"ge"`,
//! whose *i*-th character names the state of the *i*-th measured qubit. A
//! qubit's g-population is the share of counts in bins whose label has `'g'` at
//! that qubit's position; everything else is counted as e.
//!
//! The standard readout cannot tell e from f. To resolve leakage, the same
//! state is measured a second time after a g↔e π pulse ("shelving"), which
//! moves the e-population into g and leaves f in place, so the g-share of the
//! second measurement is the true e-population and f is whatever remains.

use ndarray as nd;
use rustc_hash::FxHashMap as HashMap;
use tracing::debug;
use crate::readout::{
    ReadoutError,
    ReadoutResult,
    correct_counts,
    fix_negative_counts,
};
use ReadoutError::*;

/// g/e/f populations of a single qubit.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct QubitPopulation {
    pub g: f64,
    pub e: f64,
    pub f: f64,
}

impl QubitPopulation {
    /// Return `g + e + f`.
    pub fn total(&self) -> f64 { self.g + self.e + self.f }
}

/// Inferred populations for a set of qubits, keyed by qubit index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Populations(HashMap<usize, QubitPopulation>);

impl Populations {
    /// Get the populations of a single qubit.
    pub fn get(&self, qubit: usize) -> Option<&QubitPopulation> {
        self.0.get(&qubit)
    }

    /// Return the g-population of a qubit, or zero if it was not measured.
    pub fn g(&self, qubit: usize) -> f64 {
        self.get(qubit).map(|p| p.g).unwrap_or(0.0)
    }

    /// Return the e-population of a qubit, or zero if it was not measured.
    pub fn e(&self, qubit: usize) -> f64 {
        self.get(qubit).map(|p| p.e).unwrap_or(0.0)
    }

    /// Return the f-population of a qubit, or zero if it was not measured.
    pub fn f(&self, qubit: usize) -> f64 {
        self.get(qubit).map(|p| p.f).unwrap_or(0.0)
    }

    /// Return the number of qubits.
    pub fn len(&self) -> usize { self.0.len() }

    /// Return `true` if no qubits are present.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterate over all qubits and their populations in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &QubitPopulation)> + '_ {
        self.0.iter().map(|(q, p)| (*q, p))
    }
}

/// Inputs to [`infer_populations`].
///
/// `qubits` lists the measured qubits in tomography order, so the *i*-th
/// character of every label in `calib_order` refers to `qubits[i]`.
#[derive(Copy, Clone, Debug)]
pub struct PopulationQuery<'a> {
    pub qubits: &'a [usize],
    /// Single-row matrix of raw counts from the standard readout.
    pub counts: &'a nd::Array2<f64>,
    /// Label for each (corrected) count bin.
    pub calib_order: &'a [&'a str],
    /// Calibration matrix applied to `counts`, if any.
    pub confusion: Option<&'a nd::Array2<f64>>,
    /// Single-row matrix of raw counts from the shelved readout.
    pub counts2: Option<&'a nd::Array2<f64>>,
    /// Qubits whose f-population is resolved from `counts2`.
    pub leakage: &'a [usize],
    /// Calibration matrix applied to `counts2`; defaults to `confusion`.
    pub confusion2: Option<&'a nd::Array2<f64>>,
    /// Repair negative corrected counts.
    pub fix_negatives: bool,
}

impl<'a> PopulationQuery<'a> {
    /// Create a new query with no calibration, no shelved readout, and
    /// negative-count repair enabled.
    pub fn new(
        qubits: &'a [usize],
        counts: &'a nd::Array2<f64>,
        calib_order: &'a [&'a str],
    ) -> Self
    {
        Self {
            qubits,
            counts,
            calib_order,
            confusion: None,
            counts2: None,
            leakage: &[],
            confusion2: None,
            fix_negatives: true,
        }
    }

    /// Correct counts with a calibration matrix.
    pub fn with_confusion(mut self, confusion: &'a nd::Array2<f64>) -> Self {
        self.confusion = Some(confusion);
        self
    }

    /// Resolve f-populations of `leakage` qubits from shelved-readout counts.
    pub fn with_shelved(
        mut self,
        counts2: &'a nd::Array2<f64>,
        leakage: &'a [usize],
    ) -> Self
    {
        self.counts2 = Some(counts2);
        self.leakage = leakage;
        self
    }

    /// Use a separate calibration matrix for the shelved readout.
    pub fn with_shelved_confusion(mut self, confusion2: &'a nd::Array2<f64>)
        -> Self
    {
        self.confusion2 = Some(confusion2);
        self
    }

    /// Enable or disable negative-count repair.
    pub fn fix_negatives(mut self, fix: bool) -> Self {
        self.fix_negatives = fix;
        self
    }

    fn validate(&self) -> ReadoutResult<()> {
        if self.counts2.is_some() == self.leakage.is_empty() {
            return Err(MissingSecondary);
        }
        check_labels(self.calib_order, self.qubits.len())?;
        if let Some(q) = self.leakage.iter().find(|q| !self.qubits.contains(q)) {
            return Err(UnknownQubit(*q));
        }
        Ok(())
    }
}

fn check_labels(calib_order: &[&str], num_qubits: usize) -> ReadoutResult<()> {
    match calib_order.iter().find(|l| l.chars().count() < num_qubits) {
        Some(label) => Err(ShortLabel {
            label: label.to_string(),
            qubits: num_qubits,
        }),
        None => Ok(()),
    }
}

// Correct and repair a single row of counts, then flatten it.
fn process_counts(
    counts: &nd::Array2<f64>,
    confusion: Option<&nd::Array2<f64>>,
    fix_negatives: bool,
    num_labels: usize,
) -> ReadoutResult<nd::Array1<f64>>
{
    if counts.nrows() != 1 { return Err(NotSingleRow(counts.nrows())); }
    let mut counts: nd::Array2<f64> =
        match confusion {
            Some(conf) => correct_counts(counts, conf)?,
            None => counts.to_owned(),
        };
    if fix_negatives { counts = fix_negative_counts(&counts)?; }
    if counts.ncols() != num_labels {
        return Err(ShapeMismatch {
            what: "calibration order",
            expected: counts.ncols(),
            found: num_labels,
        });
    }
    let total: f64 = counts.sum();
    if !(total > 0.0) { return Err(ZeroTotal(total)); }
    Ok(counts.row(0).mapv(|n| n / total))
}

// Share of counts with each character at each qubit position.
fn shares<F>(
    probs: &nd::Array1<f64>,
    calib_order: &[&str],
    num_qubits: usize,
    mut f: F,
)
where F: FnMut(usize, char, f64)
{
    calib_order.iter().zip(probs)
        .for_each(|(label, p)| {
            label.chars().take(num_qubits).enumerate()
                .for_each(|(pos, ch)| f(pos, ch, *p));
        });
}

/// Infer per-qubit g/e/f populations from binned counts.
///
/// Counts are corrected with `query.confusion` (if given) and then repaired
/// with [`fix_negative_counts`] (if `query.fix_negatives`). Each qubit's g- and
/// e-populations are accumulated from the normalized bins by label character;
/// its f-population is zero unless it is listed in `query.leakage`, in which
/// case the shelved counts are processed the same way, their g-share becomes
/// the e-population, and f is the remainder. For every qubit,
/// `g + e + f == 1`.
///
/// Fails if any count matrix has more than one row, `calib_order` does not
/// match the number of bins, a label is shorter than `qubits`, a leakage qubit
/// is not measured, shelved counts and leakage qubits are not given together,
/// or a total is not positive.
pub fn infer_populations(query: &PopulationQuery) -> ReadoutResult<Populations> {
    query.validate()?;
    let nq = query.qubits.len();
    let order = query.calib_order;
    let probs1 =
        process_counts(
            query.counts, query.confusion, query.fix_negatives, order.len())?;
    let mut g: Vec<f64> = vec![0.0; nq];
    let mut e: Vec<f64> = vec![0.0; nq];
    let mut f: Vec<f64> = vec![0.0; nq];
    shares(&probs1, order, nq, |pos, ch, p| {
        if ch == 'g' { g[pos] += p; } else { e[pos] += p; }
    });

    if let Some(counts2) = query.counts2 {
        let confusion2 = query.confusion2.or(query.confusion);
        let probs2 =
            process_counts(
                counts2, confusion2, query.fix_negatives, order.len())?;
        let shelved: Vec<bool> =
            query.qubits.iter().map(|q| query.leakage.contains(q)).collect();
        shelved.iter().enumerate()
            .filter(|(_, s)| **s)
            .for_each(|(pos, _)| { e[pos] = 0.0; });
        shares(&probs2, order, nq, |pos, ch, p| {
            if shelved[pos] && ch == 'g' { e[pos] += p; }
        });
        shelved.iter().enumerate()
            .filter(|(_, s)| **s)
            .for_each(|(pos, _)| { f[pos] = 1.0 - g[pos] - e[pos]; });
    }

    let pops: HashMap<usize, QubitPopulation> =
        query.qubits.iter().enumerate()
        .map(|(pos, q)| (*q, QubitPopulation { g: g[pos], e: e[pos], f: f[pos] }))
        .collect();
    debug!(qubits = nq, leakage = query.leakage.len(), "inferred populations");
    Ok(Populations(pops))
}

/// Infer populations from per-qubit excited-state fractions rather than binned
/// counts.
///
/// `excited[i]` is the e-fraction measured for `qubits[i]` with the standard
/// readout, giving `g = 1 - excited[i]` and `e = excited[i]`. For qubits listed
/// in `leakage`, `shelved[i]` is the e-fraction measured after shelving, giving
/// `e = 1 - shelved[i]` and `f = 1 - g - e`.
pub fn infer_populations_scaled(
    qubits: &[usize],
    excited: &[f64],
    shelved: Option<&[f64]>,
    leakage: &[usize],
) -> ReadoutResult<Populations>
{
    if excited.len() != qubits.len() {
        return Err(ShapeMismatch {
            what: "excited fractions",
            expected: qubits.len(),
            found: excited.len(),
        });
    }
    if shelved.is_some() == leakage.is_empty() { return Err(MissingSecondary); }
    if let Some(q) = leakage.iter().find(|q| !qubits.contains(q)) {
        return Err(UnknownQubit(*q));
    }
    if let Some(s) = shelved {
        if s.len() != qubits.len() {
            return Err(ShapeMismatch {
                what: "shelved fractions",
                expected: qubits.len(),
                found: s.len(),
            });
        }
    }
    let pops: HashMap<usize, QubitPopulation> =
        qubits.iter().zip(excited).enumerate()
        .map(|(pos, (q, ex))| {
            let g = 1.0 - ex;
            let pop =
                match shelved {
                    Some(s) if leakage.contains(q) => {
                        let e = 1.0 - s[pos];
                        QubitPopulation { g, e, f: 1.0 - g - e }
                    },
                    _ => QubitPopulation { g, e: *ex, f: 0.0 },
                };
            (*q, pop)
        })
        .collect();
    Ok(Populations(pops))
}

/// Infer populations from a single concatenated count vector covering two
/// readouts, using a combined (generally non-square) calibration.
///
/// `confusion_total` has one row per label in `calib_order`, e.g. `["gg", "ge",
/// "eg", "ee", "gf", "ef"]`, and one column per bin of `raw_total`, e.g. the
/// four standard-readout bins followed by the four shelved-readout bins. The
/// corrected count for each label is assigned to g, e, or f for each qubit by
/// the label's character at that qubit's position.
pub fn infer_populations_two_readout(
    qubits: &[usize],
    raw_total: &nd::Array1<f64>,
    calib_order: &[&str],
    confusion_total: &nd::Array2<f64>,
    fix_negatives: bool,
) -> ReadoutResult<Populations>
{
    if calib_order.len() != confusion_total.nrows() {
        return Err(ShapeMismatch {
            what: "calibration order",
            expected: confusion_total.nrows(),
            found: calib_order.len(),
        });
    }
    check_labels(calib_order, qubits.len())?;
    let raw: nd::Array2<f64> = raw_total.view().insert_axis(nd::Axis(0)).to_owned();
    let probs =
        process_counts(
            &raw, Some(confusion_total), fix_negatives, calib_order.len())?;
    let nq = qubits.len();
    let mut pops: Vec<QubitPopulation> = vec![QubitPopulation::default(); nq];
    shares(&probs, calib_order, nq, |pos, ch, p| {
        match ch {
            'g' => { pops[pos].g += p; },
            'e' => { pops[pos].e += p; },
            _ => { pops[pos].f += p; },
        }
    });
    Ok(Populations(qubits.iter().copied().zip(pops).collect()))
}

#[cfg(test)]
mod tests {
    use crate::ErrorKind;
    use super::*;

    const ORDER: [&str; 4] = ["gg", "ge", "eg", "ee"];

    #[test]
    fn single_qubit_threshold() {
        let counts: nd::Array2<f64> = nd::array![[80.0, 20.0]];
        let order = ["g", "e"];
        let pops =
            infer_populations(&PopulationQuery::new(&[0], &counts, &order))
            .unwrap();
        assert!((pops.g(0) - 0.8).abs() < 1e-12);
        assert!((pops.e(0) - 0.2).abs() < 1e-12);
        assert_eq!(pops.f(0), 0.0);
    }

    #[test]
    fn two_qubit_marginals() {
        let counts: nd::Array2<f64> = nd::array![[40.0, 10.0, 30.0, 20.0]];
        let pops =
            infer_populations(&PopulationQuery::new(&[3, 1], &counts, &ORDER))
            .unwrap();
        // qubit 3 is the first label character
        assert!((pops.g(3) - 0.5).abs() < 1e-12);
        assert!((pops.g(1) - 0.7).abs() < 1e-12);
        pops.iter().for_each(|(_, p)| assert!((p.total() - 1.0).abs() < 1e-12));
    }

    #[test]
    fn shelved_readout_resolves_leakage() {
        // drive qubit 1: g = 0.6, e = 0.3, f = 0.1
        let counts: nd::Array2<f64> = nd::array![[600.0, 400.0, 0.0, 0.0]];
        let counts2: nd::Array2<f64> = nd::array![[300.0, 700.0, 0.0, 0.0]];
        let pops =
            infer_populations(
                &PopulationQuery::new(&[0, 1], &counts, &ORDER)
                    .with_confusion(&nd::Array2::eye(4))
                    .with_shelved(&counts2, &[1])
            ).unwrap();
        let p1 = pops.get(1).unwrap();
        assert!((p1.g - 0.6).abs() < 1e-9);
        assert!((p1.e - 0.3).abs() < 1e-9);
        assert!((p1.f - 0.1).abs() < 1e-9);
        let p0 = pops.get(0).unwrap();
        assert!((p0.g - 1.0).abs() < 1e-9);
        assert_eq!(p0.f, 0.0);
    }

    #[test]
    fn rejects_bad_queries() {
        let counts: nd::Array2<f64> = nd::array![[1.0, 2.0, 3.0, 4.0]];
        let two_rows: nd::Array2<f64> = nd::Array2::ones((2, 4));
        let err =
            infer_populations(&PopulationQuery::new(&[0, 1], &two_rows, &ORDER))
            .unwrap_err();
        assert!(matches!(err, NotSingleRow(2)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let short = ["g", "e", "g", "e"];
        assert!(matches!(
            infer_populations(&PopulationQuery::new(&[0, 1], &counts, &short)),
            Err(ShortLabel { .. }),
        ));

        assert!(matches!(
            infer_populations(&PopulationQuery::new(&[0, 1], &counts, &ORDER[..3])),
            Err(ShapeMismatch { .. }),
        ));

        let mut query = PopulationQuery::new(&[0, 1], &counts, &ORDER);
        query.leakage = &[1];
        assert!(matches!(infer_populations(&query), Err(MissingSecondary)));

        let query =
            PopulationQuery::new(&[0, 1], &counts, &ORDER)
            .with_shelved(&counts, &[2]);
        assert!(matches!(infer_populations(&query), Err(UnknownQubit(2))));

        let zeros: nd::Array2<f64> = nd::Array2::zeros((1, 4));
        assert!(matches!(
            infer_populations(&PopulationQuery::new(&[0, 1], &zeros, &ORDER)),
            Err(ZeroTotal(_)),
        ));
    }

    #[test]
    fn scaled_fractions() {
        let pops =
            infer_populations_scaled(
                &[0, 1], &[0.1, 0.4], Some(&[0.0, 0.7]), &[1]).unwrap();
        assert!((pops.g(0) - 0.9).abs() < 1e-12);
        assert!((pops.e(0) - 0.1).abs() < 1e-12);
        assert!((pops.g(1) - 0.6).abs() < 1e-12);
        assert!((pops.e(1) - 0.3).abs() < 1e-12);
        assert!((pops.f(1) - 0.1).abs() < 1e-12);
        assert!(infer_populations_scaled(&[0, 1], &[0.1], None, &[]).is_err());
    }

    #[test]
    fn two_readout_noiseless() {
        let order = ["gg", "ge", "eg", "ee", "gf", "ef"];
        // bins 0..4 read g/e (f reads as e), bins 4..8 read g/f (e reads as g)
        let mut conf: nd::Array2<f64> = nd::Array2::zeros((6, 8));
        let hits: [(usize, usize); 6] =
            [(0, 4), (1, 4), (2, 6), (3, 6), (1, 5), (3, 7)];
        hits.iter().enumerate()
            .for_each(|(k, (a, b))| {
                conf[[k, *a]] = 1.0;
                conf[[k, *b]] = 1.0;
            });
        // 50% gg, 30% ge, 20% gf over 1000 shots of each readout
        let raw: nd::Array1<f64> =
            nd::array![500.0, 500.0, 0.0, 0.0, 800.0, 200.0, 0.0, 0.0];
        let pops =
            infer_populations_two_readout(&[0, 1], &raw, &order, &conf, true)
            .unwrap();
        assert!((pops.g(0) - 1.0).abs() < 1e-6);
        assert!((pops.g(1) - 0.5).abs() < 1e-6);
        assert!((pops.e(1) - 0.3).abs() < 1e-6);
        assert!((pops.f(1) - 0.2).abs() < 1e-6);
    }
}
