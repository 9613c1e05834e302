//! Driving single-qubit RB sweeps against a pulse sequencer.
//!
//! The drive qubit receives the RB sequences while a second, passive qubit is
//! measured alongside it, so that every acquisition sorts shots into the four
//! two-qubit bins `gg`, `ge`, `eg`, `ee` on the ordered pair `[passive,
//! drive]`. If a leakage qubit is set, each sequence is also measured with the
//! shelved readout so that the f-population can be recovered later.

use std::fmt;
use ndarray as nd;
use rand::Rng;
use serde::{ Deserialize, Serialize };
use statrs::statistics::{ Data, Median, Statistics };
use thiserror::Error;
use tracing::{ debug, info };
use crate::{
    ErrorKind,
    clifford::{ C1, CliffordError, CliffordGroup },
    population::{
        PopulationQuery,
        Populations,
        QubitPopulation,
        infer_populations,
        infer_populations_two_readout,
    },
    readout::{ ConfusionMatrix, ReadoutError, sort_counts },
    sequence::{ RbSequence, SequenceBank },
};

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("clifford error: {0}")]
    Clifford(#[from] CliffordError),

    #[error("readout correction error: {0}")]
    ReadoutCorrection(#[from] ReadoutError),

    /// Returned when the pulse sequencer reports a failure.
    #[error("sequencer error: {0}")]
    Sequencer(String),

    /// Returned when qubit roles are inconsistent.
    #[error("invalid qubit roles: {0}")]
    InvalidRoles(String),

    /// Returned when a sweep parameter is out of range.
    #[error("invalid sweep: {0}")]
    InvalidSweep(String),

    /// Returned when a sweep with a leakage qubit is analyzed without a
    /// shelved-readout calibration.
    #[error("sweep has shelved-readout counts but no shelved-readout calibration")]
    MissingShelvedCalibration,

    /// Returned when a sequence bank was made for a different interleaved gate
    /// than the sweep requests.
    #[error("sequence bank interleaves {bank:?} but the sweep interleaves {sweep:?}")]
    BankMismatch { bank: Option<C1>, sweep: Option<C1> },
}
use ExperimentError::*;
pub type ExperimentResult<T> = Result<T, ExperimentError>;

impl ExperimentError {
    /// Return the broad category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Clifford(err) => err.kind(),
            ReadoutCorrection(err) => err.kind(),
            _ => ErrorKind::InvalidArgument,
        }
    }
}

/// Labels of the four two-qubit reference states on `[passive, drive]`, in
/// calibration order.
pub const CALIB_ORDER: [&str; 4] = ["gg", "ge", "eg", "ee"];

/// Readout mode for a measurement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Readout {
    /// Ordinary g/e discrimination; e and f are indistinguishable.
    Standard,
    /// Apply a g↔e π pulse on the given qubit before an ordinary readout, so
    /// that its e-population reads as g and its f-population reads as e.
    Shelved(usize),
}

/// Per-shot thresholded outcomes, one array per measured qubit in the order
/// requested. `true` means "not g".
pub type Shots = Vec<Vec<bool>>;

/// Interface to a device that can play single-qubit Cliffords and measure.
///
/// A program is built by [`prepare`][Self::prepare] followed by any number of
/// [`apply_gate`][Self::apply_gate] calls, and is run by
/// [`measure`][Self::measure], which also clears it.
pub trait PulseSequencer {
    type Error: fmt::Display;

    /// Start a new program from a reference basis state, where the *i*-th
    /// character of `label` (`'g'`, `'e'`, or `'f'`) gives the state of
    /// `qubits[i]`.
    fn prepare(&mut self, qubits: &[usize], label: &str)
        -> Result<(), Self::Error>;

    /// Queue a single Clifford on a qubit.
    fn apply_gate(&mut self, gate: C1, qubit: usize)
        -> Result<(), Self::Error>;

    /// Run the queued program `reps` times and return the per-shot outcomes
    /// for each of `qubits`.
    fn measure(&mut self, qubits: &[usize], readout: Readout, reps: usize)
        -> Result<Shots, Self::Error>;
}

fn seq_err<E: fmt::Display>(err: E) -> ExperimentError {
    Sequencer(err.to_string())
}

/// Assignment of physical qubits to their roles in an experiment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QubitRoles {
    /// Qubit receiving the RB sequences.
    pub drive: usize,
    /// Qubit measured alongside the drive qubit.
    pub passive: usize,
    /// Qubit whose f-population is resolved with the shelved readout.
    pub leakage: Option<usize>,
}

impl Default for QubitRoles {
    fn default() -> Self { Self { drive: 1, passive: 0, leakage: None } }
}

impl QubitRoles {
    /// Check that the drive and passive qubits differ and that the leakage
    /// qubit, if any, is one of them.
    pub fn validate(&self) -> ExperimentResult<()> {
        if self.drive == self.passive {
            return Err(InvalidRoles(
                format!("drive and passive are both qubit {}", self.drive)));
        }
        if let Some(q) = self.leakage {
            if q != self.drive && q != self.passive {
                return Err(InvalidRoles(
                    format!("leakage qubit {} is not measured", q)));
            }
        }
        Ok(())
    }

    /// Return the measured qubits in tomography order, `[passive, drive]`.
    pub fn qubits(&self) -> [usize; 2] { [self.passive, self.drive] }
}

/// Depth grid and averaging parameters of an RB sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbSweep {
    /// First depth.
    pub start: usize,
    /// Depth increment.
    pub step: usize,
    /// Number of depths.
    pub expts: usize,
    /// Number of random sequences per depth.
    pub variations: usize,
    /// Number of averaging loops over the whole grid.
    pub loops: usize,
    /// Shots per sequence per loop.
    pub reps: usize,
    /// Shots per reference state during calibration.
    pub calib_reps: usize,
    /// Name of a Clifford to interleave, if any.
    pub interleave: Option<String>,
}

impl Default for RbSweep {
    fn default() -> Self {
        Self {
            start: 1,
            step: 20,
            expts: 8,
            variations: 10,
            loops: 1,
            reps: 1000,
            calib_reps: 10000,
            interleave: None,
        }
    }
}

impl RbSweep {
    /// Return all depths, `start + step * k` for `k` in `0..expts`.
    pub fn depths(&self) -> Vec<usize> {
        (0..self.expts).map(|k| self.start + self.step * k).collect()
    }

    /// Parse the interleaved gate name, if any.
    pub fn interleave_gate(&self) -> ExperimentResult<Option<C1>> {
        self.interleave.as_deref()
            .map(|name| name.parse::<C1>())
            .transpose()
            .map_err(Clifford)
    }

    /// Check that every count is nonzero and the interleaved gate is known.
    pub fn validate(&self) -> ExperimentResult<()> {
        let counts = [
            ("expts", self.expts),
            ("variations", self.variations),
            ("loops", self.loops),
            ("reps", self.reps),
            ("calib_reps", self.calib_reps),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, n)| *n == 0) {
            return Err(InvalidSweep(format!("{} must be nonzero", name)));
        }
        self.interleave_gate()?;
        Ok(())
    }
}

fn two_qubit_counts(shots: &Shots) -> ExperimentResult<[usize; 4]> {
    match shots.as_slice() {
        [a, b] => Ok(sort_counts(a, b)?),
        _ => Err(Sequencer(
            format!("expected outcomes for 2 qubits, got {}", shots.len()))),
    }
}

/// Return the reference states prepared during calibration.
///
/// This is [`CALIB_ORDER`], followed, if a leakage qubit is set, by the states
/// of `CALIB_ORDER` where that qubit is in e, with e replaced by f (`"gf"`,
/// `"ef"` when the drive qubit leaks).
pub fn calibration_order(roles: &QubitRoles) -> Vec<String> {
    let mut order: Vec<String> =
        CALIB_ORDER.iter().map(|l| l.to_string()).collect();
    let qubits = roles.qubits();
    let Some(pos) =
        roles.leakage.and_then(|q| qubits.iter().position(|&p| p == q))
        else { return order; };
    let leaked: Vec<String> =
        CALIB_ORDER.iter()
        .filter(|l| l.chars().nth(pos) == Some('e'))
        .map(|l| {
            l.chars().enumerate()
                .map(|(k, c)| if k == pos { 'f' } else { c })
                .collect()
        })
        .collect();
    order.extend(leaked);
    order
}

/// Calibration matrices for the readouts used by a sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    standard: ConfusionMatrix,
    shelved: Option<ConfusionMatrix>,
}

impl Calibration {
    /// Create a new calibration from its parts.
    ///
    /// Fails if the shelved-readout matrix has different labels.
    pub fn new(standard: ConfusionMatrix, shelved: Option<ConfusionMatrix>)
        -> ExperimentResult<Self>
    {
        if let Some(sh) = shelved.as_ref() {
            if sh.labels() != standard.labels() {
                return Err(ReadoutCorrection(ReadoutError::LabelMismatch));
            }
        }
        Ok(Self { standard, shelved })
    }

    /// Get a reference to the standard-readout matrix.
    pub fn standard(&self) -> &ConfusionMatrix { &self.standard }

    /// Get a reference to the shelved-readout matrix, if any.
    pub fn shelved(&self) -> Option<&ConfusionMatrix> { self.shelved.as_ref() }

    /// Join the standard and shelved bins into a single calibration, with the
    /// standard bins first.
    pub fn combined(&self) -> ExperimentResult<Option<ConfusionMatrix>> {
        self.shelved.as_ref()
            .map(|sh| self.standard.concat_bins(sh))
            .transpose()
            .map_err(ReadoutCorrection)
    }
}

// Prepare every state of `order` and histogram it under `readout`.
fn measure_references<S>(
    sequencer: &mut S,
    qubits: &[usize],
    order: &[String],
    readout: Readout,
    reps: usize,
) -> ExperimentResult<ConfusionMatrix>
where S: PulseSequencer + ?Sized
{
    let rows: Vec<(String, Vec<f64>)> =
        order.iter()
        .map(|label| -> ExperimentResult<(String, Vec<f64>)> {
            sequencer.prepare(qubits, label).map_err(seq_err)?;
            let shots =
                sequencer.measure(qubits, readout, reps).map_err(seq_err)?;
            let counts = two_qubit_counts(&shots)?;
            debug!(label = label.as_str(), ?readout, ?counts, "calibration");
            Ok((label.clone(), counts.iter().map(|&n| n as f64).collect()))
        })
        .collect::<ExperimentResult<_>>()?;
    Ok(ConfusionMatrix::from_counts(rows)?)
}

/// Measure each reference state of [`calibration_order`] on `[passive, drive]`
/// and build the resulting calibration matrices.
///
/// If a leakage qubit is set, every state is measured again with the shelved
/// readout on that qubit.
pub fn calibrate<S>(sequencer: &mut S, roles: &QubitRoles, reps: usize)
    -> ExperimentResult<Calibration>
where S: PulseSequencer + ?Sized
{
    roles.validate()?;
    let qubits = roles.qubits();
    let order = calibration_order(roles);
    let standard =
        measure_references(sequencer, &qubits, &order, Readout::Standard, reps)?;
    let shelved =
        roles.leakage
        .map(|q| {
            measure_references(
                sequencer, &qubits, &order, Readout::Shelved(q), reps)
        })
        .transpose()?;
    Calibration::new(standard, shelved)
}

// Queue a full sequence, recovery gate included, from the ground state.
fn load_sequence<S>(sequencer: &mut S, seq: &RbSequence, roles: &QubitRoles)
    -> ExperimentResult<()>
where S: PulseSequencer + ?Sized
{
    sequencer.prepare(&roles.qubits(), "gg").map_err(seq_err)?;
    seq.iter()
        .try_for_each(|gate| sequencer.apply_gate(gate, roles.drive))
        .map_err(seq_err)
}

/// Averaged raw counts of an RB sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct RbRecord {
    depths: Vec<usize>,
    roles: QubitRoles,
    interleave: Option<C1>,
    // (depth, variation, bin)
    counts: nd::Array3<f64>,
    // Same, for the shelved readout.
    shelved: Option<nd::Array3<f64>>,
}

/// Run an RB sweep, averaging the counts of each (depth, variation) sequence
/// over `sweep.loops` loops.
///
/// Sequences are drawn through `bank`, so every loop after the first replays
/// exactly the sequences drawn on the first. A bank reused across calls
/// replays them again if the depth grid is unchanged; a different grid is an
/// error until the bank is cleared.
pub fn run_rb<S, R>(
    sequencer: &mut S,
    sweep: &RbSweep,
    roles: &QubitRoles,
    group: &CliffordGroup,
    bank: &mut SequenceBank,
    rng: &mut R,
) -> ExperimentResult<RbRecord>
where
    S: PulseSequencer + ?Sized,
    R: Rng + ?Sized,
{
    roles.validate()?;
    sweep.validate()?;
    let interleave = sweep.interleave_gate()?;
    if bank.interleave() != interleave {
        return Err(BankMismatch { bank: bank.interleave(), sweep: interleave });
    }
    let depths = sweep.depths();
    let qubits = roles.qubits();
    let shape = (depths.len(), sweep.variations, CALIB_ORDER.len());
    let mut counts: nd::Array3<f64> = nd::Array3::zeros(shape);
    let mut shelved: Option<nd::Array3<f64>> =
        roles.leakage.map(|_| nd::Array3::zeros(shape));

    for lp in 0..sweep.loops {
        info!(loop_ = lp, loops = sweep.loops, "running RB sweep");
        for (i, &depth) in depths.iter().enumerate() {
            debug!(depth, "measuring depth");
            for var in 0..sweep.variations {
                let seq = bank.get_or_generate(group, i, var, depth, rng)?;

                load_sequence(sequencer, seq, roles)?;
                let shots =
                    sequencer.measure(&qubits, Readout::Standard, sweep.reps)
                    .map_err(seq_err)?;
                let bins = two_qubit_counts(&shots)?;
                counts.slice_mut(nd::s![i, var, ..]).iter_mut()
                    .zip(bins)
                    .for_each(|(acc, n)| { *acc += n as f64; });

                if let (Some(q), Some(acc2)) = (roles.leakage, shelved.as_mut()) {
                    load_sequence(sequencer, seq, roles)?;
                    let shots =
                        sequencer.measure(&qubits, Readout::Shelved(q), sweep.reps)
                        .map_err(seq_err)?;
                    let bins = two_qubit_counts(&shots)?;
                    acc2.slice_mut(nd::s![i, var, ..]).iter_mut()
                        .zip(bins)
                        .for_each(|(acc, n)| { *acc += n as f64; });
                }
            }
        }
    }

    let norm = sweep.loops as f64;
    counts.mapv_inplace(|n| n / norm);
    if let Some(acc2) = shelved.as_mut() { acc2.mapv_inplace(|n| n / norm); }
    Ok(RbRecord { depths, roles: *roles, interleave, counts, shelved })
}

/// Summary statistics of the drive qubit's populations at a single depth.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DepthSummary {
    pub depth: usize,
    /// Mean ground-state population over variations.
    pub mean_g: f64,
    /// Median ground-state population over variations.
    pub median_g: f64,
    /// Population standard deviation of the ground-state population over
    /// variations.
    pub std_g: f64,
    /// Mean leaked population over variations.
    pub mean_f: f64,
}

/// Drive-qubit populations for every sequence of an RB sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct RbAnalysis {
    depths: Vec<usize>,
    // [depth][variation]
    populations: Vec<Vec<QubitPopulation>>,
    summary: Vec<DepthSummary>,
}

impl RbAnalysis {
    /// Get a reference to the sweep depths.
    pub fn depths(&self) -> &Vec<usize> { &self.depths }

    /// Get the drive-qubit populations for a (depth index, variation) pair.
    pub fn population(&self, depth_idx: usize, var: usize)
        -> Option<&QubitPopulation>
    {
        self.populations.get(depth_idx).and_then(|row| row.get(var))
    }

    /// Get a reference to the per-depth summaries, in depth order.
    pub fn summary(&self) -> &Vec<DepthSummary> { &self.summary }
}

impl RbRecord {
    /// Get a reference to the sweep depths.
    pub fn depths(&self) -> &Vec<usize> { &self.depths }

    /// Return the qubit roles of the sweep.
    pub fn roles(&self) -> QubitRoles { self.roles }

    /// Return the interleaved gate, if any.
    pub fn interleave(&self) -> Option<C1> { self.interleave }

    /// Get a reference to the loop-averaged standard-readout counts, indexed
    /// by (depth, variation, bin).
    pub fn counts(&self) -> &nd::Array3<f64> { &self.counts }

    /// Get a reference to the loop-averaged shelved-readout counts, if any.
    pub fn shelved(&self) -> Option<&nd::Array3<f64>> { self.shelved.as_ref() }

    /// Infer the drive qubit's populations for every sequence and summarize
    /// them per depth.
    ///
    /// Without shelved counts, each sequence is corrected with the standard
    /// calibration alone. With them, the standard and shelved bins of each
    /// sequence are joined and corrected at once with
    /// [`Calibration::combined`], whose rows include the leaked reference
    /// states.
    ///
    /// Fails if the sweep has shelved counts but `calibration` has no
    /// shelved-readout matrix.
    pub fn analyze(&self, calibration: &Calibration, fix_negatives: bool)
        -> ExperimentResult<RbAnalysis>
    {
        let combined: Option<ConfusionMatrix> =
            match self.shelved.as_ref() {
                Some(_) => Some(
                    calibration.combined()?.ok_or(MissingShelvedCalibration)?),
                None => None,
            };
        let confusion = combined.as_ref().unwrap_or(calibration.standard());
        let qubits = self.roles.qubits();
        let order: Vec<&str> =
            confusion.labels().iter().map(String::as_str).collect();
        let (ndepths, nvars, _) = self.counts.dim();

        let populations: Vec<Vec<QubitPopulation>> =
            (0..ndepths)
            .map(|i| {
                (0..nvars)
                    .map(|var| self.analyze_one(
                        i, var, &qubits, &order, confusion, fix_negatives))
                    .collect::<ExperimentResult<Vec<_>>>()
            })
            .collect::<ExperimentResult<_>>()?;

        let summary: Vec<DepthSummary> =
            self.depths.iter().zip(&populations)
            .map(|(&depth, pops)| {
                let g: Vec<f64> = pops.iter().map(|p| p.g).collect();
                let mean_g = g.iter().mean();
                let std_g = g.iter().population_std_dev();
                let mean_f = pops.iter().map(|p| p.f).mean();
                let median_g = Data::new(g).median();
                DepthSummary { depth, mean_g, median_g, std_g, mean_f }
            })
            .collect();
        Ok(RbAnalysis { depths: self.depths.clone(), populations, summary })
    }

    fn analyze_one(
        &self,
        depth_idx: usize,
        var: usize,
        qubits: &[usize],
        order: &[&str],
        confusion: &ConfusionMatrix,
        fix_negatives: bool,
    ) -> ExperimentResult<QubitPopulation>
    {
        let counts = self.counts.slice(nd::s![depth_idx, var, ..]);
        let pops: Populations =
            match self.shelved.as_ref() {
                Some(shelved) => {
                    let counts2 = shelved.slice(nd::s![depth_idx, var, ..]);
                    let raw_total: nd::Array1<f64> =
                        nd::concatenate(nd::Axis(0), &[counts, counts2])
                        .map_err(|_| ReadoutCorrection(ReadoutError::ShapeMismatch {
                            what: "shelved counts",
                            expected: counts.len(),
                            found: counts2.len(),
                        }))?;
                    infer_populations_two_readout(
                        qubits, &raw_total, order, confusion.matrix(),
                        fix_negatives,
                    )?
                },
                None => {
                    let counts: nd::Array2<f64> =
                        counts.insert_axis(nd::Axis(0)).to_owned();
                    let query =
                        PopulationQuery::new(qubits, &counts, order)
                        .with_confusion(confusion.matrix())
                        .fix_negatives(fix_negatives);
                    infer_populations(&query)?
                },
            };
        pops.get(self.roles.drive).copied()
            .ok_or(ReadoutCorrection(ReadoutError::UnknownQubit(self.roles.drive)))
    }
}
