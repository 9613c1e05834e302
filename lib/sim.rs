//! A seeded, noisy stand-in for real control hardware.
//!
//! Each qubit is tracked as one of the six cardinal points of its Bloch sphere
//! or as leaked into the f level. Since every Clifford permutes the cardinal
//! points, this is exact for noiseless sequences; noise is modeled by replacing
//! the direction with a uniformly random one (depolarization) or by moving the
//! qubit to f (leakage) after each gate, and by flipping reported bits
//! (readout error). The shelved readout has an extra one-sided error, where a
//! `true` outcome on the shelved qubit is reported as `false`.

use rand::{ rngs::StdRng, Rng, SeedableRng };
use rustc_hash::FxHashMap as HashMap;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use tracing::trace;
use crate::{
    ErrorKind,
    clifford::{ C1, MX, MY, MZ, PX, PY, PZ },
    experiment::{ PulseSequencer, Readout, Shots },
};

#[derive(Debug, Error)]
pub enum SimError {
    /// Returned when a preparation label contains a character other than
    /// `'g'`, `'e'`, or `'f'`.
    #[error("unknown level {0:?} in preparation label")]
    BadLevel(char),

    /// Returned when a preparation label does not have one character per
    /// qubit.
    #[error("preparation label {label:?} does not match {qubits} qubits")]
    LabelLength { label: String, qubits: usize },

    /// Returned when a gate or measurement targets a qubit that was not
    /// prepared.
    #[error("qubit {0} was not prepared")]
    Unprepared(usize),

    /// Returned when a noise probability lies outside `[0, 1]`.
    #[error("probability {name} = {value} is outside [0, 1]")]
    BadProbability { name: &'static str, value: f64 },
}
use SimError::*;
pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Return the broad category of the error.
    pub fn kind(&self) -> ErrorKind { ErrorKind::InvalidArgument }
}

/// Noise parameters of a [`SimulatedDevice`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Probability that a gate leaves its qubit in a random direction.
    pub depolarizing: f64,
    /// Probability that a gate leaks its qubit to f.
    pub leakage: f64,
    /// Probability that a reported bit is flipped.
    pub readout_error: f64,
    /// Probability that a `true` outcome on a shelved qubit is reported as
    /// `false`.
    pub shelved_readout_error: f64,
    /// Random seed.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            depolarizing: 0.005,
            leakage: 0.0005,
            readout_error: 0.02,
            shelved_readout_error: 0.05,
            seed: 10546,
        }
    }
}

impl SimConfig {
    /// A configuration with all noise turned off.
    pub fn noiseless(seed: u64) -> Self {
        Self {
            depolarizing: 0.0,
            leakage: 0.0,
            readout_error: 0.0,
            shelved_readout_error: 0.0,
            seed,
        }
    }

    /// Check that every probability lies in `[0, 1]`.
    pub fn validate(&self) -> SimResult<()> {
        [
            ("depolarizing", self.depolarizing),
            ("leakage", self.leakage),
            ("readout_error", self.readout_error),
            ("shelved_readout_error", self.shelved_readout_error),
        ]
        .into_iter()
        .find(|(_, p)| !(0.0..=1.0).contains(p))
        .map_or(Ok(()), |(name, value)| Err(BadProbability { name, value }))
    }
}

/// State of a single simulated qubit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    /// Within the qubit subspace, at one of the six cardinal directions.
    Dir(usize),
    /// Leaked to f.
    Leaked,
}

impl Level {
    fn from_char(c: char) -> SimResult<Self> {
        match c {
            'g' => Ok(Self::Dir(PZ)),
            'e' => Ok(Self::Dir(MZ)),
            'f' => Ok(Self::Leaked),
            _ => Err(BadLevel(c)),
        }
    }
}

/// A simulated device implementing [`PulseSequencer`].
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    config: SimConfig,
    rng: StdRng,
    prepared: HashMap<usize, Level>,
    program: Vec<(C1, usize)>,
}

impl SimulatedDevice {
    /// Create a new device.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            prepared: HashMap::default(),
            program: Vec::new(),
        })
    }

    /// Return the noise parameters.
    pub fn config(&self) -> &SimConfig { &self.config }

    /// Return the number of queued gates.
    pub fn program_len(&self) -> usize { self.program.len() }

    fn play(&mut self, state: &mut HashMap<usize, Level>) {
        let SimConfig { depolarizing, leakage, .. } = self.config;
        for (gate, q) in self.program.iter() {
            let Some(level) = state.get_mut(q) else { continue };
            if let Level::Dir(dir) = level {
                *dir =
                    gate.playback(false).iter()
                    .fold(*dir, |d, pulse| pulse.action().apply(d));
                if self.rng.gen::<f64>() < depolarizing {
                    *dir = self.rng.gen_range(0..6);
                }
            }
            if self.rng.gen::<f64>() < leakage { *level = Level::Leaked; }
        }
    }

    fn read(&mut self, level: Level, shelved: bool) -> bool {
        let mut bit =
            match (level, shelved) {
                (Level::Leaked, _) => true,
                (Level::Dir(PZ), false) | (Level::Dir(MZ), true) => false,
                (Level::Dir(MZ), false) | (Level::Dir(PZ), true) => true,
                (Level::Dir(PX | PY | MX | MY), _) => self.rng.gen::<bool>(),
                (Level::Dir(_), _) => false,
            };
        if shelved && bit
            && self.rng.gen::<f64>() < self.config.shelved_readout_error
        {
            bit = false;
        }
        if self.rng.gen::<f64>() < self.config.readout_error { !bit } else { bit }
    }
}

impl PulseSequencer for SimulatedDevice {
    type Error = SimError;

    fn prepare(&mut self, qubits: &[usize], label: &str) -> SimResult<()> {
        if label.chars().count() != qubits.len() {
            return Err(LabelLength {
                label: label.to_string(),
                qubits: qubits.len(),
            });
        }
        self.prepared =
            qubits.iter().copied()
            .zip(label.chars().map(Level::from_char))
            .map(|(q, level)| level.map(|l| (q, l)))
            .collect::<SimResult<_>>()?;
        self.program.clear();
        Ok(())
    }

    fn apply_gate(&mut self, gate: C1, qubit: usize) -> SimResult<()> {
        if !self.prepared.contains_key(&qubit) { return Err(Unprepared(qubit)); }
        self.program.push((gate, qubit));
        Ok(())
    }

    fn measure(&mut self, qubits: &[usize], readout: Readout, reps: usize)
        -> SimResult<Shots>
    {
        if let Some(q) = qubits.iter().find(|q| !self.prepared.contains_key(q)) {
            return Err(Unprepared(*q));
        }
        trace!(gates = self.program.len(), reps, ?readout, "running program");
        let mut shots: Shots = vec![Vec::with_capacity(reps); qubits.len()];
        for _ in 0..reps {
            let mut state = self.prepared.clone();
            self.play(&mut state);
            for (k, q) in qubits.iter().enumerate() {
                let shelved = readout == Readout::Shelved(*q);
                let bit = self.read(state[q], shelved);
                shots[k].push(bit);
            }
        }
        self.program.clear();
        Ok(shots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_reference_states() {
        let mut dev = SimulatedDevice::new(SimConfig::noiseless(0)).unwrap();
        dev.prepare(&[0, 1], "ge").unwrap();
        let shots = dev.measure(&[0, 1], Readout::Standard, 50).unwrap();
        assert!(shots[0].iter().all(|b| !b));
        assert!(shots[1].iter().all(|b| *b));

        dev.prepare(&[0, 1], "gf").unwrap();
        let shots = dev.measure(&[0, 1], Readout::Shelved(1), 50).unwrap();
        assert!(shots[0].iter().all(|b| !b));
        assert!(shots[1].iter().all(|b| *b));

        dev.prepare(&[0, 1], "ge").unwrap();
        let shots = dev.measure(&[0, 1], Readout::Shelved(1), 50).unwrap();
        assert!(shots[1].iter().all(|b| !b));
    }

    #[test]
    fn gates_rotate() {
        let mut dev = SimulatedDevice::new(SimConfig::noiseless(1)).unwrap();
        dev.prepare(&[0], "g").unwrap();
        dev.apply_gate(C1::X, 0).unwrap();
        let shots = dev.measure(&[0], Readout::Standard, 20).unwrap();
        assert!(shots[0].iter().all(|b| *b));
        // the program is cleared by measurement
        assert_eq!(dev.program_len(), 0);

        dev.prepare(&[0], "g").unwrap();
        dev.apply_gate(C1::HalfY, 0).unwrap();
        dev.apply_gate(C1::NegHalfY, 0).unwrap();
        let shots = dev.measure(&[0], Readout::Standard, 20).unwrap();
        assert!(shots[0].iter().all(|b| !b));
    }

    #[test]
    fn rejects_bad_input() {
        let mut dev = SimulatedDevice::new(SimConfig::noiseless(2)).unwrap();
        assert!(matches!(dev.prepare(&[0, 1], "g"), Err(LabelLength { .. })));
        assert!(matches!(dev.prepare(&[0], "x"), Err(BadLevel('x'))));
        dev.prepare(&[0], "g").unwrap();
        assert!(matches!(dev.apply_gate(C1::X, 3), Err(Unprepared(3))));
        let bad = SimConfig { leakage: 1.5, ..SimConfig::default() };
        assert!(matches!(
            SimulatedDevice::new(bad),
            Err(BadProbability { name: "leakage", .. }),
        ));
    }

    #[test]
    fn shelved_error_is_one_sided() {
        let config =
            SimConfig { shelved_readout_error: 1.0, ..SimConfig::noiseless(4) };
        let mut dev = SimulatedDevice::new(config).unwrap();
        // g and f both read as true when shelved, and are pulled down to false
        dev.prepare(&[0, 1], "gf").unwrap();
        let shots = dev.measure(&[0, 1], Readout::Shelved(1), 20).unwrap();
        assert!(shots[1].iter().all(|b| !b));
        // the unshelved qubit and the standard readout are unaffected
        dev.prepare(&[0, 1], "ef").unwrap();
        let shots = dev.measure(&[0, 1], Readout::Shelved(1), 20).unwrap();
        assert!(shots[0].iter().all(|b| *b));
        dev.prepare(&[0, 1], "gf").unwrap();
        let shots = dev.measure(&[0, 1], Readout::Standard, 20).unwrap();
        assert!(shots[1].iter().all(|b| *b));
    }

    #[test]
    fn full_readout_error_flips() {
        let config = SimConfig { readout_error: 1.0, ..SimConfig::noiseless(3) };
        let mut dev = SimulatedDevice::new(config).unwrap();
        dev.prepare(&[0], "g").unwrap();
        let shots = dev.measure(&[0], Readout::Standard, 20).unwrap();
        assert!(shots[0].iter().all(|b| *b));
    }
}
