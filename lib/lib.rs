//! Tools for single-qubit Clifford randomized benchmarking (RB) of a
//! superconducting qutrit, with readout-error mitigation via calibration
//! matrices.
//!
//! The two core pieces are the single-qubit Clifford group and RB sequence
//! generation ([`clifford`], [`sequence`]), and readout correction plus
//! ground/excited/leaked population inference ([`readout`], [`population`]).
//! [`experiment`] ties them together against any [`experiment::PulseSequencer`],
//! of which [`sim`] provides a seeded noisy simulation.

pub mod error;
pub use error::ErrorKind;

pub mod clifford;
pub mod sequence;

pub mod readout;
pub mod population;

pub mod experiment;
pub mod sim;
pub mod config;
