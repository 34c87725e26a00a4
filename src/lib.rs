//! PCR Simulator - In-Silico Amplification Tool
//!
//! Predicts primer binding sites on template DNA, pairs them into potential
//! amplicons and follows strand concentrations through thermal cycles.

pub mod pcr;

pub use pcr::*;
