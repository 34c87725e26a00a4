//! Shared value types and simulation parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::PcrError;

/// Template strand a primer is searched against.
///
/// `Top` aligns the primer as given; `Bottom` aligns its reverse complement,
/// so coordinates always refer to the top strand of the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strand {
    Top,
    Bottom,
}

impl Strand {
    pub const BOTH: [Strand; 2] = [Strand::Top, Strand::Bottom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strand {
    type Err = PcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            other => Err(PcrError::InvalidStrand(other.to_string())),
        }
    }
}

/// Scores used by the primer/template dynamic programming fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub match_score: i32,
    pub mismatch_score: i32,
    /// Applied to both template gaps and primer gaps
    pub gap_penalty: i32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            match_score: 2,
            mismatch_score: -1,
            gap_penalty: -3,
        }
    }
}

/// Reaction program and model constants for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcrParams {
    pub cycles: usize,
    pub denaturation_temp: f64,
    pub annealing_temp: f64,
    /// Score tolerance below the perfect primer score
    pub fudge: u32,
    /// Binding sites kept per (template, primer, strand) query
    pub max_binding_sites: usize,
    pub max_amplicon_length: usize,
    pub polymerase_survival_per_cycle: f64,
    /// Extension penalty per amplicon base
    pub nonprocessivity_per_bp: f64,
    pub fluorescence_coefficient: f64,
    pub fluorescence_background: f64,
    pub fluorescence_noise: f64,
    /// Seed for the fluorescence baseline; `None` draws from entropy
    pub noise_seed: Option<u64>,
    pub melt_start: f64,
    pub melt_end: f64,
    pub melt_step: f64,
    /// Upper bound on co-optimal paths enumerated from one start cell
    pub max_alternatives_per_cell: usize,
}

impl Default for PcrParams {
    fn default() -> Self {
        Self {
            cycles: 30,
            denaturation_temp: 95.0,
            annealing_temp: 55.0,
            fudge: 10,
            max_binding_sites: 20,
            max_amplicon_length: 2000,
            polymerase_survival_per_cycle: 0.94,
            nonprocessivity_per_bp: 1e-4,
            fluorescence_coefficient: 1e-3,
            fluorescence_background: 2e-11,
            fluorescence_noise: 4e-12,
            noise_seed: Some(0),
            melt_start: 45.0,
            melt_end: 95.0,
            melt_step: 0.5,
            max_alternatives_per_cell: 256,
        }
    }
}

/// Progress update sent after each completed cycle
#[derive(Debug, Clone)]
pub struct CycleProgress {
    pub cycle: usize,
    pub total_cycles: usize,
    pub polymerase_activity: f64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strand_parse() {
        assert_eq!("top".parse::<Strand>().unwrap(), Strand::Top);
        assert_eq!("bottom".parse::<Strand>().unwrap(), Strand::Bottom);
        assert!(matches!(
            "Top".parse::<Strand>(),
            Err(PcrError::InvalidStrand(ref s)) if s == "Top"
        ));
    }

    #[test]
    fn test_params_from_partial_json() {
        let params: PcrParams = serde_json::from_str(r#"{"cycles": 12, "fudge": 0}"#).unwrap();
        assert_eq!(params.cycles, 12);
        assert_eq!(params.fudge, 0);
        assert_eq!(params.max_binding_sites, 20);
        assert_eq!(params.max_amplicon_length, 2000);
    }

    #[test]
    fn test_strand_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Strand::Bottom).unwrap(), "\"bottom\"");
    }
}
