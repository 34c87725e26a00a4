//! Nearest-neighbor duplex thermodynamics and equilibrium binding
//!
//! Enthalpy and entropy follow the SantaLucia (1998) unified parameters,
//! extended with single-mismatch and gap stacks. Enthalpies are in cal/mol,
//! entropies in cal/(mol·K), temperatures in °C.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::error::{PcrError, Result};
use super::iupac::GAP;

/// Gas constant in cal/(mol·K)
pub const R: f64 = 1.987;
/// 0 °C in Kelvin
pub const T0: f64 = 273.15;
/// Temperature (°C) at which alignments are ranked
pub const REFERENCE_TEMP: f64 = 55.0;

/// Largest exponent allowed when forming an equilibrium constant
const MAX_EXPONENT: f64 = 75.0;

/// Stacks keyed by template dimer followed by primer dimer.
/// Combinations over {A,C,G,T,-} that are absent contribute nothing.
const NN_PARAMS: &[(&[u8; 4], f64, f64)] = &[
    (b"-AAA", 2900.0, 10.4), (b"-ACA", -1600.0, -3.6), (b"-AGA", 4400.0, 14.9), (b"-ATA", -700.0, -0.8),
    (b"-CAC", -4400.0, -13.1), (b"-CCC", -3900.0, -11.2), (b"-CGC", -200.0, -0.1), (b"-CTC", -2100.0, -3.9),
    (b"-GAG", -5200.0, -15.0), (b"-GCG", -3200.0, -10.4), (b"-GGG", -2600.0, -7.4), (b"-GTG", -5900.0, -16.5),
    (b"-TAT", -3800.0, -12.6), (b"-TCT", -4100.0, -13.1), (b"-TGT", 4700.0, 14.2), (b"-TTT", -500.0, -1.1),
    (b"A-AA", -200.0, -0.5), (b"A-AC", -4200.0, -15.0), (b"A-AG", -4100.0, -13.0), (b"A-AT", -2900.0, -7.6),
    (b"AA-A", 200.0, 2.3), (b"AAA-", -500.0, -1.1), (b"AAAA", -7900.0, -22.2), (b"AAAC", -600.0, -2.3),
    (b"AAAG", 2300.0, 4.6), (b"AAAT", 1200.0, 1.7), (b"AACA", 3000.0, 7.4), (b"AAGA", 7600.0, 20.2),
    (b"AATA", 4700.0, 12.9), (b"AC-C", -6300.0, -17.1), (b"ACA-", 4700.0, 14.2), (b"ACAA", 700.0, 0.2),
    (b"ACAC", -8400.0, -22.4), (b"ACAG", 0.0, -4.4), (b"ACAT", 5300.0, 14.6), (b"ACCC", 500.0, 3.2),
    (b"ACGC", -700.0, -3.8), (b"ACTC", -2900.0, -9.8), (b"AG-G", -3700.0, -10.0), (b"AGA-", -4100.0, -13.1),
    (b"AGAA", 1000.0, 0.9), (b"AGAC", -3100.0, -9.5), (b"AGAG", -7800.0, -21.0), (b"AGAT", -700.0, -2.3),
    (b"AGCG", -4000.0, -13.2), (b"AGGG", 600.0, -0.6), (b"AGTG", -900.0, -4.2), (b"AT-T", -2900.0, -7.6),
    (b"ATA-", -3800.0, -12.6), (b"ATAA", -2700.0, -10.8), (b"ATAC", -2500.0, -8.3), (b"ATAG", -1200.0, -6.2),
    (b"ATAT", -7200.0, -20.4), (b"ATCT", -700.0, -2.3), (b"ATGT", 5300.0, 14.6), (b"ATTT", 1200.0, 1.7),
    (b"C-CA", -4900.0, -13.8), (b"C-CC", -3900.0, -10.9), (b"C-CG", -4000.0, -11.9), (b"C-CT", -3700.0, -10.0),
    (b"CA-A", 600.0, 3.3), (b"CAAA", 1000.0, 0.7), (b"CAC-", -5900.0, -16.5), (b"CACA", -8500.0, -22.7),
    (b"CACC", -700.0, -2.3), (b"CACG", 1900.0, 3.7), (b"CACT", -900.0, -4.2), (b"CAGA", 6100.0, 16.4),
    (b"CATA", 3400.0, 8.0), (b"CC-C", -4400.0, -12.6), (b"CCAC", 5200.0, 13.5), (b"CCC-", -2600.0, -7.4),
    (b"CCCA", -800.0, -4.5), (b"CCCC", -8000.0, -19.9), (b"CCCG", -1500.0, -7.2), (b"CCCT", 600.0, -0.6),
    (b"CCGC", 3600.0, 8.9), (b"CCTC", 5200.0, 14.2), (b"CG-G", -4000.0, -11.9), (b"CGAG", -1500.0, -6.1),
    (b"CGC-", -3200.0, -10.4), (b"CGCA", -4100.0, -11.7), (b"CGCC", -4900.0, -15.3), (b"CGCG", -10600.0, -27.2),
    (b"CGCT", -4000.0, -13.2), (b"CGGG", -1500.0, -7.2), (b"CGTG", 1900.0, 3.7), (b"CT-T", -4100.0, -13.0),
    (b"CTAT", -1200.0, -6.2), (b"CTC-", -5200.0, -15.0), (b"CTCA", -5000.0, -15.8), (b"CTCC", -2800.0, -8.0),
    (b"CTCG", -1500.0, -6.1), (b"CTCT", -7800.0, -21.0), (b"CTGT", 0.0, -4.4), (b"G-GA", -4000.0, -10.9),
    (b"G-GC", -5100.0, -14.0), (b"G-GG", -4400.0, -12.6), (b"G-GT", -6300.0, -17.1), (b"GA-A", -1100.0, -1.6),
    (b"GAAA", -1300.0, -5.3), (b"GACA", 1600.0, 3.6), (b"GAG-", -2100.0, -3.9), (b"GAGA", -8200.0, -22.2),
    (b"GAGC", -600.0, -1.0), (b"GAGG", 5200.0, 14.2), (b"GAGT", -2900.0, -9.8), (b"GATA", 700.0, 0.7),
    (b"GC-C", -5100.0, -14.0), (b"GCAC", -4400.0, -12.3), (b"GCCC", -6000.0, -15.8), (b"GCG-", -200.0, -0.1),
    (b"GCGA", 2300.0, 5.4), (b"GCGC", -9800.0, -24.4), (b"GCGG", 3600.0, 8.9), (b"GCGT", -700.0, -3.8),
    (b"GCTC", -600.0, -1.0), (b"GG-G", -3900.0, -10.9), (b"GGAA", 5800.0, 16.3), (b"GGAG", -2800.0, -8.0),
    (b"GGCG", -4900.0, -15.3), (b"GGG-", -3900.0, -11.2), (b"GGGA", 3300.0, 10.4), (b"GGGC", -6000.0, -15.8),
    (b"GGGG", -8000.0, -19.9), (b"GGGT", 500.0, 3.2), (b"GGTG", -700.0, -2.3), (b"GT-T", -4200.0, -15.0),
    (b"GTAC", 4100.0, 9.5), (b"GTAT", -2500.0, -8.3), (b"GTCT", -3100.0, -9.5), (b"GTG-", -4400.0, -13.1),
    (b"GTGA", -2200.0, -8.4), (b"GTGC", -4400.0, -12.3), (b"GTGG", 5200.0, 13.5), (b"GTGT", -8400.0, -22.4),
    (b"GTTT", -600.0, -2.3), (b"T-TA", -6900.0, -20.0), (b"T-TC", -1100.0, -1.6), (b"T-TG", 600.0, 3.3),
    (b"T-TT", 200.0, 2.3), (b"TA-A", -6900.0, -20.0), (b"TAAA", 200.0, -1.5), (b"TAAC", -100.0, -1.7),
    (b"TACA", -100.0, -1.7), (b"TAGA", 1200.0, 0.7), (b"TAT-", -700.0, -0.8), (b"TATA", -7200.0, -21.3),
    (b"TATC", 700.0, 0.7), (b"TATG", 3400.0, 8.0), (b"TATT", 4700.0, 12.9), (b"TC-C", -4000.0, -10.9),
    (b"TCAC", -2200.0, -8.4), (b"TCCC", 3300.0, 10.4), (b"TCGC", 2300.0, 5.4), (b"TCT-", 4400.0, 14.9),
    (b"TCTA", 1200.0, 0.7), (b"TCTC", -8200.0, -22.2), (b"TCTG", 6100.0, 16.4), (b"TCTT", 7600.0, 20.2),
    (b"TG-G", -4900.0, -13.8), (b"TGAG", -5000.0, -15.8), (b"TGCA", -1400.0, -6.2), (b"TGCG", -4100.0, -11.7),
    (b"TGGG", -800.0, -4.5), (b"TGT-", -1600.0, -3.6), (b"TGTA", -100.0, -1.7), (b"TGTC", 1600.0, 3.6),
    (b"TGTG", -8500.0, -22.7), (b"TGTT", 3000.0, 7.4), (b"TT-T", -200.0, -0.5), (b"TTAT", -2700.0, -10.8),
    (b"TTCC", 5800.0, 16.3), (b"TTCT", 1000.0, 0.9), (b"TTGT", 700.0, 0.2), (b"TTT-", 2900.0, 10.4),
    (b"TTTA", 200.0, -1.5), (b"TTTC", -1300.0, -5.3), (b"TTTG", 1000.0, 0.7), (b"TTTT", -7900.0, -22.2),
];

static NN_TABLE: Lazy<HashMap<[u8; 4], Thermo>> = Lazy::new(|| {
    NN_PARAMS
        .iter()
        .map(|&(key, dh, ds)| (*key, Thermo { dh, ds }))
        .collect()
});

/// Enthalpy/entropy pair for a duplex or a stacking step
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Thermo {
    pub dh: f64,
    pub ds: f64,
}

impl Thermo {
    pub fn dg(&self, t_celsius: f64) -> f64 {
        gibbs(self.dh, self.ds, t_celsius)
    }
}

impl std::ops::AddAssign for Thermo {
    fn add_assign(&mut self, other: Self) {
        self.dh += other.dh;
        self.ds += other.ds;
    }
}

/// Terminal initiation for the base closing a duplex end
fn initiation(base: u8) -> Thermo {
    match base {
        b'A' => Thermo { dh: 2300.0, ds: 4.1 },
        b'T' => Thermo { dh: 300.0, ds: 4.1 },
        b'C' | b'G' => Thermo { dh: 100.0, ds: -2.8 },
        other => {
            log::warn!("no initiation parameters for '{}'", other as char);
            Thermo::default()
        }
    }
}

fn is_table_symbol(b: u8) -> bool {
    matches!(b, b'A' | b'C' | b'G' | b'T' | GAP)
}

/// Stacking term for a template dimer over a primer dimer
fn nearest_neighbor(template_pair: &[u8], primer_pair: &[u8]) -> Thermo {
    let key = [template_pair[0], template_pair[1], primer_pair[0], primer_pair[1]];
    if let Some(hs) = NN_TABLE.get(&key) {
        return *hs;
    }
    if !key.iter().all(|&b| is_table_symbol(b)) {
        log::warn!(
            "no nearest-neighbor parameters for {}:{}; using 0",
            String::from_utf8_lossy(template_pair),
            String::from_utf8_lossy(primer_pair)
        );
    }
    Thermo::default()
}

/// Enthalpy and entropy of two equal-length aligned strings.
///
/// Only the span between the first and last matching columns counts;
/// unmatched overhangs contribute nothing.
pub fn aligned_sequence_hs(seq1: &str, seq2: &str) -> Result<Thermo> {
    let a = seq1.as_bytes();
    let b = seq2.as_bytes();
    if a.len() != b.len() {
        return Err(PcrError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut matches = a.iter().zip(b).enumerate().filter(|(_, (x, y))| x == y);
    let first = matches.next().map(|(i, _)| i).ok_or(PcrError::NoMatchingColumn)?;
    let last = matches.last().map(|(i, _)| i).unwrap_or(first);

    let mut total = initiation(a[first]);
    total += initiation(a[last]);

    // the stack closing on `last` is not counted
    for i in first..last.saturating_sub(1) {
        total += nearest_neighbor(&a[i..i + 2], &b[i..i + 2]);
    }
    Ok(total)
}

/// Gibbs free energy ΔG = ΔH − T·ΔS at `t_celsius`
pub fn gibbs(dh: f64, ds: f64, t_celsius: f64) -> f64 {
    dh - (t_celsius + T0) * ds
}

/// Equilibrium fraction of template sites occupied by primer.
///
/// Two-state model assuming primer excess: no depletion feedback.
pub fn fraction_bound(primer_conc: f64, dh: f64, ds: f64, t_celsius: f64) -> f64 {
    if !(primer_conc > 0.0) {
        return 0.0;
    }
    let t = t_celsius + T0;
    let k_eq = (gibbs(dh, ds, t_celsius) / (R * t)).exp();
    let fraction = 1.0 / (k_eq / primer_conc + 1.0);
    if fraction.is_nan() {
        0.0
    } else {
        fraction
    }
}

/// Equilibrium duplex concentration between strands A and B.
///
/// Neither strand is assumed limiting; the result is the root of
/// c² − (A + B + K)·c + A·B = 0 lying in [0, min(A, B)].
pub fn hybridize(conc_a: f64, conc_b: f64, dh: f64, ds: f64, t_celsius: f64) -> f64 {
    let conc_a = conc_a.max(0.0);
    let conc_b = conc_b.max(0.0);
    let limit = conc_a.min(conc_b);
    if limit == 0.0 {
        return 0.0;
    }

    let t = t_celsius + T0;
    let power = (dh / (R * t) - ds / R).min(MAX_EXPONENT);
    let k_eq = power.exp();

    let sum = conc_a + conc_b + k_eq;
    let product = conc_a * conc_b;
    let radical = (sum * sum - 4.0 * product).max(0.0).sqrt();
    // smaller root, written to avoid cancellation when K dominates
    let root = 2.0 * product / (sum + radical);
    if root.is_nan() {
        0.0
    } else {
        root.clamp(0.0, limit)
    }
}

/// Polymerase penalty for mismatches at the 3′ end of a primer.
///
/// Both strings run 5′→3′ along the primer; mismatches at the last, second
/// to last and third to last columns multiply by 0.1, 0.2 and 0.5.
pub fn priming_coefficient(template_aligned: &str, primer_aligned: &str) -> f64 {
    const PENALTIES: [f64; 3] = [0.1, 0.2, 0.5];
    template_aligned
        .bytes()
        .rev()
        .zip(primer_aligned.bytes().rev())
        .zip(PENALTIES)
        .filter(|((t, p), _)| t != p)
        .map(|(_, penalty)| penalty)
        .product()
}

/// Cation concentrations in mM
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaltConditions {
    pub monovalent_mm: f64,
    pub divalent_mm: f64,
}

impl Default for SaltConditions {
    fn default() -> Self {
        Self {
            monovalent_mm: 50.0,
            divalent_mm: 1.5,
        }
    }
}

/// Entropy correction for salt on an `n`-base duplex
pub fn adjust_entropy_for_salt(n: usize, salt: &SaltConditions) -> f64 {
    let equivalent = salt.monovalent_mm * 1e-3 + 3.795 * (salt.divalent_mm * 1e-3).sqrt();
    0.368 * (n.saturating_sub(1)) as f64 * equivalent.ln()
}

/// Fraction of sites bound with salt-corrected entropy
pub fn binding_coefficient(
    seq1: &str,
    seq2: &str,
    primer_conc: f64,
    t_celsius: f64,
    salt: &SaltConditions,
) -> Result<f64> {
    let hs = aligned_sequence_hs(seq1, seq2)?;
    let ds = hs.ds + adjust_entropy_for_salt(seq1.len(), salt);
    Ok(fraction_bound(primer_conc, hs.dh, ds, t_celsius))
}
