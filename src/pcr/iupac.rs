//! IUPAC nucleotide codes and sequence utilities

use std::collections::HashSet;

use bio::alphabets::dna;

use super::error::{PcrError, Result};

/// Gap symbol used in aligned strings
pub const GAP: u8 = b'-';

/// Check if a character is a standard DNA base
pub fn is_standard_base(c: char) -> bool {
    matches!(c, 'A' | 'C' | 'G' | 'T')
}

/// Check if a character is an ambiguous base
pub fn is_ambiguous_base(c: char) -> bool {
    matches!(c, 'R' | 'Y' | 'S' | 'W' | 'K' | 'M' | 'B' | 'D' | 'H' | 'V' | 'N' | 'X')
}

/// Check if a character is a valid DNA character (including ambiguous)
pub fn is_valid_dna(c: char) -> bool {
    is_standard_base(c) || is_ambiguous_base(c)
}

/// Uppercase `seq` and reject anything outside the IUPAC alphabet.
///
/// `kind` names the sequence in error messages ("primer", "template").
pub fn normalize_sequence(seq: &str, kind: &'static str) -> Result<String> {
    if seq.is_empty() {
        return Err(PcrError::EmptySequence(kind));
    }
    let upper = seq.to_ascii_uppercase();
    if let Some((i, c)) = upper.chars().enumerate().find(|&(_, c)| !is_valid_dna(c)) {
        return Err(PcrError::InvalidSequence(format!(
            "{} contains invalid character '{}' at position {}",
            kind,
            c,
            i + 1
        )));
    }
    Ok(upper)
}

/// Reverse complement of an uppercased sequence.
///
/// Ambiguity codes map to their complements (R/Y, K/M, B/V, D/H; S, W, N, X
/// are self-complementary). Other symbols pass through unchanged.
pub fn reverse_complement(seq: &str) -> String {
    let upper = seq.to_ascii_uppercase();
    String::from_utf8_lossy(&dna::revcomp(upper.as_bytes())).into_owned()
}

/// Count ambiguities in a sequence
pub fn count_ambiguities(seq: &str) -> usize {
    seq.chars().filter(|&c| is_ambiguous_base(c)).count()
}

/// Linguistic complexity: the product over word sizes 1..=7 of observed
/// distinct words divided by the maximum possible number of distinct words.
///
/// Returns 1.0 for a maximally varied sequence and approaches 0 for repeats.
pub fn sequence_complexity(seq: &str) -> f64 {
    let bytes = seq.as_bytes();
    let len = bytes.len();
    let mut complexity = 1.0;
    for n in 1..=7.min(len) {
        let distinct: HashSet<&[u8]> = bytes.windows(n).collect();
        let possible = 4usize.saturating_pow(n as u32).min(len - n + 1);
        complexity *= distinct.len() as f64 / possible as f64;
    }
    complexity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("ACGT"), "ACGT");
        assert_eq!(reverse_complement("aacg"), "CGTT");
        assert_eq!(reverse_complement("ATCGGTATTGAACAGCAT"), "ATGCTGTTCAATACCGAT");
    }

    #[test]
    fn test_reverse_complement_ambiguity_codes() {
        assert_eq!(reverse_complement("YRWSKMDHVBXN"), "NXVBDHKMSWYR");
    }

    #[test]
    fn test_reverse_complement_is_involution() {
        for seq in ["ACGTTGCA", "RYKMSWBDHVNX", "GATTACA", "NNNACGTR"] {
            assert_eq!(reverse_complement(&reverse_complement(seq)), seq);
        }
    }

    #[test]
    fn test_normalize_sequence() {
        assert_eq!(normalize_sequence("acgtn", "primer").unwrap(), "ACGTN");
        assert!(matches!(
            normalize_sequence("", "primer"),
            Err(PcrError::EmptySequence("primer"))
        ));
        let err = normalize_sequence("ACGU", "template").unwrap_err();
        assert!(err.to_string().contains("'U' at position 4"));
    }

    #[test]
    fn test_sequence_complexity() {
        let repeat = sequence_complexity("AAAAAAAAAAAAAAAAAAAA");
        let varied = sequence_complexity("ATGTTCAGCGTTTCTGGTC");
        assert!(repeat < 0.01);
        assert!(varied > 0.3);
        assert!(varied <= 1.0);
        assert_eq!(sequence_complexity("ACGT"), 1.0);
    }

    #[test]
    fn test_count_ambiguities() {
        assert_eq!(count_ambiguities("ACGNNR"), 3);
    }
}
