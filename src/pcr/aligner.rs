//! Primer binding-site search by dynamic programming
//!
//! The template X defines the columns of the score matrix (index i) and the
//! primer Y its rows (index j). The primer must align end to end while the
//! template may extend past it on either side, so the matrix borders are
//! zero and the search starts from the last primer row.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{PcrError, Result};
use super::iupac::{normalize_sequence, reverse_complement, GAP};
use super::thermo::{aligned_sequence_hs, Thermo, REFERENCE_TEMP};
use super::types::{ScoringParams, Strand};

/// One way of laying a primer onto a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    /// Template side, gapped
    #[serde(rename = "A")]
    pub template_aligned: String,
    /// Primer side, gapped
    #[serde(rename = "B")]
    pub primer_aligned: String,
    /// 1-based, inclusive
    pub template_begin: usize,
    pub template_end: usize,
    #[serde(rename = "template_dH", default)]
    pub template_dh: Option<f64>,
    #[serde(rename = "template_dS", default)]
    pub template_ds: Option<f64>,
    #[serde(rename = "template_dG55", default)]
    pub template_dg55: Option<f64>,
    #[serde(rename = "primer_dH", default)]
    pub primer_dh: Option<f64>,
    #[serde(rename = "primer_dS", default)]
    pub primer_ds: Option<f64>,
    #[serde(default)]
    pub is_best_alternative: bool,
}

impl Alignment {
    pub fn new(
        template_aligned: String,
        primer_aligned: String,
        template_begin: usize,
        template_end: usize,
    ) -> Self {
        Self {
            template_aligned,
            primer_aligned,
            template_begin,
            template_end,
            template_dh: None,
            template_ds: None,
            template_dg55: None,
            primer_dh: None,
            primer_ds: None,
            is_best_alternative: false,
        }
    }

    /// `|` under identical columns, space elsewhere
    pub fn spacer(&self) -> String {
        self.template_aligned
            .bytes()
            .zip(self.primer_aligned.bytes())
            .map(|(a, b)| if a == b { '|' } else { ' ' })
            .collect()
    }

    /// Columns where template and primer differ, gaps included
    pub fn mismatches(&self) -> usize {
        self.template_aligned
            .bytes()
            .zip(self.primer_aligned.bytes())
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Fill in template and primer duplex energies.
    ///
    /// An alignment without any matching column is left unannotated.
    pub fn annotate(&mut self) {
        let template = match aligned_sequence_hs(&self.template_aligned, &self.primer_aligned) {
            Ok(hs) => hs,
            Err(err) => {
                log::warn!(
                    "cannot annotate alignment [{}:{}]: {}",
                    self.template_begin,
                    self.template_end,
                    err
                );
                return;
            }
        };
        self.template_dh = Some(template.dh);
        self.template_ds = Some(template.ds);
        self.template_dg55 = Some(template.dg(REFERENCE_TEMP));

        if let Ok(primer) = aligned_sequence_hs(&self.primer_aligned, &self.primer_aligned) {
            self.primer_dh = Some(primer.dh);
            self.primer_ds = Some(primer.ds);
        }
    }

    /// Primer bound to this template site
    pub fn template_thermo(&self) -> Option<Thermo> {
        Some(Thermo {
            dh: self.template_dh?,
            ds: self.template_ds?,
        })
    }

    /// Primer bound to its perfect complement
    pub fn primer_thermo(&self) -> Option<Thermo> {
        Some(Thermo {
            dh: self.primer_dh?,
            ds: self.primer_ds?,
        })
    }

    fn stability_key(&self) -> f64 {
        self.template_dg55.unwrap_or(f64::INFINITY)
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.template_begin, self.template_end)?;
        if let Some(dg) = self.template_dg55 {
            write!(f, " dG55={:.3}", dg)?;
        }
        if self.is_best_alternative {
            write!(f, " *** Best Alternative ***")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.template_aligned)?;
        writeln!(f, "{}", self.spacer())?;
        writeln!(f, "{}", self.primer_aligned)
    }
}

/// Co-optimal alignments traced back from one start cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeAlignments {
    pub template_id: String,
    pub strand: Strand,
    pub alignment_score: i32,
    pub alignments: Vec<Alignment>,
}

impl AlternativeAlignments {
    pub fn new(template_id: &str, alignment_score: i32, strand: Strand) -> Self {
        Self {
            template_id: template_id.to_string(),
            strand,
            alignment_score,
            alignments: Vec::new(),
        }
    }

    pub fn add_alignment(&mut self, alignment: Alignment) {
        self.alignments.push(alignment);
    }

    /// Annotate every member, order them from most to least stable and flag
    /// the most stable one. Ties keep encounter order.
    pub fn annotate_and_rank(&mut self) {
        for alignment in &mut self.alignments {
            alignment.annotate();
            alignment.is_best_alternative = false;
        }
        self.alignments
            .sort_by(|a, b| a.stability_key().total_cmp(&b.stability_key()));
        if let Some(best) = self.alignments.first_mut() {
            best.is_best_alternative = best.template_dg55.is_some();
        }
    }

    pub fn best_alignment(&self) -> Option<&Alignment> {
        self.alignments.iter().find(|a| a.is_best_alternative)
    }

    fn stability_key(&self) -> f64 {
        self.best_alignment()
            .map(|a| a.stability_key())
            .unwrap_or(f64::INFINITY)
    }
}

/// All groups found by one (template, primer, strand, fudge) query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlternativeAlignmentsList(pub Vec<AlternativeAlignments>);

impl AlternativeAlignmentsList {
    /// Rank members within each group, then groups by their best member
    pub fn rank_by_stability(&mut self) {
        for group in &mut self.0 {
            group.annotate_and_rank();
        }
        self.0
            .sort_by(|a, b| a.stability_key().total_cmp(&b.stability_key()));
    }

    /// Representative alignment of each group, most stable group first
    pub fn best_alignments(&self) -> impl Iterator<Item = &Alignment> {
        self.0.iter().filter_map(|group| group.best_alignment())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AlternativeAlignments> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_text(&self) -> String {
        let mut text = String::from("Alignments:\n");
        for group in &self.0 {
            text.push_str(&format!(
                "template '{}', alignment_score: {}\n",
                group.template_id, group.alignment_score
            ));
            for alignment in &group.alignments {
                text.push('\n');
                text.push_str(&alignment.to_string());
            }
            text.push_str("\n===\n");
        }
        text
    }
}

/// Cache key; its text form is `{template_id}::{primer}::{strand}::{fudge}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub template_id: String,
    pub primer: String,
    pub strand: Strand,
    pub fudge: u32,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}::{}",
            self.template_id, self.primer, self.strand, self.fudge
        )
    }
}

impl FromStr for CacheKey {
    type Err = PcrError;

    fn from_str(s: &str) -> Result<Self> {
        // the template id may itself contain "::", so split from the right
        let mut parts = s.rsplitn(4, "::");
        let (Some(fudge), Some(strand), Some(primer), Some(template_id)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PcrError::Snapshot(format!("malformed cache key \"{}\"", s)));
        };
        let fudge: u32 = fudge
            .parse()
            .map_err(|_| PcrError::Snapshot(format!("bad fudge in cache key \"{}\"", s)))?;
        Ok(Self {
            template_id: template_id.to_string(),
            primer: normalize_sequence(primer, "primer")?,
            strand: strand.parse()?,
            fudge,
        })
    }
}

/// Serialized cache: text key -> groups
pub type CacheSnapshot = BTreeMap<String, Vec<AlternativeAlignments>>;

/// Zero-bordered score matrix, row-major over primer rows
struct DpMatrix {
    scores: Vec<i32>,
    cols: usize,
}

impl DpMatrix {
    #[inline]
    fn get(&self, j: usize, i: usize) -> i32 {
        self.scores[j * self.cols + i]
    }

    fn row(&self, j: usize) -> &[i32] {
        &self.scores[j * self.cols..(j + 1) * self.cols]
    }
}

/// Partial path during traceback; sequences are collected back to front
struct Frame {
    i: usize,
    j: usize,
    template_rev: Vec<u8>,
    primer_rev: Vec<u8>,
}

impl Frame {
    fn step(&self, i: usize, j: usize, template: u8, primer: u8) -> Self {
        let mut template_rev = self.template_rev.clone();
        let mut primer_rev = self.primer_rev.clone();
        template_rev.push(template);
        primer_rev.push(primer);
        Self {
            i,
            j,
            template_rev,
            primer_rev,
        }
    }
}

/// Searches primers against templates and caches the results.
///
/// Traceback enumerates every co-optimal path from each start cell, which
/// grows exponentially with the number of ties; `max_alternatives_per_cell`
/// bounds that enumeration.
#[derive(Debug, Clone)]
pub struct PrimerSearcher {
    scoring: ScoringParams,
    max_alternatives_per_cell: usize,
    cache: HashMap<CacheKey, AlternativeAlignmentsList>,
    dp_fills: usize,
}

impl Default for PrimerSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimerSearcher {
    pub fn new() -> Self {
        Self::with_scoring(ScoringParams::default(), 256)
    }

    pub fn with_scoring(scoring: ScoringParams, max_alternatives_per_cell: usize) -> Self {
        Self {
            scoring,
            max_alternatives_per_cell: max_alternatives_per_cell.max(1),
            cache: HashMap::new(),
            dp_fills: 0,
        }
    }

    pub fn set_max_alternatives_per_cell(&mut self, cap: usize) {
        self.max_alternatives_per_cell = cap.max(1);
    }

    /// Score for template base `x` against primer base `y`; `None` when
    /// either is not one of A, C, G, T.
    pub fn pair_score(&self, x: u8, y: u8) -> Option<i32> {
        let standard = |b: u8| matches!(b, b'A' | b'C' | b'G' | b'T');
        if !standard(x) || !standard(y) {
            return None;
        }
        Some(if x == y {
            self.scoring.match_score
        } else {
            self.scoring.mismatch_score
        })
    }

    /// Score of the primer aligned against itself
    pub fn perfect_score(&self, primer: &str) -> i32 {
        primer
            .bytes()
            .map(|b| self.pair_score(b, b).unwrap_or(0))
            .sum()
    }

    /// Number of score matrices computed so far (cache misses)
    pub fn dp_fills(&self) -> usize {
        self.dp_fills
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Find alignments of `primer` on `strand` of the template.
    ///
    /// Results are annotated with thermodynamics, ranked by stability and
    /// cached under (template_id, primer, strand, fudge).
    pub fn search_primer(
        &mut self,
        template_id: &str,
        template: &str,
        primer: &str,
        strand: Strand,
        fudge: u32,
    ) -> Result<&AlternativeAlignmentsList> {
        let key = CacheKey {
            template_id: template_id.to_string(),
            primer: normalize_sequence(primer, "primer")?,
            strand,
            fudge,
        };

        if self.cache.contains_key(&key) {
            log::debug!("cache hit for \"{}\"", key);
        } else {
            log::debug!("searching for \"{}\"", key);
            let template = normalize_sequence(template, "template")?;
            let query = match strand {
                Strand::Top => key.primer.clone(),
                Strand::Bottom => reverse_complement(&key.primer),
            };
            let mut list = self.align(template_id, &template, &query, strand, fudge);
            list.rank_by_stability();
            log::debug!("sites found for \"{}\": {}", key, list.len());
            self.cache.insert(key.clone(), list);
        }
        Ok(&self.cache[&key])
    }

    fn align(
        &mut self,
        template_id: &str,
        template: &str,
        primer: &str,
        strand: Strand,
        fudge: u32,
    ) -> AlternativeAlignmentsList {
        let x = template.as_bytes();
        let y = primer.as_bytes();
        let dp = self.fill_matrix(x, y);

        let threshold = self
            .perfect_score(primer)
            .saturating_sub(i32::try_from(fudge).unwrap_or(i32::MAX));
        let mut list = AlternativeAlignmentsList::default();
        for i in self.starting_columns(&dp, y.len(), threshold) {
            let score = dp.get(y.len(), i);
            let mut group = AlternativeAlignments::new(template_id, score, strand);
            for alignment in self.traceback(&dp, x, y, i) {
                group.add_alignment(alignment);
            }
            list.0.push(group);
        }
        list
    }

    fn fill_matrix(&mut self, x: &[u8], y: &[u8]) -> DpMatrix {
        let cols = x.len() + 1;
        let rows = y.len() + 1;
        let gap = self.scoring.gap_penalty;
        let mut dp = DpMatrix {
            scores: vec![0; rows * cols],
            cols,
        };
        let mut unscored = 0usize;

        for j in 1..rows {
            for i in 1..cols {
                let pair = self.pair_score(x[i - 1], y[j - 1]).unwrap_or_else(|| {
                    unscored += 1;
                    0
                });
                let diag = dp.get(j - 1, i - 1) + pair;
                let up = dp.get(j - 1, i) + gap;
                let left = dp.get(j, i - 1) + gap;
                dp.scores[j * cols + i] = diag.max(up).max(left);
            }
        }

        if unscored > 0 {
            log::warn!(
                "{} template/primer pairs involved non-ACGT symbols and scored 0",
                unscored
            );
        }
        self.dp_fills += 1;
        dp
    }

    /// Columns of the last primer row scoring at least `threshold`.
    ///
    /// A column lower than either neighbour is skipped; this drops alignments
    /// that only differ by a gap after the primer's final base.
    fn starting_columns(&self, dp: &DpMatrix, last_row: usize, threshold: i32) -> Vec<usize> {
        let row = dp.row(last_row);
        (1..row.len())
            .filter(|&i| {
                let score = row[i];
                let below_right = row.get(i + 1).is_some_and(|&next| score < next);
                let below_left = score < row[i - 1];
                !below_right && !below_left && score >= threshold
            })
            .collect()
    }

    /// Every co-optimal path from (`start_col`, last row) back to the border,
    /// explored diagonal first, then template gap, then primer gap.
    fn traceback(&self, dp: &DpMatrix, x: &[u8], y: &[u8], start_col: usize) -> Vec<Alignment> {
        let gap = self.scoring.gap_penalty;
        let mut alignments = Vec::new();
        let mut stack = vec![Frame {
            i: start_col,
            j: y.len(),
            template_rev: Vec::with_capacity(y.len() + 4),
            primer_rev: Vec::with_capacity(y.len() + 4),
        }];

        while let Some(frame) = stack.pop() {
            let (i, j) = (frame.i, frame.j);
            if i == 0 || j == 0 {
                alignments.push(finish_path(frame, start_col));
                if alignments.len() >= self.max_alternatives_per_cell {
                    if !stack.is_empty() {
                        log::warn!(
                            "traceback from column {} stopped after {} alternatives",
                            start_col,
                            alignments.len()
                        );
                    }
                    break;
                }
                continue;
            }

            let score = dp.get(j, i);
            let (xb, yb) = (x[i - 1], y[j - 1]);
            let pair = self.pair_score(xb, yb).unwrap_or(0);

            // pushed in reverse so the diagonal branch is explored first
            if score == dp.get(j, i - 1) + gap {
                stack.push(frame.step(i - 1, j, xb, GAP));
            }
            if score == dp.get(j - 1, i) + gap {
                stack.push(frame.step(i, j - 1, GAP, yb));
            }
            if score == dp.get(j - 1, i - 1) + pair {
                stack.push(frame.step(i - 1, j - 1, xb, yb));
            }
        }
        alignments
    }

    /// Seed the cache from a JSON snapshot; returns the number of keys loaded.
    pub fn load_cache_json(&mut self, json: &str) -> Result<usize> {
        let snapshot: CacheSnapshot = serde_json::from_str(json)?;
        self.load_cache_snapshot(snapshot)
    }

    /// Seed the cache from parsed snapshot data.
    ///
    /// Thermodynamic fields are recomputed so they always agree with the
    /// energy model in use.
    pub fn load_cache_snapshot(&mut self, snapshot: CacheSnapshot) -> Result<usize> {
        let mut loaded = 0;
        for (text_key, groups) in snapshot {
            let key: CacheKey = text_key.parse()?;
            if let Some(group) = groups
                .iter()
                .find(|g| g.template_id != key.template_id || g.strand != key.strand)
            {
                return Err(PcrError::Snapshot(format!(
                    "group for {}/{} stored under \"{}\"",
                    group.template_id, group.strand, text_key
                )));
            }
            log::debug!("loading cache key \"{}\" ({} groups)", key, groups.len());
            let mut list = AlternativeAlignmentsList(groups);
            list.rank_by_stability();
            self.cache.insert(key, list);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Serialize the whole cache in snapshot form, keys sorted
    pub fn export_cache_json(&self) -> Result<String> {
        let snapshot: BTreeMap<String, &AlternativeAlignmentsList> = self
            .cache
            .iter()
            .map(|(key, list)| (key.to_string(), list))
            .collect();
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }
}

fn finish_path(frame: Frame, start_col: usize) -> Alignment {
    let Frame {
        i,
        mut template_rev,
        mut primer_rev,
        ..
    } = frame;
    template_rev.reverse();
    primer_rev.reverse();
    Alignment::new(
        String::from_utf8_lossy(&template_rev).into_owned(),
        String::from_utf8_lossy(&primer_rev).into_owned(),
        i + 1,
        start_col,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const PRIMER: &str = "ATGTTCAGCGTTTCTGGTC";

    fn random_dna(len: usize, seed: u64) -> String {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..len)
            .map(|_| ['A', 'C', 'G', 'T'][rng.gen_range(0..4)])
            .collect()
    }

    /// Random template with `PRIMER` at 1-based positions 1285..=1303
    fn template_with_site() -> String {
        let mut template = random_dna(1284, 7);
        template.push_str(PRIMER);
        template.push_str(&random_dna(700, 11));
        template
    }

    #[test]
    fn test_perfect_score() {
        let searcher = PrimerSearcher::new();
        for seq in ["A", "ACGT", PRIMER, "GGGGGGGGGGCCCCCCCCCCAT"] {
            assert_eq!(searcher.perfect_score(seq), 2 * seq.len() as i32);
        }
        assert_eq!(searcher.perfect_score("ACNT"), 6);
    }

    #[test]
    fn test_exact_site_top_strand() {
        let template = template_with_site();
        let mut searcher = PrimerSearcher::new();
        let list = searcher
            .search_primer("NC_000913.3", &template, PRIMER, Strand::Top, 0)
            .unwrap();

        assert_eq!(list.len(), 1);
        let group = &list.0[0];
        assert_eq!(group.alignment_score, 38);
        assert_eq!(group.alignments.len(), 1);
        let alignment = &group.alignments[0];
        assert_eq!(alignment.template_begin, 1285);
        assert_eq!(alignment.template_end, 1303);
        assert_eq!(alignment.mismatches(), 0);
        assert!(alignment.is_best_alternative);
        assert_eq!(alignment.template_dh, Some(-139600.0));
    }

    #[test]
    fn test_bottom_strand_uses_reverse_complement() {
        let template = template_with_site();
        let rc = reverse_complement(PRIMER);
        let mut searcher = PrimerSearcher::new();
        let list = searcher
            .search_primer("T", &template, &rc, Strand::Bottom, 0)
            .unwrap();
        assert_eq!(list.len(), 1);
        let best = list.best_alignments().next().unwrap();
        assert_eq!(best.primer_aligned, PRIMER);
        assert_eq!((best.template_begin, best.template_end), (1285, 1303));
    }

    #[test]
    fn test_gapped_alternatives() {
        // primer with two extra template bases after "AT"
        let template = "CCCCCATGCGTTCAGCGTTTCTGGTCCCCCC";
        let mut searcher = PrimerSearcher::new();
        let list = searcher
            .search_primer("T", template, PRIMER, Strand::Top, 10)
            .unwrap();
        assert!(!list.is_empty());
        let group = &list.0[0];
        assert!(group.alignments.len() >= 2);
        for alignment in &group.alignments {
            assert_eq!(alignment.template_aligned.len(), alignment.primer_aligned.len());
            assert_eq!(alignment.primer_aligned.replace('-', ""), PRIMER);
            assert_eq!(alignment.template_end, 26);
        }
        assert_eq!(group.alignments.iter().filter(|a| a.is_best_alternative).count(), 1);
        let best = group.best_alignment().unwrap();
        for alignment in &group.alignments {
            assert!(best.template_dg55.unwrap() <= alignment.template_dg55.unwrap());
        }
    }

    #[test]
    fn test_fudge_is_monotone() {
        let mut template = template_with_site();
        // a one-mismatch copy further downstream
        template.push_str("ATGTTCAGCGATTCTGGTC");
        template.push_str(&random_dna(200, 3));

        let mut searcher = PrimerSearcher::new();
        let strict: Vec<(usize, usize)> = searcher
            .search_primer("T", &template, PRIMER, Strand::Top, 0)
            .unwrap()
            .iter()
            .flat_map(|g| g.alignments.iter().map(|a| (a.template_begin, a.template_end)))
            .collect();
        let strict_scores: Vec<i32> = searcher
            .search_primer("T", &template, PRIMER, Strand::Top, 0)
            .unwrap()
            .iter()
            .map(|g| g.alignment_score)
            .collect();
        assert!(strict_scores.iter().all(|&s| s == 38));

        let relaxed: Vec<(usize, usize)> = searcher
            .search_primer("T", &template, PRIMER, Strand::Top, 5)
            .unwrap()
            .iter()
            .flat_map(|g| g.alignments.iter().map(|a| (a.template_begin, a.template_end)))
            .collect();
        assert!(relaxed.len() > strict.len());
        for site in &strict {
            assert!(relaxed.contains(site));
        }
        assert!(relaxed.contains(&(2004, 2022)));
    }

    #[test]
    fn test_huge_fudge_keeps_every_start_column() {
        let mut searcher = PrimerSearcher::new();
        for fudge in [1u32 << 31, u32::MAX] {
            let list = searcher
                .search_primer("T", "ACGTACGTACGT", "ACGT", Strand::Top, fudge)
                .unwrap();
            let ends: Vec<usize> = list
                .best_alignments()
                .map(|a| a.template_end)
                .collect();
            for end in [4, 8, 12] {
                assert!(ends.contains(&end), "missing site ending at {end}");
            }
        }
        let exact = searcher
            .search_primer("T", "ACGTACGTACGT", "ACGT", Strand::Top, 0)
            .unwrap();
        assert_eq!(exact.len(), 3);
    }

    #[test]
    fn test_cache_idempotence() {
        let template = template_with_site();
        let mut searcher = PrimerSearcher::new();
        let first = searcher
            .search_primer("T", &template, PRIMER, Strand::Top, 3)
            .unwrap()
            .clone();
        assert_eq!(searcher.dp_fills(), 1);
        let second = searcher
            .search_primer("T", &template, &PRIMER.to_lowercase(), Strand::Top, 3)
            .unwrap()
            .clone();
        assert_eq!(searcher.dp_fills(), 1);
        assert_eq!(first, second);

        searcher
            .search_primer("T", &template, PRIMER, Strand::Bottom, 3)
            .unwrap();
        assert_eq!(searcher.dp_fills(), 2);
        assert_eq!(searcher.cache_len(), 2);
    }

    #[test]
    fn test_alternative_cap() {
        let template = "CCCCCATGCGTTCAGCGTTTCTGGTCCCCCC";
        let mut uncapped = PrimerSearcher::new();
        let all = uncapped
            .search_primer("T", template, PRIMER, Strand::Top, 10)
            .unwrap();
        assert!(all.0[0].alignments.len() >= 2);

        let mut capped = PrimerSearcher::with_scoring(ScoringParams::default(), 1);
        let list = capped
            .search_primer("T", template, PRIMER, Strand::Top, 10)
            .unwrap();
        assert!(!list.is_empty());
        assert!(list.iter().all(|g| g.alignments.len() == 1));
        assert!(list.0[0].alignments[0].is_best_alternative);
    }

    #[test]
    fn test_invalid_sequences() {
        let mut searcher = PrimerSearcher::new();
        assert!(matches!(
            searcher.search_primer("T", "ACGT", "", Strand::Top, 0),
            Err(PcrError::EmptySequence("primer"))
        ));
        assert!(matches!(
            searcher.search_primer("T", "ACGT", "AC*T", Strand::Top, 0),
            Err(PcrError::InvalidSequence(_))
        ));
        assert_eq!(searcher.cache_len(), 0);
    }

    #[test]
    fn test_ambiguous_template_bases_score_zero() {
        let template = "CCCCCATGTTCANCGTTTCTGGTCCCCC";
        let mut searcher = PrimerSearcher::new();
        let list = searcher
            .search_primer("T", template, PRIMER, Strand::Top, 2)
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.0[0].alignment_score, 36);
    }

    #[test]
    fn test_cache_key_round_trip() {
        let key: CacheKey = "NC_000913.3::ATGTTCAGCGTTTCTGGTC::bottom::10".parse().unwrap();
        assert_eq!(key.template_id, "NC_000913.3");
        assert_eq!(key.strand, Strand::Bottom);
        assert_eq!(key.fudge, 10);
        assert_eq!(key.to_string(), "NC_000913.3::ATGTTCAGCGTTTCTGGTC::bottom::10");

        assert!("a::ACGT::left::0".parse::<CacheKey>().is_err());
        assert!("ACGT::top::0".parse::<CacheKey>().is_err());
    }

    #[test]
    fn test_snapshot_load_and_export() {
        let json = r#"{
            "NC_000913.3::ATGTTCAGCGTTTCTGGTC::top::10": [
                {"template_id": "NC_000913.3", "strand": "top", "alignment_score": 29,
                 "alignments": [
                    {"A": "GCGTTCCGCGTTTCTGGTC", "B": "ATGTTCAGCGTTTCTGGTC",
                     "template_begin": 4059469, "template_end": 4059487},
                    {"A": "ATGCGTTCCGCGTTTCTGGTC", "B": "AT--GTTCAGCGTTTCTGGTC",
                     "template_begin": 4059467, "template_end": 4059487}
                 ]}
            ],
            "NC_000913.3::ATGTTCAGCGTTTCTGGTC::bottom::10": []
        }"#;
        let mut searcher = PrimerSearcher::new();
        assert_eq!(searcher.load_cache_json(json).unwrap(), 2);

        let list = searcher
            .search_primer("NC_000913.3", "", PRIMER, Strand::Top, 10)
            .unwrap()
            .clone();
        assert_eq!(searcher.dp_fills(), 0);
        let best = list.best_alignments().next().unwrap();
        assert_eq!(best.primer_aligned, "AT--GTTCAGCGTTTCTGGTC");
        assert!((best.template_dg55.unwrap() - -11588.41).abs() < 1e-6);
        assert_eq!(best.primer_dh, Some(-131100.0));

        let exported = searcher.export_cache_json().unwrap();
        let mut reloaded = PrimerSearcher::new();
        assert_eq!(reloaded.load_cache_json(&exported).unwrap(), 2);
        assert_eq!(
            reloaded.export_cache_json().unwrap(),
            exported
        );
        assert!(exported.contains("\"template_dG55\""));
    }

    #[test]
    fn test_snapshot_rejects_mismatched_group() {
        let json = r#"{"T1::ACGT::top::0": [
            {"template_id": "T2", "strand": "top", "alignment_score": 8, "alignments": []}
        ]}"#;
        let mut searcher = PrimerSearcher::new();
        assert!(matches!(
            searcher.load_cache_json(json),
            Err(PcrError::Snapshot(_))
        ));
    }

    #[test]
    fn test_alignment_text() {
        let mut alignment = Alignment::new("ACGA".into(), "ACGT".into(), 5, 8);
        alignment.annotate();
        alignment.is_best_alternative = true;
        let text = alignment.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("[5:8] dG55="));
        assert!(lines[0].ends_with("*** Best Alternative ***"));
        assert_eq!(&lines[1..], &["ACGA", "||| ", "ACGT"]);
    }
}
