//! Cycle-by-cycle PCR simulation
//!
//! A run has four phases: binding-site discovery through the aligner,
//! pairing of top/bottom sites into potential products, product
//! initialization and the cycling loop. Each product tracks six strand
//! pools; the names follow which primer footprints a strand carries
//! (O = original template end, A = forward primer, B = reverse primer).

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::aligner::{Alignment, PrimerSearcher};
use super::error::Result;
use super::iupac::{count_ambiguities, sequence_complexity, GAP};
use super::solution::{Ingredient, Solution};
use super::thermo::{aligned_sequence_hs, fraction_bound, hybridize, priming_coefficient, Thermo};
use super::types::{CycleProgress, PcrParams, Strand};

/// Primers below this complexity are reported as likely to misprime
const LOW_COMPLEXITY: f64 = 0.2;

/// A primer bound to one template site
#[derive(Debug, Clone)]
pub struct PrimerBindingSite {
    pub primer: Ingredient,
    pub template_id: String,
    pub strand: Strand,
    pub alignment: Alignment,
}

impl PrimerBindingSite {
    fn template_thermo(&self) -> Thermo {
        self.alignment.template_thermo().unwrap_or_default()
    }

    fn primer_thermo(&self) -> Thermo {
        self.alignment.primer_thermo().unwrap_or_default()
    }

    /// 3′ mismatch penalty. Bottom-strand alignments run opposite to the
    /// primer, so they are read back to front.
    pub fn priming_coefficient(&self) -> f64 {
        let a = &self.alignment;
        match self.strand {
            Strand::Top => priming_coefficient(&a.template_aligned, &a.primer_aligned),
            Strand::Bottom => {
                let template: String = a.template_aligned.chars().rev().collect();
                let primer: String = a.primer_aligned.chars().rev().collect();
                priming_coefficient(&template, &primer)
            }
        }
    }

    /// Part of `pool` primed on the original template (mismatches allowed)
    fn prime_template(&self, primer_conc: f64, t_celsius: f64, pool: f64) -> f64 {
        let hs = self.template_thermo();
        nonnegative(pool * fraction_bound(primer_conc, hs.dh, hs.ds, t_celsius) * self.priming_coefficient())
    }

    /// Part of `pool` primed on an extension product (perfect match)
    fn prime_product(&self, primer_conc: f64, t_celsius: f64, pool: f64) -> f64 {
        let hs = self.primer_thermo();
        nonnegative(pool * fraction_bound(primer_conc, hs.dh, hs.ds, t_celsius))
    }

    /// Primer text with alignment gaps removed, in top-strand orientation
    fn footprint(&self) -> String {
        self.alignment
            .primer_aligned
            .bytes()
            .filter(|&b| b != GAP)
            .map(char::from)
            .collect()
    }
}

/// Sites found on one template, split by strand
#[derive(Debug, Clone)]
pub struct TemplateBindingSites {
    pub template_id: String,
    pub top: Vec<PrimerBindingSite>,
    pub bottom: Vec<PrimerBindingSite>,
}

/// Molar concentrations of the six strand pools of a product
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    pub oo_top: f64,
    pub oo_bot: f64,
    pub ao_top: f64,
    pub ob_bot: f64,
    pub ab_top: f64,
    pub ab_bot: f64,
}

impl ProductState {
    fn clamp_nonnegative(&mut self) {
        for value in [
            &mut self.oo_top,
            &mut self.oo_bot,
            &mut self.ao_top,
            &mut self.ob_bot,
            &mut self.ab_top,
            &mut self.ab_bot,
        ] {
            *value = nonnegative(*value);
        }
    }
}

/// Amplicon between a top-strand (forward) and bottom-strand (reverse) site
#[derive(Debug, Clone)]
pub struct PotentialProduct {
    pub id: usize,
    pub template_id: String,
    pub forward: PrimerBindingSite,
    pub reverse: PrimerBindingSite,
    /// Top strand of the full-length product
    pub sequence: String,
    /// Fully matched product duplex
    pub thermo: Thermo,
    pub state: ProductState,
    pub history: Vec<ProductState>,
    template_conc: f64,
}

impl PotentialProduct {
    fn new(
        id: usize,
        template: &Ingredient,
        template_conc: f64,
        forward: PrimerBindingSite,
        reverse: PrimerBindingSite,
    ) -> Result<Self> {
        let sequence = product_sequence(template.sequence(), &forward, &reverse);
        let thermo = aligned_sequence_hs(&sequence, &sequence)?;
        let mut product = Self {
            id,
            template_id: template.id().to_string(),
            forward,
            reverse,
            sequence,
            thermo,
            state: ProductState::default(),
            history: Vec::new(),
            template_conc,
        };
        product.reset();
        Ok(product)
    }

    /// Back to the pre-cycling state: template strands only
    pub fn reset(&mut self) {
        self.state = ProductState {
            oo_top: self.template_conc,
            oo_bot: self.template_conc,
            ..ProductState::default()
        };
        self.history.clear();
    }

    pub fn size(&self) -> usize {
        self.sequence.len()
    }

    /// Duplex strands melted at the denaturation step.
    ///
    /// Always zero: nearest-neighbor energies do not scale to full-length
    /// products, so re-annealing of product duplexes is not modelled.
    fn undenatured(&self, _top_total: f64, _bottom_total: f64, _denaturation_temp: f64) -> f64 {
        0.0
    }

    fn cycle(
        &mut self,
        params: &PcrParams,
        polymerase_activity: f64,
        free_primers: &mut BTreeMap<String, f64>,
    ) {
        let penalty = (params.nonprocessivity_per_bp * self.size() as f64).max(0.0);
        let efficiency = (polymerase_activity / 100.0 * (1.0 - penalty)).max(0.0);

        let s = self.state;
        let top_total = s.oo_top + s.ao_top + s.ab_top;
        let bottom_total = s.oo_bot + s.ob_bot + s.ab_bot;
        let undenatured = self.undenatured(top_total, bottom_total, params.denaturation_temp);
        let top_melted = denatured_fraction(top_total, undenatured);
        let bottom_melted = denatured_fraction(bottom_total, undenatured);

        let t = params.annealing_temp;
        let fwd_conc = free_primers.get(self.forward.primer.id()).copied().unwrap_or(0.0);
        let rev_conc = free_primers.get(self.reverse.primer.id()).copied().unwrap_or(0.0);

        // reverse primer lands on top strands, forward primer on bottom strands
        let primed_oo_top = self.reverse.prime_template(rev_conc, t, s.oo_top * top_melted);
        let primed_oo_bot = self.forward.prime_template(fwd_conc, t, s.oo_bot * bottom_melted);
        let primed_ao_top = self.reverse.prime_template(rev_conc, t, s.ao_top * top_melted);
        let primed_ob_bot = self.forward.prime_template(fwd_conc, t, s.ob_bot * bottom_melted);
        let primed_ab_top = self.reverse.prime_product(rev_conc, t, s.ab_top * top_melted);
        let primed_ab_bot = self.forward.prime_product(fwd_conc, t, s.ab_bot * bottom_melted);

        let mut d_ao_top = nonnegative(efficiency * primed_oo_bot);
        let mut d_ob_bot = nonnegative(efficiency * primed_oo_top);
        let mut d_ab_top = nonnegative(efficiency * (primed_ob_bot + primed_ab_bot));
        let mut d_ab_bot = nonnegative(efficiency * (primed_ao_top + primed_ab_top));

        let fwd_id = self.forward.primer.id();
        let rev_id = self.reverse.primer.id();
        if fwd_id == rev_id {
            let scale = draw_primer(free_primers, fwd_id, d_ao_top + d_ab_top + d_ob_bot + d_ab_bot);
            d_ao_top *= scale;
            d_ab_top *= scale;
            d_ob_bot *= scale;
            d_ab_bot *= scale;
        } else {
            let scale = draw_primer(free_primers, fwd_id, d_ao_top + d_ab_top);
            d_ao_top *= scale;
            d_ab_top *= scale;
            let scale = draw_primer(free_primers, rev_id, d_ob_bot + d_ab_bot);
            d_ob_bot *= scale;
            d_ab_bot *= scale;
        }

        self.state.ao_top += d_ao_top;
        self.state.ob_bot += d_ob_bot;
        self.state.ab_top += d_ab_top;
        self.state.ab_bot += d_ab_bot;
        self.state.clamp_nonnegative();
        self.history.push(self.state);
    }

    /// Equilibrium duplex concentration over the melt temperature sweep
    pub fn melting_curve(&self, params: &PcrParams) -> Vec<MeltingPoint> {
        let conc = self.state.ab_top;
        melt_temperatures(params)
            .into_iter()
            .map(|t| MeltingPoint {
                t,
                hybridized: hybridize(conc, conc, self.thermo.dh, self.thermo.ds, t),
            })
            .collect()
    }
}

/// Top strand: forward footprint, template interior, reverse footprint.
/// Coordinates are 1-based; an interior that would be negative is empty.
fn product_sequence(template: &str, forward: &PrimerBindingSite, reverse: &PrimerBindingSite) -> String {
    let start = forward.alignment.template_end;
    let end = reverse.alignment.template_begin.saturating_sub(1);
    let interior = if start < end {
        template.get(start..end).unwrap_or_default()
    } else {
        ""
    };
    let mut sequence = forward.footprint();
    sequence.push_str(interior);
    sequence.push_str(&reverse.footprint());
    sequence
}

fn nonnegative(value: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        0.0
    }
}

fn denatured_fraction(total: f64, undenatured: f64) -> f64 {
    if total > 0.0 {
        (total - undenatured) / total
    } else {
        0.0
    }
}

/// Take `wanted` from a primer's free pool, rationing proportionally when
/// the pool cannot cover it. Returns the scale applied to the demand.
fn draw_primer(free_primers: &mut BTreeMap<String, f64>, id: &str, wanted: f64) -> f64 {
    let Some(available) = free_primers.get_mut(id) else {
        return 0.0;
    };
    let scale = if wanted > *available {
        log::debug!(
            "rationing primer {}: wanted {:.3e} M, available {:.3e} M",
            id,
            wanted,
            *available
        );
        *available / wanted
    } else {
        1.0
    };
    *available = nonnegative(*available - wanted * scale);
    scale
}

fn melt_temperatures(params: &PcrParams) -> Vec<f64> {
    if !(params.melt_step > 0.0) || params.melt_end < params.melt_start {
        log::warn!(
            "empty melt sweep {}..{} step {}",
            params.melt_start,
            params.melt_end,
            params.melt_step
        );
        return Vec::new();
    }
    let steps = ((params.melt_end - params.melt_start) / params.melt_step + 1e-9).floor() as usize;
    (0..=steps)
        .map(|k| params.melt_start + k as f64 * params.melt_step)
        .collect()
}

/// Gel band input: product length and loaded amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandData {
    pub size: usize,
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeltingPoint {
    #[serde(rename = "T")]
    pub t: f64,
    pub hybridized: f64,
}

/// Simulation context: owns the reaction, its products and the free-primer
/// working map.
#[derive(Debug, Clone)]
pub struct Pcr {
    solution: Solution,
    params: PcrParams,
    binding_sites: Vec<TemplateBindingSites>,
    products: Vec<PotentialProduct>,
    free_primers: BTreeMap<String, f64>,
    polymerase_activity: f64,
    cycles_run: usize,
}

impl Pcr {
    pub fn new(solution: Solution, params: PcrParams) -> Self {
        let free_primers = solution.primer_concentrations();
        let polymerase_activity = solution.dna_polymerase_activity();
        Self {
            solution,
            params,
            binding_sites: Vec::new(),
            products: Vec::new(),
            free_primers,
            polymerase_activity,
            cycles_run: 0,
        }
    }

    pub fn params(&self) -> &PcrParams {
        &self.params
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn binding_sites(&self) -> &[TemplateBindingSites] {
        &self.binding_sites
    }

    pub fn products(&self) -> &[PotentialProduct] {
        &self.products
    }

    /// Free primer concentrations (M) left after the last run
    pub fn free_primers(&self) -> &BTreeMap<String, f64> {
        &self.free_primers
    }

    pub fn polymerase_activity(&self) -> f64 {
        self.polymerase_activity
    }

    pub fn run(&mut self, searcher: &mut PrimerSearcher) -> Result<()> {
        self.run_with_progress(searcher, None)
    }

    /// Full simulation; any previous run is discarded first.
    ///
    /// `progress` receives one update after every completed cycle.
    pub fn run_with_progress(
        &mut self,
        searcher: &mut PrimerSearcher,
        progress: Option<&Sender<CycleProgress>>,
    ) -> Result<()> {
        self.binding_sites.clear();
        self.products.clear();
        self.free_primers = self.solution.primer_concentrations();
        self.polymerase_activity = self.solution.dna_polymerase_activity();
        self.cycles_run = 0;

        self.find_binding_sites(searcher)?;
        self.find_potential_products()?;
        log::info!(
            "{} binding sites, {} potential products",
            self.binding_sites
                .iter()
                .map(|s| s.top.len() + s.bottom.len())
                .sum::<usize>(),
            self.products.len()
        );

        let total_cycles = self.params.cycles;
        for cycle in 0..total_cycles {
            for product in &mut self.products {
                product.cycle(&self.params, self.polymerase_activity, &mut self.free_primers);
            }
            self.polymerase_activity *= self.params.polymerase_survival_per_cycle;
            self.cycles_run = cycle + 1;

            if let Some(tx) = progress {
                let _ = tx.send(CycleProgress {
                    cycle: cycle + 1,
                    total_cycles,
                    polymerase_activity: self.polymerase_activity,
                    message: format!("Cycle {}/{}", cycle + 1, total_cycles),
                });
            }
        }
        Ok(())
    }

    fn find_binding_sites(&mut self, searcher: &mut PrimerSearcher) -> Result<()> {
        searcher.set_max_alternatives_per_cell(self.params.max_alternatives_per_cell);
        let primers = unique_ingredients(self.solution.primers().into_iter().map(|iq| &iq.ingredient));
        let templates = unique_ingredients(self.solution.templates().into_iter().map(|iq| &iq.ingredient));

        for primer in &primers {
            let complexity = sequence_complexity(primer.sequence());
            if complexity < LOW_COMPLEXITY {
                log::warn!(
                    "primer {} has low sequence complexity ({:.3})",
                    primer.id(),
                    complexity
                );
            }
            let ambiguous = count_ambiguities(primer.sequence());
            if ambiguous > 0 {
                log::warn!(
                    "primer {} has {} ambiguous bases; they score as 0 when aligned",
                    primer.id(),
                    ambiguous
                );
            }
        }

        for template in templates {
            let mut sites = TemplateBindingSites {
                template_id: template.id().to_string(),
                top: Vec::new(),
                bottom: Vec::new(),
            };
            for primer in &primers {
                for strand in Strand::BOTH {
                    let found = searcher.search_primer(
                        template.id(),
                        template.sequence(),
                        primer.sequence(),
                        strand,
                        self.params.fudge,
                    )?;
                    let strand_sites = match strand {
                        Strand::Top => &mut sites.top,
                        Strand::Bottom => &mut sites.bottom,
                    };
                    strand_sites.extend(
                        found
                            .best_alignments()
                            .take(self.params.max_binding_sites)
                            .map(|alignment| PrimerBindingSite {
                                primer: (*primer).clone(),
                                template_id: template.id().to_string(),
                                strand,
                                alignment: alignment.clone(),
                            }),
                    );
                }
            }
            log::debug!(
                "template {}: {} top and {} bottom sites",
                sites.template_id,
                sites.top.len(),
                sites.bottom.len()
            );
            self.binding_sites.push(sites);
        }
        Ok(())
    }

    fn find_potential_products(&mut self) -> Result<()> {
        for sites in &self.binding_sites {
            let Some(template) = self
                .solution
                .templates()
                .into_iter()
                .map(|iq| &iq.ingredient)
                .find(|t| t.id() == sites.template_id)
            else {
                continue;
            };
            let template_conc = self.template_concentration(template.id());

            for forward in &sites.top {
                for reverse in &sites.bottom {
                    let size = reverse.alignment.template_end as i64
                        - forward.alignment.template_begin as i64
                        + 1;
                    if size <= 0 || size > self.params.max_amplicon_length as i64 {
                        continue;
                    }
                    let product = PotentialProduct::new(
                        self.products.len(),
                        template,
                        template_conc,
                        forward.clone(),
                        reverse.clone(),
                    )?;
                    log::debug!(
                        "product {} on {}: {}..{} ({} bp)",
                        product.id,
                        product.template_id,
                        forward.alignment.template_begin,
                        reverse.alignment.template_end,
                        product.size()
                    );
                    self.products.push(product);
                }
            }
        }
        Ok(())
    }

    /// Molar concentration of a template, summed over repeated additions
    fn template_concentration(&self, id: &str) -> f64 {
        self.solution
            .templates()
            .into_iter()
            .filter(|iq| iq.ingredient.id() == id)
            .map(|iq| self.solution.concentration(iq.quantity))
            .sum()
    }

    /// Final product amounts loaded on a gel; `sample_volume` in µl
    pub fn band_data(&self, sample_volume: f64) -> Vec<BandData> {
        self.products
            .iter()
            .filter_map(|product| {
                let last = product.history.last()?;
                Some(BandData {
                    size: product.size(),
                    quantity: last.ab_top.min(last.ab_bot) * sample_volume,
                })
            })
            .collect()
    }

    /// Per-cycle fluorescence: Gaussian baseline plus double-stranded
    /// product signal.
    pub fn fluorescence_history(&self) -> Vec<f64> {
        let mut rng = match self.params.noise_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut history = gaussian_noise(
            &mut rng,
            self.cycles_run,
            self.params.fluorescence_background,
            self.params.fluorescence_noise,
        );
        for product in &self.products {
            let bp = product.size() as f64;
            for (value, state) in history.iter_mut().zip(&product.history) {
                *value += state.ab_top * bp * self.params.fluorescence_coefficient;
            }
        }
        history
    }

    pub fn melting_curves(&self) -> Vec<Vec<MeltingPoint>> {
        self.products
            .iter()
            .map(|product| product.melting_curve(&self.params))
            .collect()
    }
}

/// Box-Muller normal samples
fn gaussian_noise(rng: &mut ChaCha8Rng, n: usize, mean: f64, sd: f64) -> Vec<f64> {
    let mut samples = Vec::with_capacity(n + 1);
    while samples.len() < n {
        // shift to (0, 1] so the log stays finite
        let u1 = 1.0 - rng.gen::<f64>();
        let u2 = rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f64::consts::PI * u2;
        samples.push(mean + radius * angle.cos() * sd);
        samples.push(mean + radius * angle.sin() * sd);
    }
    samples.truncate(n);
    samples
}

/// First occurrence of each ingredient id, in insertion order
fn unique_ingredients<'a>(ingredients: impl Iterator<Item = &'a Ingredient>) -> Vec<&'a Ingredient> {
    let mut unique: Vec<&Ingredient> = Vec::new();
    for ingredient in ingredients {
        if !unique.iter().any(|u| u.id() == ingredient.id()) {
            unique.push(ingredient);
        }
    }
    unique
}
