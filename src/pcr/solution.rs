//! Reaction mixture: ingredients, quantities and derived concentrations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::Result;
use super::iupac::normalize_sequence;

/// Quantities are recorded in picomoles
pub const PICOMOLE: f64 = 1e-12;
/// Volumes are recorded in microlitres
pub const MICROLITRE: f64 = 1e-6;

/// Role of a DNA ingredient, fixed when the ingredient is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primer,
    Template,
}

/// A DNA molecule added to a reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    id: String,
    role: Role,
    sequence: String,
}

impl Ingredient {
    /// A primer whose id is its own (uppercased) sequence
    pub fn primer(sequence: &str) -> Result<Self> {
        let sequence = normalize_sequence(sequence, "primer")?;
        Ok(Self {
            id: sequence.clone(),
            role: Role::Primer,
            sequence,
        })
    }

    /// A primer with an explicit name
    pub fn named_primer(id: &str, sequence: &str) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            role: Role::Primer,
            sequence: normalize_sequence(sequence, "primer")?,
        })
    }

    pub fn template(id: &str, sequence: &str) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            role: Role::Template,
            sequence: normalize_sequence(sequence, "template")?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn is_primer(&self) -> bool {
        self.role == Role::Primer
    }

    pub fn is_template(&self) -> bool {
        self.role == Role::Template
    }
}

/// An ingredient together with the amount added, in picomoles
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientQuantity {
    pub ingredient: Ingredient,
    pub quantity: f64,
}

impl IngredientQuantity {
    /// Negative (or NaN) quantities are clamped to zero
    pub fn new(ingredient: Ingredient, quantity: f64) -> Self {
        let quantity = if quantity >= 0.0 {
            quantity
        } else {
            log::warn!(
                "negative quantity {} for ingredient {}; using 0",
                quantity,
                ingredient.id()
            );
            0.0
        };
        Self {
            ingredient,
            quantity,
        }
    }
}

/// A reaction tube: volume plus the ingredients added to it, in order
#[derive(Debug, Clone)]
pub struct Solution {
    pub id: String,
    /// Volume in microlitres
    pub volume: f64,
    ingredient_quantities: Vec<IngredientQuantity>,
    polymerase_activity: f64,
}

impl Solution {
    pub fn new(id: &str, volume: f64) -> Self {
        Self {
            id: id.to_string(),
            volume,
            ingredient_quantities: Vec::new(),
            polymerase_activity: 100.0,
        }
    }

    pub fn add_ingredient(&mut self, ingredient: Ingredient, quantity: f64) {
        self.ingredient_quantities
            .push(IngredientQuantity::new(ingredient, quantity));
    }

    pub fn ingredient_quantities(&self) -> &[IngredientQuantity] {
        &self.ingredient_quantities
    }

    pub fn templates(&self) -> Vec<&IngredientQuantity> {
        self.ingredient_quantities
            .iter()
            .filter(|iq| iq.ingredient.is_template())
            .collect()
    }

    pub fn primers(&self) -> Vec<&IngredientQuantity> {
        self.ingredient_quantities
            .iter()
            .filter(|iq| iq.ingredient.is_primer())
            .collect()
    }

    /// Molar concentration of `quantity` picomoles in this solution
    pub fn concentration(&self, quantity: f64) -> f64 {
        if self.volume > 0.0 {
            quantity * PICOMOLE / (self.volume * MICROLITRE)
        } else {
            0.0
        }
    }

    /// Molar concentration of each primer, keyed by primer id.
    ///
    /// Repeated additions of the same primer accumulate.
    pub fn primer_concentrations(&self) -> BTreeMap<String, f64> {
        let mut concentrations = BTreeMap::new();
        for iq in self.primers() {
            *concentrations
                .entry(iq.ingredient.id().to_string())
                .or_insert(0.0) += self.concentration(iq.quantity);
        }
        concentrations
    }

    /// Polymerase activity in percent of nominal
    pub fn dna_polymerase_activity(&self) -> f64 {
        self.polymerase_activity
    }

    pub fn set_dna_polymerase_activity(&mut self, activity: f64) {
        self.polymerase_activity = activity.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction() -> Solution {
        let mut solution = Solution::new("tube1", 10.0);
        solution.add_ingredient(Ingredient::template("pUC19", "ACGTACGTAA").unwrap(), 0.001);
        solution.add_ingredient(Ingredient::primer("acgtac").unwrap(), 5.0);
        solution.add_ingredient(Ingredient::named_primer("rev", "TTACGT").unwrap(), 2.0);
        solution
    }

    #[test]
    fn test_roles() {
        let solution = reaction();
        let primers = solution.primers();
        let templates = solution.templates();
        assert_eq!(primers.len(), 2);
        assert_eq!(templates.len(), 1);
        assert_eq!(primers[0].ingredient.id(), "ACGTAC");
        assert_eq!(primers[1].ingredient.id(), "rev");
        assert_eq!(templates[0].ingredient.id(), "pUC19");
    }

    #[test]
    fn test_negative_quantity_clamped() {
        let iq = IngredientQuantity::new(Ingredient::primer("ACGT").unwrap(), -3.0);
        assert_eq!(iq.quantity, 0.0);
        let iq = IngredientQuantity::new(Ingredient::primer("ACGT").unwrap(), f64::NAN);
        assert_eq!(iq.quantity, 0.0);
    }

    #[test]
    fn test_primer_concentrations() {
        let mut solution = reaction();
        // 5 pmol in 10 ul is 0.5 uM
        let conc = solution.primer_concentrations();
        assert!((conc["ACGTAC"] - 0.5e-6).abs() < 1e-15);
        assert!((conc["rev"] - 0.2e-6).abs() < 1e-15);

        solution.add_ingredient(Ingredient::primer("ACGTAC").unwrap(), 5.0);
        let conc = solution.primer_concentrations();
        assert!((conc["ACGTAC"] - 1.0e-6).abs() < 1e-15);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let solution = reaction();
        let ids: Vec<&str> = solution
            .ingredient_quantities()
            .iter()
            .map(|iq| iq.ingredient.id())
            .collect();
        assert_eq!(ids, vec!["pUC19", "ACGTAC", "rev"]);
    }

    #[test]
    fn test_zero_volume() {
        let solution = Solution::new("empty", 0.0);
        assert_eq!(solution.concentration(1.0), 0.0);
    }
}
