//! FASTA parsing for template sequences

use std::path::Path;

use super::error::{PcrError, Result};
use super::iupac::normalize_sequence;
use super::solution::Ingredient;

/// Ordered template_id -> sequence lookup supplied before simulation
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    ids: Vec<String>,
    sequences: Vec<String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous sequence with the same id
    pub fn insert(&mut self, id: &str, sequence: &str) -> Result<()> {
        let sequence = normalize_sequence(sequence, "template")?;
        match self.ids.iter().position(|existing| existing == id) {
            Some(idx) => self.sequences[idx] = sequence,
            None => {
                self.ids.push(id.to_string());
                self.sequences.push(sequence);
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.ids
            .iter()
            .position(|existing| existing == id)
            .map(|idx| self.sequences[idx].as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Template-role ingredient for a registered id
    pub fn ingredient(&self, id: &str) -> Result<Ingredient> {
        let sequence = self
            .get(id)
            .ok_or_else(|| PcrError::UnknownTemplate(id.to_string()))?;
        Ingredient::template(id, sequence)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Parse a multi-sequence FASTA into a template registry.
///
/// The first word of each header is the template id. Sequence lines are
/// uppercased and may only contain IUPAC nucleotide codes.
pub fn parse_template_fasta(text: &str) -> Result<TemplateRegistry> {
    let mut registry = TemplateRegistry::new();
    let mut current_id: Option<String> = None;
    let mut current_seq = String::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            if let Some(id) = current_id.take() {
                registry.insert(&id, &current_seq)?;
                current_seq.clear();
            }
            let id = header.split_whitespace().next().unwrap_or_default();
            if id.is_empty() {
                return Err(PcrError::InvalidSequence(format!(
                    "FASTA header without an id on line {}",
                    line_no + 1
                )));
            }
            current_id = Some(id.to_string());
        } else if current_id.is_some() {
            current_seq.extend(line.chars().filter(|c| !c.is_whitespace()));
        } else {
            return Err(PcrError::InvalidSequence(format!(
                "sequence data before the first FASTA header on line {}",
                line_no + 1
            )));
        }
    }

    if let Some(id) = current_id {
        registry.insert(&id, &current_seq)?;
    }

    Ok(registry)
}

/// Read and parse a FASTA file of templates
pub fn read_template_fasta(path: &Path) -> Result<TemplateRegistry> {
    let text = std::fs::read_to_string(path)?;
    parse_template_fasta(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_templates() {
        let fasta = ">NC_1 test plasmid\nACGTACGT\nacgt\n>NC_2\nGGGCCC\n";
        let registry = parse_template_fasta(fasta).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("NC_1"), Some("ACGTACGTACGT"));
        assert_eq!(registry.get("NC_2"), Some("GGGCCC"));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["NC_1", "NC_2"]);
    }

    #[test]
    fn test_parse_rejects_invalid_base() {
        let fasta = ">T1\nACGT-ACGT";
        assert!(matches!(
            parse_template_fasta(fasta),
            Err(PcrError::InvalidSequence(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_record() {
        let fasta = ">T1\n>T2\nACGT";
        assert!(matches!(
            parse_template_fasta(fasta),
            Err(PcrError::EmptySequence("template"))
        ));
    }

    #[test]
    fn test_parse_rejects_headerless_data() {
        assert!(parse_template_fasta("ACGT\n>T1\nACGT").is_err());
    }

    #[test]
    fn test_ingredient_lookup() {
        let registry = parse_template_fasta(">pUC19\nACGTTT").unwrap();
        let template = registry.ingredient("pUC19").unwrap();
        assert!(template.is_template());
        assert_eq!(template.sequence(), "ACGTTT");
        assert!(matches!(
            registry.ingredient("pBR322"),
            Err(PcrError::UnknownTemplate(_))
        ));
    }
}
