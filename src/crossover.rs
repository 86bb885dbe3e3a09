//! Crossover operator.
//!
//! Directives are treated as ordered lists of sections (paragraphs
//! delimited by blank lines). For each section index up to the longer
//! parent's length, the child takes that index's section from a uniformly
//! chosen parent; an index the chosen parent lacks contributes nothing.
//! Sections are copied whole - never blended internally - so every line
//! of a child is traceable to exactly one parent.

use regex::Regex;

use crate::random::SeededRng;

/// The section-level uniform crossover operator.
#[derive(Debug)]
pub struct CrossoverOperator {
    section_delimiter: Regex,
}

impl Default for CrossoverOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossoverOperator {
    /// Create the operator.
    pub fn new() -> Self {
        Self {
            section_delimiter: Regex::new(r"\n\s*\n").expect("Invalid section delimiter pattern"),
        }
    }

    /// Split a directive into its sections.
    pub fn sections<'a>(&self, directive: &'a str) -> Vec<&'a str> {
        self.section_delimiter
            .split(directive)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Combine two parent directives into one child.
    pub fn crossover(&self, rng: &mut SeededRng, parent1: &str, parent2: &str) -> String {
        let sections1 = self.sections(parent1);
        let sections2 = self.sections(parent2);
        let span = sections1.len().max(sections2.len());

        let mut child_sections: Vec<&str> = Vec::with_capacity(span);
        for index in 0..span {
            let chosen = if rng.roll(0.5) {
                sections1.get(index)
            } else {
                sections2.get(index)
            };
            // The chosen parent may be shorter than the span; skip the gap.
            if let Some(section) = chosen {
                child_sections.push(section);
            }
        }

        child_sections.join("\n\n")
    }
}
