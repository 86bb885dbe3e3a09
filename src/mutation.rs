//! Mutation operator library.
//!
//! A fixed catalog of eight named strategies, each with its own bank of
//! templated clauses. [`MutationOperator::mutate`] rolls every strategy
//! independently at the given rate; each triggered strategy appends one
//! randomly chosen clause from its bank to the end of the directive.
//!
//! Mutation is **strictly additive**: existing text is never removed or
//! rewritten, so directive length is non-decreasing across generations.
//! This keeps every ancestor's traits legible in the genome at the cost of
//! unbounded growth over long runs - callers running many generations
//! should cap run length or periodically re-seed from a curated best
//! directive.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::random::SeededRng;

// =============================================================================
// STRATEGY CATALOG
// =============================================================================

/// The eight mutation strategies.
///
/// Each strategy targets one behavioral axis of a directive and owns a
/// fixed phrase bank of additive clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStrategy {
    /// Tone and persona adjustments.
    Personality,
    /// Claimed abilities and coverage.
    Capability,
    /// Formatting and register of answers.
    CommunicationStyle,
    /// How the directive asks the model to think.
    ReasoningApproach,
    /// Encouragement of novel phrasing and ideas.
    Creativity,
    /// Guardrails and refusal behavior.
    Safety,
    /// Domain focus.
    TaskSpecialization,
    /// Reading and mirroring the user's state.
    EmotionalIntelligence,
}

impl MutationStrategy {
    /// All strategies, in catalog order.
    pub fn all() -> [Self; 8] {
        [
            Self::Personality,
            Self::Capability,
            Self::CommunicationStyle,
            Self::ReasoningApproach,
            Self::Creativity,
            Self::Safety,
            Self::TaskSpecialization,
            Self::EmotionalIntelligence,
        ]
    }

    /// Short label used in mutation descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Personality => "personality",
            Self::Capability => "capability",
            Self::CommunicationStyle => "communication-style",
            Self::ReasoningApproach => "reasoning-approach",
            Self::Creativity => "creativity",
            Self::Safety => "safety",
            Self::TaskSpecialization => "task-specialization",
            Self::EmotionalIntelligence => "emotional-intelligence",
        }
    }

    /// The fixed clause bank for this strategy.
    pub fn phrase_bank(&self) -> &'static [&'static str] {
        match self {
            Self::Personality => PERSONALITY_CLAUSES,
            Self::Capability => CAPABILITY_CLAUSES,
            Self::CommunicationStyle => COMMUNICATION_STYLE_CLAUSES,
            Self::ReasoningApproach => REASONING_APPROACH_CLAUSES,
            Self::Creativity => CREATIVITY_CLAUSES,
            Self::Safety => SAFETY_CLAUSES,
            Self::TaskSpecialization => TASK_SPECIALIZATION_CLAUSES,
            Self::EmotionalIntelligence => EMOTIONAL_INTELLIGENCE_CLAUSES,
        }
    }
}

impl std::fmt::Display for MutationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// =============================================================================
// PHRASE BANKS
// =============================================================================

const PERSONALITY_CLAUSES: &[&str] = &[
    "Maintain a warm and approachable tone throughout your responses.",
    "Be direct and confident when presenting conclusions.",
    "Show genuine curiosity about the topics users bring up.",
    "Keep a calm, measured voice even when the question is urgent.",
    "Let a light sense of humor surface where it fits naturally.",
];

const CAPABILITY_CLAUSES: &[&str] = &[
    "Draw on broad cross-domain knowledge when forming answers.",
    "Offer concrete examples whenever an abstract point needs grounding.",
    "Summarize long or complex material before diving into detail.",
    "Suggest relevant follow-up questions the user may not have considered.",
    "Acknowledge the limits of your knowledge instead of guessing.",
];

const COMMUNICATION_STYLE_CLAUSES: &[&str] = &[
    "Structure longer answers with short paragraphs or bullet lists.",
    "Lead with the direct answer before giving supporting context.",
    "Prefer plain language over jargon; define terms you must use.",
    "Keep sentences short and scannable.",
    "Close complex answers with a one-line summary.",
];

const REASONING_APPROACH_CLAUSES: &[&str] = &[
    "Reason through problems step by step before answering.",
    "State your assumptions explicitly when the question is ambiguous.",
    "Compare at least two alternatives before recommending one.",
    "Check conclusions against the original question before finishing.",
    "Quantify uncertainty when the evidence is incomplete.",
];

const CREATIVITY_CLAUSES: &[&str] = &[
    "Offer an unexpected angle or analogy when it clarifies the idea.",
    "Vary your phrasing; avoid repeating stock sentences.",
    "Propose at least one unconventional option alongside the safe ones.",
    "Use vivid, concrete imagery when describing abstract concepts.",
    "Experiment with format when it serves the content.",
];

const SAFETY_CLAUSES: &[&str] = &[
    "Decline requests for harmful or dangerous content and explain why.",
    "Flag medical, legal, or financial topics as needing professional advice.",
    "Avoid speculation presented as fact; label opinions clearly.",
    "Consider the well-being of the user when wording difficult answers.",
    "Never reveal private or personally identifying information.",
];

const TASK_SPECIALIZATION_CLAUSES: &[&str] = &[
    "Prioritize technical accuracy when answering engineering questions.",
    "Tailor depth to the apparent expertise level of the user.",
    "When asked for code, provide runnable, idiomatic examples.",
    "For how-to questions, give numbered steps in execution order.",
    "Treat data questions quantitatively; show the arithmetic.",
];

const EMOTIONAL_INTELLIGENCE_CLAUSES: &[&str] = &[
    "Acknowledge frustration or confusion before correcting a misunderstanding.",
    "Mirror the user's level of formality.",
    "Celebrate user progress on multi-step tasks.",
    "Soften disagreement; critique the idea, not the person.",
    "Check in on whether your answer actually addressed the need.",
];

// =============================================================================
// APPLIED MUTATION
// =============================================================================

/// Record of one strategy firing during a mutation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedMutation {
    /// The strategy that fired.
    pub strategy: MutationStrategy,

    /// The clause appended to the directive.
    pub clause: String,
}

impl AppliedMutation {
    /// Human-readable description stored on the offspring individual.
    pub fn description(&self) -> String {
        format!("{}: appended \"{}\"", self.strategy.label(), self.clause)
    }
}

/// Result of one mutation pass: the (possibly longer) directive plus the
/// ordered list of strategies that fired.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The mutated directive text.
    pub directive: String,

    /// Strategies that fired, in catalog order.
    pub applied: Vec<AppliedMutation>,
}

impl MutationOutcome {
    /// Descriptions of the applied mutations, for lineage records.
    pub fn descriptions(&self) -> Vec<String> {
        self.applied.iter().map(AppliedMutation::description).collect()
    }
}

// =============================================================================
// OPERATOR
// =============================================================================

/// The additive mutation operator.
#[derive(Debug, Clone, Default)]
pub struct MutationOperator;

impl MutationOperator {
    /// Create the operator.
    pub fn new() -> Self {
        Self
    }

    /// Roll every strategy independently at `rate`; each triggered
    /// strategy appends one clause from its bank. The input text is
    /// always a prefix of the output text.
    pub fn mutate(&self, rng: &mut SeededRng, directive: &str, rate: f64) -> MutationOutcome {
        let mut mutated = directive.to_string();
        let mut applied = Vec::new();

        for strategy in MutationStrategy::all() {
            if !rng.roll(rate) {
                continue;
            }
            let clause = *rng.pick(strategy.phrase_bank());
            if !mutated.is_empty() {
                mutated.push(' ');
            }
            mutated.push_str(clause);
            applied.push(AppliedMutation {
                strategy,
                clause: clause.to_string(),
            });
        }

        if !applied.is_empty() {
            debug!(
                "mutation applied {} strategies ({} -> {} chars)",
                applied.len(),
                directive.len(),
                mutated.len()
            );
        }

        MutationOutcome {
            directive: mutated,
            applied,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_eight_strategies() {
        assert_eq!(MutationStrategy::all().len(), 8);
    }

    #[test]
    fn test_every_bank_nonempty() {
        for strategy in MutationStrategy::all() {
            assert!(
                !strategy.phrase_bank().is_empty(),
                "{} bank is empty",
                strategy
            );
        }
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let operator = MutationOperator::new();
        let mut rng = SeededRng::new(1);
        let outcome = operator.mutate(&mut rng, "Base directive.", 0.0);
        assert_eq!(outcome.directive, "Base directive.");
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_full_rate_fires_all_strategies() {
        let operator = MutationOperator::new();
        let mut rng = SeededRng::new(2);
        let outcome = operator.mutate(&mut rng, "Base directive.", 1.0);
        assert_eq!(outcome.applied.len(), 8);

        // Catalog order is preserved in the applied list.
        let strategies: Vec<MutationStrategy> =
            outcome.applied.iter().map(|a| a.strategy).collect();
        assert_eq!(strategies, MutationStrategy::all().to_vec());
    }

    #[test]
    fn test_mutation_is_additive() {
        let operator = MutationOperator::new();
        let mut rng = SeededRng::new(3);
        let original = "You are a helpful assistant.";
        for _ in 0..50 {
            let outcome = operator.mutate(&mut rng, original, 0.5);
            assert!(outcome.directive.len() >= original.len());
            assert!(outcome.directive.starts_with(original));
        }
    }

    #[test]
    fn test_applied_clause_comes_from_own_bank() {
        let operator = MutationOperator::new();
        let mut rng = SeededRng::new(4);
        let outcome = operator.mutate(&mut rng, "Base.", 1.0);
        for applied in &outcome.applied {
            assert!(applied
                .strategy
                .phrase_bank()
                .contains(&applied.clause.as_str()));
        }
    }

    #[test]
    fn test_descriptions_name_the_strategy() {
        let operator = MutationOperator::new();
        let mut rng = SeededRng::new(5);
        let outcome = operator.mutate(&mut rng, "Base.", 1.0);
        let descriptions = outcome.descriptions();
        assert_eq!(descriptions.len(), 8);
        assert!(descriptions[0].starts_with("personality:"));
    }

    #[test]
    fn test_seeded_mutation_reproducible() {
        let operator = MutationOperator::new();
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        let out_a = operator.mutate(&mut a, "Seed.", 0.5);
        let out_b = operator.mutate(&mut b, "Seed.", 0.5);
        assert_eq!(out_a.directive, out_b.directive);
    }
}
