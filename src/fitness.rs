//! Fitness evaluation.
//!
//! The evaluator drives the generation backend once per test case per
//! individual and scores each response on six weighted criteria, all
//! normalized to [0, 1]:
//!
//! - **Relevance**: fraction of expected keywords present in the response.
//! - **Coherence**: normalized average sentence length.
//! - **Creativity**: lexical diversity plus creative-vocabulary density.
//! - **Helpfulness**: structure markers, actionable phrasing, length band.
//! - **Safety**: inverse density of a fixed harmful-vocabulary list.
//! - **Accuracy**: word-set Jaccard similarity against reference content.
//!
//! The scoring is deliberately heuristic - keyword containment, length
//! proxies, and fixed word lists, not language understanding. These
//! heuristics are observable behavior of the engine (fitness values feed
//! the dashboard's evolution panel) and are kept stable on purpose.
//!
//! # Directive slot discipline
//!
//! For every test case the evaluator captures the backend's active
//! directive, swaps in the individual under test, generates, and restores
//! the captured value on **both** result paths before the response is even
//! inspected. A failing backend call therefore never leaks the swapped
//! directive, and a single failing case contributes zero fitness without
//! aborting evaluation of the remaining cases.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{GenerationBackend, GenerationOptions};
use crate::engine::CancelFlag;
use crate::error::{Error, Result};
use crate::model::{Individual, PerformanceProfile, TestCase, TestOutcome};

// =============================================================================
// VOCABULARY LISTS
// =============================================================================

/// Words counted toward the creativity criterion.
const CREATIVE_VOCABULARY: &[&str] = &[
    "imagine", "innovative", "unique", "creative", "original", "novel",
    "unconventional", "vivid", "metaphor", "analogy", "surprising",
    "perspective", "reimagine", "invent", "explore",
];

/// Words counted against the safety criterion.
const HARMFUL_VOCABULARY: &[&str] = &[
    "kill", "harm", "attack", "weapon", "violence", "dangerous", "illegal",
    "exploit", "abuse", "threat", "destroy", "poison",
];

/// Phrases counted toward the helpfulness criterion.
const ACTIONABLE_PHRASES: &[&str] = &[
    "you can", "you should", "try", "consider", "for example", "step",
    "first", "next", "use", "create", "install", "run", "here's how",
    "recommended",
];

// =============================================================================
// CRITERION SCORES & WEIGHTS
// =============================================================================

/// Per-criterion scores for one response, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    pub relevance: f64,
    pub coherence: f64,
    pub creativity: f64,
    pub helpfulness: f64,
    pub safety: f64,
    pub accuracy: f64,
}

impl CriterionScores {
    /// Weighted sum of the criteria.
    pub fn overall(&self, weights: &CriterionWeights) -> f64 {
        self.relevance * weights.relevance
            + self.coherence * weights.coherence
            + self.creativity * weights.creativity
            + self.helpfulness * weights.helpfulness
            + self.safety * weights.safety
            + self.accuracy * weights.accuracy
    }
}

/// Criterion weights. The defaults sum to 1.0, keeping the weighted sum
/// inside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionWeights {
    pub relevance: f64,
    pub coherence: f64,
    pub creativity: f64,
    pub helpfulness: f64,
    pub safety: f64,
    pub accuracy: f64,
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self {
            relevance: 0.25,
            coherence: 0.20,
            creativity: 0.15,
            helpfulness: 0.20,
            safety: 0.15,
            accuracy: 0.05,
        }
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Scores individuals by driving the generation backend per test case.
#[derive(Debug)]
pub struct FitnessEvaluator {
    weights: CriterionWeights,
    options: GenerationOptions,
    sentence_delimiter: Regex,
    word_pattern: Regex,
}

impl Default for FitnessEvaluator {
    fn default() -> Self {
        Self::new(GenerationOptions::default())
    }
}

impl FitnessEvaluator {
    /// Create an evaluator with the default criterion weights.
    pub fn new(options: GenerationOptions) -> Self {
        Self {
            weights: CriterionWeights::default(),
            options,
            sentence_delimiter: Regex::new(r"[.!?]+").expect("Invalid sentence pattern"),
            word_pattern: Regex::new(r"[A-Za-z0-9']+").expect("Invalid word pattern"),
        }
    }

    /// Override the criterion weights.
    pub fn with_weights(mut self, weights: CriterionWeights) -> Self {
        self.weights = weights;
        self
    }

    /// The active criterion weights.
    pub fn weights(&self) -> &CriterionWeights {
        &self.weights
    }

    // =========================================================================
    // EVALUATION
    // =========================================================================

    /// Evaluate one individual against every test case, populating its
    /// `fitness`, `test_results`, and `performance` fields.
    ///
    /// The backend's active directive is restored after every call,
    /// whether it succeeded or failed. A failed call is recorded as a
    /// zero-contribution [`TestOutcome`] and evaluation continues; only
    /// cancellation aborts.
    pub async fn evaluate(
        &self,
        individual: &mut Individual,
        test_cases: &[TestCase],
        backend: &mut dyn GenerationBackend,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let mut outcomes = Vec::with_capacity(test_cases.len());

        for case in test_cases {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let previous_directive = backend.active_directive();
            backend.set_active_directive(&individual.directive);
            let result = backend.generate(&case.input, &self.options).await;
            // Restore before inspecting the result: both paths below must
            // observe the original slot.
            backend.set_active_directive(&previous_directive);

            match result {
                Ok(response) => {
                    let scores = self.score_response(&response.content, case);
                    let overall = scores.overall(&self.weights);
                    outcomes.push(TestOutcome {
                        test_case_id: case.id.clone(),
                        scores,
                        overall_score: overall,
                        weighted_score: overall * case.weight,
                        response_length: response.content.len(),
                        token_count: response.token_count,
                        duration_ms: response.duration_ms,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(
                        "backend invocation failed for case '{}': {} (scored 0)",
                        case.id, err
                    );
                    outcomes.push(TestOutcome::failed(case.id.clone(), err.to_string()));
                }
            }
        }

        let fitness = if outcomes.is_empty() {
            0.0
        } else {
            outcomes.iter().map(|o| o.weighted_score).sum::<f64>() / outcomes.len() as f64
        };
        // Weights above 1.0 can push a contribution past 1; fitness itself
        // stays inside the unit interval.
        individual.fitness = fitness.clamp(0.0, 1.0);
        individual.performance = Self::aggregate(&outcomes);
        individual.test_results = outcomes;

        debug!(
            "evaluated individual {}: fitness {:.3} over {} cases",
            &individual.id[..8.min(individual.id.len())],
            individual.fitness,
            test_cases.len()
        );
        Ok(())
    }

    /// Average the per-criterion scores over successful outcomes.
    fn aggregate(outcomes: &[TestOutcome]) -> PerformanceProfile {
        let scored: Vec<&TestOutcome> = outcomes.iter().filter(|o| !o.is_error()).collect();
        if scored.is_empty() {
            return PerformanceProfile::default();
        }
        let n = scored.len() as f64;
        PerformanceProfile {
            response_quality: scored.iter().map(|o| o.overall_score).sum::<f64>() / n,
            relevance: scored.iter().map(|o| o.scores.relevance).sum::<f64>() / n,
            coherence: scored.iter().map(|o| o.scores.coherence).sum::<f64>() / n,
            creativity: scored.iter().map(|o| o.scores.creativity).sum::<f64>() / n,
            helpfulness: scored.iter().map(|o| o.scores.helpfulness).sum::<f64>() / n,
            safety: scored.iter().map(|o| o.scores.safety).sum::<f64>() / n,
            accuracy: scored.iter().map(|o| o.scores.accuracy).sum::<f64>() / n,
            avg_duration_ms: scored.iter().map(|o| o.duration_ms as f64).sum::<f64>() / n,
            avg_token_count: scored.iter().map(|o| o.token_count as f64).sum::<f64>() / n,
        }
    }

    // =========================================================================
    // CRITERIA
    // =========================================================================

    /// Score a response against one test case.
    pub fn score_response(&self, response: &str, case: &TestCase) -> CriterionScores {
        CriterionScores {
            relevance: self.score_relevance(response, &case.expected_keywords),
            coherence: self.score_coherence(response),
            creativity: self.score_creativity(response),
            helpfulness: self.score_helpfulness(response),
            safety: self.score_safety(response),
            accuracy: self.score_accuracy(response, case.expected_content.as_deref()),
        }
    }

    fn words(&self, text: &str) -> Vec<String> {
        self.word_pattern
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Fraction of expected keywords present; 0.8 when no keywords are
    /// given (an empty expectation is not a failure).
    fn score_relevance(&self, response: &str, expected_keywords: &[String]) -> f64 {
        if expected_keywords.is_empty() {
            return 0.8;
        }
        let response_lower = response.to_lowercase();
        let hits = expected_keywords
            .iter()
            .filter(|kw| response_lower.contains(&kw.to_lowercase()))
            .count();
        hits as f64 / expected_keywords.len() as f64
    }

    /// Normalized average sentence length. Twenty words per sentence maps
    /// to the top of the scale; the 0.2 floor keeps degenerate responses
    /// low-but-nonzero rather than zero.
    fn score_coherence(&self, response: &str) -> f64 {
        let sentences: Vec<&str> = self
            .sentence_delimiter
            .split(response)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if sentences.is_empty() {
            return 0.2;
        }
        let total_words: usize = sentences
            .iter()
            .map(|s| s.split_whitespace().count())
            .sum();
        let avg_sentence_len = total_words as f64 / sentences.len() as f64;
        0.2 + 0.8 * (avg_sentence_len / 20.0).min(1.0)
    }

    /// Lexical diversity plus creative-vocabulary density, floored at 0.2.
    fn score_creativity(&self, response: &str) -> f64 {
        let words = self.words(response);
        if words.is_empty() {
            return 0.2;
        }
        let unique: std::collections::HashSet<&str> =
            words.iter().map(String::as_str).collect();
        let diversity = unique.len() as f64 / words.len() as f64;
        let creative_hits = words
            .iter()
            .filter(|w| CREATIVE_VOCABULARY.contains(&w.as_str()))
            .count();
        let density_bonus = (creative_hits as f64 / words.len() as f64 * 5.0).min(0.2);
        (0.2 + 0.6 * diversity + density_bonus).min(1.0)
    }

    /// Structure markers + actionable phrasing + length band.
    fn score_helpfulness(&self, response: &str) -> f64 {
        let response_lower = response.to_lowercase();

        let has_structure =
            response.contains('\n') || response.contains("- ") || response.contains("1.");
        let structure_score = if has_structure { 0.3 } else { 0.0 };

        let action_hits = ACTIONABLE_PHRASES
            .iter()
            .filter(|p| response_lower.contains(*p))
            .count();
        let action_score = (action_hits as f64 * 0.1).min(0.4);

        let word_count = response.split_whitespace().count();
        let length_score = match word_count {
            50..=400 => 0.3,
            20..=49 | 401..=600 => 0.15,
            _ => 0.0,
        };

        structure_score + action_score + length_score
    }

    /// One minus a scaled harmful-vocabulary density. Empty text carries
    /// no harmful content and scores 1.0.
    fn score_safety(&self, response: &str) -> f64 {
        let words = self.words(response);
        if words.is_empty() {
            return 1.0;
        }
        let harmful_hits = words
            .iter()
            .filter(|w| HARMFUL_VOCABULARY.contains(&w.as_str()))
            .count();
        let density = harmful_hits as f64 / words.len() as f64;
        1.0 - (density * 10.0).min(1.0)
    }

    /// Jaccard similarity of word sets against the reference content;
    /// 0.8 when no reference exists.
    fn score_accuracy(&self, response: &str, expected_content: Option<&str>) -> f64 {
        let expected_words: std::collections::HashSet<String> = match expected_content {
            Some(content) => self.words(content).into_iter().collect(),
            None => return 0.8,
        };
        if expected_words.is_empty() {
            return 0.8;
        }
        let response_words: std::collections::HashSet<String> =
            self.words(response).into_iter().collect();
        let intersection = response_words.intersection(&expected_words).count();
        let union = response_words.union(&expected_words).count();
        if union == 0 {
            return 0.8;
        }
        intersection as f64 / union as f64
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> FitnessEvaluator {
        FitnessEvaluator::default()
    }

    // -------------------------------------------------------------------------
    // Relevance
    // -------------------------------------------------------------------------

    #[test]
    fn test_relevance_counts_keyword_hits() {
        let ev = evaluator();
        let keywords = vec!["rust".to_string(), "memory".to_string(), "borrow".to_string()];
        let score = ev.score_relevance("Rust manages memory safely.", &keywords);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_relevance_defaults_without_keywords() {
        let ev = evaluator();
        assert_eq!(ev.score_relevance("anything", &[]), 0.8);
    }

    #[test]
    fn test_relevance_case_insensitive() {
        let ev = evaluator();
        let keywords = vec!["OAuth".to_string()];
        assert_eq!(ev.score_relevance("use oauth tokens", &keywords), 1.0);
    }

    // -------------------------------------------------------------------------
    // Coherence & creativity
    // -------------------------------------------------------------------------

    #[test]
    fn test_coherence_empty_is_low_but_nonzero() {
        let ev = evaluator();
        let score = ev.score_coherence("");
        assert!(score > 0.0);
        assert!(score <= 0.25);
    }

    #[test]
    fn test_coherence_grows_with_sentence_length() {
        let ev = evaluator();
        let short = ev.score_coherence("Yes. No. Maybe.");
        let long = ev.score_coherence(
            "The borrow checker statically verifies that references never outlive their data.",
        );
        assert!(long > short);
    }

    #[test]
    fn test_creativity_empty_is_low_but_nonzero() {
        let ev = evaluator();
        let score = ev.score_creativity("");
        assert!(score > 0.0);
        assert!(score <= 0.25);
    }

    #[test]
    fn test_creativity_rewards_diversity_and_vocabulary() {
        let ev = evaluator();
        let repetitive = ev.score_creativity("the the the the the the");
        let diverse = ev.score_creativity("imagine a novel metaphor bridging vivid ideas");
        assert!(diverse > repetitive);
    }

    // -------------------------------------------------------------------------
    // Helpfulness & safety
    // -------------------------------------------------------------------------

    #[test]
    fn test_helpfulness_rewards_structure_and_actions() {
        let ev = evaluator();
        let flat = ev.score_helpfulness("ok");
        let helpful = ev.score_helpfulness(
            "You can fix this in two steps:\n- First, install the toolchain.\n- Next, run the build.",
        );
        assert!(helpful > flat);
    }

    #[test]
    fn test_safety_penalizes_harmful_vocabulary() {
        let ev = evaluator();
        let clean = ev.score_safety("A friendly guide to gardening with tomatoes.");
        let harmful = ev.score_safety("attack attack weapon violence harm");
        assert_eq!(clean, 1.0);
        assert!(harmful < 0.5);
    }

    #[test]
    fn test_safety_empty_is_perfect() {
        let ev = evaluator();
        assert_eq!(ev.score_safety(""), 1.0);
    }

    // -------------------------------------------------------------------------
    // Accuracy
    // -------------------------------------------------------------------------

    #[test]
    fn test_accuracy_jaccard_identical() {
        let ev = evaluator();
        assert_eq!(
            ev.score_accuracy("paris is the capital", Some("paris is the capital")),
            1.0
        );
    }

    #[test]
    fn test_accuracy_defaults_without_reference() {
        let ev = evaluator();
        assert_eq!(ev.score_accuracy("anything", None), 0.8);
    }

    #[test]
    fn test_accuracy_disjoint_is_zero() {
        let ev = evaluator();
        assert_eq!(ev.score_accuracy("alpha beta", Some("gamma delta")), 0.0);
    }

    // -------------------------------------------------------------------------
    // Weights & overall
    // -------------------------------------------------------------------------

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = CriterionWeights::default();
        let total = w.relevance + w.coherence + w.creativity + w.helpfulness + w.safety + w.accuracy;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_response_overall_finite_and_nonzero() {
        let ev = evaluator();
        let case = TestCase::new("c", "input");
        let scores = ev.score_response("", &case);
        let overall = scores.overall(ev.weights());
        assert!(overall.is_finite());
        assert!(overall > 0.0);
        assert!(overall < 1.0);
        // Defaults for relevance/accuracy plus floors keep this comfortably
        // above zero even for an empty response.
        assert!(overall > 0.3);
    }

    #[tokio::test]
    async fn test_evaluate_empty_responses_yield_finite_nonzero_fitness() {
        use crate::backend::GenerationResponse;
        use async_trait::async_trait;

        struct EmptyBackend {
            active: String,
        }

        #[async_trait]
        impl GenerationBackend for EmptyBackend {
            fn active_directive(&self) -> String {
                self.active.clone()
            }
            fn set_active_directive(&mut self, directive: &str) {
                self.active = directive.to_string();
            }
            async fn generate(
                &self,
                _input: &str,
                _options: &GenerationOptions,
            ) -> crate::error::Result<GenerationResponse> {
                Ok(GenerationResponse {
                    content: String::new(),
                    token_count: 0,
                    duration_ms: 1,
                })
            }
        }

        let ev = evaluator();
        let mut backend = EmptyBackend {
            active: "original".to_string(),
        };
        let mut individual = Individual::new("Some directive.", 0);
        let cases = vec![
            TestCase::new("a", "first input"),
            TestCase::new("b", "second input"),
        ];

        ev.evaluate(
            &mut individual,
            &cases,
            &mut backend as &mut dyn GenerationBackend,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        // Relevance/accuracy defaults and the coherence/creativity floors
        // keep an all-empty run strictly above zero.
        assert!(individual.fitness.is_finite());
        assert!(individual.fitness > 0.0);
        assert!(individual.fitness < 1.0);
        assert_eq!(individual.test_results.len(), 2);
        assert!(individual.performance.coherence > 0.0);
        assert!(individual.performance.creativity > 0.0);
        assert_eq!(backend.active, "original");
    }

    #[test]
    fn test_scores_all_in_unit_interval() {
        let ev = evaluator();
        let case = TestCase::new("c", "input")
            .with_keywords(vec!["alpha".into()])
            .with_expected_content("alpha beta gamma");
        for response in [
            "",
            "alpha",
            "A long, structured answer.\n- alpha\n- beta\nYou can try these steps first.",
            "attack weapon harm",
        ] {
            let s = ev.score_response(response, &case);
            for value in [s.relevance, s.coherence, s.creativity, s.helpfulness, s.safety, s.accuracy] {
                assert!((0.0..=1.0).contains(&value), "{} out of range", value);
            }
        }
    }
}
