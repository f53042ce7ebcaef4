//! Findings extraction from free-text generations

use crate::domain::AnalysisResult;
use crate::errors::{AppError, Result};
use regex_lite::Regex;

const FINDING_KEYWORDS: [&str; 4] = ["finding", "diagnosis", "condition", "observation"];
const RECOMMENDATION_KEYWORDS: [&str; 4] = ["recommend", "suggest", "action", "follow-up"];

const FALLBACK_FINDING: &str = "Analysis completed - see summary for details";
const FALLBACK_RECOMMENDATION: &str = "Consult with a healthcare provider for interpretation";

const BASE_CONFIDENCE: f64 = 0.5;
const MATCH_BONUS: f64 = 0.2;

/// Turns generated text into a structured result
pub trait FindingsExtractor: Send + Sync {
    fn extract(&self, generated: &str) -> AnalysisResult;
}

/// Sentence-level keyword matcher.
///
/// A sentence can land in both lists. Confidence is a fixed base plus a bonus
/// for each list that matched something, capped at 1.0.
pub struct KeywordExtractor {
    sentence: Regex,
}

impl KeywordExtractor {
    pub fn new() -> Result<Self> {
        // A terminator only ends a sentence before whitespace or end of text
        let sentence = Regex::new(r"(?:[^.!?\n]|[.!?]+[^\s.!?])+[.!?]*").map_err(|e| AppError::Internal {
            message: format!("Invalid sentence pattern: {}", e),
        })?;
        Ok(Self { sentence })
    }

    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.sentence
            .find_iter(text)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn mentions_any(sentence: &str, keywords: &[&str]) -> bool {
    let lower = sentence.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

impl FindingsExtractor for KeywordExtractor {
    fn extract(&self, generated: &str) -> AnalysisResult {
        let summary = generated.trim().to_string();
        let sentences = self.sentences(&summary);

        let mut key_findings: Vec<String> = sentences
            .iter()
            .filter(|s| mentions_any(s, &FINDING_KEYWORDS))
            .map(|s| s.to_string())
            .collect();
        let mut recommendations: Vec<String> = sentences
            .iter()
            .filter(|s| mentions_any(s, &RECOMMENDATION_KEYWORDS))
            .map(|s| s.to_string())
            .collect();

        let mut confidence = BASE_CONFIDENCE;
        if key_findings.is_empty() {
            key_findings.push(FALLBACK_FINDING.to_string());
        } else {
            confidence += MATCH_BONUS;
        }
        if recommendations.is_empty() {
            recommendations.push(FALLBACK_RECOMMENDATION.to_string());
        } else {
            confidence += MATCH_BONUS;
        }

        AnalysisResult {
            summary,
            key_findings,
            recommendations,
            confidence: confidence.min(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> KeywordExtractor {
        KeywordExtractor::new().unwrap()
    }

    #[test]
    fn test_sentence_classification() {
        let result = extractor()
            .extract("Finding: mild inflammation noted. Recommend follow-up in 2 weeks.");
        assert_eq!(result.key_findings, vec!["Finding: mild inflammation noted."]);
        assert_eq!(result.recommendations, vec!["Recommend follow-up in 2 weeks."]);
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_fallbacks_and_base_confidence() {
        let result = extractor().extract("The image is blurry");
        assert_eq!(result.summary, "The image is blurry");
        assert_eq!(result.key_findings, vec![FALLBACK_FINDING]);
        assert_eq!(result.recommendations, vec![FALLBACK_RECOMMENDATION]);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_lines_split_and_case_insensitive() {
        let text = "DIAGNOSIS: sinusitis\nWe suggest saline rinses\nPatient is calm";
        let result = extractor().extract(text);
        assert_eq!(result.key_findings, vec!["DIAGNOSIS: sinusitis"]);
        assert_eq!(result.recommendations, vec!["We suggest saline rinses"]);
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_only_findings() {
        let result = extractor().extract("Observation: stable vitals.");
        assert_eq!(result.recommendations, vec![FALLBACK_RECOMMENDATION]);
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_decimals_stay_in_sentence() {
        let result = extractor().extract("Diagnosis: Hb 11.5 g/dL. Recommend 2.5 mg daily.\nRecheck in 3.5 weeks");
        assert_eq!(result.key_findings, vec!["Diagnosis: Hb 11.5 g/dL."]);
        assert_eq!(result.recommendations, vec!["Recommend 2.5 mg daily."]);
    }
}
