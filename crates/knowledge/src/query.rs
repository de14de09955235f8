//! Retrieval query construction from classifier verdicts.
//!
//! The query only steers retrieval toward impact, procedure and threshold
//! material for the detected defect. It makes no maintenance decisions.

use panelkb_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// One ranked class prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// Structured classifier output.
///
/// Accepts the classifier's native field names (`primary_defect`,
/// `top_predictions`, `panel_id`) as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    /// Predicted defect class
    #[serde(alias = "primary_defect")]
    pub label: String,

    /// Confidence of the predicted class, in [0, 1]
    pub confidence: f64,

    /// Ranked predictions, best first
    #[serde(default, alias = "top_predictions")]
    pub top_k_predictions: Vec<Prediction>,

    /// Identifier of the inspected panel
    #[serde(default, alias = "panel_id", skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Verdict {
    /// Verdict with a single prediction matching the label.
    pub fn from_label(label: impl Into<String>, confidence: f64) -> Self {
        let label = label.into();
        Self {
            top_k_predictions: vec![Prediction {
                label: label.clone(),
                score: confidence,
            }],
            label,
            confidence,
            entity_id: None,
        }
    }

    /// Parse and validate a verdict from JSON.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let verdict: Self = serde_json::from_str(json)
            .map_err(|e| AppError::Query(format!("Invalid verdict: {}", e)))?;
        verdict.validate()?;
        Ok(verdict)
    }

    /// Check label and score ranges.
    pub fn validate(&self) -> AppResult<()> {
        if self.label.trim().is_empty() {
            return Err(AppError::Query("Verdict label is empty".to_string()));
        }

        check_probability("confidence", self.confidence)?;

        for prediction in &self.top_k_predictions {
            if prediction.label.trim().is_empty() {
                return Err(AppError::Query("Prediction label is empty".to_string()));
            }
            check_probability(&format!("score of '{}'", prediction.label), prediction.score)?;
        }

        Ok(())
    }
}

fn check_probability(what: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AppError::Query(format!(
            "Verdict {} must be within [0, 1], got {}",
            what, value
        )));
    }
    Ok(())
}

/// Fixed parts of a retrieval query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    /// First line of every query
    pub domain_tag: String,

    /// Lines appended after the verdict fields
    pub boost_phrases: Vec<String>,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self {
            domain_tag: "solar panel defect knowledge".to_string(),
            boost_phrases: vec![
                "impact and risk".to_string(),
                "maintenance SOP".to_string(),
                "decision thresholds".to_string(),
                "cleaning isolation replacement criteria".to_string(),
            ],
        }
    }
}

impl QueryTemplate {
    /// Serialize a verdict into a newline-joined query.
    ///
    /// Identical verdicts always produce byte-identical queries.
    pub fn build(&self, verdict: &Verdict) -> String {
        let top = verdict
            .top_k_predictions
            .iter()
            .map(|p| format!("{} ({})", p.label, p.score))
            .collect::<Vec<_>>()
            .join(", ");

        let mut lines = vec![
            self.domain_tag.clone(),
            format!("primary_defect: {}", verdict.label),
            format!("confidence: {}", verdict.confidence),
            format!("top_predictions: {}", top),
        ];

        if let Some(id) = &verdict.entity_id {
            lines.push(format!("panel_id: {}", id));
        }

        lines.extend(self.boost_phrases.iter().cloned());
        lines.join("\n")
    }
}

/// Build a query with the default solar-panel template.
pub fn build_query(verdict: &Verdict) -> String {
    QueryTemplate::default().build(verdict)
}
