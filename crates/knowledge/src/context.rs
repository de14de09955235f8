//! Rendering retrieved chunks as an annotated context block.

use crate::types::RetrievedChunk;
use panelkb_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Returned instead of an empty string when nothing was retrieved.
pub const NO_KNOWLEDGE_SENTINEL: &str = "No relevant knowledge retrieved.";

const RULE_WIDTH: usize = 80;
const FOOTER_TITLE: &str = "END OF RETRIEVED KNOWLEDGE BASE";

/// Display label of a score band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    High,
    Relevant,
    Low,
}

impl Relevance {
    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "Highly Relevant",
            Self::Relevant => "Relevant",
            Self::Low => "Low Relevance",
        }
    }
}

/// Score thresholds for the relevance labels.
///
/// A score strictly above `high` is High, strictly above `relevant` is
/// Relevant, anything else is Low. Labels are display only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceBands {
    pub high: f32,
    pub relevant: f32,
}

impl Default for RelevanceBands {
    fn default() -> Self {
        Self {
            high: 0.7,
            relevant: 0.5,
        }
    }
}

impl RelevanceBands {
    pub fn new(high: f32, relevant: f32) -> AppResult<Self> {
        if !(0.0..=1.0).contains(&relevant) || !(0.0..=1.0).contains(&high) || relevant > high {
            return Err(AppError::Config(format!(
                "Relevance thresholds must satisfy 0 <= relevant ({}) <= high ({}) <= 1",
                relevant, high
            )));
        }
        Ok(Self { high, relevant })
    }

    pub fn classify(&self, score: f32) -> Relevance {
        if score > self.high {
            Relevance::High
        } else if score > self.relevant {
            Relevance::Relevant
        } else {
            Relevance::Low
        }
    }
}

/// Render chunks in the order given, one numbered block per chunk.
///
/// Chunks are neither re-sorted nor deduplicated. An empty slice yields
/// [`NO_KNOWLEDGE_SENTINEL`].
pub fn format_context(chunks: &[RetrievedChunk], bands: &RelevanceBands) -> String {
    if chunks.is_empty() {
        return NO_KNOWLEDGE_SENTINEL.to_string();
    }

    let rule = "=".repeat(RULE_WIDTH);

    let blocks: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "{rule}\nCONTEXT {} | Source: {} | Relevance: {} (Score: {:.4})\n{rule}\n{}",
                i + 1,
                chunk.source(),
                bands.classify(chunk.score).label(),
                chunk.score,
                chunk.text,
                rule = rule
            )
        })
        .collect();

    format!(
        "{}\n\n{rule}\n{}\n{rule}",
        blocks.join("\n\n"),
        FOOTER_TITLE,
        rule = rule
    )
}
