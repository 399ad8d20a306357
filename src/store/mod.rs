// Document store module
// Loads the troubleshooting knowledge base that the vector index is built from


use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Structured remediation payload for one troubleshooting entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// One-line summary of the issue being fixed
    pub summary: String,
    /// Ordered remediation steps
    pub steps: Vec<String>,
    /// Optional external references (KB articles, vendor docs)
    #[serde(default)]
    pub references: Vec<String>,
}

/// One troubleshooting record in the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub problem_text: String,
    pub solution: Solution,
    #[serde(default)]
    pub device_category: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub error_codes: Vec<String>,
}

impl Entry {
    /// The text that gets embedded for this entry. Combines the problem
    /// description with the coarse classification fields so that queries
    /// mentioning a device or an error code land near the right entries.
    #[inline]
    pub fn document_text(&self) -> String {
        let mut text = String::new();

        if let Some(category) = &self.device_category {
            text.push_str(category);
            text.push('\n');
        }

        text.push_str("Problem: ");
        text.push_str(&self.problem_text);

        if let Some(symptoms) = &self.symptoms {
            text.push_str("\nSymptoms: ");
            text.push_str(symptoms);
        }

        if !self.error_codes.is_empty() {
            text.push_str("\nError codes: ");
            text.push_str(&self.error_codes.join(", "));
        }

        text
    }
}

/// Raw on-disk corpus record. Field names follow the knowledge base export
/// format; missing ids are generated on load.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    problem_text: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    solution_steps: Vec<String>,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    device_category: Option<String>,
    #[serde(default)]
    symptoms: Option<String>,
    #[serde(default)]
    error_codes: Vec<String>,
}

/// The corpus of troubleshooting entries used to build the vector index
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<Entry>,
}

impl KnowledgeBase {
    #[inline]
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Load the knowledge base from a JSON file containing an array of
    /// troubleshooting records. Records without an id get a generated one.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading knowledge base from {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base file: {}", path.display()))?;

        let records: Vec<RawRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse knowledge base file: {}", path.display()))?;

        let total = records.len();
        let entries: Vec<Entry> = records.into_iter().map(Self::convert_record).collect();

        let empty = entries
            .iter()
            .filter(|e| e.problem_text.trim().is_empty())
            .count();
        if empty > 0 {
            warn!(
                "Knowledge base contains {} entries without problem text; index build will reject them",
                empty
            );
        }

        info!(
            "Loaded {} troubleshooting entries from {}",
            total,
            path.display()
        );

        Ok(Self { entries })
    }

    fn convert_record(record: RawRecord) -> Entry {
        let summary = record
            .summary
            .unwrap_or_else(|| record.problem_text.clone());

        Entry {
            id: record
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            problem_text: record.problem_text,
            solution: Solution {
                summary,
                steps: record.solution_steps,
                references: record.references,
            },
            device_category: record.device_category,
            symptoms: record.symptoms,
            error_codes: record.error_codes,
        }
    }

    /// All entries in the corpus, in file order
    #[inline]
    pub fn list_entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct device categories present in the corpus
    #[inline]
    pub fn device_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.device_category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}
