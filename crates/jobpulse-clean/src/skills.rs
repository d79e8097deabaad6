//! Thin gateway around the external skill tagger, plus the seed vocabulary
//! loader used to pre-populate the skill dimension.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use jobpulse_core::{CleanRecord, SkillsByUrl};

use crate::location::contains_phrase;

/// The skill tagger contract: pure text in, display-cased skill names out.
pub trait SkillExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;
}

impl<F> SkillExtractor for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn extract(&self, text: &str) -> Vec<String> {
        self(text)
    }
}

/// Wraps any extractor and produces per-URL skill lists for a cleaned batch.
///
/// Output is trimmed and case-insensitively deduplicated; the extractor's
/// casing of the first occurrence is kept as the display form.
pub struct SkillGateway {
    extractor: Arc<dyn SkillExtractor>,
}

impl SkillGateway {
    pub fn new(extractor: Arc<dyn SkillExtractor>) -> Self {
        Self { extractor }
    }

    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut seen = Vec::<String>::new();
        let mut out = Vec::new();
        for skill in self.extractor.extract(text) {
            let skill = skill.trim().to_string();
            if skill.is_empty() {
                continue;
            }
            let lower = skill.to_lowercase();
            if seen.contains(&lower) {
                continue;
            }
            seen.push(lower);
            out.push(skill);
        }
        out
    }

    pub fn extract_for_batch(&self, records: &[CleanRecord]) -> SkillsByUrl {
        records
            .iter()
            .map(|record| (record.url.clone(), self.extract(&record.description)))
            .collect()
    }
}

/// Keyword matcher over a fixed vocabulary; word-bounded so "java" does not
/// fire inside "javascript". Serves as the bundled default extractor.
pub struct VocabExtractor {
    skills: Vec<String>,
}

impl VocabExtractor {
    pub fn new(skills: Vec<String>) -> Self {
        Self { skills }
    }

    pub fn from_seed(seed: &BTreeMap<String, Vec<String>>) -> Self {
        Self::new(seed.values().flatten().cloned().collect())
    }
}

impl SkillExtractor for VocabExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.skills
            .iter()
            .filter(|skill| contains_phrase(&haystack, &skill.to_lowercase()))
            .cloned()
            .collect()
    }
}

/// Load a category -> skill-names seed vocabulary from a JSON file.
pub fn load_skill_seed(path: impl AsRef<Path>) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// The seed vocabulary that ships with the crate.
pub fn default_skill_seed() -> BTreeMap<String, Vec<String>> {
    serde_json::from_str(include_str!("skill_seed.json")).expect("embedded skill seed is valid")
}

/// Turn a seed category key into its stored label:
/// "programming_languages" -> "Programming Languages".
pub fn category_label(raw: &str) -> String {
    raw.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
