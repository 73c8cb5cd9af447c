//! Query Understanding: turns a raw query string into language, domain
//! modules, technical register, intent and a normalized keyword set.
//!
//! Pure functions over immutable term tables; no external calls, never
//! fails. Garbage input yields a low-confidence default analysis.

pub mod terms;

use std::collections::HashMap;

use quarry_core::text::terms_of;
use quarry_core::types::{Intent, Language, QueryAnalysis, TechnicalLevel};

use crate::terms::{
    default_intent_terms, default_level_terms, default_module_terms, intent_category,
    intent_from_category, level_from_category, stopwords, TermRow,
};

/// Weighted keyword matcher over one category family. Categories keep
/// registration order; ties favor the first registered.
struct CategoryMatcher {
    categories: Vec<String>,
    index: HashMap<String, Vec<(usize, Option<Language>, f32)>>,
    rows: Vec<TermRow>,
}

impl CategoryMatcher {
    fn new(rows: Vec<TermRow>) -> Self {
        let mut categories: Vec<String> = Vec::new();
        let mut index: HashMap<String, Vec<(usize, Option<Language>, f32)>> = HashMap::new();
        for row in &rows {
            let idx = match categories.iter().position(|c| c == &row.category) {
                Some(i) => i,
                None => {
                    categories.push(row.category.clone());
                    categories.len() - 1
                }
            };
            index
                .entry(row.term.to_lowercase())
                .or_default()
                .push((idx, row.language, row.weight));
        }
        Self { categories, index, rows }
    }

    /// Per-category score mass of the query terms.
    fn scores(&self, query_terms: &[String], language: Language) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.categories.len()];
        for term in query_terms {
            if let Some(entries) = self.index.get(term) {
                for (idx, row_lang, weight) in entries {
                    let applies = match row_lang {
                        None => true,
                        Some(l) => *l == language || language == Language::Unknown,
                    };
                    if applies {
                        scores[*idx] += weight;
                    }
                }
            }
        }
        scores
    }

    /// Winning category and its normalized share of the score mass.
    fn winner(&self, query_terms: &[String], language: Language) -> Option<(&str, f32)> {
        let scores = self.scores(query_terms, language);
        let total: f32 = scores.iter().sum();
        if total <= 0.0 {
            return None;
        }
        // max_by would pick the last of equal scores; scan keeps the first.
        let mut best = 0usize;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        Some((self.categories[best].as_str(), scores[best] / total))
    }

    /// All categories with a positive score, best first, registration
    /// order breaking ties.
    fn ranked(&self, query_terms: &[String], language: Language) -> Vec<(String, f32)> {
        let scores = self.scores(query_terms, language);
        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
            .into_iter()
            .map(|(i, s)| (self.categories[i].clone(), s))
            .collect()
    }

    fn terms_of_category(&self, category: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.category == category)
            .map(|r| r.term.clone())
            .collect()
    }
}

/// The analyzer. Construct once (tables are loaded at startup) and share.
pub struct QueryAnalyzer {
    modules: CategoryMatcher,
    intents: CategoryMatcher,
    levels: CategoryMatcher,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(default_module_terms(), default_intent_terms(), default_level_terms())
    }
}

impl QueryAnalyzer {
    pub fn new(
        module_rows: Vec<TermRow>,
        intent_rows: Vec<TermRow>,
        level_rows: Vec<TermRow>,
    ) -> Self {
        Self {
            modules: CategoryMatcher::new(module_rows),
            intents: CategoryMatcher::new(intent_rows),
            levels: CategoryMatcher::new(level_rows),
        }
    }

    /// Analyze a query (or a chunk of corpus text — the indexing
    /// pipeline reuses the same tagging).
    pub fn analyze(&self, text: &str) -> QueryAnalysis {
        let query_terms = terms_of(text);
        if query_terms.is_empty() {
            return QueryAnalysis::default();
        }

        let language = detect_language(&query_terms);

        let modules: Vec<String> = self
            .modules
            .ranked(&query_terms, language)
            .into_iter()
            .map(|(c, _)| c)
            .collect();

        let intent = self
            .intents
            .winner(&query_terms, language)
            .map_or(Intent::General, |(c, _)| intent_from_category(c));

        let technical_level = self
            .levels
            .winner(&query_terms, language)
            .map_or(TechnicalLevel::Intermediate, |(c, _)| level_from_category(c));

        let keywords = keywords_of(&query_terms, language);

        // Mean of the normalized winning shares of the matchers that
        // scored at all; 0 when nothing matched any table.
        let ratios: Vec<f32> = [
            self.modules.winner(&query_terms, language),
            self.intents.winner(&query_terms, language),
            self.levels.winner(&query_terms, language),
        ]
        .into_iter()
        .flatten()
        .map(|(_, r)| r)
        .collect();
        let confidence = if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().sum::<f32>() / ratios.len() as f32
        };

        QueryAnalysis {
            language,
            modules,
            technical_level,
            intent,
            keywords,
            confidence,
        }
    }

    /// Trigger words of an intent, for the engine's intent bonus.
    pub fn intent_triggers(&self, intent: Intent) -> Vec<String> {
        self.intents.terms_of_category(intent_category(intent))
    }

    /// Vocabulary of one module, for domain-pattern candidate lookup.
    pub fn module_vocabulary(&self, module: &str) -> Vec<String> {
        self.modules.terms_of_category(module)
    }
}

/// Stopword voting between the supported languages; `Unknown` when no
/// stopword of either language appears.
fn detect_language(query_terms: &[String]) -> Language {
    let en_votes = query_terms
        .iter()
        .filter(|t| stopwords(Language::En).contains(&t.as_str()))
        .count();
    let de_votes = query_terms
        .iter()
        .filter(|t| stopwords(Language::De).contains(&t.as_str()))
        .count();
    match (en_votes, de_votes) {
        (0, 0) => Language::Unknown,
        (e, d) if e >= d => Language::En,
        _ => Language::De,
    }
}

/// Query terms minus stopwords, order preserved, first occurrence wins.
fn keywords_of(query_terms: &[String], language: Language) -> Vec<String> {
    let stops = stopwords(language);
    let mut seen = std::collections::HashSet::new();
    query_terms
        .iter()
        .filter(|t| !stops.contains(&t.as_str()))
        .filter(|t| seen.insert(t.as_str().to_string()))
        .cloned()
        .collect()
}
