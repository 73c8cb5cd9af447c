//! Curated term tables driving the category matchers.
//!
//! Rows are `{category, term, language, weight}`; the analyzer loads
//! them into an immutable in-memory index at construction. `None`
//! language means the term applies to any language.

use quarry_core::types::{Intent, Language, TechnicalLevel};

#[derive(Debug, Clone)]
pub struct TermRow {
    pub category: String,
    pub term: String,
    pub language: Option<Language>,
    pub weight: f32,
}

impl TermRow {
    pub fn new(category: &str, term: &str, language: Option<Language>, weight: f32) -> Self {
        Self {
            category: category.to_string(),
            term: term.to_string(),
            language,
            weight,
        }
    }
}

const EN: Option<Language> = Some(Language::En);
const DE: Option<Language> = Some(Language::De);
const ANY: Option<Language> = None;

/// Domain modules of the corpus and their vocabulary.
#[rustfmt::skip]
pub fn default_module_terms() -> Vec<TermRow> {
    [
        ("finance", "invoice", EN, 1.0), ("finance", "payment", EN, 1.0),
        ("finance", "ledger", EN, 1.0), ("finance", "posting", EN, 0.8),
        ("finance", "account", EN, 0.6), ("finance", "fiscal", EN, 0.8),
        ("finance", "rechnung", DE, 1.0), ("finance", "buchung", DE, 1.0),
        ("finance", "konto", DE, 0.8), ("finance", "zahlung", DE, 1.0),
        ("sales", "order", EN, 0.8), ("sales", "quotation", EN, 1.0),
        ("sales", "delivery", EN, 0.8), ("sales", "customer", EN, 0.6),
        ("sales", "pricing", EN, 0.8), ("sales", "auftrag", DE, 1.0),
        ("sales", "angebot", DE, 1.0), ("sales", "kunde", DE, 0.6),
        ("materials", "stock", EN, 0.8), ("materials", "warehouse", EN, 1.0),
        ("materials", "inventory", EN, 1.0), ("materials", "procurement", EN, 1.0),
        ("materials", "goods", EN, 0.6), ("materials", "lager", DE, 1.0),
        ("materials", "bestand", DE, 1.0), ("materials", "material", ANY, 0.6),
        ("hr", "payroll", EN, 1.0), ("hr", "employee", EN, 0.8),
        ("hr", "absence", EN, 0.8), ("hr", "timesheet", EN, 1.0),
        ("hr", "gehalt", DE, 1.0), ("hr", "mitarbeiter", DE, 0.8),
    ]
    .into_iter()
    .map(|(c, t, l, w)| TermRow::new(c, t, l, w))
    .collect()
}

/// Intent trigger words. The engine reuses these for the intent bonus.
#[rustfmt::skip]
pub fn default_intent_terms() -> Vec<TermRow> {
    [
        ("howto", "how", EN, 1.0), ("howto", "steps", EN, 1.0),
        ("howto", "create", EN, 0.8), ("howto", "setup", EN, 0.8),
        ("howto", "configure", EN, 0.8), ("howto", "wie", DE, 1.0),
        ("howto", "anlegen", DE, 0.8), ("howto", "einrichten", DE, 0.8),
        ("error", "error", EN, 1.0), ("error", "failed", EN, 1.0),
        ("error", "exception", EN, 0.8), ("error", "dump", EN, 0.8),
        ("error", "fix", EN, 0.6), ("error", "fehler", DE, 1.0),
        ("error", "abbruch", DE, 0.8),
        ("definition", "what", EN, 0.8), ("definition", "meaning", EN, 1.0),
        ("definition", "definition", EN, 1.0), ("definition", "difference", EN, 0.8),
        ("definition", "was", DE, 0.8), ("definition", "bedeutung", DE, 1.0),
        ("navigation", "where", EN, 1.0), ("navigation", "find", EN, 0.8),
        ("navigation", "transaction", EN, 0.6), ("navigation", "menu", EN, 0.8),
        ("navigation", "screen", EN, 0.6), ("navigation", "wo", DE, 1.0),
    ]
    .into_iter()
    .map(|(c, t, l, w)| TermRow::new(c, t, l, w))
    .collect()
}

/// Technical-register markers.
#[rustfmt::skip]
pub fn default_level_terms() -> Vec<TermRow> {
    [
        ("beginner", "help", EN, 0.8), ("beginner", "click", EN, 1.0),
        ("beginner", "button", EN, 0.8), ("beginner", "simple", EN, 0.8),
        ("beginner", "hilfe", DE, 0.8),
        ("expert", "api", ANY, 1.0), ("expert", "debug", ANY, 1.0),
        ("expert", "badi", ANY, 1.0), ("expert", "userexit", ANY, 1.0),
        ("expert", "idoc", ANY, 1.0), ("expert", "batch", EN, 0.6),
        ("expert", "customizing", ANY, 0.8), ("expert", "trace", EN, 0.8),
    ]
    .into_iter()
    .map(|(c, t, l, w)| TermRow::new(c, t, l, w))
    .collect()
}

pub fn intent_category(intent: Intent) -> &'static str {
    match intent {
        Intent::HowTo => "howto",
        Intent::ErrorResolution => "error",
        Intent::Definition => "definition",
        Intent::Navigation => "navigation",
        Intent::General => "general",
    }
}

pub fn intent_from_category(category: &str) -> Intent {
    match category {
        "howto" => Intent::HowTo,
        "error" => Intent::ErrorResolution,
        "definition" => Intent::Definition,
        "navigation" => Intent::Navigation,
        _ => Intent::General,
    }
}

pub fn level_from_category(category: &str) -> TechnicalLevel {
    match category {
        "beginner" => TechnicalLevel::Beginner,
        "expert" => TechnicalLevel::Expert,
        _ => TechnicalLevel::Intermediate,
    }
}

pub fn stopwords(language: Language) -> &'static [&'static str] {
    match language {
        Language::En => &[
            "the", "a", "an", "is", "are", "to", "of", "in", "on", "for", "and", "or", "i",
            "we", "you", "it", "my", "do", "does", "can", "with", "at", "be", "this", "that",
        ],
        Language::De => &[
            "der", "die", "das", "ein", "eine", "ist", "sind", "zu", "von", "im", "in", "und",
            "oder", "ich", "wir", "sie", "es", "mein", "kann", "mit", "auf", "wie", "man",
        ],
        Language::Unknown => &[],
    }
}
