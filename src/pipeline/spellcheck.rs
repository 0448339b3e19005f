//! Spell check and last-mile text normalisation.
//!
//! Every prose line is normalised: NFC composition, typographic punctuation
//! folded to ASCII, control characters removed, runs of spaces collapsed.
//! Headings, fenced code and table rows pass through untouched.
//!
//! ## Why so conservative?
//!
//! The vocabulary is small, so "not in the vocabulary" says little about a
//! word. Candidates are vocabulary words one edit away (Damerau-Levenshtein)
//! with the same first and last letters and a Jaro-Winkler similarity of at
//! least [`SIMILARITY_THRESHOLD`]. They are ranked by similarity and the
//! token is corrected only when one candidate ranks strictly first. That
//! covers transpositions (`anlaysis`), dropped letters (`resuts`) and digits
//! standing in for letters (`resu1ts`), while `sampled` never becomes
//! `samples`. Capitalised tokens are names more often than typos and are
//! skipped.

use super::context::{ConversionContext, Field};
use super::detect::{fenced_mask, is_heading, is_table_row};
use super::{require, Metric, Stage, StageEnv, StageReport};
use crate::config::Locale;
use crate::error::StageError;
use crate::text::{collapse_spaces, fold_punctuation, nfc, strip_control};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use strsim::{damerau_levenshtein, jaro_winkler};
use tracing::debug;

/// Minimum Jaro-Winkler similarity between a token and its correction.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;
/// Shorter tokens are never corrected.
const MIN_WORD_CHARS: usize = 6;

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\d]+").unwrap());

static EN_VOCABULARY: &[&str] = &[
    "abstract", "accuracy", "algorithm", "algorithms", "although", "analyses",
    "analysis", "approach", "associated", "authors", "average", "because",
    "between", "chapter", "clinical", "compared", "comparison", "conclusion",
    "consistent", "content", "context", "control", "correlation", "dataset",
    "datasets", "decrease", "described", "development", "deviation",
    "difference", "different", "discussion", "distribution", "education",
    "effects", "environment", "evaluation", "experiment", "experimental",
    "factors", "figure", "framework", "function", "functions", "furthermore",
    "however", "hypothesis", "implementation", "important", "increase",
    "information", "introduction", "journal", "knowledge", "learning",
    "literature", "measurement", "measurements", "method", "methodology",
    "methods", "models", "moreover", "network", "networks", "observation",
    "observed", "obtained", "parameter", "parameters", "participants",
    "particular", "patients", "performance", "population", "precision",
    "presented", "previous", "probability", "problem", "problems", "process",
    "processes", "proposed", "published", "question", "questions",
    "reference", "references", "regression", "related", "relationship",
    "research", "respectively", "response", "results", "sample", "samples",
    "section", "sections", "significance", "significant", "social",
    "software", "solution", "solutions", "standard", "statistical",
    "statistics", "structure", "students", "system", "systems", "teachers",
    "testing", "theoretical", "therefore", "training", "treatment",
    "university", "validation", "variable", "variables",
];

static PT_BR_VOCABULARY: &[&str] = &[
    "abordagem", "algoritmo", "algoritmos", "ambiente", "amostra", "amostras",
    "análise", "anterior", "apresentado", "aprendizagem", "associado",
    "autores", "avaliação", "capítulo", "clínico", "comparação",
    "conclusão", "conhecimento", "conteúdo", "contexto", "controle",
    "correlação", "desempenho", "descrito", "desenvolvimento", "desvio",
    "diferença", "diferentes", "discussão", "distribuição", "educação",
    "efeitos", "embora", "entretanto", "estatística", "estrutura",
    "estudantes", "estudos", "experimental", "experimento", "fatores",
    "figura", "função", "hipótese", "implementação", "importante",
    "informação", "introdução", "literatura", "medição", "metodologia",
    "método", "métodos", "observação", "obtidos", "pacientes", "padrão",
    "parâmetros", "particular", "pesquisa", "população", "porque",
    "portanto", "probabilidade", "problema", "problemas", "processo",
    "processos", "professores", "proposto", "publicado", "público",
    "questão", "redução", "referências", "regressão", "relacionado",
    "relação", "resposta", "resultados", "sistema", "sistemas", "social",
    "solução", "tabela", "teoria", "teórico", "tratamento", "treinamento",
    "universidade", "validação", "variáveis", "variável",
];

static EN_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| EN_VOCABULARY.iter().copied().collect());
static PT_BR_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| PT_BR_VOCABULARY.iter().copied().collect());

/// Vocabulary words for `locale`, as a list and as a lookup set.
fn vocabulary(locale: Locale) -> (&'static [&'static str], &'static HashSet<&'static str>) {
    match locale {
        Locale::En => (EN_VOCABULARY, &*EN_SET),
        Locale::PtBr => (PT_BR_VOCABULARY, &*PT_BR_SET),
    }
}

/// The vocabulary word that ranks strictly closest to `token`, if any.
pub fn suggest(token: &str, locale: Locale) -> Option<&'static str> {
    let (list, set) = vocabulary(locale);
    let len = token.chars().count();
    let first = token.chars().next()?;
    let last = token.chars().last()?;
    if len < MIN_WORD_CHARS
        || !first.is_alphabetic()
        || token.chars().any(char::is_uppercase)
        || set.contains(token)
    {
        return None;
    }
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    if has_digit && token.chars().filter(|c| c.is_alphabetic()).count() < len / 2 {
        return None;
    }

    let mut ranked: Vec<(f64, &'static str)> = list
        .iter()
        .copied()
        .filter(|cand| {
            cand.chars().count().abs_diff(len) <= 1
                && cand.chars().next() == Some(first)
                && cand.chars().last() == Some(last)
                && damerau_levenshtein(token, cand) <= 1
        })
        .map(|cand| (jaro_winkler(token, cand), cand))
        .filter(|(score, _)| *score >= SIMILARITY_THRESHOLD)
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    match ranked.as_slice() {
        [(_, only)] => Some(*only),
        [(best, word), (second, _), ..] if best > second => Some(*word),
        _ => None,
    }
}

fn correct_line(line: &str, locale: Locale) -> (String, usize) {
    let mut corrections = 0;
    let text = RE_TOKEN
        .replace_all(line, |caps: &regex::Captures<'_>| match suggest(&caps[0], locale) {
            Some(word) => {
                corrections += 1;
                word.to_string()
            }
            None => caps[0].to_string(),
        })
        .into_owned();
    (text, corrections)
}

fn normalize_line(line: &str) -> String {
    collapse_spaces(&strip_control(&fold_punctuation(&nfc(line))))
}

/// Normalise and, when `correct` is set, spell-correct a Markdown document.
/// Returns the new text and the number of corrected tokens.
pub fn check(markdown: &str, locale: Locale, correct: bool) -> (String, usize) {
    let lines: Vec<&str> = markdown.lines().collect();
    let fenced = fenced_mask(&lines);
    let mut corrections = 0;
    let out: Vec<String> = lines
        .iter()
        .zip(&fenced)
        .map(|(&line, &in_fence)| {
            if in_fence || is_heading(line) || is_table_row(line) {
                return line.to_string();
            }
            let normalized = normalize_line(line);
            let has_link = normalized.contains("](") || normalized.contains("<a ");
            if !correct || has_link || normalized.contains("://") {
                return normalized;
            }
            let (text, n) = correct_line(&normalized, locale);
            corrections += n;
            text
        })
        .collect();
    (out.join("\n"), corrections)
}

/// The spell-check stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpellCheck;

impl Stage for SpellCheck {
    fn name(&self) -> &'static str {
        "spell-check"
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Markdown]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let markdown = require(ctx.markdown(), self.name(), Field::Markdown)?;
        let (text, corrections) = check(markdown, ctx.locale(), env.config.spell_check);
        debug!(corrections, "spell check applied");
        ctx.set_markdown(text);
        Ok(StageReport::done()
            .with_note(format!("{corrections} corrections"))
            .with_metric(Metric::SpellingCorrections, corrections))
    }
}
