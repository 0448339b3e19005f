//! Per-locale word lists driving classification, fusion, and the detectors.
//!
//! Lists are stored folded (lowercase, no diacritics) unless noted, and are
//! matched against [`crate::text::fold_diacritics`] of the input. Verbs keep
//! their accents. Sentence openers are matched case-sensitively because their
//! capital letter is the signal.

use crate::config::Locale;
use crate::text::fold_diacritics;

/// Vocabulary for one locale.
#[derive(Debug)]
pub struct Lexicon {
    pub locale: Locale,
    /// Recognised section headings (whole-line matches).
    pub section_names: &'static [&'static str],
    /// Headings that open a top-level section.
    pub top_level_sections: &'static [&'static str],
    /// Words opening a chapter or part heading in books.
    pub chapter_words: &'static [&'static str],
    /// Finite verb forms that mark running prose. Lowercase, accents kept
    /// (`é` is a verb, `e` is not).
    pub conjugated_verbs: &'static [&'static str],
    /// Words that continue the previous sentence when they lead a line.
    pub continuation_connectives: &'static [&'static str],
    /// Discourse markers that open a new thought (matched with a comma).
    pub context_breaks: &'static [&'static str],
    /// Capitalised words that open a new sentence. Case-sensitive.
    pub sentence_openers: &'static [&'static str],
    pub prepositions: &'static [&'static str],
    /// Phrases typical of running headers and footers.
    pub header_phrases: &'static [&'static str],
    /// Headings that introduce a bibliography.
    pub bibliography_headings: &'static [&'static str],
    /// Words that hint a table is being discussed.
    pub table_words: &'static [&'static str],
    /// Words for "page".
    pub page_words: &'static [&'static str],
    /// Heading for the collected footnotes section (display form).
    pub notes_heading: &'static str,
    /// Heading for the formatted bibliography (display form).
    pub references_heading: &'static str,
}

static EN: Lexicon = Lexicon {
    locale: Locale::En,
    section_names: &[
        "abstract",
        "introduction",
        "background",
        "related work",
        "related works",
        "literature review",
        "state of the art",
        "theoretical framework",
        "method",
        "methods",
        "methodology",
        "materials and methods",
        "experimental setup",
        "experiments",
        "experimental results",
        "implementation",
        "evaluation",
        "analysis",
        "data",
        "results",
        "discussion",
        "results and discussion",
        "conclusion",
        "conclusions",
        "concluding remarks",
        "future work",
        "limitations",
        "summary",
        "overview",
        "acknowledgments",
        "acknowledgements",
        "references",
        "bibliography",
        "appendix",
        "appendices",
        "preface",
        "foreword",
        "contents",
        "table of contents",
        "keywords",
        "index",
        "glossary",
        "case study",
        "objectives",
        "notes",
    ],
    top_level_sections: &[
        "abstract",
        "introduction",
        "background",
        "related work",
        "methods",
        "methodology",
        "materials and methods",
        "results",
        "discussion",
        "results and discussion",
        "conclusion",
        "conclusions",
        "acknowledgments",
        "acknowledgements",
        "references",
        "bibliography",
        "appendix",
    ],
    chapter_words: &["chapter", "part"],
    conjugated_verbs: &[
        "is", "are", "was", "were", "has", "have", "had", "does", "did", "can", "will", "would",
        "should", "may", "might", "must", "shows", "showed", "presents", "presented", "describes",
        "described", "found", "suggests", "indicates", "demonstrates", "provides", "includes",
        "remains", "allows", "makes", "made", "gives", "gave", "took", "seems", "became",
        "becomes", "contains", "requires", "uses", "used",
    ],
    continuation_connectives: &[
        "and", "or", "but", "nor", "yet", "so", "which", "that", "because", "whereas", "while",
        "although", "though", "since", "whose", "whom",
    ],
    context_breaks: &[
        "however",
        "therefore",
        "moreover",
        "furthermore",
        "in addition",
        "finally",
        "in conclusion",
        "consequently",
        "on the other hand",
        "in summary",
        "nevertheless",
    ],
    sentence_openers: &[
        "The", "This", "These", "Those", "In", "We", "It", "Our", "An", "For", "As", "When", "If",
        "There", "Its", "Their", "Figure", "Table", "Here", "Such",
    ],
    prepositions: &[
        "of", "in", "on", "at", "by", "for", "with", "from", "to", "into", "about", "between",
        "through", "during", "under", "over", "against", "among", "without", "within",
    ],
    header_phrases: &[
        "all rights reserved",
        "downloaded from",
        "accepted manuscript",
        "preprint",
        "journal of",
        "proceedings of",
        "vol",
        "issn",
        "doi",
        "copyright",
    ],
    bibliography_headings: &[
        "references",
        "bibliography",
        "works cited",
        "literature cited",
        "reference list",
    ],
    table_words: &["table", "tabular"],
    page_words: &["page", "p"],
    notes_heading: "Notes",
    references_heading: "References",
};

static PT_BR: Lexicon = Lexicon {
    locale: Locale::PtBr,
    section_names: &[
        "resumo",
        "abstract",
        "introducao",
        "fundamentacao teorica",
        "referencial teorico",
        "revisao de literatura",
        "revisao da literatura",
        "estado da arte",
        "trabalhos relacionados",
        "metodo",
        "metodos",
        "metodologia",
        "materiais e metodos",
        "procedimentos metodologicos",
        "experimentos",
        "implementacao",
        "avaliacao",
        "analise",
        "analise dos dados",
        "resultados",
        "discussao",
        "resultados e discussao",
        "conclusao",
        "conclusoes",
        "consideracoes finais",
        "trabalhos futuros",
        "limitacoes",
        "agradecimentos",
        "referencias",
        "referencias bibliograficas",
        "bibliografia",
        "apendice",
        "anexo",
        "sumario",
        "prefacio",
        "apresentacao",
        "palavras-chave",
        "objetivos",
        "justificativa",
        "estudo de caso",
        "glossario",
        "notas",
    ],
    top_level_sections: &[
        "resumo",
        "abstract",
        "introducao",
        "fundamentacao teorica",
        "referencial teorico",
        "metodologia",
        "metodos",
        "materiais e metodos",
        "resultados",
        "discussao",
        "resultados e discussao",
        "conclusao",
        "conclusoes",
        "consideracoes finais",
        "agradecimentos",
        "referencias",
        "referencias bibliograficas",
        "bibliografia",
        "apendice",
        "anexo",
    ],
    chapter_words: &["capitulo", "parte"],
    conjugated_verbs: &[
        "é", "são", "foi", "foram", "está", "estão", "tem", "têm", "há", "pode", "podem", "deve",
        "devem", "será", "seria", "era", "eram", "teve", "tinha", "apresenta", "apresentam",
        "mostra", "mostram", "indica", "indicam", "demonstra", "utiliza", "utilizam", "permite",
        "possui", "faz", "fez", "sugere", "descreve", "contém", "inclui", "torna", "tornou",
    ],
    continuation_connectives: &[
        "e", "ou", "mas", "que", "porque", "pois", "porem", "contudo", "todavia", "enquanto",
        "embora", "onde", "cujo", "cuja", "cujos", "cujas", "nem",
    ],
    context_breaks: &[
        "entretanto",
        "contudo",
        "alem disso",
        "portanto",
        "por fim",
        "assim",
        "dessa forma",
        "desse modo",
        "finalmente",
        "em suma",
        "por outro lado",
        "no entanto",
    ],
    sentence_openers: &[
        "O", "Os", "As", "Este", "Esta", "Estes", "Estas", "Esse", "Essa", "Neste", "Nesta",
        "No", "Na", "Nos", "Nas", "Em", "Para", "Um", "Uma", "Com", "Segundo", "Figura",
        "Tabela", "Quando", "Se",
    ],
    prepositions: &[
        "de", "da", "do", "das", "dos", "em", "no", "na", "nos", "nas", "por", "para", "com",
        "sem", "sobre", "entre", "ate", "apos", "sob", "ao", "aos", "a", "as", "pelo", "pela",
        "pelos", "pelas",
    ],
    header_phrases: &[
        "todos os direitos reservados",
        "disponivel em",
        "revista",
        "anais do",
        "vol",
        "issn",
        "doi",
        "copyright",
    ],
    bibliography_headings: &[
        "referencias",
        "referencias bibliograficas",
        "bibliografia",
        "obras citadas",
    ],
    table_words: &["tabela", "quadro"],
    page_words: &["pagina", "pag", "p"],
    notes_heading: "Notas",
    references_heading: "Referências",
};

/// Vocabulary for `locale`.
pub fn lexicon(locale: Locale) -> &'static Lexicon {
    match locale {
        Locale::En => &EN,
        Locale::PtBr => &PT_BR,
    }
}

/// Strip a leading numbering prefix (`1.`, `2.3`, `IV.`, `A.`) and a trailing
/// colon, then fold. Used to compare a heading candidate to the lists.
pub fn heading_key(text: &str) -> String {
    let trimmed = text.trim().trim_start_matches('#').trim();
    let rest = strip_numbering(trimmed);
    fold_diacritics(rest.trim().trim_end_matches(':').trim())
}

/// `"2.3 Results"` → `"Results"`, `"IV. Discussion"` → `"Discussion"`.
pub fn strip_numbering(text: &str) -> &str {
    let t = text.trim_start();
    let token_end = t.find(char::is_whitespace).unwrap_or(t.len());
    let token = &t[..token_end];
    let bare = token.trim_end_matches(['.', ')', ':']);
    let numeric = !bare.is_empty()
        && bare.chars().all(|c| c.is_ascii_digit() || c == '.')
        && bare.chars().next().is_some_and(|c| c.is_ascii_digit());
    let roman = is_roman(bare) && token.len() > bare.len();
    if (numeric || roman) && token_end < t.len() {
        t[token_end..].trim_start()
    } else {
        t
    }
}

/// Uppercase Roman numeral up to `XXXIX`.
pub fn is_roman(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 6
        && s.chars().all(|c| matches!(c, 'I' | 'V' | 'X'))
}

impl Lexicon {
    /// Whole-line match against the section vocabulary.
    pub fn is_section_name(&self, text: &str) -> bool {
        let key = heading_key(text);
        self.section_names.contains(&key.as_str())
    }

    pub fn is_top_level_section(&self, text: &str) -> bool {
        let key = heading_key(text);
        self.top_level_sections.contains(&key.as_str())
    }

    /// First word of the (un-numbered) line is a section word.
    pub fn starts_with_section_word(&self, text: &str) -> bool {
        let key = heading_key(text);
        let Some(first) = key.split_whitespace().next() else {
            return false;
        };
        self.section_names
            .iter()
            .any(|s| s.split_whitespace().next() == Some(first))
    }

    /// Line opens a chapter or part (`Chapter 3`, `CAPÍTULO II`, `Part One`).
    pub fn is_chapter_heading(&self, text: &str) -> bool {
        let folded = fold_diacritics(text.trim().trim_start_matches('#').trim());
        let mut words = folded.split_whitespace();
        match (words.next(), words.next()) {
            (Some(first), Some(_)) => self.chapter_words.contains(&first),
            _ => false,
        }
    }

    pub fn is_bibliography_heading(&self, text: &str) -> bool {
        let key = heading_key(text);
        self.bibliography_headings.contains(&key.as_str())
    }

    /// Count conjugated verbs among the words of `text`.
    pub fn count_verbs(&self, text: &str) -> usize {
        crate::text::words(text)
            .map(str::to_lowercase)
            .filter(|w| self.conjugated_verbs.contains(&w.as_str()))
            .count()
    }

    /// Leading word is a continuation connective.
    pub fn starts_with_connective(&self, text: &str) -> bool {
        first_word_folded(text)
            .is_some_and(|w| self.continuation_connectives.contains(&w.as_str()))
    }

    pub fn starts_with_preposition(&self, text: &str) -> bool {
        first_word_folded(text).is_some_and(|w| self.prepositions.contains(&w.as_str()))
    }

    /// Line opens with a discourse marker followed by a comma
    /// (`However, …`, `Além disso, …`).
    pub fn starts_with_context_break(&self, text: &str) -> bool {
        let Some((head, _)) = text.trim_start().split_once(',') else {
            return false;
        };
        if !head.chars().next().is_some_and(char::is_uppercase) {
            return false;
        }
        let folded = fold_diacritics(head);
        self.context_breaks.contains(&folded.trim())
    }

    /// Leading word is a capitalised sentence opener.
    pub fn starts_with_sentence_opener(&self, text: &str) -> bool {
        let first = text
            .split_whitespace()
            .next()
            .map(|w| w.trim_end_matches([',', ':', ';']));
        first.is_some_and(|w| self.sentence_openers.contains(&w))
    }

    /// Any header/footer phrase occurs in the folded line.
    pub fn contains_header_phrase(&self, text: &str) -> bool {
        let key = crate::text::line_key(text);
        let padded = format!(" {key} ");
        self.header_phrases
            .iter()
            .any(|p| padded.contains(&format!(" {} ", crate::text::line_key(p))))
    }
}

fn first_word_folded(text: &str) -> Option<String> {
    crate::text::words(text).next().map(fold_diacritics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_names_match_through_numbering_and_accents() {
        let en = lexicon(Locale::En);
        assert!(en.is_section_name("1. Introduction"));
        assert!(en.is_section_name("IV. Results and Discussion"));
        assert!(en.is_section_name("REFERENCES"));
        assert!(!en.is_section_name("Introduction to quantum fields"));

        let pt = lexicon(Locale::PtBr);
        assert!(pt.is_section_name("2 Introdução"));
        assert!(pt.is_section_name("Considerações Finais:"));
    }

    #[test]
    fn strip_numbering_variants() {
        assert_eq!(strip_numbering("2.3 Results"), "Results");
        assert_eq!(strip_numbering("IV. Discussion"), "Discussion");
        assert_eq!(strip_numbering("1) Scope"), "Scope");
        assert_eq!(strip_numbering("In 2020 we"), "In 2020 we");
        assert_eq!(strip_numbering("I think"), "I think");
    }

    #[test]
    fn chapter_headings() {
        let pt = lexicon(Locale::PtBr);
        assert!(pt.is_chapter_heading("CAPÍTULO 3"));
        assert!(!pt.is_chapter_heading("Capítulo"));
        assert!(lexicon(Locale::En).is_chapter_heading("Chapter 1 The Beginning"));
    }

    #[test]
    fn connectives_and_openers() {
        let en = lexicon(Locale::En);
        assert!(en.starts_with_connective("and the rest"));
        assert!(en.starts_with_sentence_opener("The model was"));
        assert!(!en.starts_with_sentence_opener("the model was"));
        assert!(en.starts_with_context_break("However, we"));
        assert!(!en.starts_with_context_break("however we"));
        assert!(lexicon(Locale::PtBr).starts_with_context_break("Além disso, os"));
    }

    #[test]
    fn verbs_are_counted_folded() {
        let pt = lexicon(Locale::PtBr);
        assert_eq!(pt.count_verbs("O modelo é simples e foi testado"), 2);
        assert_eq!(pt.count_verbs("Resultados e Discussão"), 0);
        assert_eq!(lexicon(Locale::En).count_verbs("Results and Discussion"), 0);
    }

    #[test]
    fn header_phrase_match_is_word_bounded() {
        let en = lexicon(Locale::En);
        assert!(en.contains_header_phrase("Journal of Testing, Vol. 3"));
        assert!(!en.contains_header_phrase("A devolved approach"));
    }
}
