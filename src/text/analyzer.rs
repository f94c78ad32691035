// Linguistic analyzer trait and the built-in rule-based fallback.
//
// The preprocessor only needs each token's lemma, part-of-speech tag and the
// entity span it belongs to. Any tagger that can produce those (a statistical
// model behind FFI, a pre-annotated corpus reader) plugs in through
// `LinguisticAnalyzer`.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

/// One token of analyzed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    /// Surface form as it appears in the text
    pub text: String,
    pub lemma: String,
    /// Universal POS tag (NOUN, VERB, PROPN, NUM, PUNCT, X, ...)
    pub pos: String,
    /// Label of the entity span containing this token, if any
    pub entity: Option<String>,
}

/// Turns raw text into annotated tokens, in text order.
/// Must return identical output for identical input.
pub trait LinguisticAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> Result<Vec<AnalyzedToken>>;
}

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\p{L}[\p{L}\p{M}\p{N}'’-]*|\p{N}+(?:[.,]\p{N}+)*|[^\s\p{L}\p{N}]")
        .expect("token pattern is valid")
});

/// Entity label given to runs of capitalized words.
pub const RULE_ENTITY_LABEL: &str = "MISC";

/// Dependency-free analyzer based on Unicode word boundaries.
///
/// Tags are coarse: NUM for numbers, PUNCT for punctuation, PROPN for
/// capitalized words that do not start a sentence, X for every other word.
/// Runs of two or more PROPN tokens form an entity span labeled MISC.
/// The lemma is the lower-cased surface form.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleAnalyzer;

impl LinguisticAnalyzer for RuleAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<AnalyzedToken>> {
        let mut tokens: Vec<AnalyzedToken> = Vec::new();
        let mut sentence_start = true;

        for m in TOKEN_RE.find_iter(text) {
            let surface = m.as_str();
            let first = surface.chars().next().unwrap_or(' ');

            let pos = if first.is_numeric() {
                "NUM"
            } else if !first.is_alphabetic() {
                "PUNCT"
            } else if first.is_uppercase() && !sentence_start {
                "PROPN"
            } else {
                "X"
            };

            tokens.push(AnalyzedToken {
                text: surface.to_string(),
                lemma: surface.to_lowercase(),
                pos: pos.to_string(),
                entity: None,
            });

            sentence_start = match pos {
                "PUNCT" => matches!(surface, "." | "!" | "?" | "…" | ";" | ":") || sentence_start,
                _ => false,
            };
        }

        mark_proper_noun_runs(&mut tokens);
        Ok(tokens)
    }
}

fn mark_proper_noun_runs(tokens: &mut [AnalyzedToken]) {
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].pos != "PROPN" {
            i += 1;
            continue;
        }
        let start = i;
        while i < tokens.len() && tokens[i].pos == "PROPN" {
            i += 1;
        }
        if i - start >= 2 {
            for token in &mut tokens[start..i] {
                token.entity = Some(RULE_ENTITY_LABEL.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<(String, String)> {
        RuleAnalyzer
            .analyze(text)
            .unwrap()
            .into_iter()
            .map(|t| (t.text, t.pos))
            .collect()
    }

    #[test]
    fn splits_words_numbers_and_punctuation() {
        let t = tags("La tasa subió 3,5 puntos.");
        let texts: Vec<&str> = t.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(texts, vec!["La", "tasa", "subió", "3,5", "puntos", "."]);
        assert_eq!(t[0].1, "X");
        assert_eq!(t[3].1, "NUM");
        assert_eq!(t[5].1, "PUNCT");
    }

    #[test]
    fn capitalized_mid_sentence_is_proper_noun() {
        let t = tags("Report from Bogota. Rates rose");
        assert_eq!(t[2], ("Bogota".to_string(), "PROPN".to_string()));
        // "Rates" starts a new sentence
        assert_eq!(t[4], ("Rates".to_string(), "X".to_string()));
    }

    #[test]
    fn proper_noun_runs_become_entities() {
        let tokens = RuleAnalyzer
            .analyze("the Banco Central said Peru grew")
            .unwrap();
        assert_eq!(tokens[1].entity.as_deref(), Some(RULE_ENTITY_LABEL));
        assert_eq!(tokens[2].entity.as_deref(), Some(RULE_ENTITY_LABEL));
        // A single capitalized word is PROPN but not an entity span
        assert_eq!(tokens[4].pos, "PROPN");
        assert_eq!(tokens[4].entity, None);
    }

    #[test]
    fn lemma_is_lowercase_and_accents_survive() {
        let tokens = RuleAnalyzer.analyze("Económica").unwrap();
        assert_eq!(tokens[0].lemma, "económica");
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(RuleAnalyzer.analyze("   \n").unwrap().is_empty());
    }
}
