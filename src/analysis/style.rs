//! Style analysis
//!
//! Vocabulary, syntax, rhythm, and prose flags (passive voice, adverbs,
//! filter words, clichés, repeated phrases), plus readability and
//! before/after comparison.

use super::utils::{
    text::{self, mean_and_variance},
    CommonPatterns, StyleDictionaries,
};
use crate::config::StyleSettings;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const TOP_WORDS: usize = 10;
const MAX_REPEATED_PHRASES: usize = 20;
const WORDS_PER_MINUTE: f64 = 238.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordFrequency {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyStats {
    pub unique_words: usize,
    pub total_words: usize,
    pub avg_word_length: f64,
    /// `unique_words / total_words`
    pub lexical_diversity: f64,
    pub top_words: Vec<WordFrequency>,
    pub overused_words: Vec<WordFrequency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntaxStats {
    pub avg_sentence_length: f64,
    pub sentence_length_variance: f64,
    pub min_sentence_length: usize,
    pub max_sentence_length: usize,
    pub dialogue_to_narrative_ratio: f64,
    pub question_ratio: f64,
    pub exclamation_ratio: f64,
}

/// One flagged span in the analyzed text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagInstance {
    pub text: String,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassiveVoiceFlags {
    pub instances: Vec<FlagInstance>,
    /// instances per sentence
    pub ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityFlags {
    pub instances: Vec<FlagInstance>,
    /// instances per word
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedPhrase {
    pub phrase: String,
    pub count: usize,
    pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleFlags {
    pub passive_voice: PassiveVoiceFlags,
    pub adverbs: DensityFlags,
    pub filter_words: DensityFlags,
    pub cliches: Vec<FlagInstance>,
    pub repeated_phrases: Vec<RepeatedPhrase>,
}

impl StyleFlags {
    /// Every flagged offset, for per-section counting
    pub fn all_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.passive_voice
            .instances
            .iter()
            .chain(self.adverbs.instances.iter())
            .chain(self.filter_words.instances.iter())
            .chain(self.cliches.iter())
            .map(|i| i.offset)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RhythmStats {
    /// punctuation marks per 100 words
    pub punctuation_density: f64,
    /// 1 + (commas + semicolons) per sentence
    pub avg_clause_count: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleReport {
    pub vocabulary: VocabularyStats,
    pub syntax: SyntaxStats,
    pub flags: StyleFlags,
    pub rhythm: RhythmStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeLevel {
    Elementary,
    MiddleSchool,
    HighSchool,
    College,
    Graduate,
}

impl GradeLevel {
    pub fn label(&self) -> &'static str {
        match self {
            GradeLevel::Elementary => "Elementary",
            GradeLevel::MiddleSchool => "Middle School",
            GradeLevel::HighSchool => "High School",
            GradeLevel::College => "College",
            GradeLevel::Graduate => "Graduate",
        }
    }

    fn from_reading_ease(score: f64) -> Self {
        if score >= 80.0 {
            GradeLevel::Elementary
        } else if score >= 60.0 {
            GradeLevel::MiddleSchool
        } else if score >= 50.0 {
            GradeLevel::HighSchool
        } else if score >= 30.0 {
            GradeLevel::College
        } else {
            GradeLevel::Graduate
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readability {
    /// Flesch reading-ease estimate, 0-100
    pub flesch_kincaid: f64,
    /// minutes
    pub reading_time: u32,
    pub grade_level: GradeLevel,
}

impl Readability {
    fn empty() -> Self {
        Self {
            flesch_kincaid: 0.0,
            reading_time: 0,
            grade_level: GradeLevel::Elementary,
        }
    }
}

/// Signed `after - before` deltas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleComparison {
    pub vocabulary_change: f64,
    pub unique_words_change: i64,
    pub total_words_change: i64,
    pub avg_word_length_change: f64,
    pub sentence_length_change: f64,
    pub sentence_variance_change: f64,
    pub passive_ratio_change: f64,
    pub adverb_density_change: f64,
    pub filter_word_density_change: f64,
    pub cliche_count_change: i64,
    pub punctuation_density_change: f64,
}

fn cliche_pattern() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        let alternation = StyleDictionaries::cliches()
            .iter()
            .map(|c| regex::escape(c))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("Valid cliche regex")
    });
    &PATTERN
}

/// Style analyzer with configurable thresholds
#[derive(Debug, Clone, Default)]
pub struct StyleAnalyzer {
    settings: StyleSettings,
}

impl StyleAnalyzer {
    pub fn new(settings: StyleSettings) -> Self {
        Self { settings }
    }

    pub fn analyze(&self, text: &str) -> StyleReport {
        let words: Vec<(usize, &str)> = text::words(text).collect();
        let sentences = text::sentences(text);

        StyleReport {
            vocabulary: self.vocabulary(&words),
            syntax: syntax(text, &sentences),
            flags: self.flags(text, &words, &sentences),
            rhythm: rhythm(text, words.len(), sentences.len()),
        }
    }

    fn vocabulary(&self, words: &[(usize, &str)]) -> VocabularyStats {
        if words.is_empty() {
            return VocabularyStats::default();
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total_chars = 0usize;
        for (_, w) in words {
            total_chars += w.chars().count();
            *counts.entry(w.to_lowercase()).or_default() += 1;
        }

        let total = words.len();
        let stopwords = StyleDictionaries::stopwords();
        let mut ranked: Vec<WordFrequency> = counts
            .iter()
            .filter(|(w, _)| !stopwords.contains(w.as_str()))
            .map(|(w, c)| WordFrequency {
                word: w.clone(),
                count: *c,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));

        let overused_floor = self
            .settings
            .overused_min_count
            .max((total as f64 * 0.01).ceil() as usize);
        let overused_words = ranked
            .iter()
            .filter(|f| f.word.chars().count() >= 4 && f.count >= overused_floor)
            .cloned()
            .collect();
        let top_words = ranked
            .iter()
            .filter(|f| f.count >= 2)
            .take(TOP_WORDS)
            .cloned()
            .collect();

        VocabularyStats {
            unique_words: counts.len(),
            total_words: total,
            avg_word_length: total_chars as f64 / total as f64,
            lexical_diversity: counts.len() as f64 / total as f64,
            top_words,
            overused_words,
        }
    }

    fn flags(
        &self,
        text: &str,
        words: &[(usize, &str)],
        sentences: &[std::ops::Range<usize>],
    ) -> StyleFlags {
        let to_instance = |m: regex::Match<'_>| FlagInstance {
            text: m.as_str().to_string(),
            offset: m.start(),
            length: m.len(),
        };
        let per_word = |n: usize| {
            if words.is_empty() {
                0.0
            } else {
                n as f64 / words.len() as f64
            }
        };

        let passive: Vec<FlagInstance> = CommonPatterns::passive_voice()
            .find_iter(text)
            .map(to_instance)
            .collect();
        let passive_ratio = if sentences.is_empty() {
            0.0
        } else {
            passive.len() as f64 / sentences.len() as f64
        };

        let adverbs: Vec<FlagInstance> = CommonPatterns::ly_word()
            .find_iter(text)
            .filter(|m| {
                !StyleDictionaries::adverb_exceptions().contains(m.as_str().to_lowercase().as_str())
            })
            .map(to_instance)
            .collect();

        let filter_words: Vec<FlagInstance> = words
            .iter()
            .filter(|(_, w)| StyleDictionaries::filter_words().contains(w.to_lowercase().as_str()))
            .map(|(offset, w)| FlagInstance {
                text: w.to_string(),
                offset: *offset,
                length: w.len(),
            })
            .collect();

        let cliches = cliche_pattern().find_iter(text).map(to_instance).collect();

        StyleFlags {
            passive_voice: PassiveVoiceFlags {
                ratio: passive_ratio,
                instances: passive,
            },
            adverbs: DensityFlags {
                density: per_word(adverbs.len()),
                instances: adverbs,
            },
            filter_words: DensityFlags {
                density: per_word(filter_words.len()),
                instances: filter_words,
            },
            cliches,
            repeated_phrases: self.repeated_phrases(text, sentences),
        }
    }

    fn repeated_phrases(&self, text: &str, sentences: &[std::ops::Range<usize>]) -> Vec<RepeatedPhrase> {
        let n = self.settings.repeated_phrase_len.max(2);
        let stopwords = StyleDictionaries::stopwords();
        let mut grams: HashMap<String, Vec<usize>> = HashMap::new();

        for sentence in sentences {
            let span = &text[sentence.clone()];
            let tokens: Vec<(usize, String)> = text::words(span)
                .map(|(pos, w)| (sentence.start + pos, w.to_lowercase()))
                .collect();
            for window in tokens.windows(n) {
                if window.iter().all(|(_, w)| stopwords.contains(w.as_str())) {
                    continue;
                }
                let phrase = window
                    .iter()
                    .map(|(_, w)| w.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                grams.entry(phrase).or_default().push(window[0].0);
            }
        }

        let mut repeated: Vec<RepeatedPhrase> = grams
            .into_iter()
            .filter(|(_, offsets)| offsets.len() >= self.settings.repeated_phrase_min_count)
            .map(|(phrase, offsets)| RepeatedPhrase {
                phrase,
                count: offsets.len(),
                offsets,
            })
            .collect();
        repeated.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.phrase.cmp(&b.phrase)));
        repeated.truncate(MAX_REPEATED_PHRASES);
        repeated
    }
}

/// Analyze style with default thresholds
pub fn analyze_style(text: &str) -> StyleReport {
    StyleAnalyzer::default().analyze(text)
}

fn terminal_char(sentence: &str) -> Option<char> {
    sentence
        .trim_end_matches(|c: char| matches!(c, '"' | '\'' | '”' | '’' | ')' | ']' | '*'))
        .chars()
        .next_back()
}

fn syntax(text: &str, sentences: &[std::ops::Range<usize>]) -> SyntaxStats {
    if sentences.is_empty() {
        return SyntaxStats::default();
    }

    let lengths: Vec<usize> = sentences
        .iter()
        .map(|r| text::word_count(&text[r.clone()]))
        .collect();
    let as_f64: Vec<f64> = lengths.iter().map(|&l| l as f64).collect();
    let (avg, variance) = mean_and_variance(&as_f64);

    let n = sentences.len() as f64;
    let questions = sentences
        .iter()
        .filter(|r| terminal_char(&text[(*r).clone()]) == Some('?'))
        .count() as f64;
    let exclamations = sentences
        .iter()
        .filter(|r| terminal_char(&text[(*r).clone()]) == Some('!'))
        .count() as f64;

    let non_ws = |s: &str| s.chars().filter(|c| !c.is_whitespace()).count();
    let dialogue_chars: usize = text::dialogue_ranges(text)
        .into_iter()
        .map(|r| non_ws(&text[r]))
        .sum();
    let narrative_chars = non_ws(text).saturating_sub(dialogue_chars);
    let dialogue_to_narrative_ratio = if narrative_chars == 0 {
        if dialogue_chars > 0 {
            1.0
        } else {
            0.0
        }
    } else {
        dialogue_chars as f64 / narrative_chars as f64
    };

    SyntaxStats {
        avg_sentence_length: avg,
        sentence_length_variance: variance,
        min_sentence_length: lengths.iter().copied().min().unwrap_or(0),
        max_sentence_length: lengths.iter().copied().max().unwrap_or(0),
        dialogue_to_narrative_ratio,
        question_ratio: questions / n,
        exclamation_ratio: exclamations / n,
    }
}

fn rhythm(text: &str, word_count: usize, sentence_count: usize) -> RhythmStats {
    if word_count == 0 {
        return RhythmStats::default();
    }

    let marks = text
        .chars()
        .filter(|c| matches!(c, ',' | ';' | ':' | '.' | '!' | '?' | '—' | '–' | '…'))
        .count();
    let clauses = text.chars().filter(|c| matches!(c, ',' | ';')).count();

    RhythmStats {
        punctuation_density: marks as f64 / word_count as f64 * 100.0,
        avg_clause_count: 1.0 + clauses as f64 / sentence_count.max(1) as f64,
    }
}

/// Flesch reading-ease estimate, grade bucket, and reading time.
///
/// Blank text yields the zero fallback. Any other text is treated as at
/// least one word and one sentence, so the score is always finite.
pub fn calculate_readability(text: &str) -> Readability {
    if text.trim().is_empty() {
        return Readability::empty();
    }

    // symbol-only text such as a bare break marker still counts as one word
    let words: Vec<&str> = text::words(text).map(|(_, w)| w).collect();
    let word_count = words.len().max(1) as f64;
    let sentence_count = text::sentences(text).len().max(1) as f64;
    let syllables: usize = words
        .iter()
        .map(|w| text::count_syllables(w).max(1))
        .sum::<usize>()
        .max(1);

    let score = 206.835 - 1.015 * (word_count / sentence_count) - 84.6 * (syllables as f64 / word_count);
    let score = score.clamp(0.0, 100.0);

    Readability {
        flesch_kincaid: (score * 10.0).round() / 10.0,
        reading_time: (word_count / WORDS_PER_MINUTE).ceil().max(1.0) as u32,
        grade_level: GradeLevel::from_reading_ease(score),
    }
}

/// Signed deltas from `before` to `after`
pub fn compare_styles(before: &StyleReport, after: &StyleReport) -> StyleComparison {
    let delta_i = |a: usize, b: usize| b as i64 - a as i64;
    StyleComparison {
        vocabulary_change: after.vocabulary.lexical_diversity - before.vocabulary.lexical_diversity,
        unique_words_change: delta_i(before.vocabulary.unique_words, after.vocabulary.unique_words),
        total_words_change: delta_i(before.vocabulary.total_words, after.vocabulary.total_words),
        avg_word_length_change: after.vocabulary.avg_word_length - before.vocabulary.avg_word_length,
        sentence_length_change: after.syntax.avg_sentence_length - before.syntax.avg_sentence_length,
        sentence_variance_change: after.syntax.sentence_length_variance
            - before.syntax.sentence_length_variance,
        passive_ratio_change: after.flags.passive_voice.ratio - before.flags.passive_voice.ratio,
        adverb_density_change: after.flags.adverbs.density - before.flags.adverbs.density,
        filter_word_density_change: after.flags.filter_words.density
            - before.flags.filter_words.density,
        cliche_count_change: delta_i(before.flags.cliches.len(), after.flags.cliches.len()),
        punctuation_density_change: after.rhythm.punctuation_density
            - before.rhythm.punctuation_density,
    }
}
