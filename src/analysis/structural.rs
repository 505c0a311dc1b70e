//! Structural parser
//!
//! Segments a chapter into paragraphs (one per non-blank line), scenes, and a
//! dialogue map, then aggregates chapter-level statistics.
//!
//! Scene boundaries:
//! - explicit break lines (`***`, `* * *`, `---`, `~~~`, `#`, markdown headings)
//! - runs of two or more blank lines
//!
//! Empty segments are dropped, so a heading that opens the chapter does not
//! produce an empty scene.

use super::utils::{
    text::{self, mean_and_variance},
    CommonPatterns, EntityDictionaries, NarrativeDictionaries,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Scene classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Action,
    Dialogue,
    Introspection,
    Description,
    Transition,
}

impl SceneType {
    pub fn label(&self) -> &'static str {
        match self {
            SceneType::Action => "action",
            SceneType::Dialogue => "dialogue",
            SceneType::Introspection => "introspection",
            SceneType::Description => "description",
            SceneType::Transition => "transition",
        }
    }
}

/// Paragraph classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphKind {
    Dialogue,
    Action,
    Introspection,
    Description,
}

impl ParagraphKind {
    pub fn label(&self) -> &'static str {
        match self {
            ParagraphKind::Dialogue => "dialogue",
            ParagraphKind::Action => "action",
            ParagraphKind::Introspection => "introspection",
            ParagraphKind::Description => "description",
        }
    }
}

/// A contiguous scene. `end_offset > start_offset` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub scene_type: SceneType,
    pub pov: Option<String>,
    pub location: Option<String>,
    pub time_marker: Option<String>,
    /// 0.0-1.0
    pub tension: f64,
    /// 0.0-1.0
    pub dialogue_ratio: f64,
}

impl Scene {
    pub fn range(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start_offset <= offset && offset < self.end_offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub offset: usize,
    pub length: usize,
    pub kind: ParagraphKind,
    pub word_count: usize,
    pub sentence_count: usize,
    pub tension: f64,
}

impl Paragraph {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

/// One quoted line of dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub offset: usize,
    pub length: usize,
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralStats {
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub scene_count: usize,
    pub pov_shifts: usize,
    pub avg_scene_length: f64,
    pub dialogue_ratio: f64,
    pub avg_sentence_length: f64,
    pub sentence_length_variance: f64,
    pub avg_tension: f64,
}

/// Structural model of one chapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralFingerprint {
    pub scenes: Vec<Scene>,
    pub paragraphs: Vec<Paragraph>,
    pub dialogue_map: Vec<DialogueLine>,
    pub stats: StructuralStats,
}

/// Parse the structure of a chapter
pub fn parse_structure(text: &str) -> StructuralFingerprint {
    let segments = scene_segments(text);

    let paragraphs: Vec<Paragraph> = text::lines(text)
        .into_iter()
        .filter(|r| !CommonPatterns::scene_break_line().is_match(&text[r.clone()]))
        .map(|r| build_paragraph(text, r))
        .collect();

    let scenes: Vec<Scene> = segments
        .iter()
        .enumerate()
        .map(|(i, r)| build_scene(text, i, r.clone()))
        .collect();

    let dialogue_map = dialogue_map(text);

    let sentence_lengths: Vec<f64> = text::sentences(text)
        .into_iter()
        .map(|r| text::word_count(&text[r]) as f64)
        .collect();
    let (avg_sentence_length, sentence_length_variance) = mean_and_variance(&sentence_lengths);

    let scene_lengths: Vec<f64> = scenes
        .iter()
        .map(|s| text::word_count(&text[s.range()]) as f64)
        .collect();
    let (avg_scene_length, _) = mean_and_variance(&scene_lengths);
    let tensions: Vec<f64> = scenes.iter().map(|s| s.tension).collect();
    let (avg_tension, _) = mean_and_variance(&tensions);

    let pov_shifts = scenes
        .windows(2)
        .filter(|w| match (&w[0].pov, &w[1].pov) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        })
        .count();

    let stats = StructuralStats {
        word_count: text::word_count(text),
        sentence_count: sentence_lengths.len(),
        paragraph_count: paragraphs.len(),
        scene_count: scenes.len(),
        pov_shifts,
        avg_scene_length,
        dialogue_ratio: text::dialogue_ratio(text),
        avg_sentence_length,
        sentence_length_variance,
        avg_tension,
    };

    StructuralFingerprint {
        scenes,
        paragraphs,
        dialogue_map,
        stats,
    }
}

/// Byte ranges of scenes, in order. Also used by the chunk manager.
pub fn scene_segments(text: &str) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut prev_end: Option<usize> = None;

    for line in text::lines(text) {
        let is_marker = CommonPatterns::scene_break_line().is_match(&text[line.clone()]);
        let blank_run = prev_end
            .map(|end| text[end..line.start].matches('\n').count() >= 3)
            .unwrap_or(false);
        prev_end = Some(line.end);

        if is_marker || blank_run {
            if let Some(seg) = current.take() {
                segments.push(seg);
            }
        }
        if is_marker {
            continue;
        }

        match current.as_mut() {
            Some(seg) => seg.end = line.end,
            None => current = Some(line),
        }
    }

    if let Some(seg) = current {
        segments.push(seg);
    }
    segments
}

/// Tension estimate for a span of prose, 0.0-1.0
pub fn estimate_tension(span: &str) -> f64 {
    let words: Vec<String> = text::words(span).map(|(_, w)| w.to_lowercase()).collect();
    if words.is_empty() {
        return 0.0;
    }

    let hits = words
        .iter()
        .filter(|w| NarrativeDictionaries::tension_words().contains(w.as_str()))
        .count();
    let lexical = (hits as f64 / words.len() as f64 * 12.0).min(0.6);

    let sentences = text::sentences(span);
    let n = sentences.len().max(1) as f64;
    let exclamations = sentences
        .iter()
        .filter(|r| span[(*r).clone()].contains('!'))
        .count() as f64;
    let short = sentences
        .iter()
        .filter(|r| text::word_count(&span[(*r).clone()]) <= 6)
        .count() as f64;

    (lexical + exclamations / n * 0.25 + short / n * 0.25).clamp(0.0, 1.0)
}

fn introspection_density(span: &str) -> f64 {
    let mut total = 0usize;
    let mut hits = 0usize;
    for (_, w) in text::words(span) {
        total += 1;
        if NarrativeDictionaries::introspection_words().contains(w.to_lowercase().as_str()) {
            hits += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Classify and measure one paragraph line of `text`
pub fn build_paragraph(text: &str, range: Range<usize>) -> Paragraph {
    let span = &text[range.clone()];
    let tension = estimate_tension(span);
    let kind = if text::dialogue_ratio(span) > 0.3 {
        ParagraphKind::Dialogue
    } else if tension >= 0.5 {
        ParagraphKind::Action
    } else if introspection_density(span) > 0.0 {
        ParagraphKind::Introspection
    } else {
        ParagraphKind::Description
    };

    Paragraph {
        offset: range.start,
        length: range.len(),
        kind,
        word_count: text::word_count(span),
        sentence_count: text::sentences(span).len(),
        tension,
    }
}

fn build_scene(text: &str, index: usize, range: Range<usize>) -> Scene {
    let span = &text[range.clone()];
    let tension = estimate_tension(span);
    let dialogue_ratio = text::dialogue_ratio(span);
    let words = text::word_count(span);

    let scene_type = if dialogue_ratio > 0.45 {
        SceneType::Dialogue
    } else if tension >= 0.55 {
        SceneType::Action
    } else if introspection_density(span) > 0.02 {
        SceneType::Introspection
    } else if words < 60 {
        SceneType::Transition
    } else {
        SceneType::Description
    };

    Scene {
        id: format!("scene-{}", index),
        start_offset: range.start,
        end_offset: range.end,
        scene_type,
        pov: detect_pov(span),
        location: detect_location(span),
        time_marker: detect_time_marker(span),
        tension,
        dialogue_ratio,
    }
}

/// Narrative text with dialogue blanked out (same length, same offsets)
fn narrative_only(span: &str) -> String {
    let mut out = span.to_string();
    for r in text::dialogue_ranges(span) {
        let blank = " ".repeat(r.len());
        out.replace_range(r, &blank);
    }
    out
}

fn detect_pov(span: &str) -> Option<String> {
    let narrative = narrative_only(span);
    if CommonPatterns::first_person().find_iter(&narrative).count() >= 2 {
        return Some("first-person".to_string());
    }

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, m) in CommonPatterns::name_run().find_iter(&narrative).enumerate() {
        let name = m.as_str().split_whitespace().next().unwrap_or("");
        let name = name.trim_end_matches("’s").trim_end_matches("'s");
        if name.len() < 2 || EntityDictionaries::non_names().contains(name) {
            continue;
        }
        let entry = counts.entry(name).or_insert((0, order));
        entry.0 += 1;
    }

    counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= 2)
        // most mentions wins; earliest first mention breaks ties
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(name, _)| name.to_string())
}

fn detect_location(span: &str) -> Option<String> {
    CommonPatterns::location_phrase()
        .captures_iter(span)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|candidate| {
            let first_char_upper = candidate.chars().next().is_some_and(char::is_uppercase);
            if first_char_upper {
                let head = candidate.split_whitespace().next().unwrap_or("");
                !EntityDictionaries::non_names().contains(head)
            } else {
                NarrativeDictionaries::setting_nouns().contains(*candidate)
            }
        })
        .map(str::to_string)
}

fn time_marker_pattern() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        let alternatives = NarrativeDictionaries::time_markers()
            .iter()
            .map(|marker| regex::escape(marker))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("Valid time marker regex")
    });
    &PATTERN
}

/// Earliest dictionary time marker in `span`, with the span's own casing.
fn detect_time_marker(span: &str) -> Option<String> {
    time_marker_pattern()
        .find(span)
        .map(|m| m.as_str().to_string())
}

fn dialogue_map(text: &str) -> Vec<DialogueLine> {
    CommonPatterns::dialogue()
        .find_iter(text)
        .map(|m| {
            let speaker = CommonPatterns::speaker_after_quote()
                .captures(&text[m.end()..])
                .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                .map(|s| s.as_str().to_string());
            DialogueLine {
                offset: m.start(),
                length: m.len(),
                speaker,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = "### The Harbor\n\
Mara walked along the pier in the harbor. Mara watched the ships.\n\
\"We sail tonight,\" said Tobin.\n\
\n\
* * *\n\
\n\
Blood on the deck! Mara screamed. Run!\n\
\n\
\n\
\n\
The next morning the sea was calm.\n";

    #[test]
    fn test_scene_segmentation() {
        let structure = parse_structure(CHAPTER);
        assert_eq!(structure.stats.scene_count, 3);
        assert!(structure
            .scenes
            .iter()
            .all(|s| s.end_offset > s.start_offset));
        assert!(CHAPTER[structure.scenes[0].range()].starts_with("Mara walked"));
        assert!(CHAPTER[structure.scenes[2].range()].starts_with("The next morning"));
    }

    #[test]
    fn test_break_markers_are_not_paragraphs() {
        let structure = parse_structure(CHAPTER);
        assert_eq!(structure.stats.paragraph_count, 4);
    }

    #[test]
    fn test_scene_attributes() {
        let structure = parse_structure(CHAPTER);
        let first = &structure.scenes[0];
        assert_eq!(first.pov.as_deref(), Some("Mara"));
        assert_eq!(first.location.as_deref(), Some("harbor"));

        let action = &structure.scenes[1];
        assert!(action.tension > first.tension);
        assert_eq!(action.scene_type, SceneType::Action);

        assert_eq!(
            structure.scenes[2].time_marker.as_deref(),
            Some("The next morning")
        );
    }

    #[test]
    fn test_time_marker_next_to_case_changing_letters() {
        // Kelvin sign and dotted capital I change byte length when lowercased
        let text = "\u{212A} the next morning she left \u{0130}\u{0130}.\n";
        let structure = parse_structure(text);
        assert_eq!(structure.scenes.len(), 1);
        assert_eq!(
            structure.scenes[0].time_marker.as_deref(),
            Some("the next morning")
        );

        let shifted = parse_structure("\u{0130}\u{0130}\u{0130} At Dawn the gates opened.\n");
        assert_eq!(shifted.scenes[0].time_marker.as_deref(), Some("At Dawn"));
    }

    #[test]
    fn test_dialogue_map() {
        let structure = parse_structure(CHAPTER);
        assert_eq!(structure.dialogue_map.len(), 1);
        assert_eq!(structure.dialogue_map[0].speaker.as_deref(), Some("Tobin"));
        assert!(structure.stats.dialogue_ratio > 0.0);
    }

    #[test]
    fn test_empty_text() {
        let structure = parse_structure("");
        assert_eq!(structure, StructuralFingerprint::default());
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_structure(CHAPTER), parse_structure(CHAPTER));
    }
}
