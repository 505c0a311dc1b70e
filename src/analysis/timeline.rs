//! Timeline tracking
//!
//! Detects goal, setup, and payoff language and keeps a list of narrative
//! promises with their resolved state, plus explicit time markers.

use super::utils::{
    text::{self, floor_char_boundary},
    NarrativeDictionaries, PromisePatterns, StyleDictionaries,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

const MAX_QUOTE_BYTES: usize = 200;
const DESCRIPTION_WORDS: usize = 8;
const MIN_KEYWORD_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromiseType {
    Goal,
    Setup,
    Payoff,
}

impl PromiseType {
    pub fn label(&self) -> &'static str {
        match self {
            PromiseType::Goal => "goal",
            PromiseType::Setup => "setup",
            PromiseType::Payoff => "payoff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub promise_type: PromiseType,
    pub description: String,
    pub quote: String,
    pub offset: usize,
    pub chapter_id: String,
    pub resolved: bool,
}

/// An explicit time marker ("the next morning", "three days later")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub offset: usize,
    pub marker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Chapter this timeline was last built for
    pub chapter_id: String,
    pub events: Vec<TimelineEvent>,
    pub promises: Vec<PromiseRecord>,
}

impl Timeline {
    /// Promises detected in this timeline's own chapter
    pub fn own_promises(&self) -> impl Iterator<Item = &PromiseRecord> {
        self.for_chapter(&self.chapter_id)
    }

    /// Promises recorded for one chapter
    pub fn for_chapter<'a>(&'a self, chapter_id: &'a str) -> impl Iterator<Item = &'a PromiseRecord> {
        self.promises.iter().filter(move |p| p.chapter_id == chapter_id)
    }
}

fn time_marker_pattern() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        let listed = NarrativeDictionaries::time_markers()
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        let counted = r"(?:a|an|one|two|three|four|five|six|seven|eight|nine|ten|several|a few|\d+)\s+(?:hours?|days?|weeks?|months?|years?)\s+(?:later|passed)";
        let months = r"january|february|march|april|june|july|august|september|october|november|december";
        Regex::new(&format!(r"(?i)\b(?:{}|{}|{})\b", counted, listed, months))
            .expect("Valid time marker regex")
    });
    &PATTERN
}

struct Detection {
    record: PromiseRecord,
    keywords: HashSet<String>,
}

/// Build the timeline for one chapter.
///
/// Records from other chapters in `previous` are carried over; this
/// chapter's records are rebuilt from `text`. A goal or setup is resolved
/// when a later payoff shares a keyword with it. Resolution is recomputed
/// on every pass, so a promise can return to unresolved.
pub fn build_timeline(text: &str, chapter_id: &str, previous: Option<&Timeline>) -> Timeline {
    let mut detections = detect_promises(text, chapter_id);

    let payoffs: Vec<(usize, HashSet<String>)> = detections
        .iter()
        .filter(|d| d.record.promise_type == PromiseType::Payoff)
        .map(|d| (d.record.offset, d.keywords.clone()))
        .collect();

    for detection in detections
        .iter_mut()
        .filter(|d| d.record.promise_type != PromiseType::Payoff)
    {
        detection.record.resolved = payoffs.iter().any(|(offset, keywords)| {
            *offset > detection.record.offset && !keywords.is_disjoint(&detection.keywords)
        });
    }

    let mut promises: Vec<PromiseRecord> = Vec::new();
    if let Some(previous) = previous {
        for record in previous.promises.iter().filter(|p| p.chapter_id != chapter_id) {
            let mut record = record.clone();
            if record.promise_type != PromiseType::Payoff && !record.resolved {
                let keywords = keywords(&record.quote);
                record.resolved = payoffs.iter().any(|(_, k)| !k.is_disjoint(&keywords));
            }
            promises.push(record);
        }
    }
    promises.extend(detections.into_iter().map(|d| d.record));

    let events = time_marker_pattern()
        .find_iter(text)
        .map(|m| TimelineEvent {
            offset: m.start(),
            marker: m.as_str().to_string(),
        })
        .collect();

    Timeline {
        chapter_id: chapter_id.to_string(),
        events,
        promises,
    }
}

fn detect_promises(text: &str, chapter_id: &str) -> Vec<Detection> {
    let kinds: [(PromiseType, &Regex); 3] = [
        (PromiseType::Goal, PromisePatterns::goal()),
        (PromiseType::Setup, PromisePatterns::setup()),
        (PromiseType::Payoff, PromisePatterns::payoff()),
    ];

    let mut out = Vec::new();
    for sentence in text::sentences(text) {
        let span = &text[sentence.clone()];
        for (kind, pattern) in &kinds {
            let Some(m) = pattern.find(span) else {
                continue;
            };

            let quote = &span[..floor_char_boundary(span, MAX_QUOTE_BYTES)];
            let description = describe(m.as_str(), &span[m.end()..]);
            let without_trigger = format!("{} {}", &span[..m.start()], &span[m.end()..]);

            out.push(Detection {
                record: PromiseRecord {
                    id: promise_id(&description, quote, sentence.start),
                    promise_type: *kind,
                    description,
                    quote: quote.to_string(),
                    offset: sentence.start,
                    chapter_id: chapter_id.to_string(),
                    resolved: *kind == PromiseType::Payoff,
                },
                keywords: keywords(&without_trigger),
            });
        }
    }
    out
}

fn describe(trigger: &str, tail: &str) -> String {
    let tail_words: Vec<&str> = text::words(tail)
        .map(|(_, w)| w)
        .take(DESCRIPTION_WORDS)
        .collect();
    let trigger = trigger.to_lowercase();
    if tail_words.is_empty() {
        trigger
    } else {
        format!("{} {}", trigger, tail_words.join(" "))
    }
}

pub(crate) fn keywords(span: &str) -> HashSet<String> {
    let stopwords = StyleDictionaries::stopwords();
    text::words(span)
        .map(|(_, w)| w.to_lowercase())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS && !stopwords.contains(w.as_str()))
        .collect()
}

fn promise_id(description: &str, quote: &str, offset: usize) -> String {
    let mut hasher = DefaultHasher::new();
    description.hash(&mut hasher);
    quote.hash(&mut hasher);
    offset.hash(&mut hasher);
    format!("promise-{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Mara vowed to find the silver key. No one knew where the vault was sealed.\nThe next morning she searched the chapel.\nAt last she found the silver key beneath the altar.\n";

    #[test]
    fn test_detects_promise_types() {
        let timeline = build_timeline(TEXT, "ch1", None);
        let types: Vec<_> = timeline.promises.iter().map(|p| p.promise_type).collect();
        assert_eq!(
            types,
            vec![PromiseType::Goal, PromiseType::Setup, PromiseType::Payoff]
        );
        assert_eq!(timeline.promises[0].description, "vowed to find the silver key");
        assert_eq!(timeline.promises[0].quote, "Mara vowed to find the silver key.");
        assert_eq!(timeline.promises[0].offset, 0);
    }

    #[test]
    fn test_resolution_by_shared_keyword() {
        let timeline = build_timeline(TEXT, "ch1", None);
        let goal = &timeline.promises[0];
        let setup = &timeline.promises[1];
        assert!(goal.resolved);
        assert!(!setup.resolved);
    }

    #[test]
    fn test_resolution_can_flip_back() {
        let first = build_timeline(TEXT, "ch1", None);
        assert!(first.promises[0].resolved);

        let edited = "Mara vowed to find the silver key.\nShe slept.\n";
        let second = build_timeline(edited, "ch1", Some(&first));
        assert_eq!(second.promises.len(), 1);
        assert!(!second.promises[0].resolved);
    }

    #[test]
    fn test_ids_are_stable() {
        let a = build_timeline(TEXT, "ch1", None);
        let b = build_timeline(TEXT, "ch1", None);
        assert_eq!(a, b);
        assert!(a.promises[0].id.starts_with("promise-"));
        assert_ne!(a.promises[0].id, a.promises[1].id);
    }

    #[test]
    fn test_other_chapters_carried_and_resolved() {
        let earlier = build_timeline("Tobin swore to avenge the lighthouse keeper.\n", "ch1", None);
        assert!(!earlier.promises[0].resolved);

        let later = build_timeline(
            "Finally the lighthouse burned and the keeper was avenged.\n",
            "ch2",
            Some(&earlier),
        );
        let carried = later.for_chapter("ch1").next().expect("carried promise");
        assert!(carried.resolved);
        assert_eq!(later.own_promises().count(), 1);
    }

    #[test]
    fn test_time_marker_events() {
        let text = "The next morning the fog lifted. Three days later she left in March.";
        let timeline = build_timeline(text, "ch1", None);
        let markers: Vec<_> = timeline.events.iter().map(|e| e.marker.as_str()).collect();
        assert_eq!(markers, vec!["The next morning", "Three days later", "March"]);
        assert_eq!(timeline.events[0].offset, 0);
    }

    #[test]
    fn test_empty_text() {
        let timeline = build_timeline("", "ch1", None);
        assert_eq!(timeline.chapter_id, "ch1");
        assert!(timeline.events.is_empty());
        assert!(timeline.promises.is_empty());
    }
}
