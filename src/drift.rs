//! Narrative drift detection
//!
//! Compares a stored authorial plan against the derived state of a chapter.
//! Heuristic only: the plan is scanned for tension, pacing, and dialogue
//! language, and its goal lines are cross-checked against the chapter's
//! promise records.

use crate::analysis::timeline::keywords;
use crate::analysis::{ManuscriptIntelligence, PromiseRecord, PromiseType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

const LOW_TENSION: f64 = 0.3;
const HIGH_TENSION: f64 = 0.6;
const SLOW_SENTENCE_LENGTH: f64 = 22.0;
const FAST_SENTENCE_LENGTH: f64 = 10.0;
const SPARSE_DIALOGUE: f64 = 0.1;
const HEAVY_DIALOGUE: f64 = 0.5;

/// A contradiction between the plan and the manuscript
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conflict {
    /// what the plan says
    pub previous: String,
    /// what the chapter shows
    pub current: String,
}

struct PlanPatterns;

impl PlanPatterns {
    fn high_tension() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:high[- ]tension|tense|climax|climactic|gripping|action[- ]packed|explosive|confrontation|showdown|heart[- ]pounding)\b")
                .expect("Valid high tension regex")
        });
        &PATTERN
    }

    fn low_tension() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:quiet|calm|gentle|reflective|slow[- ]burn|breather|peaceful|low[- ]key)\b")
                .expect("Valid low tension regex")
        });
        &PATTERN
    }

    fn fast_pacing() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:fast[- ]paced|brisk|rapid|quick pace|breakneck|urgent)\b")
                .expect("Valid fast pacing regex")
        });
        &PATTERN
    }

    fn slow_pacing() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:slow[- ]paced|leisurely|languid|unhurried|lingering)\b")
                .expect("Valid slow pacing regex")
        });
        &PATTERN
    }

    fn dialogue_heavy() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:dialogue[- ]heavy|conversation|argument|banter|debate|interrogation)\b")
                .expect("Valid dialogue regex")
        });
        &PATTERN
    }

    fn no_dialogue() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:no dialogue|silent|wordless|alone|solitude)\b").expect("Valid solitude regex")
        });
        &PATTERN
    }

    fn active_goal() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:goal|must|needs? to|wants? to|still|unresolved|open|pending|not yet)\b")
                .expect("Valid active goal regex")
        });
        &PATTERN
    }

    fn resolved() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\b(?:resolved|resolves|done|completed|achieved|solved|closed|paid off|fulfilled)\b")
                .expect("Valid resolved regex")
        });
        &PATTERN
    }
}

/// Plan text as bare lines, list markers removed
fn plan_lines(plan: &str) -> Vec<&str> {
    plan.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '#' || c == '>' || c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn shares_keyword(line_keywords: &HashSet<String>, record: &PromiseRecord) -> bool {
    !line_keywords.is_disjoint(&keywords(&record.quote))
}

/// Contradictions between `plan` and the chapter's derived state
pub fn check_narrative_drift(intelligence: &ManuscriptIntelligence, plan: &str) -> Vec<Conflict> {
    let mut conflicts: Vec<Conflict> = Vec::new();
    let stats = &intelligence.structural.stats;
    if plan.trim().is_empty() || stats.word_count == 0 {
        return conflicts;
    }

    let mut push = |conflict: Conflict| {
        if !conflicts.contains(&conflict) {
            conflicts.push(conflict);
        }
    };

    if let Some(m) = PlanPatterns::high_tension().find(plan) {
        if stats.avg_tension < LOW_TENSION {
            push(Conflict {
                previous: format!("Plan calls for high tension (\"{}\")", m.as_str()),
                current: format!("Chapter tension averages {:.2}", stats.avg_tension),
            });
        }
    }
    if let Some(m) = PlanPatterns::low_tension().find(plan) {
        if stats.avg_tension > HIGH_TENSION {
            push(Conflict {
                previous: format!("Plan calls for a quiet chapter (\"{}\")", m.as_str()),
                current: format!("Chapter tension averages {:.2}", stats.avg_tension),
            });
        }
    }

    if let Some(m) = PlanPatterns::fast_pacing().find(plan) {
        if stats.avg_sentence_length > SLOW_SENTENCE_LENGTH {
            push(Conflict {
                previous: format!("Plan calls for fast pacing (\"{}\")", m.as_str()),
                current: format!(
                    "Sentences average {:.1} words, which reads slowly",
                    stats.avg_sentence_length
                ),
            });
        }
    }
    if let Some(m) = PlanPatterns::slow_pacing().find(plan) {
        if stats.avg_sentence_length < FAST_SENTENCE_LENGTH {
            push(Conflict {
                previous: format!("Plan calls for slow pacing (\"{}\")", m.as_str()),
                current: format!(
                    "Sentences average {:.1} words, which reads quickly",
                    stats.avg_sentence_length
                ),
            });
        }
    }

    if let Some(m) = PlanPatterns::dialogue_heavy().find(plan) {
        if stats.dialogue_ratio < SPARSE_DIALOGUE {
            push(Conflict {
                previous: format!("Plan centres on dialogue (\"{}\")", m.as_str()),
                current: format!("Only {:.0}% of the chapter is dialogue", stats.dialogue_ratio * 100.0),
            });
        }
    }
    if let Some(m) = PlanPatterns::no_dialogue().find(plan) {
        if stats.dialogue_ratio > HEAVY_DIALOGUE {
            push(Conflict {
                previous: format!("Plan keeps the chapter quiet (\"{}\")", m.as_str()),
                current: format!("{:.0}% of the chapter is dialogue", stats.dialogue_ratio * 100.0),
            });
        }
    }

    let own: Vec<&PromiseRecord> = intelligence.timeline.own_promises().collect();
    for line in plan_lines(plan) {
        let resolved_line = PlanPatterns::resolved().is_match(line);
        let active_line = !resolved_line && PlanPatterns::active_goal().is_match(line);
        if !resolved_line && !active_line {
            continue;
        }
        let line_keywords = keywords(line);

        if active_line {
            if let Some(payoff) = own
                .iter()
                .find(|p| p.promise_type == PromiseType::Payoff && shares_keyword(&line_keywords, p))
            {
                push(Conflict {
                    previous: format!("Plan lists an active goal: {}", line),
                    current: format!("The chapter already resolves it: \"{}\"", payoff.quote),
                });
            }
        } else if let Some(open) = own
            .iter()
            .find(|p| p.promise_type != PromiseType::Payoff && !p.resolved && shares_keyword(&line_keywords, p))
        {
            push(Conflict {
                previous: format!("Plan marks as resolved: {}", line),
                current: format!("Still open in the chapter: \"{}\"", open.quote),
            });
        }
    }

    debug!(
        "Drift check for {} found {} conflicts",
        intelligence.chapter_id,
        conflicts.len()
    );
    conflicts
}
