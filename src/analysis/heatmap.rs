//! Heatmap building
//!
//! Splits the chapter into sections of roughly `section_target_words`
//! words along paragraph boundaries and scores each one on five risk
//! axes from the structural, style, and timeline fragments.

use super::structural::{ParagraphKind, StructuralFingerprint};
use super::style::StyleReport;
use super::timeline::Timeline;
use crate::config::HeatmapSettings;
use serde::{Deserialize, Serialize};

const FLAG_THRESHOLD: f64 = 0.6;
const LOW_TENSION: f64 = 0.2;
const LONG_SENTENCE_WORDS: f64 = 25.0;
const STYLE_FLAGS_PER_100_CEILING: f64 = 8.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskScores {
    pub plot_risk: f64,
    pub pacing_risk: f64,
    pub character_risk: f64,
    pub setting_risk: f64,
    pub style_risk: f64,
}

impl RiskScores {
    const WEIGHTS: [f64; 5] = [0.25, 0.2, 0.2, 0.15, 0.2];

    fn axes(&self) -> [f64; 5] {
        [
            self.plot_risk,
            self.pacing_risk,
            self.character_risk,
            self.setting_risk,
            self.style_risk,
        ]
    }

    /// Weighted mean pulled toward the worst axis, in `[0, 1]`
    pub fn overall(&self) -> f64 {
        let axes = self.axes();
        let weighted: f64 = axes.iter().zip(Self::WEIGHTS).map(|(a, w)| a * w).sum();
        let worst = axes.iter().copied().fold(0.0, f64::max);
        (0.7 * weighted + 0.3 * worst).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionFlag {
    PlotStall,
    SlowPacing,
    ThinCharacter,
    VagueSetting,
    ProseIssues,
    LowTension,
    NoDialogue,
    LongSentences,
}

impl SectionFlag {
    pub fn label(&self) -> &'static str {
        match self {
            SectionFlag::PlotStall => "plot stall",
            SectionFlag::SlowPacing => "slow pacing",
            SectionFlag::ThinCharacter => "thin character presence",
            SectionFlag::VagueSetting => "vague setting",
            SectionFlag::ProseIssues => "prose issues",
            SectionFlag::LowTension => "low tension",
            SectionFlag::NoDialogue => "no dialogue",
            SectionFlag::LongSentences => "long sentences",
        }
    }

    fn suggestion(&self) -> &'static str {
        match self {
            SectionFlag::PlotStall => "Introduce a goal, obstacle, or reveal to move the plot forward.",
            SectionFlag::SlowPacing => "Trim description or reflection, or break it up with action.",
            SectionFlag::ThinCharacter => "Anchor the section in a point-of-view character's reactions.",
            SectionFlag::VagueSetting => "Add a concrete sensory detail that places the reader.",
            SectionFlag::ProseIssues => "Revise passive constructions, adverbs, and filter words.",
            SectionFlag::LowTension => "Raise the stakes or add friction between characters.",
            SectionFlag::NoDialogue => "Consider voicing part of the section through dialogue.",
            SectionFlag::LongSentences => "Vary sentence length; split the longest sentences.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapSection {
    pub offset: usize,
    pub length: usize,
    pub scores: RiskScores,
    pub overall_risk: f64,
    pub flags: Vec<SectionFlag>,
    pub suggestions: Vec<String>,
}

impl HeatmapSection {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub sections: Vec<HeatmapSection>,
}

/// Heatmap builder with configurable section size
#[derive(Debug, Clone, Default)]
pub struct HeatmapBuilder {
    settings: HeatmapSettings,
}

impl HeatmapBuilder {
    pub fn new(settings: HeatmapSettings) -> Self {
        Self { settings }
    }

    pub fn build(
        &self,
        structural: &StructuralFingerprint,
        style: &StyleReport,
        timeline: &Timeline,
    ) -> Heatmap {
        let flagged: Vec<usize> = style.flags.all_offsets().collect();
        let promise_offsets: Vec<usize> = timeline.own_promises().map(|p| p.offset).collect();

        let sections = self
            .group_paragraphs(structural)
            .into_iter()
            .map(|(start, end)| {
                score_section(structural, &structural.paragraphs[start..end], &flagged, &promise_offsets)
            })
            .collect();

        Heatmap { sections }
    }

    /// Index ranges of paragraphs, each group reaching the target word
    /// count. Groups never straddle a scene boundary.
    fn group_paragraphs(&self, structural: &StructuralFingerprint) -> Vec<(usize, usize)> {
        let target = self.settings.section_target_words.max(1);
        let scene_index = |offset: usize| structural.scenes.iter().position(|s| s.contains(offset));

        let mut groups = Vec::new();
        let mut start = 0;
        let mut words = 0;
        for (i, paragraph) in structural.paragraphs.iter().enumerate() {
            if i > start && scene_index(paragraph.offset) != scene_index(structural.paragraphs[start].offset) {
                groups.push((start, i));
                start = i;
                words = 0;
            }
            words += paragraph.word_count;
            if words >= target {
                groups.push((start, i + 1));
                start = i + 1;
                words = 0;
            }
        }
        if start < structural.paragraphs.len() {
            groups.push((start, structural.paragraphs.len()));
        }
        groups
    }
}

/// Build a heatmap with default settings
pub fn build_heatmap(structural: &StructuralFingerprint, style: &StyleReport, timeline: &Timeline) -> Heatmap {
    HeatmapBuilder::default().build(structural, style, timeline)
}

fn score_section(
    structural: &StructuralFingerprint,
    paragraphs: &[super::structural::Paragraph],
    flagged: &[usize],
    promise_offsets: &[usize],
) -> HeatmapSection {
    let offset = paragraphs.first().map_or(0, |p| p.offset);
    let end = paragraphs.last().map_or(offset, |p| p.offset + p.length);
    let in_section = |o: &usize| (offset..end).contains(o);

    let words: usize = paragraphs.iter().map(|p| p.word_count).sum();
    let sentences: usize = paragraphs.iter().map(|p| p.sentence_count).sum();
    let n = paragraphs.len().max(1) as f64;
    let count_kind = |kind: ParagraphKind| paragraphs.iter().filter(|p| p.kind == kind).count() as f64;

    let tension = if words == 0 {
        0.0
    } else {
        paragraphs
            .iter()
            .map(|p| p.tension * p.word_count as f64)
            .sum::<f64>()
            / words as f64
    };
    let avg_sentence = words as f64 / sentences.max(1) as f64;
    let dialogue_share = count_kind(ParagraphKind::Dialogue) / n;
    let static_share = (count_kind(ParagraphKind::Description) + count_kind(ParagraphKind::Introspection)) / n;

    let scene = structural.scenes.iter().find(|s| s.contains(offset));
    let has_pov = scene.is_some_and(|s| s.pov.is_some());
    let has_location = scene.is_some_and(|s| s.location.is_some());
    let has_promise = promise_offsets.iter().any(in_section);
    let flag_count = flagged.iter().filter(|o| in_section(o)).count();

    let plot_risk = 0.6 * (1.0 - tension) + if has_promise { 0.0 } else { 0.4 };
    let pacing_risk =
        0.5 * static_share + 0.5 * ((avg_sentence - 15.0) / (LONG_SENTENCE_WORDS - 5.0)).clamp(0.0, 1.0);
    let character_risk = if has_pov { 0.0 } else { 0.5 } + 0.5 * (1.0 - (dialogue_share * 2.0).min(1.0));
    let setting_risk: f64 = if has_location { 0.0 } else { 0.6 }
        + if count_kind(ParagraphKind::Description) > 0.0 { 0.0 } else { 0.4 };
    let style_risk = if words == 0 {
        0.0
    } else {
        (flag_count as f64 * 100.0 / words as f64 / STYLE_FLAGS_PER_100_CEILING).min(1.0)
    };

    let scores = RiskScores {
        plot_risk: plot_risk.clamp(0.0, 1.0),
        pacing_risk: pacing_risk.clamp(0.0, 1.0),
        character_risk: character_risk.clamp(0.0, 1.0),
        setting_risk: setting_risk.clamp(0.0, 1.0),
        style_risk,
    };

    let mut flags = Vec::new();
    let axis_flags = [
        (scores.plot_risk, SectionFlag::PlotStall),
        (scores.pacing_risk, SectionFlag::SlowPacing),
        (scores.character_risk, SectionFlag::ThinCharacter),
        (scores.setting_risk, SectionFlag::VagueSetting),
        (scores.style_risk, SectionFlag::ProseIssues),
    ];
    flags.extend(axis_flags.iter().filter(|(s, _)| *s >= FLAG_THRESHOLD).map(|(_, f)| *f));
    if words > 0 && tension < LOW_TENSION {
        flags.push(SectionFlag::LowTension);
    }
    if dialogue_share == 0.0 {
        flags.push(SectionFlag::NoDialogue);
    }
    if avg_sentence > LONG_SENTENCE_WORDS {
        flags.push(SectionFlag::LongSentences);
    }

    let suggestions = flags.iter().map(|f| f.suggestion().to_string()).collect();

    HeatmapSection {
        offset,
        length: end - offset,
        overall_risk: scores.overall(),
        scores,
        flags,
        suggestions,
    }
}
