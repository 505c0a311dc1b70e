//! Pure derived views over the intelligence model

use super::heatmap::{Heatmap, HeatmapSection};
use super::structural::Scene;
use super::style::StyleReport;
use super::timeline::{PromiseRecord, Timeline};

const PASSIVE_RATIO_ALERT: f64 = 0.2;
const ADVERB_DENSITY_ALERT: f64 = 0.04;
const FILTER_DENSITY_ALERT: f64 = 0.03;
const LONG_SENTENCE_ALERT: f64 = 25.0;
const LOW_DIVERSITY_ALERT: f64 = 0.4;
const LOW_DIVERSITY_MIN_WORDS: usize = 100;

/// First scene with `start <= cursor < end`
pub fn current_scene_at(scenes: &[Scene], cursor: usize) -> Option<&Scene> {
    scenes.iter().find(|s| s.contains(cursor))
}

/// Human-readable alerts for style metrics past their thresholds
pub fn style_alerts(style: &StyleReport) -> Vec<String> {
    let mut alerts = Vec::new();
    let flags = &style.flags;

    if flags.passive_voice.ratio > PASSIVE_RATIO_ALERT {
        alerts.push(format!(
            "High passive voice: {:.0}% of sentences",
            flags.passive_voice.ratio * 100.0
        ));
    }
    if flags.adverbs.density > ADVERB_DENSITY_ALERT {
        alerts.push(format!(
            "Adverb-heavy prose: {} adverbs ({:.1}% of words)",
            flags.adverbs.instances.len(),
            flags.adverbs.density * 100.0
        ));
    }
    if flags.filter_words.density > FILTER_DENSITY_ALERT {
        alerts.push(format!(
            "Filter words distance the reader: {} instances",
            flags.filter_words.instances.len()
        ));
    }
    if !flags.cliches.is_empty() {
        alerts.push(format!("{} cliché(s) detected", flags.cliches.len()));
    }
    if let Some(phrase) = flags.repeated_phrases.first() {
        alerts.push(format!("Repeated phrase \"{}\" ({} times)", phrase.phrase, phrase.count));
    }
    if style.syntax.avg_sentence_length > LONG_SENTENCE_ALERT {
        alerts.push(format!(
            "Long sentences: {:.1} words on average",
            style.syntax.avg_sentence_length
        ));
    }
    if style.vocabulary.total_words >= LOW_DIVERSITY_MIN_WORDS
        && style.vocabulary.lexical_diversity < LOW_DIVERSITY_ALERT
    {
        alerts.push(format!(
            "Low vocabulary variety: {:.0}% unique words",
            style.vocabulary.lexical_diversity * 100.0
        ));
    }

    alerts
}

/// Promises not yet resolved
pub fn open_promises(timeline: &Timeline) -> Vec<&PromiseRecord> {
    timeline.promises.iter().filter(|p| !p.resolved).collect()
}

/// Sections with `overall_risk >= threshold`, riskiest first. Ties keep
/// document order.
pub fn high_risk_sections(heatmap: &Heatmap, threshold: f64) -> Vec<&HeatmapSection> {
    let mut sections: Vec<&HeatmapSection> = heatmap
        .sections
        .iter()
        .filter(|s| s.overall_risk >= threshold)
        .collect();
    sections.sort_by(|a, b| b.overall_risk.total_cmp(&a.overall_risk));
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::heatmap::RiskScores;
    use crate::analysis::style::analyze_style;
    use crate::analysis::timeline::build_timeline;

    fn section(offset: usize, overall_risk: f64) -> HeatmapSection {
        HeatmapSection {
            offset,
            length: 10,
            scores: RiskScores::default(),
            overall_risk,
            flags: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn test_high_risk_sections_filtered_and_sorted() {
        let heatmap = Heatmap {
            sections: vec![
                section(0, 0.1),
                section(10, 0.5),
                section(20, 0.2),
                section(30, 0.9),
                section(40, 0.5),
            ],
        };
        let risky = high_risk_sections(&heatmap, 0.2);
        let offsets: Vec<_> = risky.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![30, 10, 40, 20]);
    }

    #[test]
    fn test_current_scene_at_half_open() {
        let structural = crate::analysis::structural::parse_structure("One.\n* * *\nTwo.\n");
        let scenes = &structural.scenes;
        assert_eq!(current_scene_at(scenes, 0).map(|s| s.id.as_str()), Some("scene-0"));
        assert_eq!(current_scene_at(scenes, 4), None);
        assert_eq!(current_scene_at(scenes, 12).map(|s| s.id.as_str()), Some("scene-1"));
        assert_eq!(current_scene_at(scenes, 500), None);
    }

    #[test]
    fn test_style_alerts() {
        let style = analyze_style("The door was opened. The bell was rung. Time stood still.");
        let alerts = style_alerts(&style);
        assert!(alerts.iter().any(|a| a.starts_with("High passive voice")));
        assert!(alerts.iter().any(|a| a.contains("cliché")));
        assert!(style_alerts(&analyze_style("")).is_empty());
    }

    #[test]
    fn test_open_promises() {
        let timeline = build_timeline(
            "She vowed to find the silver key. No one knew about the cellar. At last she found the silver key.",
            "ch1",
            None,
        );
        let open = open_promises(&timeline);
        assert_eq!(open.len(), 1);
        assert!(open[0].quote.starts_with("No one knew"));
    }
}
