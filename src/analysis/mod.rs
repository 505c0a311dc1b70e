//! Analyzer suite
//!
//! Pure functions from chapter text (plus prior state where noted) to a
//! fragment of the intelligence model:
//!
//! - [`parse_structure`]: scenes, paragraphs, dialogue map, stats
//! - [`extract_entities`]: characters, locations, objects and co-occurrence
//! - [`analyze_style`]: vocabulary, syntax, flags, rhythm
//! - [`build_timeline`]: promises and time markers
//! - [`build_heatmap`]: per-section risk
//! - [`build_hud`]: cursor-scoped summary
//!
//! [`AnalysisCache`] wraps each analyzer with content-hash memoization.

pub mod cache;
pub mod entities;
pub mod heatmap;
pub mod hud;
pub mod model;
pub mod selectors;
pub mod structural;
pub mod style;
pub mod timeline;
pub mod utils;

pub use cache::{AnalysisCache, CacheStats, ContentHash};
pub use entities::{extract_entities, EntityEdge, EntityGraph, EntityNode, EntityType};
pub use heatmap::{build_heatmap, Heatmap, HeatmapBuilder, HeatmapSection, RiskScores, SectionFlag};
pub use hud::{build_hud, ManuscriptHud};
pub use model::{create_empty_intelligence, CacheInfo, ManuscriptIntelligence};
pub use selectors::{current_scene_at, high_risk_sections, open_promises, style_alerts};
pub use structural::{
    parse_structure, Paragraph, ParagraphKind, Scene, SceneType, StructuralFingerprint, StructuralStats,
};
pub use style::{
    analyze_style, calculate_readability, compare_styles, GradeLevel, Readability, StyleAnalyzer,
    StyleComparison, StyleReport,
};
pub use timeline::{build_timeline, PromiseRecord, PromiseType, Timeline, TimelineEvent};

use chrono::Utc;

/// Full analyzer pass over one chapter
pub fn analyze_chapter(chapter_id: &str, text: &str, previous: Option<&Timeline>) -> ManuscriptIntelligence {
    let structural = parse_structure(text);
    let entities = extract_entities(text, chapter_id);
    let style = analyze_style(text);
    let timeline = build_timeline(text, chapter_id, previous);
    let heatmap = build_heatmap(&structural, &style, &timeline);
    assemble(chapter_id, text, structural, entities, style, timeline, heatmap)
}

/// Full analyzer pass through the cache, with configured heatmap settings
pub fn analyze_chapter_cached(
    cache: &AnalysisCache,
    heatmap: &HeatmapBuilder,
    chapter_id: &str,
    text: &str,
    previous: Option<&Timeline>,
) -> ManuscriptIntelligence {
    let structural = cache.parse_structure_cached(text);
    let entities = cache.extract_entities_cached(text, chapter_id);
    let style = cache.analyze_style_cached(text);
    let timeline = cache.build_timeline_cached(text, chapter_id, previous);
    let heatmap = heatmap.build(&structural, &style, &timeline);
    assemble(chapter_id, text, structural, entities, style, timeline, heatmap)
}

fn assemble(
    chapter_id: &str,
    text: &str,
    structural: StructuralFingerprint,
    entities: EntityGraph,
    style: StyleReport,
    timeline: Timeline,
    heatmap: Heatmap,
) -> ManuscriptIntelligence {
    let mut intelligence = ManuscriptIntelligence {
        chapter_id: chapter_id.to_string(),
        structural,
        entities,
        style,
        timeline,
        heatmap,
        hud: ManuscriptHud::default(),
        cache: CacheInfo {
            hash: ContentHash::from_content(text).to_hex(),
            timestamp: Utc::now(),
        },
    };
    intelligence.hud = build_hud(&intelligence, 0);
    intelligence
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Mara vowed to find the silver key.\n\"Tonight,\" said Tobin.\n\n\n\nThe door was opened by Mara. At last she found the silver key.\n";

    #[test]
    fn test_analyze_chapter_populates_everything() {
        let intel = analyze_chapter("ch1", TEXT, None);
        assert_eq!(intel.chapter_id, "ch1");
        assert_eq!(intel.structural.stats.scene_count, 2);
        assert!(!intel.entities.nodes.is_empty());
        assert_eq!(intel.style.flags.passive_voice.instances.len(), 1);
        assert!(intel.timeline.promises.iter().any(|p| p.resolved));
        assert!(!intel.heatmap.sections.is_empty());
        assert_eq!(intel.cache.hash, ContentHash::from_content(TEXT).to_hex());
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let a = analyze_chapter("ch1", TEXT, None);
        let b = analyze_chapter("ch1", TEXT, None);
        assert_eq!(a.structural, b.structural);
        assert_eq!(a.entities, b.entities);
        assert_eq!(a.style, b.style);
        assert_eq!(a.timeline, b.timeline);
        assert_eq!(a.heatmap, b.heatmap);
        assert_eq!(a.hud, b.hud);
    }

    #[test]
    fn test_cached_pipeline_matches() {
        let cache = AnalysisCache::default();
        let builder = HeatmapBuilder::default();
        let plain = analyze_chapter("ch1", TEXT, None);
        let cached = analyze_chapter_cached(&cache, &builder, "ch1", TEXT, None);
        assert_eq!(plain.heatmap, cached.heatmap);
        assert_eq!(plain.hud, cached.hud);
        assert_eq!(plain.cache.hash, cached.cache.hash);
    }
}
