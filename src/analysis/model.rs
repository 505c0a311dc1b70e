//! Aggregate intelligence model for one chapter

use super::entities::EntityGraph;
use super::heatmap::Heatmap;
use super::hud::ManuscriptHud;
use super::structural::StructuralFingerprint;
use super::style::StyleReport;
use super::timeline::Timeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content hash of the analyzed text and when the analysis ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

impl Default for CacheInfo {
    fn default() -> Self {
        Self {
            hash: String::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Derived model of one chapter. Every fragment is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManuscriptIntelligence {
    pub chapter_id: String,
    pub structural: StructuralFingerprint,
    pub entities: EntityGraph,
    pub style: StyleReport,
    pub timeline: Timeline,
    pub heatmap: Heatmap,
    pub hud: ManuscriptHud,
    pub cache: CacheInfo,
}

/// Zeroed intelligence for a freshly registered chapter
pub fn create_empty_intelligence(chapter_id: &str) -> ManuscriptIntelligence {
    ManuscriptIntelligence {
        chapter_id: chapter_id.to_string(),
        timeline: Timeline {
            chapter_id: chapter_id.to_string(),
            ..Timeline::default()
        },
        ..ManuscriptIntelligence::default()
    }
}
