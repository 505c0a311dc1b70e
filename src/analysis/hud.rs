//! HUD composition
//!
//! Compact situational summary for the editing surface, derived from
//! existing intelligence and a cursor offset. Never reanalyzes text.

use super::entities::{EntityEdge, EntityType};
use super::model::ManuscriptIntelligence;
use super::selectors;
use super::structural::{Paragraph, Scene, SceneType};
use super::timeline::PromiseRecord;
use serde::{Deserialize, Serialize};
use std::ops::Range;

const MAX_ACTIVE_ENTITIES: usize = 6;
const MAX_OPEN_PROMISES: usize = 5;
const MAX_ISSUES: usize = 8;
const CRITICAL_RISK: f64 = 0.7;
const WARNING_RISK: f64 = 0.4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensionLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl TensionLevel {
    pub fn from_tension(tension: f64) -> Self {
        if tension >= 0.66 {
            TensionLevel::High
        } else if tension >= 0.33 {
            TensionLevel::Medium
        } else {
            TensionLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TensionLevel::Low => "low",
            TensionLevel::Medium => "medium",
            TensionLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingLabel {
    Slow,
    #[default]
    Steady,
    Fast,
}

impl PacingLabel {
    pub fn label(&self) -> &'static str {
        match self {
            PacingLabel::Slow => "slow",
            PacingLabel::Steady => "steady",
            PacingLabel::Fast => "fast",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativePosition {
    /// zero-based index of the scene under the cursor
    pub scene_index: Option<usize>,
    pub total_scenes: usize,
    pub percent_complete: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFocus {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub mention_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HudIssue {
    pub severity: IssueSeverity,
    pub message: String,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManuscriptHud {
    pub cursor_offset: usize,
    pub current_scene: Option<Scene>,
    pub current_paragraph: Option<Paragraph>,
    pub position: NarrativePosition,
    pub tension: f64,
    pub tension_level: TensionLevel,
    pub pacing: PacingLabel,
    pub active_entities: Vec<EntityFocus>,
    pub active_relationships: Vec<EntityEdge>,
    pub open_promises: Vec<PromiseRecord>,
    pub prioritized_issues: Vec<HudIssue>,
}

/// Compose the HUD for `cursor` from existing intelligence
pub fn build_hud(intelligence: &ManuscriptIntelligence, cursor: usize) -> ManuscriptHud {
    let structural = &intelligence.structural;
    let current_scene = selectors::current_scene_at(&structural.scenes, cursor);
    let scene_index = current_scene.and_then(|s| structural.scenes.iter().position(|x| x.id == s.id));
    let current_paragraph = structural
        .paragraphs
        .iter()
        .find(|p| p.offset <= cursor && cursor <= p.offset + p.length);

    let doc_end = structural
        .scenes
        .last()
        .map(|s| s.end_offset)
        .into_iter()
        .chain(structural.paragraphs.last().map(|p| p.offset + p.length))
        .max()
        .unwrap_or(0);
    let percent_complete = if doc_end == 0 {
        0.0
    } else {
        cursor.min(doc_end) as f64 / doc_end as f64 * 100.0
    };

    let tension = current_paragraph
        .map(|p| p.tension)
        .or_else(|| current_scene.map(|s| s.tension))
        .unwrap_or(0.0);

    let scope: Option<Range<usize>> = current_scene
        .map(Scene::range)
        .or_else(|| current_paragraph.map(Paragraph::range));
    let (active_entities, active_relationships) = match &scope {
        Some(scope) => entities_in_scope(intelligence, scope),
        None => (Vec::new(), Vec::new()),
    };

    ManuscriptHud {
        cursor_offset: cursor,
        current_scene: current_scene.cloned(),
        current_paragraph: current_paragraph.cloned(),
        position: NarrativePosition {
            scene_index,
            total_scenes: structural.scenes.len(),
            percent_complete,
        },
        tension,
        tension_level: TensionLevel::from_tension(tension),
        pacing: pacing_for(current_scene),
        active_entities,
        active_relationships,
        open_promises: selectors::open_promises(&intelligence.timeline)
            .into_iter()
            .take(MAX_OPEN_PROMISES)
            .cloned()
            .collect(),
        prioritized_issues: prioritized_issues(intelligence, cursor),
    }
}

fn pacing_for(scene: Option<&Scene>) -> PacingLabel {
    match scene {
        Some(s) => match s.scene_type {
            SceneType::Action | SceneType::Dialogue => PacingLabel::Fast,
            SceneType::Description | SceneType::Introspection if s.tension < 0.3 => PacingLabel::Slow,
            _ => PacingLabel::Steady,
        },
        None => PacingLabel::Steady,
    }
}

fn entities_in_scope(
    intelligence: &ManuscriptIntelligence,
    scope: &Range<usize>,
) -> (Vec<EntityFocus>, Vec<EntityEdge>) {
    let mut focus: Vec<EntityFocus> = intelligence
        .entities
        .nodes
        .iter()
        .filter(|n| n.mentions.iter().any(|m| scope.contains(&m.offset)))
        .map(|n| EntityFocus {
            id: n.id.clone(),
            name: n.name.clone(),
            entity_type: n.entity_type,
            mention_count: n.mention_count,
        })
        .collect();
    focus.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then_with(|| a.name.cmp(&b.name)));
    focus.truncate(MAX_ACTIVE_ENTITIES);

    let in_focus = |id: &str| focus.iter().any(|f| f.id == id);
    let relationships = intelligence
        .entities
        .edges
        .iter()
        .filter(|e| in_focus(&e.source) && in_focus(&e.target))
        .cloned()
        .collect();

    (focus, relationships)
}

fn severity_for(risk: f64) -> IssueSeverity {
    if risk >= CRITICAL_RISK {
        IssueSeverity::Critical
    } else if risk >= WARNING_RISK {
        IssueSeverity::Warning
    } else {
        IssueSeverity::Info
    }
}

fn prioritized_issues(intelligence: &ManuscriptIntelligence, cursor: usize) -> Vec<HudIssue> {
    let mut issues = Vec::new();

    if let Some(section) = intelligence
        .heatmap
        .sections
        .iter()
        .find(|s| s.offset <= cursor && cursor < s.end())
    {
        let severity = severity_for(section.overall_risk);
        issues.extend(section.flags.iter().map(|flag| HudIssue {
            severity,
            message: format!("{} ({:.0}% risk)", flag.label(), section.overall_risk * 100.0),
            offset: Some(section.offset),
        }));
    }

    issues.extend(
        selectors::style_alerts(&intelligence.style)
            .into_iter()
            .map(|message| HudIssue {
                severity: IssueSeverity::Warning,
                message,
                offset: None,
            }),
    );

    issues.extend(
        selectors::high_risk_sections(&intelligence.heatmap, CRITICAL_RISK)
            .into_iter()
            .filter(|s| !(s.offset <= cursor && cursor < s.end()))
            .map(|s| HudIssue {
                severity: IssueSeverity::Info,
                message: format!("High-risk section at offset {}", s.offset),
                offset: Some(s.offset),
            }),
    );

    issues.sort_by(|a, b| b.severity.cmp(&a.severity));
    issues.truncate(MAX_ISSUES);
    issues
}
