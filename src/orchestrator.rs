//! Tiered intelligence orchestrator
//!
//! Owns one chapter's [`ManuscriptIntelligence`] and recomputes it at three
//! latency tiers:
//! - Instant: counts, scene at cursor, cursor tension (once per scheduler tick)
//! - Debounced: dialogue ratio, sentence length, paragraph kind at cursor
//! - Background: full analyzer pass through the worker pool
//!
//! Only the background tier replaces the analyzed fragments. The instant and
//! debounced tiers write [`LiveMetrics`]; cursor moves rebuild the HUD.
//!
//! With a [`ChunkManager`] attached, per-scene digests in [`LiveMetrics`]
//! come from the chunk analyses whose content still matches the text.

use crate::analysis::structural::{build_paragraph, estimate_tension, scene_segments};
use crate::analysis::utils::text;
use crate::analysis::{
    build_hud, calculate_readability, create_empty_intelligence, high_risk_sections, open_promises,
    style_alerts, ContentHash, ManuscriptHud, ManuscriptIntelligence, ParagraphKind, Timeline,
};
use crate::config::TierSettings;
use crate::error::{AnalysisError, FolioError, PoolError, Result};
use crate::pool::{Job, JobKind, JobPriority, JobResult, WorkerPool};
use crate::scheduling::{Chunk, ChunkEvent, ChunkManager, TimerSlot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const CONTEXT_MAX_SCENES: usize = 12;
const CONTEXT_MAX_ENTITIES: usize = 10;
const CONTEXT_MAX_RISKS: usize = 5;
const EXCERPT_CHARS: usize = 400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingTier {
    #[default]
    Idle,
    Instant,
    Debounced,
    Background,
}

/// Cheap metrics maintained by the instant and debounced tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    /// text generation these metrics were computed from
    pub generation: u64,
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub scene_count: usize,
    pub scene_index: Option<usize>,
    pub cursor_tension: f64,
    // debounced
    pub dialogue_ratio: f64,
    pub avg_sentence_length: f64,
    pub paragraph_kind: Option<ParagraphKind>,
    /// one entry per current scene; `None` until its chunk is analyzed
    pub scene_digests: Vec<Option<SceneDigest>>,
}

/// Chunk analysis summary for one scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDigest {
    pub chunk_id: String,
    pub tension: f64,
    pub word_count: usize,
    pub dialogue_ratio: f64,
    pub avg_sentence_length: f64,
    pub passive_ratio: f64,
}

pub type CompletionCallback = Arc<dyn Fn(Arc<ManuscriptIntelligence>) + Send + Sync>;

/// Optional host capability for running work when the UI is idle
pub trait IdleHook: Send + Sync {
    fn request_idle(&self, task: Box<dyn FnOnce() + Send>);
}

struct State {
    text: String,
    cursor: usize,
    generation: u64,
    intelligence: Arc<ManuscriptIntelligence>,
    metrics: LiveMetrics,
    tier: ProcessingTier,
    last_processed_at: Option<DateTime<Utc>>,
    instant_pending: bool,
    instant_passes: u64,
    debounce_timer: TimerSlot,
    background_timer: TimerSlot,
    /// generation of the background job currently submitted
    background_inflight: Option<u64>,
    previous_timeline: Option<Timeline>,
    waiters: Vec<oneshot::Sender<Result<Arc<ManuscriptIntelligence>>>>,
    closed: bool,
}

struct Inner {
    chapter_id: String,
    tiers: TierSettings,
    pool: Arc<WorkerPool>,
    state: Mutex<State>,
    on_complete: Mutex<Option<CompletionCallback>>,
    idle_hook: Mutex<Option<Arc<dyn IdleHook>>>,
    chunks: Mutex<Option<ChunkManager>>,
}

fn paragraph_at(lines: &[Range<usize>], cursor: usize) -> Option<Range<usize>> {
    lines
        .iter()
        .find(|r| r.start <= cursor && cursor <= r.end)
        .cloned()
}

fn instant_metrics(text: &str, cursor: usize, metrics: &mut LiveMetrics) {
    let lines = text::lines(text);
    let scenes = scene_segments(text);
    metrics.word_count = text::word_count(text);
    metrics.sentence_count = text::sentences(text).len();
    metrics.paragraph_count = lines.len();
    metrics.scene_count = scenes.len();
    metrics.scene_index = scenes.iter().position(|r| r.start <= cursor && cursor < r.end);
    metrics.cursor_tension = paragraph_at(&lines, cursor)
        .map(|r| estimate_tension(&text[r]))
        .unwrap_or(0.0);
}

fn debounced_metrics(text: &str, cursor: usize, metrics: &mut LiveMetrics) {
    let sentences = text::sentences(text);
    metrics.dialogue_ratio = text::dialogue_ratio(text);
    metrics.avg_sentence_length = if sentences.is_empty() {
        0.0
    } else {
        text::word_count(text) as f64 / sentences.len() as f64
    };
    metrics.paragraph_kind = paragraph_at(&text::lines(text), cursor).map(|r| build_paragraph(text, r).kind);
}

/// Match each scene of `text` to the chunk with identical content
fn chunk_digests(text: &str, chunks: &[Chunk]) -> Vec<Option<SceneDigest>> {
    scene_segments(text)
        .into_iter()
        .map(|range| {
            let hash = ContentHash::from_content(&text[range]);
            let chunk = chunks.iter().find(|c| c.hash == hash)?;
            let analysis = chunk.analysis.as_ref()?;
            let stats = &analysis.structural.stats;
            Some(SceneDigest {
                chunk_id: chunk.id.clone(),
                tension: stats.avg_tension,
                word_count: stats.word_count,
                dialogue_ratio: stats.dialogue_ratio,
                avg_sentence_length: analysis.style.syntax.avg_sentence_length,
                passive_ratio: analysis.style.flags.passive_voice.ratio,
            })
        })
        .collect()
}

impl Inner {
    fn run_instant(&self) {
        let mut state = self.state.lock();
        state.instant_pending = false;
        if state.closed {
            return;
        }
        let State {
            text,
            cursor,
            generation,
            metrics,
            ..
        } = &mut *state;
        instant_metrics(text, *cursor, metrics);
        metrics.generation = *generation;
        state.instant_passes += 1;
    }

    fn attached_chunks(&self) -> Option<Vec<Chunk>> {
        let manager = self.chunks.lock().clone()?;
        Some(manager.chunks(&self.chapter_id))
    }

    fn run_debounced(&self) {
        let chunks = self.attached_chunks();
        let mut state = self.state.lock();
        let State {
            text,
            cursor,
            metrics,
            tier,
            ..
        } = &mut *state;
        debounced_metrics(text, *cursor, metrics);
        if let Some(chunks) = chunks {
            metrics.scene_digests = chunk_digests(text, &chunks);
        }
        if *tier == ProcessingTier::Instant {
            *tier = ProcessingTier::Debounced;
        }
    }

    /// Refresh scene digests after the chunk manager analyzed something
    fn absorb_chunks(&self) {
        let Some(chunks) = self.attached_chunks() else {
            return;
        };
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let State { text, metrics, .. } = &mut *state;
        metrics.scene_digests = chunk_digests(text, &chunks);
    }

    fn start_background(inner: &Arc<Inner>) {
        let job = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            state.tier = ProcessingTier::Background;
            if state.background_inflight == Some(state.generation) {
                debug!(
                    "Background pass for {} already running at generation {}",
                    inner.chapter_id, state.generation
                );
                return;
            }
            state.background_inflight = Some(state.generation);
            Job::new(JobKind::FullAnalysis, inner.chapter_id.clone(), state.text.clone())
                .with_priority(JobPriority::High)
                .with_generation(state.generation)
                .with_previous(state.previous_timeline.clone())
        };

        debug!("Background pass for {} at generation {}", inner.chapter_id, job.generation);
        let weak: Weak<Inner> = Arc::downgrade(inner);
        inner.pool.submit_job(job, move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.complete_background(result);
            }
        });
    }

    /// Accept a background result. A failed pass keeps the previous
    /// snapshot, skips the completion callback, and fails the waiters.
    fn complete_background(&self, result: JobResult) {
        let (outcome, waiters) = {
            let mut state = self.state.lock();
            if state.closed || result.generation != state.generation {
                debug!(
                    "Dropping stale background result for {} (generation {} != {})",
                    self.chapter_id, result.generation, state.generation
                );
                return;
            }

            state.tier = ProcessingTier::Idle;
            state.background_inflight = None;
            let intelligence = result.output.and_then(|output| {
                output.into_intelligence().ok_or_else(|| {
                    AnalysisError::Failed(format!("job {} produced no intelligence", result.job_id))
                })
            });
            let outcome = match intelligence {
                Ok(mut intelligence) => {
                    intelligence.hud = build_hud(&intelligence, state.cursor);
                    state.intelligence = Arc::new(intelligence);
                    state.last_processed_at = Some(Utc::now());
                    info!(
                        "Background analysis of {} finished in {:?}",
                        self.chapter_id, result.elapsed
                    );
                    Ok(Arc::clone(&state.intelligence))
                }
                Err(e) => {
                    warn!("Background analysis of {} failed: {}", self.chapter_id, e);
                    Err(e)
                }
            };
            (outcome, std::mem::take(&mut state.waiters))
        };

        if let Ok(snapshot) = &outcome {
            let callback = self.on_complete.lock().clone();
            if let Some(callback) = callback {
                callback(Arc::clone(snapshot));
            }
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone().map_err(FolioError::Analysis));
        }
    }

    fn on_background_timer(inner: &Arc<Inner>) {
        let hook = inner.idle_hook.lock().clone();
        match hook {
            Some(hook) => {
                let weak = Arc::downgrade(inner);
                hook.request_idle(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Inner::start_background(&inner);
                    }
                }));
            }
            None => Inner::start_background(inner),
        }
    }

    fn arm_background(inner: &Arc<Inner>, state: &mut State) {
        let weak = Arc::downgrade(inner);
        state
            .background_timer
            .arm(inner.tiers.background_delay, move |generation| async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.state.lock().background_timer.fired(generation) {
                    return;
                }
                Inner::on_background_timer(&inner);
            });
    }
}

/// Per-document façade over the three recomputation tiers.
///
/// Methods that arm timers must be called from within a Tokio runtime.
pub struct TieredOrchestrator {
    inner: Arc<Inner>,
}

impl TieredOrchestrator {
    pub fn new(chapter_id: &str, text: &str, tiers: TierSettings, pool: Arc<WorkerPool>) -> Self {
        let mut metrics = LiveMetrics::default();
        instant_metrics(text, 0, &mut metrics);
        debounced_metrics(text, 0, &mut metrics);

        Self {
            inner: Arc::new(Inner {
                chapter_id: chapter_id.to_string(),
                tiers,
                pool,
                state: Mutex::new(State {
                    text: text.to_string(),
                    cursor: 0,
                    generation: 0,
                    intelligence: Arc::new(create_empty_intelligence(chapter_id)),
                    metrics,
                    tier: ProcessingTier::Idle,
                    last_processed_at: None,
                    instant_pending: false,
                    instant_passes: 0,
                    debounce_timer: TimerSlot::new(),
                    background_timer: TimerSlot::new(),
                    background_inflight: None,
                    previous_timeline: None,
                    waiters: Vec::new(),
                    closed: false,
                }),
                on_complete: Mutex::new(None),
                idle_hook: Mutex::new(None),
                chunks: Mutex::new(None),
            }),
        }
    }

    pub fn chapter_id(&self) -> &str {
        &self.inner.chapter_id
    }

    /// Called with every accepted background snapshot
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(Arc<ManuscriptIntelligence>) + Send + Sync + 'static,
    {
        *self.inner.on_complete.lock() = Some(Arc::new(callback));
    }

    pub fn set_idle_hook(&self, hook: Option<Arc<dyn IdleHook>>) {
        *self.inner.idle_hook.lock() = hook;
    }

    /// Timeline of earlier chapters, passed to every later background pass
    pub fn set_previous_timeline(&self, previous: Option<Timeline>) {
        self.inner.state.lock().previous_timeline = previous;
    }

    /// Feed scene digests from `chunks`, which must track this chapter.
    /// Must be called from within a Tokio runtime.
    pub fn attach_chunks(&self, chunks: ChunkManager) {
        let mut events = chunks.subscribe();
        *self.inner.chunks.lock() = Some(chunks);
        self.inner.absorb_chunks();

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let ChunkEvent::ChunkProcessed { chapter_id, .. } = event else {
                    continue;
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.state.lock().closed {
                    break;
                }
                if chapter_id == inner.chapter_id {
                    inner.absorb_chunks();
                }
            }
        });
    }

    /// Replace the text. Runs the instant tier on the next tick and restarts
    /// the debounced and background timers.
    pub fn update_text(&self, text: &str) {
        let spawn_instant = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.closed {
                return;
            }
            state.text = text.to_string();
            state.generation += 1;
            state.cursor = text::floor_char_boundary(&state.text, state.cursor);
            state.tier = ProcessingTier::Instant;

            let weak = Arc::downgrade(&self.inner);
            state
                .debounce_timer
                .arm(self.inner.tiers.debounced_delay, move |generation| async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if inner.state.lock().debounce_timer.fired(generation) {
                        inner.run_debounced();
                    }
                });
            Inner::arm_background(&self.inner, state);

            !std::mem::replace(&mut state.instant_pending, true)
        };

        // a background job queued for older text is useless now
        self.inner.pool.cancel_chapter_jobs(&self.inner.chapter_id);

        if spawn_instant {
            let weak = Arc::downgrade(&self.inner);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                if let Some(inner) = weak.upgrade() {
                    inner.run_instant();
                }
            });
        }
    }

    /// Arm the background tier without changing the text
    pub fn schedule_background(&self) {
        let mut guard = self.inner.state.lock();
        if guard.closed {
            return;
        }
        Inner::arm_background(&self.inner, &mut guard);
    }

    /// Run the full analysis now and wait for the snapshot. Pending tier
    /// timers are superseded, and a pass already running for the current
    /// text is joined rather than repeated.
    pub async fn force_full_process(&self) -> Result<Arc<ManuscriptIntelligence>> {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::Terminated.into());
            }
            state.debounce_timer.cancel();
            state.background_timer.cancel();
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };
        self.inner.run_instant();
        self.inner.run_debounced();
        Inner::start_background(&self.inner);
        rx.await.map_err(|_| FolioError::Pool(PoolError::Terminated))?
    }

    /// Move the cursor and rebuild the HUD from existing intelligence
    pub fn update_cursor(&self, offset: usize) -> ManuscriptHud {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.cursor = text::floor_char_boundary(&state.text, offset);
        let hud = build_hud(&state.intelligence, state.cursor);
        Arc::make_mut(&mut state.intelligence).hud = hud.clone();
        hud
    }

    pub fn snapshot(&self) -> Arc<ManuscriptIntelligence> {
        Arc::clone(&self.inner.state.lock().intelligence)
    }

    pub fn live_metrics(&self) -> LiveMetrics {
        self.inner.state.lock().metrics.clone()
    }

    pub fn processing_tier(&self) -> ProcessingTier {
        self.inner.state.lock().tier
    }

    pub fn last_processed_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().last_processed_at
    }

    pub fn text(&self) -> String {
        self.inner.state.lock().text.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// Prompt-ready summary of the chapter. `compressed` gives a single
    /// paragraph; otherwise a sectioned digest.
    pub fn get_ai_context(&self, compressed: bool) -> String {
        let (intel, text, metrics) = {
            let state = self.inner.state.lock();
            (Arc::clone(&state.intelligence), state.text.clone(), state.metrics.clone())
        };
        let stats = &intel.structural.stats;
        let open = open_promises(&intel.timeline);
        let risks = high_risk_sections(&intel.heatmap, 0.0);

        if compressed {
            let mut out = format!(
                "Chapter {}: {} words, {} scenes, avg tension {:.2}, dialogue {:.0}%, pacing {}.",
                intel.chapter_id,
                metrics.word_count,
                stats.scene_count.max(metrics.scene_count),
                stats.avg_tension,
                metrics.dialogue_ratio * 100.0,
                intel.hud.pacing.label(),
            );
            let characters: Vec<&str> = intel
                .entities
                .nodes
                .iter()
                .filter(|n| n.entity_type == crate::analysis::EntityType::Character)
                .take(5)
                .map(|n| n.name.as_str())
                .collect();
            if !characters.is_empty() {
                out.push_str(&format!(" Characters: {}.", characters.join(", ")));
            }
            out.push_str(&format!(" Open promises: {}.", open.len()));
            if let Some(top) = risks.first() {
                out.push_str(&format!(" Highest risk {:.2} at offset {}.", top.overall_risk, top.offset));
            }
            return out;
        }

        let readability = calculate_readability(&text);
        let mut out = format!("## Chapter {}\n", intel.chapter_id);
        out.push_str(&format!(
            "Words: {} | Sentences: {} | Paragraphs: {} | Scenes: {}\n",
            metrics.word_count, metrics.sentence_count, metrics.paragraph_count, stats.scene_count
        ));
        out.push_str(&format!(
            "Dialogue: {:.0}% | Avg sentence: {:.1} words | Readability: {:.1} ({}), {} min read\n",
            metrics.dialogue_ratio * 100.0,
            metrics.avg_sentence_length,
            readability.flesch_kincaid,
            readability.grade_level.label(),
            readability.reading_time,
        ));

        if !intel.structural.scenes.is_empty() {
            out.push_str("\n### Scenes\n");
            for scene in intel.structural.scenes.iter().take(CONTEXT_MAX_SCENES) {
                out.push_str(&format!(
                    "- {} [{}..{}] {}, tension {:.2}",
                    scene.id,
                    scene.start_offset,
                    scene.end_offset,
                    scene.scene_type.label(),
                    scene.tension
                ));
                if let Some(pov) = &scene.pov {
                    out.push_str(&format!(", POV {}", pov));
                }
                if let Some(location) = &scene.location {
                    out.push_str(&format!(", at {}", location));
                }
                out.push('\n');
            }
        }

        if !intel.entities.nodes.is_empty() {
            out.push_str("\n### Entities\n");
            let mut nodes: Vec<_> = intel.entities.nodes.iter().collect();
            nodes.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
            for node in nodes.into_iter().take(CONTEXT_MAX_ENTITIES) {
                out.push_str(&format!(
                    "- {} ({}, {} mentions)\n",
                    node.name,
                    node.entity_type.label(),
                    node.mention_count
                ));
            }
        }

        if !open.is_empty() {
            out.push_str("\n### Open promises\n");
            for promise in &open {
                out.push_str(&format!("- [{}] {}\n", promise.promise_type.label(), promise.description));
            }
        }

        let alerts = style_alerts(&intel.style);
        if !alerts.is_empty() {
            out.push_str("\n### Style alerts\n");
            for alert in alerts {
                out.push_str(&format!("- {}\n", alert));
            }
        }

        if !risks.is_empty() {
            out.push_str("\n### Riskiest sections\n");
            for section in risks.into_iter().take(CONTEXT_MAX_RISKS) {
                let flags: Vec<&str> = section.flags.iter().map(|f| f.label()).collect();
                out.push_str(&format!(
                    "- [{}..{}] risk {:.2}: {}\n",
                    section.offset,
                    section.end(),
                    section.overall_risk,
                    if flags.is_empty() { "no flags".to_string() } else { flags.join(", ") }
                ));
            }
        }

        let position = &intel.hud.position;
        out.push_str(&format!(
            "\n### Cursor\nOffset {} | scene {} of {} ({:.0}% through) | tension {}\n",
            intel.hud.cursor_offset,
            position.scene_index.map_or(0, |i| i + 1),
            position.total_scenes,
            position.percent_complete,
            intel.hud.tension_level.label(),
        ));
        out
    }

    /// Digest of the scenes, entities, promises, and risk overlapping
    /// `start..end`
    pub fn get_section_context(&self, start: usize, end: usize) -> String {
        let (intel, text) = {
            let state = self.inner.state.lock();
            (Arc::clone(&state.intelligence), state.text.clone())
        };
        let start = text::floor_char_boundary(&text, start.min(end));
        let end = text::floor_char_boundary(&text, end.max(start));
        let range = start..end;
        let touches = |r: &Range<usize>| text::ranges_overlap(r, &range) || (range.is_empty() && r.contains(&start));

        let mut out = format!("## {} [{}..{}]\n", intel.chapter_id, start, end);

        let excerpt: String = text[range.clone()].chars().take(EXCERPT_CHARS).collect();
        if !excerpt.trim().is_empty() {
            out.push_str(&format!("> {}\n", excerpt.trim().replace('\n', "\n> ")));
        }

        let scenes: Vec<_> = intel.structural.scenes.iter().filter(|s| touches(&s.range())).collect();
        if !scenes.is_empty() {
            out.push_str("\nScenes:\n");
            for scene in scenes {
                out.push_str(&format!(
                    "- {} ({}, tension {:.2}{})\n",
                    scene.id,
                    scene.scene_type.label(),
                    scene.tension,
                    scene.pov.as_ref().map(|p| format!(", POV {}", p)).unwrap_or_default()
                ));
            }
        }

        let entities: Vec<(&str, usize)> = intel
            .entities
            .nodes
            .iter()
            .filter_map(|node| {
                let hits = node.mentions.iter().filter(|m| range.contains(&m.offset)).count();
                (hits > 0).then_some((node.name.as_str(), hits))
            })
            .collect();
        if !entities.is_empty() {
            out.push_str("\nEntities:\n");
            for (name, hits) in entities {
                out.push_str(&format!("- {} ({} mentions here)\n", name, hits));
            }
        }

        let promises: Vec<_> = intel
            .timeline
            .own_promises()
            .filter(|p| range.contains(&p.offset))
            .collect();
        if !promises.is_empty() {
            out.push_str("\nPromises:\n");
            for promise in promises {
                out.push_str(&format!(
                    "- [{}{}] {}\n",
                    promise.promise_type.label(),
                    if promise.resolved { ", resolved" } else { "" },
                    promise.description
                ));
            }
        }

        let sections: Vec<_> = intel
            .heatmap
            .sections
            .iter()
            .filter(|s| touches(&(s.offset..s.end())))
            .collect();
        if !sections.is_empty() {
            out.push_str("\nRisk:\n");
            for section in sections {
                out.push_str(&format!("- [{}..{}] {:.2}", section.offset, section.end(), section.overall_risk));
                if !section.suggestions.is_empty() {
                    out.push_str(&format!(": {}", section.suggestions.join(" ")));
                }
                out.push('\n');
            }
        }
        out
    }

    /// Cancel timers and queued work. Later results are discarded.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.generation += 1;
            state.debounce_timer.cancel();
            state.background_timer.cancel();
            state.waiters.clear();
            state.background_inflight = None;
            state.tier = ProcessingTier::Idle;
        }
        self.inner.chunks.lock().take();
        self.inner.pool.cancel_chapter_jobs(&self.inner.chapter_id);
        debug!("Orchestrator for {} shut down", self.inner.chapter_id);
    }
}

impl Drop for TieredOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{current_scene_at, parse_structure};
    use crate::config::ChunkSettings;
    use crate::pool::{AnalyzerJobHandler, JobHandler, JobOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TEXT: &str = "Mara ran to the harbor! The storm was coming.\n\n\"Wait,\" Tobin said. \"We need the boat.\"\n\n\n\nShe promised she would find the silver key.\n";

    fn orchestrator() -> TieredOrchestrator {
        TieredOrchestrator::new("ch1", TEXT, TierSettings::default(), Arc::new(WorkerPool::new(Some(0))))
    }

    fn counting(orch: &TieredOrchestrator) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        orch.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    #[test]
    fn test_new_starts_idle_with_empty_intelligence() {
        let orch = orchestrator();
        assert_eq!(orch.processing_tier(), ProcessingTier::Idle);
        assert!(orch.snapshot().structural.scenes.is_empty());
        assert_eq!(orch.live_metrics().scene_count, 2);
        assert!(orch.last_processed_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_tier_collapses_bursts() {
        let orch = orchestrator();
        orch.update_text("One.");
        orch.update_text("One two.");
        orch.update_text("One two three.");
        assert_eq!(orch.processing_tier(), ProcessingTier::Instant);

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        let metrics = orch.live_metrics();
        assert_eq!(metrics.generation, 3);
        assert_eq!(metrics.word_count, 3);
        assert_eq!(orch.inner.state.lock().instant_passes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiers_progress_to_idle() {
        let orch = orchestrator();
        let calls = counting(&orch);
        orch.update_text(TEXT);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.processing_tier(), ProcessingTier::Debounced);
        assert!(orch.live_metrics().dialogue_ratio > 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(orch.processing_tier(), ProcessingTier::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.snapshot().structural.stats.scene_count, 2);
        assert!(orch.last_processed_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_reset_background_timer() {
        let orch = orchestrator();
        let calls = counting(&orch);
        for _ in 0..5 {
            orch.update_text(TEXT);
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_full_process_fires_once() {
        let orch = orchestrator();
        let calls = counting(&orch);
        orch.update_text(TEXT);

        let snapshot = orch.force_full_process().await.unwrap();
        assert!(!snapshot.heatmap.sections.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct FailingHandler;

    impl JobHandler for FailingHandler {
        fn handle(&self, job: &Job) -> std::result::Result<JobOutput, AnalysisError> {
            if job.text.contains("partial") {
                return Ok(JobOutput::Timeline(Timeline::default()));
            }
            Err(AnalysisError::Failed("analyzer unavailable".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_background_pass_reports_error() {
        let pool = Arc::new(WorkerPool::with_handler(Some(0), Arc::new(FailingHandler)));
        let orch = TieredOrchestrator::new("ch1", TEXT, TierSettings::default(), pool);
        let calls = counting(&orch);

        let result = orch.force_full_process().await;
        assert!(matches!(result, Err(FolioError::Analysis(AnalysisError::Failed(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.processing_tier(), ProcessingTier::Idle);
        assert!(orch.last_processed_at().is_none());
        assert!(orch.snapshot().structural.scenes.is_empty());

        orch.update_text("A partial result.");
        assert!(matches!(
            orch.force_full_process().await,
            Err(FolioError::Analysis(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct SlowHandler {
        calls: AtomicUsize,
        analyzer: AnalyzerJobHandler,
    }

    impl JobHandler for SlowHandler {
        fn handle(&self, job: &Job) -> std::result::Result<JobOutput, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.analyzer.handle(job)
        }
    }

    #[tokio::test]
    async fn test_concurrent_force_shares_one_pass() {
        let handler = Arc::new(SlowHandler {
            calls: AtomicUsize::new(0),
            analyzer: AnalyzerJobHandler::default(),
        });
        let pool = Arc::new(WorkerPool::with_handler(Some(1), handler.clone()));
        let orch = TieredOrchestrator::new("ch1", TEXT, TierSettings::default(), pool);
        let calls = counting(&orch);

        let (first, second) = tokio::join!(orch.force_full_process(), orch.force_full_process());
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // a later request for the same text runs a fresh pass
        orch.force_full_process().await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scene_index_matches_selector_on_boundaries() {
        let structure = parse_structure(TEXT);
        let first = &structure.scenes[0];
        let second = &structure.scenes[1];
        for cursor in [first.start_offset, first.end_offset, second.start_offset, second.end_offset] {
            let mut metrics = LiveMetrics::default();
            instant_metrics(TEXT, cursor, &mut metrics);
            let expected = current_scene_at(&structure.scenes, cursor)
                .and_then(|scene| structure.scenes.iter().position(|s| s.id == scene.id));
            assert_eq!(metrics.scene_index, expected, "cursor {cursor}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_analyses_feed_scene_digests() {
        let pool = Arc::new(WorkerPool::new(Some(0)));
        let chunks = ChunkManager::new(ChunkSettings::default(), Arc::clone(&pool));
        chunks.register_chapter("ch1", TEXT);
        let orch = TieredOrchestrator::new("ch1", TEXT, TierSettings::default(), pool);
        orch.attach_chunks(chunks.clone());
        assert!(orch.live_metrics().scene_digests.iter().all(Option::is_none));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let digests = orch.live_metrics().scene_digests;
        assert_eq!(digests.len(), 2);
        let ids: Vec<String> = chunks.chunks("ch1").into_iter().map(|c| c.id).collect();
        for (digest, id) in digests.iter().zip(&ids) {
            assert_eq!(&digest.as_ref().expect("analyzed scene").chunk_id, id);
        }
        let scenes = scene_segments(TEXT);
        let expected = parse_structure(&TEXT[scenes[0].clone()]).stats.avg_tension;
        assert_eq!(digests[0].as_ref().unwrap().tension, expected);
        // background tier has not run; the digests came from the chunks
        assert!(orch.snapshot().structural.scenes.is_empty());

        // text the chunks have not seen yet has no digest
        let edited = TEXT.replace("She promised", "She swore");
        orch.update_text(&edited);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let digests = orch.live_metrics().scene_digests;
        assert!(digests[0].is_some());
        assert!(digests[1].is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_timeline_is_carried_into_background() {
        let orch = TieredOrchestrator::new(
            "ch2",
            "Finally the lighthouse burned and the keeper was avenged.\n",
            TierSettings::default(),
            Arc::new(WorkerPool::new(Some(0))),
        );
        let earlier =
            crate::analysis::build_timeline("Tobin swore to avenge the lighthouse keeper.\n", "ch1", None);
        orch.set_previous_timeline(Some(earlier));

        let snapshot = orch.force_full_process().await.unwrap();
        assert!(snapshot.timeline.for_chapter("ch1").all(|p| p.resolved));
        assert_eq!(snapshot.timeline.for_chapter("ch1").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_dropped() {
        let orch = orchestrator();
        let calls = counting(&orch);
        orch.update_text("Newer text.");

        let stale = crate::analysis::analyze_chapter("ch1", TEXT, None);
        orch.inner.complete_background(JobResult {
            job_id: "old".to_string(),
            chapter_id: "ch1".to_string(),
            generation: 0,
            output: Ok(JobOutput::Intelligence(Box::new(stale))),
            elapsed: Duration::ZERO,
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(orch.snapshot().structural.scenes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_cursor_only_rebuilds_hud() {
        let orch = orchestrator();
        let before = orch.force_full_process().await.unwrap();

        let offset = TEXT.find("She promised").unwrap();
        let hud = orch.update_cursor(offset);
        let after = orch.snapshot();

        assert_eq!(hud.cursor_offset, offset);
        assert_eq!(hud.position.scene_index, Some(1));
        assert_eq!(after.cache, before.cache);
        assert_eq!(after.structural, before.structural);
        assert_eq!(after.hud, hud);
    }

    struct DeferredHook {
        tasks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl IdleHook for DeferredHook {
        fn request_idle(&self, task: Box<dyn FnOnce() + Send>) {
            self.tasks.lock().push(task);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_hook_defers_background() {
        let orch = orchestrator();
        let calls = counting(&orch);
        let hook = Arc::new(DeferredHook {
            tasks: Mutex::new(Vec::new()),
        });
        orch.set_idle_hook(Some(hook.clone() as Arc<dyn IdleHook>));
        orch.update_text(TEXT);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let tasks = std::mem::take(&mut *hook.tasks.lock());
        assert_eq!(tasks.len(), 1);
        for task in tasks {
            task();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contexts() {
        let orch = orchestrator();
        orch.force_full_process().await.unwrap();

        let compressed = orch.get_ai_context(true);
        let full = orch.get_ai_context(false);
        assert!(compressed.starts_with("Chapter ch1:"));
        assert!(full.contains("### Scenes"));
        assert!(full.len() > compressed.len());

        let start = TEXT.find("She promised").unwrap();
        let section = orch.get_section_context(start, TEXT.len());
        assert!(section.contains("scene-1"));
        assert!(!section.contains("scene-0"));
        assert!(section.contains("silver key"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_work() {
        let orch = orchestrator();
        orch.shutdown();
        assert!(matches!(
            orch.force_full_process().await,
            Err(FolioError::Pool(PoolError::Terminated))
        ));
        orch.update_text("ignored");
        assert_eq!(orch.text(), TEXT);
    }
}
