//! Chunk manager
//!
//! Tracks each registered chapter as a list of chunks (one per scene) and
//! keeps a dirty queue of chunks that need analysis. Edits are coalesced
//! per chapter and applied once the edit debounce settles; a processing
//! timer then analyzes dirty chunks in small batches.
//!
//! Chunk analysis writes back only if the chunk's version is unchanged, so
//! a pass that raced a newer edit is dropped without being reported.

use super::timer::TimerSlot;
use crate::analysis::{
    structural::scene_segments, utils::text::ranges_overlap, AnalysisCache, ContentHash,
    ManuscriptIntelligence, StructuralFingerprint, StyleAnalyzer, StyleReport,
};
use crate::config::{ChunkSettings, FolioConfig};
use crate::error::{AnalysisError, FolioError, PoolError, Result};
use crate::pool::WorkerPool;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of analyzing one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAnalysis {
    pub structural: StructuralFingerprint,
    pub style: StyleReport,
}

/// Analyzes a single chunk of chapter text
pub trait ChunkAnalyzer: Send + Sync {
    fn analyze(&self, chapter_id: &str, chunk_id: &str, text: &str) -> std::result::Result<ChunkAnalysis, AnalysisError>;
}

/// Structure and style through the analysis cache
#[derive(Default)]
pub struct DefaultChunkAnalyzer {
    cache: AnalysisCache,
}

impl DefaultChunkAnalyzer {
    pub fn new(cache: AnalysisCache) -> Self {
        Self { cache }
    }

    pub fn from_config(config: &FolioConfig) -> Self {
        Self::new(AnalysisCache::with_analyzer(
            &config.cache,
            StyleAnalyzer::new(config.style.clone()),
        ))
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }
}

impl ChunkAnalyzer for DefaultChunkAnalyzer {
    fn analyze(&self, _chapter_id: &str, _chunk_id: &str, text: &str) -> std::result::Result<ChunkAnalysis, AnalysisError> {
        Ok(ChunkAnalysis {
            structural: self.cache.parse_structure_cached(text),
            style: self.cache.analyze_style_cached(text),
        })
    }
}

/// A tracked sub-range of a chapter
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub chapter_id: String,
    pub range: Range<usize>,
    pub hash: ContentHash,
    /// bumped whenever the chunk is marked dirty
    pub version: u64,
    pub dirty: bool,
    /// last successful analysis, kept while newer runs fail
    pub analysis: Option<ChunkAnalysis>,
    pub last_error: Option<AnalysisError>,
    /// consecutive failed runs since the last success or edit
    pub failures: u32,
}

/// Progress notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    EditApplied {
        chapter_id: String,
        range: Range<usize>,
    },
    ProcessingScheduled,
    ProcessingStart {
        chunk_ids: Vec<String>,
    },
    ChunkProcessed {
        chapter_id: String,
        chunk_id: String,
    },
    Error {
        chapter_id: String,
        chunk_id: String,
        error: AnalysisError,
    },
    QueueChange {
        dirty: usize,
    },
    ProcessingEnd {
        processed: usize,
        failed: usize,
    },
}

struct PendingEdit {
    range: Range<usize>,
    text: String,
}

struct ChapterState {
    text: String,
    chunks: Vec<Chunk>,
    pending: Option<PendingEdit>,
    edit_timer: TimerSlot,
    next_chunk: usize,
}

impl ChapterState {
    fn new(chapter_id: &str, text: String) -> Self {
        let mut chapter = Self {
            text,
            chunks: Vec::new(),
            pending: None,
            edit_timer: TimerSlot::new(),
            next_chunk: 0,
        };
        let full = 0..chapter.text.len();
        chapter.rederive(chapter_id, &full);
        chapter
    }

    /// Re-split into chunks. Unchanged chunks keep their id and analysis;
    /// new, changed, or edit-overlapping chunks are marked dirty.
    fn rederive(&mut self, chapter_id: &str, edited: &Range<usize>) {
        let mut old: Vec<Option<Chunk>> = std::mem::take(&mut self.chunks).into_iter().map(Some).collect();

        for range in scene_segments(&self.text) {
            let hash = ContentHash::from_content(&self.text[range.clone()]);
            let matched = old
                .iter_mut()
                .find(|slot| matches!(slot, Some(chunk) if chunk.hash == hash))
                .and_then(Option::take);
            let touched = ranges_overlap(&range, edited) || (edited.is_empty() && range.contains(&edited.start));

            let chunk = match matched {
                Some(mut chunk) => {
                    chunk.range = range;
                    if touched {
                        chunk.failures = 0;
                        if !chunk.dirty {
                            chunk.dirty = true;
                            chunk.version += 1;
                        }
                    }
                    chunk
                }
                None => {
                    let id = format!("{}-chunk-{}", chapter_id, self.next_chunk);
                    self.next_chunk += 1;
                    Chunk {
                        id,
                        chapter_id: chapter_id.to_string(),
                        range,
                        hash,
                        version: 0,
                        dirty: true,
                        analysis: None,
                        last_error: None,
                        failures: 0,
                    }
                }
            };
            self.chunks.push(chunk);
        }
    }
}

#[derive(Default)]
struct State {
    chapters: HashMap<String, ChapterState>,
    /// dirty chunks awaiting a pass, in queue order: (chapter, chunk)
    queue: VecDeque<(String, String)>,
    processing_timer: TimerSlot,
}

impl State {
    /// Replace the chapter's queue entries with its current dirty chunks
    fn requeue_chapter(&mut self, chapter_id: &str) {
        self.queue.retain(|(c, _)| c != chapter_id);
        if let Some(chapter) = self.chapters.get(chapter_id) {
            for chunk in chapter.chunks.iter().filter(|c| c.dirty) {
                self.queue.push_back((chapter_id.to_string(), chunk.id.clone()));
            }
        }
    }
}

struct BatchItem {
    chapter_id: String,
    chunk_id: String,
    version: u64,
    text: String,
}

struct Inner {
    settings: ChunkSettings,
    analyzer: Arc<dyn ChunkAnalyzer>,
    pool: Arc<WorkerPool>,
    state: Mutex<State>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChunkEvent>>>,
}

impl Inner {
    fn emit(&self, event: ChunkEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn schedule_locked(inner: &Arc<Inner>, state: &mut State) {
        let weak: Weak<Inner> = Arc::downgrade(inner);
        state
            .processing_timer
            .arm(inner.settings.processing_delay, move |generation| async move {
                if let Some(inner) = weak.upgrade() {
                    Inner::run_pass(inner, generation).await;
                }
            });
        inner.emit(ChunkEvent::ProcessingScheduled);
    }

    fn settle_edit(inner: &Arc<Inner>, chapter_id: &str, generation: u64) {
        let mut guard = inner.state.lock();
        let state = &mut *guard;
        let Some(chapter) = state.chapters.get_mut(chapter_id) else {
            return;
        };
        if !chapter.edit_timer.fired(generation) {
            return;
        }
        let Some(pending) = chapter.pending.take() else {
            return;
        };

        chapter.text = pending.text;
        chapter.rederive(chapter_id, &pending.range);
        let before = state.queue.len();
        state.requeue_chapter(chapter_id);
        debug!("Applied edit {:?} to chapter {}", pending.range, chapter_id);

        inner.emit(ChunkEvent::EditApplied {
            chapter_id: chapter_id.to_string(),
            range: pending.range,
        });
        if state.queue.len() != before {
            inner.emit(ChunkEvent::QueueChange {
                dirty: state.queue.len(),
            });
        }
        Self::schedule_locked(inner, state);
    }

    fn take_batch(&self, state: &mut State) -> Vec<BatchItem> {
        let mut batch = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.queue.len());

        while let Some((chapter_id, chunk_id)) = state.queue.pop_front() {
            if batch.len() >= self.settings.max_batch_size {
                remaining.push_back((chapter_id, chunk_id));
                continue;
            }
            let Some(chapter) = state.chapters.get(&chapter_id) else {
                continue;
            };
            // the chapter's text is about to change; wait for the edit to land
            if chapter.pending.is_some() {
                remaining.push_back((chapter_id, chunk_id));
                continue;
            }
            let Some(chunk) = chapter.chunks.iter().find(|c| c.id == chunk_id && c.dirty) else {
                continue;
            };
            batch.push(BatchItem {
                text: chapter.text[chunk.range.clone()].to_string(),
                version: chunk.version,
                chapter_id,
                chunk_id,
            });
        }

        state.queue = remaining;
        batch
    }

    async fn run_pass(inner: Arc<Inner>, generation: u64) {
        let batch = {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            if !state.processing_timer.fired(generation) {
                return;
            }
            let batch = inner.take_batch(state);
            if !batch.is_empty() {
                inner.emit(ChunkEvent::QueueChange {
                    dirty: state.queue.len(),
                });
            }
            batch
        };
        if batch.is_empty() {
            return;
        }

        debug!("Processing batch of {} chunks", batch.len());
        inner.emit(ChunkEvent::ProcessingStart {
            chunk_ids: batch.iter().map(|b| b.chunk_id.clone()).collect(),
        });

        let mut processed = 0;
        let mut failed = 0;
        for item in batch {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                inner.analyzer.analyze(&item.chapter_id, &item.chunk_id, &item.text)
            }))
            .unwrap_or_else(|payload| Err(AnalysisError::from_panic(payload)));

            let event = {
                let mut guard = inner.state.lock();
                let state = &mut *guard;
                let chunk = state
                    .chapters
                    .get_mut(&item.chapter_id)
                    .and_then(|ch| ch.chunks.iter_mut().find(|c| c.id == item.chunk_id));
                let mut retry = false;
                let event = match chunk {
                    Some(chunk) if chunk.version == item.version => match outcome {
                        Ok(analysis) => {
                            chunk.analysis = Some(analysis);
                            chunk.dirty = false;
                            chunk.last_error = None;
                            chunk.failures = 0;
                            processed += 1;
                            Some(ChunkEvent::ChunkProcessed {
                                chapter_id: item.chapter_id.clone(),
                                chunk_id: item.chunk_id.clone(),
                            })
                        }
                        Err(error) => {
                            chunk.failures += 1;
                            chunk.last_error = Some(error.clone());
                            failed += 1;
                            // the chunk stays dirty, keeping its last good analysis
                            if chunk.failures <= inner.settings.max_retries {
                                warn!(
                                    "Chunk {} of chapter {} failed (attempt {}): {}",
                                    item.chunk_id, item.chapter_id, chunk.failures, error
                                );
                                retry = true;
                            } else {
                                warn!(
                                    "Chunk {} of chapter {} failed {} times; waiting for the next edit: {}",
                                    item.chunk_id, item.chapter_id, chunk.failures, error
                                );
                                chunk.dirty = false;
                            }
                            Some(ChunkEvent::Error {
                                chapter_id: item.chapter_id.clone(),
                                chunk_id: item.chunk_id.clone(),
                                error,
                            })
                        }
                    },
                    _ => {
                        debug!("Dropping stale analysis of chunk {}", item.chunk_id);
                        None
                    }
                };
                if retry {
                    state.queue.push_back((item.chapter_id, item.chunk_id));
                }
                event
            };
            if let Some(event) = event {
                inner.emit(event);
            }
            tokio::task::yield_now().await;
        }

        inner.emit(ChunkEvent::ProcessingEnd { processed, failed });

        let mut guard = inner.state.lock();
        let state = &mut *guard;
        if !state.queue.is_empty() && !state.processing_timer.is_armed() {
            Self::schedule_locked(&inner, state);
        }
    }
}

/// Per-chapter dirty tracking and batched chunk analysis.
///
/// Cloning is cheap; clones share state. Timer-driven methods must be
/// called from within a Tokio runtime.
#[derive(Clone)]
pub struct ChunkManager {
    inner: Arc<Inner>,
}

impl ChunkManager {
    pub fn new(settings: ChunkSettings, pool: Arc<WorkerPool>) -> Self {
        Self::with_analyzer(settings, pool, Arc::new(DefaultChunkAnalyzer::default()))
    }

    pub fn with_analyzer(settings: ChunkSettings, pool: Arc<WorkerPool>, analyzer: Arc<dyn ChunkAnalyzer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                analyzer,
                pool,
                state: Mutex::new(State::default()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// New event stream. Every subscriber sees every later event.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChunkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Track a chapter, mark it fully dirty, and schedule a pass
    pub fn register_chapter(&self, chapter_id: &str, text: &str) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let chapter = ChapterState::new(chapter_id, text.to_string());
        info!("Registered chapter {} ({} chunks)", chapter_id, chapter.chunks.len());
        state.chapters.insert(chapter_id.to_string(), chapter);
        state.requeue_chapter(chapter_id);
        self.inner.emit(ChunkEvent::QueueChange {
            dirty: state.queue.len(),
        });
        Inner::schedule_locked(&self.inner, state);
    }

    /// Record an edit. Ranges of edits arriving within the debounce window
    /// are merged; any armed processing timer is cancelled.
    pub fn handle_edit(&self, chapter_id: &str, new_text: &str, change_start: usize, change_end: usize) -> Result<()> {
        let (start, end) = if change_start <= change_end {
            (change_start, change_end)
        } else {
            (change_end, change_start)
        };

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let chapter = state
            .chapters
            .get_mut(chapter_id)
            .ok_or_else(|| FolioError::UnknownChapter(chapter_id.to_string()))?;

        let range = match chapter.pending.take() {
            Some(existing) => existing.range.start.min(start)..existing.range.end.max(end),
            None => start..end,
        };
        chapter.pending = Some(PendingEdit {
            range,
            text: new_text.to_string(),
        });

        if state.processing_timer.cancel() {
            debug!("Cancelled armed processing pass for edit in {}", chapter_id);
        }

        let weak = Arc::downgrade(&self.inner);
        let id = chapter_id.to_string();
        chapter
            .edit_timer
            .arm(self.inner.settings.edit_debounce, move |generation| async move {
                if let Some(inner) = weak.upgrade() {
                    Inner::settle_edit(&inner, &id, generation);
                }
            });
        Ok(())
    }

    /// Arm the processing timer
    pub fn schedule_processing(&self) {
        let mut guard = self.inner.state.lock();
        Inner::schedule_locked(&self.inner, &mut guard);
    }

    pub fn has_dirty_chunks(&self, chapter_id: &str) -> bool {
        let state = self.inner.state.lock();
        state
            .chapters
            .get(chapter_id)
            .is_some_and(|ch| ch.pending.is_some() || ch.chunks.iter().any(|c| c.dirty))
    }

    /// Dirty chunks across all chapters
    pub fn dirty_count(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .chapters
            .values()
            .map(|ch| ch.chunks.iter().filter(|c| c.dirty).count())
            .sum()
    }

    pub fn chunks(&self, chapter_id: &str) -> Vec<Chunk> {
        let state = self.inner.state.lock();
        state
            .chapters
            .get(chapter_id)
            .map(|ch| ch.chunks.clone())
            .unwrap_or_default()
    }

    /// Latest text of a chapter, including an edit not yet applied
    pub fn text(&self, chapter_id: &str) -> Option<String> {
        let state = self.inner.state.lock();
        state.chapters.get(chapter_id).map(|ch| {
            ch.pending
                .as_ref()
                .map_or_else(|| ch.text.clone(), |p| p.text.clone())
        })
    }

    pub fn is_registered(&self, chapter_id: &str) -> bool {
        self.inner.state.lock().chapters.contains_key(chapter_id)
    }

    /// Stop tracking a chapter: clear its timers, pending edit, queue
    /// entries, and queued pool jobs
    pub fn unregister_chapter(&self, chapter_id: &str) -> bool {
        let removed = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(mut chapter) = state.chapters.remove(chapter_id) else {
                return false;
            };
            chapter.edit_timer.cancel();
            let before = state.queue.len();
            state.queue.retain(|(c, _)| c != chapter_id);
            if state.queue.is_empty() {
                state.processing_timer.cancel();
            }
            before != state.queue.len()
        };

        let cancelled = self.inner.pool.cancel_chapter_jobs(chapter_id);
        info!("Unregistered chapter {} ({} queued jobs cancelled)", chapter_id, cancelled);
        if removed {
            let dirty = self.inner.state.lock().queue.len();
            self.inner.emit(ChunkEvent::QueueChange { dirty });
        }
        true
    }

    /// Full analysis of several chapters through the worker pool
    pub async fn process_chapters_now(
        &self,
        chapters: Vec<(String, String)>,
    ) -> HashMap<String, std::result::Result<ManuscriptIntelligence, PoolError>> {
        self.inner.pool.process_chapters(chapters).await
    }

    /// Cancel every timer and forget all chapters
    pub fn shutdown(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.processing_timer.cancel();
        for chapter in state.chapters.values_mut() {
            chapter.edit_timer.cancel();
        }
        state.chapters.clear();
        state.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TEXT: &str = "Mara walked to the harbor.\n\n\n\nTobin waited by the boats.\n\n\n\nThe storm broke at dusk.\n";

    fn manager() -> ChunkManager {
        ChunkManager::new(ChunkSettings::default(), Arc::new(WorkerPool::new(Some(0))))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChunkEvent>) -> Vec<ChunkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_processes_all_chunks() {
        let manager = manager();
        let mut rx = manager.subscribe();
        manager.register_chapter("ch1", TEXT);
        assert_eq!(manager.chunks("ch1").len(), 3);
        assert!(manager.has_dirty_chunks("ch1"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!manager.has_dirty_chunks("ch1"));
        assert_eq!(manager.dirty_count(), 0);
        assert!(manager.chunks("ch1").iter().all(|c| c.analysis.is_some()));

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(ChunkEvent::QueueChange { dirty: 3 })));
        assert!(events.contains(&ChunkEvent::ProcessingEnd { processed: 3, failed: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_bounded() {
        let settings = ChunkSettings {
            max_batch_size: 2,
            ..ChunkSettings::default()
        };
        let manager = ChunkManager::new(settings, Arc::new(WorkerPool::new(Some(0))));
        let mut rx = manager.subscribe();
        manager.register_chapter("ch1", TEXT);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let starts: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ChunkEvent::ProcessingStart { chunk_ids } => Some(chunk_ids.len()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_only_dirties_touched_chunk() {
        let manager = manager();
        manager.register_chapter("ch1", TEXT);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let before = manager.chunks("ch1");

        let edited = TEXT.replace("Tobin waited", "Tobin lingered");
        let start = TEXT.find("waited").unwrap();
        manager.handle_edit("ch1", &edited, start, start + 6).unwrap();
        assert!(manager.has_dirty_chunks("ch1"));

        tokio::time::sleep(Duration::from_millis(310)).await;
        let after = manager.chunks("ch1");
        assert_eq!(after[0].id, before[0].id);
        assert!(!after[0].dirty);
        assert_ne!(after[1].id, before[1].id);
        assert!(after[1].dirty);
        assert_eq!(after[2].id, before[2].id);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.dirty_count(), 0);
        assert_eq!(manager.text("ch1").unwrap(), edited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_chapter_edit() {
        let manager = manager();
        assert!(matches!(
            manager.handle_edit("missing", "x", 0, 1),
            Err(FolioError::UnknownChapter(_))
        ));
    }

    struct FlakyAnalyzer;

    impl ChunkAnalyzer for FlakyAnalyzer {
        fn analyze(&self, chapter_id: &str, chunk_id: &str, text: &str) -> std::result::Result<ChunkAnalysis, AnalysisError> {
            if text.contains("storm") {
                panic!("analyzer blew up");
            }
            if text.contains("Tobin") {
                return Err(AnalysisError::Failed("no tobins".to_string()));
            }
            DefaultChunkAnalyzer::default().analyze(chapter_id, chunk_id, text)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_errors_are_isolated() {
        let manager = ChunkManager::with_analyzer(
            ChunkSettings::default(),
            Arc::new(WorkerPool::new(Some(0))),
            Arc::new(FlakyAnalyzer),
        );
        let mut rx = manager.subscribe();
        manager.register_chapter("ch1", TEXT);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut rx);
        let attempts = 1 + ChunkSettings::default().max_retries as usize;
        let errors = events
            .iter()
            .filter(|e| matches!(e, ChunkEvent::Error { .. }))
            .count();
        assert_eq!(errors, 2 * attempts);
        assert!(events.contains(&ChunkEvent::ProcessingEnd { processed: 1, failed: 2 }));
        assert!(events.contains(&ChunkEvent::ProcessingEnd { processed: 0, failed: 2 }));

        let chunks = manager.chunks("ch1");
        assert!(chunks[0].analysis.is_some());
        assert!(matches!(chunks[1].last_error, Some(AnalysisError::Failed(_))));
        assert!(matches!(chunks[2].last_error, Some(AnalysisError::Panicked(_))));
        assert_eq!(chunks[1].failures as usize, attempts);
        assert!(chunks[2].analysis.is_none());
        // retries exhausted; the chunks wait for an edit
        assert_eq!(manager.dirty_count(), 0);
    }

    struct FailsOnce {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ChunkAnalyzer for FailsOnce {
        fn analyze(&self, chapter_id: &str, chunk_id: &str, text: &str) -> std::result::Result<ChunkAnalysis, AnalysisError> {
            if text.contains("Tobin") && self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(AnalysisError::Failed("transient".to_string()));
            }
            DefaultChunkAnalyzer::default().analyze(chapter_id, chunk_id, text)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_is_retried() {
        let manager = ChunkManager::with_analyzer(
            ChunkSettings::default(),
            Arc::new(WorkerPool::new(Some(0))),
            Arc::new(FailsOnce {
                calls: std::sync::atomic::AtomicUsize::new(0),
            }),
        );
        let mut rx = manager.subscribe();
        manager.register_chapter("ch1", TEXT);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let chunks = manager.chunks("ch1");
        assert!(chunks[1].dirty);
        assert_eq!(chunks[1].failures, 1);
        assert!(manager.has_dirty_chunks("ch1"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        let chunks = manager.chunks("ch1");
        assert!(chunks.iter().all(|c| c.analysis.is_some() && !c.dirty));
        assert_eq!(chunks[1].failures, 0);
        assert!(chunks[1].last_error.is_none());

        let events = drain(&mut rx);
        let retried = ChunkEvent::ChunkProcessed {
            chapter_id: "ch1".to_string(),
            chunk_id: chunks[1].id.clone(),
        };
        let failed_at = events.iter().position(|e| matches!(e, ChunkEvent::Error { .. })).unwrap();
        let processed_at = events.iter().position(|e| *e == retried).unwrap();
        assert!(failed_at < processed_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_clears_state() {
        let manager = manager();
        manager.register_chapter("ch1", TEXT);
        manager.handle_edit("ch1", "Changed.", 0, 3).unwrap();
        assert!(manager.unregister_chapter("ch1"));
        assert!(!manager.unregister_chapter("ch1"));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!manager.is_registered("ch1"));
        assert!(manager.chunks("ch1").is_empty());
        assert_eq!(manager.dirty_count(), 0);
    }
}
