//! Composition root
//!
//! [`IntelligenceHub`] owns the worker pool, the chunk manager, and the
//! orchestrator for the open document. Hosts construct one per process and
//! pass it by reference; [`IntelligenceHub::reset`] tears everything down
//! for test isolation.
//!
//! The open document's orchestrator reads the chunk manager's analyses.
//! Closing an analyzed document keeps its timeline, so the next document
//! opened can resolve the promises it left open.

use crate::analysis::{CacheStats, ManuscriptHud, ManuscriptIntelligence, Timeline};
use crate::config::FolioConfig;
use crate::drift::{check_narrative_drift, Conflict};
use crate::error::{FolioError, PoolError, Result};
use crate::orchestrator::TieredOrchestrator;
use crate::pool::WorkerPool;
use crate::scheduling::{ChunkManager, DefaultChunkAnalyzer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct IntelligenceHub {
    config: FolioConfig,
    pool: Arc<WorkerPool>,
    analyzer: Arc<DefaultChunkAnalyzer>,
    chunks: ChunkManager,
    active: Option<TieredOrchestrator>,
    carried: Option<Timeline>,
}

impl IntelligenceHub {
    pub fn new(config: FolioConfig) -> Self {
        let pool = Arc::new(WorkerPool::from_config(&config));
        let analyzer = Arc::new(DefaultChunkAnalyzer::from_config(&config));
        let chunks = ChunkManager::with_analyzer(config.chunks.clone(), Arc::clone(&pool), analyzer.clone());
        Self {
            config,
            pool,
            analyzer,
            chunks,
            active: None,
            carried: None,
        }
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn chunks(&self) -> &ChunkManager {
        &self.chunks
    }

    pub fn active(&self) -> Option<&TieredOrchestrator> {
        self.active.as_ref()
    }

    /// Timeline handed to the next opened document
    pub fn carried_timeline(&self) -> Option<&Timeline> {
        self.carried.as_ref()
    }

    fn active_or_err(&self) -> Result<&TieredOrchestrator> {
        self.active.as_ref().ok_or(FolioError::NoDocument)
    }

    /// Open a chapter for live editing. Any open document is closed first.
    /// Must be called from within a Tokio runtime.
    pub fn open_document(&mut self, chapter_id: &str, text: &str) -> &TieredOrchestrator {
        self.close_document();

        self.chunks.register_chapter(chapter_id, text);
        let orchestrator = TieredOrchestrator::new(
            chapter_id,
            text,
            self.config.tiers.clone(),
            Arc::clone(&self.pool),
        );
        orchestrator.set_previous_timeline(self.carried.clone());
        orchestrator.attach_chunks(self.chunks.clone());
        orchestrator.schedule_background();
        info!("Opened document {}", chapter_id);
        self.active.insert(orchestrator)
    }

    pub fn switch_document(&mut self, chapter_id: &str, text: &str) -> &TieredOrchestrator {
        self.open_document(chapter_id, text)
    }

    /// Close the open document, cancelling its timers and queued jobs
    pub fn close_document(&mut self) -> Option<String> {
        let orchestrator = self.active.take()?;
        let chapter_id = orchestrator.chapter_id().to_string();
        if orchestrator.last_processed_at().is_some() {
            self.carried = Some(orchestrator.snapshot().timeline.clone());
        }
        orchestrator.shutdown();
        self.chunks.unregister_chapter(&chapter_id);
        info!("Closed document {}", chapter_id);
        Some(chapter_id)
    }

    /// Stop tracking a chapter, closing it if it is the open document
    pub fn unregister_chapter(&mut self, chapter_id: &str) -> bool {
        if self.active.as_ref().is_some_and(|o| o.chapter_id() == chapter_id) {
            return self.close_document().is_some();
        }
        self.chunks.unregister_chapter(chapter_id)
    }

    /// Apply an edit to the open document
    pub fn update_text(&self, new_text: &str, change_start: usize, change_end: usize) -> Result<()> {
        let orchestrator = self.active_or_err()?;
        orchestrator.update_text(new_text);
        self.chunks
            .handle_edit(orchestrator.chapter_id(), new_text, change_start, change_end)
    }

    pub fn update_cursor(&self, offset: usize) -> Result<ManuscriptHud> {
        Ok(self.active_or_err()?.update_cursor(offset))
    }

    pub async fn force_full_process(&self) -> Result<Arc<ManuscriptIntelligence>> {
        self.active_or_err()?.force_full_process().await
    }

    pub fn check_drift(&self, plan: &str) -> Result<Vec<Conflict>> {
        Ok(check_narrative_drift(&self.active_or_err()?.snapshot(), plan))
    }

    /// Full analysis of several chapters through the worker pool
    pub async fn process_all(
        &self,
        chapters: Vec<(String, String)>,
    ) -> HashMap<String, std::result::Result<ManuscriptIntelligence, PoolError>> {
        self.chunks.process_chapters_now(chapters).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.analyzer.cache().stats()
    }

    /// Close the document, forget every chapter, stop the pool, and clear
    /// caches. The hub can be reused afterwards.
    pub fn reset(&mut self) {
        self.close_document();
        self.carried = None;
        self.chunks.shutdown();
        self.pool.terminate();
        self.analyzer.cache().clear();
        info!("Intelligence hub reset");
    }
}
