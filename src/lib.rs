//! Folio - Incremental Manuscript Intelligence
//!
//! Keeps a derived analytical model of a long-form manuscript current while
//! the author types:
//! - Dirty-range tracking with debounced, coalesced edits
//! - Three latency tiers: instant, debounced, background
//! - A bounded worker pool with a priority queue and inline fallback
//! - Heuristic analyzers for structure, entities, style, timeline, and risk
//! - Fuzzy anchoring of externally produced quotes back into the text
//!
//! # Architecture
//!
//! - **Analysis**: pure analyzers and the `ManuscriptIntelligence` model
//! - **Pool**: OS worker threads for full chapter reanalysis
//! - **Scheduling**: cancellable timers and the chunk manager
//! - **Orchestrator**: per-document tiers, HUD refresh, prompt context
//! - **Hub**: composition root owning all of the above
//!
//! # Example
//!
//! ```ignore
//! use folio_core::{FolioConfig, IntelligenceHub};
//!
//! #[tokio::main]
//! async fn main() -> folio_core::Result<()> {
//!     let mut hub = IntelligenceHub::new(FolioConfig::default());
//!     hub.open_document("chapter-1", "It was a dark and stormy night.");
//!
//!     hub.update_text("It was a dark and stormy night. Mara ran.", 31, 41)?;
//!     let intelligence = hub.force_full_process().await?;
//!     println!("{} scenes", intelligence.structural.stats.scene_count);
//!
//!     println!("{}", hub.active().unwrap().get_ai_context(true));
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod drift;
pub mod error;
pub mod hub;
pub mod locator;
pub mod logging;
pub mod orchestrator;
pub mod pool;
pub mod scheduling;

// Re-export commonly used types
pub use analysis::{
    analyze_chapter, build_heatmap, build_hud, build_timeline, calculate_readability, compare_styles,
    create_empty_intelligence, extract_entities, parse_structure, analyze_style, AnalysisCache,
    ManuscriptHud, ManuscriptIntelligence,
};
pub use config::FolioConfig;
pub use drift::{check_narrative_drift, Conflict};
pub use error::{AnalysisError, FolioError, PoolError, Result};
pub use hub::IntelligenceHub;
pub use locator::{enrich_analysis_with_positions, extract_clickable_issues, find_quote_range, QuoteLocator, TextRange};
pub use orchestrator::{IdleHook, LiveMetrics, ProcessingTier, SceneDigest, TieredOrchestrator};
pub use pool::{Job, JobKind, JobPriority, PoolStats, WorkerPool};
pub use scheduling::{ChunkEvent, ChunkManager};
