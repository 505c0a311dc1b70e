//! Chunk manager edit coalescing and scheduling

mod common;

use common::{inline_config, SAMPLE_CHAPTER};
use folio_core::scheduling::{ChunkEvent, ChunkManager};
use folio_core::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn manager() -> ChunkManager {
    let config = inline_config();
    ChunkManager::new(config.chunks.clone(), Arc::new(WorkerPool::from_config(&config)))
}

fn drain(rx: &mut UnboundedReceiver<ChunkEvent>) -> Vec<ChunkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_sample_chapter_has_one_chunk_per_scene() {
    let manager = manager();
    manager.register_chapter("ch1", SAMPLE_CHAPTER);
    let chunks = manager.chunks("ch1");
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.dirty && c.analysis.is_none()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let chunks = manager.chunks("ch1");
    assert!(chunks.iter().all(|c| !c.dirty));
    assert!(chunks
        .iter()
        .all(|c| c.analysis.as_ref().is_some_and(|a| a.structural.stats.word_count > 0)));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_edits_coalesce() {
    let manager = manager();
    manager.register_chapter("ch1", SAMPLE_CHAPTER);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let mut rx = manager.subscribe();
    let first = SAMPLE_CHAPTER.replacen("The Harbor", "Our Harbor", 1);
    let second = SAMPLE_CHAPTER.replacen("The Harbor", "Our Harbors", 1);
    manager.handle_edit("ch1", &first, 0, 5).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.handle_edit("ch1", &second, 4, 9).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let events = drain(&mut rx);

    let applied: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ChunkEvent::EditApplied { range, .. } => Some(range.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![0..9]);

    let scheduled = events
        .iter()
        .filter(|e| matches!(e, ChunkEvent::ProcessingScheduled))
        .count();
    assert_eq!(scheduled, 1);
    assert_eq!(manager.text("ch1").unwrap(), second);
}

#[tokio::test(start_paused = true)]
async fn test_edit_cancels_armed_processing() {
    let manager = manager();
    let mut rx = manager.subscribe();
    manager.register_chapter("ch1", SAMPLE_CHAPTER);
    let edited = SAMPLE_CHAPTER.replacen("dawn", "dusk", 1);
    let at = SAMPLE_CHAPTER.find("dawn").unwrap();
    manager.handle_edit("ch1", &edited, at, at + 4).unwrap();

    // the pass armed at registration would have fired at 50ms
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ChunkEvent::ProcessingStart { .. })));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let events = drain(&mut rx);
    let applied = events
        .iter()
        .position(|e| matches!(e, ChunkEvent::EditApplied { .. }))
        .unwrap();
    let started = events
        .iter()
        .position(|e| matches!(e, ChunkEvent::ProcessingStart { .. }))
        .unwrap();
    assert!(applied < started);
    assert!(events.contains(&ChunkEvent::ProcessingEnd {
        processed: 3,
        failed: 0
    }));
    assert!(!manager.has_dirty_chunks("ch1"));
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_scenes_keep_their_analysis() {
    let manager = manager();
    manager.register_chapter("ch1", SAMPLE_CHAPTER);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let before = manager.chunks("ch1");

    let edited = SAMPLE_CHAPTER.replacen("The storm broke at dusk!", "The storm broke at midnight!", 1);
    let at = SAMPLE_CHAPTER.find("dusk!").unwrap();
    manager.handle_edit("ch1", &edited, at, at + 8).unwrap();
    tokio::time::sleep(Duration::from_millis(310)).await;

    let after = manager.chunks("ch1");
    assert_eq!(manager.dirty_count(), 1);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[1]);
    assert!(after[2].dirty);
    assert!(after[2].version > before[2].version || after[2].id != before[2].id);
}
