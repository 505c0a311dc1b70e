//! Common test utilities and helpers

#![allow(dead_code)]

use folio_core::config::{FolioConfig, PoolSettings};

/// A ~1,200-word chapter with three scene headings, a passive-voice
/// sentence, dialogue, and both resolved and open promises
pub const SAMPLE_CHAPTER: &str = include_str!("../fixtures/ravenhold_chapter.md");

/// Config with the worker pool in inline mode
pub fn inline_config() -> FolioConfig {
    FolioConfig {
        pool: PoolSettings { size: Some(0) },
        ..FolioConfig::default()
    }
}

/// Config with a small threaded pool
pub fn threaded_config(workers: usize) -> FolioConfig {
    FolioConfig {
        pool: PoolSettings { size: Some(workers) },
        ..FolioConfig::default()
    }
}

/// Byte offset of `needle` in the sample chapter
pub fn offset_of(needle: &str) -> usize {
    SAMPLE_CHAPTER
        .find(needle)
        .unwrap_or_else(|| panic!("fixture is missing {needle:?}"))
}
