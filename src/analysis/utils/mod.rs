//! Shared utilities for the analyzer suite

pub mod dictionaries;
pub mod patterns;
pub mod text;

pub use dictionaries::{EntityDictionaries, NarrativeDictionaries, StyleDictionaries};
pub use patterns::{CommonPatterns, PromisePatterns};
