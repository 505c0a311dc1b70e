//! Edit-driven scheduling: debounced timers and the chunk manager

pub mod chunks;
pub mod timer;

pub use chunks::{Chunk, ChunkAnalysis, ChunkAnalyzer, ChunkEvent, ChunkManager, DefaultChunkAnalyzer};
pub use timer::TimerSlot;
