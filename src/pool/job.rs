//! Job and result types carried between the pool and its workers

use crate::analysis::{
    analyze_chapter_cached, AnalysisCache, EntityGraph, HeatmapBuilder, ManuscriptIntelligence,
    StructuralFingerprint, StyleAnalyzer, StyleReport, Timeline,
};
use crate::config::FolioConfig;
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FullAnalysis,
    Structure,
    Entities,
    Style,
    Timeline,
}

/// Unit of work submitted to the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub chapter_id: String,
    pub text: String,
    pub priority: JobPriority,
    /// Text generation this job was cut from
    pub generation: u64,
    /// Timeline of earlier chapters whose promises this chapter may resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Timeline>,
}

impl Job {
    pub fn new(kind: JobKind, chapter_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            chapter_id: chapter_id.into(),
            text: text.into(),
            priority: JobPriority::Normal,
            generation: 0,
            previous: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_previous(mut self, previous: Option<Timeline>) -> Self {
        self.previous = previous;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    Intelligence(Box<ManuscriptIntelligence>),
    Structure(StructuralFingerprint),
    Entities(EntityGraph),
    Style(StyleReport),
    Timeline(Timeline),
}

impl JobOutput {
    pub fn into_intelligence(self) -> Option<ManuscriptIntelligence> {
        match self {
            JobOutput::Intelligence(intel) => Some(*intel),
            _ => None,
        }
    }
}

/// Completed job, delivered to the submitter's callback
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: String,
    pub chapter_id: String,
    pub generation: u64,
    pub output: Result<JobOutput, AnalysisError>,
    pub elapsed: Duration,
}

pub type JobCallback = Box<dyn FnOnce(JobResult) + Send + 'static>;

/// Executes a job on a worker thread
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &Job) -> Result<JobOutput, AnalysisError>;
}

/// Runs the analyzer suite for each job kind
pub struct AnalyzerJobHandler {
    cache: AnalysisCache,
    heatmap: HeatmapBuilder,
}

impl AnalyzerJobHandler {
    pub fn new(config: &FolioConfig) -> Self {
        Self {
            cache: AnalysisCache::with_analyzer(&config.cache, StyleAnalyzer::new(config.style.clone())),
            heatmap: HeatmapBuilder::new(config.heatmap.clone()),
        }
    }
}

impl Default for AnalyzerJobHandler {
    fn default() -> Self {
        Self::new(&FolioConfig::default())
    }
}

impl JobHandler for AnalyzerJobHandler {
    fn handle(&self, job: &Job) -> Result<JobOutput, AnalysisError> {
        let text = job.text.as_str();
        let output = match job.kind {
            JobKind::FullAnalysis => JobOutput::Intelligence(Box::new(analyze_chapter_cached(
                &self.cache,
                &self.heatmap,
                &job.chapter_id,
                text,
                job.previous.as_ref(),
            ))),
            JobKind::Structure => JobOutput::Structure(self.cache.parse_structure_cached(text)),
            JobKind::Entities => JobOutput::Entities(self.cache.extract_entities_cached(text, &job.chapter_id)),
            JobKind::Style => JobOutput::Style(self.cache.analyze_style_cached(text)),
            JobKind::Timeline => JobOutput::Timeline(self.cache.build_timeline_cached(
                text,
                &job.chapter_id,
                job.previous.as_ref(),
            )),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::High > JobPriority::Normal);
        assert!(JobPriority::Normal > JobPriority::Low);
        assert_eq!(JobPriority::default(), JobPriority::Normal);
    }

    #[test]
    fn test_job_builder() {
        let job = Job::new(JobKind::Style, "ch1", "Text.")
            .with_priority(JobPriority::High)
            .with_generation(7);
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.generation, 7);
        assert_ne!(job.id, Job::new(JobKind::Style, "ch1", "Text.").id);
    }

    #[test]
    fn test_analyzer_handler_kinds() {
        let handler = AnalyzerJobHandler::default();
        let text = "Mara waited. \"Go,\" said Tobin.";

        let full = handler
            .handle(&Job::new(JobKind::FullAnalysis, "ch1", text))
            .unwrap()
            .into_intelligence()
            .unwrap();
        assert_eq!(full.chapter_id, "ch1");

        match handler.handle(&Job::new(JobKind::Structure, "ch1", text)).unwrap() {
            JobOutput::Structure(s) => assert_eq!(s, full.structural),
            other => panic!("unexpected output {other:?}"),
        }
        assert!(handler
            .handle(&Job::new(JobKind::Style, "ch1", text))
            .unwrap()
            .into_intelligence()
            .is_none());
    }

    #[test]
    fn test_previous_timeline_reaches_analysis() {
        let handler = AnalyzerJobHandler::default();
        let earlier = handler
            .handle(&Job::new(JobKind::Timeline, "ch1", "Tobin swore to avenge the lighthouse keeper.\n"))
            .unwrap();
        let JobOutput::Timeline(earlier) = earlier else {
            panic!("expected a timeline");
        };

        let job = Job::new(
            JobKind::FullAnalysis,
            "ch2",
            "Finally the lighthouse burned and the keeper was avenged.\n",
        )
        .with_previous(Some(earlier));
        let intel = handler.handle(&job).unwrap().into_intelligence().unwrap();
        let carried = intel.timeline.for_chapter("ch1").next().expect("carried promise");
        assert!(carried.resolved);
    }

    #[test]
    fn test_job_without_previous_omits_field() {
        let json = serde_json::to_string(&Job::new(JobKind::Style, "ch1", "Text.")).unwrap();
        assert!(!json.contains("previous"));
        let back: Job = serde_json::from_str(&json).unwrap();
        assert!(back.previous.is_none());
    }
}
