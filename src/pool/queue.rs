//! Priority queue for jobs waiting on a worker.
//!
//! `High` before `Normal` before `Low`; FIFO within a tier.

use super::job::{Job, JobPriority};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct JobQueue {
    high: VecDeque<Job>,
    normal: VecDeque<Job>,
    low: VecDeque<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn tier_mut(&mut self, priority: JobPriority) -> &mut VecDeque<Job> {
        match priority {
            JobPriority::High => &mut self.high,
            JobPriority::Normal => &mut self.normal,
            JobPriority::Low => &mut self.low,
        }
    }

    pub fn push(&mut self, job: Job) {
        self.tier_mut(job.priority).push_back(job);
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every queued job matching `predicate`, returning them
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Job) -> bool) -> Vec<Job> {
        let mut removed = Vec::new();
        for tier in [&mut self.high, &mut self.normal, &mut self.low] {
            let mut kept = VecDeque::with_capacity(tier.len());
            for job in tier.drain(..) {
                if predicate(&job) {
                    removed.push(job);
                } else {
                    kept.push_back(job);
                }
            }
            *tier = kept;
        }
        removed
    }

    pub fn clear(&mut self) -> Vec<Job> {
        self.remove_where(|_| true)
    }
}
