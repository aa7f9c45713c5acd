//! Node placement strategies

use fleet_core::{Job, Node, SchedulingStrategy};

/// CPU load assumed for nodes that have not reported one yet
pub const NEUTRAL_CPU_PERCENT: f64 = 50.0;

/// Strategy for picking a node for a job
///
/// Candidates are already filtered to healthy nodes. Implementations return
/// the index of the chosen candidate, or `None` when there is nothing to pick.
pub trait PlacementStrategy: Send {
    fn select(&mut self, job: &Job, candidates: &[Node]) -> Option<usize>;
}

/// Build the placer for a strategy, with fresh cursor state
pub fn placer_for(strategy: SchedulingStrategy) -> Box<dyn PlacementStrategy> {
    match strategy {
        SchedulingStrategy::FirstFit => Box::new(FirstFit),
        SchedulingStrategy::RoundRobin => Box::new(RoundRobin::default()),
        SchedulingStrategy::ResourceAware => Box::new(ResourceAware),
    }
}

/// Always the first candidate
pub struct FirstFit;

impl PlacementStrategy for FirstFit {
    fn select(&mut self, _job: &Job, candidates: &[Node]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Cycles through candidates, restarting whenever the candidate list changes
#[derive(Default)]
pub struct RoundRobin {
    shape: Vec<String>,
    cursor: usize,
}

impl RoundRobin {
    fn same_shape(&self, candidates: &[Node]) -> bool {
        self.shape.len() == candidates.len()
            && self.shape.iter().zip(candidates).all(|(id, node)| *id == node.id)
    }
}

impl PlacementStrategy for RoundRobin {
    fn select(&mut self, _job: &Job, candidates: &[Node]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        if !self.same_shape(candidates) {
            self.shape = candidates.iter().map(|node| node.id.clone()).collect();
            self.cursor = 0;
        }

        let index = self.cursor % candidates.len();
        self.cursor = (index + 1) % candidates.len();
        Some(index)
    }
}

/// Lowest CPU load wins; the first candidate wins a tie
pub struct ResourceAware;

impl PlacementStrategy for ResourceAware {
    fn select(&mut self, _job: &Job, candidates: &[Node]) -> Option<usize> {
        let load = |node: &Node| node.cpu_percent.unwrap_or(NEUTRAL_CPU_PERCENT);

        let mut best: Option<(usize, f64)> = None;
        for (index, node) in candidates.iter().enumerate() {
            let cpu = load(node);
            match best {
                Some((_, lowest)) if cpu >= lowest => {}
                _ => best = Some((index, cpu)),
            }
        }
        best.map(|(index, _)| index)
    }
}
