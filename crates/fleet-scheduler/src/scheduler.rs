//! Strategy-switchable node selection

use fleet_core::{FleetResult, Job, Node, SchedulingStrategy};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::placement::{placer_for, PlacementStrategy};

struct Active {
    strategy: SchedulingStrategy,
    placer: Box<dyn PlacementStrategy>,
}

/// Picks one node per job under the active strategy
///
/// Selection does no I/O. The strategy cursor lives behind a short-lived
/// mutex, so `schedule` is safe to call concurrently from request handlers.
pub struct Scheduler {
    active: Mutex<Active>,
}

impl Scheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        info!(strategy = %strategy, "Scheduler initialized");
        Self {
            active: Mutex::new(Active {
                strategy,
                placer: placer_for(strategy),
            }),
        }
    }

    fn active(&self) -> MutexGuard<'_, Active> {
        // A poisoned lock still holds a valid cursor.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switch strategy by name, resetting cursor state.
    ///
    /// An unrecognized name fails with `InvalidStrategy` and leaves the
    /// active strategy untouched.
    pub fn set_strategy(&self, name: &str) -> FleetResult<SchedulingStrategy> {
        let strategy: SchedulingStrategy = name.parse()?;
        self.set(strategy);
        Ok(strategy)
    }

    /// Switch to a known strategy, resetting cursor state
    pub fn set(&self, strategy: SchedulingStrategy) {
        let mut active = self.active();
        let previous = active.strategy;
        active.strategy = strategy;
        active.placer = placer_for(strategy);
        info!(from = %previous, to = %strategy, "Scheduling strategy changed");
    }

    pub fn get_strategy(&self) -> SchedulingStrategy {
        self.active().strategy
    }

    /// Pick a node for `job` among healthy `candidates`
    pub fn schedule(&self, job: &Job, candidates: &[Node]) -> Option<Node> {
        let mut active = self.active();
        let index = active.placer.select(job, candidates)?;
        let node = candidates.get(index)?;

        debug!(
            job_id = %job.id,
            node_id = %node.id,
            strategy = %active.strategy,
            candidates = candidates.len(),
            "Node selected"
        );
        Some(node.clone())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulingStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{FleetError, NodeSpec};

    fn job() -> Job {
        Job::new("1".to_string(), "nginx".to_string(), None)
    }

    fn node(id: &str, cpu_percent: f64) -> Node {
        let mut node = Node::from_spec(NodeSpec {
            id: id.to_string(),
            ip: "10.0.0.2".to_string(),
            port: 8001,
            cpu: 2,
            memory: 2048,
        });
        node.cpu_percent = Some(cpu_percent);
        node
    }

    fn picks(scheduler: &Scheduler, nodes: &[Node], n: usize) -> Vec<String> {
        (0..n)
            .filter_map(|_| scheduler.schedule(&job(), nodes))
            .map(|node| node.id)
            .collect()
    }

    #[test]
    fn test_default_is_first_fit() {
        let scheduler = Scheduler::default();
        assert_eq!(scheduler.get_strategy(), SchedulingStrategy::FirstFit);

        let nodes = vec![node("A", 90.0), node("B", 10.0)];
        assert_eq!(picks(&scheduler, &nodes, 3), vec!["A", "A", "A"]);
    }

    #[test]
    fn test_round_robin() {
        let scheduler = Scheduler::new(SchedulingStrategy::RoundRobin);
        let nodes = vec![node("A", 0.0), node("B", 0.0)];
        assert_eq!(picks(&scheduler, &nodes, 4), vec!["A", "B", "A", "B"]);
    }

    #[test]
    fn test_resource_aware() {
        let scheduler = Scheduler::new(SchedulingStrategy::ResourceAware);
        let nodes = vec![node("A", 80.0), node("B", 20.0)];
        assert_eq!(scheduler.schedule(&job(), &nodes).unwrap().id, "B");
    }

    #[test]
    fn test_empty_candidates_for_every_strategy() {
        let scheduler = Scheduler::default();
        for strategy in SchedulingStrategy::ALL {
            scheduler.set(strategy);
            assert!(scheduler.schedule(&job(), &[]).is_none());
        }
    }

    #[test]
    fn test_invalid_strategy_leaves_state_unchanged() {
        let scheduler = Scheduler::new(SchedulingStrategy::RoundRobin);

        let result = scheduler.set_strategy("bogus");
        assert!(matches!(result, Err(FleetError::InvalidStrategy(_))));
        assert_eq!(scheduler.get_strategy(), SchedulingStrategy::RoundRobin);
    }

    #[test]
    fn test_set_strategy_resets_cursor() {
        let scheduler = Scheduler::new(SchedulingStrategy::RoundRobin);
        let nodes = vec![node("A", 0.0), node("B", 0.0)];
        assert_eq!(picks(&scheduler, &nodes, 1), vec!["A"]);

        let strategy = scheduler.set_strategy("round_robin").unwrap();
        assert_eq!(strategy, SchedulingStrategy::RoundRobin);
        assert_eq!(picks(&scheduler, &nodes, 2), vec!["A", "B"]);
    }
}
