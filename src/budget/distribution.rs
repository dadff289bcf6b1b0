use crate::node::{MemoryMode, NodeId, SharedOutNode, SharedSinkNode};
use crate::sim::{ProtoGraphAdaptor, SimReport};
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

/// Classification of the total byte budget against the graph's needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MemoryAmount {
    /// Every cache node can hold its full output.
    EnoughForAll,
    /// Important caches fit; the rest share what remains.
    Sufficient,
    /// Not even the reserved full-memory nodes fit.
    TooLittle,
}

/// Byte budget assigned to one cache node, plus the annealer's hints.
#[derive(Clone)]
pub struct NodeBudget {
    node: SharedOutNode,
    /// Bytes currently assigned.
    pub bytes: usize,
    /// Bytes needed to hold the node's entire output.
    pub max_bytes: usize,
    /// The node's own change probability.
    pub own_removal_prob: f64,
    /// Probability that an edit anywhere upstream (or at the node itself)
    /// invalidates its cached tiles.
    pub cum_removal_prob: f64,
}

impl NodeBudget {
    /// The budgeted node.
    pub fn node(&self) -> &SharedOutNode {
        &self.node
    }
}

/// A per-node division of a byte budget, produced by the feasibility phase
/// and refined by the annealer.
#[derive(Clone)]
pub struct MemoryDistribution {
    memory_limit: usize,
    amount: MemoryAmount,
    cache_nodes: Vec<NodeBudget>,
    non_cache_nodes: Vec<SharedOutNode>,
}

impl std::fmt::Debug for NodeBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBudget")
            .field("node", &self.node.label())
            .field("bytes", &self.bytes)
            .field("max_bytes", &self.max_bytes)
            .field("own_removal_prob", &self.own_removal_prob)
            .field("cum_removal_prob", &self.cum_removal_prob)
            .finish()
    }
}

impl std::fmt::Debug for MemoryDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDistribution")
            .field("memory_limit", &self.memory_limit)
            .field("amount", &self.amount)
            .field("cache_nodes", &self.cache_nodes)
            .field("non_cache_nodes", &self.non_cache_nodes.len())
            .finish()
    }
}

/// `(own, cumulative)` change probabilities per node.
type ProbMap = FxHashMap<NodeId, (f64, f64)>;

fn collect_inputs(node: &SharedOutNode, seen: &mut FxHashSet<NodeId>, out: &mut Vec<SharedOutNode>) {
    for index in 0..node.input_count() {
        let input = node.input(index);
        if seen.insert(NodeId::of_out(input)) {
            out.push(SharedOutNode::clone(input));
            collect_inputs(input, seen, out);
        }
    }
}

fn change_probs(node: &SharedOutNode, memo: &mut ProbMap) -> (f64, f64) {
    let id = NodeId::of_out(node);
    if let Some(&probs) = memo.get(&id) {
        return probs;
    }

    let own = node.change_probability().clamp(0.0, 1.0);
    let mut keep = 1.0 - own;
    let mut ancestors = Vec::new();
    collect_inputs(node, &mut FxHashSet::default(), &mut ancestors);
    for ancestor in &ancestors {
        keep *= 1.0 - change_probs(ancestor, memo).0;
    }

    let probs = (own, 1.0 - keep);
    memo.insert(id, probs);
    probs
}

impl MemoryDistribution {
    /// Split `memory_limit` bytes across `out_nodes`.
    ///
    /// Full-memory nodes reserve their size first. The remaining budget is
    /// classified: enough for every cache, sufficient for the important
    /// caches (the rest share proportionally), or too little (important
    /// caches share proportionally, the rest get nothing).
    pub(crate) fn feasible(mut memory_limit: usize, out_nodes: &[SharedOutNode]) -> Self {
        let mut cache_nodes = Vec::new();
        let mut non_cache_nodes = Vec::new();
        let mut important_bytes = 0usize;
        let mut unimportant_bytes = 0usize;
        let mut enough_bytes = true;
        let mut probs = ProbMap::default();

        for node in out_nodes {
            match node.memory_mode() {
                MemoryMode::NoMemory => non_cache_nodes.push(SharedOutNode::clone(node)),
                MemoryMode::AnyMemory => {
                    let max_bytes = node.full_byte_count();
                    let (own, cum) = change_probs(node, &mut probs);
                    cache_nodes.push(NodeBudget {
                        node: SharedOutNode::clone(node),
                        bytes: 0,
                        max_bytes,
                        own_removal_prob: own,
                        cum_removal_prob: cum,
                    });
                    if node.is_cache_important() {
                        important_bytes += max_bytes;
                    } else {
                        unimportant_bytes += max_bytes;
                    }
                }
                MemoryMode::FullMemory => {
                    let bytes = node.full_byte_count();
                    if bytes <= memory_limit {
                        memory_limit -= bytes;
                    } else {
                        memory_limit = 0;
                        enough_bytes = false;
                    }
                    non_cache_nodes.push(SharedOutNode::clone(node));
                }
            }
        }

        let amount = if !enough_bytes {
            MemoryAmount::TooLittle
        } else if memory_limit >= important_bytes + unimportant_bytes {
            MemoryAmount::EnoughForAll
        } else {
            MemoryAmount::Sufficient
        };

        if amount == MemoryAmount::EnoughForAll {
            for budget in &mut cache_nodes {
                budget.bytes = budget.max_bytes;
            }
        } else if memory_limit >= important_bytes {
            let mut remaining = memory_limit - important_bytes;
            for budget in &mut cache_nodes {
                if budget.node.is_cache_important() {
                    budget.bytes = budget.max_bytes;
                } else {
                    let portion = budget.max_bytes as f64 / unimportant_bytes.max(1) as f64;
                    let bytes = ((portion * remaining as f64) as usize).min(remaining);
                    budget.bytes = bytes;
                    unimportant_bytes -= budget.max_bytes;
                    remaining -= bytes;
                }
            }
        } else if memory_limit > 0 {
            let mut remaining = memory_limit;
            for budget in &mut cache_nodes {
                if budget.node.is_cache_important() {
                    let portion = budget.max_bytes as f64 / important_bytes.max(1) as f64;
                    let bytes = ((portion * remaining as f64) as usize).min(remaining);
                    budget.bytes = bytes;
                    important_bytes -= budget.max_bytes;
                    remaining -= bytes;
                }
            }
        }

        Self {
            memory_limit,
            amount,
            cache_nodes,
            non_cache_nodes,
        }
    }

    /// Budget left after the full-memory reserve.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Budget classification.
    pub fn amount(&self) -> MemoryAmount {
        self.amount
    }

    /// Per-node byte assignments for the caching nodes.
    pub fn cache_nodes(&self) -> &[NodeBudget] {
        &self.cache_nodes
    }

    /// Nodes without an adjustable cache (no-memory and full-memory).
    pub fn non_cache_nodes(&self) -> &[SharedOutNode] {
        &self.non_cache_nodes
    }

    /// Program every cache node's real cache to its assigned bytes.
    pub(crate) fn apply(&self) {
        for budget in &self.cache_nodes {
            budget.node.set_cache_bytes(budget.bytes);
        }
    }

    /// Build a simulator whose proto-caches mirror this distribution.
    pub(crate) fn build_sim(&self, sinks: &[SharedSinkNode]) -> ProtoGraphAdaptor {
        let mut sim = ProtoGraphAdaptor::new();
        for sink in sinks {
            sim.add_sink(sink);
        }
        for budget in &self.cache_nodes {
            let slots = budget.node.cache_slots_from_bytes(budget.bytes);
            sim.add_out_node(&budget.node, slots);
        }
        for node in &self.non_cache_nodes {
            sim.add_out_node(node, 0);
        }
        sim
    }

    /// Cost of this distribution given its simulation report:
    /// `(1 + wasted) * weighted_time`, where `weighted_time` averages sink
    /// durations by relevance and `wasted` charges bytes parked in caches
    /// likely to be invalidated.
    pub(crate) fn cost_from(&self, report: &SimReport) -> f64 {
        let mut cumulative = 0.0;
        let mut weighted = 0.0;
        for sink in &report.sinks {
            debug_assert!(sink.relevance >= 0.0);
            cumulative += sink.relevance;
            weighted += sink.relevance * sink.duration;
        }
        let weighted_time = if cumulative > 0.0 {
            weighted / cumulative
        } else {
            0.0
        };

        let mut full = 0.0;
        let mut wasted = 0.0;
        for budget in &self.cache_nodes {
            full += budget.bytes as f64;
            wasted += budget.cum_removal_prob * budget.bytes as f64;
        }
        let wasted = if full > 0.0 { wasted / full } else { 0.0 };
        debug_assert!((0.0..=1.0).contains(&wasted));

        (1.0 + wasted) * weighted_time
    }

    /// Random-swap neighbour: move bytes from a donor picked by miss rate
    /// to a receiver picked by hit rate.
    ///
    /// Returns `None` when no donor/receiver pair exists (degenerate
    /// distributions); the annealer then keeps the current solution.
    pub(crate) fn random_neighbour(
        &self,
        report: &SimReport,
        rng: &mut impl Rng,
    ) -> Option<MemoryDistribution> {
        const EPS: f64 = 1e-2;

        let mut pick = |donor: bool, skip: Option<usize>| -> Option<usize> {
            let mut cumulative = 0.0;
            let mut choices: Vec<(f64, usize)> = Vec::with_capacity(self.cache_nodes.len());
            for (index, budget) in self.cache_nodes.iter().enumerate() {
                if Some(index) == skip || budget.max_bytes == 0 {
                    continue;
                }
                let Some(stats) = report.out.get(&NodeId::of_out(&budget.node)) else {
                    continue;
                };
                if stats.requests == 0 {
                    continue;
                }
                let miss_rate = stats.computations as f64 / stats.requests as f64;
                let probability = if donor {
                    let memory_portion = budget.bytes as f64 / budget.max_bytes as f64;
                    memory_portion * (EPS + (1.0 - EPS) * miss_rate)
                } else {
                    let free_portion =
                        (budget.max_bytes - budget.bytes) as f64 / budget.max_bytes as f64;
                    free_portion * (EPS + (1.0 - EPS) * (1.0 - miss_rate))
                };
                if probability > 0.0 {
                    cumulative += probability;
                    choices.push((cumulative, index));
                }
            }
            if choices.is_empty() {
                return None;
            }
            let draw = rng.gen_range(0.0..cumulative);
            let position = choices.partition_point(|(edge, _)| *edge <= draw);
            Some(choices[position.min(choices.len() - 1)].1)
        };

        let donor = pick(true, None)?;
        let receiver = pick(false, Some(donor))?;

        let mut next = self.clone();
        let movable = next.cache_nodes[donor]
            .bytes
            .min(next.cache_nodes[receiver].max_bytes - next.cache_nodes[receiver].bytes);
        debug_assert!(movable >= 1);
        let moved = ((beta_2_4(rng) * movable as f64).ceil() as usize).clamp(1, movable);
        next.cache_nodes[donor].bytes -= moved;
        next.cache_nodes[receiver].bytes += moved;
        Some(next)
    }
}

/// Sample `Beta(2, 4)`: the second-smallest of five independent uniforms.
fn beta_2_4(rng: &mut impl Rng) -> f64 {
    let mut draws = [0.0f64; 5];
    for draw in &mut draws {
        *draw = rng.gen::<f64>();
    }
    draws.sort_by(f64::total_cmp);
    draws[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::TileGraphResult;
    use crate::foundation::geom::{Dimensions, Rect};
    use crate::node::OutNode;
    use crate::cache::TileCache;
    use crate::tile::{PixelFormat, Tile};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    struct Budgeted {
        dims: Dimensions,
        mode: MemoryMode,
        important: bool,
        cache: TileCache,
        change: f64,
        input: Option<SharedOutNode>,
    }

    impl Budgeted {
        fn node(
            dims: Dimensions,
            mode: MemoryMode,
            important: bool,
            change: f64,
            input: Option<SharedOutNode>,
        ) -> SharedOutNode {
            Arc::new(Self {
                dims,
                mode,
                important,
                cache: TileCache::disabled(),
                change,
                input,
            })
        }
    }

    impl OutNode for Budgeted {
        fn dimensions(&self) -> Dimensions {
            self.dims
        }
        fn channels(&self) -> usize {
            1
        }
        fn format(&self) -> PixelFormat {
            PixelFormat::U8
        }
        fn memory_mode(&self) -> MemoryMode {
            self.mode
        }
        fn input_count(&self) -> usize {
            usize::from(self.input.is_some())
        }
        fn input(&self, _: usize) -> &SharedOutNode {
            self.input.as_ref().expect("input")
        }
        fn raw_input_region(&self, _: usize, out_rect: Rect) -> Rect {
            out_rect
        }
        fn cache(&self) -> Option<&TileCache> {
            Some(&self.cache)
        }
        fn change_probability(&self) -> f64 {
            self.change
        }
        fn is_cache_important(&self) -> bool {
            self.important
        }
        fn compute(&self, _: &[crate::node::SharedTile], _: &mut Tile) -> TileGraphResult<()> {
            Ok(())
        }
    }

    fn dims() -> Dimensions {
        Dimensions::new(64, 64) // 4096 bytes at 1 channel, 1 byte
    }

    #[test]
    fn enough_for_all_funds_every_cache_fully() {
        let a = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        let b = Budgeted::node(dims(), MemoryMode::AnyMemory, true, 0.0, None);
        let dist = MemoryDistribution::feasible(100_000, &[a, b]);

        assert_eq!(dist.amount(), MemoryAmount::EnoughForAll);
        assert!(dist.cache_nodes().iter().all(|b| b.bytes == b.max_bytes));
    }

    #[test]
    fn sufficient_funds_important_first_and_shares_the_rest() {
        let important = Budgeted::node(dims(), MemoryMode::AnyMemory, true, 0.0, None);
        let plain_a = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        let plain_b = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        // 4096 for the important node + 2048 to split between 2 x 4096.
        let dist = MemoryDistribution::feasible(4096 + 2048, &[important, plain_a, plain_b]);

        assert_eq!(dist.amount(), MemoryAmount::Sufficient);
        let budgets = dist.cache_nodes();
        assert_eq!(budgets[0].bytes, 4096);
        assert_eq!(budgets[1].bytes + budgets[2].bytes, 2048);
        assert_eq!(budgets[1].bytes, 1024);
    }

    #[test]
    fn too_little_reserves_nothing_for_unimportant_caches() {
        let source = Budgeted::node(dims(), MemoryMode::FullMemory, false, 0.0, None);
        let cached = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        let dist = MemoryDistribution::feasible(1000, &[source, cached]);

        assert_eq!(dist.amount(), MemoryAmount::TooLittle);
        assert_eq!(dist.memory_limit(), 0);
        assert!(dist.cache_nodes().iter().all(|b| b.bytes == 0));
    }

    #[test]
    fn cumulative_removal_probability_compounds_upstream_changes() {
        let source = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.5, None);
        let filter = Budgeted::node(
            dims(),
            MemoryMode::AnyMemory,
            false,
            0.5,
            Some(SharedOutNode::clone(&source)),
        );
        let dist = MemoryDistribution::feasible(100_000, &[source, filter]);

        let budgets = dist.cache_nodes();
        assert_eq!(budgets[0].cum_removal_prob, 0.5);
        assert_eq!(budgets[1].cum_removal_prob, 0.75);
    }

    #[test]
    fn cost_weights_sink_durations_by_relevance() {
        let node = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        let dist = MemoryDistribution::feasible(100_000, &[node]);

        let mut report = SimReport::default();
        report.sinks.push(crate::sim::SinkReport {
            relevance: 3.0,
            duration: 2.0,
        });
        report.sinks.push(crate::sim::SinkReport {
            relevance: 1.0,
            duration: 6.0,
        });
        // weighted = (3*2 + 1*6) / 4 = 3; wasted = 0.
        assert_eq!(dist.cost_from(&report), 3.0);
    }

    #[test]
    fn neighbour_moves_bytes_between_nodes_and_preserves_the_total() {
        let a = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        let b = Budgeted::node(dims(), MemoryMode::AnyMemory, false, 0.0, None);
        let mut dist = MemoryDistribution::feasible(4096, &[a, b]);
        // Give the halves explicitly so both donor and receiver exist.
        dist.cache_nodes[0].bytes = 3000;
        dist.cache_nodes[1].bytes = 1096;

        let mut report = SimReport::default();
        for budget in dist.cache_nodes() {
            report.out.insert(
                NodeId::of_out(budget.node()),
                crate::sim::OutNodeReport {
                    requests: 10,
                    computations: 5,
                    duration: 1.0,
                },
            );
        }

        let mut rng = StdRng::seed_from_u64(11);
        let next = dist.random_neighbour(&report, &mut rng).expect("neighbour");
        let before: usize = dist.cache_nodes().iter().map(|b| b.bytes).sum();
        let after: usize = next.cache_nodes().iter().map(|b| b.bytes).sum();
        assert_eq!(before, after);
        assert_ne!(
            (dist.cache_nodes[0].bytes, dist.cache_nodes[1].bytes),
            (next.cache_nodes[0].bytes, next.cache_nodes[1].bytes)
        );
    }

    #[test]
    fn beta_samples_stay_in_the_unit_interval_and_skew_low() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sum = 0.0;
        for _ in 0..2000 {
            let x = beta_2_4(&mut rng);
            assert!((0.0..=1.0).contains(&x));
            sum += x;
        }
        let mean = sum / 2000.0;
        // Beta(2,4) has mean 1/3.
        assert!((mean - 1.0 / 3.0).abs() < 0.05, "mean {mean}");
    }
}
