//! The public graph surface: node ownership, optimizer hooks, memory
//! distribution, and the blocking `compute` entry points.

use crate::budget::{anneal, AnnealOpts, MemoryAmount, MemoryDistribution};
use crate::exec::driver::{run_compute, ComputeStats, RunFlag};
use crate::foundation::error::{TileGraphError, TileGraphResult};
use crate::node::{NodeId, SharedOutNode, SharedSinkNode};
use crate::sim::ProtoGraphAdaptor;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Options for `compute`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ComputeOpts {
    /// Worker thread count; `None` uses the machine's available
    /// parallelism.
    pub threads: Option<usize>,
}

/// A graph-rewrite pass applied by [`Graph::optimize`].
///
/// Rewriters typically create wrapper nodes via [`Graph::wrap_nodes`] so
/// that the wrapped originals keep their public contract.
pub trait Optimizer: Send + Sync {
    /// Rewrite the graph in place.
    fn optimize(&self, graph: &mut Graph) -> TileGraphResult<()>;
}

struct ParentLink {
    parent: SharedOutNode,
    is_output: bool,
}

/// A DAG of tile-producing nodes and tile-consuming sinks, executed on
/// demand under a memory budget.
///
/// Nodes are added bottom-up (inputs first) and held by shared ownership,
/// which makes cycles unconstructible. `compute` may be cancelled from
/// another thread with [`Graph::finish`]; a cancelled graph can compute
/// again.
#[derive(Default)]
pub struct Graph {
    out_nodes: Vec<SharedOutNode>,
    sink_nodes: Vec<SharedSinkNode>,
    optimizers: Vec<Box<dyn Optimizer>>,
    /// Per-node stack of wrapper links; the topmost link flagged
    /// `is_output` represents the node in the rewritten graph.
    parents: FxHashMap<NodeId, Vec<ParentLink>>,
    /// Children per wrapper, for detachment on erase.
    wrapped: FxHashMap<NodeId, Vec<SharedOutNode>>,
    run: RunFlag,
}

impl Graph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output node, returning a typed handle to it.
    pub fn add_out_node<N: crate::node::OutNode + 'static>(&mut self, node: N) -> Arc<N> {
        let arc = Arc::new(node);
        self.out_nodes.push(arc.clone() as SharedOutNode);
        arc
    }

    /// Add an already-shared output node (used by rewriters).
    pub fn adopt_out_node(&mut self, node: SharedOutNode) {
        self.out_nodes.push(node);
    }

    /// Add a sink node, returning a typed handle to it.
    pub fn add_sink_node<N: crate::node::SinkNode + 'static>(&mut self, node: N) -> Arc<N> {
        let arc = Arc::new(node);
        self.sink_nodes.push(arc.clone() as SharedSinkNode);
        arc
    }

    /// The graph's output nodes, in insertion order.
    pub fn out_nodes(&self) -> &[SharedOutNode] {
        &self.out_nodes
    }

    /// The graph's sinks, in insertion order.
    pub fn sink_nodes(&self) -> &[SharedSinkNode] {
        &self.sink_nodes
    }

    /// Install `parent` as a wrapper over `children`.
    ///
    /// When `represents` names one of the children, the wrapper becomes
    /// that child's public face: [`Graph::output_node`] resolves the child
    /// to `parent` until the wrapper is erased.
    pub fn wrap_nodes(
        &mut self,
        parent: SharedOutNode,
        children: &[SharedOutNode],
        represents: Option<&SharedOutNode>,
    ) -> TileGraphResult<()> {
        if let Some(represents) = represents {
            if !children.iter().any(|c| Arc::ptr_eq(c, represents)) {
                return Err(TileGraphError::graph(
                    "the represented node must be one of the wrapped children",
                ));
            }
        }

        let parent_id = NodeId::of_out(&parent);
        for child in children {
            let link = ParentLink {
                parent: SharedOutNode::clone(&parent),
                is_output: represents.is_some_and(|r| Arc::ptr_eq(child, r)),
            };
            self.parents.entry(NodeId::of_out(child)).or_default().push(link);
        }
        self.wrapped.insert(parent_id, children.to_vec());
        self.out_nodes.push(parent);
        Ok(())
    }

    /// Resolve a node to its topmost output wrapper, or itself.
    pub fn output_node(&self, node: &SharedOutNode) -> TileGraphResult<SharedOutNode> {
        match self.parents.get(&NodeId::of_out(node)).and_then(|s| s.last()) {
            None => Ok(SharedOutNode::clone(node)),
            Some(link) if link.is_output => Ok(SharedOutNode::clone(&link.parent)),
            Some(_) => Err(TileGraphError::graph(
                "node has a wrapper, but the wrapper does not represent it",
            )),
        }
    }

    /// Remove an output node, erasing any wrappers above it first.
    pub fn erase_out_node(&mut self, node: &SharedOutNode) -> TileGraphResult<()> {
        // Wrappers stack; the topmost must go first.
        loop {
            let top = self
                .parents
                .get(&NodeId::of_out(node))
                .and_then(|s| s.last())
                .map(|l| SharedOutNode::clone(&l.parent));
            match top {
                Some(parent) => self.erase_out_node(&parent)?,
                None => break,
            }
        }

        let id = NodeId::of_out(node);
        if let Some(children) = self.wrapped.remove(&id) {
            for child in children {
                let stack = self.parents.entry(NodeId::of_out(&child)).or_default();
                match stack.last() {
                    Some(link) if Arc::ptr_eq(&link.parent, node) => {
                        stack.pop();
                    }
                    _ => {
                        return Err(TileGraphError::graph(
                            "wrapper is not the topmost parent of its child",
                        ))
                    }
                }
            }
        }
        self.parents.remove(&id);
        self.out_nodes.retain(|n| !Arc::ptr_eq(n, node));
        Ok(())
    }

    /// Remove a sink node.
    pub fn erase_sink_node(&mut self, sink: &SharedSinkNode) {
        self.sink_nodes.retain(|s| !Arc::ptr_eq(s, sink));
    }

    /// Register a graph-rewrite pass.
    pub fn add_optimizer(&mut self, optimizer: Box<dyn Optimizer>) {
        self.optimizers.push(optimizer);
    }

    /// Apply every registered rewrite pass, in registration order.
    pub fn optimize(&mut self) -> TileGraphResult<()> {
        let optimizers = std::mem::take(&mut self.optimizers);
        let mut result = Ok(());
        for optimizer in &optimizers {
            result = optimizer.optimize(self);
            if result.is_err() {
                break;
            }
        }
        self.optimizers = optimizers;
        result
    }

    /// Estimate the schedule's duration with every node's cache capacity
    /// forced to `sample_capacity` slots. A pure simulator call.
    pub fn computation_duration(&self, sample_capacity: usize) -> Duration {
        let mut sim = ProtoGraphAdaptor::new();
        for sink in &self.sink_nodes {
            sim.add_sink(sink);
        }
        for node in &self.out_nodes {
            sim.add_out_node(node, sample_capacity);
        }
        Duration::from_secs_f64(sim.run().max(0.0))
    }

    /// Choose per-node cache budgets for `memory_limit` bytes with the
    /// default annealer options.
    pub fn optimize_memory_distribution(&self, memory_limit: usize) -> MemoryDistribution {
        self.optimize_memory_distribution_with(memory_limit, &AnnealOpts::default())
    }

    /// Choose per-node cache budgets for `memory_limit` bytes.
    pub fn optimize_memory_distribution_with(
        &self,
        memory_limit: usize,
        opts: &AnnealOpts,
    ) -> MemoryDistribution {
        self.distribute_memory(memory_limit, opts, None)
    }

    fn distribute_memory(
        &self,
        memory_limit: usize,
        opts: &AnnealOpts,
        run: Option<&RunFlag>,
    ) -> MemoryDistribution {
        let distribution = MemoryDistribution::feasible(memory_limit, &self.out_nodes);
        match distribution.amount() {
            MemoryAmount::EnoughForAll => {
                debug!("memory suffices for every cache");
                distribution
            }
            MemoryAmount::TooLittle => {
                debug!("memory does not cover even the full-memory nodes");
                distribution
            }
            MemoryAmount::Sufficient => {
                if distribution.memory_limit() == 0 {
                    debug!("memory precisely covers the necessary parts");
                    return distribution;
                }
                if distribution.cache_nodes().len() <= 1 {
                    debug!("fewer than two cache nodes, nothing to distribute");
                    return distribution;
                }
                anneal(distribution, &self.sink_nodes, opts, run).distribution
            }
        }
    }

    /// Distribute `memory_limit` bytes, then run every sink to completion.
    pub fn compute(
        &self,
        memory_limit: usize,
        opts: ComputeOpts,
    ) -> TileGraphResult<ComputeStats> {
        let guard = self.run.begin()?;
        let distribution =
            self.distribute_memory(memory_limit, &AnnealOpts::default(), Some(&self.run));
        self.compute_guarded(&distribution, opts, guard)
    }

    /// Run every sink to completion under a pre-computed distribution.
    pub fn compute_with(
        &self,
        distribution: &MemoryDistribution,
        opts: ComputeOpts,
    ) -> TileGraphResult<ComputeStats> {
        let guard = self.run.begin()?;
        self.compute_guarded(distribution, opts, guard)
    }

    fn compute_guarded(
        &self,
        distribution: &MemoryDistribution,
        opts: ComputeOpts,
        guard: crate::exec::driver::RunGuard<'_>,
    ) -> TileGraphResult<ComputeStats> {
        distribution.apply();
        let threads = opts.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let result = run_compute(&self.sink_nodes, &self.run, threads);
        drop(guard);
        result
    }

    /// Cooperatively cancel a running `compute`, blocking until it has
    /// stopped. A no-op when nothing runs.
    pub fn finish(&self) {
        self.run.finish();
    }
}
