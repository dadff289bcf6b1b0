use crate::budget::distribution::MemoryDistribution;
use crate::exec::driver::RunFlag;
use crate::node::SharedSinkNode;
use crate::sim::SimReport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// Tuning knobs for the memory-distribution annealer.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnealOpts {
    /// Stop after this many consecutive non-improving iterations.
    pub end_iterations: usize,
    /// Initial Metropolis temperature.
    pub initial_temp: f64,
    /// Cooling factor applied each iteration.
    pub beta: f64,
    /// RNG seed; `None` seeds from entropy. Tests inject a seed for a
    /// reproducible trajectory.
    pub seed: Option<u64>,
}

impl Default for AnnealOpts {
    fn default() -> Self {
        Self {
            end_iterations: 4,
            initial_temp: 0.5,
            beta: 0.95,
            seed: None,
        }
    }
}

/// An evaluated distribution: the simulation report it produced and the
/// scalar cost derived from it.
pub(crate) struct Annealed {
    pub(crate) distribution: MemoryDistribution,
    pub(crate) report: SimReport,
    pub(crate) cost: f64,
}

fn evaluate(distribution: MemoryDistribution, sinks: &[SharedSinkNode]) -> Annealed {
    let mut sim = distribution.build_sim(sinks);
    let total = sim.run();
    let mut report = sim.report();
    report.total = total;
    let cost = distribution.cost_from(&report);
    Annealed {
        distribution,
        report,
        cost,
    }
}

/// Metropolis acceptance probability.
fn metropolis(cost_x: f64, cost_y: f64, temperature: f64) -> f64 {
    if cost_y <= cost_x {
        1.0
    } else {
        (-(cost_y - cost_x) / temperature).exp()
    }
}

/// Refine `init` by simulated annealing against the proto-simulator.
///
/// Tracks the best distribution seen; the strict comparison when updating
/// it keeps tied costs from resetting the stop counter. When `run` is
/// given, cancellation is honored between iterations and the best seen so
/// far is returned.
pub(crate) fn anneal(
    init: MemoryDistribution,
    sinks: &[SharedSinkNode],
    opts: &AnnealOpts,
    run: Option<&RunFlag>,
) -> Annealed {
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut current = evaluate(init, sinks);
    debug!(cost = current.cost, "annealer started");

    let mut best = Annealed {
        distribution: current.distribution.clone(),
        report: current.report.clone(),
        cost: current.cost,
    };
    let mut temperature = opts.initial_temp;
    let mut kept = 0usize;

    while kept <= opts.end_iterations {
        if run.is_some_and(|r| !r.keep_running()) {
            debug!("annealer cancelled");
            break;
        }

        let Some(neighbour) = current
            .distribution
            .random_neighbour(&current.report, &mut rng)
        else {
            debug!("no neighbour available, stopping early");
            break;
        };
        let candidate = evaluate(neighbour, sinks);

        let acceptance = metropolis(current.cost, candidate.cost, temperature);
        let accepted = acceptance >= rng.gen::<f64>();
        trace!(
            cost = candidate.cost,
            acceptance,
            accepted,
            temperature,
            "annealer iteration"
        );
        if accepted {
            current = candidate;
        }
        temperature *= opts.beta;

        if best.cost > current.cost {
            best = Annealed {
                distribution: current.distribution.clone(),
                report: current.report.clone(),
                cost: current.cost,
            };
            kept = 0;
        } else {
            kept += 1;
        }
    }

    debug!(cost = best.cost, "annealer finished");
    best
}
