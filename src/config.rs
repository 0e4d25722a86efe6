//! Explicit solver context.
//!
//! The teacher's algograph has no notion of global state at all; the
//! generalization needed here replaces the source's near-globals (RNG,
//! logger, `JdrasilProperties`, signal handler, exit flag — see
//! SPEC_FULL.md §9) with one object threaded through every constructor that
//! needs any of them. Nothing in this crate reads a thread-local or a
//! process-wide static.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

/// Which minor-min-width tie-breaking strategy to use when contracting.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ContractionStrategy {
    MinDegree,
    MaxDegree,
    LeastCommonNeighbors,
}

impl Default for ContractionStrategy {
    fn default() -> Self {
        ContractionStrategy::LeastCommonNeighbors
    }
}

/// Cardinality-encoding policy for the SAT layer. `Auto` reproduces the
/// size-based selection rule of SPEC_FULL.md §4.5.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CardinalityPolicy {
    Auto,
    Binomial,
    SequentialCounter,
    SortingNetwork,
    DecreasingCounter,
}

impl Default for CardinalityPolicy {
    fn default() -> Self {
        CardinalityPolicy::Auto
    }
}

/// A shared, cooperatively-checked cancellation flag. Cloning shares the
/// underlying atomic, so a `TERM`-like host signal (outside this crate's
/// scope) can set it from any thread and every worker observes it at its
/// next check point.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-solve context: RNG, cancellation, deadline, memory budget, and the
/// strategy choices enumerated in SPEC_FULL.md §3/§4.3/§4.5.
#[derive(Clone)]
pub struct SolverConfig {
    rng: StdRng,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    memory_budget_bytes: usize,
    contraction_strategy: ContractionStrategy,
    cardinality_policy: CardinalityPolicy,
    enable_path_improved_lower_bound: bool,
    parallel: bool,
    atom_exact_limit: usize,
}

impl SolverConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            cancellation: CancellationToken::new(),
            deadline: None,
            memory_budget_bytes: 1 << 30,
            contraction_strategy: ContractionStrategy::default(),
            cardinality_policy: CardinalityPolicy::default(),
            enable_path_improved_lower_bound: false,
            parallel: false,
            atom_exact_limit: 40,
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline_exceeded()
    }

    pub fn deadline_exceeded(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn with_deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(Instant::now() + d);
        self
    }

    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    pub fn memory_budget_bytes(&self) -> usize {
        self.memory_budget_bytes
    }

    pub fn with_contraction_strategy(mut self, s: ContractionStrategy) -> Self {
        self.contraction_strategy = s;
        self
    }

    pub fn contraction_strategy(&self) -> ContractionStrategy {
        self.contraction_strategy
    }

    pub fn with_cardinality_policy(mut self, p: CardinalityPolicy) -> Self {
        self.cardinality_policy = p;
        self
    }

    pub fn cardinality_policy(&self) -> CardinalityPolicy {
        self.cardinality_policy
    }

    pub fn with_path_improved_lower_bound(mut self, on: bool) -> Self {
        self.enable_path_improved_lower_bound = on;
        self
    }

    pub fn path_improved_lower_bound_enabled(&self) -> bool {
        self.enable_path_improved_lower_bound
    }

    pub fn with_parallel(mut self, on: bool) -> Self {
        self.parallel = on;
        self
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn with_atom_exact_limit(mut self, n: usize) -> Self {
        self.atom_exact_limit = n;
        self
    }

    pub fn atom_exact_limit(&self) -> usize {
        self.atom_exact_limit
    }

    /// A child context for an independently-solved component/atom: same
    /// policy choices and cancellation token (so a global cancel still
    /// reaches every worker), but a distinct RNG stream derived from the
    /// parent seed and the component index, so parallel runs stay
    /// reproducible (SPEC_FULL.md §5 "Ordering guarantees").
    pub fn derive_for_component(&self, component_index: u64) -> Self {
        let mixed_seed = self
            .rng
            .clone()
            .gen::<u64>()
            .wrapping_add(component_index.wrapping_mul(0x9E3779B97F4A7C15));
        Self {
            rng: StdRng::seed_from_u64(mixed_seed),
            cancellation: self.cancellation.clone(),
            deadline: self.deadline,
            memory_budget_bytes: self.memory_budget_bytes,
            contraction_strategy: self.contraction_strategy,
            cardinality_policy: self.cardinality_policy,
            enable_path_improved_lower_bound: self.enable_path_improved_lower_bound,
            parallel: self.parallel,
            atom_exact_limit: self.atom_exact_limit,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::with_seed(0x5EED)
    }
}
