//! Graph coloring register allocation
//!
//! The classic allocation pipeline over the [`crate::ir`] substrate:
//!
//! 1. **Liveness**: backward scan producing per-instruction live sets
//! 2. **Build**: interference edges from defs against live-out sets
//! 3. **Coalesce**: fold copy instructions whose endpoints do not interfere
//! 4. **Cost**: frequency-weighted spill cost per symbol
//! 5. **Color**: simplify/select with cost-greedy spill candidate choice
//! 6. **Rewrite**: materialize spills as reload/store pseudo-instructions
//!    and restart from liveness
//!
//! The pipeline loops until a round colors the whole graph with at most `k`
//! colors. Tie-breaks are lexicographic on symbol names, so the result is a
//! deterministic function of the input.
//!
//! This is the plain simplify/select scheme from Chaitin's 1982 paper
//! ("Register Allocation and Spilling via Graph Coloring"): coalescing is
//! aggressive rather than conservative, and pressure the coloring cannot
//! resolve is handled by rewriting spills and rerunning, not by freeze
//! worklists.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;
use thiserror::Error;

use crate::ir::{Program, Symbol};
use crate::liveness::Liveness;

/// Errors surfaced at the allocation boundary.
///
/// No partial results accompany an error; a detected invariant violation in
/// any stage aborts the whole allocation.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The safety bound on spill rounds was exceeded. Carries the spill set
    /// accumulated so far for diagnosis.
    #[error("spill rounds exceeded safety bound ({} symbols spilled)", .spilled.len())]
    Unallocatable { spilled: BTreeSet<Symbol> },

    /// Internal bookkeeping went wrong (asymmetric edge, degree mismatch,
    /// or a select-phase node with no free color). Indicates a bug, never
    /// bad input.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Stable identity of an interference-graph node.
///
/// Coalescing retires node ids but never reuses them, so an id held across
/// a merge either still resolves or is gone; it never silently changes
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Undirected interference graph over coalesced symbol groups.
///
/// Invariants: no self-loops; edges stored canonically in `adj_set` and
/// mirrored in both adjacency lists; a node's degree is the size of its
/// adjacency list; every node owns at least one symbol.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    /// Live nodes and the symbols each one represents.
    nodes: HashMap<NodeId, BTreeSet<Symbol>>,
    /// Symbol -> owning node, updated on every merge.
    symbol_node: HashMap<Symbol, NodeId>,
    /// Canonically ordered edge pairs for symmetric queries.
    adj_set: HashSet<(NodeId, NodeId)>,
    /// Adjacency sets for iteration.
    adj_list: HashMap<NodeId, HashSet<NodeId>>,
    next_id: u32,
}

impl InterferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `symbol` has a node, returning it.
    pub fn add_symbol(&mut self, symbol: &Symbol) -> NodeId {
        if let Some(&id) = self.symbol_node.get(symbol) {
            return id;
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, BTreeSet::from([symbol.clone()]));
        self.symbol_node.insert(symbol.clone(), id);
        self.adj_list.insert(id, HashSet::new());
        id
    }

    pub fn node_of(&self, symbol: &Symbol) -> Option<NodeId> {
        self.symbol_node.get(symbol).copied()
    }

    /// The symbols a node represents. Empty only for retired ids.
    pub fn symbols_of(&self, node: NodeId) -> impl Iterator<Item = &Symbol> {
        self.nodes.get(&node).into_iter().flatten()
    }

    /// Lexicographically smallest member symbol, the deterministic
    /// tie-break key for all node orderings.
    pub fn min_symbol(&self, node: NodeId) -> Option<&Symbol> {
        self.nodes.get(&node).and_then(|syms| syms.iter().next())
    }

    /// Add an undirected edge. Idempotent; self-loops are ignored.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) {
        if u == v {
            return;
        }
        let (a, b) = if u < v { (u, v) } else { (v, u) };
        if self.adj_set.insert((a, b)) {
            self.adj_list.entry(u).or_default().insert(v);
            self.adj_list.entry(v).or_default().insert(u);
        }
    }

    pub fn interferes(&self, u: NodeId, v: NodeId) -> bool {
        let (a, b) = if u < v { (u, v) } else { (v, u) };
        self.adj_set.contains(&(a, b))
    }

    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adj_list
            .get(&node)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adj_list.get(&node).map_or(0, |s| s.len())
    }

    /// Live node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Merge `v` into `u`: the survivor owns the union of both symbol sets
    /// and the union of both neighbor sets (minus the pair itself); `v` is
    /// retired. Callers must have checked that the two do not interfere.
    pub fn merge(&mut self, u: NodeId, v: NodeId) {
        if u == v {
            return;
        }

        let v_symbols = self.nodes.remove(&v).unwrap_or_default();
        for symbol in &v_symbols {
            self.symbol_node.insert(symbol.clone(), u);
        }
        if let Some(set) = self.nodes.get_mut(&u) {
            set.extend(v_symbols);
        }

        let v_neighbors = self.adj_list.remove(&v).unwrap_or_default();
        for w in v_neighbors {
            let (a, b) = if v < w { (v, w) } else { (w, v) };
            self.adj_set.remove(&(a, b));
            if let Some(set) = self.adj_list.get_mut(&w) {
                set.remove(&v);
            }
            if w != u {
                self.add_edge(u, w);
            }
        }
    }

    /// Verify edge symmetry and degree bookkeeping; a failure here is a bug
    /// in the allocator, reported as [`AllocError::InvariantViolation`].
    pub fn check_consistency(&self) -> Result<(), AllocError> {
        for &(a, b) in &self.adj_set {
            if a == b {
                return Err(AllocError::InvariantViolation(format!(
                    "self-loop on {a}"
                )));
            }
            if !self.nodes.contains_key(&a) || !self.nodes.contains_key(&b) {
                return Err(AllocError::InvariantViolation(format!(
                    "edge ({a}, {b}) references a retired node"
                )));
            }
            let forward = self.adj_list.get(&a).is_some_and(|s| s.contains(&b));
            let backward = self.adj_list.get(&b).is_some_and(|s| s.contains(&a));
            if !forward || !backward {
                return Err(AllocError::InvariantViolation(format!(
                    "asymmetric edge ({a}, {b})"
                )));
            }
        }
        for (&node, neighbors) in &self.adj_list {
            if !self.nodes.contains_key(&node) {
                return Err(AllocError::InvariantViolation(format!(
                    "adjacency list for retired node {node}"
                )));
            }
            for &w in neighbors {
                let (a, b) = if node < w { (node, w) } else { (w, node) };
                if !self.adj_set.contains(&(a, b)) {
                    return Err(AllocError::InvariantViolation(format!(
                        "degree mismatch: ({a}, {b}) in adjacency list only"
                    )));
                }
            }
        }
        for (symbol, node) in &self.symbol_node {
            let owned = self
                .nodes
                .get(node)
                .is_some_and(|syms| syms.contains(symbol));
            if !owned {
                return Err(AllocError::InvariantViolation(format!(
                    "symbol {symbol} maps to {node} which does not own it"
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of one coloring attempt.
#[derive(Debug)]
pub enum ColorResult {
    /// Every node received a color in `[0, k)`.
    Colored(HashMap<NodeId, usize>),
    /// Coloring failed; these symbols were selected for memory residency.
    /// The partial coloring is discarded.
    Spilled(BTreeSet<Symbol>),
}

/// Result of a successful allocation.
#[derive(Debug)]
pub struct Allocation {
    /// Symbol -> color index in `[0, k)`, covering every symbol of the
    /// final program.
    pub coloring: HashMap<Symbol, usize>,
    /// Symbols demoted to memory across all spill rounds.
    pub spilled: BTreeSet<Symbol>,
    /// The final instruction sequence; equal to the input when no spills
    /// were required.
    pub program: Program,
}

/// Pipeline state for one allocation. Rebuilt state (graph, costs, spill
/// temps) is cleared at the start of every round; only `k` persists.
pub struct Allocator {
    k: usize,
    graph: InterferenceGraph,
    symbol_cost: HashMap<Symbol, f64>,
    /// Symbols introduced by earlier spill rewrites (reload targets and
    /// store sources). Their live ranges already span a single adjacent
    /// instruction pair, so spilling them again cannot reduce pressure;
    /// they are exempt from spill candidacy.
    spill_temps: HashSet<Symbol>,
}

#[path = "allocator/build.rs"]
mod build;

#[path = "allocator/coalesce.rs"]
mod coalesce;

#[path = "allocator/coloring.rs"]
mod coloring;

#[path = "allocator/spill.rs"]
mod spill;

pub use spill::rewrite_spills;

impl Allocator {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            graph: InterferenceGraph::new(),
            symbol_cost: HashMap::new(),
            spill_temps: HashSet::new(),
        }
    }

    /// The interference graph of the most recent round, for consumers that
    /// render (graph, coloring) snapshots.
    pub fn graph(&self) -> &InterferenceGraph {
        &self.graph
    }

    /// Run the full pipeline to fixpoint.
    pub fn allocate(&mut self, program: Program) -> Result<Allocation, AllocError> {
        validate(&program, self.k)?;

        // Spilling shortens every spilled live range to single-instruction
        // spans, so interference shrinks strictly; one round per original
        // symbol is already generous.
        let max_rounds = program.symbols().len() + 1;

        let mut current = program;
        let mut spilled: BTreeSet<Symbol> = BTreeSet::new();

        for round in 0..max_rounds {
            let liveness = Liveness::compute(&current);

            self.graph = InterferenceGraph::new();
            self.build(&current, &liveness);
            self.graph.check_consistency()?;

            let mut work = current.clone();
            let folded = self.coalesce(&mut work);
            self.graph.check_consistency()?;

            self.compute_spill_costs(&work);

            debug!(
                "round {round}: {} nodes, {} copies folded",
                self.graph.len(),
                folded
            );

            match self.color()? {
                ColorResult::Colored(node_colors) => {
                    let mut coloring = HashMap::new();
                    for (node, color) in node_colors {
                        for symbol in self.graph.symbols_of(node) {
                            coloring.insert(symbol.clone(), color);
                        }
                    }
                    debug!(
                        "round {round}: colored {} symbols, {} spilled in total",
                        coloring.len(),
                        spilled.len()
                    );
                    return Ok(Allocation {
                        coloring,
                        spilled,
                        program: current,
                    });
                }
                ColorResult::Spilled(round_spills) => {
                    debug!("round {round}: spilling {:?}", round_spills);
                    current = rewrite_spills(&current, &round_spills);
                    spilled.extend(round_spills);
                }
            }
        }

        Err(AllocError::Unallocatable { spilled })
    }
}

fn validate(program: &Program, k: usize) -> Result<(), AllocError> {
    if k < 1 {
        return Err(AllocError::InvalidInput(format!(
            "register count must be at least 1, got {k}"
        )));
    }
    if program.is_empty() {
        return Err(AllocError::InvalidInput("empty program".into()));
    }
    for (&block, &freq) in &program.frequencies {
        if freq < 0.0 || freq.is_nan() {
            return Err(AllocError::InvalidInput(format!(
                "negative frequency {freq} for {block}"
            )));
        }
    }
    for (idx, inst) in program.insts.iter().enumerate() {
        let mut seen: HashSet<&Symbol> = HashSet::new();
        for def in inst.defined() {
            if !seen.insert(def) {
                return Err(AllocError::InvalidInput(format!(
                    "symbol {def} defined twice by instruction {idx} ({inst})"
                )));
            }
        }
        if inst.is_copy() && inst.copy_pair().is_none() {
            return Err(AllocError::InvalidInput(format!(
                "copy at instruction {idx} ({inst}) must have exactly one def and one use"
            )));
        }
    }
    Ok(())
}

/// Allocate `k` registers for `program`.
pub fn allocate(program: Program, k: usize) -> Result<Allocation, AllocError> {
    Allocator::new(k).allocate(program)
}
