use log::trace;

use super::*;

impl Allocator {
    /// Chaitin's simplify/select procedure.
    ///
    /// Simplify repeatedly removes a node of degree < k from a private
    /// working copy of the graph, pushing it with a snapshot of its
    /// remaining neighbors. When only high-degree nodes remain, the
    /// cheapest one is removed as a spill candidate instead (and not
    /// pushed). Select then pops the stack and gives every node the
    /// smallest color unused among its snapshot neighbors; a node pushed
    /// with degree < k always finds one.
    ///
    /// The canonical graph is untouched; all removals happen on the copy.
    pub(super) fn color(&self) -> Result<ColorResult, AllocError> {
        let mut adj: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for node in self.graph.node_ids() {
            adj.insert(node, self.graph.neighbors(node).collect());
        }

        let mut alive: BTreeSet<NodeId> = adj.keys().copied().collect();
        let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        let mut spills: BTreeSet<Symbol> = BTreeSet::new();

        while !alive.is_empty() {
            let simplifiable = alive
                .iter()
                .copied()
                .filter(|&n| adj[&n].len() < self.k)
                .min_by_key(|&n| self.graph.min_symbol(n));

            let (victim, push) = match simplifiable {
                Some(node) => (node, true),
                None => {
                    // Everything left is high-degree: give up the node
                    // whose occurrences are cheapest to reload and store.
                    // Spill temps are skipped unless nothing else remains
                    // (then the driver's round bound is the backstop).
                    let candidates: Vec<NodeId> = {
                        let eligible: Vec<NodeId> = alive
                            .iter()
                            .copied()
                            .filter(|&n| !self.is_spill_exempt(n))
                            .collect();
                        if eligible.is_empty() {
                            alive.iter().copied().collect()
                        } else {
                            eligible
                        }
                    };
                    let node = candidates
                        .into_iter()
                        .min_by(|&a, &b| {
                            self.node_cost(a)
                                .total_cmp(&self.node_cost(b))
                                .then_with(|| self.graph.min_symbol(a).cmp(&self.graph.min_symbol(b)))
                        })
                        .ok_or_else(|| {
                            AllocError::InvariantViolation(
                                "non-empty working graph yielded no spill candidate".into(),
                            )
                        })?;
                    trace!(
                        "color: spill candidate {node} (cost {})",
                        self.node_cost(node)
                    );
                    spills.extend(self.graph.symbols_of(node).cloned());
                    (node, false)
                }
            };

            let neighbors: Vec<NodeId> = {
                let mut ns: Vec<NodeId> = adj[&victim].iter().copied().collect();
                ns.sort_unstable();
                ns
            };
            for &w in &neighbors {
                if let Some(set) = adj.get_mut(&w) {
                    set.remove(&victim);
                }
            }
            adj.remove(&victim);
            alive.remove(&victim);

            if push {
                stack.push((victim, neighbors));
            }
        }

        if !spills.is_empty() {
            return Ok(ColorResult::Spilled(spills));
        }

        let mut colors: HashMap<NodeId, usize> = HashMap::new();
        while let Some((node, neighbors)) = stack.pop() {
            let used: HashSet<usize> = neighbors
                .iter()
                .filter_map(|n| colors.get(n).copied())
                .collect();
            let color = (0..self.k).find(|c| !used.contains(c)).ok_or_else(|| {
                AllocError::InvariantViolation(format!(
                    "no free color for {node} among {} registers",
                    self.k
                ))
            })?;
            colors.insert(node, color);
        }

        Ok(ColorResult::Colored(colors))
    }
}
