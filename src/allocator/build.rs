use log::trace;

use super::*;
use crate::ir::InstKind;

impl Allocator {
    /// Build the interference graph from liveness information.
    ///
    /// Every symbol in any def or use becomes a node. A definition
    /// interferes with everything live past the defining instruction:
    /// the new value must occupy a register distinct from all of theirs.
    /// Uses add no edges; those symbols got their edges where they were
    /// defined.
    pub(super) fn build(&mut self, program: &Program, liveness: &Liveness) {
        self.spill_temps.clear();

        for inst in &program.insts {
            for def in inst.defined() {
                self.graph.add_symbol(def);
            }
            for used in inst.used() {
                self.graph.add_symbol(used);
            }
            match inst.kind {
                InstKind::Reload => self.spill_temps.extend(inst.defined().cloned()),
                InstKind::Store => self.spill_temps.extend(inst.used().cloned()),
                _ => {}
            }
        }

        for (idx, inst) in program.insts.iter().enumerate() {
            // The source of a copy may share a register with its target;
            // suppressing this edge is what makes coalescing possible.
            let exempt = inst.copy_pair().map(|(dst, src)| (dst.clone(), src.clone()));

            for def in inst.defined() {
                let def_node = match self.graph.node_of(def) {
                    Some(n) => n,
                    None => continue,
                };
                for live in &liveness.live_out[idx] {
                    if live == def {
                        continue;
                    }
                    if let Some((dst, src)) = &exempt {
                        if def == dst && live == src {
                            continue;
                        }
                    }
                    if let Some(live_node) = self.graph.node_of(live) {
                        self.graph.add_edge(def_node, live_node);
                    }
                }
            }
        }

        trace!(
            "build: {} nodes, {} edges",
            self.graph.len(),
            self.graph.adj_set.len()
        );
    }

    /// Frequency-weighted spill costs over the coalesced working program.
    ///
    /// Each def site and use site of a symbol contributes one unit scaled
    /// by the enclosing block's execution frequency. Copies folded by the
    /// coalescer no longer exist here, so they cost nothing.
    pub(super) fn compute_spill_costs(&mut self, program: &Program) {
        self.symbol_cost.clear();

        for inst in &program.insts {
            let weight = program.frequency(inst.block);
            for def in inst.defined() {
                *self.symbol_cost.entry(def.clone()).or_insert(0.0) += weight;
            }
            for used in inst.used() {
                *self.symbol_cost.entry(used.clone()).or_insert(0.0) += weight;
            }
        }
    }

    /// Cost of spilling a whole node: the sum over its member symbols.
    pub(super) fn node_cost(&self, node: NodeId) -> f64 {
        self.graph
            .symbols_of(node)
            .map(|s| self.symbol_cost.get(s).copied().unwrap_or(0.0))
            .sum()
    }

    /// A node consisting entirely of spill temps is never re-spilled: its
    /// ranges are already single-instruction spans.
    pub(super) fn is_spill_exempt(&self, node: NodeId) -> bool {
        self.graph
            .symbols_of(node)
            .all(|s| self.spill_temps.contains(s))
    }
}
