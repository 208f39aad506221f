use log::trace;

use super::*;

impl Allocator {
    /// Fold copy instructions whose endpoints do not interfere.
    ///
    /// Scans in program order, merging the source node into the target
    /// node and dropping the copy. A copy whose endpoints already share a
    /// node is redundant and dropped too; a copy whose endpoints interfere
    /// is left in place (they can never share a register). Scans repeat
    /// until one completes without a merge, since a merge can make a copy
    /// seen earlier in the pass redundant.
    ///
    /// Only the working program is edited; the caller's persistent program
    /// keeps its copies.
    ///
    /// Returns the number of copies folded away.
    pub(super) fn coalesce(&mut self, work: &mut Program) -> usize {
        let mut folded = 0;

        loop {
            let mut merged = false;
            let mut kept = Vec::with_capacity(work.insts.len());

            for inst in std::mem::take(&mut work.insts) {
                let pair = inst
                    .copy_pair()
                    .map(|(dst, src)| (dst.clone(), src.clone()));
                let Some((dst, src)) = pair else {
                    kept.push(inst);
                    continue;
                };

                match (self.graph.node_of(&dst), self.graph.node_of(&src)) {
                    (Some(u), Some(v)) if u == v => {
                        trace!("coalesce: dropping redundant copy {inst}");
                        folded += 1;
                    }
                    (Some(u), Some(v)) if !self.graph.interferes(u, v) => {
                        trace!("coalesce: merging {src} into {dst}, dropping {inst}");
                        self.graph.merge(u, v);
                        folded += 1;
                        merged = true;
                    }
                    _ => kept.push(inst),
                }
            }

            work.insts = kept;
            if !merged {
                break;
            }
        }

        folded
    }
}
