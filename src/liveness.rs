//! Backward liveness analysis over the instruction stream
//!
//! Because every instruction carries complete def and use lists, liveness is
//! a single backward scan: no control-flow fixpoint is needed. The
//! `is_last_use` markers on use sites are redundant for this pass and are
//! not consulted; they are carried through the IR for consumers that cannot
//! afford a full backward scan.

use std::collections::HashSet;

use log::trace;

use crate::ir::{Program, Symbol};

/// Per-instruction live sets, indexed by instruction position.
///
/// `live_in[i]` holds the symbols live immediately before instruction `i`,
/// `live_out[i]` those live immediately after it.
#[derive(Debug, Clone)]
pub struct Liveness {
    pub live_in: Vec<HashSet<Symbol>>,
    pub live_out: Vec<HashSet<Symbol>>,
}

impl Liveness {
    /// Compute live sets with one scan from the last instruction to the
    /// first, maintaining a running set: record live-out, remove defs, add
    /// uses, record live-in.
    ///
    /// A symbol used without any prior definition is treated as a
    /// live-on-entry formal parameter; it simply survives to the top of the
    /// program.
    pub fn compute(program: &Program) -> Self {
        let n = program.insts.len();
        let mut info = Liveness {
            live_in: vec![HashSet::new(); n],
            live_out: vec![HashSet::new(); n],
        };

        let mut live: HashSet<Symbol> = HashSet::new();

        for (idx, inst) in program.insts.iter().enumerate().rev() {
            info.live_out[idx] = live.clone();

            for def in inst.defined() {
                live.remove(def);
            }
            for used in inst.used() {
                live.insert(used.clone());
            }

            info.live_in[idx] = live.clone();
        }

        trace!(
            "liveness: {} instructions, {} live on entry",
            n,
            info.live_in.first().map_or(0, |s| s.len())
        );

        info
    }
}
