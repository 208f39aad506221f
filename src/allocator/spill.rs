use log::trace;

use super::*;
use crate::ir::{DefSite, InstKind, Instruction, UseSite};

/// Rewrite `program` so every symbol in `spilled` lives in memory.
///
/// Per occurrence: a use is preceded by a `Reload` defining a fresh symbol
/// which replaces the original operand (marked last-use); a def is renamed
/// to a fresh symbol and followed by a `Store` consuming it. Fresh symbols
/// are unique per instruction and never reused, so each spans a single
/// adjacent pair of instructions. The memory slot is addressed by the
/// original symbol's name inside the pseudo-instruction text; it is not a
/// def/use operand.
///
/// The input is left untouched; a new program value is returned.
pub fn rewrite_spills(program: &Program, spilled: &BTreeSet<Symbol>) -> Program {
    let mut insts = Vec::with_capacity(program.insts.len());

    for (idx, inst) in program.insts.iter().enumerate() {
        let mut inst = inst.clone();

        // One reload per distinct spilled symbol, in first-use order.
        let mut reloaded: Vec<(Symbol, Symbol)> = Vec::new();
        for site in &inst.uses {
            if spilled.contains(&site.symbol)
                && !reloaded.iter().any(|(orig, _)| *orig == site.symbol)
            {
                let fresh = Symbol::new(format!("{}.r{idx}", site.symbol));
                reloaded.push((site.symbol.clone(), fresh));
            }
        }
        for (orig, fresh) in &reloaded {
            trace!("spill: reload {orig} as {fresh} before instruction {idx}");
            insts.push(Instruction {
                text: format!("{fresh} := load [{orig}]"),
                kind: InstKind::Reload,
                block: inst.block,
                defs: vec![DefSite {
                    symbol: fresh.clone(),
                    is_dead_def: false,
                }],
                uses: Vec::new(),
            });
        }
        for site in &mut inst.uses {
            if let Some((_, fresh)) = reloaded.iter().find(|(orig, _)| *orig == site.symbol) {
                *site = UseSite {
                    symbol: fresh.clone(),
                    is_last_use: true,
                };
            }
        }

        let mut stores: Vec<(Symbol, Symbol)> = Vec::new();
        for site in &mut inst.defs {
            if spilled.contains(&site.symbol) {
                let fresh = Symbol::new(format!("{}.w{idx}", site.symbol));
                stores.push((site.symbol.clone(), fresh.clone()));
                // The store consumes the fresh value even if the original
                // definition was dead.
                site.symbol = fresh;
                site.is_dead_def = false;
            }
        }

        let block = inst.block;
        insts.push(inst);

        for (orig, fresh) in stores {
            trace!("spill: store {fresh} to {orig} after instruction {idx}");
            insts.push(Instruction {
                text: format!("store [{orig}] := {fresh}"),
                kind: InstKind::Store,
                block,
                defs: Vec::new(),
                uses: vec![UseSite {
                    symbol: fresh,
                    is_last_use: true,
                }],
            });
        }
    }

    Program::new(insts, program.frequencies.clone())
}
