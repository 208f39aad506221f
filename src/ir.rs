//! Intermediate program substrate for register allocation
//!
//! The IR is deliberately small: an ordered list of instructions, each
//! annotated with the symbols it defines and uses, plus a per-block
//! execution-frequency table. It carries exactly the metadata the
//! allocation pipeline reads and rewrites:
//! - def/use sites with last-use and dead-def markers
//! - a closed set of instruction kinds (copies and spill pseudo-ops are
//!   distinguished structurally, not by parsing display text)
//! - block frequencies for spill-cost weighting

use std::collections::{BTreeSet, HashMap};
use std::fmt;

mod inst_impl;
mod program_impl;

/// A program variable, value-equal by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol(name.to_string())
    }
}

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A definition occurrence of a symbol at one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefSite {
    pub symbol: Symbol,
    /// The defined value is never consumed. Rare; carried for completeness.
    pub is_dead_def: bool,
}

/// A use occurrence of a symbol at one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseSite {
    pub symbol: Symbol,
    /// This is the final reference to the symbol's current live range
    /// within the enclosing block; the symbol leaves the live set right
    /// after this instruction.
    pub is_last_use: bool,
}

/// Instruction kinds the allocator distinguishes.
///
/// `Copy` marks a side-effect-free move with exactly one def and one use;
/// only copies are considered for coalescing. `Reload` and `Store` are the
/// spill pseudo-instructions inserted between allocation rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    Ordinary,
    Copy,
    Reload,
    Store,
}

/// One instruction of the intermediate program.
///
/// `text` is opaque display text; the pipeline never interprets it. All
/// semantic information lives in `kind`, `defs`, `uses`, and `block`.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub text: String,
    pub kind: InstKind,
    pub block: BlockId,
    pub defs: Vec<DefSite>,
    pub uses: Vec<UseSite>,
}

/// The mutable instruction sequence all pipeline stages read and rewrite.
///
/// Invariant: every instruction belongs to exactly one block; blocks without
/// a frequency entry execute with frequency 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub insts: Vec<Instruction>,
    pub frequencies: HashMap<BlockId, f64>,
}
