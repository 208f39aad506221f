use super::*;

impl Instruction {
    /// Create an ordinary instruction with no operands yet.
    pub fn new(text: impl Into<String>, block: BlockId) -> Self {
        Self {
            text: text.into(),
            kind: InstKind::Ordinary,
            block,
            defs: Vec::new(),
            uses: Vec::new(),
        }
    }

    /// Create a copy instruction `dst := src`.
    ///
    /// The use site is not marked last-use; callers that know the source
    /// dies here can flag it via [`Instruction::read_last`] instead.
    pub fn copy(dst: impl Into<Symbol>, src: impl Into<Symbol>, block: BlockId) -> Self {
        let dst = dst.into();
        let src = src.into();
        Self {
            text: format!("{dst} := {src}"),
            kind: InstKind::Copy,
            block,
            defs: vec![DefSite {
                symbol: dst,
                is_dead_def: false,
            }],
            uses: vec![UseSite {
                symbol: src,
                is_last_use: false,
            }],
        }
    }

    /// Add a definition of `symbol`.
    pub fn def(mut self, symbol: impl Into<Symbol>) -> Self {
        self.defs.push(DefSite {
            symbol: symbol.into(),
            is_dead_def: false,
        });
        self
    }

    /// Add a definition whose value is never consumed.
    pub fn def_dead(mut self, symbol: impl Into<Symbol>) -> Self {
        self.defs.push(DefSite {
            symbol: symbol.into(),
            is_dead_def: true,
        });
        self
    }

    /// Add a use of `symbol`.
    pub fn read(mut self, symbol: impl Into<Symbol>) -> Self {
        self.uses.push(UseSite {
            symbol: symbol.into(),
            is_last_use: false,
        });
        self
    }

    /// Add a use of `symbol` marked as the last reference to its live range.
    pub fn read_last(mut self, symbol: impl Into<Symbol>) -> Self {
        self.uses.push(UseSite {
            symbol: symbol.into(),
            is_last_use: true,
        });
        self
    }

    pub fn is_copy(&self) -> bool {
        self.kind == InstKind::Copy
    }

    /// The `(dst, src)` pair of a copy instruction.
    pub fn copy_pair(&self) -> Option<(&Symbol, &Symbol)> {
        if self.kind != InstKind::Copy {
            return None;
        }
        match (self.defs.as_slice(), self.uses.as_slice()) {
            ([def], [use_site]) => Some((&def.symbol, &use_site.symbol)),
            _ => None,
        }
    }

    /// Symbols defined by this instruction.
    pub fn defined(&self) -> impl Iterator<Item = &Symbol> {
        self.defs.iter().map(|d| &d.symbol)
    }

    /// Symbols used by this instruction.
    pub fn used(&self) -> impl Iterator<Item = &Symbol> {
        self.uses.iter().map(|u| &u.symbol)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
