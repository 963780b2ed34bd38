//! Local variables of a method body.

use std::fmt;

/// Index into the method's `LocalTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

impl LocalId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Declared type of a local. Matches the dex register categories: the merge
/// comparator only pairs locals of identical type, so this stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalType {
    Int,
    Long,
    Float,
    Double,
    Object,
}

/// A local variable: its type plus where it came from. Synthetic locals are
/// compiler-created temporaries; named locals came from Java source and are
/// visible to the debugger.
#[derive(Debug, Clone)]
pub struct Local {
    pub ty: LocalType,
    pub synthetic: bool,
    pub name: Option<String>,
}

/// Append-only arena of locals. Ids are dense and never invalidated.
#[derive(Debug, Clone, Default)]
pub struct LocalTable {
    locals: Vec<Local>,
}

impl LocalTable {
    pub fn new() -> Self {
        LocalTable::default()
    }

    /// Create a synthetic temporary.
    pub fn fresh(&mut self, ty: LocalType) -> LocalId {
        self.push(Local { ty, synthetic: true, name: None })
    }

    /// Create a named source-level local.
    pub fn declare(&mut self, ty: LocalType, name: &str) -> LocalId {
        self.push(Local { ty, synthetic: false, name: Some(name.to_string()) })
    }

    fn push(&mut self, local: Local) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(local);
        id
    }

    pub fn get(&self, id: LocalId) -> &Local {
        &self.locals[id.index()]
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}
