//! Three-address elements: the statements that populate basic blocks.
//!
//! Elements are deliberately flat. An element writes at most one local and
//! reads through `Operand`s only, which is what lets the block comparator
//! decide structural equality with a simple pairwise walk.

use crate::common::source::SourcePosition;

use super::locals::LocalId;

/// A constant operand. `Double` compares by bit pattern so that two identical
/// NaN constants still count as equal.
#[derive(Debug, Clone)]
pub enum Const {
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Null,
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::Int(a), Const::Int(b)) => a == b,
            (Const::Long(a), Const::Long(b)) => a == b,
            (Const::Double(a), Const::Double(b)) => a.to_bits() == b.to_bits(),
            (Const::Str(a), Const::Str(b)) => a == b,
            (Const::Null, Const::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Const {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Local(LocalId),
    Const(Const),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    IntToLong,
    LongToInt,
    IntToDouble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
}

/// The right-hand side of an assignment or a bare evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rvalue {
    Use(Operand),
    Unary { op: UnaryOp, src: Operand },
    Binary { op: BinOp, lhs: Operand, rhs: Operand },
    /// Call in three-address form. For instance methods the receiver is
    /// `args[0]`; the method string is the full descriptor.
    Invoke { method: String, args: Vec<Operand> },
}

impl Rvalue {
    pub fn for_each_read(&self, f: &mut impl FnMut(LocalId)) {
        match self {
            Rvalue::Use(op) | Rvalue::Unary { src: op, .. } => visit_operand(op, f),
            Rvalue::Binary { lhs, rhs, .. } => {
                visit_operand(lhs, f);
                visit_operand(rhs, f);
            }
            Rvalue::Invoke { args, .. } => {
                for arg in args {
                    visit_operand(arg, f);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// `dest = rvalue`.
    Assign { dest: LocalId, rvalue: Rvalue },
    /// Evaluate for side effects only (a void call).
    Eval(Rvalue),
    /// Two-way branch on a condition. Targets live in the block's ordered
    /// successor list, never in the element.
    Branch(Operand),
    /// Multi-way dispatch on a value; targets are the ordered successors.
    Switch(Operand),
    Return(Option<Operand>),
    Throw(Operand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub pos: SourcePosition,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Element { kind, pos: SourcePosition::UNKNOWN }
    }

    pub fn with_pos(kind: ElementKind, pos: SourcePosition) -> Self {
        Element { kind, pos }
    }

    /// The local this element defines, if any.
    pub fn written_local(&self) -> Option<LocalId> {
        match &self.kind {
            ElementKind::Assign { dest, .. } => Some(*dest),
            _ => None,
        }
    }

    /// Call `f` once per local read (with repetition if read twice).
    pub fn for_each_read(&self, mut f: impl FnMut(LocalId)) {
        match &self.kind {
            ElementKind::Assign { rvalue, .. } | ElementKind::Eval(rvalue) => {
                rvalue.for_each_read(&mut f)
            }
            ElementKind::Branch(op) | ElementKind::Switch(op) | ElementKind::Throw(op) => {
                visit_operand(op, &mut f)
            }
            ElementKind::Return(Some(op)) => visit_operand(op, &mut f),
            ElementKind::Return(None) => {}
        }
    }

    /// True when the element's source position was lost. The absorber
    /// refuses to move such elements under `preserve_source_info`.
    pub fn has_unknown_position(&self) -> bool {
        self.pos.is_unknown()
    }

    /// True for elements that end a block's straight-line flow. A block whose
    /// last element is a terminator is never a fall-through block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Branch(_)
                | ElementKind::Switch(_)
                | ElementKind::Return(_)
                | ElementKind::Throw(_)
        )
    }
}

fn visit_operand(op: &Operand, f: &mut impl FnMut(LocalId)) {
    if let Operand::Local(l) = op {
        f(*l);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(n: u32) -> Operand {
        Operand::Local(LocalId(n))
    }

    #[test]
    fn read_write_visitors() {
        let e = Element::new(ElementKind::Assign {
            dest: LocalId(0),
            rvalue: Rvalue::Binary { op: BinOp::Add, lhs: local(1), rhs: local(2) },
        });
        let mut reads = Vec::new();
        e.for_each_read(|l| reads.push(l));
        assert_eq!(reads, vec![LocalId(1), LocalId(2)]);
        assert_eq!(e.written_local(), Some(LocalId(0)));

        let e = Element::new(ElementKind::Return(None));
        let mut reads = Vec::new();
        e.for_each_read(|l| reads.push(l));
        assert!(reads.is_empty());
        assert_eq!(e.written_local(), None);
        assert!(e.is_terminator());
    }

    #[test]
    fn invoke_reads_all_args() {
        let e = Element::new(ElementKind::Eval(Rvalue::Invoke {
            method: "Ljava/io/PrintStream;.println:(I)V".to_string(),
            args: vec![local(3), local(3)],
        }));
        let mut reads = Vec::new();
        e.for_each_read(|l| reads.push(l));
        assert_eq!(reads, vec![LocalId(3), LocalId(3)]);
        assert!(!e.is_terminator());
    }

    #[test]
    fn nan_constants_compare_equal() {
        assert_eq!(Const::Double(f64::NAN), Const::Double(f64::NAN));
        assert_ne!(Const::Double(0.0), Const::Double(-0.0));
        assert_ne!(Const::Int(0), Const::Null);
    }
}
