//! IR (three-address code). Control structures are already reduced to labels,
//! branches and gotos, expression trees are flattened into an ordered list of
//! operations with at most two sources and one destination.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicU32, Ordering},
};

use hashbrown::HashMap;

use crate::{
    frontend::intern::Symbol,
    index::IndexVec,
    middle::{
        env::{FuncEntry, FuncId},
        frame::{CallGraph, Frame, FrameId},
    },
};

pub mod pretty_print;

static NEXT_TEMP: AtomicU32 = AtomicU32::new(0);
static NEXT_LABEL: AtomicU32 = AtomicU32::new(0);

/// A storage location with no fixed home yet. The register allocator decides
/// whether it lives in a register or on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temp(u32);

impl Temp {
    pub fn new() -> Self {
        Self(NEXT_TEMP.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u32);

impl Label {
    pub fn new() -> Self {
        Self(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A constant operand. Everything but `Int` is only known once the target has
/// been chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Const {
    Int(i32),
    /// Size of a machine word in bytes
    WordLength,
    /// Address of a string literal in the data section
    String(Label),
}

impl Const {
    /// A data label, which only the assembler can turn into a number
    pub fn is_address(self) -> bool {
        matches!(self, Const::String(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Temp(Temp),
    Const(Const),
    /// The word at `base + offset`
    Memory {
        base: Box<Access>,
        offset: Box<Access>,
    },
}

impl Access {
    pub fn int(value: i32) -> Self {
        Access::Const(Const::Int(value))
    }

    pub fn memory(base: Access, offset: Access) -> Self {
        Access::Memory {
            base: Box::new(base),
            offset: Box::new(offset),
        }
    }

    /// Temps or constants, which need no memory access to read
    pub fn is_simple(&self) -> bool {
        !matches!(self, Access::Memory { .. })
    }
}

impl From<Temp> for Access {
    fn from(temp: Temp) -> Self {
        Access::Temp(temp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOperator {
    Neg,
}

/// The comparison a conditional branch performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

/// A three-address operation along with the frame of the function it belongs
/// to
#[derive(Debug, Clone, PartialEq)]
pub struct Tac {
    pub frame: FrameId,
    pub kind: TacKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TacKind {
    Move {
        destination: Access,
        source: Access,
    },
    BinaryOperation {
        operator: BinaryOperator,
        lhs: Access,
        rhs: Access,
        destination: Access,
    },
    UnaryOperation {
        operator: UnaryOperator,
        operand: Access,
        destination: Access,
    },
    /// Call a function defined in the program
    Call {
        target: Label,
        arguments: Vec<Access>,
        destination: Option<Access>,
    },
    /// Call a runtime intrinsic, expanded inline during code generation. Takes
    /// at most 3 arguments.
    CallExtern {
        name: Symbol,
        arguments: Vec<Access>,
        destination: Option<Access>,
    },
    Return,
    Goto {
        target: Label,
    },
    Branch {
        condition: Condition,
        lhs: Access,
        rhs: Access,
        target: Label,
    },
}

impl TacKind {
    pub fn referenced_label(&self) -> Option<Label> {
        match self {
            TacKind::Call { target, .. }
            | TacKind::Goto { target }
            | TacKind::Branch { target, .. } => Some(*target),
            _ => None,
        }
    }
}

/// One entry of the IR list: a label, an operation, or a labelled operation
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub label: Option<Label>,
    pub tac: Option<Tac>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeList {
    codes: Vec<Code>,
}

impl CodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: FrameId, kind: TacKind) {
        self.codes.push(Code {
            label: None,
            tac: Some(Tac { frame, kind }),
        });
    }

    pub fn push_label(&mut self, label: Label) {
        self.codes.push(Code {
            label: Some(label),
            tac: None,
        });
    }

    pub fn push_labeled(&mut self, label: Label, frame: FrameId, kind: TacKind) {
        self.codes.push(Code {
            label: Some(label),
            tac: Some(Tac { frame, kind }),
        });
    }

    pub fn push_front(&mut self, frame: FrameId, kind: TacKind) {
        self.codes.insert(
            0,
            Code {
                label: None,
                tac: Some(Tac { frame, kind }),
            },
        );
    }

    pub fn append(&mut self, other: CodeList) {
        self.codes.extend(other.codes);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Code> {
        self.codes.iter()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn tacs(&self) -> impl Iterator<Item = &Tac> {
        self.codes.iter().filter_map(|code| code.tac.as_ref())
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.codes.iter().filter_map(|code| code.label)
    }
}

impl<'a> IntoIterator for &'a CodeList {
    type Item = &'a Code;
    type IntoIter = std::slice::Iter<'a, Code>;

    fn into_iter(self) -> Self::IntoIter {
        self.codes.iter()
    }
}

/// String literals of the program, each placed once in the data section
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    entries: Vec<(Label, Symbol)>,
    index: HashMap<Symbol, Label>,
}

impl StringTable {
    pub fn get(&mut self, value: Symbol) -> Const {
        let label = *self.index.entry(value).or_insert_with(|| {
            let label = Label::new();
            self.entries.push((label, value));
            label
        });

        Const::String(label)
    }

    pub fn entries(&self) -> &[(Label, Symbol)] {
        &self.entries
    }
}

/// The complete output of the semantic analyzer
#[derive(Debug)]
pub struct Ir {
    pub codes: CodeList,
    pub strings: StringTable,
    /// Every runtime intrinsic the code calls
    pub externs: BTreeSet<Symbol>,
    pub frames: IndexVec<FrameId, Frame>,
    pub global_frame: FrameId,
    pub functions: IndexVec<FuncId, FuncEntry>,
    pub call_graph: CallGraph,
}
