//! MIPS32 instructions over temps.
//!
//! Registers are not allocated yet: every operand is a [`Temp`], and the few
//! machine registers the calling convention needs (`$zero`, `$fp`, `$sp`,
//! `$ra`, `$v0`, `$a0`, `$a1`) are temps reserved in the global frame and
//! listed in [`Registers`] so an allocator can precolor them.

use std::collections::BTreeSet;

use crate::{
    frontend::intern::Symbol,
    index::IndexVec,
    middle::{
        frame::{Frame, FrameId},
        ir::{Label, Temp},
    },
};

pub mod codegen;
pub mod pretty_print;

/// Register to register operations, one instruction each
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArithmeticOperator {
    Add,
    Sub,
    Mul,
    Div,
    Seq,
    Sne,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Ble,
    Bgt,
    Bge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Word,
    Byte,
}

/// Services of the `syscall` instruction, selected through `$v0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Service {
    PrintInt,
    PrintString,
    ReadString,
    Sbrk,
    ExitWithCode,
}

impl Service {
    pub fn code(self) -> i32 {
        match self {
            Service::PrintInt => 1,
            Service::PrintString => 4,
            Service::ReadString => 8,
            Service::Sbrk => 9,
            Service::ExitWithCode => 17,
        }
    }
}

/// An immediate operand. Frame sizes stay symbolic until code generation is
/// over, since every temp added to a frame grows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    Int(i32),
    FrameSize(FrameId),
    NegatedFrameSize(FrameId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Frame of the function this instruction belongs to. For `jr` this
    /// decides which return labels it can reach.
    pub frame: FrameId,
    pub kind: InstructionKind,
    /// Moves of arguments into a callee's parameters and of its result back
    /// out, which an allocator may want to coalesce
    pub call_transfer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Arithmetic {
        operator: ArithmeticOperator,
        destination: Temp,
        lhs: Temp,
        rhs: Temp,
    },
    /// addi
    AddImmediate {
        destination: Temp,
        source: Temp,
        immediate: Immediate,
    },
    /// slti
    SetLessThanImmediate {
        destination: Temp,
        source: Temp,
        immediate: i32,
    },
    Negate {
        destination: Temp,
        source: Temp,
    },
    Move {
        destination: Temp,
        source: Temp,
    },
    /// li
    LoadImmediate {
        destination: Temp,
        immediate: i32,
    },
    /// la, used for string literals in the data section
    LoadAddress {
        destination: Temp,
        label: Label,
    },
    /// lw / lb
    Load {
        width: Width,
        destination: Temp,
        base: Temp,
        offset: i32,
    },
    /// sw / sb
    Store {
        width: Width,
        source: Temp,
        base: Temp,
        offset: i32,
    },
    /// j
    Jump {
        target: Label,
    },
    /// jal
    JumpAndLink {
        target: Label,
        return_address: Temp,
    },
    /// jr
    JumpRegister {
        register: Temp,
    },
    Branch {
        condition: BranchCondition,
        lhs: Temp,
        rhs: Temp,
        target: Label,
    },
    Syscall {
        service: Service,
        v0: Temp,
        a0: Temp,
        a1: Temp,
    },
    /// Where an allocator saves the temps live across a recursive call
    SavePlaceholder,
    /// Where an allocator restores them after the call
    RestorePlaceholder,
}

impl Instruction {
    pub fn new(frame: FrameId, kind: InstructionKind) -> Self {
        Self {
            frame,
            kind,
            call_transfer: false,
        }
    }

    /// Temps read by this instruction
    pub fn uses(&self) -> BTreeSet<Temp> {
        use InstructionKind::*;

        match &self.kind {
            Arithmetic { lhs, rhs, .. } | Branch { lhs, rhs, .. } => BTreeSet::from([*lhs, *rhs]),
            AddImmediate { source, .. }
            | SetLessThanImmediate { source, .. }
            | Negate { source, .. }
            | Move { source, .. } => BTreeSet::from([*source]),
            Load { base, .. } => BTreeSet::from([*base]),
            Store { source, base, .. } => BTreeSet::from([*source, *base]),
            JumpRegister { register } => BTreeSet::from([*register]),
            Syscall {
                service, v0, a0, a1, ..
            } => match service {
                Service::ReadString => BTreeSet::from([*v0, *a0, *a1]),
                _ => BTreeSet::from([*v0, *a0]),
            },
            LoadImmediate { .. }
            | LoadAddress { .. }
            | Jump { .. }
            | JumpAndLink { .. }
            | SavePlaceholder
            | RestorePlaceholder => BTreeSet::new(),
        }
    }

    /// Temps written by this instruction
    pub fn defs(&self) -> BTreeSet<Temp> {
        use InstructionKind::*;

        match &self.kind {
            Arithmetic { destination, .. }
            | AddImmediate { destination, .. }
            | SetLessThanImmediate { destination, .. }
            | Negate { destination, .. }
            | Move { destination, .. }
            | LoadImmediate { destination, .. }
            | LoadAddress { destination, .. }
            | Load { destination, .. } => BTreeSet::from([*destination]),
            JumpAndLink { return_address, .. } => BTreeSet::from([*return_address]),
            Syscall {
                service: Service::Sbrk,
                v0,
                ..
            } => BTreeSet::from([*v0]),
            Store { .. }
            | Jump { .. }
            | JumpRegister { .. }
            | Branch { .. }
            | Syscall { .. }
            | SavePlaceholder
            | RestorePlaceholder => BTreeSet::new(),
        }
    }

    /// Whether this instruction transfers control, and so ends a basic block
    pub fn is_jump(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Jump { .. }
                | InstructionKind::JumpAndLink { .. }
                | InstructionKind::JumpRegister { .. }
                | InstructionKind::Branch { .. }
        )
    }

    /// Conditional jumps, which can also fall through
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, InstructionKind::Branch { .. })
    }

    pub fn target(&self) -> Option<Label> {
        match self.kind {
            InstructionKind::Jump { target }
            | InstructionKind::JumpAndLink { target, .. }
            | InstructionKind::Branch { target, .. } => Some(target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Label(Label),
    Instruction(Instruction),
}

/// The generated program as an ordered list of labels and instructions
#[derive(Debug, Clone, Default)]
pub struct InstructionList {
    lines: Vec<Line>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.lines.push(Line::Instruction(instruction));
    }

    pub fn push_label(&mut self, label: Label) {
        self.lines.push(Line::Label(label));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn last_instruction_mut(&mut self) -> Option<&mut Instruction> {
        match self.lines.last_mut() {
            Some(Line::Instruction(instruction)) => Some(instruction),
            _ => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().filter_map(|line| match line {
            Line::Instruction(instruction) => Some(instruction),
            Line::Label(_) => None,
        })
    }
}

/// Temps standing for the machine registers used by the calling convention
/// and the intrinsics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub zero: Temp,
    pub fp: Temp,
    pub sp: Temp,
    pub ra: Temp,
    pub v0: Temp,
    pub a0: Temp,
    pub a1: Temp,
}

impl Registers {
    /// Reserves the registers as locals of the global frame
    pub fn reserve(global: &mut Frame) -> Self {
        Self {
            zero: global.add_local(),
            fp: global.add_local(),
            sp: global.add_local(),
            ra: global.add_local(),
            v0: global.add_local(),
            a0: global.add_local(),
            a1: global.add_local(),
        }
    }

    pub fn name(&self, temp: Temp) -> Option<&'static str> {
        [
            (self.zero, "$zero"),
            (self.fp, "$fp"),
            (self.sp, "$sp"),
            (self.ra, "$ra"),
            (self.v0, "$v0"),
            (self.a0, "$a0"),
            (self.a1, "$a1"),
        ]
        .into_iter()
        .find_map(|(register, name)| (register == temp).then_some(name))
    }
}

/// The placeholders reserved around one recursive call. `save` and `restore`
/// index into [`Program::instructions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSave {
    pub frame: FrameId,
    pub save: usize,
    pub restore: usize,
}

/// Everything the code generator produces, ready for register allocation
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: InstructionList,
    /// Frames with every temp the generator added
    pub frames: IndexVec<FrameId, Frame>,
    pub registers: Registers,
    pub call_saves: Vec<CallSave>,
    pub strings: Vec<(Label, Symbol)>,
    pub word_length: i32,
}

impl Program {
    pub fn resolve_immediate(&self, immediate: Immediate) -> i32 {
        match immediate {
            Immediate::Int(value) => value,
            Immediate::FrameSize(frame) => self.frames[frame].frame_size(self.word_length),
            Immediate::NegatedFrameSize(frame) => -self.frames[frame].frame_size(self.word_length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    fn temps<const N: usize>() -> [Temp; N] {
        std::array::from_fn(|_| Temp::new())
    }

    #[test]
    fn uses_and_defs() {
        let frame = FrameId::new(0);
        let [a, b, c] = temps();

        let add = Instruction::new(
            frame,
            InstructionKind::Arithmetic {
                operator: ArithmeticOperator::Add,
                destination: c,
                lhs: a,
                rhs: b,
            },
        );
        assert_eq!(add.uses(), BTreeSet::from([a, b]));
        assert_eq!(add.defs(), BTreeSet::from([c]));
        assert!(!add.is_jump());

        let store = Instruction::new(
            frame,
            InstructionKind::Store {
                width: Width::Word,
                source: a,
                base: b,
                offset: 4,
            },
        );
        assert_eq!(store.uses(), BTreeSet::from([a, b]));
        assert!(store.defs().is_empty());
    }

    #[test]
    fn syscall_registers_depend_on_the_service() {
        let frame = FrameId::new(0);
        let [v0, a0, a1] = temps();

        let sbrk = Instruction::new(
            frame,
            InstructionKind::Syscall {
                service: Service::Sbrk,
                v0,
                a0,
                a1,
            },
        );
        assert_eq!(sbrk.uses(), BTreeSet::from([v0, a0]));
        assert_eq!(sbrk.defs(), BTreeSet::from([v0]));

        let read = Instruction::new(
            frame,
            InstructionKind::Syscall {
                service: Service::ReadString,
                v0,
                a0,
                a1,
            },
        );
        assert_eq!(read.uses(), BTreeSet::from([v0, a0, a1]));
        assert!(read.defs().is_empty());
        assert_eq!(Service::ExitWithCode.code(), 17);
    }

    #[test]
    fn jumps_and_targets() {
        let frame = FrameId::new(0);
        let [a, b] = temps();
        let label = Label::new();

        let branch = Instruction::new(
            frame,
            InstructionKind::Branch {
                condition: BranchCondition::Blt,
                lhs: a,
                rhs: b,
                target: label,
            },
        );
        assert!(branch.is_jump());
        assert!(branch.is_branch());
        assert_eq!(branch.target(), Some(label));

        let ret = Instruction::new(frame, InstructionKind::JumpRegister { register: a });
        assert!(ret.is_jump());
        assert!(!ret.is_branch());
        assert_eq!(ret.target(), None);
    }
}
