//! Control flow graph over the generated instructions.
//!
//! A block starts at a label or after a jump and ends at a jump. Calls are
//! jumps too: a `jal` block flows into the callee's entry, and each `jr` flows
//! to every return label recorded for its frame, so the graph spans the whole
//! program rather than one function.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::{
    backend::mips32::{Instruction, InstructionKind, InstructionList, Line},
    error::InternalError,
    index::{Index, IndexVec, simple_index},
    middle::{
        frame::{Frame, FrameId},
        ir::{Label, Temp},
    },
};

pub mod liveness;
mod pretty_print;

simple_index! {
    /// Identifies a basic block of a [`FlowGraph`]
    pub struct BlockId;
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub labels: Vec<Label>,
    pub instructions: Vec<Instruction>,
    pub successors: BTreeSet<BlockId>,
    pub predecessors: BTreeSet<BlockId>,
}

impl BasicBlock {
    fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.instructions.is_empty()
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|instruction| instruction.is_jump())
    }

    /// Temps read before any write in this block
    pub fn uses(&self) -> BTreeSet<Temp> {
        let mut uses = BTreeSet::new();
        let mut defs = BTreeSet::new();

        for instruction in &self.instructions {
            uses.extend(instruction.uses().difference(&defs).copied());
            defs.extend(instruction.defs());
        }

        uses
    }

    /// Temps written anywhere in this block
    pub fn defs(&self) -> BTreeSet<Temp> {
        self.instructions
            .iter()
            .flat_map(|instruction| instruction.defs())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    pub blocks: IndexVec<BlockId, BasicBlock>,
}

impl FlowGraph {
    pub fn build(
        instructions: &InstructionList,
        frames: &IndexVec<FrameId, Frame>,
    ) -> Result<Self, InternalError> {
        let mut blocks = IndexVec::new();
        let mut block_of_label = HashMap::new();
        let mut current = BasicBlock::default();

        for line in instructions.lines() {
            match line {
                Line::Label(label) => {
                    if !current.instructions.is_empty() {
                        blocks.push(std::mem::take(&mut current));
                    }

                    current.labels.push(*label);
                    block_of_label.insert(*label, blocks.next_index());
                }
                Line::Instruction(instruction) => {
                    current.instructions.push(instruction.clone());
                    if instruction.is_jump() {
                        blocks.push(std::mem::take(&mut current));
                    }
                }
            }
        }

        if !current.is_empty() {
            blocks.push(current);
        }

        let mut graph = FlowGraph { blocks };
        let lookup = |label: Label| {
            block_of_label
                .get(&label)
                .copied()
                .ok_or(InternalError::UndefinedLabel(label))
        };

        for block in graph.blocks.indices() {
            let next = Some(block.plus(1)).filter(|next| next.index() < graph.blocks.len());

            let successors: Vec<BlockId> = match graph.blocks[block].terminator() {
                None => next.into_iter().collect(),
                Some(Instruction {
                    kind: InstructionKind::JumpRegister { .. },
                    frame,
                    ..
                }) => frames[*frame]
                    .returns
                    .iter()
                    .map(|label| lookup(*label))
                    .collect::<Result<Vec<_>, _>>()?,
                Some(jump) => {
                    let Some(target) = jump.target() else {
                        continue;
                    };
                    let mut successors = vec![lookup(target)?];
                    if jump.is_branch() {
                        successors.extend(next);
                    }
                    successors
                }
            };

            for successor in successors {
                graph.add_edge(block, successor);
            }
        }

        tracing::debug!(blocks = graph.blocks.len(), "built flow graph");
        Ok(graph)
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].successors.insert(to);
        self.blocks[to].predecessors.insert(from);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_of(&self, label: Label) -> Option<BlockId> {
        self.blocks
            .enumerate()
            .find(|(_, block)| block.labels.contains(&label))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::mips32::{BranchCondition, Service},
        frontend::intern::Symbol,
    };

    fn frames() -> IndexVec<FrameId, Frame> {
        IndexVec::from_raw(vec![Frame::new(Symbol::new("main"), None, None)])
    }

    fn instruction(kind: InstructionKind) -> Instruction {
        Instruction::new(FrameId::new(0), kind)
    }

    #[test]
    fn branches_split_blocks_and_fall_through() {
        let [a, b] = [Temp::new(), Temp::new()];
        let [head, end] = [Label::new(), Label::new()];

        let mut list = InstructionList::new();
        list.push_label(head);
        list.push(instruction(InstructionKind::Branch {
            condition: BranchCondition::Bge,
            lhs: a,
            rhs: b,
            target: end,
        }));
        list.push(instruction(InstructionKind::AddImmediate {
            destination: a,
            source: a,
            immediate: crate::backend::mips32::Immediate::Int(1),
        }));
        list.push(instruction(InstructionKind::Jump { target: head }));
        list.push_label(end);

        let graph = FlowGraph::build(&list, &frames()).unwrap();
        let [first, body, exit] = [0, 1, 2].map(BlockId::new);

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.blocks[first].successors, BTreeSet::from([body, exit]));
        assert_eq!(graph.blocks[body].successors, BTreeSet::from([first]));
        assert_eq!(graph.blocks[first].predecessors, BTreeSet::from([body]));
        assert!(graph.blocks[exit].successors.is_empty());
        assert_eq!(graph.block_of(end), Some(exit));
    }

    #[test]
    fn consecutive_labels_share_a_block() {
        let [a, b] = [Label::new(), Label::new()];
        let mut list = InstructionList::new();
        list.push_label(a);
        list.push_label(b);
        list.push(instruction(InstructionKind::Syscall {
            service: Service::PrintInt,
            v0: Temp::new(),
            a0: Temp::new(),
            a1: Temp::new(),
        }));

        let graph = FlowGraph::build(&list, &frames()).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.blocks[BlockId::new(0)].labels, vec![a, b]);
    }

    #[test]
    fn returns_flow_to_every_call_site() {
        let mut frames = frames();
        let entry = Label::new();
        let callee = frames.push(Frame::new(Symbol::new("f"), Some(entry), Some(FrameId::new(0))));
        let returns = [Label::new(), Label::new()];
        frames[callee].returns.extend(returns);

        let ra = Temp::new();
        let mut list = InstructionList::new();
        for return_label in returns {
            list.push(instruction(InstructionKind::JumpAndLink {
                target: entry,
                return_address: ra,
            }));
            list.push_label(return_label);
        }
        list.push(instruction(InstructionKind::Jump { target: returns[0] }));
        list.push_label(entry);
        list.push(Instruction::new(
            callee,
            InstructionKind::JumpRegister { register: ra },
        ));

        let graph = FlowGraph::build(&list, &frames).unwrap();
        let callee_block = graph.block_of(entry).unwrap();
        let after_calls = returns.map(|label| graph.block_of(label).unwrap());

        assert_eq!(
            graph.blocks[callee_block].successors,
            BTreeSet::from(after_calls)
        );
        // A call does not fall through to its return label
        assert_eq!(
            graph.blocks[BlockId::new(0)].successors,
            BTreeSet::from([callee_block])
        );
    }

    #[test]
    fn undefined_labels_are_internal_errors() {
        let missing = Label::new();
        let mut list = InstructionList::new();
        list.push(instruction(InstructionKind::Jump { target: missing }));

        assert_eq!(
            FlowGraph::build(&list, &frames()).unwrap_err(),
            InternalError::UndefinedLabel(missing)
        );
    }
}
