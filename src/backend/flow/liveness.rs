use std::collections::BTreeSet;

use crate::{
    backend::flow::{BlockId, FlowGraph},
    index::IndexVec,
    middle::ir::Temp,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSets {
    pub uses: BTreeSet<Temp>,
    pub defs: BTreeSet<Temp>,
    pub live_in: BTreeSet<Temp>,
    pub live_out: BTreeSet<Temp>,
}

/// Temps live on entry to and exit from every block, solved backwards:
/// `out(b)` is the union of `in(s)` over the successors of `b`, and
/// `in(b) = use(b) ∪ (out(b) − def(b))`.
#[derive(Debug, Clone)]
pub struct Liveness {
    sets: IndexVec<BlockId, LiveSets>,
    sweeps: usize,
}

impl Liveness {
    pub fn analyze(graph: &FlowGraph) -> Self {
        let mut sets: IndexVec<BlockId, LiveSets> = IndexVec::from_raw(
            graph
                .blocks
                .iter()
                .map(|block| LiveSets {
                    uses: block.uses(),
                    defs: block.defs(),
                    ..LiveSets::default()
                })
                .collect(),
        );

        let mut sweeps = 0;
        let mut changed = true;
        while changed {
            changed = false;
            sweeps += 1;

            // Reverse order converges faster for a backward problem
            for block in graph.blocks.indices().collect::<Vec<_>>().into_iter().rev() {
                let live_out = graph.blocks[block]
                    .successors
                    .iter()
                    .flat_map(|successor| sets[*successor].live_in.iter().copied())
                    .collect::<BTreeSet<_>>();

                let entry = &mut sets[block];
                let live_in = entry
                    .uses
                    .iter()
                    .chain(live_out.difference(&entry.defs))
                    .copied()
                    .collect::<BTreeSet<_>>();

                if live_in != entry.live_in || live_out != entry.live_out {
                    entry.live_in = live_in;
                    entry.live_out = live_out;
                    changed = true;
                }
            }
        }

        tracing::debug!(blocks = sets.len(), sweeps, "solved liveness");
        Self { sets, sweeps }
    }

    pub fn sets(&self, block: BlockId) -> &LiveSets {
        &self.sets[block]
    }

    pub fn live_in(&self, block: BlockId) -> &BTreeSet<Temp> {
        &self.sets[block].live_in
    }

    pub fn live_out(&self, block: BlockId) -> &BTreeSet<Temp> {
        &self.sets[block].live_out
    }

    /// Passes over the blocks until nothing changed, the last pass included
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Whether every block satisfies the dataflow equations
    pub fn is_fixed_point(&self, graph: &FlowGraph) -> bool {
        graph.blocks.enumerate().all(|(block, node)| {
            let sets = &self.sets[block];
            let live_out = node
                .successors
                .iter()
                .flat_map(|successor| self.sets[*successor].live_in.iter().copied())
                .collect::<BTreeSet<_>>();
            let live_in = sets
                .uses
                .iter()
                .chain(live_out.difference(&sets.defs))
                .copied()
                .collect::<BTreeSet<_>>();

            live_out == sets.live_out && live_in == sets.live_in
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::mips32::{
            ArithmeticOperator, BranchCondition, Immediate, Instruction, InstructionKind,
            InstructionList,
        },
        frontend::intern::Symbol,
        index::Index,
        middle::{
            frame::{Frame, FrameId},
            ir::Label,
        },
    };

    fn instruction(kind: InstructionKind) -> Instruction {
        Instruction::new(FrameId::new(0), kind)
    }

    /// sum = 0; i = 10; loop: if i <= 0 goto end; sum = sum + i; i = i - 1;
    /// goto loop; end: print sum
    #[test]
    fn loop_variables_stay_live_around_the_back_edge() {
        let [sum, i, zero, a0, v0, a1] = std::array::from_fn(|_| Temp::new());
        let [head, end] = [Label::new(), Label::new()];

        let mut list = InstructionList::new();
        list.push(instruction(InstructionKind::LoadImmediate {
            destination: sum,
            immediate: 0,
        }));
        list.push(instruction(InstructionKind::LoadImmediate {
            destination: i,
            immediate: 10,
        }));
        list.push_label(head);
        list.push(instruction(InstructionKind::Branch {
            condition: BranchCondition::Ble,
            lhs: i,
            rhs: zero,
            target: end,
        }));
        list.push(instruction(InstructionKind::Arithmetic {
            operator: ArithmeticOperator::Add,
            destination: sum,
            lhs: sum,
            rhs: i,
        }));
        list.push(instruction(InstructionKind::AddImmediate {
            destination: i,
            source: i,
            immediate: Immediate::Int(-1),
        }));
        list.push(instruction(InstructionKind::Jump { target: head }));
        list.push_label(end);
        list.push(instruction(InstructionKind::Move {
            destination: a0,
            source: sum,
        }));
        list.push(instruction(InstructionKind::Syscall {
            service: crate::backend::mips32::Service::PrintInt,
            v0,
            a0,
            a1,
        }));

        let frames = IndexVec::from_raw(vec![Frame::new(Symbol::new("main"), None, None)]);
        let graph = FlowGraph::build(&list, &frames).unwrap();
        let liveness = Liveness::analyze(&graph);
        assert!(liveness.is_fixed_point(&graph));

        let [entry, test, body, exit] = [0, 1, 2, 3].map(BlockId::new);
        assert_eq!(graph.len(), 4);

        // The entry block only falls into the loop test
        assert_eq!(liveness.sets(entry).defs, BTreeSet::from([sum, i]));
        assert_eq!(liveness.live_in(entry), &BTreeSet::from([zero, v0]));

        assert_eq!(liveness.live_in(test), &BTreeSet::from([sum, i, zero, v0]));
        assert_eq!(liveness.live_out(body), liveness.live_in(test));
        assert_eq!(liveness.sets(body).uses, BTreeSet::from([sum, i]));

        // a0 is written before the syscall reads it
        assert_eq!(liveness.sets(exit).uses, BTreeSet::from([sum, v0]));
        assert!(liveness.live_out(exit).is_empty());
        assert!(liveness.sweeps() >= 2);
    }

    #[test]
    fn an_empty_graph_is_trivially_solved() {
        let graph = FlowGraph::default();
        let liveness = Liveness::analyze(&graph);

        assert!(liveness.is_fixed_point(&graph));
        assert_eq!(liveness.sweeps(), 1);
    }
}
