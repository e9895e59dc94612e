use std::collections::BTreeSet;

use colored::Colorize;
use itertools::Itertools;

use crate::{
    backend::flow::{BlockId, FlowGraph, liveness::Liveness},
    index::Index,
    middle::ir::Temp,
};

impl core::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("B{}", self.index()).bright_red())
    }
}

fn temps(set: &BTreeSet<Temp>) -> String {
    set.iter().join(" ")
}

impl FlowGraph {
    /// Every block with its edges and instructions, and its live sets when
    /// `liveness` is given
    pub fn describe(&self, liveness: Option<&Liveness>) -> String {
        let mut output = String::new();

        for (id, block) in self.blocks.enumerate() {
            output += &format!("{} {id}\n", "block".white());
            output += &format!(
                "  {} {}\n",
                "successors:".white(),
                block.successors.iter().join(", ")
            );
            output += &format!(
                "  {} {}\n",
                "predecessors:".white(),
                block.predecessors.iter().join(", ")
            );

            for label in &block.labels {
                output += &format!("  {}:\n", label.to_string().blue());
            }
            for instruction in &block.instructions {
                output += &format!("      {instruction}\n");
            }

            if let Some(liveness) = liveness {
                let sets = liveness.sets(id);
                for (name, set) in [
                    ("use:", &sets.uses),
                    ("def:", &sets.defs),
                    ("in:", &sets.live_in),
                    ("out:", &sets.live_out),
                ] {
                    output += &format!("  {} {}\n", name.white(), temps(set));
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::mips32::{Instruction, InstructionKind, InstructionList},
        frontend::intern::Symbol,
        index::IndexVec,
        middle::{
            frame::{Frame, FrameId},
            ir::Label,
        },
    };

    #[test]
    fn description_lists_edges_and_live_sets() {
        let [a, b] = [Temp::new(), Temp::new()];
        let label = Label::new();

        let mut list = InstructionList::new();
        list.push(Instruction::new(
            FrameId::new(0),
            InstructionKind::Move {
                destination: a,
                source: b,
            },
        ));
        list.push(Instruction::new(
            FrameId::new(0),
            InstructionKind::Jump { target: label },
        ));
        list.push_label(label);

        let frames = IndexVec::from_raw(vec![Frame::new(Symbol::new("main"), None, None)]);
        let graph = FlowGraph::build(&list, &frames).unwrap();
        let liveness = Liveness::analyze(&graph);
        let description = strip_ansi_escapes::strip_str(graph.describe(Some(&liveness)));

        assert!(description.contains("block B0\n  successors: B1\n  predecessors: \n"));
        assert!(description.contains(&format!("  in: t{}\n", b.as_u32())));
        let label = strip_ansi_escapes::strip_str(label.to_string());
        assert!(description.contains(&format!("  {label}:\n")));
        assert!(
            !strip_ansi_escapes::strip_str(graph.describe(None)).contains("use:")
        );
    }
}
