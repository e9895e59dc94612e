use hashbrown::HashSet;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    frontend::intern::Symbol,
    index::simple_index,
    middle::ir::{Label, Temp},
};

simple_index! {
    /// Identifies the stack frame of one function (or of the top level program)
    pub struct FrameId;
}

/// Slots every frame reserves for the caller's frame pointer, return address
/// and static link
pub const SAVED_SLOTS: i32 = 3;

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: Symbol,
    /// Entry label of the function, `None` for the top level frame
    pub entry: Option<Label>,
    /// Frame of the lexically enclosing function
    pub parent: Option<FrameId>,
    /// Where the callee expects its arguments, in declaration order
    pub params: Vec<Temp>,
    /// Static link to the enclosing frame
    pub display: Temp,
    pub locals: Vec<Temp>,
    /// One label per call site that targets this frame. A return jumps to any
    /// of them.
    pub returns: Vec<Label>,
    pub return_value: Option<Temp>,
}

impl Frame {
    pub fn new(name: Symbol, entry: Option<Label>, parent: Option<FrameId>) -> Self {
        Self {
            name,
            entry,
            parent,
            params: Vec::new(),
            display: Temp::new(),
            locals: Vec::new(),
            returns: Vec::new(),
            return_value: None,
        }
    }

    /// Creates a fresh temp owned by this frame, growing the frame by a word
    pub fn add_local(&mut self) -> Temp {
        let temp = Temp::new();
        self.locals.push(temp);
        temp
    }

    pub fn add_param(&mut self) -> Temp {
        let temp = self.add_local();
        self.params.push(temp);
        temp
    }

    /// Size of the frame in bytes, which is only final once code generation
    /// stops adding locals
    pub fn frame_size(&self, word_length: i32) -> i32 {
        word_length * (SAVED_SLOTS + self.locals.len() as i32)
    }
}

/// Which frames call which. Built by the semantic analyzer at every call to a
/// user defined function.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    edges: BTreeMap<FrameId, BTreeSet<FrameId>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, caller: FrameId, callee: FrameId) {
        self.edges.entry(caller).or_default().insert(callee);
    }

    pub fn callees(&self, caller: FrameId) -> impl Iterator<Item = FrameId> + '_ {
        self.edges.get(&caller).into_iter().flatten().copied()
    }

    /// A call is a loop edge when it closes a cycle: the callee can reach the
    /// caller again, so state the caller keeps in its temps can be clobbered
    /// by another activation of the caller.
    pub fn is_loop_edge(&self, caller: FrameId, callee: FrameId) -> bool {
        self.reaches(callee, caller)
    }

    fn reaches(&self, from: FrameId, to: FrameId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(frame) = stack.pop() {
            if frame == to {
                return true;
            }

            if !visited.insert(frame) {
                continue;
            }

            stack.extend(self.callees(frame));
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    #[test]
    fn frame_grows_with_locals() {
        let mut frame = Frame::new(Symbol::new("f"), Some(Label::new()), None);
        assert_eq!(frame.frame_size(4), 12);

        let param = frame.add_param();
        frame.add_local();
        assert_eq!(frame.params, vec![param]);
        assert_eq!(frame.frame_size(4), 20);
    }

    #[test]
    fn loop_edges_close_cycles() {
        let main = FrameId::new(0);
        let f = FrameId::new(1);
        let g = FrameId::new(2);
        let h = FrameId::new(3);

        let mut graph = CallGraph::new();
        graph.add_edge(main, f);
        graph.add_edge(f, g);
        graph.add_edge(g, f);
        graph.add_edge(g, h);
        graph.add_edge(h, h);

        assert!(!graph.is_loop_edge(main, f));
        assert!(graph.is_loop_edge(f, g));
        assert!(graph.is_loop_edge(g, f));
        assert!(!graph.is_loop_edge(g, h));
        assert!(graph.is_loop_edge(h, h));
    }
}
