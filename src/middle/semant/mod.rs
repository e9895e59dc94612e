//! Semantic analysis and IR generation in a single walk over the AST.
//!
//! Every user error is recorded in [`Diagnostics`] together with a fallback
//! (usually `int`) so the walk can go on and report independent errors in one
//! run. As soon as any error exists no more IR is appended anywhere, so the
//! resulting [`Ir`] is either complete or empty.

use std::collections::BTreeSet;

use crate::{
    diagnostics::Diagnostics,
    frontend::{Span, ast::Expression, intern::Symbol},
    index::IndexVec,
    middle::{
        env::{Env, FuncEntry, FuncId, Param, ValueEntry},
        frame::{CallGraph, Frame, FrameId},
        ir::{Access, CodeList, Ir, Label, StringTable, TacKind, Temp},
        ty::Type,
    },
};

mod decl;
mod expr;
mod lvalue;

/// Name of the runtime allocation intrinsic, never visible to programs
pub const MALLOC: &str = "malloc";
/// Name of the runtime string comparison intrinsic, never visible to programs
pub const STRCMP: &str = "strcmp";

/// The result of translating one expression
#[derive(Debug)]
struct Translation {
    pub codes: CodeList,
    pub ty: Type,
    /// Where the value of the expression can be read, `None` for expressions
    /// without a value and for expressions that failed to translate
    pub place: Option<Access>,
}

impl Translation {
    fn new(codes: CodeList, ty: Type, place: Option<Access>) -> Self {
        Self { codes, ty, place }
    }

    /// An expression without code or value, used as error fallback
    fn empty(ty: Type) -> Self {
        Self::new(CodeList::new(), ty, None)
    }
}

pub struct Semant<'d> {
    diagnostics: &'d mut Diagnostics,
    env: Env,
    functions: IndexVec<FuncId, FuncEntry>,
    /// Functions whose bodies are being checked, innermost last
    invoking_stack: Vec<FuncId>,
    /// Exit label of the innermost loop. Function bodies push `None` so a
    /// `break` can't leave a function.
    break_stack: Vec<Option<Label>>,
    frames: IndexVec<FrameId, Frame>,
    global_frame: FrameId,
    current_frame: FrameId,
    call_graph: CallGraph,
    strings: StringTable,
    externs: BTreeSet<Symbol>,
}

impl<'d> Semant<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        let mut frames = IndexVec::new();
        let global_frame = frames.push(Frame::new(Symbol::new("main"), None, None));

        let mut semant = Self {
            diagnostics,
            env: Env::new(),
            functions: IndexVec::new(),
            invoking_stack: Vec::new(),
            break_stack: Vec::new(),
            frames,
            global_frame,
            current_frame: global_frame,
            call_graph: CallGraph::new(),
            strings: StringTable::default(),
            externs: BTreeSet::new(),
        };

        semant.declare_base_types();
        semant.declare_intrinsics();
        semant
    }

    fn declare_base_types(&mut self) {
        self.env.types.put(Symbol::new("int"), Type::Int);
        self.env.types.put(Symbol::new("string"), Type::String);
    }

    fn declare_intrinsics(&mut self) {
        use Type::{Int, String, Void};

        let intrinsics: [(&str, &[(&str, Type)], Type); 11] = [
            ("print", &[("s", String)], Void),
            ("printi", &[("i", Int)], Void),
            ("flush", &[], Void),
            ("getchar", &[], String),
            ("ord", &[("s", String)], Int),
            ("chr", &[("i", Int)], String),
            ("size", &[("s", String)], Int),
            (
                "substring",
                &[("s", String), ("first", Int), ("n", Int)],
                String,
            ),
            ("concat", &[("s1", String), ("s2", String)], String),
            ("not", &[("i", Int)], Int),
            ("exit", &[("i", Int)], Void),
        ];

        for (name, params, result) in intrinsics {
            let name = Symbol::new(name);
            let params = params
                .iter()
                .map(|(param, ty)| Param {
                    name: Symbol::new(param),
                    ty: ty.clone(),
                })
                .collect();

            let id = self
                .functions
                .push(FuncEntry::new_extern(name, params, result));
            self.env.values.put(name, ValueEntry::Function(id));
        }
    }

    /// Checks `expression` as the whole program and lowers it to IR
    pub fn translate(mut self, expression: &Expression) -> Ir {
        self.break_stack.push(None);
        let translation = self.translate_expression(expression);
        self.break_stack.pop();

        let codes = if self.has_error() {
            CodeList::new()
        } else {
            translation.codes
        };

        tracing::debug!(
            codes = codes.len(),
            frames = self.frames.len(),
            errors = self.diagnostics.errors().len(),
            "semantic analysis finished"
        );

        Ir {
            codes,
            strings: self.strings,
            externs: self.externs,
            frames: self.frames,
            global_frame: self.global_frame,
            functions: self.functions,
            call_graph: self.call_graph,
        }
    }

    /// Whether any error was recorded so far, in which case no IR is emitted
    fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }

    /// A fresh temp living in the frame currently being translated
    fn new_temp(&mut self) -> Temp {
        self.frames[self.current_frame].add_local()
    }

    fn emit(&self, codes: &mut CodeList, kind: TacKind) {
        codes.push(self.current_frame, kind);
    }

    fn use_extern(&mut self, name: &str) -> Symbol {
        let name = Symbol::new(name);
        self.externs.insert(name);
        name
    }

    /// Reports a type mismatch unless a value of type `given` can be stored
    /// in a location of type `needed`
    fn check_type(&mut self, needed: &Type, given: &Type, span: Span) {
        if !given.fits(needed) {
            self.diagnostics.error(
                format!("Type mismatch, {needed} needed, but {given} given"),
                span,
            );
        }
    }

    /// Turns a memory operand into a temp holding its value, so it can be used
    /// as the base of another memory operand
    fn to_simple(&mut self, access: Access, codes: &mut CodeList) -> Access {
        if access.is_simple() {
            return access;
        }

        let temp = self.new_temp();
        self.emit(
            codes,
            TacKind::Move {
                destination: temp.into(),
                source: access,
            },
        );
        temp.into()
    }
}
