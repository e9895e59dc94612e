use std::rc::Rc;

use hashbrown::HashSet;

use crate::{
    frontend::ast::{
        Declaration, DeclarationKind, FunctionDeclaration, Identifier, TypeDeclaration,
        TypeExpression, TypeExpressionKind, TypeField, VariableDeclaration,
    },
    middle::{
        closure::solve_foreigns,
        env::{FuncEntry, FuncId, Param, ValueEntry, VarEntry},
        frame::Frame,
        ir::{Access, CodeList, Label, TacKind},
        semant::Semant,
        ty::{NameType, Type},
    },
};

impl Semant<'_> {
    /// Translates the declarations of a `let`. Contiguous runs of type or
    /// function declarations form a group whose members can refer to each
    /// other.
    pub(super) fn translate_declarations(&mut self, declarations: &[Declaration]) -> CodeList {
        let mut codes = CodeList::new();
        let mut rest = declarations;

        while let Some(first) = rest.first() {
            let group_length = rest
                .iter()
                .take_while(|declaration| {
                    std::mem::discriminant(&declaration.kind) == std::mem::discriminant(&first.kind)
                })
                .count();
            let (group, remainder) = rest.split_at(group_length);
            rest = remainder;

            let group_codes = match &first.kind {
                DeclarationKind::Variable(_) => {
                    let mut variable_codes = CodeList::new();
                    for declaration in group {
                        if let DeclarationKind::Variable(variable) = &declaration.kind {
                            variable_codes.append(self.translate_variable(variable));
                        }
                    }
                    variable_codes
                }
                DeclarationKind::Type(_) => {
                    let types = group
                        .iter()
                        .filter_map(|declaration| match &declaration.kind {
                            DeclarationKind::Type(ty) => Some(ty),
                            _ => None,
                        })
                        .collect::<Vec<_>>();
                    self.translate_type_group(&types);
                    CodeList::new()
                }
                DeclarationKind::Function(_) => {
                    let functions = group
                        .iter()
                        .filter_map(|declaration| match &declaration.kind {
                            DeclarationKind::Function(function) => Some(function),
                            _ => None,
                        })
                        .collect::<Vec<_>>();
                    self.translate_function_group(&functions)
                }
            };

            if !self.has_error() {
                codes.append(group_codes);
            }
        }

        codes
    }

    fn translate_variable(&mut self, variable: &VariableDeclaration) -> CodeList {
        // The initializer can't see the variable it initializes
        let initializer = self.translate_expression(&variable.value);

        let ty = match &variable.ty {
            Some(annotation) => match self.env.types.get(annotation.symbol).cloned() {
                Some(declared) => {
                    self.check_type(&declared, &initializer.ty, variable.value.span);
                    declared
                }
                None => {
                    self.diagnostics.error(
                        format!("Undefined type {}; int assumed", annotation.symbol),
                        annotation.span,
                    );
                    Type::Int
                }
            },
            None if initializer.ty.is_nil() || initializer.ty.is_void() => {
                self.diagnostics.error(
                    format!(
                        "Invalid initializer type {} for {}; int assumed",
                        initializer.ty, variable.name.symbol
                    ),
                    variable.value.span,
                );
                Type::Int
            }
            None => initializer.ty.clone(),
        };

        let place = self.new_temp();
        self.env.values.put(
            variable.name.symbol,
            ValueEntry::Variable(VarEntry {
                ty,
                place,
                assignable: true,
            }),
        );

        let mut codes = CodeList::new();
        if let (false, Some(value)) = (self.has_error(), initializer.place) {
            codes.append(initializer.codes);
            self.emit(
                &mut codes,
                TacKind::Move {
                    destination: place.into(),
                    source: value,
                },
            );
        }

        codes
    }

    /// Type declarations are bound in three steps: every name is entered as an
    /// unbound placeholder, then each right hand side is translated and bound,
    /// and finally names that only lead back to themselves are reported.
    fn translate_type_group(&mut self, declarations: &[&TypeDeclaration]) {
        let mut seen = HashSet::new();
        let placeholders: Vec<Option<Rc<NameType>>> = declarations
            .iter()
            .map(|declaration| {
                let name = declaration.name.symbol;

                if !seen.insert(name) {
                    self.diagnostics.error(
                        format!("{name} already defined in the same block"),
                        declaration.name.span,
                    );
                    return None;
                }

                let placeholder = Type::name(name);
                self.env.types.put(name, placeholder.clone());
                match placeholder {
                    Type::Name(name) => Some(name),
                    _ => None,
                }
            })
            .collect();

        for (declaration, placeholder) in declarations.iter().zip(&placeholders) {
            let ty = self.translate_type(&declaration.ty);
            if let Some(placeholder) = placeholder {
                placeholder.bind(ty);
            }
        }

        for (declaration, placeholder) in declarations.iter().zip(&placeholders) {
            let Some(placeholder) = placeholder else {
                continue;
            };

            if placeholder.is_cycle() {
                self.diagnostics.error(
                    format!(
                        "Type declaration loop found on {}; int assumed",
                        declaration.name.symbol
                    ),
                    declaration.name.span,
                );
                placeholder.bind(Type::Int);
            }
        }
    }

    fn translate_type(&mut self, ty: &TypeExpression) -> Type {
        match &ty.kind {
            TypeExpressionKind::Name(name) => self.lookup_type(name),
            TypeExpressionKind::Array(element) => Type::array(self.lookup_type(element)),
            TypeExpressionKind::Record(fields) => {
                let fields = self
                    .translate_fields(fields)
                    .into_iter()
                    .map(|param| (param.name, param.ty))
                    .collect();
                Type::record(fields)
            }
        }
    }

    fn lookup_type(&mut self, name: &Identifier) -> Type {
        match self.env.types.get(name.symbol) {
            Some(ty) => ty.clone(),
            None => {
                self.diagnostics.error(
                    format!("Undefined type {}; int assumed", name.symbol),
                    name.span,
                );
                Type::Int
            }
        }
    }

    fn translate_fields(&mut self, fields: &[TypeField]) -> Vec<Param> {
        fields
            .iter()
            .map(|field| Param {
                name: field.name.symbol,
                ty: self.lookup_type(&field.ty),
            })
            .collect()
    }

    /// Functions of a group are entered first so their bodies can call each
    /// other. The whole group is jumped over by the code around it.
    fn translate_function_group(&mut self, declarations: &[&FunctionDeclaration]) -> CodeList {
        let mut seen = HashSet::new();
        let group: Vec<FuncId> = declarations
            .iter()
            .map(|declaration| {
                let id = self.declare_function(declaration);

                if seen.insert(declaration.name.symbol) {
                    self.env
                        .values
                        .put(declaration.name.symbol, ValueEntry::Function(id));
                } else {
                    self.diagnostics.error(
                        format!(
                            "{} already defined in the same block",
                            declaration.name.symbol
                        ),
                        declaration.name.span,
                    );
                }

                id
            })
            .collect();

        let mut codes = CodeList::new();
        for (declaration, &id) in declarations.iter().zip(&group) {
            let body = self.translate_function_body(declaration, id);
            if !self.has_error() {
                codes.append(body);
            }
        }

        let sweeps = solve_foreigns(&mut self.functions, &group);
        tracing::trace!(
            functions = ?group
                .iter()
                .map(|&id| self.functions[id].name)
                .collect::<Vec<_>>(),
            sweeps,
            "function group closed"
        );

        if self.has_error() {
            return CodeList::new();
        }

        let skip = Label::new();
        codes.push_front(self.current_frame, TacKind::Goto { target: skip });
        codes.push_label(skip);
        codes
    }

    /// Registers a function with a frame nested in the current one
    fn declare_function(&mut self, declaration: &FunctionDeclaration) -> FuncId {
        let result = match &declaration.result {
            Some(result) => match self.env.types.get(result.symbol) {
                Some(ty) => ty.clone(),
                None => {
                    self.diagnostics.error(
                        format!("Undefined type {}; int assumed", result.symbol),
                        result.span,
                    );
                    Type::Int
                }
            },
            None => Type::Void,
        };
        let params = self.translate_fields(&declaration.parameters);

        let label = Label::new();
        let mut frame = Frame::new(declaration.name.symbol, Some(label), Some(self.current_frame));
        let formals = params.iter().map(|_| frame.add_param()).collect();
        let result_place = (!result.is_void()).then(|| frame.add_local());
        frame.return_value = result_place;
        let frame = self.frames.push(frame);

        self.functions.push(FuncEntry {
            name: declaration.name.symbol,
            params,
            formals,
            result,
            result_place,
            label: Some(label),
            frame: Some(frame),
            is_extern: false,
            invokings: Vec::new(),
            foreigns: Default::default(),
        })
    }

    /// Checks the body of a declared function and produces its code: entry
    /// label, body, result move and return
    fn translate_function_body(
        &mut self,
        declaration: &FunctionDeclaration,
        id: FuncId,
    ) -> CodeList {
        let entry = self.functions[id].clone();
        let enclosing_frame = self.current_frame;

        self.env.values.begin_function_scope();
        for (param, formal) in entry.params.iter().zip(&entry.formals) {
            self.env.values.put(
                param.name,
                ValueEntry::Variable(VarEntry {
                    ty: param.ty.clone(),
                    place: *formal,
                    assignable: true,
                }),
            );
        }

        if let Some(frame) = entry.frame {
            self.current_frame = frame;
        }
        self.invoking_stack.push(id);
        self.break_stack.push(None);
        let body = self.translate_expression(&declaration.body);
        self.break_stack.pop();
        self.invoking_stack.pop();

        self.check_type(&entry.result, &body.ty, declaration.body.span);
        self.env.values.end_scope();

        let mut codes = CodeList::new();
        if let (false, Some(label)) = (self.has_error(), entry.label) {
            codes.push_label(label);
            codes.append(body.codes);

            if let (Some(result), Some(value)) = (entry.result_place, body.place) {
                self.emit(
                    &mut codes,
                    TacKind::Move {
                        destination: Access::from(result),
                        source: value,
                    },
                );
            }

            self.emit(&mut codes, TacKind::Return);
        }

        self.current_frame = enclosing_frame;
        codes
    }
}
