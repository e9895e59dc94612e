use itertools::{EitherOrBoth, Itertools};

use crate::{
    frontend::{
        Span,
        ast::{
            BinaryOperator, BinaryOperatorClass, BinaryOperatorKind, Expression, ExpressionKind,
            FieldInitializer, Identifier, LValue,
        },
    },
    middle::{
        env::{Invoking, ValueEntry, VarEntry},
        ir::{
            Access, BinaryOperator as Op, CodeList, Condition, Const, Label, TacKind, UnaryOperator,
        },
        semant::{MALLOC, STRCMP, Semant, Translation},
        ty::Type,
    },
};

impl Semant<'_> {
    pub(super) fn translate_expression(&mut self, expression: &Expression) -> Translation {
        match &expression.kind {
            ExpressionKind::Array { ty, size, init } => self.translate_array(ty, size, init),
            ExpressionKind::Assignment { lvalue, value } => {
                self.translate_assignment(expression.span, lvalue, value)
            }
            ExpressionKind::Break => self.translate_break(expression.span),
            ExpressionKind::Call {
                function,
                arguments,
            } => self.translate_call(expression.span, function, arguments),
            ExpressionKind::For {
                variable,
                begin,
                end,
                body,
            } => self.translate_for(variable, begin, end, body),
            ExpressionKind::If {
                condition,
                positive,
                negative: Some(negative),
            } => self.translate_if_else(condition, positive, negative),
            ExpressionKind::If {
                condition,
                positive,
                negative: None,
            } => self.translate_if(condition, positive),
            ExpressionKind::Int(value) => {
                Translation::new(CodeList::new(), Type::Int, Some(Access::int(*value)))
            }
            ExpressionKind::Let { declarations, body } => {
                self.env.begin_scope();
                let declarations = self.translate_declarations(declarations);
                let body = self.translate_sequence(body);
                self.env.end_scope();

                let mut codes = CodeList::new();
                if !self.has_error() {
                    codes.append(declarations);
                    codes.append(body.codes);
                }

                Translation::new(codes, body.ty, body.place)
            }
            ExpressionKind::LValue(lvalue) => self.translate_lvalue(lvalue, false),
            ExpressionKind::Negation(operand) => self.translate_negation(operand),
            ExpressionKind::Nil => {
                Translation::new(CodeList::new(), Type::Nil, Some(Access::int(0)))
            }
            ExpressionKind::Op { operator, lhs, rhs } => {
                self.translate_operation(expression.span, operator, lhs, rhs)
            }
            ExpressionKind::Record { ty, fields } => {
                self.translate_record(expression.span, ty, fields)
            }
            ExpressionKind::Sequence(expressions) => self.translate_sequence(expressions),
            ExpressionKind::String(value) => Translation::new(
                CodeList::new(),
                Type::String,
                Some(Access::Const(self.strings.get(*value))),
            ),
            ExpressionKind::While { condition, body } => self.translate_while(condition, body),
        }
    }

    /// Translates expressions in order. The last one gives the type and value
    /// of the whole sequence, an empty sequence is `void`.
    pub(super) fn translate_sequence(&mut self, expressions: &[Expression]) -> Translation {
        let mut codes = CodeList::new();
        let mut ty = Type::Void;
        let mut place = None;

        for expression in expressions {
            let translation = self.translate_expression(expression);
            ty = translation.ty;
            place = translation.place;

            if !self.has_error() {
                codes.append(translation.codes);
            }
        }

        Translation::new(codes, ty, place)
    }

    fn translate_array(
        &mut self,
        ty: &Identifier,
        size: &Expression,
        init: &Expression,
    ) -> Translation {
        let array_type = match self.env.types.get(ty.symbol).cloned() {
            None => {
                self.diagnostics.error(
                    format!("Undefined type {}; int array assumed", ty.symbol),
                    ty.span,
                );
                None
            }
            Some(found) => match found.actual() {
                Type::Array(array) => Some((found, array.element.clone())),
                _ => {
                    self.diagnostics.error(
                        format!("{found} is not an array type; int array assumed"),
                        ty.span,
                    );
                    None
                }
            },
        };

        let size_translation = self.translate_expression(size);
        self.check_type(&Type::Int, &size_translation.ty, size.span);
        let init_translation = self.translate_expression(init);

        let Some((array_type, element)) = array_type else {
            return Translation::empty(Type::array(Type::Int));
        };

        self.check_type(&element, &init_translation.ty, init.span);

        let mut codes = CodeList::new();
        if self.has_error() {
            return Translation::new(codes, array_type, None);
        }

        let (Some(count), Some(value)) = (size_translation.place, init_translation.place) else {
            return Translation::new(codes, array_type, None);
        };

        codes.append(size_translation.codes);
        codes.append(init_translation.codes);

        let bytes = self.new_temp();
        let array = self.new_temp();
        let index = self.new_temp();
        let malloc = self.use_extern(MALLOC);
        let (head, end) = (Label::new(), Label::new());

        self.emit(
            &mut codes,
            TacKind::BinaryOperation {
                operator: Op::Mul,
                lhs: count,
                rhs: Access::Const(Const::WordLength),
                destination: bytes.into(),
            },
        );
        self.emit(
            &mut codes,
            TacKind::CallExtern {
                name: malloc,
                arguments: vec![bytes.into()],
                destination: Some(array.into()),
            },
        );
        self.emit(
            &mut codes,
            TacKind::Move {
                destination: index.into(),
                source: Access::int(0),
            },
        );
        codes.push_labeled(
            head,
            self.current_frame,
            TacKind::Branch {
                condition: Condition::Geq,
                lhs: index.into(),
                rhs: bytes.into(),
                target: end,
            },
        );
        self.emit(
            &mut codes,
            TacKind::Move {
                destination: Access::memory(array.into(), index.into()),
                source: value,
            },
        );
        self.emit(
            &mut codes,
            TacKind::BinaryOperation {
                operator: Op::Add,
                lhs: index.into(),
                rhs: Access::Const(Const::WordLength),
                destination: index.into(),
            },
        );
        self.emit(&mut codes, TacKind::Goto { target: head });
        codes.push_label(end);

        Translation::new(codes, array_type, Some(array.into()))
    }

    fn translate_assignment(
        &mut self,
        span: Span,
        lvalue: &LValue,
        value: &Expression,
    ) -> Translation {
        let target = self.translate_lvalue(lvalue, true);
        let source = self.translate_expression(value);
        self.check_type(&target.ty, &source.ty, span);

        let mut codes = CodeList::new();
        if !self.has_error() {
            if let (Some(destination), Some(source_place)) = (target.place, source.place) {
                codes.append(target.codes);
                codes.append(source.codes);
                self.emit(
                    &mut codes,
                    TacKind::Move {
                        destination,
                        source: source_place,
                    },
                );
            }
        }

        Translation::empty(Type::Void).with_codes(codes)
    }

    fn translate_break(&mut self, span: Span) -> Translation {
        let mut codes = CodeList::new();

        match self.break_stack.last().copied().flatten() {
            Some(target) => self.emit(&mut codes, TacKind::Goto { target }),
            None => self.diagnostics.error("Invalid break", span),
        }

        Translation::empty(Type::Void).with_codes(codes)
    }

    fn translate_call(
        &mut self,
        span: Span,
        function: &Identifier,
        arguments: &[Expression],
    ) -> Translation {
        let id = match self.env.values.get(function.symbol) {
            None => {
                self.diagnostics.error(
                    format!("Undefined function {}; assumed return void", function.symbol),
                    function.span,
                );
                return Translation::empty(Type::Void);
            }
            Some(ValueEntry::Variable(_)) => {
                self.diagnostics.error(
                    format!("{} is not a function; assumed return void", function.symbol),
                    function.span,
                );
                return Translation::empty(Type::Void);
            }
            Some(ValueEntry::Function(id)) => *id,
        };

        let params = self.functions[id].params.clone();
        let mut codes = CodeList::new();
        let mut actuals = Vec::with_capacity(arguments.len());
        let mut count_mismatch = false;

        for pair in params.iter().zip_longest(arguments) {
            match pair {
                EitherOrBoth::Both(param, argument) => {
                    let translation = self.translate_expression(argument);
                    self.check_type(&param.ty, &translation.ty, argument.span);

                    if !self.has_error() {
                        codes.append(translation.codes);
                    }
                    actuals.extend(translation.place);
                }
                EitherOrBoth::Right(argument) => {
                    // Still checked for errors of its own
                    self.translate_expression(argument);
                    count_mismatch = true;
                }
                EitherOrBoth::Left(_) => count_mismatch = true,
            }
        }

        if count_mismatch {
            self.diagnostics.error(
                format!(
                    "Function {} takes {} arguments but {} were given",
                    function.symbol,
                    params.len(),
                    arguments.len()
                ),
                span,
            );
        }

        if let Some(&caller) = self.invoking_stack.last() {
            let locals = self.env.values.locals();
            self.functions[caller]
                .invokings
                .push(Invoking { callee: id, locals });
        }

        let callee = &self.functions[id];
        let result = callee.result.clone();
        let is_extern = callee.is_extern;
        let label = callee.label;
        let callee_frame = callee.frame;

        if let (false, Some(callee_frame)) = (is_extern, callee_frame) {
            self.call_graph.add_edge(self.current_frame, callee_frame);
        }

        if self.has_error() {
            return Translation::empty(result);
        }

        let destination = (!result.is_void()).then(|| self.new_temp());

        match (is_extern, label) {
            (true, _) => {
                self.externs.insert(function.symbol);
                self.emit(
                    &mut codes,
                    TacKind::CallExtern {
                        name: function.symbol,
                        arguments: actuals,
                        destination: destination.map(Access::from),
                    },
                );
            }
            (false, Some(target)) => self.emit(
                &mut codes,
                TacKind::Call {
                    target,
                    arguments: actuals,
                    destination: destination.map(Access::from),
                },
            ),
            (false, None) => unreachable!("declared functions always have an entry label"),
        }

        Translation::new(codes, result, destination.map(Access::from))
    }

    fn translate_for(
        &mut self,
        variable: &Identifier,
        begin: &Expression,
        end: &Expression,
        body: &Expression,
    ) -> Translation {
        let begin_translation = self.translate_expression(begin);
        let end_translation = self.translate_expression(end);
        self.check_type(&Type::Int, &begin_translation.ty, begin.span);
        self.check_type(&Type::Int, &end_translation.ty, end.span);

        let exit = Label::new();
        let induction = self.new_temp();

        self.env.values.begin_scope();
        self.env.values.put(
            variable.symbol,
            ValueEntry::Variable(VarEntry {
                ty: Type::Int,
                place: induction,
                assignable: false,
            }),
        );
        self.break_stack.push(Some(exit));
        let body_translation = self.translate_expression(body);
        self.break_stack.pop();
        self.check_type(&Type::Void, &body_translation.ty, body.span);
        self.env.values.end_scope();

        let mut codes = CodeList::new();
        if self.has_error() {
            return Translation::empty(Type::Void);
        }

        let (Some(first), Some(last)) = (begin_translation.place, end_translation.place) else {
            return Translation::empty(Type::Void);
        };

        // The bound is evaluated once, before the first iteration
        let bound = self.new_temp();
        let head = Label::new();

        codes.append(begin_translation.codes);
        codes.append(end_translation.codes);
        self.emit(
            &mut codes,
            TacKind::Move {
                destination: induction.into(),
                source: first,
            },
        );
        self.emit(
            &mut codes,
            TacKind::Move {
                destination: bound.into(),
                source: last,
            },
        );
        codes.push_labeled(
            head,
            self.current_frame,
            TacKind::Branch {
                condition: Condition::Gt,
                lhs: induction.into(),
                rhs: bound.into(),
                target: exit,
            },
        );
        codes.append(body_translation.codes);
        self.emit(
            &mut codes,
            TacKind::BinaryOperation {
                operator: Op::Add,
                lhs: induction.into(),
                rhs: Access::int(1),
                destination: induction.into(),
            },
        );
        self.emit(&mut codes, TacKind::Goto { target: head });
        codes.push_label(exit);

        Translation::empty(Type::Void).with_codes(codes)
    }

    fn translate_if_else(
        &mut self,
        condition: &Expression,
        positive: &Expression,
        negative: &Expression,
    ) -> Translation {
        let condition_translation = self.translate_expression(condition);
        self.check_type(&Type::Int, &condition_translation.ty, condition.span);
        let positive_translation = self.translate_expression(positive);
        let negative_translation = self.translate_expression(negative);

        // `if c then nil else r` has the type of `r`
        let ty = if positive_translation.ty.is_nil() {
            self.check_type(
                &negative_translation.ty,
                &positive_translation.ty,
                positive.span,
            );
            negative_translation.ty.clone()
        } else {
            self.check_type(
                &positive_translation.ty,
                &negative_translation.ty,
                negative.span,
            );
            positive_translation.ty.clone()
        };

        let place = (!ty.is_void()).then(|| self.new_temp());
        let mut codes = CodeList::new();
        if self.has_error() {
            return Translation::new(codes, ty, None);
        }

        let Some(test) = condition_translation.place else {
            return Translation::new(codes, ty, None);
        };

        let (otherwise, end) = (Label::new(), Label::new());

        codes.append(condition_translation.codes);
        self.emit(
            &mut codes,
            TacKind::Branch {
                condition: Condition::Eq,
                lhs: test,
                rhs: Access::int(0),
                target: otherwise,
            },
        );

        codes.append(positive_translation.codes);
        if let (Some(place), Some(value)) = (place, positive_translation.place) {
            self.emit(
                &mut codes,
                TacKind::Move {
                    destination: place.into(),
                    source: value,
                },
            );
        }
        self.emit(&mut codes, TacKind::Goto { target: end });

        codes.push_label(otherwise);
        codes.append(negative_translation.codes);
        if let (Some(place), Some(value)) = (place, negative_translation.place) {
            self.emit(
                &mut codes,
                TacKind::Move {
                    destination: place.into(),
                    source: value,
                },
            );
        }
        codes.push_label(end);

        Translation::new(codes, ty, place.map(Access::from))
    }

    fn translate_if(&mut self, condition: &Expression, positive: &Expression) -> Translation {
        let condition_translation = self.translate_expression(condition);
        self.check_type(&Type::Int, &condition_translation.ty, condition.span);
        let positive_translation = self.translate_expression(positive);
        self.check_type(&Type::Void, &positive_translation.ty, positive.span);

        let mut codes = CodeList::new();
        if self.has_error() {
            return Translation::empty(Type::Void);
        }

        let Some(test) = condition_translation.place else {
            return Translation::empty(Type::Void);
        };

        let end = Label::new();
        codes.append(condition_translation.codes);
        self.emit(
            &mut codes,
            TacKind::Branch {
                condition: Condition::Eq,
                lhs: test,
                rhs: Access::int(0),
                target: end,
            },
        );
        codes.append(positive_translation.codes);
        codes.push_label(end);

        Translation::empty(Type::Void).with_codes(codes)
    }

    fn translate_negation(&mut self, operand: &Expression) -> Translation {
        let translation = self.translate_expression(operand);
        self.check_type(&Type::Int, &translation.ty, operand.span);

        let result = self.new_temp();
        let mut codes = CodeList::new();

        match translation.place {
            Some(value) if !self.has_error() => {
                codes.append(translation.codes);
                self.emit(
                    &mut codes,
                    TacKind::UnaryOperation {
                        operator: UnaryOperator::Neg,
                        operand: value,
                        destination: result.into(),
                    },
                );
                Translation::new(codes, Type::Int, Some(result.into()))
            }
            _ => Translation::new(codes, Type::Int, None),
        }
    }

    fn translate_operation(
        &mut self,
        span: Span,
        operator: &BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Translation {
        let left = self.translate_expression(lhs);
        let right = self.translate_expression(rhs);
        let (left_actual, right_actual) = (left.ty.actual(), right.ty.actual());
        let kind = operator.kind;
        let class = kind.class();

        let lowering = if left_actual.is_int() || right_actual.is_int() {
            self.check_type(&Type::Int, &left.ty, lhs.span);
            self.check_type(&Type::Int, &right.ty, rhs.span);
            Lowering::Integer
        } else if left_actual.is_string() || right_actual.is_string() {
            if matches!(
                class,
                BinaryOperatorClass::Equality | BinaryOperatorClass::Comparison
            ) {
                self.check_type(&Type::String, &left.ty, lhs.span);
                self.check_type(&Type::String, &right.ty, rhs.span);
                Lowering::String
            } else {
                self.diagnostics.error(
                    format!("Invalid operation {kind} between strings"),
                    operator.span,
                );
                Lowering::Invalid
            }
        } else if class == BinaryOperatorClass::Equality
            && (left_actual.is_reference() || right_actual.is_reference())
        {
            if !(left.ty.fits(&right.ty) || right.ty.fits(&left.ty)) {
                self.diagnostics.error(
                    format!("Invalid comparison between {} and {}", left.ty, right.ty),
                    span,
                );
            }
            Lowering::Integer
        } else {
            self.diagnostics.error(
                format!("Invalid comparison between {} and {}", left.ty, right.ty),
                span,
            );
            Lowering::Invalid
        };

        let result = self.new_temp();
        let mut codes = CodeList::new();

        if self.has_error() || lowering == Lowering::Invalid {
            return Translation::new(codes, Type::Int, None);
        }

        let (Some(lhs_place), Some(rhs_place)) = (left.place, right.place) else {
            return Translation::new(codes, Type::Int, None);
        };

        match (lowering, kind) {
            (_, BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr) => {
                // Short circuit: the right side only runs when the left side
                // doesn't decide the result
                let is_and = kind == BinaryOperatorKind::LogicalAnd;
                let (decided, end) = (Label::new(), Label::new());
                let (condition, undecided_value, decided_value) = if is_and {
                    (Condition::Eq, 1, 0)
                } else {
                    (Condition::Neq, 0, 1)
                };

                codes.append(left.codes);
                self.emit(
                    &mut codes,
                    TacKind::Branch {
                        condition,
                        lhs: lhs_place,
                        rhs: Access::int(0),
                        target: decided,
                    },
                );
                codes.append(right.codes);
                self.emit(
                    &mut codes,
                    TacKind::Branch {
                        condition,
                        lhs: rhs_place,
                        rhs: Access::int(0),
                        target: decided,
                    },
                );
                self.emit(
                    &mut codes,
                    TacKind::Move {
                        destination: result.into(),
                        source: Access::int(undecided_value),
                    },
                );
                self.emit(&mut codes, TacKind::Goto { target: end });
                codes.push_labeled(
                    decided,
                    self.current_frame,
                    TacKind::Move {
                        destination: result.into(),
                        source: Access::int(decided_value),
                    },
                );
                codes.push_label(end);
            }
            (Lowering::String, _) => {
                let order = self.new_temp();
                let strcmp = self.use_extern(STRCMP);

                codes.append(left.codes);
                codes.append(right.codes);
                self.emit(
                    &mut codes,
                    TacKind::CallExtern {
                        name: strcmp,
                        arguments: vec![lhs_place, rhs_place],
                        destination: Some(order.into()),
                    },
                );
                self.emit(
                    &mut codes,
                    TacKind::BinaryOperation {
                        operator: ir_operator(kind),
                        lhs: order.into(),
                        rhs: Access::int(0),
                        destination: result.into(),
                    },
                );
            }
            _ => {
                codes.append(left.codes);
                codes.append(right.codes);
                self.emit(
                    &mut codes,
                    TacKind::BinaryOperation {
                        operator: ir_operator(kind),
                        lhs: lhs_place,
                        rhs: rhs_place,
                        destination: result.into(),
                    },
                );
            }
        }

        Translation::new(codes, Type::Int, Some(result.into()))
    }

    fn translate_record(
        &mut self,
        span: Span,
        ty: &Identifier,
        fields: &[FieldInitializer],
    ) -> Translation {
        let record_type = match self.env.types.get(ty.symbol).cloned() {
            None => {
                self.diagnostics.error(
                    format!("Undefined type {}; empty record assumed", ty.symbol),
                    ty.span,
                );
                None
            }
            Some(found) => match found.actual() {
                Type::Record(record) => Some((found, record)),
                _ => {
                    self.diagnostics.error(
                        format!("{found} is not a record; empty record assumed"),
                        ty.span,
                    );
                    None
                }
            },
        };

        let Some((record_type, record)) = record_type else {
            for field in fields {
                self.translate_expression(&field.value);
            }
            return Translation::empty(Type::empty_record());
        };

        let result = self.new_temp();
        let mut codes = CodeList::new();

        if !self.has_error() {
            let bytes = self.new_temp();
            let malloc = self.use_extern(MALLOC);

            self.emit(
                &mut codes,
                TacKind::BinaryOperation {
                    operator: Op::Mul,
                    lhs: Access::int(record.fields.len() as i32),
                    rhs: Access::Const(Const::WordLength),
                    destination: bytes.into(),
                },
            );
            self.emit(
                &mut codes,
                TacKind::CallExtern {
                    name: malloc,
                    arguments: vec![bytes.into()],
                    destination: Some(result.into()),
                },
            );
        }

        for (index, (declared, field)) in record.fields.iter().zip(fields).enumerate() {
            let (name, field_type) = declared;

            if *name != field.name.symbol {
                self.diagnostics.error(
                    format!(
                        "Field name mismatch: {name} expected but {} found",
                        field.name.symbol
                    ),
                    field.name.span,
                );
            }

            let translation = self.translate_expression(&field.value);
            self.check_type(field_type, &translation.ty, field.value.span);

            if let (false, Some(value)) = (self.has_error(), translation.place) {
                codes.append(translation.codes);
                self.emit(
                    &mut codes,
                    TacKind::Move {
                        destination: Access::memory(
                            result.into(),
                            Access::int(FIELD_STRIDE * index as i32),
                        ),
                        source: value,
                    },
                );
            }
        }

        if record.fields.len() != fields.len() {
            for field in fields.iter().skip(record.fields.len()) {
                self.translate_expression(&field.value);
            }

            self.diagnostics.error(
                format!(
                    "Field number mismatch: {} expects {} fields but {} were given",
                    record_type,
                    record.fields.len(),
                    fields.len()
                ),
                span,
            );
        }

        if self.has_error() {
            return Translation::new(CodeList::new(), record_type, None);
        }

        Translation::new(codes, record_type, Some(result.into()))
    }

    fn translate_while(&mut self, condition: &Expression, body: &Expression) -> Translation {
        let (head, exit) = (Label::new(), Label::new());

        let condition_translation = self.translate_expression(condition);
        self.break_stack.push(Some(exit));
        let body_translation = self.translate_expression(body);
        self.break_stack.pop();
        self.check_type(&Type::Int, &condition_translation.ty, condition.span);
        self.check_type(&Type::Void, &body_translation.ty, body.span);

        let mut codes = CodeList::new();
        if self.has_error() {
            return Translation::empty(Type::Void);
        }

        let Some(test) = condition_translation.place else {
            return Translation::empty(Type::Void);
        };

        codes.push_label(head);
        codes.append(condition_translation.codes);
        self.emit(
            &mut codes,
            TacKind::Branch {
                condition: Condition::Eq,
                lhs: test,
                rhs: Access::int(0),
                target: exit,
            },
        );
        codes.append(body_translation.codes);
        self.emit(&mut codes, TacKind::Goto { target: head });
        codes.push_label(exit);

        Translation::empty(Type::Void).with_codes(codes)
    }
}

/// Record fields are laid out one word apart
const FIELD_STRIDE: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lowering {
    /// Both operands are words compared or combined directly
    Integer,
    /// Strings are compared through the runtime's `strcmp`
    String,
    Invalid,
}

fn ir_operator(kind: BinaryOperatorKind) -> Op {
    match kind {
        BinaryOperatorKind::Add => Op::Add,
        BinaryOperatorKind::Subtract => Op::Sub,
        BinaryOperatorKind::Multiply => Op::Mul,
        BinaryOperatorKind::Divide => Op::Div,
        BinaryOperatorKind::Equals => Op::Eq,
        BinaryOperatorKind::NotEquals => Op::Neq,
        BinaryOperatorKind::LessThan => Op::Lt,
        BinaryOperatorKind::LessThanOrEqualTo => Op::Leq,
        BinaryOperatorKind::GreaterThan => Op::Gt,
        BinaryOperatorKind::GreaterThanOrEqualTo => Op::Geq,
        BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr => {
            unreachable!("logical operators are lowered to branches")
        }
    }
}

impl Translation {
    fn with_codes(mut self, codes: CodeList) -> Self {
        self.codes = codes;
        self
    }
}
