use crate::{
    frontend::ast::{LValue, LValueKind},
    middle::{
        env::ValueEntry,
        ir::{Access, BinaryOperator, CodeList, Const, TacKind},
        semant::{Semant, Translation},
        ty::Type,
    },
};

impl Semant<'_> {
    /// Translates a storage location. With `assignment` set the location is
    /// about to be written, which `for` induction variables forbid.
    pub(super) fn translate_lvalue(&mut self, lvalue: &LValue, assignment: bool) -> Translation {
        match &lvalue.kind {
            LValueKind::Variable(name) => {
                let variable = match self.env.values.get(name.symbol) {
                    None => {
                        self.diagnostics.error(
                            format!("Undefined variable {}; type int assumed", name.symbol),
                            name.span,
                        );
                        return Translation::empty(Type::Int);
                    }
                    Some(ValueEntry::Function(_)) => {
                        self.diagnostics.error(
                            format!(
                                "{} is a function, not a variable; type int assumed",
                                name.symbol
                            ),
                            name.span,
                        );
                        return Translation::empty(Type::Int);
                    }
                    Some(ValueEntry::Variable(variable)) => variable.clone(),
                };

                if assignment && !variable.assignable {
                    self.diagnostics
                        .error(format!("{} cannot be assigned here", name.symbol), name.span);
                }

                if self.env.values.is_foreign(name.symbol) {
                    if let Some(&function) = self.invoking_stack.last() {
                        self.functions[function].foreigns.insert(name.symbol);
                    }
                }

                Translation::new(
                    CodeList::new(),
                    variable.ty,
                    Some(variable.place.into()),
                )
            }
            LValueKind::Field { base, field } => {
                let record = self.translate_lvalue(base, assignment);

                let Type::Record(record_type) = record.ty.actual() else {
                    self.diagnostics.error(
                        format!("{} is not a record; type int assumed", record.ty),
                        field.span,
                    );
                    return Translation::empty(Type::Int);
                };

                let (Some(index), Some(field_type)) = (
                    record_type.field_index(field.symbol),
                    record_type.find_field(field.symbol).cloned(),
                ) else {
                    self.diagnostics.error(
                        format!(
                            "{} has no field {}; type int assumed",
                            record.ty, field.symbol
                        ),
                        field.span,
                    );
                    return Translation::empty(Type::Int);
                };

                let mut codes = CodeList::new();
                let (false, Some(base_place)) = (self.has_error(), record.place) else {
                    return Translation::new(codes, field_type, None);
                };

                codes.append(record.codes);
                let offset = self.new_temp();
                self.emit(
                    &mut codes,
                    TacKind::BinaryOperation {
                        operator: BinaryOperator::Mul,
                        lhs: Access::int(index as i32),
                        rhs: Access::Const(Const::WordLength),
                        destination: offset.into(),
                    },
                );
                let base_place = self.to_simple(base_place, &mut codes);

                Translation::new(
                    codes,
                    field_type,
                    Some(Access::memory(base_place, offset.into())),
                )
            }
            LValueKind::Subscript { base, index } => {
                let array = self.translate_lvalue(base, assignment);

                let element_type = match array.ty.actual() {
                    Type::Array(array_type) => array_type.element.clone(),
                    _ => {
                        self.diagnostics.error(
                            format!("{} is not an array; type int assumed", array.ty),
                            lvalue.span,
                        );
                        Type::Int
                    }
                };

                let subscript = self.translate_expression(index);
                self.check_type(&Type::Int, &subscript.ty, index.span);

                let mut codes = CodeList::new();
                let (false, Some(base_place), Some(index_place)) =
                    (self.has_error(), array.place, subscript.place)
                else {
                    return Translation::new(codes, element_type, None);
                };

                codes.append(array.codes);
                codes.append(subscript.codes);
                let base_place = self.to_simple(base_place, &mut codes);
                let offset = self.new_temp();
                self.emit(
                    &mut codes,
                    TacKind::BinaryOperation {
                        operator: BinaryOperator::Mul,
                        lhs: index_place,
                        rhs: Access::Const(Const::WordLength),
                        destination: offset.into(),
                    },
                );

                Translation::new(
                    codes,
                    element_type,
                    Some(Access::memory(base_place, offset.into())),
                )
            }
        }
    }
}
