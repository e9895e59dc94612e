//! Constructors for building syntax trees without a parser. Every node starts
//! with an empty span; use the `at` methods to place a node in the source.

use super::*;

impl Expression {
    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.span = Span::new(start, end);
        self
    }
}

impl LValue {
    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.span = Span::new(start, end);
        self
    }
}

impl Declaration {
    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.span = Span::new(start, end);
        self
    }
}

impl Identifier {
    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.span = Span::new(start, end);
        self
    }
}

fn expression(kind: ExpressionKind) -> Expression {
    Expression {
        span: Span::default(),
        kind,
    }
}

pub fn ident(name: &str) -> Identifier {
    Identifier {
        span: Span::default(),
        symbol: Symbol::new(name),
    }
}

pub fn int(value: i32) -> Expression {
    expression(ExpressionKind::Int(value))
}

pub fn string(value: &str) -> Expression {
    expression(ExpressionKind::String(Symbol::new(value)))
}

pub fn nil() -> Expression {
    expression(ExpressionKind::Nil)
}

pub fn break_() -> Expression {
    expression(ExpressionKind::Break)
}

pub fn var(name: &str) -> LValue {
    LValue {
        span: Span::default(),
        kind: LValueKind::Variable(ident(name)),
    }
}

pub fn field(base: LValue, name: &str) -> LValue {
    LValue {
        span: base.span,
        kind: LValueKind::Field {
            base: Box::new(base),
            field: ident(name),
        },
    }
}

pub fn subscript(base: LValue, index: Expression) -> LValue {
    LValue {
        span: base.span,
        kind: LValueKind::Subscript {
            base: Box::new(base),
            index: Box::new(index),
        },
    }
}

pub fn lvalue(lvalue: LValue) -> Expression {
    let span = lvalue.span;
    Expression {
        span,
        kind: ExpressionKind::LValue(Box::new(lvalue)),
    }
}

/// Shorthand for reading a plain variable
pub fn read(name: &str) -> Expression {
    lvalue(var(name))
}

pub fn assign(lvalue: LValue, value: Expression) -> Expression {
    expression(ExpressionKind::Assignment {
        lvalue: Box::new(lvalue),
        value: Box::new(value),
    })
}

pub fn op(operator: BinaryOperatorKind, lhs: Expression, rhs: Expression) -> Expression {
    expression(ExpressionKind::Op {
        operator: BinaryOperator {
            span: Span::default(),
            kind: operator,
        },
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn neg(operand: Expression) -> Expression {
    expression(ExpressionKind::Negation(Box::new(operand)))
}

pub fn call(function: &str, arguments: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Call {
        function: ident(function),
        arguments,
    })
}

pub fn seq(expressions: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Sequence(expressions))
}

pub fn if_then(condition: Expression, positive: Expression) -> Expression {
    expression(ExpressionKind::If {
        condition: Box::new(condition),
        positive: Box::new(positive),
        negative: None,
    })
}

pub fn if_else(condition: Expression, positive: Expression, negative: Expression) -> Expression {
    expression(ExpressionKind::If {
        condition: Box::new(condition),
        positive: Box::new(positive),
        negative: Some(Box::new(negative)),
    })
}

pub fn while_(condition: Expression, body: Expression) -> Expression {
    expression(ExpressionKind::While {
        condition: Box::new(condition),
        body: Box::new(body),
    })
}

pub fn for_(variable: &str, begin: Expression, end: Expression, body: Expression) -> Expression {
    expression(ExpressionKind::For {
        variable: ident(variable),
        begin: Box::new(begin),
        end: Box::new(end),
        body: Box::new(body),
    })
}

pub fn let_(declarations: Vec<Declaration>, body: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Let { declarations, body })
}

pub fn array(ty: &str, size: Expression, init: Expression) -> Expression {
    expression(ExpressionKind::Array {
        ty: ident(ty),
        size: Box::new(size),
        init: Box::new(init),
    })
}

pub fn record(ty: &str, fields: Vec<(&str, Expression)>) -> Expression {
    expression(ExpressionKind::Record {
        ty: ident(ty),
        fields: fields
            .into_iter()
            .map(|(name, value)| FieldInitializer {
                span: value.span,
                name: ident(name),
                value,
            })
            .collect(),
    })
}

fn declaration(kind: DeclarationKind) -> Declaration {
    Declaration {
        span: Span::default(),
        kind,
    }
}

pub fn var_decl(name: &str, ty: Option<&str>, value: Expression) -> Declaration {
    declaration(DeclarationKind::Variable(VariableDeclaration {
        name: ident(name),
        ty: ty.map(ident),
        value,
    }))
}

fn type_field(name: &str, ty: &str) -> TypeField {
    TypeField {
        span: Span::default(),
        name: ident(name),
        ty: ident(ty),
    }
}

fn type_decl(name: &str, kind: TypeExpressionKind) -> Declaration {
    declaration(DeclarationKind::Type(TypeDeclaration {
        name: ident(name),
        ty: TypeExpression {
            span: Span::default(),
            kind,
        },
    }))
}

/// type name = alias
pub fn alias_type(name: &str, alias: &str) -> Declaration {
    type_decl(name, TypeExpressionKind::Name(ident(alias)))
}

/// type name = array of element
pub fn array_type(name: &str, element: &str) -> Declaration {
    type_decl(name, TypeExpressionKind::Array(ident(element)))
}

/// type name = { field: ty, ... }
pub fn record_type(name: &str, fields: &[(&str, &str)]) -> Declaration {
    type_decl(
        name,
        TypeExpressionKind::Record(
            fields
                .iter()
                .map(|(name, ty)| type_field(name, ty))
                .collect(),
        ),
    )
}

pub fn function(
    name: &str,
    parameters: &[(&str, &str)],
    result: Option<&str>,
    body: Expression,
) -> Declaration {
    declaration(DeclarationKind::Function(FunctionDeclaration {
        name: ident(name),
        parameters: parameters
            .iter()
            .map(|(name, ty)| type_field(name, ty))
            .collect(),
        result: result.map(ident),
        body,
    }))
}
