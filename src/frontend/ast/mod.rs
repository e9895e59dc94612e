use super::{Span, intern::Symbol};

pub mod build;

#[derive(Debug, Clone)]
pub struct Identifier {
    pub span: Span,
    pub symbol: Symbol,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    /// type-id [size] of init
    Array {
        ty: Identifier,
        size: Box<Expression>,
        init: Box<Expression>,
    },
    /// lvalue := value
    Assignment {
        lvalue: Box<LValue>,
        value: Box<Expression>,
    },
    Break,
    /// f(a, b)
    Call {
        function: Identifier,
        arguments: Vec<Expression>,
    },
    /// for i := begin to end do body
    For {
        variable: Identifier,
        begin: Box<Expression>,
        end: Box<Expression>,
        body: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        positive: Box<Expression>,
        negative: Option<Box<Expression>>,
    },
    Int(i32),
    /// let declarations in body end
    Let {
        declarations: Vec<Declaration>,
        body: Vec<Expression>,
    },
    LValue(Box<LValue>),
    /// -operand
    Negation(Box<Expression>),
    Nil,
    Op {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    /// type-id { field = value, ... }
    Record {
        ty: Identifier,
        fields: Vec<FieldInitializer>,
    },
    /// (a; b; c)
    Sequence(Vec<Expression>),
    String(Symbol),
    While {
        condition: Box<Expression>,
        body: Box<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct BinaryOperator {
    pub span: Span,
    pub kind: BinaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "=")]
    Equals,
    #[strum(serialize = "<>")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "&")]
    LogicalAnd,
    #[strum(serialize = "|")]
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Logical,
    Equality,
    Comparison,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide => {
                BinaryOperatorClass::Arithmetic
            }
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Comparison,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldInitializer {
    pub span: Span,
    pub name: Identifier,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct LValue {
    pub span: Span,
    pub kind: LValueKind,
}

#[derive(Debug, Clone)]
pub enum LValueKind {
    /// x
    Variable(Identifier),
    /// base.field
    Field {
        base: Box<LValue>,
        field: Identifier,
    },
    /// base[index]
    Subscript {
        base: Box<LValue>,
        index: Box<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub span: Span,
    pub kind: DeclarationKind,
}

#[derive(Debug, Clone)]
pub enum DeclarationKind {
    Variable(VariableDeclaration),
    Type(TypeDeclaration),
    Function(FunctionDeclaration),
}

/// var name [: ty] := value
#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub name: Identifier,
    pub ty: Option<Identifier>,
    pub value: Expression,
}

/// type name = ty
#[derive(Debug, Clone)]
pub struct TypeDeclaration {
    pub name: Identifier,
    pub ty: TypeExpression,
}

/// function name(parameters) [: result] = body
#[derive(Debug, Clone)]
pub struct FunctionDeclaration {
    pub name: Identifier,
    pub parameters: Vec<TypeField>,
    pub result: Option<Identifier>,
    pub body: Expression,
}

#[derive(Debug, Clone)]
pub struct TypeExpression {
    pub span: Span,
    pub kind: TypeExpressionKind,
}

#[derive(Debug, Clone)]
pub enum TypeExpressionKind {
    /// type a = b
    Name(Identifier),
    /// type a = array of b
    Array(Identifier),
    /// type a = { x: int, y: string }
    Record(Vec<TypeField>),
}

/// name: ty
#[derive(Debug, Clone)]
pub struct TypeField {
    pub span: Span,
    pub name: Identifier,
    pub ty: Identifier,
}
