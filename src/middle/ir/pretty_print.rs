use colored::Colorize;
use itertools::Itertools;

use crate::middle::ir::{Access, Code, CodeList, Const, Ir, Tac, TacKind, Temp};

impl core::fmt::Display for Temp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("t{}", self.as_u32()).yellow())
    }
}

impl core::fmt::Display for Const {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Const::Int(value) => write!(f, "{}", value.to_string().purple()),
            Const::WordLength => write!(f, "{}", "WORD".purple()),
            Const::String(label) => write!(f, "{}", format!("&{label}").blue()),
        }
    }
}

impl core::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Temp(temp) => write!(f, "{temp}"),
            Access::Const(constant) => write!(f, "{constant}"),
            Access::Memory { base, offset } => write!(f, "[{base} + {offset}]"),
        }
    }
}

fn arguments(arguments: &[Access]) -> String {
    arguments.iter().map(|arg| arg.to_string()).join(", ")
}

impl core::fmt::Display for TacKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TacKind::Move {
                destination,
                source,
            } => write!(f, "{destination} {} {source}", "=".white()),
            TacKind::BinaryOperation {
                operator,
                lhs,
                rhs,
                destination,
            } => write!(
                f,
                "{destination} {} {lhs} {} {rhs}",
                "=".white(),
                operator.to_string().white()
            ),
            TacKind::UnaryOperation {
                operator,
                operand,
                destination,
            } => write!(
                f,
                "{destination} {} {} {operand}",
                "=".white(),
                operator.to_string().white()
            ),
            TacKind::Call {
                target,
                arguments: args,
                destination,
            } => {
                if let Some(destination) = destination {
                    write!(f, "{destination} {} ", "=".white())?;
                }

                write!(
                    f,
                    "{} {}({})",
                    "call".cyan(),
                    target.to_string().blue(),
                    arguments(args)
                )
            }
            TacKind::CallExtern {
                name,
                arguments: args,
                destination,
            } => {
                if let Some(destination) = destination {
                    write!(f, "{destination} {} ", "=".white())?;
                }

                write!(
                    f,
                    "{} {}({})",
                    "extern".cyan(),
                    name.value().green(),
                    arguments(args)
                )
            }
            TacKind::Return => write!(f, "{}", "ret".cyan()),
            TacKind::Goto { target } => {
                write!(f, "{} {}", "goto".cyan(), target.to_string().blue())
            }
            TacKind::Branch {
                condition,
                lhs,
                rhs,
                target,
            } => write!(
                f,
                "{} {lhs} {} {rhs} {}",
                "if".cyan(),
                condition.to_string().white(),
                target.to_string().blue()
            ),
        }
    }
}

impl core::fmt::Display for Tac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl core::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = self.label {
            writeln!(f, "{}", format!("{label}:").bright_red())?;
        }

        if let Some(tac) = &self.tac {
            write!(f, "    {tac}")?;
        }

        Ok(())
    }
}

impl core::fmt::Display for CodeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for code in self {
            if code.tac.is_some() {
                writeln!(f, "{code}")?;
            } else {
                write!(f, "{code}")?;
            }
        }

        Ok(())
    }
}

impl core::fmt::Display for Ir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (label, value) in self.strings.entries() {
            writeln!(
                f,
                "{} {}",
                format!("{label}:").bright_red(),
                format!("{:?}", value.value()).green()
            )?;
        }

        write!(f, "{}", self.codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Index,
        middle::{
            frame::FrameId,
            ir::{BinaryOperator, Label},
        },
    };

    #[test]
    fn renders_three_address_code() {
        let frame = FrameId::new(0);
        let t = Temp::new();
        let label = Label::new();

        let mut codes = CodeList::new();
        codes.push(
            frame,
            TacKind::BinaryOperation {
                operator: BinaryOperator::Mul,
                lhs: Access::int(3),
                rhs: Access::int(4),
                destination: t.into(),
            },
        );
        codes.push_label(label);
        codes.push(frame, TacKind::Goto { target: label });

        let text = strip_ansi_escapes::strip_str(codes.to_string());
        let expected = format!("    t{} = 3 mul 4\n{label}:\n    goto {label}\n", t.as_u32());
        assert_eq!(text, expected);
    }

    #[test]
    fn renders_memory_operands() {
        let base = Temp::new();
        let access = Access::memory(base.into(), Access::Const(Const::WordLength));

        assert_eq!(
            strip_ansi_escapes::strip_str(access.to_string()),
            format!("[t{} + WORD]", base.as_u32())
        );
    }
}
