use colored::Colorize;
use itertools::Itertools;

use crate::{
    backend::mips32::{
        Immediate, Instruction, InstructionKind, InstructionList, Line, Program, Width,
    },
    index::Index,
    middle::ir::Temp,
};

impl core::fmt::Display for Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Immediate::Int(value) => write!(f, "{}", value.to_string().purple()),
            Immediate::FrameSize(frame) => {
                write!(f, "{}", format!("framesize(F{})", frame.index()).purple())
            }
            Immediate::NegatedFrameSize(frame) => {
                write!(f, "{}", format!("-framesize(F{})", frame.index()).purple())
            }
        }
    }
}

/// Formats an instruction either on its own, with temps and symbolic frame
/// sizes, or as part of a program, with register names and resolved sizes
struct Render<'p> {
    program: Option<&'p Program>,
    kind: &'p InstructionKind,
}

impl Render<'_> {
    fn temp(&self, temp: Temp) -> String {
        self.program
            .and_then(|program| program.registers.name(temp))
            .map(|name| name.to_string())
            .unwrap_or_else(|| temp.to_string())
    }

    fn immediate(&self, immediate: Immediate) -> String {
        match self.program {
            Some(program) => program.resolve_immediate(immediate).to_string().purple().to_string(),
            None => immediate.to_string(),
        }
    }
}

impl core::fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width_suffix = |width: &Width| match width {
            Width::Word => "w",
            Width::Byte => "b",
        };

        match self.kind {
            InstructionKind::Arithmetic {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{} {}, {}, {}",
                operator.to_string().cyan(),
                self.temp(*destination),
                self.temp(*lhs),
                self.temp(*rhs)
            ),
            InstructionKind::AddImmediate {
                destination,
                source,
                immediate,
            } => write!(
                f,
                "{} {}, {}, {}",
                "addi".cyan(),
                self.temp(*destination),
                self.temp(*source),
                self.immediate(*immediate)
            ),
            InstructionKind::SetLessThanImmediate {
                destination,
                source,
                immediate,
            } => write!(
                f,
                "{} {}, {}, {}",
                "slti".cyan(),
                self.temp(*destination),
                self.temp(*source),
                immediate.to_string().purple()
            ),
            InstructionKind::Negate {
                destination,
                source,
            } => write!(
                f,
                "{} {}, {}",
                "neg".cyan(),
                self.temp(*destination),
                self.temp(*source)
            ),
            InstructionKind::Move {
                destination,
                source,
            } => write!(
                f,
                "{} {}, {}",
                "move".cyan(),
                self.temp(*destination),
                self.temp(*source)
            ),
            InstructionKind::LoadImmediate {
                destination,
                immediate,
            } => write!(
                f,
                "{} {}, {}",
                "li".cyan(),
                self.temp(*destination),
                immediate.to_string().purple()
            ),
            InstructionKind::LoadAddress { destination, label } => write!(
                f,
                "{} {}, {}",
                "la".cyan(),
                self.temp(*destination),
                label.to_string().blue()
            ),
            InstructionKind::Load {
                width,
                destination,
                base,
                offset,
            } => write!(
                f,
                "{} {}, {}({})",
                format!("l{}", width_suffix(width)).cyan(),
                self.temp(*destination),
                offset.to_string().purple(),
                self.temp(*base)
            ),
            InstructionKind::Store {
                width,
                source,
                base,
                offset,
            } => write!(
                f,
                "{} {}, {}({})",
                format!("s{}", width_suffix(width)).cyan(),
                self.temp(*source),
                offset.to_string().purple(),
                self.temp(*base)
            ),
            InstructionKind::Jump { target } => {
                write!(f, "{} {}", "j".cyan(), target.to_string().blue())
            }
            InstructionKind::JumpAndLink { target, .. } => {
                write!(f, "{} {}", "jal".cyan(), target.to_string().blue())
            }
            InstructionKind::JumpRegister { register } => {
                write!(f, "{} {}", "jr".cyan(), self.temp(*register))
            }
            InstructionKind::Branch {
                condition,
                lhs,
                rhs,
                target,
            } => write!(
                f,
                "{} {}, {}, {}",
                condition.to_string().cyan(),
                self.temp(*lhs),
                self.temp(*rhs),
                target.to_string().blue()
            ),
            InstructionKind::Syscall { service, .. } => {
                write!(f, "{} {}", "syscall".cyan(), format!("# {service}").dimmed())
            }
            InstructionKind::SavePlaceholder => write!(f, "{}", "# save".bright_red()),
            InstructionKind::RestorePlaceholder => write!(f, "{}", "# restore".bright_red()),
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            Render {
                program: None,
                kind: &self.kind,
            }
        )?;

        if self.call_transfer {
            write!(f, " {}", "# call".dimmed())?;
        }

        Ok(())
    }
}

impl core::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Line::Label(label) => write!(f, "{}:", label.to_string().blue()),
            Line::Instruction(instruction) => write!(f, "    {instruction}"),
        }
    }
}

impl core::fmt::Display for InstructionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }

        Ok(())
    }
}

/// Quotes a string for the `.asciiz` directive
fn format_asciiz(string: &str) -> String {
    let mut quoted = String::with_capacity(string.len() + 2);
    quoted.push('"');
    for c in string.chars() {
        match c {
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl Program {
    /// Assembly text for a MIPS simulator. Temps without a register are
    /// printed by name, so the text only assembles after allocation.
    pub fn listing(&self) -> String {
        let body = self
            .instructions
            .lines()
            .iter()
            .map(|line| match line {
                Line::Label(label) => format!("{label}:"),
                Line::Instruction(instruction) => format!(
                    "    {}",
                    Render {
                        program: Some(self),
                        kind: &instruction.kind,
                    }
                ),
            })
            .join("\n");

        let strings = self
            .strings
            .iter()
            .map(|(label, value)| format!("{label}: .asciiz {}", format_asciiz(value.value())))
            .join("\n");

        strip_ansi_escapes::strip_str(format!(
            indoc::indoc! {r#"
                .text
                .globl main
            main:
            {0}
                li $v0, 10
                syscall

                .data
            {1}
            "#},
            body, strings
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::mips32::{ArithmeticOperator, Registers},
        frontend::intern::Symbol,
        index::IndexVec,
        middle::{
            frame::{Frame, FrameId},
            ir::Label,
        },
    };

    fn plain(value: impl ToString) -> String {
        strip_ansi_escapes::strip_str(value.to_string())
    }

    #[test]
    fn instructions_print_with_temps() {
        let [a, b, c] = [Temp::new(), Temp::new(), Temp::new()];
        let add = Instruction::new(
            FrameId::new(0),
            InstructionKind::Arithmetic {
                operator: ArithmeticOperator::Sne,
                destination: c,
                lhs: a,
                rhs: b,
            },
        );

        assert_eq!(
            plain(&add),
            format!("sne t{}, t{}, t{}", c.as_u32(), a.as_u32(), b.as_u32())
        );

        let grow = Instruction::new(
            FrameId::new(0),
            InstructionKind::AddImmediate {
                destination: a,
                source: a,
                immediate: Immediate::NegatedFrameSize(FrameId::new(2)),
            },
        );
        assert_eq!(
            plain(&grow),
            format!("addi t{0}, t{0}, -framesize(F2)", a.as_u32())
        );
    }

    #[test]
    fn listing_names_registers_and_resolves_sizes() {
        let mut frames = IndexVec::new();
        let mut global = Frame::new(Symbol::new("main"), None, None);
        let registers = Registers::reserve(&mut global);
        let global = frames.push(global);

        let mut instructions = InstructionList::new();
        let data = Label::new();
        instructions.push(Instruction::new(
            global,
            InstructionKind::LoadAddress {
                destination: registers.a0,
                label: data,
            },
        ));
        instructions.push(Instruction::new(
            global,
            InstructionKind::AddImmediate {
                destination: registers.sp,
                source: registers.sp,
                immediate: Immediate::FrameSize(global),
            },
        ));
        instructions.push(Instruction::new(
            global,
            InstructionKind::Load {
                width: Width::Byte,
                destination: registers.v0,
                base: registers.fp,
                offset: -4,
            },
        ));

        let program = Program {
            instructions,
            frames,
            registers,
            call_saves: Vec::new(),
            strings: vec![(data, Symbol::new("hi\n\"there\""))],
            word_length: 4,
        };

        let listing = program.listing();
        assert!(listing.contains(&format!("    la $a0, {data}\n")));
        // 3 saved slots and the 7 reserved registers
        assert!(listing.contains("    addi $sp, $sp, 40\n"));
        assert!(listing.contains("    lb $v0, -4($fp)\n"));
        assert!(listing.contains(&format!(r#"{data}: .asciiz "hi\n\"there\"""#)));
        assert!(!listing.contains('\u{1b}'));
    }
}
