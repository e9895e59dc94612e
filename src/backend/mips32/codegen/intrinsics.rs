//! Inline expansions of the runtime library. Every `CallExtern` becomes one
//! of these instruction sequences; nothing is linked in.

use std::str::FromStr;

use super::{Address, CodeGenerator};
use crate::{
    backend::mips32::{
        ArithmeticOperator, BranchCondition, Immediate, InstructionKind, Service, Width,
    },
    error::InternalError,
    frontend::intern::Symbol,
    middle::ir::{Access, BinaryOperator, Label, Temp},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Intrinsic {
    Print,
    Printi,
    Flush,
    Getchar,
    Ord,
    Chr,
    Size,
    Substring,
    Concat,
    Not,
    Exit,
    Malloc,
    Strcmp,
}

impl CodeGenerator<'_> {
    pub(super) fn generate_intrinsic(
        &mut self,
        name: Symbol,
        arguments: &[Access],
        destination: Option<&Access>,
    ) -> Result<(), InternalError> {
        let intrinsic =
            Intrinsic::from_str(name.value()).map_err(|_| InternalError::UnknownIntrinsic(name))?;
        let argument = |index: usize| {
            arguments
                .get(index)
                .ok_or(InternalError::MissingArgument {
                    intrinsic: name,
                    index,
                })
        };

        match intrinsic {
            Intrinsic::Print => self.print(argument(0)?, Service::PrintString),
            Intrinsic::Printi => self.print(argument(0)?, Service::PrintInt),
            Intrinsic::Flush => Ok(()),
            Intrinsic::Getchar => self.getchar(destination),
            Intrinsic::Ord => self.ord(argument(0)?, destination),
            Intrinsic::Chr => self.chr(argument(0)?, destination),
            Intrinsic::Size => {
                let string = self.to_register(argument(0)?)?;
                let size = self.new_temp();
                self.string_size(string, size);
                self.store_result(destination, size)
            }
            Intrinsic::Substring => {
                self.substring(argument(0)?, argument(1)?, argument(2)?, destination)
            }
            Intrinsic::Concat => self.concat(argument(0)?, argument(1)?, destination),
            Intrinsic::Not => {
                let value = self.to_register(argument(0)?)?;
                let result = self.new_temp();
                self.emit(InstructionKind::Arithmetic {
                    operator: ArithmeticOperator::Seq,
                    destination: result,
                    lhs: value,
                    rhs: self.registers.zero,
                });
                self.store_result(destination, result)
            }
            Intrinsic::Exit => self.exit(argument(0)?),
            Intrinsic::Malloc => {
                let result = self.new_temp();
                self.malloc(argument(0)?, result)?;
                self.store_result(destination, result)
            }
            Intrinsic::Strcmp => self.strcmp(argument(0)?, argument(1)?, destination),
        }
    }

    fn store_result(
        &mut self,
        destination: Option<&Access>,
        value: Temp,
    ) -> Result<(), InternalError> {
        match destination {
            Some(destination) => self.generate_move(destination, &Access::Temp(value)),
            None => Ok(()),
        }
    }

    fn store_constant(
        &mut self,
        destination: Option<&Access>,
        value: i32,
    ) -> Result<(), InternalError> {
        match destination {
            Some(destination) => self.generate_move(destination, &Access::int(value)),
            None => Ok(()),
        }
    }

    fn add_immediate(&mut self, register: Temp, value: i32) {
        self.emit(InstructionKind::AddImmediate {
            destination: register,
            source: register,
            immediate: Immediate::Int(value),
        });
    }

    fn load_byte(&mut self, destination: Temp, base: Temp) {
        self.emit(InstructionKind::Load {
            width: Width::Byte,
            destination,
            base,
            offset: 0,
        });
    }

    fn branch(&mut self, condition: BranchCondition, lhs: Temp, rhs: Temp, target: Label) {
        self.emit(InstructionKind::Branch {
            condition,
            lhs,
            rhs,
            target,
        });
    }

    fn jump(&mut self, target: Label) {
        self.emit(InstructionKind::Jump { target });
    }

    fn print(&mut self, value: &Access, service: Service) -> Result<(), InternalError> {
        let a0 = self.registers.a0;
        self.load_into(a0, value)?;
        self.syscall(service);
        Ok(())
    }

    /// Reads one character into a fresh 2 byte buffer
    fn getchar(&mut self, destination: Option<&Access>) -> Result<(), InternalError> {
        let a0 = self.registers.a0;
        let a1 = self.registers.a1;
        self.malloc(&Access::int(2), a0)?;
        self.emit(InstructionKind::LoadImmediate {
            destination: a1,
            immediate: 2,
        });
        self.syscall(Service::ReadString);
        self.store_result(destination, a0)
    }

    /// First byte of the string, or -1 for the empty string
    fn ord(&mut self, string: &Access, destination: Option<&Access>) -> Result<(), InternalError> {
        let empty = Label::new();
        let end = Label::new();
        let string = self.to_register(string)?;
        let byte = self.new_temp();

        self.load_byte(byte, string);
        let zero = self.registers.zero;
        self.branch(BranchCondition::Beq, byte, zero, empty);
        self.store_result(destination, byte)?;
        self.jump(end);
        self.label(empty);
        self.store_constant(destination, -1)?;
        self.label(end);
        Ok(())
    }

    /// One character string of the code, exiting with status 1 when it is
    /// outside 0..=255
    fn chr(&mut self, code: &Access, destination: Option<&Access>) -> Result<(), InternalError> {
        let fail = Label::new();
        let end = Label::new();
        let zero = self.registers.zero;

        let max = self.new_temp();
        self.emit(InstructionKind::LoadImmediate {
            destination: max,
            immediate: 255,
        });
        let code = self.to_register(code)?;
        self.branch(BranchCondition::Bgt, code, max, fail);
        self.branch(BranchCondition::Blt, code, zero, fail);

        let buffer = self.new_temp();
        self.malloc(&Access::int(2), buffer)?;
        self.store(Width::Byte, code, Address { base: buffer, offset: 0 });
        self.store(Width::Byte, zero, Address { base: buffer, offset: 1 });
        self.store_result(destination, buffer)?;
        self.jump(end);

        self.label(fail);
        self.exit(&Access::int(1))?;
        self.label(end);
        Ok(())
    }

    /// Counts the bytes before the terminator
    fn string_size(&mut self, string: Temp, size: Temp) {
        let start = Label::new();
        let end = Label::new();
        let zero = self.registers.zero;
        let cursor = self.new_temp();
        let byte = self.new_temp();

        self.emit(InstructionKind::Move {
            destination: cursor,
            source: string,
        });
        self.emit(InstructionKind::Move {
            destination: size,
            source: zero,
        });
        self.label(start);
        self.load_byte(byte, cursor);
        self.branch(BranchCondition::Beq, byte, zero, end);
        self.add_immediate(cursor, 1);
        self.add_immediate(size, 1);
        self.jump(start);
        self.label(end);
    }

    /// Copies bytes from `source` to `target` up to the terminator, leaving
    /// `target` on the first byte not written
    fn copy_bytes(&mut self, source: Temp, target: Temp) {
        let start = Label::new();
        let end = Label::new();
        let zero = self.registers.zero;
        let byte = self.new_temp();

        self.label(start);
        self.load_byte(byte, source);
        self.branch(BranchCondition::Beq, byte, zero, end);
        self.store(Width::Byte, byte, Address { base: target, offset: 0 });
        self.add_immediate(source, 1);
        self.add_immediate(target, 1);
        self.jump(start);
        self.label(end);
    }

    /// At most `length` bytes starting at `first`, stopping early at the
    /// terminator
    fn substring(
        &mut self,
        string: &Access,
        first: &Access,
        length: &Access,
        destination: Option<&Access>,
    ) -> Result<(), InternalError> {
        let start = Label::new();
        let end = Label::new();
        let zero = self.registers.zero;
        let [result, source, target, remaining, capacity, byte] =
            std::array::from_fn(|_| self.new_temp());

        self.load_into(remaining, length)?;
        self.emit(InstructionKind::AddImmediate {
            destination: capacity,
            source: remaining,
            immediate: Immediate::Int(1),
        });
        self.malloc(&Access::Temp(capacity), result)?;
        let string = self.to_register(string)?;
        self.generate_binary(
            BinaryOperator::Add,
            &Access::Temp(string),
            first,
            &Access::Temp(source),
        )?;
        self.emit(InstructionKind::Move {
            destination: target,
            source: result,
        });

        self.label(start);
        self.branch(BranchCondition::Beq, remaining, zero, end);
        self.load_byte(byte, source);
        self.branch(BranchCondition::Beq, byte, zero, end);
        self.store(Width::Byte, byte, Address { base: target, offset: 0 });
        self.add_immediate(target, 1);
        self.add_immediate(source, 1);
        self.add_immediate(remaining, -1);
        self.jump(start);

        self.label(end);
        self.store(Width::Byte, zero, Address { base: target, offset: 0 });
        self.store_result(destination, result)
    }

    fn concat(
        &mut self,
        first: &Access,
        second: &Access,
        destination: Option<&Access>,
    ) -> Result<(), InternalError> {
        let first = self.to_register(first)?;
        let second = self.to_register(second)?;
        let [first_size, second_size, size, result, source, target] =
            std::array::from_fn(|_| self.new_temp());

        self.string_size(first, first_size);
        self.string_size(second, second_size);
        self.emit(InstructionKind::Arithmetic {
            operator: ArithmeticOperator::Add,
            destination: size,
            lhs: first_size,
            rhs: second_size,
        });
        self.add_immediate(size, 1);
        self.malloc(&Access::Temp(size), result)?;

        self.emit(InstructionKind::Move {
            destination: target,
            source: result,
        });
        for string in [first, second] {
            self.emit(InstructionKind::Move {
                destination: source,
                source: string,
            });
            self.copy_bytes(source, target);
        }

        let zero = self.registers.zero;
        self.store(Width::Byte, zero, Address { base: target, offset: 0 });
        self.store_result(destination, result)
    }

    fn exit(&mut self, code: &Access) -> Result<(), InternalError> {
        let a0 = self.registers.a0;
        self.load_into(a0, code)?;
        self.syscall(Service::ExitWithCode);
        Ok(())
    }

    /// Grows the heap by `size` bytes, leaving the start of the new block in
    /// `destination`
    fn malloc(&mut self, size: &Access, destination: Temp) -> Result<(), InternalError> {
        let a0 = self.registers.a0;
        let v0 = self.registers.v0;
        self.load_into(a0, size)?;
        self.syscall(Service::Sbrk);
        self.emit(InstructionKind::Move {
            destination,
            source: v0,
        });
        Ok(())
    }

    /// 1, -1 or 0 as the first differing byte of `lhs` is greater, smaller, or
    /// both strings end together
    fn strcmp(
        &mut self,
        lhs: &Access,
        rhs: &Access,
        destination: Option<&Access>,
    ) -> Result<(), InternalError> {
        let [start, greater, less, equal, end] = std::array::from_fn(|_| Label::new());
        let [lhs_cursor, rhs_cursor, lhs_byte, rhs_byte] = std::array::from_fn(|_| self.new_temp());
        let zero = self.registers.zero;

        self.load_into(lhs_cursor, lhs)?;
        self.load_into(rhs_cursor, rhs)?;

        self.label(start);
        self.load_byte(lhs_byte, lhs_cursor);
        self.load_byte(rhs_byte, rhs_cursor);
        self.branch(BranchCondition::Bgt, lhs_byte, rhs_byte, greater);
        self.branch(BranchCondition::Blt, lhs_byte, rhs_byte, less);
        self.branch(BranchCondition::Beq, lhs_byte, zero, equal);
        self.add_immediate(lhs_cursor, 1);
        self.add_immediate(rhs_cursor, 1);
        self.jump(start);

        for (label, value) in [(greater, 1), (less, -1)] {
            self.label(label);
            self.store_constant(destination, value)?;
            self.jump(end);
        }

        self.label(equal);
        self.store_constant(destination, 0)?;
        self.label(end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        backend::mips32::{Line, Program},
        index::IndexVec,
        middle::{
            frame::{CallGraph, Frame},
            ir::{CodeList, Const, Ir, StringTable, TacKind},
        },
    };

    fn generate_extern(
        name: &str,
        arguments: Vec<Access>,
        destination: Option<Access>,
    ) -> Result<Program, InternalError> {
        let mut frames = IndexVec::new();
        let global_frame = frames.push(Frame::new(Symbol::new("main"), None, None));
        let mut codes = CodeList::new();
        codes.push(
            global_frame,
            TacKind::CallExtern {
                name: Symbol::new(name),
                arguments,
                destination,
            },
        );

        let ir = Ir {
            codes,
            strings: StringTable::default(),
            externs: BTreeSet::from([Symbol::new(name)]),
            frames,
            global_frame,
            functions: IndexVec::new(),
            call_graph: CallGraph::new(),
        };

        CodeGenerator::new(&ir).generate()
    }

    fn syscalls(program: &Program) -> Vec<Service> {
        program
            .instructions
            .instructions()
            .filter_map(|instruction| match instruction.kind {
                InstructionKind::Syscall { service, .. } => Some(service),
                _ => None,
            })
            .collect()
    }

    fn kinds(program: &Program) -> Vec<&InstructionKind> {
        program
            .instructions
            .instructions()
            .map(|instruction| &instruction.kind)
            .collect()
    }

    fn branch_conditions(program: &Program) -> Vec<BranchCondition> {
        program
            .instructions
            .instructions()
            .filter_map(|instruction| match instruction.kind {
                InstructionKind::Branch { condition, .. } => Some(condition),
                _ => None,
            })
            .collect()
    }

    /// Values loaded straight into `destination`
    fn immediates_into(program: &Program, destination: Temp) -> Vec<i32> {
        program
            .instructions
            .instructions()
            .filter_map(|instruction| match instruction.kind {
                InstructionKind::LoadImmediate {
                    destination: loaded,
                    immediate,
                } if loaded == destination => Some(immediate),
                _ => None,
            })
            .collect()
    }

    fn loads_address_of(program: &Program, label: Label) -> bool {
        program.instructions.instructions().any(|instruction| {
            matches!(
                instruction.kind,
                InstructionKind::LoadAddress { label: loaded, .. } if loaded == label
            )
        })
    }

    #[test]
    fn names_map_to_intrinsics() {
        assert_eq!(Intrinsic::from_str("printi"), Ok(Intrinsic::Printi));
        assert_eq!(Intrinsic::from_str("getchar"), Ok(Intrinsic::Getchar));
        assert!(Intrinsic::from_str("fopen").is_err());
        assert_eq!(Intrinsic::Substring.to_string(), "substring");
    }

    #[test]
    fn unknown_externs_are_internal_errors() {
        assert_eq!(
            generate_extern("fopen", vec![], None).unwrap_err(),
            InternalError::UnknownIntrinsic(Symbol::new("fopen"))
        );
        assert!(matches!(
            generate_extern("printi", vec![], None),
            Err(InternalError::MissingArgument { index: 0, .. })
        ));
    }

    #[test]
    fn print_moves_its_argument_into_a0() {
        let program = generate_extern("printi", vec![Access::int(42)], None).unwrap();
        let a0 = program.registers.a0;

        assert!(program.instructions.instructions().any(|instruction| instruction.kind
            == InstructionKind::LoadImmediate {
                destination: a0,
                immediate: 42,
            }));
        assert_eq!(syscalls(&program), vec![Service::PrintInt]);
    }

    #[test]
    fn exit_passes_its_status() {
        let program = generate_extern("exit", vec![Access::int(3)], None).unwrap();
        let a0 = program.registers.a0;

        assert!(program.instructions.instructions().any(|instruction| instruction.kind
            == InstructionKind::LoadImmediate {
                destination: a0,
                immediate: 3,
            }));
        assert_eq!(syscalls(&program), vec![Service::ExitWithCode]);
    }

    #[test]
    fn getchar_returns_the_buffer() {
        let result = Temp::new();
        let program = generate_extern("getchar", vec![], Some(result.into())).unwrap();

        assert_eq!(syscalls(&program), vec![Service::Sbrk, Service::ReadString]);
        assert_eq!(
            program.instructions.instructions().last().map(|instruction| &instruction.kind),
            Some(&InstructionKind::Move {
                destination: result,
                source: program.registers.a0,
            })
        );
    }

    #[test]
    fn chr_terminates_after_the_character() {
        let result = Temp::new();
        let program = generate_extern("chr", vec![Access::int(65)], Some(result.into())).unwrap();
        let zero = program.registers.zero;

        let byte_stores = program
            .instructions
            .instructions()
            .filter_map(|instruction| match instruction.kind {
                InstructionKind::Store {
                    width: Width::Byte,
                    source,
                    offset,
                    ..
                } => Some((source, offset)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(byte_stores.len(), 2);
        assert_eq!(byte_stores[0].1, 0);
        assert_eq!(byte_stores[1], (zero, 1));

        // The success path jumps over the failure exit
        let lines = program.instructions.lines();
        let Some(Line::Label(end)) = lines.last() else {
            panic!("chr ends with its end label");
        };
        assert!(program
            .instructions
            .instructions()
            .any(|instruction| instruction.kind == InstructionKind::Jump { target: *end }));
        assert_eq!(
            syscalls(&program),
            vec![Service::Sbrk, Service::ExitWithCode]
        );
    }

    #[test]
    fn flush_emits_nothing() {
        let program = generate_extern("flush", vec![], None).unwrap();
        assert!(program.instructions.is_empty());
    }

    #[test]
    fn concat_copies_both_strings() {
        let [a, b, result] = [Temp::new(), Temp::new(), Temp::new()];
        let program =
            generate_extern("concat", vec![a.into(), b.into()], Some(result.into())).unwrap();

        // Two size loops and two copy loops
        let loops = program
            .instructions
            .instructions()
            .filter(|instruction| matches!(instruction.kind, InstructionKind::Jump { .. }))
            .count();
        assert_eq!(loops, 4);
        assert_eq!(syscalls(&program), vec![Service::Sbrk]);
    }

    #[test]
    fn size_counts_bytes_up_to_the_terminator() {
        let [string, result] = [Temp::new(), Temp::new()];
        let program = generate_extern("size", vec![string.into()], Some(result.into())).unwrap();
        let zero = program.registers.zero;
        let kinds = kinds(&program);

        let InstructionKind::Move {
            destination: cursor,
            source,
        } = kinds[0]
        else {
            panic!("expected the cursor to start at the string, got {:?}", kinds[0]);
        };
        assert_eq!(*source, string);
        assert!(matches!(
            kinds[2],
            InstructionKind::Load {
                width: Width::Byte,
                base,
                offset: 0,
                ..
            } if base == cursor
        ));
        assert!(matches!(
            kinds[3],
            InstructionKind::Branch {
                condition: BranchCondition::Beq,
                rhs,
                ..
            } if *rhs == zero
        ));
        assert!(kinds.contains(&&InstructionKind::AddImmediate {
            destination: *cursor,
            source: *cursor,
            immediate: Immediate::Int(1),
        }));
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| matches!(kind, InstructionKind::Jump { .. }))
                .count(),
            1
        );
        assert!(matches!(
            kinds.last(),
            Some(InstructionKind::Move { destination, .. }) if *destination == result
        ));
        assert!(syscalls(&program).is_empty());
    }

    #[test]
    fn ord_of_the_empty_string_is_negative_one() {
        let label = Label::new();
        let result = Temp::new();
        let program = generate_extern(
            "ord",
            vec![Access::Const(Const::String(label))],
            Some(result.into()),
        )
        .unwrap();

        assert!(loads_address_of(&program, label));
        assert!(program.instructions.instructions().any(|instruction| matches!(
            instruction.kind,
            InstructionKind::Load {
                width: Width::Byte,
                ..
            }
        )));
        assert_eq!(branch_conditions(&program), vec![BranchCondition::Beq]);
        assert_eq!(immediates_into(&program, result), vec![-1]);
    }

    #[test]
    fn substring_of_a_literal_starts_from_its_address() {
        let label = Label::new();
        let [first, result] = [Temp::new(), Temp::new()];
        let program = generate_extern(
            "substring",
            vec![Access::Const(Const::String(label)), first.into(), Access::int(2)],
            Some(result.into()),
        )
        .unwrap();
        let zero = program.registers.zero;
        let kinds = kinds(&program);

        let start = kinds
            .iter()
            .find_map(|kind| match kind {
                InstructionKind::LoadAddress {
                    destination,
                    label: loaded,
                } if *loaded == label => Some(*destination),
                _ => None,
            })
            .expect("the literal is loaded with la");
        assert!(kinds.iter().any(|kind| matches!(
            kind,
            InstructionKind::Arithmetic {
                operator: ArithmeticOperator::Add,
                lhs,
                rhs,
                ..
            } if *lhs == start && *rhs == first
        )));
        assert_eq!(syscalls(&program), vec![Service::Sbrk]);
        assert_eq!(
            branch_conditions(&program),
            vec![BranchCondition::Beq, BranchCondition::Beq]
        );

        // The copy is terminated right before the result is handed back
        let stores = kinds
            .iter()
            .filter_map(|kind| match kind {
                InstructionKind::Store {
                    width: Width::Byte,
                    source,
                    ..
                } => Some(*source),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[1], zero);
    }

    #[test]
    fn substring_with_a_constant_start_uses_an_immediate() {
        let [string, result] = [Temp::new(), Temp::new()];
        let program = generate_extern(
            "substring",
            vec![string.into(), Access::int(1), Access::int(3)],
            Some(result.into()),
        )
        .unwrap();

        assert!(program.instructions.instructions().any(|instruction| matches!(
            instruction.kind,
            InstructionKind::AddImmediate {
                source,
                immediate: Immediate::Int(1),
                ..
            } if source == string
        )));
    }

    #[test]
    fn strcmp_mixes_literals_and_temps() {
        let label = Label::new();
        let [rhs, result] = [Temp::new(), Temp::new()];
        let program = generate_extern(
            "strcmp",
            vec![Access::Const(Const::String(label)), rhs.into()],
            Some(result.into()),
        )
        .unwrap();

        assert!(loads_address_of(&program, label));
        assert!(program.instructions.instructions().any(|instruction| matches!(
            instruction.kind,
            InstructionKind::Move { source, .. } if source == rhs
        )));
        assert_eq!(
            branch_conditions(&program),
            vec![
                BranchCondition::Bgt,
                BranchCondition::Blt,
                BranchCondition::Beq
            ]
        );
        assert_eq!(immediates_into(&program, result), vec![1, -1, 0]);
        assert!(syscalls(&program).is_empty());
    }
}
