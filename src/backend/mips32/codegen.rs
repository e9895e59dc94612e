use hashbrown::HashMap;

use crate::{
    backend::mips32::{
        ArithmeticOperator, BranchCondition, CallSave, Immediate, Instruction, InstructionKind,
        InstructionList, Program, Registers, Service, Width,
    },
    error::InternalError,
    index::IndexVec,
    middle::{
        frame::{Frame, FrameId},
        ir::{Access, BinaryOperator, Condition, Const, Ir, Label, TacKind, Temp, UnaryOperator},
    },
};

mod intrinsics;

pub const WORD_LENGTH: i32 = 4;

/// An address in the `offset(base)` form loads and stores take
#[derive(Debug, Clone, Copy)]
struct Address {
    base: Temp,
    offset: i32,
}

/// Lowers IR to MIPS32 instructions over temps. Every temp the generator
/// needs is added to the frame of the function being lowered, so frame sizes
/// are only final once [`CodeGenerator::generate`] returns.
pub struct CodeGenerator<'ir> {
    ir: &'ir Ir,
    frames: IndexVec<FrameId, Frame>,
    registers: Registers,
    /// Label map for call lookup, built before any code is generated: the
    /// callee frame entered through each function's entry label
    entries: HashMap<Label, FrameId>,
    instructions: InstructionList,
    call_saves: Vec<CallSave>,
    frame: FrameId,
}

impl<'ir> CodeGenerator<'ir> {
    pub fn new(ir: &'ir Ir) -> Self {
        let mut frames = ir.frames.clone();
        let registers = Registers::reserve(&mut frames[ir.global_frame]);
        let entries = frames
            .enumerate()
            .filter_map(|(id, frame)| frame.entry.map(|entry| (entry, id)))
            .collect();

        Self {
            ir,
            frames,
            registers,
            entries,
            instructions: InstructionList::new(),
            call_saves: Vec::new(),
            frame: ir.global_frame,
        }
    }

    pub fn generate(mut self) -> Result<Program, InternalError> {
        let ir = self.ir;
        for code in &ir.codes {
            if let Some(label) = code.label {
                self.instructions.push_label(label);
            }

            if let Some(tac) = &code.tac {
                self.frame = tac.frame;
                self.generate_tac(&tac.kind)?;
            }
        }

        tracing::debug!(
            lines = self.instructions.len(),
            call_saves = self.call_saves.len(),
            "generated mips32 code"
        );

        Ok(Program {
            instructions: self.instructions,
            frames: self.frames,
            registers: self.registers,
            call_saves: self.call_saves,
            strings: ir.strings.entries().to_vec(),
            word_length: WORD_LENGTH,
        })
    }

    fn generate_tac(&mut self, tac: &TacKind) -> Result<(), InternalError> {
        match tac {
            TacKind::Move {
                destination,
                source,
            } => self.generate_move(destination, source),
            TacKind::BinaryOperation {
                operator,
                lhs,
                rhs,
                destination,
            } => self.generate_binary(*operator, lhs, rhs, destination),
            TacKind::UnaryOperation {
                operator: UnaryOperator::Neg,
                operand,
                destination,
            } => self.generate_negation(operand, destination),
            TacKind::Call {
                target,
                arguments,
                destination,
            } => self.generate_call(*target, arguments, destination.as_ref()),
            TacKind::CallExtern {
                name,
                arguments,
                destination,
            } => self.generate_intrinsic(*name, arguments, destination.as_ref()),
            TacKind::Return => {
                let register = self.registers.ra;
                self.emit(InstructionKind::JumpRegister { register });
                Ok(())
            }
            TacKind::Goto { target } => {
                self.emit(InstructionKind::Jump { target: *target });
                Ok(())
            }
            TacKind::Branch {
                condition,
                lhs,
                rhs,
                target,
            } => {
                let lhs = self.to_register(lhs)?;
                let rhs = self.to_register(rhs)?;
                self.emit(InstructionKind::Branch {
                    condition: branch_condition(*condition),
                    lhs,
                    rhs,
                    target: *target,
                });
                Ok(())
            }
        }
    }

    fn emit(&mut self, kind: InstructionKind) {
        self.instructions.push(Instruction::new(self.frame, kind));
    }

    fn emit_in(&mut self, frame: FrameId, kind: InstructionKind) {
        self.instructions.push(Instruction::new(frame, kind));
    }

    fn label(&mut self, label: Label) {
        self.instructions.push_label(label);
    }

    fn new_temp(&mut self) -> Temp {
        self.frames[self.frame].add_local()
    }

    fn constant(&self, constant: Const) -> Result<i32, InternalError> {
        match constant {
            Const::Int(value) => Ok(value),
            Const::WordLength => Ok(WORD_LENGTH),
            Const::String(label) => Err(InternalError::UnresolvedConstant(format!("&{label}"))),
        }
    }

    fn address(&mut self, base: &Access, offset: &Access) -> Result<Address, InternalError> {
        match (base, offset) {
            (Access::Temp(base), Access::Temp(offset)) => {
                let sum = self.new_temp();
                self.emit(InstructionKind::Arithmetic {
                    operator: ArithmeticOperator::Add,
                    destination: sum,
                    lhs: *base,
                    rhs: *offset,
                });
                Ok(Address {
                    base: sum,
                    offset: 0,
                })
            }
            (Access::Temp(base), Access::Const(offset))
            | (Access::Const(offset), Access::Temp(base))
                if !offset.is_address() =>
            {
                Ok(Address {
                    base: *base,
                    offset: self.constant(*offset)?,
                })
            }
            (Access::Const(base), Access::Const(offset))
                if !base.is_address() && !offset.is_address() =>
            {
                Ok(Address {
                    base: self.registers.zero,
                    offset: self.constant(*base)?.wrapping_add(self.constant(*offset)?),
                })
            }
            // A data label has to be loaded with `la` first
            _ => {
                let base = self.to_register(base)?;
                let offset = self.to_register(offset)?;
                self.address(&Access::Temp(base), &Access::Temp(offset))
            }
        }
    }

    /// A temp holding the value of `access`, reading `$zero` for a literal 0
    fn to_register(&mut self, access: &Access) -> Result<Temp, InternalError> {
        match access {
            Access::Temp(temp) => Ok(*temp),
            Access::Const(Const::Int(0)) => Ok(self.registers.zero),
            _ => {
                let temp = self.new_temp();
                self.load_into(temp, access)?;
                Ok(temp)
            }
        }
    }

    fn load_into(&mut self, destination: Temp, source: &Access) -> Result<(), InternalError> {
        let kind = match source {
            Access::Temp(source) => InstructionKind::Move {
                destination,
                source: *source,
            },
            Access::Const(Const::String(label)) => InstructionKind::LoadAddress {
                destination,
                label: *label,
            },
            Access::Const(constant) => InstructionKind::LoadImmediate {
                destination,
                immediate: self.constant(*constant)?,
            },
            Access::Memory { base, offset } => {
                let Address { base, offset } = self.address(base, offset)?;
                InstructionKind::Load {
                    width: Width::Word,
                    destination,
                    base,
                    offset,
                }
            }
        };

        self.emit(kind);
        Ok(())
    }

    /// Loads a value across a call boundary. The instruction is flagged so a
    /// register allocator can try to coalesce it.
    fn transfer(&mut self, destination: Temp, source: &Access) -> Result<(), InternalError> {
        self.load_into(destination, source)?;
        if let Some(instruction) = self.instructions.last_instruction_mut() {
            instruction.call_transfer = true;
        }
        Ok(())
    }

    fn generate_move(
        &mut self,
        destination: &Access,
        source: &Access,
    ) -> Result<(), InternalError> {
        match destination {
            Access::Temp(destination) => self.load_into(*destination, source),
            Access::Memory { base, offset } => {
                let address = self.address(base, offset)?;
                let source = self.to_register(source)?;
                self.store(Width::Word, source, address);
                Ok(())
            }
            Access::Const(_) => {
                Err(InternalError::InvalidDestination(format!("{destination:?}")))
            }
        }
    }

    fn store(&mut self, width: Width, source: Temp, Address { base, offset }: Address) {
        self.emit(InstructionKind::Store {
            width,
            source,
            base,
            offset,
        });
    }

    /// Runs `generate` into a fresh temp when `destination` is in memory, then
    /// stores the temp
    fn through_register(
        &mut self,
        destination: &Access,
        generate: impl FnOnce(&mut Self, Temp) -> Result<(), InternalError>,
    ) -> Result<(), InternalError> {
        match destination {
            Access::Temp(destination) => generate(self, *destination),
            Access::Memory { .. } => {
                let temp = self.new_temp();
                generate(self, temp)?;
                self.generate_move(destination, &Access::Temp(temp))
            }
            Access::Const(_) => {
                Err(InternalError::InvalidDestination(format!("{destination:?}")))
            }
        }
    }

    fn generate_binary(
        &mut self,
        operator: BinaryOperator,
        lhs: &Access,
        rhs: &Access,
        destination: &Access,
    ) -> Result<(), InternalError> {
        self.through_register(destination, |this, destination| {
            match (operator, lhs, rhs) {
                (BinaryOperator::Add, Access::Temp(source), Access::Const(constant))
                    if !constant.is_address() =>
                {
                    let immediate = Immediate::Int(this.constant(*constant)?);
                    this.emit(InstructionKind::AddImmediate {
                        destination,
                        source: *source,
                        immediate,
                    });
                }
                (BinaryOperator::Sub, Access::Temp(source), Access::Const(constant))
                    if !constant.is_address() =>
                {
                    let immediate = Immediate::Int(this.constant(*constant)?.wrapping_neg());
                    this.emit(InstructionKind::AddImmediate {
                        destination,
                        source: *source,
                        immediate,
                    });
                }
                (BinaryOperator::Lt, Access::Temp(source), Access::Const(constant))
                    if !constant.is_address() =>
                {
                    let immediate = this.constant(*constant)?;
                    this.emit(InstructionKind::SetLessThanImmediate {
                        destination,
                        source: *source,
                        immediate,
                    });
                }
                // Addition commutes, so the constant can move to the immediate
                (BinaryOperator::Add, Access::Const(constant), Access::Temp(_))
                    if !constant.is_address() =>
                {
                    return this.generate_binary(operator, rhs, lhs, &Access::Temp(destination));
                }
                _ => {
                    let lhs = this.to_register(lhs)?;
                    let rhs = this.to_register(rhs)?;
                    this.emit(InstructionKind::Arithmetic {
                        operator: arithmetic_operator(operator),
                        destination,
                        lhs,
                        rhs,
                    });
                }
            }
            Ok(())
        })
    }

    fn generate_negation(
        &mut self,
        operand: &Access,
        destination: &Access,
    ) -> Result<(), InternalError> {
        self.through_register(destination, |this, destination| {
            let kind = match operand {
                Access::Const(constant) if *constant != Const::Int(0) => {
                    InstructionKind::LoadImmediate {
                        destination,
                        immediate: this.constant(*constant)?.wrapping_neg(),
                    }
                }
                _ => InstructionKind::Negate {
                    destination,
                    source: this.to_register(operand)?,
                },
            };
            this.emit(kind);
            Ok(())
        })
    }

    /// The caller pushes a word, moves the arguments into the callee's
    /// parameter temps, saves `$fp`, `$ra` and the callee's static link, then
    /// grows the stack by the callee's frame before jumping. Everything is
    /// undone in reverse after the return label.
    fn generate_call(
        &mut self,
        target: Label,
        arguments: &[Access],
        destination: Option<&Access>,
    ) -> Result<(), InternalError> {
        let callee = *self
            .entries
            .get(&target)
            .ok_or(InternalError::UndefinedLabel(target))?;
        let Registers { fp, sp, ra, .. } = self.registers;
        let display = self.frames[callee].display;

        let return_label = Label::new();
        self.frames[callee].returns.push(return_label);

        let save = self
            .ir
            .call_graph
            .is_loop_edge(self.frame, callee)
            .then(|| self.placeholder(InstructionKind::SavePlaceholder));

        self.emit(InstructionKind::AddImmediate {
            destination: sp,
            source: sp,
            immediate: Immediate::Int(-WORD_LENGTH),
        });

        let params = self.frames[callee].params.clone();
        for (param, argument) in params.into_iter().zip(arguments) {
            self.transfer(param, argument)?;
        }

        let stack = |offset| Address { base: sp, offset };
        self.store(Width::Word, fp, stack(0));
        self.store(Width::Word, ra, stack(-WORD_LENGTH));
        self.store(Width::Word, display, stack(-2 * WORD_LENGTH));
        self.emit(InstructionKind::Move {
            destination: display,
            source: sp,
        });
        self.emit(InstructionKind::Move {
            destination: fp,
            source: sp,
        });
        self.emit_in(
            callee,
            InstructionKind::AddImmediate {
                destination: sp,
                source: sp,
                immediate: Immediate::NegatedFrameSize(callee),
            },
        );
        self.emit_in(
            callee,
            InstructionKind::JumpAndLink {
                target,
                return_address: ra,
            },
        );

        self.label(return_label);
        self.emit_in(
            callee,
            InstructionKind::AddImmediate {
                destination: sp,
                source: sp,
                immediate: Immediate::FrameSize(callee),
            },
        );
        self.emit_in(
            callee,
            InstructionKind::Load {
                width: Width::Word,
                destination: fp,
                base: sp,
                offset: 0,
            },
        );
        for (destination, offset) in [(display, -2 * WORD_LENGTH), (ra, -WORD_LENGTH)] {
            self.emit(InstructionKind::Load {
                width: Width::Word,
                destination,
                base: sp,
                offset,
            });
        }

        if let (Some(destination), Some(value)) = (destination, self.frames[callee].return_value) {
            match destination {
                Access::Temp(destination) => self.transfer(*destination, &Access::Temp(value))?,
                _ => self.generate_move(destination, &Access::Temp(value))?,
            }
        }

        self.emit(InstructionKind::AddImmediate {
            destination: sp,
            source: sp,
            immediate: Immediate::Int(WORD_LENGTH),
        });

        if let Some(save) = save {
            let restore = self.placeholder(InstructionKind::RestorePlaceholder);
            self.call_saves.push(CallSave {
                frame: self.frame,
                save,
                restore,
            });
        }

        Ok(())
    }

    fn placeholder(&mut self, kind: InstructionKind) -> usize {
        let index = self.instructions.len();
        self.emit(kind);
        index
    }

    fn syscall(&mut self, service: Service) {
        let Registers { v0, a0, a1, .. } = self.registers;
        self.emit(InstructionKind::LoadImmediate {
            destination: v0,
            immediate: service.code(),
        });
        self.emit(InstructionKind::Syscall {
            service,
            v0,
            a0,
            a1,
        });
    }
}

fn arithmetic_operator(operator: BinaryOperator) -> ArithmeticOperator {
    match operator {
        BinaryOperator::Add => ArithmeticOperator::Add,
        BinaryOperator::Sub => ArithmeticOperator::Sub,
        BinaryOperator::Mul => ArithmeticOperator::Mul,
        BinaryOperator::Div => ArithmeticOperator::Div,
        BinaryOperator::Eq => ArithmeticOperator::Seq,
        BinaryOperator::Neq => ArithmeticOperator::Sne,
        BinaryOperator::Lt => ArithmeticOperator::Slt,
        BinaryOperator::Leq => ArithmeticOperator::Sle,
        BinaryOperator::Gt => ArithmeticOperator::Sgt,
        BinaryOperator::Geq => ArithmeticOperator::Sge,
    }
}

fn branch_condition(condition: Condition) -> BranchCondition {
    match condition {
        Condition::Eq => BranchCondition::Beq,
        Condition::Neq => BranchCondition::Bne,
        Condition::Lt => BranchCondition::Blt,
        Condition::Leq => BranchCondition::Ble,
        Condition::Gt => BranchCondition::Bgt,
        Condition::Geq => BranchCondition::Bge,
    }
}
