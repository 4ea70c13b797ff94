//! Instruction selection by dynamic programming over the tree IR.
//!
//! Every node is covered by the cheapest of the tiles that apply to it. A
//! tile either produces a full instruction sequence or does not apply at all,
//! and the results for expressions are memoized per node, so a subtree shared
//! between several parents is only tiled once. The produced assembly still
//! refers to the IR temporaries and to fresh abstract registers; register
//! allocation replaces both.

mod memory;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use trellis_common::asm::{
    Arg, BinaryOp, CallTarget, ConstOrReg, Instruction, JumpKind, Memory, Reg, RegOrMem,
    Register,
};
use trellis_common::ir::{Expr, Expression, Function, Operator, Statement};
use trellis_common::names::{epilogue_label, ResourceAllocator};

/// Instructions computing a value, and where that value ends up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tiled<T> {
    pub instructions: Vec<Instruction>,
    pub value: T,
}

impl<T> Tiled<T> {
    pub fn new(instructions: Vec<Instruction>, value: T) -> Self {
        Self {
            instructions,
            value,
        }
    }

    pub fn cost(&self) -> usize {
        cost(&self.instructions)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tiled<U> {
        Tiled {
            instructions: self.instructions,
            value: f(self.value),
        }
    }
}

/// The cost of a sequence of instructions. Labels, comments and the unary
/// operations are free, multiplication and division are expensive.
pub fn cost(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .map(|instruction| match instruction {
            Instruction::Label(_) | Instruction::Comment(_) => 0,
            Instruction::Neg(_) | Instruction::Inc(_) | Instruction::Dec(_) => 0,
            Instruction::Shl { .. } => 0,
            Instruction::IMul { .. } | Instruction::IMulImmediate { .. } | Instruction::IDiv(_) => 4,
            Instruction::Lea { .. } => 2,
            _ => 1,
        })
        .sum()
}

/// Keep the cheapest candidate. Ties go to the earliest one.
fn cheapest<T>(first: Tiled<T>, rest: impl IntoIterator<Item = Tiled<T>>) -> Tiled<T> {
    let mut best = first;
    for candidate in rest {
        if candidate.cost() < best.cost() {
            best = candidate;
        }
    }
    best
}

/// Tile the body of a canonical function. Incoming arguments are moved into
/// the parameter temporaries first, and every return jumps to the epilogue
/// label at the very end.
pub fn tile_function(names: &mut ResourceAllocator, function: &Function) -> Vec<Instruction> {
    let mut instructions = Vec::new();

    for (index, param) in function.params.iter().enumerate() {
        let source: Arg = match Register::ARGUMENTS.get(index) {
            Some(reg) => (*reg).into(),
            None => {
                let above = index - Register::ARGUMENTS.len();
                Arg::Mem(Memory::reg_offset(
                    Register::Rbp.into(),
                    16 + 8 * above as i32,
                ))
            }
        };

        instructions.push(Instruction::mov(Reg::temp(param), source));
    }

    let epilogue = epilogue_label(&function.name);
    let mut tiler = Tiler::new(names);
    for statement in function.body.iter() {
        instructions.extend(tiler.tile_statement(statement, &epilogue));
    }

    instructions.push(Instruction::Label(epilogue));

    trace!(
        "tiled '{}' into {} instructions at cost {}",
        function.name,
        instructions.len(),
        cost(&instructions)
    );

    instructions
}

pub(crate) struct Tiler<'a> {
    names: &'a mut ResourceAllocator,
    /// The expression is kept alive next to its result so the pointer key is
    /// never reused for another node.
    memo: HashMap<*const Expression, (Expr, Tiled<Reg>)>,
}

impl<'a> Tiler<'a> {
    pub fn new(names: &'a mut ResourceAllocator) -> Self {
        Self {
            names,
            memo: HashMap::new(),
        }
    }

    fn fresh(&mut self) -> Reg {
        Reg::Temp(self.names.allocate_register())
    }

    pub fn tile_statement(&mut self, statement: &Statement, epilogue: &str) -> Vec<Instruction> {
        let mut instructions = match statement {
            Statement::Label(_) | Statement::Jump(_) => Vec::new(),
            statement => vec![Instruction::comment(statement.to_string())],
        };

        match statement {
            Statement::MoveTemp(dest, source) => {
                instructions.extend(self.tile_move_temp(dest, source).instructions);
            }

            Statement::MoveMem { address, source } => {
                let memory = self.tile_memory(address);
                let source = self.tile_const_or_reg(source);
                instructions.extend(memory.instructions);
                instructions.extend(source.instructions);
                instructions.push(Instruction::MoveToMemory {
                    dest: memory.value,
                    src: source.value,
                });
            }

            Statement::Jump(label) => instructions.push(Instruction::jump(label.clone())),
            Statement::Label(label) => instructions.push(Instruction::Label(label.clone())),

            Statement::Call {
                function,
                args,
                collector,
            } => instructions.extend(self.tile_call(function, args, collector.as_deref())),

            Statement::Return(value) => {
                if let Some(value) = value {
                    let value = self.tile_arg(value);
                    instructions.extend(value.instructions);
                    instructions.push(Instruction::mov(Register::Rax, value.value));
                }

                instructions.push(Instruction::jump(epilogue));
            }

            Statement::CJumpFallThrough(condition, label) => {
                instructions.extend(self.tile_conditional_jump(condition, label));
            }

            Statement::CJump { .. } => {
                panic!("inconsistency: two-target conditional jump reached instruction selection")
            }
        }

        instructions
    }

    /// Tile an expression into a register.
    pub fn tile_expr(&mut self, expr: &Expr) -> Tiled<Reg> {
        let key = Rc::as_ptr(expr);
        if let Some((_, tiled)) = self.memo.get(&key) {
            return tiled.clone();
        }

        let tiled = match expr.as_ref() {
            Expression::Const(value) => {
                let reg = self.fresh();
                Tiled::new(vec![load_constant(reg.clone(), *value)], reg)
            }

            Expression::Name(name) => {
                let reg = self.fresh();
                let lea = Instruction::Lea {
                    dest: reg.clone(),
                    src: Memory::global(name.clone()),
                };
                Tiled::new(vec![lea], reg)
            }

            Expression::Temp(name) => Tiled::new(Vec::new(), Reg::temp(name.clone())),

            Expression::Mem(address) => {
                let memory = self.tile_memory(address);
                let reg = self.fresh();
                let mut instructions = memory.instructions;
                instructions.push(Instruction::mov(reg.clone(), Arg::Mem(memory.value)));
                Tiled::new(instructions, reg)
            }

            Expression::Op(op, e1, e2) => self.tile_op(expr, *op, e1, e2),
        };

        self.memo.insert(key, (expr.clone(), tiled.clone()));
        tiled
    }

    fn tile_const_or_reg(&mut self, expr: &Expr) -> Tiled<ConstOrReg> {
        match small_constant(expr) {
            Some(value) => Tiled::new(Vec::new(), ConstOrReg::Const(value)),
            None => self.tile_expr(expr).map(ConstOrReg::Reg),
        }
    }

    fn tile_reg_or_mem(&mut self, expr: &Expr) -> Tiled<RegOrMem> {
        match expr.as_ref() {
            Expression::Mem(address) => self.tile_memory(address).map(RegOrMem::Mem),
            _ => self.tile_expr(expr).map(RegOrMem::Reg),
        }
    }

    fn tile_arg(&mut self, expr: &Expr) -> Tiled<Arg> {
        if let Some(value) = small_constant(expr) {
            return Tiled::new(Vec::new(), Arg::Const(value));
        }

        match expr.as_ref() {
            Expression::Mem(address) => self.tile_memory(address).map(Arg::Mem),
            _ => self.tile_expr(expr).map(Arg::Reg),
        }
    }

    fn tile_op(&mut self, expr: &Expr, op: Operator, e1: &Expr, e2: &Expr) -> Tiled<Reg> {
        let generic = self.generic_op(op, e1, e2);

        let mut candidates = Vec::new();
        if op.is_commutative() {
            candidates.push(self.generic_op(op, e2, e1));
        }

        candidates.extend(self.multiply_by_immediate(op, e1, e2));
        candidates.extend(self.op_by_lea(expr));
        candidates.extend(self.multiply_by_shift(op, e1, e2));

        cheapest(generic, candidates)
    }

    fn generic_op(&mut self, op: Operator, e1: &Expr, e2: &Expr) -> Tiled<Reg> {
        let reg = self.fresh();

        let instructions = match op {
            Operator::Add | Operator::Sub | Operator::Xor => {
                let left = self.tile_expr(e1);
                let right = self.tile_arg(e2);

                let mut instructions = left.instructions;
                instructions.extend(right.instructions);
                instructions.push(Instruction::mov(reg.clone(), left.value));
                instructions.push(Instruction::BinaryRegister {
                    op: binary(op),
                    dest: reg.clone(),
                    src: right.value,
                });
                instructions
            }

            Operator::Mul => {
                let left = self.tile_expr(e1);
                let right = self.tile_reg_or_mem(e2);

                let mut instructions = left.instructions;
                instructions.extend(right.instructions);
                instructions.push(Instruction::mov(reg.clone(), left.value));
                instructions.push(Instruction::IMul {
                    dest: reg.clone(),
                    src: right.value,
                });
                instructions
            }

            Operator::Div | Operator::Mod => {
                let dividend = self.tile_arg(e1);
                let divisor = self.tile_reg_or_mem(e2);
                let result = if op == Operator::Div {
                    Register::Rax
                } else {
                    Register::Rdx
                };

                let mut instructions = dividend.instructions;
                instructions.extend(divisor.instructions);
                instructions.push(Instruction::mov(Register::Rax, dividend.value));
                instructions.push(Instruction::Cqo);
                instructions.push(Instruction::IDiv(divisor.value));
                instructions.push(Instruction::mov(reg.clone(), result));
                instructions
            }

            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge | Operator::Eq | Operator::Ne => {
                let (mut instructions, compare) = self.compare(e1, e2);
                instructions.push(compare);
                instructions.push(Instruction::SetOnFlag {
                    kind: condition(op),
                    reg: Register::Rax.into(),
                });
                instructions.push(Instruction::mov(reg.clone(), Register::Rax));
                instructions
            }
        };

        Tiled::new(instructions, reg)
    }

    /// `imul r, e, c` for a constant that fits an immediate.
    fn multiply_by_immediate(&mut self, op: Operator, e1: &Expr, e2: &Expr) -> Option<Tiled<Reg>> {
        if op != Operator::Mul {
            return None;
        }

        let (value, factor) = split_constant(e1, e2)?;
        let immediate = i32::try_from(factor).ok()?;

        let source = self.tile_reg_or_mem(value);
        let reg = self.fresh();
        let mut instructions = source.instructions;
        instructions.push(Instruction::IMulImmediate {
            dest: reg.clone(),
            src: source.value,
            immediate,
        });

        Some(Tiled::new(instructions, reg))
    }

    /// Sums and scaled sums computed by the address unit.
    fn op_by_lea(&mut self, expr: &Expr) -> Option<Tiled<Reg>> {
        let address = self.tile_address(expr)?;
        let reg = self.fresh();
        let mut instructions = address.instructions;
        instructions.push(Instruction::Lea {
            dest: reg.clone(),
            src: address.value,
        });

        Some(Tiled::new(instructions, reg))
    }

    fn multiply_by_shift(&mut self, op: Operator, e1: &Expr, e2: &Expr) -> Option<Tiled<Reg>> {
        if op != Operator::Mul {
            return None;
        }

        let (value, factor) = split_constant(e1, e2)?;
        let count = log_two(factor)?;

        let value = self.tile_expr(value);
        let reg = self.fresh();
        let mut instructions = value.instructions;
        instructions.push(Instruction::mov(reg.clone(), value.value));
        instructions.push(Instruction::Shl {
            dest: RegOrMem::Reg(reg.clone()),
            count,
        });

        Some(Tiled::new(instructions, reg))
    }

    fn compare(&mut self, e1: &Expr, e2: &Expr) -> (Vec<Instruction>, Instruction) {
        let left = self.tile_expr(e1);
        let mut instructions = left.instructions;

        let compare = match e2.as_ref() {
            Expression::Mem(address) => {
                let memory = self.tile_memory(address);
                instructions.extend(memory.instructions);
                Instruction::CmpMemory {
                    minuend: left.value,
                    subtrahend: memory.value,
                }
            }

            _ => {
                let right = self.tile_const_or_reg(e2);
                instructions.extend(right.instructions);
                Instruction::Cmp {
                    minuend: RegOrMem::Reg(left.value),
                    subtrahend: right.value,
                }
            }
        };

        (instructions, compare)
    }

    fn tile_move_temp(&mut self, dest: &str, source: &Expr) -> Tiled<()> {
        let target = Reg::temp(dest);
        let generic = self.move_generic(&target, source);

        let mut candidates = Vec::new();
        if let Expression::Op(op, e1, e2) = source.as_ref() {
            candidates.extend(self.move_by_lea(&target, source));
            candidates.extend(self.move_in_place(&target, dest, *op, e1, e2));
            candidates.extend(self.move_multiply_by_immediate(&target, *op, e1, e2));
            candidates.extend(self.move_negate(&target, dest, *op, e1, e2));
            candidates.extend(self.move_step(&target, dest, *op, e1, e2));
            candidates.extend(self.move_shift(&target, dest, *op, e1, e2));
        }

        cheapest(generic, candidates)
    }

    fn move_generic(&mut self, target: &Reg, source: &Expr) -> Tiled<()> {
        match source.as_ref() {
            Expression::Const(value) => {
                Tiled::new(vec![load_constant(target.clone(), *value)], ())
            }

            Expression::Name(name) => {
                let lea = Instruction::Lea {
                    dest: target.clone(),
                    src: Memory::global(name.clone()),
                };
                Tiled::new(vec![lea], ())
            }

            _ => {
                let value = self.tile_arg(source);
                let mut instructions = value.instructions;
                instructions.push(Instruction::mov(target.clone(), value.value));
                Tiled::new(instructions, ())
            }
        }
    }

    fn move_by_lea(&mut self, target: &Reg, source: &Expr) -> Option<Tiled<()>> {
        let address = self.tile_address(source)?;
        let mut instructions = address.instructions;
        instructions.push(Instruction::Lea {
            dest: target.clone(),
            src: address.value,
        });

        Some(Tiled::new(instructions, ()))
    }

    /// `t = t op e` as a single two-operand instruction.
    fn move_in_place(
        &mut self,
        target: &Reg,
        dest: &str,
        op: Operator,
        e1: &Expr,
        e2: &Expr,
    ) -> Option<Tiled<()>> {
        if !matches!(op, Operator::Add | Operator::Sub | Operator::Xor | Operator::Mul) {
            return None;
        }

        let other = if e1.is_temp(dest) {
            e2
        } else if op.is_commutative() && e2.is_temp(dest) {
            e1
        } else {
            return None;
        };

        let tiled = if op == Operator::Mul {
            let source = self.tile_reg_or_mem(other);
            let mut instructions = source.instructions;
            instructions.push(Instruction::IMul {
                dest: target.clone(),
                src: source.value,
            });
            instructions
        } else {
            let source = self.tile_arg(other);
            let mut instructions = source.instructions;
            instructions.push(Instruction::BinaryRegister {
                op: binary(op),
                dest: target.clone(),
                src: source.value,
            });
            instructions
        };

        Some(Tiled::new(tiled, ()))
    }

    fn move_multiply_by_immediate(
        &mut self,
        target: &Reg,
        op: Operator,
        e1: &Expr,
        e2: &Expr,
    ) -> Option<Tiled<()>> {
        if op != Operator::Mul {
            return None;
        }

        let (value, factor) = split_constant(e1, e2)?;
        let immediate = i32::try_from(factor).ok()?;

        let source = self.tile_reg_or_mem(value);
        let mut instructions = source.instructions;
        instructions.push(Instruction::IMulImmediate {
            dest: target.clone(),
            src: source.value,
            immediate,
        });

        Some(Tiled::new(instructions, ()))
    }

    /// `t = 0 - t`, `t = t * -1` and `t = -1 * t`.
    fn move_negate(
        &mut self,
        target: &Reg,
        dest: &str,
        op: Operator,
        e1: &Expr,
        e2: &Expr,
    ) -> Option<Tiled<()>> {
        let negates = match op {
            Operator::Sub => e1.as_const() == Some(0) && e2.is_temp(dest),
            Operator::Mul => {
                (e1.is_temp(dest) && e2.as_const() == Some(-1))
                    || (e1.as_const() == Some(-1) && e2.is_temp(dest))
            }
            _ => false,
        };

        negates.then(|| Tiled::new(vec![Instruction::Neg(RegOrMem::Reg(target.clone()))], ()))
    }

    /// `t = t + 1`, `t = 1 + t` and `t = t - 1`, along with their negated
    /// forms.
    fn move_step(
        &mut self,
        target: &Reg,
        dest: &str,
        op: Operator,
        e1: &Expr,
        e2: &Expr,
    ) -> Option<Tiled<()>> {
        let step = match op {
            Operator::Add if e1.is_temp(dest) => e2.as_const()?,
            Operator::Add if e2.is_temp(dest) => e1.as_const()?,
            Operator::Sub if e1.is_temp(dest) => e2.as_const()?.checked_neg()?,
            _ => return None,
        };

        let dest = RegOrMem::Reg(target.clone());
        let instruction = match step {
            1 => Instruction::Inc(dest),
            -1 => Instruction::Dec(dest),
            _ => return None,
        };

        Some(Tiled::new(vec![instruction], ()))
    }

    fn move_shift(
        &mut self,
        target: &Reg,
        dest: &str,
        op: Operator,
        e1: &Expr,
        e2: &Expr,
    ) -> Option<Tiled<()>> {
        if op != Operator::Mul {
            return None;
        }

        let (value, factor) = split_constant(e1, e2)?;
        let count = log_two(factor)?;
        if !value.is_temp(dest) {
            return None;
        }

        let shift = Instruction::Shl {
            dest: RegOrMem::Reg(target.clone()),
            count,
        };
        Some(Tiled::new(vec![shift], ()))
    }

    fn tile_call(&mut self, function: &Expr, args: &[Expr], collector: Option<&str>) -> Vec<Instruction> {
        let mut instructions = Vec::new();

        let target = match function.as_ref() {
            Expression::Name(name) => CallTarget::Function(name.clone()),
            _ => {
                let target = self.tile_reg_or_mem(function);
                instructions.extend(target.instructions);
                CallTarget::Indirect(target.value)
            }
        };

        // every argument is computed before any argument register is written,
        // since computing one may clobber the registers of another
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.tile_arg(arg);
            instructions.extend(value.instructions);
            values.push(value.value);
        }

        let in_registers = Register::ARGUMENTS.len().min(values.len());
        let on_stack = values.len() - in_registers;
        let padding = on_stack % 2;

        if padding == 1 {
            instructions.push(Instruction::BinaryRegister {
                op: BinaryOp::Sub,
                dest: Register::Rsp.into(),
                src: Arg::Const(8),
            });
        }

        for value in values[in_registers..].iter().rev() {
            instructions.push(Instruction::Push(value.clone()));
        }

        for (reg, value) in Register::ARGUMENTS.iter().zip(values) {
            instructions.push(Instruction::mov(*reg, value));
        }

        instructions.push(Instruction::Call(target));

        if let Some(collector) = collector {
            instructions.push(Instruction::mov(Reg::temp(collector), Register::Rax));
        }

        let popped = on_stack + padding;
        if popped > 0 {
            instructions.push(Instruction::BinaryRegister {
                op: BinaryOp::Add,
                dest: Register::Rsp.into(),
                src: Arg::Const(8 * popped as i32),
            });
        }

        instructions
    }

    fn tile_conditional_jump(&mut self, condition_expr: &Expr, label: &str) -> Vec<Instruction> {
        if let Expression::Op(op, e1, e2) = condition_expr.as_ref() {
            if op.is_comparison() {
                let (mut instructions, compare) = self.compare(e1, e2);
                instructions.push(compare);
                instructions.push(Instruction::Jump {
                    kind: condition(*op),
                    label: label.into(),
                });
                return instructions;
            }
        }

        let value = self.tile_reg_or_mem(condition_expr);
        let mut instructions = value.instructions;
        instructions.push(Instruction::Cmp {
            minuend: value.value,
            subtrahend: ConstOrReg::Const(0),
        });
        instructions.push(Instruction::Jump {
            kind: JumpKind::Jnz,
            label: label.into(),
        });
        instructions
    }
}

fn load_constant(dest: Reg, value: i64) -> Instruction {
    match i32::try_from(value) {
        Ok(value) => Instruction::mov(dest, Arg::Const(value)),
        Err(_) => Instruction::MoveLong { dest, value },
    }
}

/// A constant that fits a 32 bit immediate.
fn small_constant(expr: &Expr) -> Option<i32> {
    expr.as_const()
        .and_then(|value| i32::try_from(value).ok())
}

/// Split a product or sum into its non-constant side and its constant,
/// preferring a constant on the right.
fn split_constant<'e>(e1: &'e Expr, e2: &'e Expr) -> Option<(&'e Expr, i64)> {
    match (e1.as_const(), e2.as_const()) {
        (_, Some(value)) => Some((e1, value)),
        (Some(value), None) => Some((e2, value)),
        (None, None) => None,
    }
}

/// The shift count for a power of two greater than one.
fn log_two(value: i64) -> Option<u8> {
    (value > 1 && value & (value - 1) == 0).then(|| value.trailing_zeros() as u8)
}

fn binary(op: Operator) -> BinaryOp {
    match op {
        Operator::Add => BinaryOp::Add,
        Operator::Sub => BinaryOp::Sub,
        Operator::Xor => BinaryOp::Xor,
        _ => unreachable!("'{}' is not a two-operand instruction", op.symbol()),
    }
}

fn condition(op: Operator) -> JumpKind {
    match op {
        Operator::Lt => JumpKind::Jl,
        Operator::Le => JumpKind::Jle,
        Operator::Gt => JumpKind::Jg,
        Operator::Ge => JumpKind::Jge,
        Operator::Eq => JumpKind::Je,
        Operator::Ne => JumpKind::Jne,
        _ => unreachable!("'{}' is not a comparison", op.symbol()),
    }
}
