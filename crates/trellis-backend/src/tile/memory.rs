//! Addressing modes. A load or store address is folded into a single
//! `[base + index * scale + displacement]` operand whenever its shape allows,
//! instead of computing it into a register first.

use trellis_common::asm::{Displacement, Memory, Reg, Scale};
use trellis_common::ir::{Expr, Expression, Operator};

use super::{cheapest, small_constant, Tiled, Tiler};

/// How deep a sum is flattened into address terms.
const SUM_DEPTH: usize = 2;

impl Tiler<'_> {
    /// Tile an address into a memory operand. This always succeeds: when no
    /// addressing form fits, the address is computed into a register.
    pub(super) fn tile_memory(&mut self, address: &Expr) -> Tiled<Memory> {
        match address.as_ref() {
            Expression::Const(value) => {
                if let Ok(value) = i32::try_from(*value) {
                    return Tiled::new(Vec::new(), Memory::constant(value));
                }
            }

            Expression::Name(name) => return Tiled::new(Vec::new(), Memory::global(name.clone())),
            Expression::Temp(name) => return Tiled::new(Vec::new(), Memory::reg(Reg::temp(name.clone()))),
            Expression::Mem(_) | Expression::Op(..) => {}
        }

        let in_register = self.tile_expr(address).map(Memory::reg);
        match self.tile_address(address) {
            Some(folded) => cheapest(folded, [in_register]),
            None => in_register,
        }
    }

    /// Fold a sum of at most a base, a scaled index and a constant into one
    /// operand. Returns `None` for anything that is not such a sum, including
    /// plain leaves.
    pub(super) fn tile_address(&mut self, expr: &Expr) -> Option<Tiled<Memory>> {
        if !matches!(expr.as_ref(), Expression::Op(Operator::Add | Operator::Mul, _, _)) {
            return None;
        }

        let mut terms = Vec::new();
        collect_terms(expr, SUM_DEPTH, &mut terms);

        let mut displacement = None;
        let mut scaled = None;
        let mut others = Vec::new();

        for term in terms {
            if displacement.is_none() {
                if let Some(value) = small_constant(term) {
                    displacement = Some(value);
                    continue;
                }
            }

            if scaled.is_none() {
                if let Some(index) = as_scaled(term) {
                    scaled = Some(index);
                    continue;
                }
            }

            others.push(term);
        }

        let registers = others.len() + usize::from(scaled.is_some());
        if registers > 2 || (registers < 2 && scaled.is_none() && displacement.is_none()) {
            return None;
        }

        let mut instructions = Vec::new();
        let mut regs = Vec::new();
        for term in others {
            let tiled = self.tile_expr(term);
            instructions.extend(tiled.instructions);
            regs.push(tiled.value);
        }

        let mut regs = regs.into_iter();
        let (base, index) = match scaled {
            Some((index, scale)) => {
                let tiled = self.tile_expr(index);
                instructions.extend(tiled.instructions);
                (regs.next(), Some((tiled.value, scale)))
            }
            None => {
                let base = regs.next();
                (base, regs.next().map(|index| (index, Scale::One)))
            }
        };

        let displacement = displacement.map_or(Displacement::None, Displacement::Const);
        Some(Tiled::new(instructions, Memory::new(base, index, displacement)))
    }
}

fn collect_terms<'e>(expr: &'e Expr, depth: usize, terms: &mut Vec<&'e Expr>) {
    match expr.as_ref() {
        Expression::Op(Operator::Add, e1, e2) if depth > 0 => {
            collect_terms(e1, depth - 1, terms);
            collect_terms(e2, depth - 1, terms);
        }
        _ => terms.push(expr),
    }
}

/// `e * s` or `s * e` for a scale the address unit supports.
fn as_scaled(expr: &Expr) -> Option<(&Expr, Scale)> {
    let Expression::Op(Operator::Mul, e1, e2) = expr.as_ref() else {
        return None;
    };

    if let Some(scale) = e2.as_const().and_then(Scale::from_factor) {
        return Some((e1, scale));
    }

    e1.as_const()
        .and_then(Scale::from_factor)
        .map(|scale| (e2, scale))
}
