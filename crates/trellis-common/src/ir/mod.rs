//! The tree IR. Expressions are immutable and reference counted, so the same
//! subexpression may be shared between several statements; passes that care
//! about sharing key on [`Rc::as_ptr`], everything else compares structurally.

pub mod pretty;


use std::rc::Rc;

pub type Expr = Rc<Expression>;

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Expression {
    Const(i64),
    /// The address of a global or a function.
    Name(String),
    Temp(String),
    /// A load of the word at the given address.
    Mem(Expr),
    Op(Operator, Expr, Expr),
}

impl Expression {
    pub fn constant(value: i64) -> Expr {
        Rc::new(Self::Const(value))
    }

    pub fn name(name: impl Into<String>) -> Expr {
        Rc::new(Self::Name(name.into()))
    }

    pub fn temp(name: impl Into<String>) -> Expr {
        Rc::new(Self::Temp(name.into()))
    }

    pub fn mem(address: Expr) -> Expr {
        Rc::new(Self::Mem(address))
    }

    pub fn op(op: Operator, e1: Expr, e2: Expr) -> Expr {
        Rc::new(Self::Op(op, e1, e2))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Self::Const(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_temp(&self, name: &str) -> bool {
        matches!(self, Self::Temp(temp) if temp == name)
    }

    /// Does the temporary `name` occur anywhere in this expression?
    pub fn uses_temp(&self, name: &str) -> bool {
        match self {
            Self::Const(_) | Self::Name(_) => false,
            Self::Temp(temp) => temp == name,
            Self::Mem(address) => address.uses_temp(name),
            Self::Op(_, e1, e2) => e1.uses_temp(name) || e2.uses_temp(name),
        }
    }

    /// Could evaluating this expression fail? Only a division or remainder
    /// by something other than a nonzero constant can.
    pub fn may_trap(&self) -> bool {
        match self {
            Self::Const(_) | Self::Name(_) | Self::Temp(_) => false,
            Self::Mem(address) => address.may_trap(),
            Self::Op(op, e1, e2) => {
                let divides = matches!(op, Operator::Div | Operator::Mod)
                    && matches!(e2.as_const(), None | Some(0));
                divides || e1.may_trap() || e2.may_trap()
            }
        }
    }

    /// Does this expression read memory anywhere?
    pub fn reads_memory(&self) -> bool {
        match self {
            Self::Const(_) | Self::Name(_) | Self::Temp(_) => false,
            Self::Mem(_) => true,
            Self::Op(_, e1, e2) => e1.reads_memory() || e2.reads_memory(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Xor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Xor => "^",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne
        )
    }

    pub fn is_commutative(&self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Xor | Self::Eq | Self::Ne)
    }

    /// The comparison that holds exactly when this one does not.
    pub fn negated(&self) -> Option<Operator> {
        Some(match self {
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            _ => return None,
        })
    }

    /// Evaluate the operator on two known values. Returns `None` for a zero
    /// divisor, which must be left for the runtime to report.
    pub fn apply(&self, a: i64, b: i64) -> Option<i64> {
        Some(match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            Self::Mod => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            Self::Xor => a ^ b,
            Self::Lt => (a < b) as i64,
            Self::Le => (a <= b) as i64,
            Self::Gt => (a > b) as i64,
            Self::Ge => (a >= b) as i64,
            Self::Eq => (a == b) as i64,
            Self::Ne => (a != b) as i64,
        })
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Statement {
    MoveTemp(String, Expr),
    /// Store `source` to the word at `address`.
    MoveMem { address: Expr, source: Expr },
    Jump(String),
    Label(String),
    Call {
        function: Expr,
        args: Vec<Expr>,
        collector: Option<String>,
    },
    Return(Option<Expr>),
    /// Jump to the label if the condition is nonzero, otherwise continue with
    /// the next statement.
    CJumpFallThrough(Expr, String),
    /// Only valid before scheduling.
    CJump {
        condition: Expr,
        on_true: String,
        on_false: String,
    },
}

impl Statement {
    pub fn move_temp(temp: impl Into<String>, source: Expr) -> Self {
        Self::MoveTemp(temp.into(), source)
    }

    pub fn jump(label: impl Into<String>) -> Self {
        Self::Jump(label.into())
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    pub fn cjump(condition: Expr, on_true: impl Into<String>, on_false: impl Into<String>) -> Self {
        Self::CJump {
            condition,
            on_true: on_true.into(),
            on_false: on_false.into(),
        }
    }

    /// Does control never continue to the next statement?
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Jump(_) | Self::CJump { .. } | Self::Return(_))
    }

    /// Every label this statement may transfer control to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Jump(label) | Self::CJumpFallThrough(_, label) => vec![label.as_str()],
            Self::CJump {
                on_true, on_false, ..
            } => vec![on_false.as_str(), on_true.as_str()],
            _ => vec![],
        }
    }

    /// The temporary this statement writes, if any.
    pub fn defined_temp(&self) -> Option<&str> {
        match self {
            Self::MoveTemp(temp, _) => Some(temp),
            Self::Call { collector, .. } => collector.as_deref(),
            _ => None,
        }
    }

    /// The expressions this statement evaluates, in evaluation order.
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Self::MoveTemp(_, source) => vec![source],
            Self::MoveMem { address, source } => vec![address, source],
            Self::Call { function, args, .. } => {
                std::iter::once(function).chain(args.iter()).collect()
            }
            Self::Return(value) => value.iter().collect(),
            Self::CJumpFallThrough(condition, _) | Self::CJump { condition, .. } => {
                vec![condition]
            }
            Self::Jump(_) | Self::Label(_) => vec![],
        }
    }

    /// Rebuild this statement with every top-level expression passed through
    /// `f`.
    pub fn map_expressions(&self, mut f: impl FnMut(&Expr) -> Expr) -> Self {
        match self {
            Self::MoveTemp(temp, source) => Self::MoveTemp(temp.clone(), f(source)),
            Self::MoveMem { address, source } => {
                let address = f(address);
                let source = f(source);
                Self::MoveMem { address, source }
            }
            Self::Call {
                function,
                args,
                collector,
            } => {
                let function = f(function);
                let args = args.iter().map(&mut f).collect();
                Self::Call {
                    function,
                    args,
                    collector: collector.clone(),
                }
            }
            Self::Return(value) => Self::Return(value.as_ref().map(f)),
            Self::CJumpFallThrough(condition, label) => {
                Self::CJumpFallThrough(f(condition), label.clone())
            }
            Self::CJump {
                condition,
                on_true,
                on_false,
            } => Self::CJump {
                condition: f(condition),
                on_true: on_true.clone(),
                on_false: on_false.clone(),
            },
            Self::Jump(_) | Self::Label(_) => self.clone(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub has_return: bool,
    pub body: Vec<Statement>,
}

/// A string constant. In memory it is a length word followed by one word per
/// character.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompilationUnit {
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
}

impl CompilationUnit {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}
