//! A reference interpreter for the tree IR.
//!
//! Memory is byte addressed and holds 8-byte words. Every global gets an
//! address: a string global is laid out as its length followed by one word per
//! character, and a string value points at the length. Functions get an address
//! too, so indirect calls through a computed address work.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{self, Display};

use log::trace;

use trellis_common::ir::{CompilationUnit, Expr, Expression, Function, Statement};

pub const MALLOC: &str = "_builtin_malloc";
pub const PRINTLN: &str = "_builtin_println";
pub const INT_TO_STRING: &str = "_builtin_intToString";
pub const STRING_TO_INT: &str = "_builtin_stringToInt";
pub const STRING_CONCAT: &str = "_builtin_stringConcat";
pub const THROW: &str = "_builtin_throw";

/// Is this the name of a function the runtime provides?
pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        MALLOC | PRINTLN | INT_TO_STRING | STRING_TO_INT | STRING_CONCAT | THROW
    )
}

const WORD: i64 = 8;
const HEAP_START: i64 = 0x1000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Outcome {
    /// The value returned by the entry function, if it returns one.
    pub value: Option<i64>,
    /// Everything printed, one line per `println`.
    pub output: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InterpretError {
    DivisionByZero,
    /// The program called the throwing builtin with this message.
    Thrown(String),
    UndefinedName(String),
    UndefinedLabel(String),
    /// A call to an address that holds no function.
    NotAFunction(i64),
    /// A load from a word never written.
    BadAddress(i64),
    BadString(String),
    /// An allocation of this many bytes does not fit in the address space.
    OutOfMemory(i64),
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },
    /// Control ran past the last statement of a function.
    FellOffEnd(String),
}

impl Error for InterpretError {}
impl Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::Thrown(message) => write!(f, "{message}"),
            Self::UndefinedName(name) => write!(f, "undefined name '{name}'"),
            Self::UndefinedLabel(label) => write!(f, "undefined label '{label}'"),
            Self::NotAFunction(address) => write!(f, "no function at address {address:#x}"),
            Self::BadAddress(address) => write!(f, "read of uninitialized memory at {address:#x}"),
            Self::BadString(text) => write!(f, "'{text}' is not a number"),
            Self::OutOfMemory(bytes) => write!(f, "could not allocate {bytes} bytes"),
            Self::ArityMismatch {
                function,
                expected,
                actual,
            } => write!(
                f,
                "'{function}' takes {expected} arguments but was given {actual}"
            ),
            Self::FellOffEnd(function) => write!(f, "control fell off the end of '{function}'"),
        }
    }
}

/// Run the function `entry` of the given unit without arguments.
pub fn interpret(unit: &CompilationUnit, entry: &str) -> Result<Outcome, InterpretError> {
    let mut machine = Machine::new(unit)?;
    let function = unit
        .function(entry)
        .ok_or_else(|| InterpretError::UndefinedName(entry.into()))?;

    let value = machine.call(function, Vec::new())?;
    Ok(Outcome {
        value: function.has_return.then_some(value),
        output: machine.output,
    })
}

struct Machine<'a> {
    globals: HashMap<&'a str, i64>,
    function_addresses: HashMap<i64, &'a Function>,

    memory: HashMap<i64, i64>,
    heap: i64,
    output: String,
}

impl<'a> Machine<'a> {
    pub fn new(unit: &'a CompilationUnit) -> Result<Self, InterpretError> {
        let mut this = Self {
            globals: HashMap::new(),
            function_addresses: HashMap::new(),
            memory: HashMap::new(),
            heap: HEAP_START,
            output: String::new(),
        };

        for global in unit.globals.iter() {
            let address = this.store_string(&global.content)?;
            this.globals.insert(global.name.as_str(), address);
        }

        for function in unit.functions.iter() {
            let address = this.allocate(WORD)?;
            this.globals.insert(function.name.as_str(), address);
            this.function_addresses.insert(address, function);
        }

        Ok(this)
    }

    fn call(&mut self, function: &'a Function, args: Vec<i64>) -> Result<i64, InterpretError> {
        if function.params.len() != args.len() {
            return Err(InterpretError::ArityMismatch {
                function: function.name.clone(),
                expected: function.params.len(),
                actual: args.len(),
            });
        }

        trace!("entering '{}' with {args:?}", function.name);

        let mut frame: HashMap<&str, i64> = function
            .params
            .iter()
            .map(String::as_str)
            .zip(args)
            .collect();

        let labels: HashMap<&str, usize> = function
            .body
            .iter()
            .enumerate()
            .filter_map(|(index, statement)| match statement {
                Statement::Label(label) => Some((label.as_str(), index)),
                _ => None,
            })
            .collect();

        let goto = |label: &str| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| InterpretError::UndefinedLabel(label.into()))
        };

        let mut pc = 0;
        while let Some(statement) = function.body.get(pc) {
            pc += 1;

            match statement {
                Statement::MoveTemp(temp, source) => {
                    let value = self.eval(&frame, source)?;
                    frame.insert(temp.as_str(), value);
                }

                Statement::MoveMem { address, source } => {
                    let address = self.eval(&frame, address)?;
                    let value = self.eval(&frame, source)?;
                    self.memory.insert(address, value);
                }

                Statement::Jump(label) => pc = goto(label.as_str())?,
                Statement::Label(_) => {}

                Statement::Call {
                    function: target,
                    args,
                    collector,
                } => {
                    let args = args
                        .iter()
                        .map(|arg| self.eval(&frame, arg))
                        .collect::<Result<Vec<_>, _>>()?;

                    let result = match target.as_ref() {
                        Expression::Name(name) if is_builtin(name) => self.builtin(name, &args)?,
                        _ => {
                            let address = self.eval(&frame, target)?;
                            let callee = self
                                .function_addresses
                                .get(&address)
                                .copied()
                                .ok_or(InterpretError::NotAFunction(address))?;
                            self.call(callee, args)?
                        }
                    };

                    if let Some(collector) = collector {
                        frame.insert(collector.as_str(), result);
                    }
                }

                Statement::Return(value) => {
                    return match value {
                        Some(value) => self.eval(&frame, value),
                        None => Ok(0),
                    }
                }

                Statement::CJumpFallThrough(condition, label) => {
                    if self.eval(&frame, condition)? != 0 {
                        pc = goto(label.as_str())?;
                    }
                }

                Statement::CJump {
                    condition,
                    on_true,
                    on_false,
                } => {
                    pc = if self.eval(&frame, condition)? != 0 {
                        goto(on_true.as_str())?
                    } else {
                        goto(on_false.as_str())?
                    };
                }
            }
        }

        Err(InterpretError::FellOffEnd(function.name.clone()))
    }

    fn eval(&self, frame: &HashMap<&str, i64>, expr: &Expr) -> Result<i64, InterpretError> {
        match expr.as_ref() {
            Expression::Const(value) => Ok(*value),
            Expression::Name(name) => self
                .globals
                .get(name.as_str())
                .copied()
                .ok_or_else(|| InterpretError::UndefinedName(name.clone())),
            // unassigned temporaries read as zero
            Expression::Temp(temp) => Ok(frame.get(temp.as_str()).copied().unwrap_or(0)),
            Expression::Mem(address) => {
                let address = self.eval(frame, address)?;
                self.load(address)
            }
            Expression::Op(op, e1, e2) => {
                let a = self.eval(frame, e1)?;
                let b = self.eval(frame, e2)?;
                op.apply(a, b).ok_or(InterpretError::DivisionByZero)
            }
        }
    }

    fn builtin(&mut self, name: &str, args: &[i64]) -> Result<i64, InterpretError> {
        let arg = |index: usize| {
            args.get(index)
                .copied()
                .ok_or_else(|| InterpretError::ArityMismatch {
                    function: name.into(),
                    expected: index + 1,
                    actual: args.len(),
                })
        };

        match name {
            MALLOC => self.allocate(arg(0)?),
            PRINTLN => {
                let line = self.load_string(arg(0)?)?;
                self.output.push_str(&line);
                self.output.push('\n');
                Ok(0)
            }
            INT_TO_STRING => self.store_string(&arg(0)?.to_string()),
            STRING_TO_INT => {
                let text = self.load_string(arg(0)?)?;
                text.parse().map_err(|_| InterpretError::BadString(text))
            }
            STRING_CONCAT => {
                let mut text = self.load_string(arg(0)?)?;
                text.push_str(&self.load_string(arg(1)?)?);
                self.store_string(&text)
            }
            THROW => Err(InterpretError::Thrown(self.load_string(arg(0)?)?)),
            _ => Err(InterpretError::UndefinedName(name.into())),
        }
    }

    fn allocate(&mut self, bytes: i64) -> Result<i64, InterpretError> {
        let address = self.heap;
        // keep every allocation word aligned
        let size = bytes
            .max(0)
            .checked_add(WORD - 1)
            .map(|padded| (padded / WORD).max(1) * WORD)
            .ok_or(InterpretError::OutOfMemory(bytes))?;

        self.heap = self
            .heap
            .checked_add(size)
            .ok_or(InterpretError::OutOfMemory(bytes))?;
        Ok(address)
    }

    /// Store a string on the heap and return the address of its length word.
    fn store_string(&mut self, text: &str) -> Result<i64, InterpretError> {
        let chars: Vec<char> = text.chars().collect();
        let start = self.allocate(WORD * (chars.len() as i64 + 1))?;
        self.memory.insert(start, chars.len() as i64);
        for (i, c) in chars.into_iter().enumerate() {
            self.memory.insert(start + WORD * (i as i64 + 1), c as i64);
        }
        Ok(start)
    }

    fn load_string(&self, address: i64) -> Result<String, InterpretError> {
        let length = self.load(address)?;
        (1..=length)
            .map(|i| {
                let code = self.load(address + WORD * i)?;
                Ok(u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER))
            })
            .collect()
    }

    fn load(&self, address: i64) -> Result<i64, InterpretError> {
        self.memory
            .get(&address)
            .copied()
            .ok_or(InterpretError::BadAddress(address))
    }
}
