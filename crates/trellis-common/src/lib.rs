pub mod asm;
pub mod ir;
pub mod names;

pub use driver::{Driver, IrOutput, OptLevel};

mod driver;
