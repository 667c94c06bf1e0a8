// Parsing
mod lexer;
mod parse;
pub use parse::parse_operand;
mod parser;
pub use parser::{Assembler, Program};
pub mod symbol;
pub use symbol::{Label, Operand, Register, Statement};

// Running
mod runtime;
pub use runtime::{Exit, Machine, HALT, MAX_COMMAND_DEPTH};
pub mod ops;
pub use ops::InstrTable;
pub mod output;

// Collaborators
pub mod config;
pub use config::Config;
pub mod source;
pub use source::{FsRoot, MemorySources, SourceLoader};
pub mod term;
pub use term::{Keyboard, ScriptedKeys, Terminal};

pub mod error;
pub use error::Fault;
