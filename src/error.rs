use std::{fmt, io, ops::Range, path::Path};

use miette::{miette, LabeledSpan, Report, Severity};

// Lexer errors

pub fn lex_unclosed_str(span: Range<usize>, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::quote",
        help = "make sure to close string literals with a ' character.",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal.",
    )
    .with_source_code(src.to_string())
}

// Assembler errors

pub fn asm_empty_label(src: &str) -> Report {
    let end = src.find(crate::lexer::LABEL_DELIM).unwrap_or(0);
    miette!(
        severity = Severity::Error,
        code = "asm::label",
        help = "write a name before the ':', like `loop: nop`",
        labels = vec![LabeledSpan::at(0..end + 1, "empty label")],
        "Label declarations require a name.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_include_missing(src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::include",
        help = "name the file to include, like `inc 'lib.nla'`",
        labels = vec![LabeledSpan::at(0..src.len(), "no file name")],
        "Include directive is missing a file name.",
    )
    .with_source_code(src.to_string())
}

pub fn asm_include_depth(name: &str, depth: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::depth",
        help = "check for files which include each other",
        "Includes nested more than {depth} levels deep while loading `{name}`.",
    )
}

pub fn io_read(name: &str, path: &Path, e: io::Error) -> Report {
    miette!(
        severity = Severity::Error,
        code = "io::read",
        help = "program files are resolved relative to the machine root directory",
        "Failed to read `{name}` ({}): {e}",
        path.display(),
    )
}

// Runtime faults

/// Which side of an instruction an invalid operand was found on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Source,
    Target,
}

/// Recoverable instruction failure.
///
/// Never aborts a run: the engine logs it and leaves [`Fault::status`] in the status register.
#[derive(Debug)]
pub enum Fault {
    /// Label was never declared.
    UnresolvedLabel { name: String },
    /// Label is declared, but its data-defining statement has not run yet.
    UnresolvedAddress { name: String },
    /// Program counter with no memory address bound to it.
    UnboundPc(i64),
    InvalidOperand { role: Role, kind: &'static str },
    MissingOperand { index: usize },
    /// `ret` with an empty call stack.
    StackUnderflow,
    /// `exc` decoded no characters.
    EmptyCommand,
    DivideByZero,
    NegativeReservation(i64),
    /// Address or data counter past the range of a cell.
    AddressOverflow,
    /// `exc` commands executing each other too deeply.
    NestedCommand { depth: usize },
    UnknownSyscall(i64),
    Io(io::Error),
    /// `exc` command which failed to assemble.
    Assembly(String),
}

impl Fault {
    /// Status code left in the status register.
    pub fn status(&self) -> i64 {
        match self {
            Self::InvalidOperand {
                role: Role::Target, ..
            } => 2,
            _ => 1,
        }
    }
}

impl std::error::Error for Fault {}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel { name } => write!(f, "label `{name}` not found"),
            Self::UnresolvedAddress { name } => {
                write!(f, "label `{name}` has no memory address yet")
            }
            Self::UnboundPc(pc) => write!(f, "no memory address bound at pc {pc}"),
            Self::InvalidOperand { role, kind } => {
                let role = match role {
                    Role::Source => "source",
                    Role::Target => "target",
                };
                write!(f, "{kind} is not a valid {role} operand")
            }
            Self::MissingOperand { index } => write!(f, "missing operand {}", index + 1),
            Self::StackUnderflow => write!(f, "return with empty call stack"),
            Self::EmptyCommand => write!(f, "no command to execute"),
            Self::DivideByZero => write!(f, "division by zero"),
            Self::NegativeReservation(amount) => {
                write!(f, "cannot reserve a negative amount ({amount}) of memory")
            }
            Self::AddressOverflow => write!(f, "address out of representable range"),
            Self::NestedCommand { depth } => {
                write!(f, "commands nested more than {depth} levels deep")
            }
            Self::UnknownSyscall(call) => write!(f, "unknown system call {call}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Assembly(msg) => write!(f, "failed to assemble command: {msg}"),
        }
    }
}

impl From<io::Error> for Fault {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
