use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

/// Insertion-ordered map, so label listings come out in declaration order.
pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

pub fn fx_map<K, V>() -> FxMap<K, V> {
    IndexMap::with_hasher(FxBuildHasher::default())
}

/// Number of slots in the register file.
pub const REGISTER_COUNT: usize = 16;

/// Index into the register file.
///
/// Any index can be written in source (`r99`), accessing one outside of the register file is
/// fatal at runtime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Register(pub usize);

impl Register {
    /// Always reads zero.
    pub const ZERO: Register = Register(0);
    /// Always reads one.
    pub const ONE: Register = Register(1);
    /// Receives the outcome of every dispatched instruction.
    pub const STATUS: Register = Register(15);

    /// Writes to read-only registers are silently discarded.
    pub fn is_read_only(self) -> bool {
        self.0 < 2
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Reference to a label, with an offset applied to its resolved memory address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Label {
    pub name: String,
    pub offset: i64,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label {
            name: name.into(),
            offset: 0,
        }
    }

    pub fn with_offset(name: impl Into<String>, offset: i64) -> Self {
        Label {
            name: name.into(),
            offset,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            0 => write!(f, "{}", self.name),
            offs => write!(f, "{}[{:+}]", self.name, offs),
        }
    }
}

/// A classified source token.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Register(Register),
    Integer(i64),
    /// Contents of a single-quoted literal, without the quotes.
    String(String),
    Label(Label),
}

impl Operand {
    /// Name of the operand kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Register(_) => "register",
            Operand::Integer(_) => "integer",
            Operand::String(_) => "string",
            Operand::Label(_) => "label",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{reg}"),
            Operand::Integer(val) => write!(f, "{val}"),
            Operand::String(val) => write!(f, "'{val}'"),
            Operand::Label(label) => write!(f, "{label}"),
        }
    }
}

/// Single assembled line. Has an optional label.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Statement {
    pub op: String,
    pub operands: Vec<Operand>,
    pub label: Option<String>,
}

impl Statement {
    pub fn new(op: impl Into<String>, operands: Vec<Operand>, label: Option<String>) -> Self {
        Statement {
            op: op.into(),
            operands,
            label,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.op)?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}
