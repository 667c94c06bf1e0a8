use std::rc::Rc;

use miette::{Result, WrapErr};
use tracing::debug;

use crate::{
    error,
    lexer::{self, QUOTE},
    parse::parse_operand,
    source::SourceLoader,
    symbol::{fx_map, FxMap, Statement},
};

/// Directive which splices another file's lines in place.
pub const INCLUDE: &str = "inc";

/// Includes nested deeper than this are assumed to be cyclic.
pub const MAX_INCLUDE_DEPTH: usize = 64;

/// Assembled statements, plus the program counter each label was declared at.
#[derive(Debug, Default)]
pub struct Program {
    stmts: Vec<Rc<Statement>>,
    labels: FxMap<String, usize>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            stmts: Vec::new(),
            labels: fx_map(),
        }
    }

    pub fn push(&mut self, stmt: Statement) {
        self.stmts.push(Rc::new(stmt))
    }

    pub fn get(&self, pc: usize) -> Option<&Rc<Statement>> {
        self.stmts.get(pc)
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Redeclaring a label moves it; it keeps its place in listings.
    pub fn bind_label(&mut self, name: &str, pc: usize) {
        self.labels.insert(name.to_string(), pc);
    }

    pub fn label_pc(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Labels in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, pc)| (name.as_str(), *pc))
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

/// Turns source lines into statements, binding labels as it goes.
pub struct Assembler<'a> {
    program: &'a mut Program,
    loader: &'a dyn SourceLoader,
    depth: usize,
}

impl<'a> Assembler<'a> {
    pub fn new(program: &'a mut Program, loader: &'a dyn SourceLoader) -> Self {
        Assembler {
            program,
            loader,
            depth: 0,
        }
    }

    /// Assemble a whole file onto the end of the program.
    pub fn load_file(&mut self, name: &str) -> Result<()> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(error::asm_include_depth(name, MAX_INCLUDE_DEPTH));
        }
        let src = self.loader.load(name)?;
        debug!(file = name, depth = self.depth, "assembling");

        self.depth += 1;
        let res = self.load_lines(&src, name);
        self.depth -= 1;
        res
    }

    /// Assemble source text onto the end of the program.
    pub fn load_str(&mut self, src: &str) -> Result<()> {
        self.load_lines(src, "<source>")
    }

    fn load_lines(&mut self, src: &str, name: &str) -> Result<()> {
        for (i, line) in src.lines().enumerate() {
            let pc = self.program.len();
            let stmt = self
                .assemble_line(line, pc)
                .wrap_err_with(|| format!("in `{name}` at line {}", i + 1))?;
            if let Some(stmt) = stmt {
                self.program.push(stmt);
            }
        }
        Ok(())
    }

    /// Assemble one line without appending it, binding any label on it to `pc`.
    ///
    /// Returns `None` for lines with no statement: blank lines, comments, lone labels and
    /// includes. An include still appends the included file to the program.
    pub fn assemble_line(&mut self, line: &str, pc: usize) -> Result<Option<Statement>> {
        let (label, body) = lexer::split_label(line);
        if let Some(label) = label {
            if label.is_empty() {
                return Err(error::asm_empty_label(line));
            }
            self.program.bind_label(label, pc);
        }

        let tokens = lexer::tokenize(body)?;
        let Some((&op, operands)) = tokens.split_first() else {
            return Ok(None);
        };

        if op == INCLUDE {
            let name = operands
                .first()
                .map(|name| name.trim_matches(QUOTE))
                .filter(|name| !name.is_empty())
                .ok_or_else(|| error::asm_include_missing(line))?;
            self.load_file(name)?;
            return Ok(None);
        }

        let operands = operands.iter().map(|token| parse_operand(token)).collect();
        Ok(Some(Statement::new(op, operands, label.map(String::from))))
    }
}
