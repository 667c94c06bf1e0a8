use std::io::{self, Write};

use tracing::{debug, trace, warn};

use crate::{
    config::{Config, DEFAULT_ROOT},
    error::Fault,
    ops::{InstrTable, Status},
    output,
    parser::{Assembler, Program},
    source::{FsRoot, SourceLoader},
    symbol::{fx_map, FxMap, Label, Register, Statement, REGISTER_COUNT},
    term::{Keyboard, Terminal},
};

/// Status which stops the machine.
pub const HALT: i64 = -1;
/// Deepest chain of `exc` commands executing each other.
pub const MAX_COMMAND_DEPTH: usize = 64;

/// Why [`Machine::run`] returned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exit {
    /// Status register was set to [`HALT`].
    Halted,
    /// Program counter moved past the last statement.
    EndOfProgram,
}

/// Represents complete machine state during runtime.
pub struct Machine {
    /// 16x 64-bit registers. Slots 0 and 1 are never read.
    reg: [i64; REGISTER_COUNT],
    /// Flat, zero-initialized memory
    mem: Box<[i64]>,
    /// Program counter, indexes the statement list
    pc: usize,
    /// Data counter, next free memory address for data-defining instructions
    dc: i64,
    /// Program counter of a data-defining statement -> memory address it bound
    addr_map: FxMap<usize, i64>,
    /// Program counters of pending `cll`s
    call_stack: Vec<usize>,
    /// Statement to fetch next instead of `pc + 1`, set by jumps
    branch: Option<usize>,
    /// `exc` commands currently executing
    command_depth: usize,

    program: Program,
    table: InstrTable,
    loader: Box<dyn SourceLoader>,
    keyboard: Box<dyn Keyboard>,
    output: Box<dyn Write>,
}

impl Machine {
    /// Machine reading files from the default root, the terminal, and writing to stdout.
    pub fn new(memory_size: usize) -> Self {
        Machine {
            reg: [0; REGISTER_COUNT],
            mem: vec![0; memory_size].into_boxed_slice(),
            pc: 0,
            dc: 0,
            addr_map: fx_map(),
            call_stack: Vec::new(),
            branch: None,
            command_depth: 0,

            program: Program::new(),
            table: InstrTable::standard(),
            loader: Box::new(FsRoot::new(DEFAULT_ROOT)),
            keyboard: Box::new(Terminal),
            output: Box::new(io::stdout()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.memory_size).with_loader(FsRoot::new(&config.root))
    }

    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_keyboard(mut self, keyboard: impl Keyboard + 'static) -> Self {
        self.keyboard = Box::new(keyboard);
        self
    }

    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn with_instructions(mut self, table: InstrTable) -> Self {
        self.table = table;
        self
    }

    // Assembly

    /// Assemble a file from the loader onto the end of the program.
    pub fn load_file(&mut self, name: &str) -> miette::Result<()> {
        Assembler::new(&mut self.program, &*self.loader).load_file(name)
    }

    /// Assemble source text onto the end of the program.
    pub fn load_str(&mut self, src: &str) -> miette::Result<()> {
        Assembler::new(&mut self.program, &*self.loader).load_str(src)
    }

    /// Assemble a command decoded at runtime. Labels on it bind to the running program counter.
    pub(crate) fn assemble_command(&mut self, cmd: &str) -> miette::Result<Option<Statement>> {
        let pc = self.pc;
        Assembler::new(&mut self.program, &*self.loader).assemble_line(cmd, pc)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    // Execution

    /// Load the entry file and run from its first statement until halted.
    pub fn boot(&mut self, entry: &str) -> miette::Result<Exit> {
        self.load_file(entry)?;
        self.pc = 0;
        Ok(self.run())
    }

    /// Run until halted or out of statements.
    pub fn run(&mut self) -> Exit {
        loop {
            if let Some(exit) = self.step() {
                return exit;
            }
        }
    }

    /// Fetch, dispatch and advance once. Returns `Some` if the machine has stopped.
    pub fn step(&mut self) -> Option<Exit> {
        let Some(stmt) = self.program.get(self.pc).cloned() else {
            return Some(Exit::EndOfProgram);
        };
        trace!(pc = self.pc, "{stmt}");
        self.execute(&stmt);

        if self.register_get(Register::STATUS) == HALT {
            debug!(pc = self.pc, "halted");
            return Some(Exit::Halted);
        }
        self.pc = self.branch.take().unwrap_or(self.pc + 1);
        None
    }

    /// Dispatch a statement at the current program counter and record its status.
    pub fn execute(&mut self, stmt: &Statement) {
        if let Some(status) = self.dispatch(stmt) {
            self.register_set(Register::STATUS, status);
        }
    }

    /// Run the handler for a statement without recording its status.
    ///
    /// Unknown operators are skipped with a warning. Faults are logged and turned into their
    /// status code.
    pub(crate) fn dispatch(&mut self, stmt: &Statement) -> Status {
        let Some(handler) = self.table.get(&stmt.op) else {
            warn!(pc = self.pc, "instruction with operator `{}` not found", stmt.op);
            return None;
        };
        match handler(self, stmt) {
            Ok(status) => status,
            Err(fault) => {
                warn!(pc = self.pc, "`{stmt}`: {fault}");
                Some(fault.status())
            }
        }
    }

    pub(crate) fn enter_command(&mut self) -> Result<(), Fault> {
        if self.command_depth >= MAX_COMMAND_DEPTH {
            return Err(Fault::NestedCommand {
                depth: MAX_COMMAND_DEPTH,
            });
        }
        self.command_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_command(&mut self) {
        self.command_depth -= 1;
    }

    /// Make the next fetch land on `pc`.
    pub(crate) fn jump(&mut self, pc: usize) {
        self.branch = Some(pc);
    }

    pub(crate) fn push_call(&mut self, pc: usize) {
        self.call_stack.push(pc);
    }

    pub(crate) fn pop_call(&mut self) -> Option<usize> {
        self.call_stack.pop()
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
        self.branch = None;
    }

    // Registers

    pub fn register_get(&self, reg: Register) -> i64 {
        match reg {
            Register::ZERO => 0,
            Register::ONE => 1,
            Register(idx) => self.reg[idx],
        }
    }

    pub fn register_set(&mut self, reg: Register, val: i64) {
        if !reg.is_read_only() {
            self.reg[reg.0] = val;
        }
    }

    /// Register file as read by instructions.
    pub fn registers(&self) -> [i64; REGISTER_COUNT] {
        std::array::from_fn(|i| self.register_get(Register(i)))
    }

    // Memory

    pub fn memory_get(&self, addr: i64) -> i64 {
        self.mem[self.slot(addr)]
    }

    pub fn memory_set(&mut self, addr: i64, val: i64) {
        let slot = self.slot(addr);
        self.mem[slot] = val;
    }

    pub fn memory(&self) -> &[i64] {
        &self.mem
    }

    /// Out of range accesses are fatal.
    fn slot(&self, addr: i64) -> usize {
        match usize::try_from(addr) {
            Ok(slot) if slot < self.mem.len() => slot,
            _ => panic!(
                "memory address {addr} is out of range for {} cells",
                self.mem.len()
            ),
        }
    }

    pub fn dc(&self) -> i64 {
        self.dc
    }

    pub(crate) fn advance_dc(&mut self, amount: i64) -> Result<(), Fault> {
        self.dc = self.dc.checked_add(amount).ok_or(Fault::AddressOverflow)?;
        Ok(())
    }

    // Labels

    pub fn label_to_pc(&self, label: &Label) -> Result<usize, Fault> {
        self.program
            .label_pc(&label.name)
            .ok_or_else(|| Fault::UnresolvedLabel {
                name: label.name.clone(),
            })
    }

    /// Memory address bound to the label's statement, plus the label offset.
    pub fn label_to_address(&self, label: &Label) -> Result<i64, Fault> {
        let pc = self.label_to_pc(label)?;
        let addr = self
            .address_of(pc)
            .ok_or_else(|| Fault::UnresolvedAddress {
                name: label.name.clone(),
            })?;
        addr.checked_add(label.offset).ok_or(Fault::AddressOverflow)
    }

    pub fn address_of(&self, pc: usize) -> Option<i64> {
        self.addr_map.get(&pc).copied()
    }

    pub(crate) fn bind_address(&mut self, pc: usize, addr: i64) {
        self.addr_map.insert(pc, addr);
    }

    pub fn addr_map(&self) -> &FxMap<usize, i64> {
        &self.addr_map
    }

    // I/O

    pub(crate) fn read_key(&mut self) -> io::Result<i64> {
        self.keyboard.read_key()
    }

    pub(crate) fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()
    }

    pub(crate) fn dump_cell(&mut self, addr: i64) -> io::Result<()> {
        let value = self.memory_get(addr);
        output::write_cell(&mut self.output, value)
    }

    pub(crate) fn dump_memory(&mut self) -> io::Result<()> {
        output::write_memory(&mut self.output, &self.mem)
    }

    pub(crate) fn dump_labels(&mut self) -> io::Result<()> {
        let labels = self
            .program
            .labels()
            .map(|(name, pc)| (name, pc, self.addr_map.get(&pc).copied()));
        output::write_labels(&mut self.output, labels)
    }

    pub(crate) fn dump_registers(&mut self) -> io::Result<()> {
        let regs = self.registers();
        output::write_registers(&mut self.output, &regs)
    }
}
