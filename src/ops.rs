use fxhash::FxHashMap;
use tracing::debug;

use crate::{
    error::{Fault, Role},
    runtime::{Machine, HALT},
    symbol::{Label, Operand, Register, Statement, REGISTER_COUNT},
};

/// Status an instruction leaves in the status register. `None` leaves the register unchanged.
pub type Status = Option<i64>;

pub type Outcome = Result<Status, Fault>;

/// Every instruction is a function over the whole machine.
pub type Handler = fn(&mut Machine, &Statement) -> Outcome;

/// Syscall number is read from here.
const SYS_CALL: Register = Register(2);
/// Key read by syscall 0; program counter of the string to write for syscall 1.
const SYS_ARG: Register = Register(3);
/// Amount of cells to write for syscall 1, or 0 to write up to a null cell.
const SYS_LEN: Register = Register(4);

const SYS_READ_KEY: i64 = 0x00;
const SYS_WRITE: i64 = 0x01;

/// Label `ext` jumps to, if declared.
pub const EXIT_LABEL: &str = "exit";

/// Mnemonic -> handler lookup, built once per machine.
#[derive(Clone)]
pub struct InstrTable {
    handlers: FxHashMap<&'static str, Handler>,
}

impl InstrTable {
    const OP_TABLE: [(&'static str, Handler); 22] = [
        ("chr", chr),
        ("mov", mov),
        ("sys", sys),
        ("jmp", jmp),
        ("xor", xor),
        ("nop", nop),
        ("dmp", dmp),
        ("lbl", lbl),
        ("reg", reg),
        ("add", add),
        ("sub", sub),
        ("div", div),
        ("mod", modulo),
        ("res", res),
        ("ptr", ptr),
        ("swp", swp),
        ("mem", mem),
        ("eql", eql),
        ("exc", exc),
        ("ext", ext),
        ("cll", cll),
        ("ret", ret),
    ];

    /// Table with every built-in instruction.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for (op, handler) in Self::OP_TABLE {
            table.insert(op, handler);
        }
        table
    }

    pub fn empty() -> Self {
        InstrTable {
            handlers: FxHashMap::default(),
        }
    }

    /// Add or replace an instruction.
    pub fn insert(&mut self, op: &'static str, handler: Handler) {
        self.handlers.insert(op, handler);
    }

    pub fn get(&self, op: &str) -> Option<Handler> {
        self.handlers.get(op).copied()
    }

    pub fn contains(&self, op: &str) -> bool {
        self.handlers.contains_key(op)
    }
}

// Operand helpers

fn operand(stmt: &Statement, index: usize) -> Result<&Operand, Fault> {
    stmt.operands
        .get(index)
        .ok_or(Fault::MissingOperand { index })
}

fn invalid(role: Role, operand: &Operand) -> Fault {
    Fault::InvalidOperand {
        role,
        kind: operand.kind(),
    }
}

fn register(stmt: &Statement, index: usize, role: Role) -> Result<Register, Fault> {
    match operand(stmt, index)? {
        Operand::Register(reg) => Ok(*reg),
        other => Err(invalid(role, other)),
    }
}

fn label(stmt: &Statement, index: usize, role: Role) -> Result<&Label, Fault> {
    match operand(stmt, index)? {
        Operand::Label(label) => Ok(label),
        other => Err(invalid(role, other)),
    }
}

/// Literal or register value.
fn value(m: &Machine, stmt: &Statement, index: usize) -> Result<i64, Fault> {
    match operand(stmt, index)? {
        Operand::Integer(val) => Ok(*val),
        Operand::Register(reg) => Ok(m.register_get(*reg)),
        other => Err(invalid(Role::Source, other)),
    }
}

fn first_char(string: &str) -> Result<i64, Fault> {
    match string.chars().next() {
        Some(ch) => Ok(ch as i64),
        None => Err(Fault::InvalidOperand {
            role: Role::Source,
            kind: "empty string",
        }),
    }
}

/// Character for a memory cell. Codes outside of Unicode become U+FFFD.
fn to_char(code: i64) -> char {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

// Data

/// Write literals and strings at the data counter.
fn chr(m: &mut Machine, stmt: &Statement) -> Outcome {
    if stmt.label.is_some() {
        m.bind_address(m.pc(), m.dc());
    }
    for op in &stmt.operands {
        match op {
            Operand::Integer(val) => {
                m.memory_set(m.dc(), *val);
                m.advance_dc(1)?;
            }
            Operand::String(string) => {
                for ch in string.chars() {
                    m.memory_set(m.dc(), ch as i64);
                    m.advance_dc(1)?;
                }
            }
            // Not data, skipped
            Operand::Register(_) | Operand::Label(_) => {}
        }
    }
    Ok(Some(0))
}

/// Reserve memory at the data counter without writing to it.
fn res(m: &mut Machine, stmt: &Statement) -> Outcome {
    let amount = value(m, stmt, 0)?;
    if amount < 0 {
        return Err(Fault::NegativeReservation(amount));
    }
    if stmt.label.is_some() {
        m.bind_address(m.pc(), m.dc());
    }
    m.advance_dc(amount)?;
    Ok(Some(0))
}

/// Point a label at another label's address plus a register offset.
fn ptr(m: &mut Machine, stmt: &Statement) -> Outcome {
    let target = label(stmt, 0, Role::Target)?;
    let source = label(stmt, 1, Role::Source)?;
    let offset = register(stmt, 2, Role::Source)?;

    let target_pc = m.label_to_pc(target)?;
    let addr = m
        .label_to_address(source)?
        .checked_add(m.register_get(offset))
        .ok_or(Fault::AddressOverflow)?;
    m.bind_address(target_pc, addr);
    Ok(Some(0))
}

/// Move a value between registers and memory.
fn mem(m: &mut Machine, stmt: &Statement) -> Outcome {
    let val = match operand(stmt, 1)? {
        Operand::Label(label) => m.memory_get(m.label_to_address(label)?),
        Operand::Register(reg) => m.register_get(*reg),
        Operand::Integer(addr) => m.memory_get(*addr),
        Operand::String(string) => first_char(string)?,
    };
    match operand(stmt, 0)? {
        Operand::Label(label) => m.memory_set(m.label_to_address(label)?, val),
        Operand::Register(reg) => m.register_set(*reg, val),
        Operand::Integer(addr) => m.memory_set(*addr, val),
        other @ Operand::String(_) => return Err(invalid(Role::Target, other)),
    }
    Ok(Some(0))
}

/// Exchange the general registers with a block of memory.
fn swp(m: &mut Machine, stmt: &Statement) -> Outcome {
    let base = match operand(stmt, 0)? {
        Operand::Label(label) => m.label_to_address(label)?,
        Operand::Integer(addr) => *addr,
        other => return Err(invalid(Role::Source, other)),
    };
    for i in 2..REGISTER_COUNT {
        let addr = base
            .checked_add(i as i64 - 2)
            .ok_or(Fault::AddressOverflow)?;
        let val = m.memory_get(addr);
        m.memory_set(addr, m.register_get(Register(i)));
        m.register_set(Register(i), val);
    }
    Ok(Some(0))
}

// Registers and arithmetic

fn mov(m: &mut Machine, stmt: &Statement) -> Outcome {
    let dest = register(stmt, 0, Role::Target)?;
    let val = match operand(stmt, 1)? {
        Operand::Integer(val) => *val,
        Operand::String(string) => first_char(string)?,
        Operand::Register(reg) => m.register_get(*reg),
        Operand::Label(label) => m.label_to_pc(label)? as i64,
    };
    m.register_set(dest, val);
    Ok(Some(0))
}

/// `dest := op(a, b)` over literal or register sources.
fn binary(
    m: &mut Machine,
    stmt: &Statement,
    op: fn(i64, i64) -> Result<i64, Fault>,
) -> Result<(), Fault> {
    let dest = register(stmt, 0, Role::Target)?;
    let a = value(m, stmt, 1)?;
    let b = value(m, stmt, 2)?;
    m.register_set(dest, op(a, b)?);
    Ok(())
}

fn add(m: &mut Machine, stmt: &Statement) -> Outcome {
    binary(m, stmt, |a, b| Ok(a.wrapping_add(b)))?;
    Ok(Some(0))
}

/// Leaves the status register alone, unlike the other arithmetic instructions.
fn sub(m: &mut Machine, stmt: &Statement) -> Outcome {
    binary(m, stmt, |a, b| Ok(a.wrapping_sub(b)))?;
    Ok(None)
}

fn div(m: &mut Machine, stmt: &Statement) -> Outcome {
    binary(m, stmt, floor_div)?;
    Ok(Some(0))
}

fn modulo(m: &mut Machine, stmt: &Statement) -> Outcome {
    binary(m, stmt, floor_mod)?;
    Ok(Some(0))
}

fn eql(m: &mut Machine, stmt: &Statement) -> Outcome {
    binary(m, stmt, |a, b| Ok((a == b) as i64))?;
    Ok(Some(0))
}

fn xor(m: &mut Machine, stmt: &Statement) -> Outcome {
    let dest = register(stmt, 0, Role::Target)?;
    let src = value(m, stmt, 1)?;
    m.register_set(dest, m.register_get(dest) ^ src);
    Ok(Some(0))
}

/// Division rounding towards negative infinity.
fn floor_div(a: i64, b: i64) -> Result<i64, Fault> {
    if b == 0 {
        return Err(Fault::DivideByZero);
    }
    let quot = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && (a < 0) != (b < 0) {
        Ok(quot - 1)
    } else {
        Ok(quot)
    }
}

/// Remainder with the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Result<i64, Fault> {
    if b == 0 {
        return Err(Fault::DivideByZero);
    }
    let rem = a.wrapping_rem(b);
    if rem != 0 && (rem < 0) != (b < 0) {
        Ok(rem + b)
    } else {
        Ok(rem)
    }
}

// Control flow

/// Jump to a label if the condition register is positive.
fn jmp(m: &mut Machine, stmt: &Statement) -> Outcome {
    let cond = register(stmt, 0, Role::Source)?;
    let target = label(stmt, 1, Role::Source)?;
    if m.register_get(cond) > 0 {
        let pc = m.label_to_pc(target)?;
        m.jump(pc);
    }
    Ok(Some(0))
}

fn cll(m: &mut Machine, stmt: &Statement) -> Outcome {
    let target = label(stmt, 0, Role::Source)?;
    let pc = m.label_to_pc(target)?;
    m.push_call(m.pc());
    m.jump(pc);
    Ok(Some(0))
}

/// Resume after the matching `cll`.
fn ret(m: &mut Machine, _stmt: &Statement) -> Outcome {
    let pc = m.pop_call().ok_or(Fault::StackUnderflow)?;
    m.jump(pc + 1);
    Ok(Some(0))
}

/// Jump to `exit` if declared, otherwise halt.
fn ext(m: &mut Machine, _stmt: &Statement) -> Outcome {
    match m.program().label_pc(EXIT_LABEL) {
        Some(pc) => {
            m.jump(pc);
            Ok(Some(0))
        }
        None => Ok(Some(HALT)),
    }
}

fn nop(_m: &mut Machine, _stmt: &Statement) -> Outcome {
    Ok(Some(0))
}

/// Assemble the null-terminated command stored at a label and execute it immediately.
///
/// This is the one exception to fetch/dispatch/advance: the decoded statement runs out of band,
/// at the current program counter, and is never added to the program. Unless it jumps, control
/// then continues after the `exc`. Its status becomes the status of the `exc`.
fn exc(m: &mut Machine, stmt: &Statement) -> Outcome {
    let source = label(stmt, 0, Role::Source)?;
    let mut addr = m.label_to_address(source)?;

    let mut cmd = String::new();
    loop {
        let code = m.memory_get(addr);
        if code == 0 {
            break;
        }
        cmd.push(to_char(code));
        addr += 1;
    }
    if cmd.is_empty() {
        return Err(Fault::EmptyCommand);
    }

    debug!(pc = m.pc(), "executing `{cmd}`");
    let inner = m
        .assemble_command(&cmd)
        .map_err(|e| Fault::Assembly(e.to_string()))?;
    let Some(inner) = inner else {
        return Ok(Some(0));
    };
    m.enter_command()?;
    let status = m.dispatch(&inner);
    m.leave_command();
    Ok(status)
}

// System

fn sys(m: &mut Machine, _stmt: &Statement) -> Outcome {
    match m.register_get(SYS_CALL) {
        SYS_READ_KEY => {
            let key = m.read_key()?;
            m.register_set(SYS_ARG, key);
        }
        SYS_WRITE => {
            let start = m.register_get(SYS_ARG);
            let len = m.register_get(SYS_LEN);
            let mut addr = usize::try_from(start)
                .ok()
                .and_then(|pc| m.address_of(pc))
                .ok_or(Fault::UnboundPc(start))?;

            let mut text = String::new();
            if len == 0 {
                loop {
                    let code = m.memory_get(addr);
                    if code == 0 {
                        break;
                    }
                    text.push(to_char(code));
                    addr += 1;
                }
            } else {
                for _ in 0..len {
                    text.push(to_char(m.memory_get(addr)));
                    addr += 1;
                }
            }
            m.write_text(&text)?;
        }
        call => return Err(Fault::UnknownSyscall(call)),
    }
    Ok(Some(0))
}

// Debugging

/// Print one memory cell, or all of memory.
fn dmp(m: &mut Machine, stmt: &Statement) -> Outcome {
    match stmt.operands.first() {
        None => m.dump_memory()?,
        Some(Operand::Integer(addr)) => m.dump_cell(*addr)?,
        Some(Operand::Label(label)) => {
            let addr = m.label_to_address(label)?;
            m.dump_cell(addr)?
        }
        Some(other) => return Err(invalid(Role::Source, other)),
    }
    Ok(Some(0))
}

fn lbl(m: &mut Machine, _stmt: &Statement) -> Outcome {
    m.dump_labels()?;
    Ok(None)
}

/// Reports the status register's own value, so it survives the dump.
fn reg(m: &mut Machine, _stmt: &Statement) -> Outcome {
    m.dump_registers()?;
    Ok(Some(m.register_get(Register::STATUS)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        output::SharedOutput, runtime::Exit, source::MemorySources, term::ScriptedKeys,
    };

    struct Run {
        m: Machine,
        out: SharedOutput,
        exit: Exit,
    }

    impl Run {
        fn reg(&self, idx: usize) -> i64 {
            self.m.register_get(Register(idx))
        }

        fn status(&self) -> i64 {
            self.m.register_get(Register::STATUS)
        }
    }

    fn run_with_keys(src: &str, keys: &str) -> Run {
        let out = SharedOutput::new();
        let mut m = Machine::new(128)
            .with_loader(MemorySources::new())
            .with_keyboard(ScriptedKeys::from_text(keys))
            .with_output(out.clone());
        m.load_str(src).unwrap();
        let exit = m.run();
        Run { m, out, exit }
    }

    fn run(src: &str) -> Run {
        run_with_keys(src, "")
    }

    #[test]
    fn table_has_every_instruction() {
        let table = InstrTable::standard();
        for op in [
            "mov", "jmp", "cll", "ret", "add", "sub", "div", "mod", "eql", "xor", "chr", "res",
            "mem", "ptr", "swp", "sys", "ext", "dmp", "lbl", "reg", "nop", "exc",
        ] {
            assert!(table.contains(op), "missing `{op}`");
        }
        assert!(!table.contains("inc"));
    }

    #[test]
    fn custom_instruction() {
        fn dbl(m: &mut Machine, stmt: &Statement) -> Outcome {
            let dest = register(stmt, 0, Role::Target)?;
            m.register_set(dest, m.register_get(dest) * 2);
            Ok(Some(0))
        }
        let mut table = InstrTable::standard();
        table.insert("dbl", dbl);
        let mut m = Machine::new(8)
            .with_loader(MemorySources::new())
            .with_instructions(table);
        m.load_str("mov r2 21\ndbl r2").unwrap();
        m.run();
        assert_eq!(m.register_get(Register(2)), 42);
    }

    #[test]
    fn mov_sources() {
        let run = run("mov r2 -5\nmov r3 'xyz'\nmov r4 r3\nhere: mov r5 here\nmov r6 0x10");
        assert_eq!(run.reg(2), -5);
        assert_eq!(run.reg(3), 'x' as i64);
        assert_eq!(run.reg(4), 'x' as i64);
        assert_eq!(run.reg(5), 3);
        assert_eq!(run.reg(6), 16);
        assert_eq!(run.status(), 0);
    }

    #[test]
    fn mov_missing_label() {
        let run = run("mov r2 7\nmov r2 missing_label");
        assert_eq!(run.reg(2), 7);
        assert_eq!(run.status(), 1);
        assert_eq!(run.exit, Exit::EndOfProgram);
    }

    #[test]
    fn mov_invalid_operands() {
        assert_eq!(run("mov 3 r2").status(), 2);
        assert_eq!(run("mov r2 ''").status(), 1);
        assert_eq!(run("mov r2").status(), 1);
    }

    #[test]
    fn arithmetic() {
        let run = run("mov r2 10\nadd r3 r2 5\nmul r9 r2 r2\ndiv r4 -7 2\nmod r5 -7 2\nmod r6 7 -2\ndiv r7 7 2\neql r8 r3 15\neql r9 r3 16");
        assert_eq!(run.reg(3), 15);
        assert_eq!(run.reg(4), -4);
        assert_eq!(run.reg(5), 1);
        assert_eq!(run.reg(6), -1);
        assert_eq!(run.reg(7), 3);
        assert_eq!(run.reg(8), 1);
        assert_eq!(run.reg(9), 0);
    }

    #[test]
    fn arithmetic_faults() {
        let run1 = run("mov r2 9\ndiv r2 5 0");
        assert_eq!(run1.reg(2), 9);
        assert_eq!(run1.status(), 1);
        assert_eq!(run("add r2 'a' 1").status(), 1);
        assert_eq!(run("add 'a' 1 1").status(), 2);
        assert_eq!(run("mod r2 1 r0").status(), 1);
    }

    #[test]
    fn floor_division() {
        assert_eq!(floor_div(-7, 2).unwrap(), -4);
        assert_eq!(floor_div(7, -2).unwrap(), -4);
        assert_eq!(floor_div(-8, 2).unwrap(), -4);
        assert_eq!(floor_div(i64::MIN, -1).unwrap(), i64::MIN);
        assert_eq!(floor_mod(-7, 2).unwrap(), 1);
        assert_eq!(floor_mod(7, -2).unwrap(), -1);
        assert_eq!(floor_mod(-8, 2).unwrap(), 0);
    }

    #[test]
    fn xor_sources() {
        let run = run("mov r2 12\nxor r2 10\nmov r3 r2\nxor r3 r3");
        assert_eq!(run.reg(2), 6);
        assert_eq!(run.reg(3), 0);
    }

    #[test]
    fn jmp_not_taken() {
        let run = run("jmp r0 skip\nmov r2 1\nskip: mov r3 1");
        assert_eq!(run.reg(2), 1);
        assert_eq!(run.reg(3), 1);
    }

    #[test]
    fn jmp_lands_on_label() {
        // Counts down from 3, including a jump back to pc 0
        let src = "top: sub r2 r2 1\nadd r3 r3 1\njmp r2 top";
        let run = run(&format!("mov r2 3\n{src}"));
        assert_eq!(run.reg(3), 3);

        let run = run_with_keys("top: add r2 r2 1\neql r3 r2 4\nxor r3 1\njmp r3 top", "");
        assert_eq!(run.reg(2), 4);
    }

    #[test]
    fn jmp_unknown_label() {
        assert_eq!(run("jmp r1 nowhere").status(), 1);
        assert_eq!(run("jmp r0 nowhere").status(), 0);
    }

    #[test]
    fn call_and_return() {
        let src = "\
cll double
add r3 r3 1
ext
double: add r2 r2 10
ret";
        let run = run(src);
        assert_eq!(run.exit, Exit::Halted);
        assert_eq!(run.reg(2), 10);
        assert_eq!(run.reg(3), 1);
        assert_eq!(run.m.call_depth(), 0);
    }

    #[test]
    fn call_immediately_returning() {
        let run = run("cll sub_\nmov r2 1\next\nsub_: ret");
        assert_eq!(run.reg(2), 1);
        assert_eq!(run.exit, Exit::Halted);
    }

    #[test]
    fn nested_calls() {
        let src = "\
cll outer
ext
outer: cll inner
add r2 r2 1
ret
inner: add r2 r2 100
ret";
        let run = run(src);
        assert_eq!(run.reg(2), 101);
        assert_eq!(run.exit, Exit::Halted);
    }

    #[test]
    fn ret_with_empty_stack() {
        let mut m = Machine::new(8).with_loader(MemorySources::new());
        m.load_str("ret\nmov r2 5").unwrap();
        assert_eq!(m.step(), None);
        assert_eq!(m.register_get(Register::STATUS), 1);
        assert_eq!(m.pc(), 1);
        m.run();
        assert_eq!(m.register_get(Register(2)), 5);
    }

    #[test]
    fn ext_jumps_to_exit_label() {
        let run = run("ext\nmov r2 1\nexit: mov r3 1");
        assert_eq!(run.exit, Exit::EndOfProgram);
        assert_eq!(run.reg(2), 0);
        assert_eq!(run.reg(3), 1);
    }

    #[test]
    fn chr_writes_data() {
        let run = run("a: chr 65 'b'\nchr 'cd' 0\nb: chr");
        assert_eq!(&run.m.memory()[..5], [65, 98, 99, 100, 0]);
        assert_eq!(run.m.dc(), 5);
        assert_eq!(run.m.address_of(0), Some(0));
        assert_eq!(run.m.address_of(1), None);
        assert_eq!(run.m.address_of(2), Some(5));
    }

    #[test]
    fn chr_skips_non_data() {
        let run = run("buf: chr 'ab' r2 end 1\nmem r5 buf");
        assert_eq!(run.status(), 0);
        assert_eq!(&run.m.memory()[..4], [97, 98, 1, 0]);
        assert_eq!(run.m.dc(), 3);
        assert_eq!(run.m.address_of(0), Some(0));
        assert_eq!(run.reg(5), 97);
    }

    #[test]
    fn res_reserves() {
        let run = run("res 3\nbuf: res r1\nafter: chr 9");
        assert_eq!(run.m.dc(), 5);
        assert_eq!(run.m.address_of(1), Some(3));
        assert_eq!(run.m.address_of(2), Some(4));
        assert_eq!(run.m.memory_get(4), 9);
        assert_eq!(run.m.memory_get(3), 0);
        assert_eq!(self::run("res -1").status(), 1);
    }

    #[test]
    fn data_counter_overflow() {
        let run = run("res 0x7fffffffffffffff\nres 1\nnop");
        assert_eq!(run.exit, Exit::EndOfProgram);
        assert_eq!(run.m.dc(), i64::MAX);

        let run = self::run("res 0x7fffffffffffffff\nres 1");
        assert_eq!(run.status(), 1);
        assert_eq!(run.m.dc(), i64::MAX);

        let src = "\
a: chr 0
b: chr 0
mov r2 0x7fffffffffffffff
ptr b a r2
mem r3 b[1]";
        let run = self::run(src);
        assert_eq!(run.status(), 1);
        assert_eq!(run.m.address_of(1), Some(i64::MAX));
    }

    #[test]
    fn mem_moves() {
        let src = "\
buf: chr 5 6 7
mem r2 buf[1]
mem r3 2
mem buf r0
mem 10 'z'
mem buf[2] r2
mem r4 r2";
        let run = run(src);
        assert_eq!(run.reg(2), 6);
        assert_eq!(run.reg(3), 7);
        assert_eq!(run.reg(4), 6);
        assert_eq!(&run.m.memory()[..3], [0, 6, 6]);
        assert_eq!(run.m.memory_get(10), 'z' as i64);
        assert_eq!(run.status(), 0);
    }

    #[test]
    fn mem_faults() {
        assert_eq!(run("mem 'a' 1").status(), 2);
        assert_eq!(run("mem r2 unbound").status(), 1);
        assert_eq!(run("mem r2 ''").status(), 1);
    }

    #[test]
    fn ptr_rebinds() {
        let src = "\
data: chr 'abcdef'
view: res 0
mov r2 2
ptr view data r2
mem r3 view[1]";
        let run = run(src);
        assert_eq!(run.m.address_of(1), Some(2));
        assert_eq!(run.reg(3), 'd' as i64);
        assert_eq!(run.status(), 0);
    }

    #[test]
    fn ptr_requires_register_offset() {
        let run = run("data: chr 1\nview: res 0\nptr view data 1");
        assert_eq!(run.status(), 1);
        assert_eq!(run.m.address_of(1), Some(1));
    }

    #[test]
    fn swp_exchanges_registers() {
        let src = "\
save: res 14
mov r2 20
mov r14 140
swp save
mov r3 r2";
        let run = run(src);
        assert_eq!(run.m.memory_get(0), 20);
        assert_eq!(run.m.memory_get(12), 140);
        // Status register was swapped in, then overwritten by `swp` itself
        assert_eq!(run.m.memory_get(13), 0);
        assert_eq!(run.reg(2), 0);
        assert_eq!(run.reg(14), 0);

        let run = self::run("mov r5 3\nswp 100\nswp 100");
        assert_eq!(run.reg(5), 3);
        assert_eq!(self::run("swp r2").status(), 1);
    }

    #[test]
    fn sys_reads_key() {
        let run = run_with_keys("mov r2 0\nsys\nmov r4 r3\nsys", "qw");
        assert_eq!(run.reg(4), 'q' as i64);
        assert_eq!(run.reg(3), 'w' as i64);
        // Out of input
        let run = run_with_keys("mov r2 0\nsys", "");
        assert_eq!(run.status(), 1);
    }

    #[test]
    fn sys_writes_strings() {
        let src = "\
msg: chr 'Hello' 0
mov r2 1
mov r3 msg
sys
mov r4 3
sys";
        let run = run(src);
        assert_eq!(run.out.text(), "HelloHel");
        assert_eq!(run.status(), 0);
    }

    #[test]
    fn sys_faults() {
        assert_eq!(run("later: chr 0\nmov r2 1\nmov r3 5\nsys").status(), 1);
        assert_eq!(run("mov r2 9\nsys").status(), 1);
    }

    #[test]
    fn exc_runs_command_from_memory() {
        let src = "\
cmd: chr 'add r2 r2 5' 0
exc cmd
exc cmd
mov r3 r2";
        let run = run(src);
        assert_eq!(run.reg(2), 10);
        assert_eq!(run.reg(3), 10);
        // Decoded statements are not added to the program
        assert_eq!(run.m.program().len(), 4);
    }

    #[test]
    fn exc_binds_labels_to_running_pc() {
        let src = "\
cmd: chr 'tmp: chr 42' 0
exc cmd
mem r2 tmp";
        let run = run(src);
        assert_eq!(run.m.program().label_pc("tmp"), Some(1));
        assert_eq!(run.reg(2), 42);
    }

    #[test]
    fn exc_jumps() {
        let src = "\
cmd: chr 'jmp r1 done' 0
exc cmd
mov r2 1
done: mov r3 1";
        let run = run(src);
        assert_eq!(run.reg(2), 0);
        assert_eq!(run.reg(3), 1);
    }

    #[test]
    fn exc_propagates_halt() {
        let run = run("cmd: chr 'ext' 0\nexc cmd\nmov r2 1");
        assert_eq!(run.exit, Exit::Halted);
        assert_eq!(run.reg(2), 0);
    }

    #[test]
    fn exc_includes_file() {
        let sources = MemorySources::new().with("lib.nla", "mov r3 7\n");
        let mut m = Machine::new(64)
            .with_loader(sources)
            .with_output(SharedOutput::new());
        m.load_str("cmd: chr 'inc lib.nla' 0\nexc cmd\nmov r2 1").unwrap();
        assert_eq!(m.run(), Exit::EndOfProgram);
        // Included statements land at the end of the program and run last
        assert_eq!(m.program().len(), 4);
        assert_eq!(m.register_get(Register(2)), 1);
        assert_eq!(m.register_get(Register(3)), 7);
    }

    #[test]
    fn exc_nesting_is_bounded() {
        let run = run("cmd: chr 'exc cmd' 0\nexc cmd\nmov r2 1");
        assert_eq!(run.exit, Exit::EndOfProgram);
        assert_eq!(run.status(), 0);
        assert_eq!(run.reg(2), 1);

        let run = self::run("cmd: chr 'exc cmd' 0\nexc cmd");
        assert_eq!(run.status(), 1);
    }

    #[test]
    fn exc_faults() {
        assert_eq!(run("cmd: res 1\nexc cmd").status(), 1);
        assert_eq!(run("cmd: chr 'mov r2 missing' 0\nexc cmd").status(), 1);
        // Unterminated quote in the decoded command
        assert_eq!(run("cmd: chr 'chr ' 39 'open' 0\nexc cmd").status(), 1);

        // Command not written yet
        let mut m = Machine::new(32).with_loader(MemorySources::new());
        m.load_str("exc cmd\ncmd: chr 'nop' 0").unwrap();
        assert_eq!(m.step(), None);
        assert_eq!(m.register_get(Register::STATUS), 1);
    }

    #[test]
    fn dmp_output() {
        let run = run("a: chr 0x41 0xff\ndmp a[1]\ndmp 0");
        assert_eq!(run.out.text(), "ff\n41\n");

        let run = self::run("chr 1\ndmp");
        let text = run.out.text();
        // Header plus 128 / 16 rows
        assert_eq!(text.lines().count(), 9);
        assert!(text.lines().nth(1).unwrap().starts_with("000- | 01 00"));
    }

    #[test]
    fn reg_output() {
        let run = run("mov r2 -3\nfoo\nreg");
        let text = run.out.text();
        assert_eq!(text.lines().count(), 16);
        assert!(text.starts_with(" 0: 0\n 1: 1\n 2: -3\n"));
        assert!(text.ends_with("15: 0\n"));
        assert_eq!(run.status(), 0);
    }

    #[test]
    fn lbl_lists_labels_once() {
        let src = "\
start: nop
msg: chr 'hi' 0
main: lbl
end: nop";
        let run = run(src);
        assert_eq!(
            run.out.text(),
            "start (0) -> N/A\nmsg (1) -> 0x0000\nmain (2) -> N/A\nend (3) -> N/A\n"
        );
    }
}
