use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

/// Cells per row of a memory dump.
pub const BYTES_PER_ROW: usize = 16;

/// Cell value as at least two hex digits, with a sign if negative.
fn hex(value: i64) -> String {
    if value < 0 {
        format!("-{:x}", value.unsigned_abs())
    } else {
        format!("{value:02x}")
    }
}

/// Print a single memory cell in hex.
pub fn write_cell(f: &mut impl Write, value: i64) -> io::Result<()> {
    writeln!(f, "{}", hex(value))
}

/// Print all of memory as a hex grid with a row-address gutter.
///
/// ```text
///         0  1  2  3 ...
/// 000- | 48 69 00 00 ...
/// 001- | 00 00 00 00 ...
/// ```
pub fn write_memory(f: &mut impl Write, mem: &[i64]) -> io::Result<()> {
    write!(f, "{:7}", "")?;
    let header: Vec<_> = (0..BYTES_PER_ROW).map(|i| format!("{i:>2x}")).collect();
    writeln!(f, "{}", header.join(" "))?;

    for (row, cells) in mem.chunks(BYTES_PER_ROW).enumerate() {
        let cells: Vec<_> = cells.iter().map(|cell| hex(*cell)).collect();
        writeln!(f, "{row:03x}- | {}", cells.join(" "))?;
    }
    Ok(())
}

/// Print each label with its program counter and resolved address, if bound.
pub fn write_labels<'a>(
    f: &mut impl Write,
    labels: impl IntoIterator<Item = (&'a str, usize, Option<i64>)>,
) -> io::Result<()> {
    for (name, pc, addr) in labels {
        match addr {
            Some(addr) => writeln!(f, "{name} ({pc}) -> 0x{addr:04x}")?,
            None => writeln!(f, "{name} ({pc}) -> N/A")?,
        }
    }
    Ok(())
}

pub fn write_registers(f: &mut impl Write, regs: &[i64]) -> io::Result<()> {
    for (i, reg) in regs.iter().enumerate() {
        writeln!(f, "{i:>2}: {reg}")?;
    }
    Ok(())
}

/// Output sink that stays readable after a clone of it is handed to a machine.
#[derive(Clone, Default, Debug)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
