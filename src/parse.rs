use crate::lexer::QUOTE;
use crate::symbol::{Label, Operand, Register};

/// Classify a raw token.
///
/// Tried in order: register (`r12`), string (`'text'`), hex integer (`0x1f`, `-0x1f`), decimal
/// integer (`42`, `-42`). Anything else is a label reference, with an optional offset suffix
/// (`buf[3]`, `buf[+3]`, `buf[-1]`).
pub fn parse_operand(token: &str) -> Operand {
    if let Some(reg) = parse_register(token) {
        return Operand::Register(reg);
    }
    if let Some(string) = parse_string(token) {
        return Operand::String(string.to_string());
    }
    if let Some(val) = parse_integer(token) {
        return Operand::Integer(val);
    }
    Operand::Label(parse_label(token))
}

fn parse_register(token: &str) -> Option<Register> {
    let digits = token.strip_prefix('r')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(Register)
}

fn parse_string(token: &str) -> Option<&str> {
    token.strip_prefix(QUOTE)?.strip_suffix(QUOTE)
}

/// Hex or decimal literal, with an optional leading `-`.
pub fn parse_integer(token: &str) -> Option<i64> {
    let (negative, magnitude) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let value = match magnitude.strip_prefix("0x") {
        Some(hex) => {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u64::from_str_radix(hex, 16).ok()? as i64
        }
        None => {
            if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // Parse with sign attached so that `i64::MIN` fits
            return token.parse().ok();
        }
    };
    Some(if negative { value.wrapping_neg() } else { value })
}

fn parse_label(token: &str) -> Label {
    let offset = token
        .strip_suffix(']')
        .and_then(|rest| rest.split_once('['))
        .and_then(|(name, offs)| {
            let digits = offs.strip_prefix(['+', '-']).unwrap_or(offs);
            if name.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            Some((name, offs.parse::<i64>().ok()?))
        });
    match offset {
        Some((name, offs)) => Label::with_offset(name, offs),
        None => Label::new(token),
    }
}
