// Heavily inspired by the cursor in `rustc_lexer` and adapted to work on a single source line.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

/// Peekable iterator over the characters of one line, tracking byte position.
#[derive(Clone)]
pub struct Cursor<'a> {
    src: &'a str,
    chars: Chars<'a>,
    /// Byte index of the next character
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Cursor<'a> {
        Cursor {
            src,
            chars: src.chars(),
            pos: 0,
        }
    }

    /// Peek the next character without consuming it.
    pub fn first(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Consume one character.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Eat characters while the predicate holds.
    pub fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while self.first().is_some_and(&mut predicate) {
            self.bump();
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Slice of the line from `start` up to the cursor.
    pub fn since(&self, start: usize) -> &'a str {
        &self.src[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_byte_position() {
        let mut cur = Cursor::new("é ab");
        assert_eq!(cur.bump(), Some('é'));
        assert_eq!(cur.pos(), 2);
        cur.take_while(char::is_whitespace);
        cur.take_while(|c| c.is_ascii_alphabetic());
        assert_eq!(cur.since(3), "ab");
        assert_eq!(cur.first(), None);
    }
}
