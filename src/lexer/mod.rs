use miette::Result;

use crate::error;
use crate::lexer::cursor::Cursor;

pub mod cursor;

/// Starts an end-of-line comment.
pub const COMMENT: char = '#';
/// Separates a label name from the rest of the line.
pub const LABEL_DELIM: char = ':';
/// Delimits string literals, which are preserved verbatim inside a token.
pub const QUOTE: char = '\'';

/// Test if a character separates tokens.
pub(crate) fn is_whitespace(c: char) -> bool {
    c.is_whitespace()
}

/// Split a leading `label:` off a line.
///
/// Only the first delimiter counts, and only if it appears before any string literal or comment,
/// so `chr 'a:b'` is not mistaken for a label.
pub fn split_label(line: &str) -> (Option<&str>, &str) {
    for (idx, c) in line.char_indices() {
        match c {
            LABEL_DELIM => return (Some(line[..idx].trim()), &line[idx + 1..]),
            QUOTE | COMMENT => break,
            _ => (),
        }
    }
    (None, line)
}

/// Split a line into whitespace-separated tokens.
///
/// Quoted sections are kept intact (quotes included) and may contain whitespace or `#`. A `#`
/// outside of quotes discards the rest of the line.
pub fn tokenize(line: &str) -> Result<Vec<&str>> {
    let mut cur = Cursor::new(line);
    let mut tokens = Vec::new();

    loop {
        cur.take_while(is_whitespace);
        match cur.first() {
            None | Some(COMMENT) => break,
            Some(_) => (),
        }

        let start = cur.pos();
        while let Some(c) = cur.first() {
            if is_whitespace(c) || c == COMMENT {
                break;
            }
            cur.bump();
            if c == QUOTE {
                let quote_start = cur.pos() - 1;
                cur.take_while(|c| c != QUOTE);
                if cur.bump().is_none() {
                    return Err(error::lex_unclosed_str(quote_start..cur.pos(), line));
                }
            }
        }
        tokens.push(cur.since(start));
    }
    Ok(tokens)
}
