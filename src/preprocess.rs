//! Comment stripping and `#define` harvesting for declaration text.
//!
//! The declaration language allows one preprocessor form: `#define NAME X`
//! where `X` is either an integer literal or literally `...`. The former
//! registers `NAME` as an integer constant with a known value, the latter as
//! one whose value must be measured externally. Everything else that looks
//! like a directive is rejected here rather than producing a confusing
//! grammar error later.
//!
//! Comments are blanked to spaces. Newlines inside block comments are kept
//! so line numbers in later diagnostics stay accurate. String literals are
//! not part of the declaration language and get no special treatment.

use crate::error::DeclarationError;
use crate::StringId;

/// A harvested `#define` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroDef {
    pub name: StringId,
    /// `None` when the body was `...`.
    pub value: Option<i64>,
    pub line: u32,
}

/// Declaration text with comments and directives removed.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub source: String,
    pub macros: Vec<MacroDef>,
}

pub fn prepare(input: &str) -> Result<Prepared, DeclarationError> {
    let mut out = String::with_capacity(input.len());
    let mut macros = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line: u32 = 1;
    let mut at_line_start = true;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start_line = line;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\n' {
                        line += 1;
                        out.push('\n');
                    } else if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(DeclarationError::UnterminatedComment { line: start_line });
                }
                out.push(' ');
            }
            '#' if at_line_start => {
                let mut rest = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    rest.push(c);
                    chars.next();
                }
                harvest_directive(&rest, line, &mut macros)?;
            }
            '\n' => {
                line += 1;
                at_line_start = true;
                out.push('\n');
            }
            c if c.is_whitespace() => {
                out.push(c);
            }
            c => {
                at_line_start = false;
                out.push(c);
            }
        }
    }

    Ok(Prepared { source: out, macros })
}

fn harvest_directive(
    rest: &str,
    line: u32,
    macros: &mut Vec<MacroDef>,
) -> Result<(), DeclarationError> {
    let body = rest.trim();
    let directive_error = || DeclarationError::Directive {
        text: format!("#{}", body),
        line,
    };

    let after = match body.strip_prefix("define") {
        Some(after) if after.starts_with(|c: char| c.is_whitespace()) => after.trim_start(),
        _ => return Err(directive_error()),
    };

    let name_len = after
        .char_indices()
        .take_while(|&(i, c)| {
            if i == 0 {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || c == '_'
            }
        })
        .count();
    if name_len == 0 {
        return Err(directive_error());
    }
    let (name, rest) = after.split_at(name_len);
    let body = rest.trim();
    let value = if body == "..." {
        None
    } else {
        match parse_int_literal(body) {
            Some(Ok(value)) => Some(value),
            Some(Err(())) => return Err(DeclarationError::IntegerOutOfRange { line }),
            None => {
                return Err(DeclarationError::BadDefine {
                    name: name.to_owned(),
                    line,
                })
            }
        }
    };
    macros.push(MacroDef {
        name: StringId::new(name),
        value,
        line,
    });
    Ok(())
}

/// Recognize a decimal, hex or octal integer literal with optional `uUlL`
/// suffix letters. `None` means "not an integer literal at all"; `Err`
/// means it overflows the representable range.
fn parse_int_literal(text: &str) -> Option<Result<i64, ()>> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if digits.is_empty() || text.len() - digits.len() > 3 {
        return None;
    }
    let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
    let (radix, digits) = if let Some(hex) = hex {
        (16, hex)
    } else if digits != "0" && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: u128 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(radix)?;
        value = value.wrapping_mul(u128::from(radix)).wrapping_add(u128::from(digit));
        if value > i64::MAX as u128 {
            return Some(Err(()));
        }
    }
    Some(Ok(value as i64))
}
