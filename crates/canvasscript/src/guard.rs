//! Cheap structural checks run on a logic body before any parser or engine
//! sees it.

use crate::error::ParseError;

/// Largest logic body accepted, in bytes.
pub(crate) const MAX_SOURCE_LEN: usize = 64 * 1024;

/// Deepest bracket nesting, and longest run of prefix operators, accepted.
pub(crate) const MAX_NESTING: usize = 256;

fn position(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

fn too_deep(source: &str, offset: usize) -> ParseError {
    let (line, column) = position(source, offset);
    ParseError::new(format!(
        "Nesting deeper than {} levels at {}:{}",
        MAX_NESTING, line, column
    ))
}

/// Rejects bodies whose size or nesting would exhaust the parser's stack.
///
/// Brackets inside comments, string literals and template text are not
/// counted; `${` inside a template opens a level like any other bracket.
pub(crate) fn check_source(source: &str) -> Result<(), ParseError> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(ParseError::new(format!(
            "Logic body is {} bytes, the limit is {}",
            source.len(),
            MAX_SOURCE_LEN
        )));
    }

    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut prefix_run = 0usize;
    // depth at which each open `${` started
    let mut substitutions: Vec<usize> = Vec::new();
    let mut in_template = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if in_template {
            match b {
                b'\\' => i += 1,
                b'`' => in_template = false,
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    substitutions.push(depth);
                    depth += 1;
                    if depth > MAX_NESTING {
                        return Err(too_deep(source, i));
                    }
                    in_template = false;
                    i += 1;
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            b'\'' | b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => in_template = true,
            b'(' | b'[' | b'{' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(too_deep(source, i));
                }
            }
            b')' | b']' => depth = depth.saturating_sub(1),
            b'}' => {
                depth = depth.saturating_sub(1);
                if substitutions.last() == Some(&depth) {
                    substitutions.pop();
                    in_template = true;
                }
            }
            _ => {}
        }

        if matches!(b, b'!' | b'~' | b'+' | b'-') {
            prefix_run += 1;
            if prefix_run > MAX_NESTING {
                return Err(too_deep(source, i));
            }
        } else if !b.is_ascii_whitespace() {
            prefix_run = 0;
        }
        i += 1;
    }
    Ok(())
}
