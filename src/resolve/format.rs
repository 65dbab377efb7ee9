/// One piece of a `format!` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Literal text, with `{{` and `}}` unescaped.
    Text(String),

    /// `{}`: the next positional argument.
    Next,

    /// `{0}`
    Index(usize),

    /// `{name}`: a named argument, or an item captured from scope.
    Name(String),
}

/// Splits a `format!` string into text and placeholders.
///
/// Only plain placeholders are supported; format specs such as `{:>8}` are rejected.
pub fn parse_format(format: &str) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                _ = chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                _ = chars.next();
                text.push('}');
            }
            '{' => {
                let mut spec = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => spec.push(c),
                        None => return Err(format!("unterminated placeholder in {format:?}")),
                    }
                }

                if !text.is_empty() {
                    pieces.push(Piece::Text(core::mem::take(&mut text)));
                }
                pieces.push(placeholder(&spec)?);
            }
            '}' => return Err(format!("unmatched `}}` in {format:?}")),
            c => text.push(c),
        }
    }

    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }

    Ok(pieces)
}

fn placeholder(spec: &str) -> Result<Piece, String> {
    let (argument, options) = spec.split_once(':').unwrap_or((spec, ""));
    if !options.is_empty() {
        return Err(format!("format options `{{{spec}}}` are not supported"));
    }

    let argument = argument.trim();
    if argument.is_empty() {
        Ok(Piece::Next)
    } else if let Ok(index) = argument.parse() {
        Ok(Piece::Index(index))
    } else if argument.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Ok(Piece::Name(argument.to_string()))
    } else {
        Err(format!("`{{{spec}}}` is not a valid placeholder"))
    }
}
