//! Extracts `{name:Type}` placeholders from a query template and substitutes
//! bound [`Value`]s as typed SQL literals.

use crate::error::{Error, Result};
use crate::sql::render::render_literal;
use crate::value::{Params, Value};
use clickhouse_types::DataTypeNode;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::CharIndices;

/// Renders `template`, replacing every `{name}` or `{name:Type}` placeholder
/// with the literal form of the value bound to `name` in `params`.
///
/// Placeholders are only recognized outside single-quoted string literals,
/// `--`/`#` line comments, and `/* */` block comments, so a query like
/// `SELECT {a:UInt64} -- {b:Date}` only binds `a`.
pub(crate) fn render_query(template: &str, params: &Params) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut declared_types: HashMap<String, String> = HashMap::new();
    let mut chars = template.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\'' => {
                out.push(ch);
                consume_quoted_literal(&mut chars, &mut out);
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(ch);
                consume_line_comment(&mut chars, &mut out);
            }
            '#' => {
                out.push(ch);
                consume_line_comment(&mut chars, &mut out);
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push(ch);
                consume_block_comment(&mut chars, &mut out);
            }
            '{' => {
                let placeholder = consume_placeholder(template, &mut chars, i)?;
                render_placeholder(placeholder, params, &mut declared_types, &mut out)?;
            }
            ch => out.push(ch),
        }
    }

    Ok(out)
}

/// Copies a `'...'`-delimited literal (with `\`-escaping) verbatim, including
/// the closing quote.
fn consume_quoted_literal(chars: &mut Peekable<CharIndices<'_>>, out: &mut String) {
    while let Some((_, ch)) = chars.next() {
        out.push(ch);
        match ch {
            '\\' => {
                if let Some((_, next)) = chars.next() {
                    out.push(next);
                }
            }
            '\'' => break,
            _ => {}
        }
    }
}

/// Copies the rest of a `--`/`#` comment verbatim, stopping before the
/// newline (if any), which the caller's loop will then copy as plain text.
fn consume_line_comment(chars: &mut Peekable<CharIndices<'_>>, out: &mut String) {
    while let Some((_, ch)) = chars.peek() {
        if *ch == '\n' {
            break;
        }
        out.push(*ch);
        chars.next();
    }
}

/// Copies a `/* ... */` comment verbatim, including both delimiters. The
/// leading `/` was already pushed by the caller.
fn consume_block_comment(chars: &mut Peekable<CharIndices<'_>>, out: &mut String) {
    let mut prev_star = false;
    while let Some((_, ch)) = chars.next() {
        out.push(ch);
        if prev_star && ch == '/' {
            break;
        }
        prev_star = ch == '*';
    }
}

/// Returns the text between a `{` at `brace_pos` and its matching `}`,
/// treating `'...'` spans inside the placeholder (e.g. an `Enum8('a'=-1)`
/// type annotation) as opaque so an embedded `}` can't end the placeholder
/// early.
fn consume_placeholder<'a>(
    template: &'a str,
    chars: &mut Peekable<CharIndices<'a>>,
    brace_pos: usize,
) -> Result<&'a str> {
    let start = brace_pos + 1;
    let mut in_quotes = false;

    for (i, ch) in chars.by_ref() {
        match ch {
            // Quoted enum labels escape a quote by doubling it (`'it''s'`),
            // so a plain toggle on every `'` tracks the quoted state.
            '\'' => in_quotes = !in_quotes,
            '}' if !in_quotes => return Ok(&template[start..i]),
            _ => {}
        }
    }

    Err(Error::Protocol(format!(
        "unterminated parameter placeholder in {template:?}"
    )))
}

fn render_placeholder(
    placeholder: &str,
    params: &Params,
    declared_types: &mut HashMap<String, String>,
    out: &mut String,
) -> Result<()> {
    let (name, explicit_ty) = match placeholder.split_once(':') {
        Some((name, ty)) => (name.trim(), Some(ty.trim())),
        None => (placeholder.trim(), None),
    };

    if let Some(ty) = explicit_ty {
        if let Some(prev) = declared_types.insert(name.to_string(), ty.to_string()) {
            if prev != ty {
                return Err(Error::ParameterConflicting(name.to_string()));
            }
        }
    }

    let value = params
        .get(name)
        .ok_or_else(|| Error::ParameterMissing(name.to_string()))?;

    let ty = match explicit_ty {
        Some(ty) => DataTypeNode::parse(ty)?,
        None => infer_type(value).ok_or_else(|| Error::ParameterUntyped(name.to_string()))?,
    };

    render_literal(value, &ty, out)
}

/// Infers a type for an untyped `{name}` placeholder directly from the
/// shape of the bound value. `Value::Null` has no unambiguous type, so it
/// is rejected rather than guessed at.
fn infer_type(value: &Value) -> Option<DataTypeNode> {
    Some(match value {
        Value::Null => return None,
        Value::Bool(_) => DataTypeNode::Bool,
        Value::Int8(_) => DataTypeNode::Int8,
        Value::Int16(_) => DataTypeNode::Int16,
        Value::Int32(_) => DataTypeNode::Int32,
        Value::Int64(_) => DataTypeNode::Int64,
        Value::Int128(_) => DataTypeNode::Int128,
        Value::Int256(_) => DataTypeNode::Int256,
        Value::UInt8(_) => DataTypeNode::UInt8,
        Value::UInt16(_) => DataTypeNode::UInt16,
        Value::UInt32(_) => DataTypeNode::UInt32,
        Value::UInt64(_) => DataTypeNode::UInt64,
        Value::UInt128(_) => DataTypeNode::UInt128,
        Value::UInt256(_) => DataTypeNode::UInt256,
        Value::Float32(_) => DataTypeNode::Float32,
        Value::Float64(_) => DataTypeNode::Float64,
        Value::Str(_) => DataTypeNode::String,
        Value::FixedBytes(b) => DataTypeNode::FixedString(b.len()),
        Value::Uuid(_) => DataTypeNode::Uuid,
        Value::Ipv4(_) => DataTypeNode::IPv4,
        Value::Ipv6(_) => DataTypeNode::IPv6,
        Value::Array(items) => {
            let inner = items.first().and_then(infer_type)?;
            DataTypeNode::Array(Box::new(inner))
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_typed_placeholder() {
        let params = Params::new().bind("id", 42i32);
        assert_eq!(
            render_query("SELECT * FROM t WHERE id = {id:Int32}", &params).unwrap(),
            "SELECT * FROM t WHERE id = 42"
        );
    }

    #[test]
    fn infers_type_for_untyped_placeholder() {
        let params = Params::new().bind("name", "bob");
        assert_eq!(
            render_query("SELECT * FROM t WHERE name = {name}", &params).unwrap(),
            "SELECT * FROM t WHERE name = 'bob'"
        );
    }

    #[test]
    fn rejects_missing_parameter() {
        let params = Params::new();
        let err = render_query("SELECT {x:Int32}", &params).unwrap_err();
        assert!(matches!(err, Error::ParameterMissing(name) if name == "x"));
    }

    #[test]
    fn rejects_untyped_null() {
        let params = Params::new().bind("x", Value::Null);
        let err = render_query("SELECT {x}", &params).unwrap_err();
        assert!(matches!(err, Error::ParameterUntyped(name) if name == "x"));
    }

    #[test]
    fn rejects_conflicting_type_annotations() {
        let params = Params::new().bind("x", 1i32);
        let err =
            render_query("SELECT {x:Int32} + {x:UInt64}", &params).unwrap_err();
        assert!(matches!(err, Error::ParameterConflicting(name) if name == "x"));
    }

    #[test]
    fn rejects_unterminated_placeholder() {
        let params = Params::new();
        assert!(render_query("SELECT {x", &params).is_err());
    }

    #[test]
    fn reuses_same_name_with_matching_type() {
        let params = Params::new().bind("x", 7i32);
        assert_eq!(
            render_query("SELECT {x:Int32}, {x:Int32}", &params).unwrap(),
            "SELECT 7, 7"
        );
    }

    #[test]
    fn ignores_placeholders_inside_comments() {
        let params = Params::new().bind("a", 1u64).bind("b", "x");
        let rendered = render_query(
            "SELECT {a:UInt64}, {b:String} /* {c:Int32} */ -- {d:Date}",
            &params,
        )
        .unwrap();
        assert_eq!(rendered, "SELECT 1, 'x' /* {c:Int32} */ -- {d:Date}");
    }

    #[test]
    fn ignores_braces_inside_string_literals() {
        let params = Params::new().bind("a", 1i32);
        let rendered = render_query("SELECT '{not a param}', {a:Int32}", &params).unwrap();
        assert_eq!(rendered, "SELECT '{not a param}', 1");
    }

    #[test]
    fn tracks_quotes_inside_an_enum_type_annotation() {
        let params = Params::new().bind("x", "a");
        let rendered = render_query("SELECT {x:Enum8('a' = 1, 'b}' = 2)}", &params).unwrap();
        assert_eq!(rendered, "SELECT 'a'");
    }
}
