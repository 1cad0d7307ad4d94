use std::fmt;

// See https://clickhouse.com/docs/en/sql-reference/syntax#string
pub(crate) fn string(src: &str, dst: impl fmt::Write) -> fmt::Result {
    escape(src, dst, '\'')
}

// See https://clickhouse.com/docs/en/sql-reference/syntax#identifiers
pub(crate) fn identifier(src: &str, dst: impl fmt::Write) -> fmt::Result {
    escape(src, dst, '`')
}

fn escape(src: &str, mut dst: impl fmt::Write, quote: char) -> fmt::Result {
    dst.write_char(quote)?;

    for ch in src.chars() {
        match ch {
            '\\' => dst.write_str("\\\\")?,
            '\0' => dst.write_str("\\0")?,
            '\u{7}' => dst.write_str("\\a")?,
            '\u{8}' => dst.write_str("\\b")?,
            '\u{c}' => dst.write_str("\\f")?,
            '\n' => dst.write_str("\\n")?,
            '\r' => dst.write_str("\\r")?,
            '\t' => dst.write_str("\\t")?,
            '\u{b}' => dst.write_str("\\v")?,
            ch if ch == quote => {
                dst.write_char('\\')?;
                dst.write_char(quote)?;
            }
            ch if (ch as u32) < 0x20 => write!(dst, "\\x{:02X}", ch as u32)?,
            ch => dst.write_char(ch)?,
        }
    }

    dst.write_char(quote)
}

#[test]
fn it_escapes_string() {
    let mut actual = String::new();
    string(r"f\o'o '' b\'ar'", &mut actual).unwrap();
    assert_eq!(actual, r"'f\\o\'o \'\' b\\\'ar\''");
}

#[test]
fn it_escapes_identifier() {
    let mut actual = String::new();
    identifier(r"f\o`o `` b\`ar`", &mut actual).unwrap();
    assert_eq!(actual, r"`f\\o\`o \`\` b\\\`ar\``");
}

#[test]
fn it_escapes_control_bytes() {
    let mut actual = String::new();
    string("line1\nline2\ttab\r\0end", &mut actual).unwrap();
    assert_eq!(actual, r"'line1\nline2\ttab\r\0end'");
}

#[test]
fn it_escapes_named_control_characters() {
    let mut actual = String::new();
    string("\u{7}\u{8}\u{c}\u{b}", &mut actual).unwrap();
    assert_eq!(actual, r"'\a\b\f\v'");
}

#[test]
fn it_escapes_other_control_bytes_as_hex() {
    let mut actual = String::new();
    string("\u{1}\u{1f}", &mut actual).unwrap();
    assert_eq!(actual, r"'\x01\x1F'");
}
