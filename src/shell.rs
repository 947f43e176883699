//! Shell quoting for the record header line.

use std::borrow::Cow;

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '_' | '%' | '+' | ',' | '-' | '.' | '/' | ':' | '=' | '@' | '^'
        )
}

/// Quote one argument for a `sh`-compatible shell.
///
/// Arguments made only of safe characters pass through bare; everything else
/// is single-quoted, with embedded single quotes written as `'\''`.
pub fn quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_safe) {
        return Cow::Borrowed(arg);
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    Cow::Owned(out)
}

/// Render an argv as a single copy-pasteable command line.
pub fn quote_command(argv: &[String]) -> String {
    argv.iter()
        .map(|a| quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}
