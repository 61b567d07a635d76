//! SMTP response parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from framed response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK`
/// - Multi: `250-First line`, `250-Second line`, `250 Last line`
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code_str = first
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {first}")))?;
    let code = code_str
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code_str}")))?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        match line.len() {
            3 | 4 => message.push(String::new()),
            n if n > 4 => {
                // Skip code and separator (e.g., "250-" or "250 ")
                let text = line
                    .get(4..)
                    .ok_or_else(|| Error::Protocol(format!("Malformed reply line: {line}")))?;
                message.push(text.to_string());
            }
            _ => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
        }
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
/// A bare three-digit code is also terminal.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    let has_code = bytes.len() >= 3 && bytes[..3].iter().all(u8::is_ascii_digit);
    has_code && (bytes.len() == 3 || bytes[3] == b' ')
}
