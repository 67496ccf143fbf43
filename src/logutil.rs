//! Logging helpers that keep user text single-line and chat identities out of the logs.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///
/// Strings longer than 300 characters are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Mask the chat part of a player identity, keeping the adapter name and the
/// last four characters: `telegram:12345678` => `telegram:…5678`.
pub fn redact_identity(id: &str) -> String {
    const KEEP: usize = 4;
    let (adapter, chat) = match id.split_once(':') {
        Some((adapter, chat)) => (adapter, chat),
        None => ("", id),
    };
    let len = chat.chars().count();
    let tail: String = if len > KEEP {
        let mut s = String::from("…");
        s.extend(chat.chars().skip(len - KEEP));
        s
    } else {
        chat.to_string()
    };
    if adapter.is_empty() {
        escape_log(&tail)
    } else {
        format!("{}:{}", adapter, escape_log(&tail))
    }
}
