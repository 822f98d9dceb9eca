use digest_core::AuthHeader;
use smol_str::SmolStr;

/// Longest `Authorization` / `WWW-Authenticate` value we are willing to split.
pub const MAX_AUTH_HEADER_LEN: usize = 4096;

/// Parses an `Authorization` header value into scheme and parameters.
///
/// Quoted values are unescaped, unquoted tokens are kept verbatim. Returns
/// `None` for anything that cannot be represented as a valid [`AuthHeader`]
/// (unbalanced quotes, duplicate parameters, control characters, ...).
pub fn parse_authorization_header(value: &str) -> Option<AuthHeader> {
    parse_auth_like_header(value)
}

/// Parses a `WWW-Authenticate` challenge value. Same grammar as credentials.
pub fn parse_www_authenticate_header(value: &str) -> Option<AuthHeader> {
    parse_auth_like_header(value)
}

fn parse_auth_like_header(value: &str) -> Option<AuthHeader> {
    if value.len() > MAX_AUTH_HEADER_LEN {
        return None;
    }
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (scheme, remainder) = match trimmed.split_once(|c: char| c == ' ' || c == '\t') {
        Some((scheme, rest)) => (scheme, rest),
        None => (trimmed, ""),
    };
    let mut header = AuthHeader::new(SmolStr::new(scheme)).ok()?;
    for part in split_quoted_commas(remainder)? {
        let (name, raw) = part.split_once('=')?;
        let cleaned = unquote(raw.trim())?;
        header.add_param(name.trim(), cleaned).ok()?;
    }
    Some(header)
}

/// Splits on commas that are not inside a quoted-string.
///
/// Returns `None` when a quoted-string is left open.
fn split_quoted_commas(input: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                escaped = true;
                current.push(ch);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_owned());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if in_quotes || escaped {
        return None;
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_owned());
    }
    Some(parts)
}

/// Strips surrounding quotes and resolves `\x` quoted-pairs.
fn unquote(raw: &str) -> Option<String> {
    let Some(inner) = raw.strip_prefix('"') else {
        if raw.contains('"') {
            return None;
        }
        return Some(raw.to_owned());
    };
    let inner = inner.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push(chars.next()?),
            '"' => return None,
            _ => out.push(ch),
        }
    }
    Some(out)
}
