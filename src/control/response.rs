//! Response matching rules, defined once for every assertion.
//!
//! Responses are line-oriented text with no schema. Three shapes are
//! recognized: an exact token (`OK`), a `Value:\t<value>` line, and
//! socket addresses embedded in free text (`leader`, `dropped`).

use std::collections::BTreeSet;
use std::net::SocketAddr;

use crate::ControlError;

pub const OK_TOKEN: &str = "OK";
pub const VALUE_PREFIX: &str = "Value:\t";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    source: SocketAddr,
    raw: String,
}

impl ControlResponse {
    /// Wraps response bytes received from `source`.
    ///
    /// # Errors
    /// [`ControlError::Protocol`] when the bytes are not UTF-8 or carry no
    /// non-blank line.
    pub fn parse(
        source: SocketAddr,
        bytes: Vec<u8>,
    ) -> std::result::Result<Self, ControlError> {
        let raw = String::from_utf8(bytes).map_err(|_| ControlError::Protocol {
            target: source,
            reason: "response is not valid UTF-8".into(),
        })?;
        if raw.trim().is_empty() {
            return Err(ControlError::Protocol {
                target: source,
                reason: "empty response".into(),
            });
        }
        Ok(Self { source, raw })
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whole response equals `token`, ignoring surrounding whitespace.
    /// `OK, but...` or `NOT OK` do not match.
    pub fn is_token(
        &self,
        token: &str,
    ) -> bool {
        self.raw.trim() == token
    }

    pub fn is_ok(&self) -> bool {
        self.is_token(OK_TOKEN)
    }

    /// Text following the first `Value:\t` on any line, up to end of line
    pub fn value(&self) -> Option<&str> {
        self.raw.lines().find_map(|line| {
            line.find(VALUE_PREFIX).map(|at| line[at + VALUE_PREFIX.len()..].trim_end())
        })
    }

    /// A `Value:\t<expected>` line is present. The value must match
    /// entirely, so `2` does not match `Value:\t20`.
    pub fn has_value(
        &self,
        expected: &str,
    ) -> bool {
        self.raw.lines().any(|line| {
            line.find(VALUE_PREFIX)
                .map(|at| line[at + VALUE_PREFIX.len()..].trim_end() == expected)
                .unwrap_or(false)
        })
    }

    /// Leader address from a `leader` response: the last address-shaped
    /// token of the first non-blank line.
    pub fn leader_address(&self) -> std::result::Result<SocketAddr, ControlError> {
        let line = self.raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
        tokens(line).filter_map(parse_addr).last().ok_or_else(|| ControlError::Protocol {
            target: self.source,
            reason: format!("no leader address in {:?}", self.raw),
        })
    }

    /// Every address found anywhere in the response; an answer without
    /// addresses is an empty set, not an error.
    pub fn addresses(&self) -> BTreeSet<SocketAddr> {
        tokens(&self.raw).filter_map(parse_addr).collect()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '{' | '}' | '"' | '\''))
        .filter(|t| !t.is_empty())
}

/// Accepts `1.2.3.4:5` and `[::1]:5`, also when wrapped in list brackets,
/// parentheses or followed by a full stop.
fn parse_addr(token: &str) -> Option<SocketAddr> {
    token.parse().ok().or_else(|| {
        let trimmed = token
            .trim_start_matches('(')
            .trim_end_matches(|c: char| matches!(c, ')' | '.'))
            .trim_start_matches('[')
            .trim_end_matches(']');
        trimmed.parse().ok().or_else(|| format!("[{trimmed}").parse().ok())
    })
}
