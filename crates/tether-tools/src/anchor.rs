// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Content-hash line anchors shared by the read and edit tools.
//!
//! `read` emits every line as `<lineno>:<hash>|<content>`; `edit` accepts
//! `<lineno>:<hash>` (or a `-`-joined pair for an inclusive range) and
//! refuses to touch a line whose current hash no longer matches.  A hash
//! reference only resolves while the line still exists unchanged, which
//! makes it safer than a bare line number and more flexible than
//! exact-substring matching when the model edits the same file across
//! several turns.

use sha2::{Digest, Sha256};

/// Short hex digest of one line's content, newline excluded.
pub fn line_hash(line: &str) -> String {
    let digest = Sha256::digest(line.as_bytes());
    hex::encode(&digest[..2])
}

/// Format a line the way the read tool presents it to the model.
pub fn format_line(lineno: usize, content: &str) -> String {
    format!("{lineno}:{}|{content}", line_hash(content))
}

/// A single `<line>:<hash>` anchor.  `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAnchor {
    pub line: usize,
    pub hash: String,
}

/// A parsed hash reference: one line or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashRef {
    Line(LineAnchor),
    Range(LineAnchor, LineAnchor),
}

impl HashRef {
    /// Parse `"<line>:<hh>"` or `"<line1>:<hh1>-<line2>:<hh2>"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let invalid = || {
            format!(
                "invalid hash reference {s:?}; expected \"<line>:<hash>\" or \
                 \"<line1>:<hash1>-<line2>:<hash2>\" as returned by the read tool"
            )
        };
        let mut parts = s.trim().splitn(2, '-');
        let start = parse_anchor(parts.next().unwrap_or("")).ok_or_else(invalid)?;
        match parts.next() {
            None => Ok(Self::Line(start)),
            Some(rest) => {
                let end = parse_anchor(rest).ok_or_else(invalid)?;
                Ok(Self::Range(start, end))
            }
        }
    }

    /// Resolve against the current file content, returning the 0-based
    /// inclusive line span to replace.  Fails with a drift message when an
    /// anchor no longer matches.
    pub fn resolve(&self, lines: &[String]) -> Result<(usize, usize), String> {
        match self {
            Self::Line(a) => {
                let idx = resolve_anchor(a, lines)?;
                Ok((idx, idx))
            }
            Self::Range(start, end) => {
                if end.line < start.line {
                    return Err(format!(
                        "reversed range: end line {} precedes start line {}",
                        end.line, start.line
                    ));
                }
                let s = resolve_anchor(start, lines)?;
                let e = resolve_anchor(end, lines)?;
                Ok((s, e))
            }
        }
    }
}

fn parse_anchor(s: &str) -> Option<LineAnchor> {
    let (line, hash) = s.trim().split_once(':')?;
    let line: usize = line.parse().ok()?;
    if line == 0 || hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(LineAnchor {
        line,
        hash: hash.to_ascii_lowercase(),
    })
}

/// An anchor resolves only when the line number is in range AND the line's
/// current hash matches — both conditions guard against file drift.
fn resolve_anchor(a: &LineAnchor, lines: &[String]) -> Result<usize, String> {
    let idx = a.line - 1;
    let Some(content) = lines.get(idx) else {
        return Err(format!(
            "line {} is out of range (file has {} lines); the file has changed \
             since it was read. Re-read it and retry with fresh references.",
            a.line,
            lines.len()
        ));
    };
    let current = line_hash(content);
    if current != a.hash {
        return Err(format!(
            "line {} hash mismatch (expected {}, current {}); the file has \
             changed since it was read. Re-read it and retry with fresh references.",
            a.line, a.hash, current
        ));
    }
    Ok(idx)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
