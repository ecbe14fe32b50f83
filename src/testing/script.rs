//! Scenario script parsing
//!
//! A script is plain text with one directive per line:
//! ```text
//! # comment
//! S:220
//! C:QUIT
//! S:221
//! ```

use std::path::Path;

use crate::common::{Error, Result};

/// A single parsed script instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Send the payload followed by CRLF
    Send(String),
    /// Expect the next reply line to start with this code
    ExpectCode(String),
}

const SEND_PREFIX: &str = "C:";
const EXPECT_PREFIX: &str = "S:";

/// Parse a script file
pub fn parse_file(path: &Path) -> Result<Vec<Directive>> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ScriptRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_str(&content))
}

/// Parse script text
///
/// Blank and `#` lines are dropped. Lines that are neither `C:` nor `S:`
/// are logged and skipped; they never make the parse fail.
pub fn parse_str(content: &str) -> Vec<Directive> {
    let mut directives = Vec::new();

    for (index, raw) in content.split('\n').enumerate() {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let line = line.trim_start();
        if line.starts_with('#') {
            continue;
        }

        if let Some(payload) = line.strip_prefix(SEND_PREFIX) {
            directives.push(Directive::Send(payload.to_string()));
        } else if let Some(rest) = line.strip_prefix(EXPECT_PREFIX) {
            let code = rest.chars().take(crate::smtp::session::REPLY_CODE_LEN).collect();
            directives.push(Directive::ExpectCode(code));
        } else {
            tracing::warn!(line = index + 1, "Unknown line format: {}", line);
        }
    }

    directives
}
