//! Anchor hashing: a formatting-independent digest of a
//! canonicalized AST subtree, used as a stable edit target instead of a text
//! range.
//!
//! Canonicalization lowercases identifiers/keywords and collapses
//! whitespace between tokens (sqlparser's tokenizer already strips
//! comments), so two subtrees that differ only in formatting or comments
//! hash identically across re-parses. Hashed with `sha2` rather than
//! `DefaultHasher`, which is explicitly not guaranteed stable across Rust
//! versions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AnchorHash(pub u64);

impl fmt::Display for AnchorHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for AnchorHash {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(AnchorHash)
    }
}

/// Canonicalize a SQL fragment: lowercase keywords/identifiers (case is
/// insignificant in both target dialects), preserve string literal contents
/// verbatim, and join tokens with single spaces so indentation/newline
/// differences vanish.
pub fn canonicalize(fragment: &str) -> String {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, fragment).tokenize() {
        Ok(t) => t,
        // Not every anchorable fragment (e.g. a bare FROM clause) tokenizes
        // standalone cleanly in all edge cases; fall back to a whitespace
        // normalization so hashing never panics on exotic input.
        Err(_) => return fragment.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase(),
    };

    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match tok {
            Token::Word(w) => out.push_str(&w.value.to_ascii_lowercase()),
            Token::SingleQuotedString(s) => {
                out.push('\'');
                out.push_str(s);
                out.push('\'');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

/// Hash a canonicalized fragment with SHA-256, truncated to a u64 — the
/// same truncated-SHA256 construction the correctness gate's row hashing
/// uses, for one stable-hashing story across the crate.
pub fn hash_fragment(fragment: &str) -> AnchorHash {
    let canon = canonicalize(fragment);
    let digest = Sha256::digest(canon.as_bytes());
    AnchorHash(u64::from_be_bytes(digest[0..8].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_do_not_change_the_hash() {
        let a = hash_fragment("SELECT a, b FROM t WHERE x = 1");
        let b = hash_fragment("select   a,\n b\nfrom t\nwhere x=1");
        assert_eq!(a, b);
    }

    #[test]
    fn different_predicates_hash_differently() {
        let a = hash_fragment("x = 1");
        let b = hash_fragment("x = 2");
        assert_ne!(a, b);
    }
}
