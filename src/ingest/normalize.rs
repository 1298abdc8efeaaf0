//! Line normalization and record parsing
//!
//! The results files come from a Fortran program: doubles are written with a
//! `D` exponent marker (`1.23D+04`) and an unbounded ISI is written as the
//! token `infinity`. Both are rewritten before generic float parsing:
//!
//! - every `D` becomes `E`
//! - every `infinity` becomes `1000`
//!
//! Replacement is textual over the whole line, so `-infinity` becomes `-1000`.

use super::record::{RawRecord, RECORD_ARITY};
use crate::error::MalformedReason;
use std::borrow::Cow;

/// Finite stand-in for an infinite inter-spike interval
pub const INFINITY_SENTINEL: f64 = 1000.0;

const INFINITY_TOKEN: &str = "infinity";
const INFINITY_REPLACEMENT: &str = "1000";

/// Apply the exponent and sentinel rewrites; borrows when nothing changes
pub fn normalize_line(line: &str) -> Cow<'_, str> {
    let has_exponent = line.contains('D');
    let has_sentinel = line.contains(INFINITY_TOKEN);
    if !has_exponent && !has_sentinel {
        return Cow::Borrowed(line);
    }

    let mut owned = if has_exponent {
        line.replace('D', "E")
    } else {
        line.to_string()
    };
    if has_sentinel {
        owned = owned.replace(INFINITY_TOKEN, INFINITY_REPLACEMENT);
    }
    Cow::Owned(owned)
}

/// Parse one raw line
///
/// Returns `Ok(None)` for blank lines, which carry no record.
pub fn parse_line(bytes: &[u8]) -> Result<Option<RawRecord>, MalformedReason> {
    let line = std::str::from_utf8(bytes).map_err(|_| MalformedReason::Encoding)?;
    let normalized = normalize_line(line);

    let found = normalized.split_whitespace().count();
    if found == 0 {
        return Ok(None);
    }
    if found != RECORD_ARITY {
        return Err(MalformedReason::Arity {
            expected: RECORD_ARITY,
            found,
        });
    }

    let mut fields = [0.0; RECORD_ARITY];
    for (field, token) in normalized.split_whitespace().enumerate() {
        let value: f64 = token
            .parse()
            .map_err(|_| MalformedReason::NotNumeric { field })?;
        // Rust also accepts "inf"/"NaN" spellings; those are not valid data here
        if !value.is_finite() {
            return Err(MalformedReason::NonFinite { field });
        }
        fields[field] = value;
    }
    Ok(Some(RawRecord::new(fields)))
}
