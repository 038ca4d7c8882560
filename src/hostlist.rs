//! Compact node range notation.
//!
//! `n[1-3,5],login1` names the hosts `n1 n2 n3 n5 login1`. Numbers inside
//! brackets keep the zero padding of the low end of their range, so
//! `gpu[08-10]` is `gpu08 gpu09 gpu10`.

use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;
use thiserror::Error;

/// Upper bound on the number of names a single expression may produce.
pub const MAX_EXPANSION: usize = 100_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HostlistError {
    #[error("unbalanced brackets in '{0}'")]
    Unbalanced(String),
    #[error("invalid range '{0}'")]
    InvalidRange(String),
    #[error("expression expands to more than {MAX_EXPANSION} names")]
    TooLarge,
}

/// Expands a node range expression into node names.
///
/// Names come out in expression order with duplicates removed.
pub fn expand(expr: &str) -> Result<Vec<String>, HostlistError> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for item in split_top_level(expr)? {
        for name in expand_item(item)? {
            if seen.insert(name.clone()) {
                if names.len() == MAX_EXPANSION {
                    return Err(HostlistError::TooLarge);
                }
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Splits on commas that are not inside brackets.
fn split_top_level(expr: &str) -> Result<Vec<&str>, HostlistError> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' if depth == 0 => depth = 1,
            ']' if depth == 1 => depth = 0,
            '[' | ']' => return Err(HostlistError::Unbalanced(expr.to_string())),
            ',' if depth == 0 => {
                items.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(HostlistError::Unbalanced(expr.to_string()));
    }
    items.push(&expr[start..]);
    Ok(items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect())
}

/// Expands one comma-free item such as `rack[1-2]n[01-04]`.
fn expand_item(item: &str) -> Result<Vec<String>, HostlistError> {
    let mut segments: Vec<Vec<String>> = Vec::new();
    let mut rest = item;
    while let Some(open) = rest.find('[') {
        if open > 0 {
            segments.push(vec![rest[..open].to_string()]);
        }
        // `split_top_level` already rejected unbalanced brackets.
        let close = rest[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| HostlistError::Unbalanced(item.to_string()))?;
        segments.push(expand_ranges(&rest[open + 1..close])?);
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(vec![rest.to_string()]);
    }

    let total = segments
        .iter()
        .try_fold(1usize, |acc, seg| acc.checked_mul(seg.len()))
        .unwrap_or(usize::MAX);
    if total > MAX_EXPANSION {
        return Err(HostlistError::TooLarge);
    }

    Ok(segments
        .into_iter()
        .multi_cartesian_product()
        .map(|parts| parts.concat())
        .collect())
}

/// Expands the inside of a bracket: `1-3,05,7`.
fn expand_ranges(ranges: &str) -> Result<Vec<String>, HostlistError> {
    let mut out = Vec::new();
    for part in ranges.split(',').map(str::trim) {
        let invalid = || HostlistError::InvalidRange(part.to_string());
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo_value = parse_number(lo).ok_or_else(invalid)?;
                let hi_value = parse_number(hi).ok_or_else(invalid)?;
                if hi_value < lo_value {
                    return Err(invalid());
                }
                if (hi_value - lo_value) as usize >= MAX_EXPANSION {
                    return Err(HostlistError::TooLarge);
                }
                let width = lo.len();
                out.extend((lo_value..=hi_value).map(|v| format!("{:0width$}", v)));
            }
            None => {
                parse_number(part).ok_or_else(invalid)?;
                out.push(part.to_string());
            }
        }
    }
    Ok(out)
}

fn parse_number(digits: &str) -> Option<u64> {
    if digits.is_empty() || digits.len() > 18 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Splits a name on its last run of digits into `(prefix, digits, suffix)`.
fn split_numbered(name: &str) -> Option<(&str, &str, &str)> {
    let end = name.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = name[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let digits = &name[start..end];
    parse_number(digits)?;
    Some((&name[..start], digits, &name[end..]))
}

/// Compresses node names into a range expression.
///
/// The output is deterministic and expands back to exactly the input set.
pub fn compress<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut numbered: BTreeMap<(String, String), Vec<(u64, String)>> = BTreeMap::new();
    let mut pieces: Vec<(String, String, String)> = Vec::new();

    for name in names {
        let name = name.as_ref();
        match split_numbered(name) {
            Some((prefix, digits, suffix)) => {
                // `split_numbered` only returns digits that parse.
                let value = parse_number(digits).unwrap_or_default();
                numbered
                    .entry((prefix.to_string(), suffix.to_string()))
                    .or_default()
                    .push((value, digits.to_string()));
            }
            None => pieces.push((name.to_string(), String::new(), name.to_string())),
        }
    }

    for ((prefix, suffix), mut numbers) in numbered {
        numbers.sort_by(|a, b| (a.0, a.1.len()).cmp(&(b.0, b.1.len())));
        numbers.dedup();

        // Each run is (low end as written, high value).
        let mut runs: Vec<(String, u64)> = Vec::new();
        for (value, digits) in numbers {
            if let Some((lo, hi)) = runs.last_mut() {
                if *hi + 1 == value && format!("{:0w$}", value, w = lo.len()) == digits {
                    *hi = value;
                    continue;
                }
            }
            runs.push((digits, value));
        }

        let rendered = match runs.as_slice() {
            [(lo, hi)] if parse_number(lo) == Some(*hi) => format!("{}{}{}", prefix, lo, suffix),
            _ => {
                let ranges = runs
                    .iter()
                    .map(|(lo, hi)| {
                        if parse_number(lo) == Some(*hi) {
                            lo.clone()
                        } else {
                            format!("{}-{:0w$}", lo, hi, w = lo.len())
                        }
                    })
                    .join(",");
                format!("{}[{}]{}", prefix, ranges, suffix)
            }
        };
        pieces.push((prefix, suffix, rendered));
    }

    pieces.sort();
    pieces.dedup();
    pieces.into_iter().map(|(_, _, rendered)| rendered).join(",")
}
