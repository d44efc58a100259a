//! Maven-style version ordering.
//!
//! Versions are split into numeric and qualifier items at `.`, `-`, `_`
//! and at digit/letter transitions (`1.0-beta2` → `1 . 0 - beta 2`).
//! Numeric items compare numerically, qualifiers by a well-known rank:
//!
//! `alpha < beta < milestone < rc < snapshot < (release) < sp < other`
//!
//! where `ga`, `final`, and `release` are synonyms for the empty release
//! qualifier, `a`/`b`/`m` are short forms when directly followed by a
//! number, and `cr` is `rc`. Unknown qualifiers sort after all known ones,
//! lexically among themselves. Trailing zero and release items are ignored
//! so `1`, `1.0`, and `1.0.0-ga` are equal. Numbers outrank qualifiers.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Num(u64),
    Qualifier(String),
}

const RELEASE_RANK: u8 = 5;

fn qualifier_rank(q: &str) -> u8 {
    match q {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 4,
        "" => RELEASE_RANK,
        "sp" => 6,
        _ => 7,
    }
}

fn canonical_qualifier(q: &str, followed_by_digit: bool) -> String {
    match q {
        "a" if followed_by_digit => "alpha".to_string(),
        "b" if followed_by_digit => "beta".to_string(),
        "m" if followed_by_digit => "milestone".to_string(),
        "cr" => "rc".to_string(),
        "ga" | "final" | "release" => String::new(),
        other => other.to_string(),
    }
}

fn parse(version: &str) -> Vec<Item> {
    let lower = version.trim().to_lowercase();
    let mut raw: Vec<(bool, String)> = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    for c in lower.chars() {
        if matches!(c, '.' | '-' | '_') {
            if !current.is_empty() {
                raw.push((current_is_digit, std::mem::take(&mut current)));
            }
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            raw.push((current_is_digit, std::mem::take(&mut current)));
        }
        current_is_digit = is_digit;
        current.push(c);
    }
    if !current.is_empty() {
        raw.push((current_is_digit, current));
    }

    let mut items = Vec::with_capacity(raw.len());
    for (i, (is_digit, token)) in raw.iter().enumerate() {
        if *is_digit {
            // Overlong numbers saturate rather than fail.
            items.push(Item::Num(token.parse().unwrap_or(u64::MAX)));
        } else {
            let followed_by_digit = raw.get(i + 1).is_some_and(|(d, _)| *d);
            items.push(Item::Qualifier(canonical_qualifier(token, followed_by_digit)));
        }
    }

    while matches!(items.last(), Some(Item::Num(0))) || matches!(items.last(), Some(Item::Qualifier(q)) if q.is_empty())
    {
        items.pop();
    }
    items
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Item::Num(x)), Some(Item::Num(y))) => x.cmp(y),
        (Some(Item::Num(x)), None) => x.cmp(&0),
        (None, Some(Item::Num(y))) => 0.cmp(y),
        (Some(Item::Num(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Num(_))) => Ordering::Less,
        (Some(Item::Qualifier(p)), None) => qualifier_rank(p).cmp(&RELEASE_RANK),
        (None, Some(Item::Qualifier(q))) => RELEASE_RANK.cmp(&qualifier_rank(q)),
        (Some(Item::Qualifier(p)), Some(Item::Qualifier(q))) => qualifier_rank(p)
            .cmp(&qualifier_rank(q))
            .then_with(|| p.cmp(q)),
    }
}

/// Compare two version strings in Maven order.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = parse(a);
    let right = parse(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let ord = compare_items(left.get(i), right.get(i));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
