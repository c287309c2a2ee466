//! Fractional ordering keys
//!
//! An [`OrderKey`] is a base-62 digit string compared bytewise. A key strictly
//! between any two distinct keys always exists, so reordering a column or a
//! filter term writes exactly one key and never renumbers its siblings.
//! Keys never end in the zero digit; that keeps "something smaller" available
//! for every key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = DIGITS.len();

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(String);

impl OrderKey {
    /// The key used for the first element of an empty sibling list
    pub fn first() -> Self {
        Self::from_digits(midpoint(&[], None))
    }

    /// Parse a persisted key, rejecting anything `between` could not have produced
    pub fn parse(raw: &str) -> GridResult<Self> {
        let bytes = raw.as_bytes();
        if bytes.is_empty() {
            return Err(GridError::InvalidOrderKey("empty key".into()));
        }
        if bytes.iter().any(|b| digit_value(*b).is_none()) {
            return Err(GridError::InvalidOrderKey(format!(
                "'{}' contains a non base-62 character",
                raw
            )));
        }
        if bytes.last() == Some(&DIGITS[0]) {
            return Err(GridError::InvalidOrderKey(format!(
                "'{}' ends with the zero digit",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// A key strictly between `lower` and `upper`; `None` is an open bound
    pub fn between(lower: Option<&OrderKey>, upper: Option<&OrderKey>) -> GridResult<Self> {
        if let (Some(a), Some(b)) = (lower, upper)
            && a >= b
        {
            return Err(GridError::InvalidOrderKey(format!(
                "lower bound '{}' is not below upper bound '{}'",
                a, b
            )));
        }
        let a = lower.map(|k| k.0.as_bytes()).unwrap_or(&[]);
        let b = upper.map(|k| k.0.as_bytes());
        Ok(Self::from_digits(midpoint(a, b)))
    }

    /// A key greater than `self`
    pub fn after(&self) -> Self {
        Self::from_digits(midpoint(self.0.as_bytes(), None))
    }

    /// A key smaller than `self`
    pub fn before(&self) -> Self {
        Self::from_digits(midpoint(&[], Some(self.0.as_bytes())))
    }

    /// `count` ascending keys, for initializing a list in declaration order
    pub fn sequence(count: usize) -> Vec<Self> {
        let mut keys = Vec::with_capacity(count);
        let mut last: Option<OrderKey> = None;
        for _ in 0..count {
            let next = match &last {
                Some(key) => key.after(),
                None => Self::first(),
            };
            keys.push(next.clone());
            last = Some(next);
        }
        keys
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_digits(digits: Vec<u8>) -> Self {
        // Only ever built from DIGITS
        Self(digits.into_iter().map(char::from).collect())
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digit_value(byte: u8) -> Option<usize> {
    match byte {
        b'0'..=b'9' => Some((byte - b'0') as usize),
        b'A'..=b'Z' => Some((byte - b'A') as usize + 10),
        b'a'..=b'z' => Some((byte - b'a') as usize + 36),
        _ => None,
    }
}

/// Digits strictly between `a` and `b` (`a` may be empty, `b = None` is +infinity).
///
/// Requires `a < b` and neither bound ending in the zero digit.
fn midpoint(a: &[u8], b: Option<&[u8]>) -> Vec<u8> {
    if let Some(b) = b {
        // Strip the common prefix, reading `a` as zero-padded
        let mut n = 0;
        while n < b.len() && a.get(n).copied().unwrap_or(DIGITS[0]) == b[n] {
            n += 1;
        }
        if n > 0 {
            let rest_a = a.get(n..).unwrap_or(&[]);
            let mut out = b[..n].to_vec();
            out.extend(midpoint(rest_a, Some(&b[n..])));
            return out;
        }
    }

    let digit_a = a.first().and_then(|d| digit_value(*d)).unwrap_or(0);
    let digit_b = b
        .and_then(|b| b.first())
        .and_then(|d| digit_value(*d))
        .unwrap_or(BASE);

    if digit_b - digit_a > 1 {
        vec![DIGITS[(digit_a + digit_b) / 2]]
    } else if let Some(b) = b.filter(|b| b.len() > 1) {
        vec![b[0]]
    } else {
        let mut out = vec![DIGITS[digit_a]];
        out.extend(midpoint(a.get(1..).unwrap_or(&[]), None));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> OrderKey {
        OrderKey::parse(raw).unwrap()
    }

    #[test]
    fn test_between_open_bounds() {
        let first = OrderKey::first();
        assert_eq!(first.as_str(), "V");
        assert!(first.after() > first);
        assert!(first.before() < first);
    }

    #[test]
    fn test_between_adjacent_digits_extends_key() {
        let a = key("a");
        let b = key("b");
        let mid = OrderKey::between(Some(&a), Some(&b)).unwrap();
        assert!(a < mid && mid < b, "{} should sit between a and b", mid);
        assert!(mid.as_str().starts_with('a'));
    }

    #[test]
    fn test_between_rejects_inverted_bounds() {
        let a = key("b");
        let b = key("a");
        assert!(OrderKey::between(Some(&a), Some(&b)).is_err());
        assert!(OrderKey::between(Some(&a), Some(&a)).is_err());
    }

    #[test]
    fn test_before_small_keys() {
        let one = key("01");
        let before = one.before();
        assert!(before < one);
        assert!(!before.as_str().ends_with('0'));
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(OrderKey::parse("").is_err());
        assert!(OrderKey::parse("a-b").is_err());
        assert!(OrderKey::parse("a0").is_err());
        assert!(OrderKey::parse("a01").is_ok());
    }

    #[test]
    fn test_sequence_is_strictly_ascending() {
        let keys = OrderKey::sequence(200);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_many_appends_stay_ordered_and_compact() {
        let mut keys = vec![OrderKey::first()];
        for _ in 0..1000 {
            let next = keys.last().unwrap().after();
            keys.push(next);
        }

        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| OrderKey::parse(k.as_str()).is_ok()));
        // each digit absorbs six appends before the key grows
        assert!(keys.last().unwrap().as_str().len() <= 170);

        let (a, b) = (&keys[999], &keys[1000]);
        let mid = OrderKey::between(Some(a), Some(b)).unwrap();
        assert!(a < &mid && &mid < b);
    }

    #[test]
    fn test_random_inserts_keep_logical_order() {
        // Deterministic LCG so the test needs no extra crates
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        let mut logical: Vec<(u32, OrderKey)> = vec![(0, OrderKey::first())];
        for label in 1..500u32 {
            let pos = next() % (logical.len() + 1);
            let lower = pos.checked_sub(1).map(|i| &logical[i].1);
            let upper = logical.get(pos).map(|(_, k)| k);
            let fresh = OrderKey::between(lower, upper).unwrap();
            logical.insert(pos, (label, fresh));

            // Occasionally delete something
            if label % 7 == 0 {
                let victim = next() % logical.len();
                logical.remove(victim);
            }
        }

        let mut by_key = logical.clone();
        by_key.sort_by(|a, b| a.1.cmp(&b.1));
        let expected: Vec<u32> = logical.iter().map(|(l, _)| *l).collect();
        let actual: Vec<u32> = by_key.iter().map(|(l, _)| *l).collect();
        assert_eq!(expected, actual);
    }
}
