//! util - общие утилиты.
//!
//! Содержит:
//! - lock(): захват Mutex без паники на poisoned-состоянии.
//! - parse_u64(): разбор чисел "4096" / "0x1000" / "0b101" (CLI, env).
//! - hex_dump(): печать байтов по 16 в строке.

use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, taking over a poisoned guard. The state behind our mutexes
/// stays consistent across a panicking user callback.
#[inline]
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parse an unsigned integer with optional 0x / 0o / 0b prefix and `_` separators.
pub fn parse_u64(s: &str) -> Result<u64> {
    let t = s.trim().replace('_', "");
    let lower = t.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };
    if digits.is_empty() {
        return Err(anyhow!("empty number: '{}'", s));
    }
    u64::from_str_radix(digits, radix).map_err(|e| anyhow!("bad number '{}': {}", s, e))
}

pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            if i % 16 == 0 {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}
