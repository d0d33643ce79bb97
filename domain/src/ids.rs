//! Id generation strategies.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::IdGenerator;

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Random v4 UUIDs. The default generator for real deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic generator: `prefix` followed by a base62 counter.
///
/// Unique only within one process; meant for tests and demos.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, encode_base62(n))
    }
}

/// Encode with the alphabet 0-9, A-Z, a-z. Zero encodes to "0".
fn encode_base62(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(11);
    while n > 0 {
        digits.push(BASE62[(n % 62) as usize] as char);
        n /= 62;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base62_known_vectors() {
        assert_eq!(encode_base62(0), "0");
        assert_eq!(encode_base62(61), "z");
        assert_eq!(encode_base62(62), "10");
        assert_eq!(encode_base62(3843), "zz");
    }

    #[test]
    fn sequential_ids_are_prefixed_and_distinct() {
        let g = SequentialIdGenerator::new("tag-");
        assert_eq!(g.next_id(), "tag-0");
        assert_eq!(g.next_id(), "tag-1");
        assert_eq!(g.next_id(), "tag-2");
    }

    #[test]
    fn uuid_ids_do_not_collide() {
        let g = UuidGenerator;
        let ids: HashSet<String> = (0..256).map(|_| g.next_id()).collect();
        assert_eq!(ids.len(), 256);
        assert!(ids.iter().all(|id| id.len() == 36));
    }
}
