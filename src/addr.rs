//! Cluster address pool with a persistent round-robin cursor.

use rand::seq::SliceRandom;

use crate::error::{Error, Result};

/// An ordered list of `host:port` cluster addresses.
///
/// The list is shuffled once at construction so that many client
/// instances built from the same address list do not all stampede the
/// first node. After that the order is fixed: a cursor advances modulo
/// the list length across reconnect attempts, spreading retries over the
/// whole cluster.
#[derive(Debug)]
pub struct AddressPool {
    addrs: Vec<String>,
    cursor: usize,
}

impl AddressPool {
    /// Build a pool from a plain address list, shuffling it once.
    ///
    /// Returns a configuration error for an empty list; a pool with no
    /// addresses can never connect.
    pub fn new(mut addrs: Vec<String>) -> Result<Self> {
        if addrs.is_empty() {
            return Err(Error::Config("address list is empty".to_string()));
        }
        addrs.shuffle(&mut rand::thread_rng());
        Ok(AddressPool { addrs, cursor: 0 })
    }

    /// Number of addresses in the pool.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// The address under the cursor; advances the cursor for next time.
    pub fn next(&mut self) -> &str {
        let current = self.cursor;
        self.cursor = (self.cursor + 1) % self.addrs.len();
        &self.addrs[current]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addrs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{i}:8046")).collect()
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(AddressPool::new(vec![]), Err(Error::Config(_))));
    }

    #[test]
    fn shuffle_preserves_membership() {
        let input = addrs(8);
        let mut pool = AddressPool::new(input.clone()).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..pool.len() {
            seen.insert(pool.next().to_string());
        }
        assert_eq!(seen, input.into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn cursor_wraps_and_repeats_the_same_order() {
        let mut pool = AddressPool::new(addrs(3)).unwrap();
        let first: Vec<String> = (0..3).map(|_| pool.next().to_string()).collect();
        let second: Vec<String> = (0..3).map(|_| pool.next().to_string()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn single_address_pool_cycles() {
        let mut pool = AddressPool::new(addrs(1)).unwrap();
        assert_eq!(pool.next(), "10.0.0.0:8046");
        assert_eq!(pool.next(), "10.0.0.0:8046");
    }
}
