//! Rotating egress proxy pool with failure eviction and lazy reload.
//!
//! The pool is an arena of proxy URLs plus a cyclic index; eviction removes
//! from the arena and clamps the index rather than holding a pointer into a
//! resizing list. Rotation order is fixed by a single shuffle at load time.

use rand::seq::SliceRandom;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::ProxyConfig;

enum ProxySource {
    File(PathBuf),
    Static(Vec<String>),
}

pub struct ProxyPool {
    proxies: Vec<String>,
    cursor: usize,
    floor: usize,
    source: ProxySource,
}

impl ProxyPool {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let source = match &config.list_path {
            Some(path) => ProxySource::File(path.clone()),
            None => ProxySource::Static(Vec::new()),
        };
        let mut pool = Self {
            proxies: Vec::new(),
            cursor: 0,
            floor: config.reload_floor,
            source,
        };
        pool.load();
        pool
    }

    /// Pool over a fixed list; the list doubles as the reload source.
    pub fn from_list(proxies: Vec<String>, floor: usize) -> Self {
        let mut pool = Self {
            proxies: Vec::new(),
            cursor: 0,
            floor,
            source: ProxySource::Static(proxies),
        };
        pool.load();
        pool
    }

    fn load(&mut self) {
        self.proxies = match &self.source {
            ProxySource::Static(list) => list.clone(),
            ProxySource::File(path) => match std::fs::read_to_string(path) {
                Ok(content) => content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from)
                    .collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "proxy list unavailable, running direct");
                    Vec::new()
                }
            },
        };
        self.proxies.shuffle(&mut rand::thread_rng());
        self.cursor = 0;
        if !self.proxies.is_empty() {
            info!(count = self.proxies.len(), "loaded proxy pool");
        }
    }

    /// Next proxy in round-robin order, or `None` when the pool is empty
    /// (the caller falls back to a direct connection).
    pub fn next_proxy(&mut self) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }
        let proxy = self.proxies[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.proxies.len();
        Some(proxy)
    }

    /// Drop a proxy from rotation. When the pool shrinks below the floor it
    /// is eagerly reloaded from its source.
    pub fn report_failure(&mut self, proxy: &str) {
        if let Some(pos) = self.proxies.iter().position(|p| p == proxy) {
            self.proxies.remove(pos);
            warn!(%proxy, remaining = self.proxies.len(), "evicted failing proxy");
            if pos < self.cursor {
                self.cursor -= 1;
            }
            if !self.proxies.is_empty() {
                self.cursor %= self.proxies.len();
            } else {
                self.cursor = 0;
            }
        }
        if self.proxies.len() < self.floor {
            self.load();
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(n: usize, floor: usize) -> ProxyPool {
        let list = (0..n).map(|i| format!("http://proxy{i}:8080")).collect();
        ProxyPool::from_list(list, floor)
    }

    #[test]
    fn empty_pool_yields_none() {
        let mut pool = ProxyPool::from_list(Vec::new(), 3);
        assert_eq!(pool.next_proxy(), None);
    }

    #[test]
    fn rotation_cycles_through_all() {
        let mut pool = pool_of(4, 0);
        let first_cycle: Vec<_> = (0..4).map(|_| pool.next_proxy().unwrap()).collect();
        let second_cycle: Vec<_> = (0..4).map(|_| pool.next_proxy().unwrap()).collect();
        // Same rotation order on every cycle
        assert_eq!(first_cycle, second_cycle);
        let mut sorted = first_cycle.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn failure_evicts_proxy() {
        let mut pool = pool_of(5, 0);
        let victim = pool.next_proxy().unwrap();
        pool.report_failure(&victim);
        assert_eq!(pool.len(), 4);
        for _ in 0..8 {
            assert_ne!(pool.next_proxy().unwrap(), victim);
        }
    }

    #[test]
    fn below_floor_triggers_reload() {
        let mut pool = pool_of(4, 3);
        let a = pool.next_proxy().unwrap();
        let b = pool.next_proxy().unwrap();
        pool.report_failure(&a);
        assert_eq!(pool.len(), 3);
        // Second eviction drops the pool to 2, under the floor of 3, so the
        // full source list comes back.
        pool.report_failure(&b);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn eviction_clamps_cursor() {
        let mut pool = pool_of(2, 0);
        let first = pool.next_proxy().unwrap();
        let second = pool.next_proxy().unwrap();
        pool.report_failure(&second);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.next_proxy().unwrap(), first);
        assert_eq!(pool.next_proxy().unwrap(), first);
    }
}
