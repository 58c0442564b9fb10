//! BootLimiter — memory and table enforcement for a bound instance.
//!
//! Implements `wasmtime::ResourceLimiter` so a guest cannot grow its linear
//! memory or tables past the limits its shim was configured with. Refused
//! growth is not an error here: `memory.grow` sees -1 and the guest decides
//! whether to trap. Initial sizes go through the same callbacks, so a module
//! that declares too much memory fails to instantiate.

use wasmtime::ResourceLimiter;

/// Default cap on linear memory: 256 MiB.
pub const DEFAULT_MEMORY_LIMIT: usize = 256 * 1024 * 1024;

/// Default cap on table elements.
pub const DEFAULT_TABLE_LIMIT: u32 = 10_000;

const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Per-instance resource limiter.
///
/// One limiter lives in each store's `HostState`, so usage figures describe a
/// single run. They are reported back in `RunOutcome`.
#[derive(Debug, Clone)]
pub struct BootLimiter {
    /// Largest linear memory the guest may reach, in bytes.
    memory_limit: usize,
    /// Largest element count any one table may reach.
    table_limit: u32,
    /// Largest memory size granted so far, in bytes.
    memory_peak: usize,
    /// Largest table size granted so far.
    table_peak: usize,
    /// Growth requests refused, memory and table combined.
    denials: u32,
}

impl BootLimiter {
    pub fn new(memory_limit: usize, table_limit: u32) -> Self {
        Self {
            memory_limit,
            table_limit,
            memory_peak: 0,
            table_peak: 0,
            denials: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT, DEFAULT_TABLE_LIMIT)
    }

    /// Linear memory high-water mark in bytes.
    pub fn memory_used(&self) -> usize {
        self.memory_peak
    }

    /// Bytes the guest could still grow into.
    pub fn memory_headroom(&self) -> usize {
        self.memory_limit.saturating_sub(self.memory_peak)
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Table high-water mark in elements.
    pub fn table_used(&self) -> usize {
        self.table_peak
    }

    pub fn table_limit(&self) -> u32 {
        self.table_limit
    }

    pub fn denials(&self) -> u32 {
        self.denials
    }
}

impl Default for BootLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ResourceLimiter for BootLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.memory_limit {
            self.denials += 1;
            tracing::warn!(
                current_pages = current / WASM_PAGE_SIZE,
                desired_pages = desired / WASM_PAGE_SIZE,
                limit_bytes = self.memory_limit,
                "guest memory growth refused"
            );
            return Ok(false);
        }
        self.memory_peak = self.memory_peak.max(desired);
        Ok(true)
    }

    fn table_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.table_limit as usize {
            self.denials += 1;
            tracing::warn!(
                current,
                desired,
                limit = self.table_limit,
                "guest table growth refused"
            );
            return Ok(false);
        }
        self.table_peak = self.table_peak.max(desired);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_growth_within_limit() {
        let mut limiter = BootLimiter::new(1024, 100);
        assert!(limiter.memory_growing(0, 512, None).unwrap());
        assert_eq!(limiter.memory_used(), 512);
        assert_eq!(limiter.memory_headroom(), 512);
    }

    #[test]
    fn denied_growth_does_not_count_as_used() {
        let mut limiter = BootLimiter::new(1024, 100);
        assert!(limiter.memory_growing(0, 512, None).unwrap());
        assert!(!limiter.memory_growing(512, 2048, None).unwrap());
        assert_eq!(limiter.memory_used(), 512);
        assert_eq!(limiter.denials(), 1);
    }

    #[test]
    fn memory_peak_never_shrinks() {
        let mut limiter = BootLimiter::new(1 << 20, 100);
        limiter.memory_growing(0, 4096, None).unwrap();
        limiter.memory_growing(0, 1024, None).unwrap();
        assert_eq!(limiter.memory_used(), 4096);
    }

    #[test]
    fn table_limits() {
        let mut limiter = BootLimiter::new(1024, 100);
        assert!(limiter.table_growing(0, 100, None).unwrap());
        assert!(!limiter.table_growing(100, 101, None).unwrap());
        assert_eq!(limiter.table_used(), 100);
        assert_eq!(limiter.denials(), 1);
    }

    #[test]
    fn defaults_are_reasonable() {
        let limiter = BootLimiter::default();
        assert_eq!(limiter.memory_limit(), 256 * 1024 * 1024);
        assert_eq!(limiter.table_limit(), 10_000);
        assert_eq!(limiter.denials(), 0);
    }
}
