use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use shared::protocol::{VIP_BASE, VIP_CAPACITY};
use crate::error::VipError;

/// Hands out a stable virtual address per hostname for the lifetime of the
/// process. Reservations are never released or reused.
pub struct VipStore {
    inner: Mutex<Reservations>,
    base: Ipv4Addr,
    capacity: u8,
}

struct Reservations {
    by_hostname: HashMap<String, Ipv4Addr>,
    cursor: u8,
}

impl VipStore {
    pub fn new() -> Self {
        Self::with_base(VIP_BASE, VIP_CAPACITY)
    }

    fn with_base(base: Ipv4Addr, capacity: u8) -> Self {
        Self {
            inner: Mutex::new(Reservations {
                by_hostname: HashMap::new(),
                cursor: 0,
            }),
            base,
            capacity,
        }
    }

    /// Return the address reserved for `hostname`, reserving the next free one
    /// on first use. Once the pool is used up every new hostname fails while
    /// existing reservations keep resolving.
    pub fn get(&self, hostname: &str) -> Result<Ipv4Addr, VipError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(vip) = inner.by_hostname.get(hostname) {
            return Ok(*vip);
        }

        // single-byte cursor without carry into the third octet
        if inner.cursor >= self.capacity {
            return Err(VipError::Exhausted {
                capacity: self.capacity,
            });
        }
        inner.cursor += 1;

        let [a, b, c, d] = self.base.octets();
        let vip = Ipv4Addr::new(a, b, c, d.wrapping_add(inner.cursor));
        inner.by_hostname.insert(hostname.to_string(), vip);

        tracing::debug!("Reserved virtual IP {} for {}", vip, hostname);
        Ok(vip)
    }

    pub fn reserved(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_hostname
            .len()
    }
}

impl Default for VipStore {
    fn default() -> Self {
        Self::new()
    }
}
