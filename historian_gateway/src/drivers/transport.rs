use crate::drivers::address::{Location, MemoryArea};
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Raw byte access to controller memory. Session setup (COTP/S7 negotiation)
/// is the implementor's concern; the channel only moves byte spans.
#[async_trait]
pub trait BlockTransport: Send + Sync {
    async fn open(&self) -> GatewayResult<()>;

    async fn close(&self);

    fn is_open(&self) -> bool;

    async fn read_bytes(&self, location: &Location, len: usize) -> GatewayResult<Vec<u8>>;

    async fn write_bytes(&self, location: &Location, data: &[u8]) -> GatewayResult<()>;

    /// Single-bit write; `location.bit` must be set.
    async fn write_bit(&self, location: &Location, value: bool) -> GatewayResult<()>;
}

const FLAT_AREA_SIZE: usize = 1024;

/// Simulated controller memory. Data blocks are declared up front; M/I/Q
/// areas are fixed 1 KiB images. Failures can be injected for tests.
pub struct MemoryTransport {
    areas: Mutex<HashMap<(MemoryArea, u16), Vec<u8>>>,
    open: AtomicBool,
    reachable: AtomicBool,
    fail_next: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    opens: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let mut areas = HashMap::new();
        for area in [MemoryArea::Memory, MemoryArea::Input, MemoryArea::Output] {
            areas.insert((area, 0), vec![0u8; FLAT_AREA_SIZE]);
        }
        MemoryTransport {
            areas: Mutex::new(areas),
            open: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            fail_next: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    /// Declare (or resize) a data block.
    pub fn with_block(self, block: u16, size: usize) -> Self {
        self.lock_areas()
            .entry((MemoryArea::DataBlock, block))
            .or_default()
            .resize(size, 0);
        self
    }

    /// Poke bytes directly into memory, bypassing the link state.
    pub fn poke(&self, location: &Location, data: &[u8]) -> GatewayResult<()> {
        let mut areas = self.lock_areas();
        let area = Self::area_mut(&mut areas, location)?;
        let start = location.offset as usize;
        let end = start + data.len();
        if end > area.len() {
            return Err(GatewayError::Transport(format!("{} + {} out of range", location, data.len())));
        }
        area[start..end].copy_from_slice(data);
        Ok(())
    }

    pub fn peek(&self, location: &Location, len: usize) -> GatewayResult<Vec<u8>> {
        let mut areas = self.lock_areas();
        let area = Self::area_mut(&mut areas, location)?;
        let start = location.offset as usize;
        area.get(start..start + len)
            .map(|s| s.to_vec())
            .ok_or_else(|| GatewayError::Transport(format!("{} + {} out of range", location, len)))
    }

    /// Make the next `n` read/write/open calls fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Simulate the controller dropping off (or coming back onto) the network.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn lock_areas(&self) -> std::sync::MutexGuard<'_, HashMap<(MemoryArea, u16), Vec<u8>>> {
        self.areas.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn area_mut<'a>(
        areas: &'a mut HashMap<(MemoryArea, u16), Vec<u8>>,
        location: &Location,
    ) -> GatewayResult<&'a mut Vec<u8>> {
        areas
            .get_mut(&(location.area, location.block))
            .ok_or_else(|| GatewayError::Transport(format!("no such block: DB{}", location.block)))
    }

    fn injected_failure(&self) -> GatewayResult<()> {
        let tripped = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(GatewayError::Transport("injected failure".to_string()));
        }
        Ok(())
    }

    fn ensure_link(&self) -> GatewayResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            self.open.store(false, Ordering::SeqCst);
            return Err(GatewayError::Transport("controller unreachable".to_string()));
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected);
        }
        self.injected_failure()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockTransport for MemoryTransport {
    async fn open(&self) -> GatewayResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("controller unreachable".to_string()));
        }
        self.injected_failure()?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        debug!("memory transport opened");
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.reachable.load(Ordering::SeqCst)
    }

    async fn read_bytes(&self, location: &Location, len: usize) -> GatewayResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.ensure_link()?;
        self.peek(location, len)
    }

    async fn write_bytes(&self, location: &Location, data: &[u8]) -> GatewayResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.ensure_link()?;
        self.poke(location, data)
    }

    async fn write_bit(&self, location: &Location, value: bool) -> GatewayResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.ensure_link()?;
        let bit = location.bit.unwrap_or(0);
        let mut areas = self.lock_areas();
        let area = Self::area_mut(&mut areas, location)?;
        let byte = area
            .get_mut(location.offset as usize)
            .ok_or_else(|| GatewayError::Transport(format!("{} out of range", location)))?;
        if value {
            *byte |= 1 << bit;
        } else {
            *byte &= !(1 << bit);
        }
        Ok(())
    }
}
