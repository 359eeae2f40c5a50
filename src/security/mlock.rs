//! Memory locking utilities
//!
//! Locks pages holding recovered content keys so they are not written to
//! swap, and disables core dumps for the CLI process.

use crate::errors::{EscrowSignError, Result};
use nix::libc;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Live holders per locked page
///
/// `munlock` works on whole pages, so a page shared by two locked buffers
/// stays locked until both are released.
#[cfg(unix)]
static PAGE_HOLDERS: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());

/// Check if we can lock memory (requires appropriate privileges or rlimits)
pub fn can_lock_memory() -> bool {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{getrlimit, Resource};

        match getrlimit(Resource::RLIMIT_MEMLOCK) {
            Ok((soft, _hard)) => soft > 0,
            Err(_) => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Round a region out to whole pages
#[cfg(unix)]
fn page_span(ptr: *const u8, len: usize) -> (usize, usize) {
    let page_size = page_size();
    let addr = ptr as usize;
    let aligned_addr = addr & !(page_size - 1);
    let offset = addr - aligned_addr;
    let aligned_len = (len + offset + page_size - 1) & !(page_size - 1);
    (aligned_addr, aligned_len)
}

/// Add one holder to every page in `[addr, addr + span)`
#[cfg(unix)]
fn retain_pages(addr: usize, span: usize, page_size: usize) {
    let mut holders = PAGE_HOLDERS.lock().unwrap_or_else(|e| e.into_inner());
    for page in (addr..addr + span).step_by(page_size) {
        *holders.entry(page).or_insert(0) += 1;
    }
}

/// Drop one holder from every page in the span; returns pages nobody holds any more
#[cfg(unix)]
fn release_pages(addr: usize, span: usize, page_size: usize) -> Vec<usize> {
    let mut holders = PAGE_HOLDERS.lock().unwrap_or_else(|e| e.into_inner());
    let mut free = Vec::new();
    for page in (addr..addr + span).step_by(page_size) {
        match holders.get_mut(&page) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                holders.remove(&page);
                free.push(page);
            }
            None => free.push(page),
        }
    }
    free
}

/// Lock a memory region to prevent it from being swapped
///
/// # Safety
/// The memory region must be valid for `len` bytes
pub unsafe fn lock_memory(ptr: *const u8, len: usize) -> Result<()> {
    if ptr.is_null() || len == 0 {
        return Ok(());
    }

    #[cfg(unix)]
    {
        let (addr, span) = page_span(ptr, len);
        if libc::mlock(addr as *const libc::c_void, span) == 0 {
            retain_pages(addr, span, page_size());
            debug!("Locked {} bytes of memory", span);
            Ok(())
        } else {
            let err = std::io::Error::last_os_error();
            Err(EscrowSignError::MemoryLockFailed(err.to_string()))
        }
    }

    #[cfg(not(unix))]
    {
        warn!("Memory locking not supported on this platform");
        Ok(())
    }
}

/// Unlock a previously locked memory region
///
/// Pages still covered by another locked region stay locked.
///
/// # Safety
/// The memory region must have been previously locked with `lock_memory`
pub unsafe fn unlock_memory(ptr: *const u8, len: usize) -> Result<()> {
    if ptr.is_null() || len == 0 {
        return Ok(());
    }

    #[cfg(unix)]
    {
        let page_size = page_size();
        let (addr, span) = page_span(ptr, len);
        let free = release_pages(addr, span, page_size);
        for page in &free {
            if libc::munlock(*page as *const libc::c_void, page_size) != 0 {
                let err = std::io::Error::last_os_error();
                return Err(EscrowSignError::MemoryLockFailed(err.to_string()));
            }
        }
        debug!("Unlocked {} of {} bytes of memory", free.len() * page_size, span);
        Ok(())
    }

    #[cfg(not(unix))]
    {
        Ok(())
    }
}

/// Heap bytes pinned out of swap while alive
///
/// Locking is best effort: when the rlimit forbids it the bytes are still
/// held and zeroed on drop, only unlocked.
pub struct LockedMemory {
    data: Vec<u8>,
    locked: bool,
}

impl LockedMemory {
    /// Take ownership of `data` and lock its pages
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::with_lock(data, true)
    }

    /// Take ownership of `data`, locking its pages only when `lock` is set
    pub fn with_lock(data: Vec<u8>, lock: bool) -> Self {
        if !lock {
            return Self { data, locked: false };
        }

        // SAFETY: the vector owns `len` initialized bytes at `as_ptr`
        let locked = match unsafe { lock_memory(data.as_ptr(), data.len()) } {
            Ok(()) => true,
            Err(e) => {
                debug!("Could not lock memory, continuing without: {}", e);
                false
            }
        };

        Self { data, locked }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Clone for LockedMemory {
    fn clone(&self) -> Self {
        Self::with_lock(self.data.clone(), self.locked)
    }
}

impl Drop for LockedMemory {
    fn drop(&mut self) {
        let ptr = self.data.as_ptr();
        let len = self.data.len();
        self.data.zeroize();

        if self.locked {
            // SAFETY: same region that was locked in `from_vec`; zeroize does not reallocate
            if let Err(e) = unsafe { unlock_memory(ptr, len) } {
                warn!("Failed to unlock memory: {}", e);
            }
        }
    }
}

/// Set up memory protection for the process
pub fn setup_memory_protection(disable_core_dumps: bool) -> Result<()> {
    #[cfg(target_os = "linux")]
    if disable_core_dumps {
        use nix::sys::resource::{setrlimit, Resource};

        setrlimit(Resource::RLIMIT_CORE, 0, 0)
            .map_err(|e| EscrowSignError::MemoryLockFailed(format!("Could not disable core dumps: {}", e)))?;
        debug!("Core dumps disabled");
    }

    #[cfg(not(target_os = "linux"))]
    let _ = disable_core_dumps;

    if can_lock_memory() {
        debug!("Memory locking is available");
    } else {
        warn!("Memory locking may not be available - consider increasing RLIMIT_MEMLOCK");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_memory_holds_bytes() {
        let locked = LockedMemory::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(locked.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(locked.len(), 4);

        let copy = locked.clone();
        assert_eq!(copy.as_slice(), locked.as_slice());

        let plain = LockedMemory::with_lock(vec![5, 6], false);
        assert!(!plain.is_locked());
        assert_eq!(plain.as_slice(), &[5, 6]);
    }

    #[cfg(unix)]
    #[test]
    fn test_shared_page_stays_held_until_last_release() {
        // Far below any mapping, so no real buffer shares these pages
        let page = 4096;
        let first = 0x10_000;

        retain_pages(first, 2 * page, page);
        retain_pages(first + page, page, page);

        assert_eq!(release_pages(first, 2 * page, page), vec![first]);
        assert_eq!(release_pages(first + page, page, page), vec![first + page]);
    }

    #[test]
    fn test_dropping_a_clone_keeps_original_readable() {
        let original = LockedMemory::from_vec(vec![7u8; 48]);
        let copy = original.clone();
        assert_eq!(copy.is_locked(), original.is_locked());
        drop(copy);
        assert_eq!(original.as_slice(), &[7u8; 48]);
    }

    #[test]
    fn test_empty_region_is_noop() {
        // SAFETY: null/empty regions return before touching memory
        unsafe {
            assert!(lock_memory(std::ptr::null(), 0).is_ok());
            assert!(unlock_memory(std::ptr::null(), 0).is_ok());
        }
        assert!(LockedMemory::from_vec(Vec::new()).is_empty());
    }
}
