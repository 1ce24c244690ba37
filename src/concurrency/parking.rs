//! Address-based parking for the blocking path of [`OrderingLock::lock`].
//!
//! Linux uses a private futex, Windows uses `WaitOnAddress`; everything else
//! falls back to yielding in a loop.
//!
//! [`OrderingLock::lock`]: super::ordering::OrderingLock::lock

use core::sync::atomic::AtomicU32;
#[cfg(not(any(windows, target_os = "linux")))]
use core::sync::atomic::Ordering;

#[cfg(windows)]
use windows_sys::Win32::System::Threading::{WaitOnAddress, WakeByAddressSingle};

#[cfg(target_os = "linux")]
use libc::{SYS_futex, FUTEX_PRIVATE_FLAG, FUTEX_WAIT, FUTEX_WAKE};

/// Blocks while `*addr == expected`. May return spuriously.
#[inline]
pub(crate) fn wait_while(addr: &AtomicU32, expected: u32) {
    #[cfg(target_os = "linux")]
    unsafe {
        // The kernel re-checks `*addr == expected` atomically before sleeping.
        libc::syscall(
            SYS_futex,
            addr.as_ptr(),
            FUTEX_WAIT | FUTEX_PRIVATE_FLAG,
            expected,
            core::ptr::null::<libc::timespec>(),
        );
    }
    #[cfg(windows)]
    unsafe {
        let expected_ptr = &expected as *const u32 as *const core::ffi::c_void;
        let addr_ptr = addr.as_ptr() as *const core::ffi::c_void;
        WaitOnAddress(addr_ptr, expected_ptr, core::mem::size_of::<u32>(), u32::MAX);
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    while addr.load(Ordering::Acquire) == expected {
        std::thread::yield_now();
    }
}

/// Wakes at most one thread blocked in [`wait_while`] on `addr`.
#[inline]
pub(crate) fn wake_one(addr: &AtomicU32) {
    #[cfg(target_os = "linux")]
    unsafe {
        libc::syscall(SYS_futex, addr.as_ptr(), FUTEX_WAKE | FUTEX_PRIVATE_FLAG, 1);
    }
    #[cfg(windows)]
    unsafe {
        WakeByAddressSingle(addr.as_ptr() as *const core::ffi::c_void);
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    let _ = addr;
}
