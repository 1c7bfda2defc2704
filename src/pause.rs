//! The CPU spin-wait hint.
//! CPU 自旋等待提示。

/// Nominal duration of one [`pause()`] in nanoseconds on the selected
/// platform, as benchmarked on representative hardware.
///
/// 在所选平台上一次 [`pause()`] 的标称持续时间（纳秒）。
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub const PAUSE_NANOS: u64 = 35;
#[cfg(all(target_arch = "aarch64", not(feature = "arm-isb")))]
pub const PAUSE_NANOS: u64 = 1_333;
#[cfg(all(target_arch = "aarch64", feature = "arm-isb"))]
pub const PAUSE_NANOS: u64 = 10;

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!(
    "rtsync requires a user-space spin-hint instruction; \
     only x86, x86_64 and aarch64 are supported"
);

/// Hints the CPU that the current core is in a spin-wait loop.
///
/// The hint lasts a bounded, platform-known number of nanoseconds
/// ([`PAUSE_NANOS`]). It never yields the OS thread and never touches
/// kernel state.
///
/// On x86 this is the SSE2 `pause` instruction. On 64-bit ARM it is `wfe`,
/// or `isb sy` when the `arm-isb` cargo feature is enabled.
///
/// 提示 CPU 当前核心正处于自旋等待循环中。
/// 该提示持续一段有界的、平台已知的纳秒数（[`PAUSE_NANOS`]）。
/// 它绝不让出 OS 线程，也绝不触碰内核状态。
#[inline(always)]
pub fn pause() {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::x86::_mm_pause()
    };

    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_mm_pause()
    };

    #[cfg(all(target_arch = "aarch64", not(feature = "arm-isb")))]
    unsafe {
        core::arch::asm!("wfe", options(nomem, nostack, preserves_flags))
    };

    #[cfg(all(target_arch = "aarch64", feature = "arm-isb"))]
    unsafe {
        core::arch::asm!("isb sy", options(nostack, preserves_flags))
    };
}
