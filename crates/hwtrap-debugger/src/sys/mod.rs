#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(not(target_os = "linux"))]
compile_error!("No debugger implementation is available for this platform.");

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
compile_error!("Hardware breakpoints are only supported on x86 and x86_64.");
