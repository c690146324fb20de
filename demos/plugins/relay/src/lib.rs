//! Relay plugin - calls into the greeter plugin through the host
//!
//! The relay has no link-time dependency on the greeter. It finds the host's
//! registry at runtime, looks the greeter up by name, and borrows
//! `greeter_func` for the duration of one call.
//!
//! ```text
//! crucible> load ./target/debug/libgreeter.so greeter
//! crucible> load ./target/debug/librelay.so relay
//! crucible> call relay relay_func hi
//! relay_func returned 100
//! ```

use std::os::raw::{c_char, c_int};
use std::sync::OnceLock;

use crucible::{HostApi, PluginError};

type GreeterFn = unsafe extern "C" fn(*const c_char) -> c_int;

static HOST: OnceLock<Result<HostApi, PluginError>> = OnceLock::new();

fn host() -> Result<HostApi, PluginError> {
    // Safety: the host binary exports the entry points with the declared
    // signatures when built with the `host` feature.
    HOST.get_or_init(|| unsafe { HostApi::bootstrap() }).clone()
}

fn relay(param: *const c_char) -> Result<c_int, PluginError> {
    let host = host()?;
    let greeter = host.find_by_name("greeter")?;
    let addr = host.resolve_symbol(greeter, "greeter_func")?;

    // Safety: greeter_func has this signature, and the reference held on
    // `addr` keeps the greeter loaded until it is released below.
    let ret = unsafe {
        let greet: GreeterFn = addr.cast();
        greet(param)
    };

    host.release_symbol(greeter, addr)?;
    Ok(ret + 50)
}

/// Forward `param` to the greeter and add 50 to its answer.
///
/// Returns 0 when the host API or the greeter is unavailable.
///
/// # Safety
///
/// `param` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn relay_func(param: *const c_char) -> c_int {
    match relay(param) {
        Ok(ret) => ret,
        Err(err) => {
            eprintln!("[relay] {err}");
            0
        }
    }
}
