//! Greeter plugin - exports a single function other plugins can borrow
//!
//! ```text
//! crucible> load ./target/debug/libgreeter.so greeter
//! crucible> call greeter greeter_func hello world
//! greeter_func returned 50
//! ```

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

/// Print the greeting passed in and return 50.
///
/// # Safety
///
/// `param` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn greeter_func(param: *const c_char) -> c_int {
    if !param.is_null() {
        let text = CStr::from_ptr(param).to_string_lossy();
        println!("[greeter] {text}");
    }
    50
}
