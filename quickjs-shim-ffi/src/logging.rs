//! Diagnostic output for hosts that load the shared library
//!
//! Diagnostics go through `tracing`; nothing is printed until the host
//! installs a subscriber with [`quickjs_init_logging`].

use crate::read_str;
use once_cell::sync::OnceCell;
use std::ffi::{c_char, c_int};
use tracing_subscriber::EnvFilter;

/// Filter used when neither an argument nor `RUST_LOG` is given
pub const DEFAULT_FILTER: &str = "warn";

/// Set once the first install attempt has run
static INSTALLED: OnceCell<()> = OnceCell::new();

fn build_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr subscriber filtered by `filter` (NULL: `RUST_LOG`, then
/// `warn`). Returns 0 when installed by this call, 1 if logging was already
/// set up.
#[no_mangle]
pub extern "C" fn quickjs_init_logging(filter: *const c_char) -> c_int {
    let directive = if filter.is_null() {
        None
    } else {
        read_str(filter, "log filter")
    };

    let mut installed_now = false;
    INSTALLED.get_or_init(|| {
        installed_now = tracing_subscriber::fmt()
            .with_env_filter(build_filter(directive))
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .is_ok();
    });

    if installed_now {
        0
    } else {
        1
    }
}
