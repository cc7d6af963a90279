//! Shared utilities for termsurface.

/// Panic in debug builds, log an error with a backtrace in release.
///
/// For invariants a host bug can break (two sessions on one surface, say)
/// that must never take the host editor down in production.
#[macro_export]
macro_rules! debug_panic {
    ( $($fmt_arg:tt)* ) => {
        if cfg!(debug_assertions) {
            panic!( $($fmt_arg)* );
        } else {
            let backtrace = std::backtrace::Backtrace::capture();
            tracing::error!("{}\n{:?}", format_args!($($fmt_arg)*), backtrace);
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "surface#3 already had a session")]
    fn debug_panic_panics_in_debug_builds() {
        debug_panic!("surface#{} already had a session", 3);
    }
}
