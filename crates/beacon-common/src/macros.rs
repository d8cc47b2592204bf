/// Helper macro to log an error and all its causes.
#[macro_export]
macro_rules! log_error {
    ($e:expr, $fmt:expr $(, $($arg:tt)*)?) => {
        $crate::log_base!(error, $e, $fmt $(, $($arg)*)*)
    };
}

/// Helper macro to log a warning and all its causes.
#[macro_export]
macro_rules! log_warn {
    ($e:expr, $fmt:expr $(, $($arg:tt)*)?) => {
        $crate::log_base!(warn, $e, $fmt $(, $($arg)*)*)
    };
}

#[macro_export]
macro_rules! log_base {
    ($level:tt, $e:expr, $fmt:expr $(, $($arg:tt)*)?) => {{
        let e = anyhow::Error::from($e);

        ::tracing::$level!($fmt $(, $($arg)*)*);

        for e in e.chain() {
            ::tracing::$level!("Caused by: {}", e);
        }
    }};
}
