#![allow(unused_macros)]

// Logging shims: forward to `tracing` under the `tracing` feature, vanish otherwise.

macro_rules! trace {
    ($($t:tt)*) => {
        cdm_log!(trace, $($t)*)
    }
}

macro_rules! debug {
    ($($t:tt)*) => {
        cdm_log!(debug, $($t)*)
    }
}

macro_rules! info {
    ($($t:tt)*) => {
        cdm_log!(info, $($t)*)
    }
}

macro_rules! warn {
    ($($t:tt)*) => {
        cdm_log!(warn, $($t)*)
    }
}

macro_rules! cdm_log {
    ($level: ident, $($t:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::$level!(target: "vinecdm", $($t)*) }
        #[cfg(not(feature = "tracing"))]
        { if false { let _ = format_args!($($t)*); } }
    }}
}
