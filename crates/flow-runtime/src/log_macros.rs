/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need to
/// remember the string literal. Domains: `sys` (coordinator lifecycle),
/// `sched` (dispatch/admission), `lic` (license manager), `met` (work-unit
/// meter), `sink` (signal sink/windows), `atom` (atom invocation).
///
/// # Usage
///
/// ```ignore
/// use crate::log_macros::*;
///
/// flow_info!(sched, node = %node_id, "atom admitted");
/// flow_warn!(atom, node = %node_id, error = %e, "atom invocation failed");
/// flow_debug!(lic, state = ?state, "license revalidated");
/// ```
///
/// The macros accept any tracing-compatible field syntax after the domain
/// identifier. The domain identifier is **not** a string — it is a bare
/// identifier that the macro converts to a `&str` literal.

// ---------------------------------------------------------------------------
// Core macro — dispatches to the matching tracing level macro.
// ---------------------------------------------------------------------------

/// Internal helper. Do not call directly; use `flow_error!` … `flow_trace!`.
#[doc(hidden)]
macro_rules! flow_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

// ---------------------------------------------------------------------------
// Public per-level macros
// ---------------------------------------------------------------------------

/// Log at ERROR level with an automatic `domain` field.
///
/// ```ignore
/// flow_error!(sink, error = %e, "subscriber dispatch failed");
/// ```
macro_rules! flow_error {
    ($domain:ident, $($rest:tt)*) => {
        flow_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
///
/// ```ignore
/// flow_warn!(sched, node = %id, "node quarantined");
/// ```
macro_rules! flow_warn {
    ($domain:ident, $($rest:tt)*) => {
        flow_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
///
/// ```ignore
/// flow_info!(sys, tier = ?tier, "system ready");
/// ```
macro_rules! flow_info {
    ($domain:ident, $($rest:tt)*) => {
        flow_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
///
/// ```ignore
/// flow_debug!(met, current = cost, "work units recorded");
/// ```
macro_rules! flow_debug {
    ($domain:ident, $($rest:tt)*) => {
        flow_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
///
/// ```ignore
/// flow_trace!(sched, node = %id, "trigger coalesced");
/// ```
#[allow(unused_macros)]
macro_rules! flow_trace {
    ($domain:ident, $($rest:tt)*) => {
        flow_log!(trace, $domain, $($rest)*)
    };
}
