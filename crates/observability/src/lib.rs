//! Tracing and logging setup shared by every entry point.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Like [`init`], but with a caller-chosen fallback filter used when
/// `RUST_LOG` is not set (e.g. `"stockmove_relocation=debug"`).
pub fn init_with_default(filter: &str) {
    tracing::init(filter);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
