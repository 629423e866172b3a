//! Shared settings for the crate's property tests.

/// Number of cases each `proptest!` block runs.
///
/// Miri interprets every case, so it gets a handful instead of the usual 256.
#[must_use]
pub const fn miri_case_count() -> u32 {
    if cfg!(miri) {
        5
    } else {
        256
    }
}
