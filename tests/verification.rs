//! Verification integration tests.
//!
//! - Property tests - property-based testing with proptest

mod verification {
    pub mod property;
}
