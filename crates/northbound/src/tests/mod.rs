//! Behavioural tests for the export core.
//!
//! - `harness.rs`   - Stub collaborators and a stub-wired transport
//! - `delivery.rs`  - I. Delivery, retry and acknowledgment
//! - `dedup.rs`     - II. Device dedup and announcement
//! - `notifier.rs`  - III. Registry query-and-forward
//! - `lifecycle.rs` - IV. Shutdown drain and cleanup

mod delivery;
