//! Execution tests.
//!
//! ## Test Organization
//!
//! - `common`: Shared actions and the recording `Recorder` hooks
//! - `sync`: Synchronous dispatch, phase order and usage errors
//! - `reject`: Rejection paths and post-settlement behavior
//! - `asynchronous`: Asynchronous dispatch and suspension points
//! - `future`: The shared completion future
//!
//! ## Test Actions
//!
//! - `Transfer`: Sync, fails validation for non-positive amounts
//! - `Rename`: Sync, user-facing validation error for empty names
//! - `Upload`: Async, fails validation for zero bytes

mod common;
