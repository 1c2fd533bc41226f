//! Session-level tests driven through mock collaborators.
//!
//! - `harness.rs`           - mock identity client, credential store, telemetry, targets
//! - `login_logout.rs`      - login, logout, code requests, error surfacing
//! - `restore.rs`           - restoring persisted sessions
//! - `refresh.rs`           - scheduling, single-flight, stale results, forced logout
//! - `environment_flow.rs`  - reviewer routing through the session operations

mod login_logout;
