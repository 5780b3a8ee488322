//! Task id generation.
//!
//! Ids have a fixed shape: the `task_` prefix followed by 12 lowercase hex
//! characters taken from a UUIDv4, collision-free with overwhelming
//! probability even under concurrent generation.

use uuid::Uuid;

/// Fixed prefix for every task id.
pub const PREFIX: &str = "task_";

/// Hex suffix length.
pub const SUFFIX_LEN: usize = 12;

/// Generate a fresh task id, e.g. `task_9f8a1c04be72`.
pub fn generate() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{PREFIX}{}", &hex[..SUFFIX_LEN])
}

/// Check whether a string has the task id shape.
pub fn is_valid(id: &str) -> bool {
    match id.strip_prefix(PREFIX) {
        Some(suffix) => {
            suffix.len() == SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        }
        None => false,
    }
}
