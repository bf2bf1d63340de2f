//! Ownership guard for mutating operations.

use crate::models::image::ImageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied,
}

/// Allow only the recorded owner. An absent or empty caller is always denied.
pub fn authorize(record: &ImageRecord, caller_owner_id: Option<&str>) -> Authorization {
    match caller_owner_id {
        Some(caller) if !caller.is_empty() && record.is_owned_by(caller) => Authorization::Allowed,
        _ => Authorization::Denied,
    }
}
