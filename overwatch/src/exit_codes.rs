//! Stable exit codes for overwatch CLI commands.

use crate::core::types::SessionStatus;

/// Command succeeded; for `run`, every task completed.
pub const OK: i32 = 0;
/// Invalid plan, config, or layout, or any other command error.
pub const INVALID: i32 = 1;
/// `overwatch run` ended aborted (empty goal, planning failure, rejection, operator stop).
pub const ABORTED: i32 = 2;
/// `overwatch run` finished with failed or never-run tasks.
pub const PARTIAL: i32 = 3;

pub fn for_status(status: SessionStatus) -> i32 {
    match status {
        SessionStatus::Completed => OK,
        SessionStatus::Partial => PARTIAL,
        SessionStatus::Aborted => ABORTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_statuses_map_to_distinct_codes() {
        assert_eq!(for_status(SessionStatus::Completed), OK);
        assert_eq!(for_status(SessionStatus::Partial), PARTIAL);
        assert_eq!(for_status(SessionStatus::Aborted), ABORTED);
        assert_ne!(ABORTED, INVALID);
    }
}
