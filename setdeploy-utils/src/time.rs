//! Wall-clock helpers shared by the deployment tooling.

use jiff::Timestamp;

/// Milliseconds since the Unix epoch, the unit used for recorded transactions.
pub fn now_millis() -> i64 {
    Timestamp::now().as_millisecond()
}
