use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone};

/// Simply converts an epoch second to a ``DateTime<Local>``, it is a private
/// helper used internally by the timer core, as such why it lives in utils module
pub(crate) fn local_from_epoch(secs: i64) -> Option<DateTime<Local>> {
    Some(DateTime::from_timestamp(secs, 0)?.with_timezone(&Local))
}

/// Folds a naive broken-down local time into a concrete ``DateTime<Local>``.
/// A DST gap maps to the first valid instant after it (scanning forward one
/// minute at a time), an ambiguous repetition maps to the earlier offset
pub(crate) fn fold_local(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(dt1, _) => dt1,
        LocalResult::None => {
            let mut candidate = naive;
            // DST gaps are at most a few hours wide
            for _ in 0..240 {
                candidate += Duration::minutes(1);
                if let LocalResult::Single(dt) = Local.from_local_datetime(&candidate) {
                    return dt;
                }
            }
            chrono::Utc.from_utc_datetime(&naive).with_timezone(&Local)
        }
    }
}
