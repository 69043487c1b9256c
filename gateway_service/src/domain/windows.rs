use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Límites de ventanas rodantes para agregados de gasto.
///
/// Convenciones fijadas por el sistema: el día arranca a las 00:00 UTC, la
/// semana el domingo 00:00 UTC y el mes el día 1 a las 00:00 UTC. Una
/// transacción exactamente en el límite cuenta hacia la ventana nueva.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_hms_opt(0, 0, 0).unwrap())
}

pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_sunday = now.weekday().num_days_from_sunday() as i64;
    start_of_day(now) - Duration::days(days_from_sunday)
}

pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &now.date_naive()
            .with_day(1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_of_day_truncates_to_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2025-03-14 is a Friday; the week began Sunday 2025-03-09.
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap();
        assert_eq!(
            start_of_week(now),
            Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_sunday_midnight_counts_toward_new_week() {
        // Exactly Sunday 00:00:00 belongs to the week it opens.
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(start_of_week(now), now);
    }

    #[test]
    fn test_start_of_month() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            start_of_month(now),
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap()
        );
    }
}
