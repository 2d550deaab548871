/// User primary keys in the identity service are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Serde adapter for optional timestamps written by the job service.
///
/// Accepts RFC 3339 as well as naive ISO-8601 (`2024-03-01T12:00:00.123456`),
/// which is read as UTC.
pub mod lenient_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    use super::Timestamp;

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<Timestamp> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_offset_and_naive_forms() {
            let with_offset = parse("2024-03-01T12:00:00+00:00").unwrap();
            let naive = parse("2024-03-01T12:00:00.250000").unwrap();
            let spaced = parse("2024-03-01 12:00:00").unwrap();

            assert_eq!(with_offset, spaced);
            assert_eq!(naive.timestamp_subsec_millis(), 250);
            assert!(parse("yesterday").is_none());
        }
    }
}
