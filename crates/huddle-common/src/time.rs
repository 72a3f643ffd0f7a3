use chrono::{SecondsFormat, Utc};

/// Current UTC time as an RFC 3339 / ISO 8601 string with millisecond precision.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_parseable_utc() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
