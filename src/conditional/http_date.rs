//! IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`) formatting and parsing.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const IMF_FIXDATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Render `value` in UTC with second precision.
pub fn format_http_date(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value.to_offset(UtcOffset::UTC).format(IMF_FIXDATE)
}

/// Parse an IMF-fixdate header value; other date forms yield `None`.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), IMF_FIXDATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn formats_imf_fixdate() {
        let value = datetime!(1994-11-06 08:49:37.250 UTC);
        assert_eq!(
            format_http_date(value).expect("format"),
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
    }

    #[test]
    fn converts_offsets_to_gmt() {
        let value = datetime!(2026-05-04 12:00 +02:00);
        assert_eq!(
            format_http_date(value).expect("format"),
            "Mon, 04 May 2026 10:00:00 GMT"
        );
    }

    #[test]
    fn parses_what_it_formats() {
        let parsed = parse_http_date(" Sun, 06 Nov 1994 08:49:37 GMT ").expect("parse");
        assert_eq!(parsed, datetime!(1994-11-06 08:49:37 UTC));
    }

    #[test]
    fn rejects_other_date_forms() {
        assert!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").is_none());
        assert!(parse_http_date("1994-11-06T08:49:37Z").is_none());
        assert!(parse_http_date("").is_none());
    }
}
