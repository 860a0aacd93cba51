//! Cell formatting
//!
//! Type-directed formatting of mapped values and parsing of temporal
//! input. Temporal text is tried against a fixed list of known formats
//! before the generic ISO-8601/RFC parsers; text none of them accept
//! formats to `null`.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use dataobjects_core::{FieldType, ObjectKind, path};
use serde_json::Value;

/// Date-only formats, tried in order
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%d-%m-%y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
];

/// Time-only formats, tried in order
const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%I:%M %p"];

/// Date-time formats, tried in order
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse temporal text. Time-only input is placed on today's date.
pub fn parse_temporal(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            return Some(Local::now().date_naive().and_time(time));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime);
        }
    }
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .map(|dt| dt.naive_local())
        .ok()
}

/// Display format of a temporal field type
fn display_format(field_type: &FieldType, kind: ObjectKind) -> Option<&'static str> {
    match field_type {
        FieldType::Date => Some("%d.%m.%Y"),
        FieldType::DateTime => Some("%d.%m.%Y %H:%M:%S"),
        FieldType::Time if kind == ObjectKind::Form => Some("%H:%M"),
        FieldType::Time => Some("%H:%M:%S"),
        _ => None,
    }
}

/// Storage format a temporal form input is written in
pub fn storage_format(field_type: &FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::Date => Some("%Y-%m-%d"),
        FieldType::DateTime => Some("%Y-%m-%d %H:%M:%S"),
        FieldType::Time => Some("%H:%M"),
        _ => None,
    }
}

/// Format a mapped cell by its field type
pub fn format_cell(value: Value, field_type: &FieldType, kind: ObjectKind) -> Value {
    if field_type.is_blank_column() {
        return Value::String(String::new());
    }
    if let Some(format) = display_format(field_type, kind) {
        if value.is_null() {
            return Value::Null;
        }
        return parse_temporal(&path::display(&value))
            .map(|dt| Value::String(dt.format(format).to_string()))
            .unwrap_or(Value::Null);
    }
    match field_type {
        FieldType::Boolean => Value::from(u8::from(path::truthy(&value))),
        FieldType::Filesize => match as_bytes(&value) {
            Some(bytes) => Value::String(human_filesize(bytes)),
            None => value,
        },
        _ => value,
    }
}

fn as_bytes(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Human-readable size, 1024-based
pub fn human_filesize(bytes: f64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes;
    let mut unit = 0;
    while size.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", size.round() as i64, UNITS[0])
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_known_date_formats() {
        for input in ["2024-03-05", "05.03.2024", "03/05/2024", "05-03-2024", "2024/03/05", "05 March 2024"] {
            assert_eq!(
                format_cell(json!(input), &FieldType::Date, ObjectKind::List),
                json!("05.03.2024"),
                "input {input}"
            );
        }
    }

    #[test]
    fn test_datetime_and_iso() {
        assert_eq!(
            format_cell(json!("2024-03-05 14:07:09"), &FieldType::DateTime, ObjectKind::List),
            json!("05.03.2024 14:07:09")
        );
        assert_eq!(
            format_cell(json!("2024-03-05T14:07:09.123456+01:00"), &FieldType::DateTime, ObjectKind::List),
            json!("05.03.2024 14:07:09")
        );
    }

    #[test]
    fn test_two_digit_years_and_fractional_seconds() {
        assert_eq!(
            format_cell(json!("05-03-24"), &FieldType::Date, ObjectKind::List),
            json!("05.03.2024")
        );
        assert_eq!(
            format_cell(json!("2024-03-05 14:07:09.000000"), &FieldType::DateTime, ObjectKind::List),
            json!("05.03.2024 14:07:09")
        );
    }

    #[test]
    fn test_time_format_depends_on_object_kind() {
        assert_eq!(
            format_cell(json!("2:05 PM"), &FieldType::Time, ObjectKind::List),
            json!("14:05:00")
        );
        assert_eq!(
            format_cell(json!("14:05:30"), &FieldType::Time, ObjectKind::Form),
            json!("14:05")
        );
    }

    #[test]
    fn test_unparseable_dates_become_null() {
        assert_eq!(format_cell(json!("soon"), &FieldType::Date, ObjectKind::List), Value::Null);
        assert_eq!(format_cell(Value::Null, &FieldType::Date, ObjectKind::Form), Value::Null);
    }

    #[test]
    fn test_boolean_filesize_and_blank_columns() {
        assert_eq!(format_cell(json!(true), &FieldType::Boolean, ObjectKind::List), json!(1));
        assert_eq!(format_cell(json!(""), &FieldType::Boolean, ObjectKind::List), json!(0));
        assert_eq!(format_cell(json!(1536), &FieldType::Filesize, ObjectKind::List), json!("1.50 KB"));
        assert_eq!(format_cell(json!("512"), &FieldType::Filesize, ObjectKind::List), json!("512 B"));
        assert_eq!(format_cell(json!("x"), &FieldType::Tools, ObjectKind::List), json!(""));
        assert_eq!(format_cell(json!("keep"), &FieldType::Text, ObjectKind::List), json!("keep"));
    }

    #[test]
    fn test_storage_formats() {
        let dt = parse_temporal("05.03.2024").unwrap();
        assert_eq!(dt.format(storage_format(&FieldType::Date).unwrap()).to_string(), "2024-03-05");
        assert_eq!(storage_format(&FieldType::Text), None);
    }
}
