//! 时间谓词
//!
//! 路径上的时间戳可以是 RFC 3339 字符串或 Unix 秒数，统一按 UTC 解释。

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use serde_json::Value as JsonValue;

use super::coerce::json_numeric;
use super::predicates::resolve_target;
use super::{FunctionDecl, FunctionRegistry};
use crate::error::EvalError;
use crate::expr::Type;
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry
        .declare(FunctionDecl::new("timeBetween").path_aware().overload(
            "timeBetween_string_string",
            vec![Type::String, Type::String, Type::String],
            Type::Bool,
        ))
        .bind("timeBetween_string_string", time_between);

    registry
        .declare(FunctionDecl::new("dayOfWeekIn").path_aware().overload(
            "dayOfWeekIn_list",
            vec![Type::String, Type::list(Type::String)],
            Type::Bool,
        ))
        .bind("dayOfWeekIn_list", day_of_week_in);
}

/// 解析 JSON 中的时间戳
pub(super) fn json_timestamp(json: &JsonValue) -> Option<DateTime<Utc>> {
    match json {
        JsonValue::String(s) => parse_timestamp(s),
        JsonValue::Number(_) => {
            let seconds = json_numeric(json)?.to_i64()?;
            DateTime::from_timestamp(seconds, 0)
        }
        _ => None,
    }
}

/// 解析 RFC 3339 时间戳
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// 解析 `HH:MM[:SS]`
fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

fn time_between(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("timeBetween", args, 4)?;

    let bounds = rest[0]
        .as_str()
        .and_then(parse_time_of_day)
        .zip(rest[1].as_str().and_then(parse_time_of_day));
    let moment = found.as_ref().and_then(json_timestamp);

    let matched = match (bounds, moment) {
        (Some((start, end)), Some(moment)) => {
            let time = moment.time().with_nanosecond(0).unwrap_or(moment.time());
            if start <= end {
                start <= time && time <= end
            } else {
                // 跨越午夜的区间，如 22:00 - 06:00
                time >= start || time <= end
            }
        }
        _ => false,
    };

    Ok(Value::Bool(matched))
}

fn day_of_week_in(args: &[Value]) -> Result<Value, EvalError> {
    let (found, rest) = resolve_target("dayOfWeekIn", args, 3)?;

    let Some(weekday) = found.as_ref().and_then(json_timestamp).map(|ts| ts.weekday()) else {
        return Ok(Value::Bool(false));
    };

    let matched = match &rest[0] {
        Value::List(days) => days
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|day| day.trim().parse::<Weekday>().ok())
            .any(|day| day == weekday),
        _ => false,
    };

    Ok(Value::Bool(matched))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-15 是星期五
    const DOC: &str = r#"{
        "at": "2024-03-15T23:30:00Z",
        "morning": "2024-03-15T09:15:30+08:00",
        "epoch": 1710545400,
        "bad": "yesterday"
    }"#;

    fn args(path: &str, operands: &[Value]) -> Vec<Value> {
        let mut args = vec![Value::from(DOC), Value::from(path)];
        args.extend_from_slice(operands);
        args
    }

    fn between(path: &str, start: &str, end: &str) -> bool {
        time_between(&args(path, &[start.into(), end.into()]))
            .unwrap()
            .as_bool()
            .unwrap()
    }

    fn days(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_time_between() {
        assert!(between("at", "23:00", "23:59:59"));
        assert!(!between("at", "09:00", "17:00"));
        // +08:00 的 09:15 即 UTC 01:15
        assert!(between("morning", "01:00", "02:00"));
    }

    #[test]
    fn test_time_between_wraps_midnight() {
        assert!(between("at", "22:00", "06:00"));
        assert!(!between("at", "00:00", "06:00"));
    }

    #[test]
    fn test_epoch_seconds() {
        // 1710545400 = 2024-03-15T23:30:00Z
        assert!(between("epoch", "23:30", "23:31"));
    }

    #[test]
    fn test_invalid_inputs_are_false() {
        assert!(!between("bad", "00:00", "23:59"));
        assert!(!between("missing", "00:00", "23:59"));
        assert!(!between("at", "25:00", "26:00"));
    }

    #[test]
    fn test_day_of_week_in() {
        let check = |path: &str, list: Value| {
            day_of_week_in(&args(path, &[list])).unwrap() == Value::Bool(true)
        };
        assert!(check("at", days(&["Fri", "Sat"])));
        assert!(check("at", days(&["friday"])));
        assert!(!check("at", days(&["Mon", "Tue"])));
        assert!(!check("at", days(&["someday"])));
        assert!(!check("bad", days(&["Fri"])));
    }

    #[test]
    fn test_arity() {
        assert!(matches!(
            time_between(&args("at", &["00:00".into()])),
            Err(EvalError::Arity { expected: 4, .. })
        ));
    }
}
