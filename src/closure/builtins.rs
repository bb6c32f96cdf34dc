//! Whitelisted pure functions used to fold constant calls in closures.
//!
//! Only the functions below are ever evaluated while parsing a closure;
//! anything else either translates to a query method or is rejected.

use serde_json::Value;

use crate::error::{QueryError, QueryResult};

/// Container for the foldable function implementations.
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    /// Call a global function (`parseInt`) or a `Math.*` function (`Math.floor`).
    /// Returns `None` if the function is not whitelisted.
    pub fn call(name: &str, args: &[Value]) -> QueryResult<Option<Value>> {
        if let Some(math) = name.strip_prefix("Math.") {
            return math_call(math, args);
        }

        let result = match name {
            "parseInt" => {
                let text = text_of(args.first());
                let radix = args.get(1).and_then(Value::as_u64).unwrap_or(10) as u32;
                Some(parse_int(name, text.trim(), radix)?)
            }
            "parseFloat" => {
                let text = text_of(args.first());
                Some(number(name, parse_float_prefix(text.trim()))?)
            }
            "String" => Some(Value::String(text_of(args.first()))),
            "Number" => match args.first() {
                None => Some(Value::from(0)),
                Some(Value::Number(n)) => Some(Value::Number(n.clone())),
                Some(Value::Bool(b)) => Some(Value::from(u8::from(*b))),
                Some(Value::Null) => Some(Value::from(0)),
                Some(Value::String(s)) if s.trim().is_empty() => Some(Value::from(0)),
                Some(Value::String(s)) => Some(number(name, s.trim().parse::<f64>().unwrap_or(f64::NAN))?),
                Some(_) => Some(number(name, f64::NAN)?),
            },
            "Boolean" => Some(Value::Bool(truthy(args.first()))),
            _ => None,
        };
        Ok(result)
    }

    /// Call a method on a constant receiver (`'abc'.toUpperCase()`).
    /// Returns `None` if the method is not whitelisted for the receiver type.
    pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> QueryResult<Option<Value>> {
        match receiver {
            Value::String(s) => string_method(s, method, args),
            Value::Array(items) => array_method(items, method, args),
            _ => Ok(None),
        }
    }

    /// Derived `length` property of a constant.
    pub fn length(value: &Value) -> Option<Value> {
        match value {
            Value::String(s) => Some(Value::from(s.encode_utf16().count())),
            Value::Array(items) => Some(Value::from(items.len())),
            _ => None,
        }
    }
}

fn math_call(name: &str, args: &[Value]) -> QueryResult<Option<Value>> {
    let nums = args
        .iter()
        .map(|arg| arg.as_f64())
        .collect::<Option<Vec<f64>>>();
    let Some(nums) = nums else {
        return Err(QueryError::ParseError(format!(
            "Math.{} expects numeric arguments",
            name
        )));
    };
    let first = nums.first().copied().unwrap_or(f64::NAN);
    let full_name = format!("Math.{}", name);

    let result = match name {
        "abs" => first.abs(),
        "ceil" => first.ceil(),
        "floor" => first.floor(),
        // JS rounds halves towards positive infinity
        "round" => (first + 0.5).floor(),
        "trunc" => first.trunc(),
        "sign" => {
            if first == 0.0 {
                0.0
            } else {
                first.signum()
            }
        }
        "sqrt" => first.sqrt(),
        "pow" => first.powf(nums.get(1).copied().unwrap_or(f64::NAN)),
        "max" if !nums.is_empty() => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "min" if !nums.is_empty() => nums.iter().copied().fold(f64::INFINITY, f64::min),
        _ => return Ok(None),
    };
    number(&full_name, result).map(Some)
}

fn string_method(s: &str, method: &str, args: &[Value]) -> QueryResult<Option<Value>> {
    let arg_text = |index: usize| text_of(args.get(index));
    let arg_index = |index: usize| args.get(index).and_then(Value::as_f64);
    let chars: Vec<char> = s.chars().collect();

    let result = match method {
        "toLowerCase" | "toLocaleLowerCase" => Value::String(s.to_lowercase()),
        "toUpperCase" | "toLocaleUpperCase" => Value::String(s.to_uppercase()),
        "trim" => Value::String(s.trim().to_string()),
        "trimStart" => Value::String(s.trim_start().to_string()),
        "trimEnd" => Value::String(s.trim_end().to_string()),
        "startsWith" => Value::Bool(s.starts_with(&arg_text(0))),
        "endsWith" => Value::Bool(s.ends_with(&arg_text(0))),
        "includes" => Value::Bool(s.contains(&arg_text(0))),
        "indexOf" => {
            let needle = arg_text(0);
            let index = s
                .find(&needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Value::from(index)
        }
        "charAt" => {
            let index = arg_index(0).unwrap_or(0.0);
            let ch = if index >= 0.0 {
                chars.get(index as usize).map(|c| c.to_string())
            } else {
                None
            };
            Value::String(ch.unwrap_or_default())
        }
        "substr" => {
            let len = chars.len() as f64;
            let mut start = arg_index(0).unwrap_or(0.0);
            if start < 0.0 {
                start = (len + start).max(0.0);
            }
            let count = arg_index(1).unwrap_or(len).max(0.0);
            Value::String(chars.iter().skip(start as usize).take(count as usize).collect())
        }
        "substring" => {
            let len = chars.len() as f64;
            let clamp = |v: f64| v.clamp(0.0, len) as usize;
            let a = clamp(arg_index(0).unwrap_or(0.0));
            let b = clamp(arg_index(1).unwrap_or(len));
            let (from, to) = if a <= b { (a, b) } else { (b, a) };
            Value::String(chars[from..to].iter().collect())
        }
        "concat" => {
            let mut result = s.to_string();
            for arg in args {
                result.push_str(&text_of(Some(arg)));
            }
            Value::String(result)
        }
        "toString" => Value::String(s.to_string()),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> QueryResult<Option<Value>> {
    let needle = args.first().unwrap_or(&Value::Null);
    let result = match method {
        "includes" => Value::Bool(items.contains(needle)),
        "indexOf" => Value::from(
            items
                .iter()
                .position(|item| item == needle)
                .map(|i| i as i64)
                .unwrap_or(-1),
        ),
        "join" => {
            let separator = match args.first() {
                Some(Value::String(s)) => s.clone(),
                _ => ",".to_string(),
            };
            Value::String(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Null => String::new(),
                        other => text_of(Some(other)),
                    })
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// JS string conversion of a constant.
fn text_of(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| text_of(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn parse_int(name: &str, text: &str, radix: u32) -> QueryResult<Value> {
    if !(2..=36).contains(&radix) {
        return number(name, f64::NAN);
    }
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    match i64::from_str_radix(&prefix, radix) {
        Ok(n) => Ok(Value::from(if negative { -n } else { n })),
        Err(_) => number(name, f64::NAN),
    }
}

/// Longest numeric prefix, as `parseFloat` reads it.
fn parse_float_prefix(text: &str) -> f64 {
    let mut end = 0;
    for (index, _) in text.char_indices().skip(1).chain([(text.len(), ' ')]) {
        if text[..index].parse::<f64>().is_ok() {
            end = index;
        }
    }
    if end == 0 {
        return f64::NAN;
    }
    text[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// JSON number for a folded result; integral values stay integers.
fn number(name: &str, value: f64) -> QueryResult<Value> {
    if !value.is_finite() {
        return Err(QueryError::ParseError(format!(
            "{} does not produce a finite number",
            name
        )));
    }
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(value as i64));
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| QueryError::ParseError(format!("{} does not produce a number", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_functions() {
        assert_eq!(BuiltinFunctions::call("parseInt", &[json!("42px")]).unwrap(), Some(json!(42)));
        assert_eq!(BuiltinFunctions::call("parseInt", &[json!("ff"), json!(16)]).unwrap(), Some(json!(255)));
        assert_eq!(BuiltinFunctions::call("parseFloat", &[json!("3.5kg")]).unwrap(), Some(json!(3.5)));
        assert_eq!(BuiltinFunctions::call("String", &[json!(12)]).unwrap(), Some(json!("12")));
        assert_eq!(BuiltinFunctions::call("Number", &[json!("7")]).unwrap(), Some(json!(7)));
        assert_eq!(BuiltinFunctions::call("Boolean", &[json!("")]).unwrap(), Some(json!(false)));
        assert_eq!(BuiltinFunctions::call("eval", &[json!("1")]).unwrap(), None);
    }

    #[test]
    fn test_non_finite_results_are_errors() {
        assert!(BuiltinFunctions::call("parseInt", &[json!("abc")]).is_err());
        assert!(BuiltinFunctions::call("Math.sqrt", &[json!(-1)]).is_err());
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(BuiltinFunctions::call("Math.floor", &[json!(2.7)]).unwrap(), Some(json!(2)));
        assert_eq!(BuiltinFunctions::call("Math.ceil", &[json!(2.1)]).unwrap(), Some(json!(3)));
        assert_eq!(BuiltinFunctions::call("Math.round", &[json!(-2.5)]).unwrap(), Some(json!(-2)));
        assert_eq!(BuiltinFunctions::call("Math.max", &[json!(1), json!(9), json!(4)]).unwrap(), Some(json!(9)));
        assert_eq!(BuiltinFunctions::call("Math.pow", &[json!(2), json!(10)]).unwrap(), Some(json!(1024)));
        assert_eq!(BuiltinFunctions::call("Math.random", &[]).unwrap(), None);
        assert!(BuiltinFunctions::call("Math.abs", &[json!("x")]).is_err());
    }

    #[test]
    fn test_string_methods() {
        let s = json!("Hello World");
        assert_eq!(BuiltinFunctions::call_method(&s, "toUpperCase", &[]).unwrap(), Some(json!("HELLO WORLD")));
        assert_eq!(BuiltinFunctions::call_method(&s, "indexOf", &[json!("World")]).unwrap(), Some(json!(6)));
        assert_eq!(BuiltinFunctions::call_method(&s, "substr", &[json!(6), json!(3)]).unwrap(), Some(json!("Wor")));
        assert_eq!(BuiltinFunctions::call_method(&s, "substring", &[json!(5), json!(0)]).unwrap(), Some(json!("Hello")));
        assert_eq!(BuiltinFunctions::call_method(&s, "startsWith", &[json!("He")]).unwrap(), Some(json!(true)));
        assert_eq!(BuiltinFunctions::call_method(&s, "concat", &[json!("!"), json!(1)]).unwrap(), Some(json!("Hello World!1")));
        assert_eq!(BuiltinFunctions::call_method(&s, "split", &[json!(" ")]).unwrap(), None);
    }

    #[test]
    fn test_array_methods() {
        let a = json!([1, 2, 3]);
        assert_eq!(BuiltinFunctions::call_method(&a, "includes", &[json!(2)]).unwrap(), Some(json!(true)));
        assert_eq!(BuiltinFunctions::call_method(&a, "indexOf", &[json!(5)]).unwrap(), Some(json!(-1)));
        assert_eq!(BuiltinFunctions::call_method(&a, "join", &[json!("-")]).unwrap(), Some(json!("1-2-3")));
    }

    #[test]
    fn test_length() {
        assert_eq!(BuiltinFunctions::length(&json!("abc")), Some(json!(3)));
        assert_eq!(BuiltinFunctions::length(&json!([1, 2])), Some(json!(2)));
        assert_eq!(BuiltinFunctions::length(&json!(5)), None);
    }
}
