//! Scalar and aggregate function renderers.
//!
//! Each renderer turns the arguments of a [`Expression::MethodCall`] (or an
//! arithmetic node, under its operator name) into SQL text. The registry is
//! keyed by lowercase name, so `startsWith` and `startswith` share a renderer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::SqlFormatter;
use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;

/// Render one function call.
pub type FunctionRenderer =
    Arc<dyn Fn(&SqlFormatter, &[Expression]) -> QueryResult<String> + Send + Sync>;

/// Table of function renderers.
#[derive(Clone)]
pub struct FunctionRegistry {
    renderers: HashMap<String, FunctionRenderer>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.renderers.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Registry with the built-in catalogue.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_defaults();
        registry
    }

    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// Add a renderer, replacing any existing one of the same name.
    pub fn register<F>(&mut self, name: &str, renderer: F)
    where
        F: Fn(&SqlFormatter, &[Expression]) -> QueryResult<String> + Send + Sync + 'static,
    {
        self.renderers
            .insert(name.to_ascii_lowercase(), Arc::new(renderer));
    }

    pub fn get(&self, name: &str) -> Option<&FunctionRenderer> {
        self.renderers.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn render(
        &self,
        formatter: &SqlFormatter,
        name: &str,
        args: &[Expression],
    ) -> QueryResult<String> {
        match self.get(name) {
            Some(renderer) => (**renderer)(formatter, args),
            None => Err(QueryError::FormatError(format!(
                "Unknown function '{}'",
                name
            ))),
        }
    }

    fn register_defaults(&mut self) {
        // String functions
        self.register("length", |f, args| unary(f, "length", "LENGTH", args));
        self.register("trim", |f, args| unary(f, "trim", "TRIM", args));
        self.register("tolower", |f, args| unary(f, "tolower", "LOWER", args));
        self.register("lower", |f, args| unary(f, "lower", "LOWER", args));
        self.register("toupper", |f, args| unary(f, "toupper", "UPPER", args));
        self.register("upper", |f, args| unary(f, "upper", "UPPER", args));
        self.register("concat", |f, args| {
            arity("concat", args, 1, usize::MAX)?;
            Ok(format!("CONCAT({})", f.escape_list(args)?))
        });
        self.register("indexof", |f, args| {
            arity("indexof", args, 2, 2)?;
            Ok(format!("LOCATE({}, {})", f.escape(&args[1])?, f.escape(&args[0])?))
        });
        self.register("substring", |f, args| substring(f, "substring", args));
        self.register("substr", |f, args| substring(f, "substr", args));

        // Pattern matching
        self.register("startswith", |f, args| {
            arity("startswith", args, 2, 2)?;
            let pattern = match args[1].as_literal() {
                Some(Value::String(s)) => f.escape_value(&Value::String(format!("^{}", regex::escape(s))))?,
                _ => format!("CONCAT('^', {})", f.escape(&args[1])?),
            };
            Ok(format!("({} REGEXP {})", f.escape(&args[0])?, pattern))
        });
        self.register("endswith", |f, args| {
            arity("endswith", args, 2, 2)?;
            let pattern = match args[1].as_literal() {
                Some(Value::String(s)) => f.escape_value(&Value::String(format!("{}$", regex::escape(s))))?,
                _ => format!("CONCAT({}, '$')", f.escape(&args[1])?),
            };
            Ok(format!("({} REGEXP {})", f.escape(&args[0])?, pattern))
        });
        self.register("contains", |f, args| {
            arity("contains", args, 2, 2)?;
            Ok(format!(
                "({} REGEXP {})",
                f.escape(&args[0])?,
                escaped_pattern(f, &args[1])?
            ))
        });
        self.register("substringof", |f, args| {
            arity("substringof", args, 2, 2)?;
            Ok(format!(
                "({} REGEXP {})",
                f.escape(&args[1])?,
                escaped_pattern(f, &args[0])?
            ))
        });
        self.register("text", |f, args| raw_pattern(f, "text", args));
        self.register("regex", |f, args| raw_pattern(f, "regex", args));

        // Date and time
        self.register("day", |f, args| unary(f, "day", "DAY", args));
        self.register("month", |f, args| unary(f, "month", "MONTH", args));
        self.register("year", |f, args| unary(f, "year", "YEAR", args));
        self.register("hour", |f, args| unary(f, "hour", "HOUR", args));
        self.register("minute", |f, args| unary(f, "minute", "MINUTE", args));
        self.register("second", |f, args| unary(f, "second", "SECOND", args));
        self.register("date", |f, args| unary(f, "date", "DATE", args));

        // Numeric
        self.register("floor", |f, args| unary(f, "floor", "FLOOR", args));
        self.register("ceiling", |f, args| unary(f, "ceiling", "CEILING", args));
        self.register("round", |f, args| {
            arity("round", args, 1, 2)?;
            let digits = match args.get(1) {
                Some(digits) => f.escape(digits)?,
                None => "0".to_string(),
            };
            Ok(format!("ROUND({}, {})", f.escape(&args[0])?, digits))
        });
        self.register("add", |f, args| infix(f, "add", "+", args));
        self.register("sub", |f, args| infix(f, "sub", "-", args));
        self.register("mul", |f, args| infix(f, "mul", "*", args));
        self.register("div", |f, args| infix(f, "div", "/", args));
        self.register("mod", |f, args| infix(f, "mod", "%", args));
        self.register("bit", |f, args| infix(f, "bit", "&", args));

        self.register("ifnull", |f, args| {
            arity("ifnull", args, 2, 2)?;
            Ok(format!("COALESCE({}, {})", f.escape(&args[0])?, f.escape(&args[1])?))
        });

        // Aggregates
        self.register("count", |f, args| {
            arity("count", args, 0, 1)?;
            match args.first() {
                Some(arg) => Ok(format!("COUNT({})", f.escape(arg)?)),
                None => Ok("COUNT(*)".to_string()),
            }
        });
        self.register("min", |f, args| unary(f, "min", "MIN", args));
        self.register("max", |f, args| unary(f, "max", "MAX", args));
        self.register("avg", |f, args| unary(f, "avg", "AVG", args));
        self.register("sum", |f, args| unary(f, "sum", "SUM", args));
    }
}

fn arity(name: &str, args: &[Expression], min: usize, max: usize) -> QueryResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(QueryError::FormatError(format!(
            "Function '{}' expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn unary(f: &SqlFormatter, name: &str, sql: &str, args: &[Expression]) -> QueryResult<String> {
    arity(name, args, 1, 1)?;
    Ok(format!("{}({})", sql, f.escape(&args[0])?))
}

fn infix(f: &SqlFormatter, name: &str, symbol: &str, args: &[Expression]) -> QueryResult<String> {
    arity(name, args, 2, 2)?;
    Ok(format!(
        "({} {} {})",
        f.escape(&args[0])?,
        symbol,
        f.escape(&args[1])?
    ))
}

/// `SUBSTRING(a, pos + 1[, len])`; positions are zero-based on input.
fn substring(f: &SqlFormatter, name: &str, args: &[Expression]) -> QueryResult<String> {
    arity(name, args, 2, 3)?;
    let position = match args[1]
        .as_literal()
        .and_then(Value::as_i64)
        .and_then(|start| start.checked_add(1))
    {
        Some(position) => position.to_string(),
        None => format!("{} + 1", f.escape(&args[1])?),
    };
    match args.get(2) {
        Some(length) => Ok(format!(
            "SUBSTRING({}, {}, {})",
            f.escape(&args[0])?,
            position,
            f.escape(length)?
        )),
        None => Ok(format!("SUBSTRING({}, {})", f.escape(&args[0])?, position)),
    }
}

/// A literal search string with regex metacharacters escaped.
fn escaped_pattern(f: &SqlFormatter, arg: &Expression) -> QueryResult<String> {
    match arg.as_literal() {
        Some(Value::String(s)) => f.escape_value(&Value::String(regex::escape(s))),
        _ => f.escape(arg),
    }
}

fn raw_pattern(f: &SqlFormatter, name: &str, args: &[Expression]) -> QueryResult<String> {
    arity(name, args, 2, 2)?;
    Ok(format!(
        "({} REGEXP {})",
        f.escape(&args[0])?,
        f.escape(&args[1])?
    ))
}
