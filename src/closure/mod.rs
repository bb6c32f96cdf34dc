//! Closure front end.
//!
//! Translates the source of a filter closure (`x => x.price > 5`) into an
//! [`Expression`]. Member chains rooted at the closure parameter become
//! queryable members; outer variables must be supplied as bindings. Calls on
//! constants fold only through [`builtins::BuiltinFunctions`], so no user code
//! is ever evaluated.

pub mod builtins;
pub mod syntax;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::expression::{ArithmeticOperator, ComparisonOperator, Expression, LogicalOperator};
use crate::resolver::{DefaultResolver, MemberResolver};
use builtins::BuiltinFunctions;
use syntax::{BinaryOperator, HostNode, UnaryOperator};

/// Custom translation of a call. Receives the translated receiver (for
/// member calls) followed by the translated arguments.
pub type MethodHandler = Arc<dyn Fn(Vec<Expression>) -> QueryResult<Expression> + Send + Sync>;

/// Query method for a member call on a queryable receiver.
fn translate_method(method: &str) -> Option<&'static str> {
    match method {
        "startsWith" => Some("startswith"),
        "endsWith" => Some("endswith"),
        "includes" => Some("contains"),
        "indexOf" => Some("indexof"),
        "toLowerCase" | "toLocaleLowerCase" => Some("tolower"),
        "toUpperCase" | "toLocaleUpperCase" => Some("toupper"),
        "trim" => Some("trim"),
        "substr" | "substring" => Some("substring"),
        "concat" => Some("concat"),
        "getDate" => Some("day"),
        "getMonth" => Some("month"),
        "getFullYear" => Some("year"),
        "getHours" => Some("hour"),
        "getMinutes" => Some("minute"),
        "getSeconds" => Some("second"),
        _ => None,
    }
}

fn translate_math(function: &str) -> Option<&'static str> {
    match function {
        "floor" => Some("floor"),
        "ceil" => Some("ceiling"),
        "round" => Some("round"),
        _ => None,
    }
}

/// Properties computed from a value rather than stored on it.
const DERIVED_PROPERTIES: &[&str] = &["length"];

/// Parser for closure filters
#[derive(Clone)]
pub struct ClosureParser {
    resolver: Arc<dyn MemberResolver + Send + Sync>,
    bindings: HashMap<String, Value>,
    handlers: HashMap<String, MethodHandler>,
}

impl Default for ClosureParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClosureParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureParser")
            .field("bindings", &self.bindings)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Result of walking a node.
enum Walked {
    Expr(Expression),
    /// Member chain rooted at the parameter, not yet resolved
    Path(Vec<String>),
}

impl ClosureParser {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(DefaultResolver),
            bindings: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: impl MemberResolver + Send + Sync + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Bind an outer variable referenced by the closure.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// Register a custom translation for calls to `name`, taking precedence
    /// over the built-in method table.
    pub fn register_method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Expression>) -> QueryResult<Expression> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Parse closure source into a filter expression.
    pub fn parse_filter(&self, source: &str) -> QueryResult<Expression> {
        tracing::debug!("parsing closure filter: {}", source);
        let closure = syntax::parse_closure(source)?;
        let walker = Walker {
            parser: self,
            parameter: &closure.parameter,
        };
        walker.expression(&closure.body)
    }
}

struct Walker<'a> {
    parser: &'a ClosureParser,
    parameter: &'a str,
}

impl Walker<'_> {
    fn expression(&self, node: &HostNode) -> QueryResult<Expression> {
        match self.walk(node)? {
            Walked::Expr(expr) => Ok(expr),
            Walked::Path(path) => self.resolve_path(&path),
        }
    }

    fn resolve_path(&self, path: &[String]) -> QueryResult<Expression> {
        match path.split_last() {
            None => Err(QueryError::ParseError(format!(
                "The closure parameter '{}' cannot be used as a value",
                self.parameter
            ))),
            Some((last, rest)) if DERIVED_PROPERTIES.contains(&last.as_str()) && !rest.is_empty() => {
                let member = self.parser.resolver.resolve_member(&rest.join("."))?;
                self.method(last, vec![member])
            }
            Some(_) => self.parser.resolver.resolve_member(&path.join(".")),
        }
    }

    fn method(&self, name: &str, args: Vec<Expression>) -> QueryResult<Expression> {
        self.parser
            .resolver
            .resolve_method(name, args)?
            .ok_or_else(|| QueryError::ParseError(format!("Unknown method '{}'", name)))
    }

    fn walk(&self, node: &HostNode) -> QueryResult<Walked> {
        let expr = match node {
            HostNode::Literal(value) => Expression::Literal(value.clone()),
            HostNode::Identifier(name) => {
                if name == self.parameter {
                    return Ok(Walked::Path(Vec::new()));
                }
                Expression::Literal(self.binding(name)?.clone())
            }
            HostNode::Member { object, property } => return self.member(object, property),
            HostNode::Call { callee, args } => self.call(callee, args)?,
            HostNode::Binary { op, left, right } => self.binary(*op, left, right)?,
            HostNode::Logical { op, left, right } => {
                let operator = match op {
                    syntax::LogicalOperator::And => LogicalOperator::And,
                    syntax::LogicalOperator::Or => LogicalOperator::Or,
                };
                Expression::logical(operator, self.expression(left)?, self.expression(right)?)
            }
            HostNode::Unary { op, operand } => self.unary(*op, operand)?,
            HostNode::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| match self.expression(item)? {
                        Expression::Literal(value) => Ok(value),
                        _ => Err(QueryError::ParseError(
                            "Array elements must be constant".to_string(),
                        )),
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Expression::Literal(Value::Array(values))
            }
        };
        Ok(Walked::Expr(expr))
    }

    fn binding(&self, name: &str) -> QueryResult<&Value> {
        self.parser
            .bindings
            .get(name)
            .ok_or_else(|| QueryError::ParseError(format!("Unresolved identifier '{}'", name)))
    }

    fn member(&self, object: &HostNode, property: &str) -> QueryResult<Walked> {
        match self.walk(object)? {
            Walked::Path(mut path) => {
                path.push(property.to_string());
                Ok(Walked::Path(path))
            }
            Walked::Expr(Expression::Literal(value)) => {
                constant_property(&value, property).map(|v| Walked::Expr(Expression::Literal(v)))
            }
            Walked::Expr(expr) if DERIVED_PROPERTIES.contains(&property) => {
                self.method(property, vec![expr]).map(Walked::Expr)
            }
            Walked::Expr(_) => Err(QueryError::ParseError(format!(
                "Property '{}' cannot be read from a computed value",
                property
            ))),
        }
    }

    fn call(&self, callee: &HostNode, args: &[HostNode]) -> QueryResult<Expression> {
        match callee {
            HostNode::Identifier(name) => self.global_call(name, args),
            HostNode::Member { object, property } => {
                if matches!(object.as_ref(), HostNode::Identifier(name) if name == "Math" && !self.is_bound("Math")) {
                    return self.math_call(property, args);
                }
                self.member_call(object, property, args)
            }
            _ => Err(QueryError::ParseError(
                "Only named functions and methods can be called".to_string(),
            )),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        name == self.parameter || self.parser.bindings.contains_key(name)
    }

    fn arguments(&self, args: &[HostNode]) -> QueryResult<Vec<Expression>> {
        args.iter().map(|arg| self.expression(arg)).collect()
    }

    /// `parseInt(..)`, `myFunction(..)`
    fn global_call(&self, name: &str, args: &[HostNode]) -> QueryResult<Expression> {
        let args = self.arguments(args)?;
        if let Some(handler) = self.parser.handlers.get(name) {
            return handler(args);
        }
        if let Some(values) = literal_values(&args) {
            if let Some(value) = BuiltinFunctions::call(name, &values)? {
                tracing::trace!("folded {}(..) into {}", name, value);
                return Ok(Expression::Literal(value));
            }
        }
        self.method(name, args)
    }

    /// `Math.floor(..)`
    fn math_call(&self, function: &str, args: &[HostNode]) -> QueryResult<Expression> {
        let args = self.arguments(args)?;
        if let Some(handler) = self.parser.handlers.get(function) {
            return handler(args);
        }
        if let Some(values) = literal_values(&args) {
            if let Some(value) = BuiltinFunctions::call(&format!("Math.{}", function), &values)? {
                return Ok(Expression::Literal(value));
            }
        }
        match translate_math(function) {
            Some(name) => self.method(name, args),
            None => Err(QueryError::ParseError(format!(
                "Unsupported method 'Math.{}'",
                function
            ))),
        }
    }

    /// `receiver.method(..)`
    fn member_call(&self, object: &HostNode, method: &str, args: &[HostNode]) -> QueryResult<Expression> {
        let receiver = self.expression(object)?;
        let args = self.arguments(args)?;

        if let Some(handler) = self.parser.handlers.get(method) {
            let mut all = vec![receiver];
            all.extend(args);
            return handler(all);
        }

        if let Expression::Literal(value) = &receiver {
            if let Some(values) = literal_values(&args) {
                return match BuiltinFunctions::call_method(value, method, &values)? {
                    Some(folded) => {
                        tracing::trace!("folded {}.{}(..) into {}", value, method, folded);
                        Ok(Expression::Literal(folded))
                    }
                    None => Err(QueryError::ParseError(format!(
                        "Unsupported method '{}'",
                        method
                    ))),
                };
            }
            // [1, 2].includes(x.id)
            if value.is_array() && method == "includes" {
                if let [needle] = args.as_slice() {
                    return Ok(Expression::comparison(
                        needle.clone(),
                        ComparisonOperator::In,
                        receiver,
                    ));
                }
            }
        }

        let Some(name) = translate_method(method) else {
            return Err(QueryError::ParseError(format!(
                "Unsupported method '{}'",
                method
            )));
        };
        let mut all = vec![receiver];
        all.extend(substring_arguments(method, args));
        self.method(name, all)
    }

    fn binary(&self, op: BinaryOperator, left: &HostNode, right: &HostNode) -> QueryResult<Expression> {
        let left = self.expression(left)?;
        let right = self.expression(right)?;

        let comparison = match op {
            BinaryOperator::StrictEqual | BinaryOperator::Equal => Some(ComparisonOperator::Eq),
            BinaryOperator::StrictNotEqual | BinaryOperator::NotEqual => Some(ComparisonOperator::Ne),
            BinaryOperator::GreaterThan => Some(ComparisonOperator::Gt),
            BinaryOperator::GreaterThanOrEqual => Some(ComparisonOperator::Ge),
            BinaryOperator::LessThan => Some(ComparisonOperator::Lt),
            BinaryOperator::LessThanOrEqual => Some(ComparisonOperator::Le),
            _ => None,
        };
        if let Some(operator) = comparison {
            return Ok(Expression::comparison(left, operator, right));
        }

        let arithmetic = match op {
            BinaryOperator::Add => ArithmeticOperator::Add,
            BinaryOperator::Subtract => ArithmeticOperator::Sub,
            BinaryOperator::Multiply => ArithmeticOperator::Mul,
            BinaryOperator::Divide => ArithmeticOperator::Div,
            BinaryOperator::Modulus => ArithmeticOperator::Mod,
            other => {
                return Err(QueryError::ParseError(format!(
                    "Unsupported operator '{}'",
                    other.symbol()
                )))
            }
        };
        Ok(Expression::arithmetic(left, arithmetic, right))
    }

    fn unary(&self, op: UnaryOperator, operand: &HostNode) -> QueryResult<Expression> {
        let operand = self.expression(operand)?;
        match op {
            UnaryOperator::Not => Ok(!operand),
            UnaryOperator::Plus => Ok(operand),
            UnaryOperator::Minus => {
                if operand.as_literal().is_some_and(|value| !value.is_number()) {
                    return Err(QueryError::ParseError(
                        "Unary '-' requires a numeric operand".to_string(),
                    ));
                }
                Ok(Expression::arithmetic(
                    Expression::literal(0),
                    ArithmeticOperator::Sub,
                    operand,
                ))
            }
            other => Err(QueryError::ParseError(format!(
                "Unsupported operator '{}'",
                other.symbol()
            ))),
        }
    }
}

fn literal_values(args: &[Expression]) -> Option<Vec<Value>> {
    args.iter().map(|arg| arg.as_literal().cloned()).collect()
}

/// `substring(start, end)` takes an end index; the query method takes a length.
fn substring_arguments(method: &str, mut args: Vec<Expression>) -> Vec<Expression> {
    if method == "substring" && args.len() == 2 {
        if let (Some(start), Some(end)) = (
            args[0].as_literal().and_then(Value::as_i64),
            args[1].as_literal().and_then(Value::as_i64),
        ) {
            let (start, end) = (start.min(end).max(0), start.max(end).max(0));
            args = vec![Expression::literal(start), Expression::literal(end - start)];
        }
    }
    args
}

/// Read a property of a bound constant.
fn constant_property(value: &Value, property: &str) -> QueryResult<Value> {
    if DERIVED_PROPERTIES.contains(&property) {
        if let Some(length) = BuiltinFunctions::length(value) {
            return Ok(length);
        }
    }
    let found = match value {
        Value::Object(map) => map.get(property).cloned(),
        Value::Array(items) => property.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        _ => None,
    };
    found.ok_or_else(|| {
        QueryError::ParseError(format!("Unresolved property '{}' on bound value", property))
    })
}
