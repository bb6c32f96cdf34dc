//! Member and method resolution hooks.
//!
//! Both parsers hand every member path and every method call to a
//! [`MemberResolver`] before building the node, so the data layer can
//! rename fields, validate them against a model, or veto unknown methods.

use std::collections::{HashMap, HashSet};

use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;

/// Resolution hooks consumed by the OData and closure parsers.
pub trait MemberResolver {
    /// Resolve a dotted member path into a queryable expression.
    fn resolve_member(&self, path: &str) -> QueryResult<Expression> {
        Ok(Expression::Member(path.to_string()))
    }

    /// Resolve a method call. `Ok(None)` vetoes the method.
    fn resolve_method(&self, name: &str, args: Vec<Expression>) -> QueryResult<Option<Expression>> {
        Ok(Some(Expression::method(name, args)))
    }
}

/// Identity member resolution, generic method calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl MemberResolver for DefaultResolver {}

/// Resolver backed by an attribute map.
///
/// Maps attribute names to column names (unmapped paths pass through unless
/// the resolver is strict) and optionally restricts the callable methods.
#[derive(Debug, Clone, Default)]
pub struct MappedResolver {
    members: HashMap<String, String>,
    methods: Option<HashSet<String>>,
    strict: bool,
}

impl MappedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an attribute to a column.
    pub fn map_member(mut self, attribute: impl Into<String>, column: impl Into<String>) -> Self {
        self.members.insert(attribute.into(), column.into());
        self
    }

    /// Reject member paths that were not mapped.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Only allow the given methods; any other call is vetoed.
    pub fn allow_methods<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(names.into_iter().map(|n| n.into().to_lowercase()).collect());
        self
    }
}

impl MemberResolver for MappedResolver {
    fn resolve_member(&self, path: &str) -> QueryResult<Expression> {
        match self.members.get(path) {
            Some(column) => Ok(Expression::Member(column.clone())),
            None if self.strict => Err(QueryError::ParseError(format!(
                "Unknown member '{}'",
                path
            ))),
            None => Ok(Expression::Member(path.to_string())),
        }
    }

    fn resolve_method(&self, name: &str, args: Vec<Expression>) -> QueryResult<Option<Expression>> {
        match &self.methods {
            Some(allowed) if !allowed.contains(&name.to_lowercase()) => Ok(None),
            _ => Ok(Some(Expression::method(name, args))),
        }
    }
}
