//! Query-expression compiler.
//!
//! Three front ends produce the same [`Expression`] tree:
//!
//! - [`odata`]: OData-style filter strings (`price gt 5 and name eq 'x'`)
//! - [`closure`]: single-parameter closure sources (`x => x.price > 5`)
//! - the typed DSL on [`Expression`] and the fluent [`QueryExpression`] builder
//!
//! A finished [`QueryExpression`] is rendered to SQL by [`SqlFormatter`].
//!
//! ```no_run
//! use query_expr::{QueryExpression, SqlFormatter};
//!
//! let query = QueryExpression::new()
//!     .select(["id", "name"])
//!     .from("UserBase")
//!     .where_("name")
//!     .not_equal("user1@example.com");
//! let sql = SqlFormatter::new().format(&query)?;
//! # Ok::<(), query_expr::QueryError>(())
//! ```

pub mod closure;
pub mod config;
pub mod error;
pub mod expression;
pub mod odata;
pub mod query;
pub mod resolver;
pub mod sql;

pub use closure::ClosureParser;
pub use config::{Config, FormatterSettings};
pub use error::{QueryError, QueryResult};
pub use expression::{
    call, field, lit, ArithmeticOperator, ComparisonOperator, Expression, LogicalOperator,
};
pub use odata::ODataQuery;
pub use query::{
    JoinExpression, JoinKind, JoinOn, OrderBy, QueryExpression, QueryField, QueryKind,
    SortDirection, WhereBuilder,
};
pub use resolver::{DefaultResolver, MappedResolver, MemberResolver};
pub use sql::{FunctionRegistry, SqlFormatter};
