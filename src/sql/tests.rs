//! Tests for the SQL formatter.

use super::*;
use crate::expression::{call, field, lit};
use crate::query::{JoinKind, OrderBy};
use serde_json::json;

fn format(query: &QueryExpression) -> String {
    SqlFormatter::new().format(query).unwrap()
}

fn where_sql(expr: Expression) -> String {
    SqlFormatter::new().format_where(&expr).unwrap()
}

// ============================================================================
// Escaping
// ============================================================================

#[test]
fn test_escape_string_table() {
    assert_eq!(escape_string("O'Brien"), "'O''Brien'");
    assert_eq!(escape_string("a\nb"), "'a\\nb'");
    assert_eq!(escape_string("tab\there"), "'tab\\there'");
    assert_eq!(escape_string("nul\0"), "'nul\\0'");
    assert_eq!(escape_string("say \"hi\""), "'say \\\"hi\\\"'");
    assert_eq!(escape_string("c:\\dir"), "'c:\\\\dir'");
    assert_eq!(escape_string("\x1a\x08\r"), "'\\Z\\b\\r'");
}

#[test]
fn test_escape_value() {
    let formatter = SqlFormatter::new();
    assert_eq!(formatter.escape_value(&json!(null)).unwrap(), "NULL");
    assert_eq!(formatter.escape_value(&json!(true)).unwrap(), "true");
    assert_eq!(formatter.escape_value(&json!(3.5)).unwrap(), "3.5");
    assert_eq!(formatter.escape_value(&json!([1, "a"])).unwrap(), "1, 'a'");
    assert_eq!(
        formatter.escape_value(&json!({"$name": "UserBase.id"})).unwrap(),
        "UserBase.id"
    );
    assert_eq!(
        formatter.escape_value(&json!({"$length": {"$name": "name"}})).unwrap(),
        "LENGTH(name)"
    );
}

#[test]
fn test_escape_name_uses_template() {
    let formatter = SqlFormatter::with_settings(FormatterSettings::mysql());
    assert_eq!(formatter.escape_name("UserBase.id"), "`UserBase`.`id`");
    let formatter = SqlFormatter::with_settings(FormatterSettings::mssql());
    assert_eq!(formatter.escape_name("name"), "[name]");
    assert_eq!(formatter.escape_name("*"), "*");
}

// ============================================================================
// Predicates
// ============================================================================

#[test]
fn test_comparison_templates() {
    assert_eq!(where_sql(field("a").equal(1)), "(a = 1)");
    assert_eq!(where_sql(field("a").not_equal("x")), "(NOT a = 'x')");
    assert_eq!(where_sql(field("a").equal(json!(null))), "(a IS NULL)");
    assert_eq!(where_sql(field("a").not_equal(json!(null))), "(NOT a IS NULL)");
    assert_eq!(where_sql(field("a").greater_than(1)), "(a > 1)");
    assert_eq!(where_sql(field("a").greater_or_equal(1)), "(a >= 1)");
    assert_eq!(where_sql(field("a").lower_than(1)), "(a < 1)");
    assert_eq!(where_sql(field("a").lower_or_equal(1)), "(a <= 1)");
    assert_eq!(where_sql(field("a").equal(field("b"))), "(a = b)");
}

#[test]
fn test_in_lists() {
    assert_eq!(where_sql(field("id").is_in([1, 2])), "(id IN (1, 2))");
    assert_eq!(where_sql(field("id").not_in(["a"])), "(NOT id IN ('a'))");
    assert_eq!(
        where_sql(field("id").is_in(Vec::<i32>::new())),
        "(id IN (NULL))"
    );
    assert_eq!(
        where_sql(field("id").not_in(Vec::<i32>::new())),
        "(NOT id IN (NULL))"
    );
}

#[test]
fn test_equality_against_list_renders_in() {
    assert_eq!(
        where_sql(field("tags").equal(json!(["a", "b"]))),
        "(tags IN ('a', 'b'))"
    );
    assert_eq!(
        where_sql(field("tags").not_equal(json!(["a"]))),
        "(NOT tags IN ('a'))"
    );
    assert_eq!(where_sql(field("tags").equal(json!([]))), "(tags IN (NULL))");

    let formatter = SqlFormatter::new();
    assert_eq!(
        formatter.format_where_value(&json!({"tags": ["a", "b"]})).unwrap(),
        "(tags IN ('a', 'b'))"
    );
    let query = QueryExpression::new()
        .select_all()
        .from("T")
        .filter(field("tags").equal(json!(["a", "b"])));
    assert_eq!(format(&query), "SELECT * FROM T WHERE (tags IN ('a', 'b'))");
}

#[test]
fn test_in_subquery() {
    let inner = QueryExpression::new().select(["user_id"]).from("Orders");
    let expr = Expression::comparison(field("id"), ComparisonOperator::In, inner.into());
    assert_eq!(
        where_sql(expr),
        "(id IN (SELECT Orders.user_id FROM Orders))"
    );
}

#[test]
fn test_logical_and_not() {
    assert_eq!(
        where_sql(field("a").equal(1).and(field("b").equal(2)).or(field("c").equal(3))),
        "(((a = 1) AND (b = 2)) OR (c = 3))"
    );
    assert_eq!(where_sql(!field("a").equal(1)), "(NOT (a = 1))");
    assert_eq!(
        where_sql(Expression::Logical {
            operator: crate::expression::LogicalOperator::And,
            operands: vec![],
        }),
        ""
    );
    assert_eq!(
        SqlFormatter::new()
            .format_where_value(&json!({"$not": {"$and": []}}))
            .unwrap(),
        ""
    );
}

#[test]
fn test_function_predicates() {
    assert_eq!(
        where_sql(call("year", vec![field("orderDate")]).equal(10)),
        "(YEAR(orderDate) = 10)"
    );
    assert_eq!(
        where_sql(call("startswith", vec![field("name"), lit("A")])),
        "(name REGEXP '^A')"
    );
}

#[test]
fn test_format_where_value() {
    let formatter = SqlFormatter::new();
    assert_eq!(
        formatter
            .format_where_value(&json!({"Price": {"$add": [5, {"$gt": 100}]}}))
            .unwrap(),
        "((Price + 5) > 100)"
    );
    assert_eq!(
        formatter
            .format_where_value(&json!({"$or": [{"name": "a"}, {"name": "b"}]}))
            .unwrap(),
        "((name = 'a') OR (name = 'b'))"
    );
    assert_eq!(
        formatter
            .format_where_value(&json!({"orderDate": {"$year": 10}}))
            .unwrap(),
        "(YEAR(orderDate) = 10)"
    );
    assert_eq!(
        formatter
            .format_where_value(&json!({"name": {"$regex": "^b"}}))
            .unwrap(),
        "(name REGEXP '^b')"
    );
}

#[test]
fn test_format_where_value_errors() {
    let formatter = SqlFormatter::new();
    assert!(matches!(
        formatter.format_where_value(&json!({"$and": {"a": 1}})),
        Err(QueryError::FormatError(_))
    ));
    assert!(matches!(
        formatter.format_where_value(&json!({"id": {"$in": 5}})),
        Err(QueryError::FormatError(_))
    ));
    assert!(matches!(
        formatter.format_where_value(&json!({"name": {"$soundex": "x"}})),
        Err(QueryError::FormatError(_))
    ));
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_select_qualifies_members() {
    let query = QueryExpression::new().from("UserBase").select(["id", "name"]);
    assert_eq!(format(&query), "SELECT UserBase.id, UserBase.name FROM UserBase");

    let query = QueryExpression::new()
        .from("UserBase")
        .alias("u")
        .select(["id", "Role.name"]);
    assert_eq!(format(&query), "SELECT u.id, Role.name FROM UserBase AS u");
}

#[test]
fn test_select_all_and_distinct() {
    let query = QueryExpression::new().select_all().from("UserBase").distinct(true);
    assert_eq!(format(&query), "SELECT DISTINCT * FROM UserBase");
}

#[test]
fn test_aggregate_alias() {
    let query = QueryExpression::new()
        .from("UserBase")
        .select(vec![QueryField::count("id").alias("total")]);
    assert_eq!(format(&query), "SELECT COUNT(id) AS total FROM UserBase");
}

#[test]
fn test_alias_settings() {
    let settings = FormatterSettings {
        force_alias: true,
        use_alias_keyword: false,
        ..FormatterSettings::default()
    };
    let formatter = SqlFormatter::with_settings(settings);
    let query = QueryExpression::new()
        .from("UserBase")
        .alias("u")
        .select(["id", "Role.name"]);
    assert_eq!(
        formatter.format(&query).unwrap(),
        "SELECT u.id id, Role.name name FROM UserBase u"
    );
}

#[test]
fn test_select_where_group_order_limit() {
    let query = QueryExpression::new()
        .select(vec![
            QueryField::from("category"),
            QueryField::sum("total").alias("revenue"),
        ])
        .from("Orders")
        .where_("status")
        .equal("paid")
        .group_by(["category"])
        .order(vec![OrderBy::descending("revenue")])
        .skip(20)
        .take(10);
    assert_eq!(
        format(&query),
        "SELECT Orders.category, SUM(total) AS revenue FROM Orders WHERE (status = 'paid') \
         GROUP BY category ORDER BY revenue DESC LIMIT 20, 10"
    );
}

#[test]
fn test_skip_without_take_has_no_limit() {
    let query = QueryExpression::new().select_all().from("UserBase").skip(5);
    assert_eq!(format(&query), "SELECT * FROM UserBase");
    let query = query.take(3);
    assert_eq!(format(&query), "SELECT * FROM UserBase LIMIT 5, 3");
}

#[test]
fn test_prepared_predicate_is_merged() {
    let query = QueryExpression::new()
        .select_all()
        .from("Docs")
        .filter(field("tenant").equal(7))
        .prepare()
        .where_("title")
        .contains("rust");
    assert_eq!(
        format(&query),
        "SELECT * FROM Docs WHERE ((title REGEXP 'rust') AND (tenant = 7))"
    );
}

#[test]
fn test_joins() {
    let query = QueryExpression::new()
        .select(["id"])
        .from("UserBase")
        .join("Role")
        .with(("UserBase.role_id", "Role.id"))
        .left_join("UserProfile")
        .alias("p")
        .with(crate::query::JoinOn::fields(["id", "tenant"], ["user_id", "tenant"]));
    assert_eq!(
        format(&query),
        "SELECT UserBase.id FROM UserBase \
         INNER JOIN Role ON UserBase.role_id = Role.id \
         LEFT JOIN UserProfile AS p ON UserBase.id = p.user_id AND UserBase.tenant = p.tenant"
    );
}

#[test]
fn test_join_subquery() {
    let totals = QueryExpression::new()
        .select(vec![QueryField::from("user_id"), QueryField::count("id").alias("n")])
        .from("Orders")
        .group_by(["user_id"])
        .alias("t");
    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .join_query(totals)
        .with(field("t.user_id").equal(field("UserBase.id")));
    assert_eq!(
        format(&query),
        "SELECT * FROM UserBase INNER JOIN (SELECT Orders.user_id, COUNT(id) AS n FROM Orders \
         GROUP BY user_id) AS t ON (t.user_id = UserBase.id)"
    );
}

#[test]
fn test_join_errors() {
    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .join_query(QueryExpression::new().select_all().from("Orders"))
        .with(("UserBase.id", "user_id"));
    assert!(SqlFormatter::new().format(&query).is_err());

    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .join("Role")
        .with(crate::query::JoinOn::fields(["a", "b"], ["c"]));
    assert!(SqlFormatter::new().format(&query).is_err());
    assert_eq!(query.expand[0].kind, JoinKind::Inner);
}

#[test]
fn test_fixed_wraps_select() {
    let query = QueryExpression::new()
        .select(["id"])
        .from("UserBase")
        .fixed(true)
        .take(1);
    assert_eq!(
        format(&query),
        "SELECT * FROM (SELECT UserBase.id FROM UserBase) AS UserBase LIMIT 1"
    );
}

#[test]
fn test_insert_update_delete() {
    let query = QueryExpression::new()
        .insert([("name", json!("O'Brien")), ("age", json!(30))])
        .into_collection("UserBase");
    assert_eq!(
        format(&query),
        "INSERT INTO UserBase(name, age) VALUES ('O''Brien', 30)"
    );

    let query = QueryExpression::new()
        .update("UserBase")
        .set([("name", json!("bob")), ("visits", json!({"$add": [{"$name": "visits"}, 1]}))])
        .where_("id")
        .equal(1);
    assert_eq!(
        format(&query),
        "UPDATE UserBase SET name = 'bob', visits = (visits + 1) WHERE (id = 1)"
    );

    let query = QueryExpression::new().delete("UserBase");
    assert_eq!(format(&query), "DELETE FROM UserBase");
    let query = query.where_("id").in_list([1, 2]);
    assert_eq!(format(&query), "DELETE FROM UserBase WHERE (id IN (1, 2))");
}

#[test]
fn test_statement_errors() {
    let formatter = SqlFormatter::new();
    assert!(formatter.format(&QueryExpression::new().from("UserBase")).is_err());
    assert!(formatter.format(&QueryExpression::new().select_all()).is_err());
    assert!(formatter
        .format(&QueryExpression::new().update("UserBase"))
        .is_err());

    let mut both = QueryExpression::new().select_all().from("UserBase");
    both.delete = true;
    assert!(matches!(formatter.format(&both), Err(QueryError::FormatError(_))));
}

#[test]
fn test_mysql_quoting_end_to_end() {
    let formatter = SqlFormatter::with_settings(FormatterSettings::mysql());
    let query = QueryExpression::new()
        .select(["id"])
        .from("UserBase")
        .where_("name")
        .equal("x");
    assert_eq!(
        formatter.format(&query).unwrap(),
        "SELECT `UserBase`.`id` FROM `UserBase` WHERE (`name` = 'x')"
    );
}

#[test]
fn test_custom_function() {
    let formatter = SqlFormatter::new().register_function("soundex", |f, args| {
        Ok(format!("SOUNDEX({})", f.escape_list(args)?))
    });
    assert_eq!(
        formatter
            .format_where(&call("soundex", vec![field("name")]).equal("B200"))
            .unwrap(),
        "(SOUNDEX(name) = 'B200')"
    );
}
