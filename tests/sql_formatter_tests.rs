//! SQL Formatter Integration Tests
//!
//! End-to-end rendering of query expressions built with the fluent API,
//! covering:
//! - Select projections, aliases and aggregates
//! - Predicates, function templates and escaping
//! - Joins, grouping, ordering and paging
//! - Insert, update and delete statements
//! - Dialect settings

use query_expr::{
    call, field, FormatterSettings, QueryError, QueryExpression, QueryField, SqlFormatter,
};
use serde_json::json;

fn sql(query: &QueryExpression) -> String {
    SqlFormatter::new()
        .format(query)
        .unwrap_or_else(|e| panic!("Failed to format {:?}: {}", query, e))
}

// ============================================================================
// Select
// ============================================================================

#[test]
fn test_select_fields() {
    let query = QueryExpression::new().from("UserBase").select(["id", "name"]);
    assert_eq!(sql(&query), "SELECT UserBase.id, UserBase.name FROM UserBase");
}

#[test]
fn test_select_count_alias() {
    let query = QueryExpression::new()
        .from("UserBase")
        .select(vec![QueryField::count("id").alias("total")]);
    assert_eq!(sql(&query), "SELECT COUNT(id) AS total FROM UserBase");
}

#[test]
fn test_select_all_with_where() {
    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .where_("name")
        .equal("a")
        .or("name")
        .equal("b");
    assert_eq!(
        sql(&query),
        "SELECT * FROM UserBase WHERE ((name = 'a') OR (name = 'b'))"
    );
}

#[test]
fn test_where_modifiers_render_functions() {
    let query = QueryExpression::new()
        .select_all()
        .from("Orders")
        .where_("orderDate")
        .get_year()
        .equal(2020)
        .and("Price")
        .add(5)
        .greater_than(100)
        .and("name")
        .trim()
        .to_lower_case()
        .starts_with("ab");
    assert_eq!(
        sql(&query),
        "SELECT * FROM Orders WHERE ((YEAR(orderDate) = 2020) AND ((Price + 5) > 100) \
         AND (LOWER(TRIM(name)) REGEXP '^ab'))"
    );
}

#[test]
fn test_between_and_lists() {
    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .where_("age")
        .between(18, 65)
        .and("role")
        .not_in_list(["guest"]);
    assert_eq!(
        sql(&query),
        "SELECT * FROM UserBase WHERE ((age >= 18) AND (age <= 65) AND (NOT role IN ('guest')))"
    );
}

#[test]
fn test_empty_set_policy() {
    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .where_("id")
        .in_list(Vec::<i64>::new());
    assert_eq!(sql(&query), "SELECT * FROM UserBase WHERE (id IN (NULL))");

    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .where_("id")
        .not_in_list(Vec::<i64>::new());
    assert_eq!(sql(&query), "SELECT * FROM UserBase WHERE (NOT id IN (NULL))");
}

#[test]
fn test_in_sub_query() {
    let buyers = QueryExpression::new()
        .select(["user_id"])
        .from("Orders")
        .where_("total")
        .greater_than(100);
    let query = QueryExpression::new()
        .select(["id"])
        .from("UserBase")
        .where_("id")
        .in_query(buyers);
    assert_eq!(
        sql(&query),
        "SELECT UserBase.id FROM UserBase WHERE (id IN (SELECT Orders.user_id FROM Orders WHERE (total > 100)))"
    );
}

#[test]
fn test_group_order_limit() {
    let query = QueryExpression::new()
        .select(vec![
            QueryField::from("category"),
            QueryField::avg("price").alias("average"),
        ])
        .from("Product")
        .alias("p")
        .group_by(["category"])
        .order_by("category")
        .then_by_descending("average")
        .take(10);
    assert_eq!(
        sql(&query),
        "SELECT p.category, AVG(price) AS average FROM Product AS p GROUP BY category \
         ORDER BY category ASC, average DESC LIMIT 10"
    );
}

#[test]
fn test_joins() {
    let query = QueryExpression::new()
        .select(["id", "Role.name"])
        .from("UserBase")
        .join("Role")
        .with(("UserBase.role_id", "Role.id"))
        .right_join("Team")
        .alias("t")
        .with(field("t.id").equal(field("UserBase.team_id")));
    assert_eq!(
        sql(&query),
        "SELECT UserBase.id, Role.name FROM UserBase INNER JOIN Role ON UserBase.role_id = Role.id \
         RIGHT JOIN Team AS t ON (t.id = UserBase.team_id)"
    );
}

// ============================================================================
// Escaping
// ============================================================================

#[test]
fn test_string_escaping() {
    let formatter = SqlFormatter::new();
    assert_eq!(formatter.escape_value(&json!("O'Brien")).unwrap(), "'O''Brien'");
    assert_eq!(formatter.escape_value(&json!("a\nb")).unwrap(), "'a\\nb'");
    assert_eq!(formatter.escape_value(&json!(null)).unwrap(), "NULL");
}

#[test]
fn test_comparison_object_rendering() {
    let formatter = SqlFormatter::new();
    assert_eq!(
        formatter
            .format_where_value(&json!({"Price": {"$add": [5, {"$gt": 100}]}}))
            .unwrap(),
        "((Price + 5) > 100)"
    );
    assert_eq!(
        formatter
            .format_where_value(&json!({"$not": {"name": {"$in": []}}}))
            .unwrap(),
        "(NOT (name IN (NULL)))"
    );
}

// ============================================================================
// Insert, update, delete
// ============================================================================

#[test]
fn test_insert() {
    let query = QueryExpression::new()
        .insert([("name", json!("bob")), ("active", json!(true))])
        .into_collection("UserBase");
    assert_eq!(
        sql(&query),
        "INSERT INTO UserBase(name, active) VALUES ('bob', true)"
    );
}

#[test]
fn test_update_with_prepared_predicate() {
    let query = QueryExpression::new()
        .update("UserBase")
        .set([("active", json!(false))])
        .filter(field("tenant").equal(3))
        .prepare()
        .where_("id")
        .equal(9);
    assert_eq!(
        sql(&query),
        "UPDATE UserBase SET active = false WHERE ((id = 9) AND (tenant = 3))"
    );
}

#[test]
fn test_delete() {
    let query = QueryExpression::new()
        .delete("Session")
        .where_("expires")
        .lower_than(call("now", vec![]));
    let formatter = SqlFormatter::new().register_function("now", |_, _| Ok("NOW()".to_string()));
    assert_eq!(
        formatter.format(&query).unwrap(),
        "DELETE FROM Session WHERE (expires < NOW())"
    );
}

// ============================================================================
// Settings and errors
// ============================================================================

#[test]
fn test_postgres_quoting() {
    let formatter = SqlFormatter::with_settings(FormatterSettings::postgres());
    let query = QueryExpression::new()
        .select(vec![QueryField::count("id").alias("total")])
        .from("UserBase");
    assert_eq!(
        formatter.format(&query).unwrap(),
        "SELECT COUNT(\"id\") AS \"total\" FROM \"UserBase\""
    );
}

#[test]
fn test_unknown_function_is_format_error() {
    let query = QueryExpression::new()
        .select_all()
        .from("UserBase")
        .filter(call("soundex", vec![field("name")]).equal("B200"));
    let err = SqlFormatter::new().format(&query).unwrap_err();
    assert!(matches!(err, QueryError::FormatError(_)));
    assert!(err.to_string().contains("soundex"));
}

#[test]
fn test_clone_formats_identically() {
    let query = QueryExpression::new()
        .select(["id", "name"])
        .from("UserBase")
        .where_("name")
        .not_equal("user1@example.com")
        .order_by("name")
        .skip(5)
        .take(5);
    let copy = query.clone();
    assert_eq!(sql(&copy), sql(&query));

    let changed = copy.where_("id").equal(1);
    assert_ne!(sql(&changed), sql(&query));
    assert_eq!(
        sql(&query),
        "SELECT UserBase.id, UserBase.name FROM UserBase WHERE (NOT name = 'user1@example.com') \
         ORDER BY name ASC LIMIT 5, 5"
    );
}
