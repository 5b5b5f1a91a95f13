//! Parameterized statement assembly over declared column sets.
//!
//! Each entity declares its select, insert and update columns as constants.
//! The helpers here only ever emit those columns and bind every value as a
//! parameter, so a write can never pick up a column from the read set.

use crate::errors::StatementError;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

pub type Statement = QueryBuilder<'static, Sqlite>;

/// A bindable column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    OptText(Option<String>),
    Time(DateTime<Utc>),
    OptTime(Option<DateTime<Utc>>),
}

impl Value {
    fn bind(self, statement: &mut Statement) {
        match self {
            Value::Int(value) => statement.push_bind(value),
            Value::Text(value) => statement.push_bind(value),
            Value::OptText(value) => statement.push_bind(value),
            Value::Time(value) => statement.push_bind(value),
            Value::OptTime(value) => statement.push_bind(value),
        };
    }
}

fn check(table: &'static str, columns: &[&str], values: usize) -> Result<(), StatementError> {
    if columns.is_empty() {
        return Err(StatementError::EmptyColumns { table });
    }
    if columns.len() != values {
        return Err(StatementError::ColumnMismatch {
            table,
            columns: columns.len(),
            values,
        });
    }
    Ok(())
}

/// `SELECT <columns> FROM <table>`
pub fn select(table: &'static str, columns: &[&str]) -> Result<Statement, StatementError> {
    if columns.is_empty() {
        return Err(StatementError::EmptyColumns { table });
    }
    Ok(QueryBuilder::new(format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        table
    )))
}

/// `SELECT COUNT(*) FROM <table>`
pub fn count(table: &'static str) -> Statement {
    QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"))
}

/// `INSERT INTO <table> (<columns>) VALUES (<values>)`
pub fn insert(
    table: &'static str,
    columns: &[&str],
    values: Vec<Value>,
) -> Result<Statement, StatementError> {
    check(table, columns, values.len())?;

    let mut statement = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        table,
        columns.join(", ")
    ));
    for (index, value) in values.into_iter().enumerate() {
        if index > 0 {
            statement.push(", ");
        }
        value.bind(&mut statement);
    }
    statement.push(")");
    Ok(statement)
}

/// `UPDATE <table> SET <column> = <value>, ...`
pub fn update(
    table: &'static str,
    columns: &[&str],
    values: Vec<Value>,
) -> Result<Statement, StatementError> {
    check(table, columns, values.len())?;

    let mut statement = QueryBuilder::new(format!("UPDATE {table} SET "));
    for (index, (column, value)) in columns.iter().zip(values).enumerate() {
        if index > 0 {
            statement.push(", ");
        }
        statement.push(*column).push(" = ");
        value.bind(&mut statement);
    }
    Ok(statement)
}

/// `DELETE FROM <table>`
pub fn delete(table: &'static str) -> Statement {
    QueryBuilder::new(format!("DELETE FROM {table}"))
}

/// Appends `WHERE <column> = <value>`.
pub fn where_eq(statement: &mut Statement, column: &str, value: Value) {
    statement.push(" WHERE ").push(column).push(" = ");
    value.bind(statement);
}

/// Appends `WHERE <a> = <x> OR <b> = <y> ...`.
pub fn where_any_eq(statement: &mut Statement, conditions: Vec<(&str, Value)>) {
    if conditions.is_empty() {
        return;
    }
    for (index, (column, value)) in conditions.into_iter().enumerate() {
        statement.push(if index == 0 { " WHERE (" } else { " OR " });
        statement.push(column).push(" = ");
        value.bind(statement);
    }
    statement.push(")");
}

/// Appends `RETURNING <columns>`.
pub fn returning(statement: &mut Statement, columns: &[&str]) {
    statement.push(" RETURNING ").push(columns.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_lists_only_declared_columns() {
        let mut statement = select("roles", &["roles_id_pk", "roles_name"]).unwrap();
        where_eq(&mut statement, "roles_name", Value::Text("user".into()));
        assert_eq!(
            statement.sql(),
            "SELECT roles_id_pk, roles_name FROM roles WHERE roles_name = ?"
        );
    }

    #[test]
    fn insert_binds_every_value() {
        let mut statement = insert(
            "roles",
            &["roles_code", "roles_name"],
            vec![Value::Int(3), Value::Text("auditor".into())],
        )
        .unwrap();
        returning(&mut statement, &["roles_id_pk"]);
        assert_eq!(
            statement.sql(),
            "INSERT INTO roles (roles_code, roles_name) VALUES (?, ?) RETURNING roles_id_pk"
        );
    }

    #[test]
    fn update_pairs_columns_with_placeholders() {
        let mut statement = update(
            "users",
            &["users_access_token_jti", "users_updated_at"],
            vec![Value::OptText(None), Value::Time(Utc::now())],
        )
        .unwrap();
        where_eq(&mut statement, "users_id_pk", Value::Int(1));
        assert_eq!(
            statement.sql(),
            "UPDATE users SET users_access_token_jti = ?, users_updated_at = ? WHERE users_id_pk = ?"
        );
    }

    #[test]
    fn any_eq_groups_alternatives() {
        let mut statement = count("users");
        where_any_eq(
            &mut statement,
            vec![
                ("users_username", Value::Text("alice".into())),
                ("users_email", Value::Text("alice@x.com".into())),
            ],
        );
        assert_eq!(
            statement.sql(),
            "SELECT COUNT(*) FROM users WHERE (users_username = ? OR users_email = ?)"
        );
    }

    #[test]
    fn mismatched_value_count_is_rejected() {
        let Err(error) = insert("users", &["users_username"], vec![]) else {
            panic!("insert with missing values must not build");
        };
        assert_eq!(
            error,
            StatementError::ColumnMismatch {
                table: "users",
                columns: 1,
                values: 0
            }
        );
        let Err(error) = select("users", &[]) else {
            panic!("select without columns must not build");
        };
        assert_eq!(error, StatementError::EmptyColumns { table: "users" });
    }
}
