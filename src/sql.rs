use std::str::FromStr;

use rust_decimal::Decimal;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::Ms;

/// Parsed command from SQL input.
///
/// Timestamps cross the wire as RFC 3339 strings with an explicit offset
/// and are converted to unix milliseconds here; prices are decimal text.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUnit {
        id: Ulid,
        name: String,
        nightly_rate: Decimal,
        owner_id: Ulid,
        smart_lock_id: Option<String>,
    },
    UpdateUnit {
        id: Ulid,
        name: Option<String>,
        nightly_rate: Option<Decimal>,
        is_available: Option<bool>,
        smart_lock_id: Option<Option<String>>,
    },
    DeleteUnit {
        id: Ulid,
    },
    SelectUnits {
        only_available: bool,
    },
    InsertReservation {
        id: Ulid,
        unit_id: Ulid,
        guest_id: Ulid,
        check_in: Ms,
        check_out: Ms,
        total_price: Decimal,
    },
    /// `UPDATE reservations SET status = 'cancelled'` — the only legal
    /// reservation update; lifecycle transitions have dedicated commands
    /// instead of arbitrary column writes.
    CancelReservation {
        id: Ulid,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectReservations {
        unit_id: Option<Ulid>,
        id: Option<Ulid>,
    },
    InsertPayment {
        id: Ulid,
        reservation_id: Ulid,
        amount: Decimal,
        method: String,
        transaction_id: String,
    },
    SelectPayments {
        reservation_id: Ulid,
    },
    SelectAvailability {
        unit_id: Ulid,
        check_in: Ms,
        check_out: Ms,
    },
    /// `INSERT INTO access_codes (reservation_id) VALUES (…)` — issues a
    /// fresh code and returns it as a result row.
    IssueAccessCode {
        reservation_id: Ulid,
    },
    SelectHealth,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "units" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("units", 4, values.len()));
            }
            let smart_lock_id = if values.len() >= 5 {
                parse_string_or_null(&values[4])?
            } else {
                None
            };
            Ok(Command::InsertUnit {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                nightly_rate: parse_decimal(&values[2])?,
                owner_id: parse_ulid(&values[3])?,
                smart_lock_id,
            })
        }
        "reservations" => {
            if values.len() < 6 {
                return Err(SqlError::WrongArity("reservations", 6, values.len()));
            }
            Ok(Command::InsertReservation {
                id: parse_ulid(&values[0])?,
                unit_id: parse_ulid(&values[1])?,
                guest_id: parse_ulid(&values[2])?,
                check_in: parse_timestamp(&values[3])?,
                check_out: parse_timestamp(&values[4])?,
                total_price: parse_decimal(&values[5])?,
            })
        }
        "payments" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("payments", 5, values.len()));
            }
            Ok(Command::InsertPayment {
                id: parse_ulid(&values[0])?,
                reservation_id: parse_ulid(&values[1])?,
                amount: parse_decimal(&values[2])?,
                method: parse_string(&values[3])?,
                transaction_id: parse_string(&values[4])?,
            })
        }
        "access_codes" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("access_codes", 1, 0));
            }
            Ok(Command::IssueAccessCode {
                reservation_id: parse_ulid(&values[0])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    match table.as_str() {
        "units" => {
            let mut name = None;
            let mut nightly_rate = None;
            let mut is_available = None;
            let mut smart_lock_id = None;
            for assignment in assignments {
                let col = assignment_column(assignment)
                    .ok_or_else(|| SqlError::Parse("unsupported assignment target".into()))?;
                match col.as_str() {
                    "name" => name = Some(parse_string(&assignment.value)?),
                    "nightly_rate" => nightly_rate = Some(parse_decimal(&assignment.value)?),
                    "is_available" => is_available = Some(parse_bool(&assignment.value)?),
                    "smart_lock_id" => {
                        smart_lock_id = Some(parse_string_or_null(&assignment.value)?);
                    }
                    other => return Err(SqlError::ForbiddenColumn(other.to_string())),
                }
            }
            Ok(Command::UpdateUnit {
                id,
                name,
                nightly_rate,
                is_available,
                smart_lock_id,
            })
        }
        "reservations" => {
            // The single legal write: SET status = 'cancelled'.
            if assignments.len() != 1 {
                return Err(SqlError::ForbiddenColumn("multiple assignments".into()));
            }
            let assignment = &assignments[0];
            let col = assignment_column(assignment)
                .ok_or_else(|| SqlError::Parse("unsupported assignment target".into()))?;
            if col != "status" {
                return Err(SqlError::ForbiddenColumn(col));
            }
            let value = parse_string(&assignment.value)?;
            if value != "cancelled" {
                return Err(SqlError::Unsupported(format!(
                    "reservation status can only be set to 'cancelled', got '{value}'"
                )));
            }
            Ok(Command::CancelReservation { id })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "units" => Ok(Command::DeleteUnit { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "health" => Ok(Command::SelectHealth),
        "units" => {
            let mut only_available = false;
            if let Some(selection) = &select.selection {
                if let Expr::BinaryOp {
                    left,
                    op: ast::BinaryOperator::Eq,
                    right,
                } = selection
                {
                    if expr_column_name(left).as_deref() != Some("is_available") {
                        return Err(SqlError::MissingFilter("is_available"));
                    }
                    only_available = parse_bool(right)?;
                } else {
                    return Err(SqlError::Unsupported("complex units filter".into()));
                }
            }
            Ok(Command::SelectUnits { only_available })
        }
        "reservations" => {
            let (mut unit_id, mut id) = (None, None);
            if let Some(selection) = &select.selection {
                extract_eq_filters(selection, &mut |col, expr| match col {
                    "unit_id" => {
                        unit_id = Some(parse_ulid(expr)?);
                        Ok(())
                    }
                    "id" => {
                        id = Some(parse_ulid(expr)?);
                        Ok(())
                    }
                    _ => Err(SqlError::MissingFilter("unit_id or id")),
                })?;
            }
            if unit_id.is_none() && id.is_none() {
                return Err(SqlError::MissingFilter("unit_id or id"));
            }
            Ok(Command::SelectReservations { unit_id, id })
        }
        "payments" => {
            let mut reservation_id = None;
            if let Some(selection) = &select.selection {
                extract_eq_filters(selection, &mut |col, expr| {
                    if col == "reservation_id" {
                        reservation_id = Some(parse_ulid(expr)?);
                    }
                    Ok(())
                })?;
            }
            Ok(Command::SelectPayments {
                reservation_id: reservation_id.ok_or(SqlError::MissingFilter("reservation_id"))?,
            })
        }
        "availability" => {
            let (mut unit_id, mut check_in, mut check_out) = (None, None, None);
            if let Some(selection) = &select.selection {
                extract_eq_filters(selection, &mut |col, expr| {
                    match col {
                        "unit_id" => unit_id = Some(parse_ulid(expr)?),
                        "check_in" => check_in = Some(parse_timestamp(expr)?),
                        "check_out" => check_out = Some(parse_timestamp(expr)?),
                        _ => {}
                    }
                    Ok(())
                })?;
            }
            Ok(Command::SelectAvailability {
                unit_id: unit_id.ok_or(SqlError::MissingFilter("unit_id"))?,
                check_in: check_in.ok_or(SqlError::MissingFilter("check_in"))?,
                check_out: check_out.ok_or(SqlError::MissingFilter("check_out"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Walk an AND-chain of `column = value` terms, feeding each to `visit`.
fn extract_eq_filters(
    expr: &Expr,
    visit: &mut dyn FnMut(&str, &Expr) -> Result<(), SqlError>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_eq_filters(left, visit)?;
                extract_eq_filters(right, visit)?;
                Ok(())
            }
            ast::BinaryOperator::Eq => {
                if let Some(col) = expr_column_name(left) {
                    visit(&col, right)
                } else {
                    Err(SqlError::Parse("expected column on left of =".into()))
                }
            }
            _ => Err(SqlError::Unsupported("only = and AND filters".into())),
        },
        Expr::Nested(inner) => extract_eq_filters(inner, visit),
        _ => Err(SqlError::Unsupported("complex filter expression".into())),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(assignment: &ast::Assignment) -> Option<String> {
    match &assignment.target {
        ast::AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            if values.rows.len() > 1 {
                return Err(SqlError::Unsupported("multi-row INSERT".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!(
                "expected string or NULL, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => {
                Decimal::from_str(s).map_err(|e| SqlError::Parse(format!("bad decimal: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected decimal, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// Timestamps must be RFC 3339 with an explicit offset, e.g.
/// `'2026-09-01T14:00:00+03:00'`. No bare dates, no implicit zones.
fn parse_timestamp(expr: &Expr) -> Result<Ms, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| {
                    SqlError::Parse(format!(
                        "timestamps must be RFC 3339 with explicit offset: {e}"
                    ))
                }),
            _ => Err(SqlError::Parse(format!(
                "expected RFC 3339 string, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    ForbiddenColumn(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::ForbiddenColumn(col) => {
                write!(f, "column not writable here: {col}")
            }
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_unit() {
        let sql = format!(
            "INSERT INTO units (id, name, nightly_rate, owner_id) VALUES ('{ID}', 'Studio 1A', 1000.00, '{ID}')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertUnit {
                id,
                name,
                nightly_rate,
                smart_lock_id,
                ..
            } => {
                assert_eq!(id.to_string(), ID);
                assert_eq!(name, "Studio 1A");
                assert_eq!(nightly_rate, dec!(1000.00));
                assert_eq!(smart_lock_id, None);
            }
            _ => panic!("expected InsertUnit, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_unit_with_smart_lock() {
        let sql = format!(
            "INSERT INTO units (id, name, nightly_rate, owner_id, smart_lock_id) VALUES ('{ID}', 'Loft 2B', 1500, '{ID}', 'lock-77')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertUnit { smart_lock_id, .. } => {
                assert_eq!(smart_lock_id.as_deref(), Some("lock-77"));
            }
            _ => panic!("expected InsertUnit, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_unit_null_smart_lock() {
        let sql = format!(
            "INSERT INTO units (id, name, nightly_rate, owner_id, smart_lock_id) VALUES ('{ID}', 'Loft 2B', 1500, '{ID}', NULL)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertUnit { smart_lock_id, .. } => assert_eq!(smart_lock_id, None),
            cmd => panic!("expected InsertUnit, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_unit() {
        let sql = format!(
            "UPDATE units SET nightly_rate = 1200.50, is_available = false WHERE id = '{ID}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateUnit {
                id,
                name,
                nightly_rate,
                is_available,
                smart_lock_id,
            } => {
                assert_eq!(id.to_string(), ID);
                assert_eq!(name, None);
                assert_eq!(nightly_rate, Some(dec!(1200.50)));
                assert_eq!(is_available, Some(false));
                assert_eq!(smart_lock_id, None);
            }
            cmd => panic!("expected UpdateUnit, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_unit_unknown_column_rejected() {
        let sql = format!("UPDATE units SET owner_id = '{ID}' WHERE id = '{ID}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::ForbiddenColumn(_))
        ));
    }

    #[test]
    fn parse_delete_unit() {
        let sql = format!("DELETE FROM units WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::DeleteUnit { .. }));
    }

    #[test]
    fn parse_select_units() {
        assert_eq!(
            parse_sql("SELECT * FROM units").unwrap(),
            Command::SelectUnits {
                only_available: false
            }
        );
        assert_eq!(
            parse_sql("SELECT * FROM units WHERE is_available = true").unwrap(),
            Command::SelectUnits {
                only_available: true
            }
        );
    }

    #[test]
    fn parse_insert_reservation() {
        let sql = format!(
            "INSERT INTO reservations (id, unit_id, guest_id, check_in, check_out, total_price) \
             VALUES ('{ID}', '{ID}', '{ID}', '2026-09-01T14:00:00+00:00', '2026-09-03T14:00:00+00:00', 2000.00)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertReservation {
                check_in,
                check_out,
                total_price,
                ..
            } => {
                assert_eq!(check_out - check_in, 2 * 86_400_000);
                assert_eq!(total_price, dec!(2000.00));
            }
            cmd => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_honors_offset() {
        let utc = format!(
            "INSERT INTO reservations (id, unit_id, guest_id, check_in, check_out, total_price) \
             VALUES ('{ID}', '{ID}', '{ID}', '2026-09-01T14:00:00+00:00', '2026-09-02T14:00:00+00:00', 1000)"
        );
        let offset = format!(
            "INSERT INTO reservations (id, unit_id, guest_id, check_in, check_out, total_price) \
             VALUES ('{ID}', '{ID}', '{ID}', '2026-09-01T17:00:00+03:00', '2026-09-02T17:00:00+03:00', 1000)"
        );
        // 17:00+03:00 is the same instant as 14:00Z
        match (parse_sql(&utc).unwrap(), parse_sql(&offset).unwrap()) {
            (
                Command::InsertReservation { check_in: a, .. },
                Command::InsertReservation { check_in: b, .. },
            ) => assert_eq!(a, b),
            other => panic!("expected two InsertReservation, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_rejects_naive_timestamp() {
        let sql = format!(
            "INSERT INTO reservations (id, unit_id, guest_id, check_in, check_out, total_price) \
             VALUES ('{ID}', '{ID}', '{ID}', '2026-09-01 14:00:00', '2026-09-03 14:00:00', 2000)"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_cancel_reservation() {
        let sql = format!("UPDATE reservations SET status = 'cancelled' WHERE id = '{ID}'");
        match parse_sql(&sql).unwrap() {
            Command::CancelReservation { id } => assert_eq!(id.to_string(), ID),
            cmd => panic!("expected CancelReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_reservation_update_other_column_rejected() {
        let sql = format!("UPDATE reservations SET total_price = 1 WHERE id = '{ID}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::ForbiddenColumn(_))
        ));
        let sql = format!("UPDATE reservations SET paid = true WHERE id = '{ID}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::ForbiddenColumn(_))
        ));
    }

    #[test]
    fn parse_reservation_update_to_other_status_rejected() {
        let sql = format!("UPDATE reservations SET status = 'confirmed' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_delete_reservation() {
        let sql = format!("DELETE FROM reservations WHERE id = '{ID}'");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::DeleteReservation { .. }
        ));
    }

    #[test]
    fn parse_select_reservations_by_unit() {
        let sql = format!("SELECT * FROM reservations WHERE unit_id = '{ID}'");
        match parse_sql(&sql).unwrap() {
            Command::SelectReservations { unit_id, id } => {
                assert!(unit_id.is_some());
                assert!(id.is_none());
            }
            cmd => panic!("expected SelectReservations, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_reservations_requires_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM reservations"),
            Err(SqlError::MissingFilter(_))
        ));
    }

    #[test]
    fn parse_insert_payment() {
        let sql = format!(
            "INSERT INTO payments (id, reservation_id, amount, method, transaction_id) \
             VALUES ('{ID}', '{ID}', 2000.00, 'card', 'txn_321')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertPayment { amount, method, transaction_id, .. } => {
                assert_eq!(amount, dec!(2000.00));
                assert_eq!(method, "card");
                assert_eq!(transaction_id, "txn_321");
            }
            cmd => panic!("expected InsertPayment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_payments() {
        let sql = format!("SELECT * FROM payments WHERE reservation_id = '{ID}'");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::SelectPayments { .. }
        ));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            "SELECT * FROM availability WHERE unit_id = '{ID}' \
             AND check_in = '2026-09-01T14:00:00+00:00' AND check_out = '2026-09-03T14:00:00+00:00'"
        );
        match parse_sql(&sql).unwrap() {
            Command::SelectAvailability {
                unit_id,
                check_in,
                check_out,
            } => {
                assert_eq!(unit_id.to_string(), ID);
                assert!(check_in < check_out);
            }
            cmd => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_missing_filter_errors() {
        let sql = format!("SELECT * FROM availability WHERE unit_id = '{ID}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter(_))
        ));
    }

    #[test]
    fn parse_issue_access_code() {
        let sql = format!("INSERT INTO access_codes (reservation_id) VALUES ('{ID}')");
        match parse_sql(&sql).unwrap() {
            Command::IssueAccessCode { reservation_id } => {
                assert_eq!(reservation_id.to_string(), ID);
            }
            cmd => panic!("expected IssueAccessCode, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_health() {
        assert_eq!(parse_sql("SELECT * FROM health").unwrap(), Command::SelectHealth);
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{ID}')");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
