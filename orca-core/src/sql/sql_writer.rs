use crate::Operator;

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}
pub(crate) use write_integer;

fn common_operator_sql(operator: Operator) -> &'static str {
    match operator {
        Operator::Exact | Operator::Eq => "= ?",
        Operator::Ne => "!= ?",
        Operator::Gt => "> ?",
        Operator::Gte => ">= ?",
        Operator::Lt => "< ?",
        Operator::Lte => "<= ?",
        Operator::IExact
        | Operator::Contains
        | Operator::IContains
        | Operator::StartsWith
        | Operator::EndsWith
        | Operator::IStartsWith
        | Operator::IEndsWith => "LIKE ?",
        Operator::Regex => "REGEXP ?",
        Operator::In => "IN (?)",
        Operator::Between => "BETWEEN ? AND ?",
        Operator::IsNull => "IS NULL",
    }
}

/// Dialect hooks used by the SQL compiler. Every method has the behavior shared by most
/// backends, a dialect overrides what differs.
pub trait SqlWriter {
    fn quote(&self) -> char {
        '"'
    }

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        let quote = self.quote();
        out.push(quote);
        let doubled = format!("{quote}{quote}");
        self.write_escaped(out, value, quote, &doubled);
        out.push(quote);
    }

    /// `T0."column"`
    fn write_column(&self, out: &mut String, alias: &str, column: &str) {
        if !alias.is_empty() {
            out.push_str(alias);
            out.push('.');
        }
        self.write_identifier_quoted(out, column);
    }

    /// Value written in LIMIT when only an offset is requested, `None` to omit LIMIT.
    fn max_limit(&self) -> Option<u64> {
        Some(u64::MAX)
    }

    fn supports_update_join(&self) -> bool {
        false
    }

    /// Single row inserts read the new key from a `RETURNING` clause.
    fn has_returning_id(&self) -> bool {
        false
    }

    /// Multi row inserts are sent one row at a time inside a transaction.
    fn bulk_insert_in_transaction(&self) -> bool {
        false
    }

    /// Right hand side of a comparison, `?` stands for the argument.
    fn operator_sql(&self, operator: Operator) -> &'static str {
        common_operator_sql(operator)
    }

    /// Left hand side of a comparison, some dialects wrap the column.
    fn write_operator_left(&self, out: &mut String, _operator: Operator, column: &str) {
        out.push_str(column);
    }

    /// Translate the `?` markers of a statement to the dialect placeholders.
    fn replace_marks(&self, sql: String) -> String {
        sql
    }

    /// Start of a statement updating `table`, up to the first assignment.
    fn write_update_head(&self, out: &mut String, table: &str) {
        out.push_str("UPDATE ");
        self.write_identifier_quoted(out, table);
        out.push_str(" SET ");
    }

    /// Start of a statement deleting from `table`, up to the WHERE keyword excluded.
    fn write_delete_head(&self, out: &mut String, table: &str) {
        out.push_str("DELETE FROM ");
        self.write_identifier_quoted(out, table);
    }

    /// Completes `INSERT INTO "table"` when no column is given a value.
    fn write_insert_defaults(&self, out: &mut String) {
        out.push_str(" DEFAULT VALUES");
    }

    /// Statement realigning the key generator after rows were inserted with explicit keys.
    fn key_sync_sql(&self, _table: &str, _column: &str) -> Option<String> {
        None
    }

    fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN");
    }

    fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT");
    }

    fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK");
    }
}

/// The SQL families the compiler targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
    ClickHouse,
}

impl SqlWriter for Dialect {
    fn quote(&self) -> char {
        match self {
            Dialect::MySql | Dialect::ClickHouse => '`',
            Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    fn max_limit(&self) -> Option<u64> {
        match self {
            Dialect::Sqlite => Some(i64::MAX as u64),
            Dialect::Postgres => None,
            Dialect::MySql | Dialect::ClickHouse => Some(u64::MAX),
        }
    }

    fn supports_update_join(&self) -> bool {
        *self == Dialect::MySql
    }

    fn has_returning_id(&self) -> bool {
        *self == Dialect::Postgres
    }

    fn bulk_insert_in_transaction(&self) -> bool {
        *self == Dialect::ClickHouse
    }

    fn operator_sql(&self, operator: Operator) -> &'static str {
        match (self, operator) {
            (Dialect::Sqlite, op) if op.is_like() => "LIKE ? ESCAPE '\\'",
            (Dialect::MySql, Operator::Contains | Operator::StartsWith | Operator::EndsWith) => {
                "LIKE BINARY ?"
            }
            (Dialect::MySql, Operator::Regex) => "REGEXP BINARY ?",
            (Dialect::Postgres, Operator::IExact) => "= UPPER(?)",
            (Dialect::Postgres, op) if op.is_like() && op.is_case_insensitive() => {
                "LIKE UPPER(?)"
            }
            (Dialect::Postgres, Operator::Regex) => "~ ?",
            (Dialect::ClickHouse, op) if op.is_like() && op.is_case_insensitive() => "ILIKE ?",
            (Dialect::ClickHouse, Operator::IExact) => "ILIKE ?",
            (_, op) => common_operator_sql(op),
        }
    }

    fn write_operator_left(&self, out: &mut String, operator: Operator, column: &str) {
        if *self != Dialect::Postgres || !(operator.is_like() || operator == Operator::Regex) {
            out.push_str(column);
            return;
        }
        if operator.is_case_insensitive() {
            out.push_str("UPPER(");
            out.push_str(column);
            out.push_str("::text)");
        } else {
            out.push_str(column);
            out.push_str("::text");
        }
    }

    fn replace_marks(&self, sql: String) -> String {
        if *self != Dialect::Postgres {
            return sql;
        }
        let mut out = String::with_capacity(sql.len() + 16);
        let mut index = 0usize;
        let mut quoted: Option<char> = None;
        for c in sql.chars() {
            match (quoted, c) {
                (None, '?') => {
                    index += 1;
                    out.push('$');
                    write_integer!(out, index);
                    continue;
                }
                (None, '\'' | '"') => quoted = Some(c),
                (Some(q), c) if q == c => quoted = None,
                _ => {}
            }
            out.push(c);
        }
        out
    }

    fn write_update_head(&self, out: &mut String, table: &str) {
        if *self == Dialect::ClickHouse {
            out.push_str("ALTER TABLE ");
            self.write_identifier_quoted(out, table);
            out.push_str(" UPDATE ");
        } else {
            out.push_str("UPDATE ");
            self.write_identifier_quoted(out, table);
            out.push_str(" SET ");
        }
    }

    fn write_delete_head(&self, out: &mut String, table: &str) {
        if *self == Dialect::ClickHouse {
            out.push_str("ALTER TABLE ");
            self.write_identifier_quoted(out, table);
            out.push_str(" DELETE");
        } else {
            out.push_str("DELETE FROM ");
            self.write_identifier_quoted(out, table);
        }
    }

    fn write_insert_defaults(&self, out: &mut String) {
        match self {
            Dialect::MySql | Dialect::ClickHouse => out.push_str(" () VALUES ()"),
            Dialect::Sqlite | Dialect::Postgres => out.push_str(" DEFAULT VALUES"),
        }
    }

    fn key_sync_sql(&self, table: &str, column: &str) -> Option<String> {
        if *self != Dialect::Postgres {
            return None;
        }
        let mut out = String::from("SELECT setval(pg_get_serial_sequence('");
        self.write_escaped(&mut out, table, '\'', "''");
        out.push_str("', '");
        self.write_escaped(&mut out, column, '\'', "''");
        out.push_str("'), (SELECT MAX(");
        self.write_identifier_quoted(&mut out, column);
        out.push_str(") FROM ");
        self.write_identifier_quoted(&mut out, table);
        out.push_str("))");
        Some(out)
    }

    fn write_transaction_begin(&self, out: &mut String) {
        match self {
            Dialect::MySql => out.push_str("START TRANSACTION"),
            Dialect::ClickHouse => out.push_str("BEGIN TRANSACTION"),
            Dialect::Sqlite | Dialect::Postgres => out.push_str("BEGIN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        let mut out = String::new();
        Dialect::MySql.write_identifier_quoted(&mut out, "we`ird");
        assert_eq!(out, "`we``ird`");
        out.clear();
        Dialect::Postgres.write_column(&mut out, "T1", "name");
        assert_eq!(out, r#"T1."name""#);
    }

    #[test]
    fn postgres_marks_skip_literals() {
        let sql = r#"SELECT "a?" FROM "t" WHERE "b" = ? AND "c" LIKE '%?%' AND "d" IN (?, ?)"#;
        assert_eq!(
            Dialect::Postgres.replace_marks(sql.into()),
            r#"SELECT "a?" FROM "t" WHERE "b" = $1 AND "c" LIKE '%?%' AND "d" IN ($2, $3)"#
        );
        assert_eq!(Dialect::Sqlite.replace_marks(sql.into()), sql);
    }

    #[test]
    fn operators() {
        assert_eq!(
            Dialect::Sqlite.operator_sql(Operator::Contains),
            "LIKE ? ESCAPE '\\'"
        );
        assert_eq!(Dialect::MySql.operator_sql(Operator::Contains), "LIKE BINARY ?");
        assert_eq!(Dialect::MySql.operator_sql(Operator::Ne), "!= ?");
        let mut out = String::new();
        Dialect::Postgres.write_operator_left(&mut out, Operator::IContains, r#"T0."name""#);
        assert_eq!(out, r#"UPPER(T0."name"::text)"#);
        assert_eq!(
            Dialect::Postgres.key_sync_sql("user", "id").unwrap(),
            r#"SELECT setval(pg_get_serial_sequence('user', 'id'), (SELECT MAX("id") FROM "user"))"#
        );
    }
}
