use chrono::{DateTime, Utc};
use sqlx::{Executor, MySql};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// ===============================
/// SQL update container
/// ===============================
///
/// Column names are `&'static str` so they can only come from code, never
/// from a request payload.
#[derive(Debug)]
pub struct SqlUpdate {
    table: &'static str,
    columns: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl SqlUpdate {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.columns.push(column);
        self.values.push(value.into());
        self
    }

    /// Sets the column only when `value` is `Some`.
    pub fn set_opt<T: Into<SqlValue>>(self, column: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// `UPDATE table SET a = ?, b = ? WHERE id = ?`
    pub fn sql(&self, id_column: &str) -> String {
        let set_clause = self
            .columns
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");

        format!("UPDATE {} SET {} WHERE {} = ?", self.table, set_clause, id_column)
    }

    /// ===============================
    /// Execute the update
    /// ===============================
    pub async fn execute<'c, E>(self, executor: E, id_column: &str, id: u64) -> Result<u64, sqlx::Error>
    where
        E: Executor<'c, Database = MySql>,
    {
        let sql = self.sql(id_column);
        let mut query = sqlx::query(&sql);

        for value in self.values {
            query = match value {
                SqlValue::String(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::DateTime(v) => query.bind(v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }

        let result = query.bind(id).execute(executor).await?;
        Ok(result.rows_affected())
    }
}
