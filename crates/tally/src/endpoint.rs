//! Query endpoints.
//!
//! An [`Endpoint`] is one side of the audit: something that can execute a
//! query and hand back a typed [`Dataset`]. The engine only ever talks to
//! this trait, so tests can swap in an in-memory endpoint; production code
//! uses [`PgEndpoint`], which wraps a `deadpool_postgres::Pool` and logs all
//! queries via tracing.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tracing::Instrument;

use crate::value::{Dataset, Value};

/// One query-capable side of the audit.
///
/// Implementations must support concurrent invocation; the fan-out scheduler
/// will have up to the configured number of calls in flight at once. Any
/// remote or transport error is mapped to its display string - never an
/// opaque failure - so it can be recorded in the output data verbatim.
///
/// The engine imposes no timeout of its own; whatever the underlying
/// connection enforces applies.
pub trait Endpoint: Send + Sync {
    /// Execute one query with text parameters, returning all rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<Dataset, String>> + Send + 'a>>;
}

/// An [`Endpoint`] backed by a Postgres connection pool.
///
/// Each call checks a connection out of the pool for the duration of the
/// query; the pooled object is returned on drop on every exit path, so a
/// failing query never leaks its connection.
pub struct PgEndpoint {
    pool: deadpool_postgres::Pool,
}

impl PgEndpoint {
    /// Wrap a pool. Size the pool to the fan-out bound so that up to that
    /// many audit tasks can hold a connection simultaneously.
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }
}

impl Endpoint for PgEndpoint {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<Dataset, String>> + Send + 'a>> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        Box::pin(
            async move {
                let conn = self.pool.get().await.map_err(|e| e.to_string())?;
                use std::ops::Deref;
                let client: &tokio_postgres::Client = conn.deref();

                let pg_params: Vec<&(dyn ToSql + Sync)> = params
                    .iter()
                    .map(|p| p as &(dyn ToSql + Sync))
                    .collect();
                let rows = client
                    .query(sql, &pg_params)
                    .await
                    .map_err(|e| e.to_string())?;

                tracing::Span::current().record("rows", rows.len());
                Ok(rows_to_dataset(&rows))
            }
            .instrument(span),
        )
    }
}

/// Convert a batch of Postgres rows into a [`Dataset`].
///
/// Column names and types come from the row metadata, so this works for
/// arbitrary (user-configured) discovery queries. An empty batch yields an
/// empty dataset with no columns.
pub(crate) fn rows_to_dataset(rows: &[Row]) -> Dataset {
    let Some(first) = rows.first() else {
        return Dataset::default();
    };

    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let data = rows
        .iter()
        .map(|row| {
            (0..row.columns().len())
                .map(|idx| decode_value(row, idx))
                .collect()
        })
        .collect();

    Dataset {
        columns,
        rows: data,
    }
}

/// Decode one cell by its declared Postgres type.
///
/// Types without a mapping (and cells that fail to decode) become
/// [`Value::Null`] rather than failing the whole dataset - a discrepancy
/// report with a blank cell beats no report.
fn decode_value(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();

    if *ty == Type::BOOL {
        cell::<bool>(row, idx).map(Value::Bool)
    } else if *ty == Type::INT2 {
        cell::<i16>(row, idx).map(Value::I16)
    } else if *ty == Type::INT4 {
        cell::<i32>(row, idx).map(Value::I32)
    } else if *ty == Type::INT8 {
        cell::<i64>(row, idx).map(Value::I64)
    } else if *ty == Type::OID {
        cell::<u32>(row, idx).map(|v| Value::I64(i64::from(v)))
    } else if *ty == Type::FLOAT4 {
        cell::<f32>(row, idx).map(Value::F32)
    } else if *ty == Type::FLOAT8 {
        cell::<f64>(row, idx).map(Value::F64)
    } else if *ty == Type::NUMERIC {
        cell::<rust_decimal::Decimal>(row, idx).map(Value::Decimal)
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        cell::<String>(row, idx).map(Value::String)
    } else if *ty == Type::BYTEA {
        cell::<Vec<u8>>(row, idx).map(Value::Bytes)
    } else if *ty == Type::TIMESTAMPTZ {
        cell::<chrono::DateTime<chrono::Utc>>(row, idx).map(|v| Value::String(v.to_rfc3339()))
    } else if *ty == Type::TIMESTAMP {
        cell::<chrono::NaiveDateTime>(row, idx).map(|v| Value::String(v.to_string()))
    } else if *ty == Type::DATE {
        cell::<chrono::NaiveDate>(row, idx).map(|v| Value::String(v.to_string()))
    } else if *ty == Type::TIME {
        cell::<chrono::NaiveTime>(row, idx).map(|v| Value::String(v.to_string()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        cell::<serde_json::Value>(row, idx).map(|v| Value::Json(v.to_string()))
    } else {
        tracing::trace!(column = %row.columns()[idx].name(), pg_type = %ty, "unmapped column type");
        None
    }
    .unwrap_or(Value::Null)
}

/// Read one nullable cell; decode failures collapse to `None`.
fn cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}
