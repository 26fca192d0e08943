//! # Executor de Banco de Dados (variante `database` do step)
//!
//! Executa uma consulta/comando SQL via `sqlx` com o driver `Any` (SQLite,
//! Postgres ou MySQL conforme `database.dialect`/`database.dsn`) e expõe o
//! resultado no mesmo formato de envelope que os demais steps:
//! `{rows, rowcount, body: rows}` — `body` espelha `rows` para que
//! validações/extrações escritas para JSON genérico funcionem sem saber que
//! a origem foi um banco.
//!
//! ## Para todos entenderem:
//!
//! `sqlx::Any` deixa o mesmo código rodar contra bancos diferentes: o caso
//! de teste escolhe o dialeto pela DSN (`sqlite::memory:`, `postgres://...`,
//! `mysql://...`). Uma conexão nova é aberta por step (casos de teste não
//! são um servidor de longa duração que justifique um pool compartilhado).
//!
//! Grounding: o padrão de abrir conexão/pool com `sqlx` e tratar erros com
//! `StructuredError` vem de `examples/mondalsuman-boternity/crates/boternity-infra/src/sqlite/pool.rs`
//! (mesma biblioteca, mesma disciplina de erro tipado). Não há equivalente
//! em `original_source/`: passos de banco de dados são uma funcionalidade
//! que o caso de teste YAML pede e que o código-fonte original não cobre
//! (ver DESIGN.md).

use std::time::Duration;

use serde_json::{Map, Value};
use sqlx::any::{AnyConnectOptions, AnyRow};
use sqlx::{Column, Connection, Row, TypeInfo};

use crate::errors::{ErrorCode, StructuredError};
use crate::model::{DatabaseOperation, PerformanceMetrics, Step};
use crate::variables::VariableManager;

use super::PerformOutcome;

pub async fn perform(
    step: &Step,
    vm: &VariableManager,
    timeout: Duration,
) -> Result<PerformOutcome, StructuredError> {
    let (database, operation, sql_tpl, params) = match step {
        Step::Database {
            database,
            operation,
            sql,
            params,
            ..
        } => (database, operation, sql, params),
        _ => unreachable!("dispatch_perform só chama database::perform para Step::Database"),
    };

    let sql = vm
        .render(sql_tpl)
        .map_err(|e| StructuredError::new(ErrorCode::INVALID_RESPONSE_JSON, e.to_string()).with_step_name(step.name()))?;

    let rendered_params: Vec<Value> = params
        .iter()
        .map(|p| vm.render_value(p))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StructuredError::new(ErrorCode::INVALID_RESPONSE_JSON, e.to_string()).with_step_name(step.name()))?;

    let connect_fut = async {
        let opts: AnyConnectOptions = database
            .dsn
            .parse()
            .map_err(|e: sqlx::Error| connection_error(step, &e))?;
        sqlx::AnyConnection::connect_with(&opts)
            .await
            .map_err(|e| connection_error(step, &e))
    };

    let mut conn = tokio::time::timeout(timeout, connect_fut)
        .await
        .map_err(|_| timeout_error(step))??;

    let start = std::time::Instant::now();

    let (rows, rowcount) = match operation {
        DatabaseOperation::Query => {
            let rows = run_query(&mut conn, &sql, &rendered_params, timeout, step).await?;
            let count = rows.len();
            (rows, count)
        }
        DatabaseOperation::Exec => {
            let affected = run_exec(&mut conn, &sql, &rendered_params, timeout, step).await?;
            (Vec::new(), affected as usize)
        }
        DatabaseOperation::Executemany => {
            let mut total = 0usize;
            for row_params in rendered_params.chunks(1) {
                total += run_exec(&mut conn, &sql, row_params, timeout, step).await? as usize;
            }
            (Vec::new(), total)
        }
        DatabaseOperation::Script => {
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                run_exec(&mut conn, statement, &[], timeout, step).await?;
            }
            (Vec::new(), 0)
        }
    };

    let total_time = start.elapsed().as_secs_f64() * 1000.0;

    let body = Value::Array(rows.clone());
    let envelope = serde_json::json!({
        "rows": rows,
        "rowcount": rowcount,
        "body": body,
    });

    let performance = PerformanceMetrics {
        total_time,
        ..Default::default()
    };

    Ok(PerformOutcome::new(envelope, performance))
}

async fn run_query(
    conn: &mut sqlx::AnyConnection,
    sql: &str,
    params: &[Value],
    timeout: Duration,
    step: &Step,
) -> Result<Vec<Value>, StructuredError> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = bind_value(query, p);
    }

    let rows = tokio::time::timeout(timeout, query.fetch_all(conn))
        .await
        .map_err(|_| timeout_error(step))?
        .map_err(|e| system_error(step, &e))?;

    Ok(rows.iter().map(row_to_json).collect())
}

async fn run_exec(
    conn: &mut sqlx::AnyConnection,
    sql: &str,
    params: &[Value],
    timeout: Duration,
    step: &Step,
) -> Result<u64, StructuredError> {
    let mut query = sqlx::query(sql);
    for p in params {
        query = bind_value(query, p);
    }

    let result = tokio::time::timeout(timeout, query.execute(conn))
        .await
        .map_err(|_| timeout_error(step))?
        .map_err(|e| system_error(step, &e))?;

    Ok(result.rows_affected())
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Converte uma linha em um objeto JSON, inferindo o tipo de cada coluna
/// pelo nome do tipo reportado pelo driver (best-effort: o driver `Any`
/// não expõe um acesso genérico "como JSON").
fn row_to_json(row: &AnyRow) -> Value {
    let mut map = Map::new();
    for column in row.columns() {
        let name = column.name().to_string();
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = if type_name.contains("INT") {
            row.try_get::<i64, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null)
        } else if type_name.contains("FLOAT") || type_name.contains("DOUBLE") || type_name.contains("REAL") || type_name.contains("NUMERIC") {
            row.try_get::<f64, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null)
        } else if type_name.contains("BOOL") {
            row.try_get::<bool, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null)
        } else {
            row.try_get::<String, _>(column.ordinal())
                .map(Value::from)
                .unwrap_or(Value::Null)
        };
        map.insert(name, value);
    }
    Value::Object(map)
}

fn connection_error(step: &Step, e: &sqlx::Error) -> StructuredError {
    StructuredError::new(ErrorCode::DATABASE_CONNECTION, e.to_string()).with_step_name(step.name())
}

fn system_error(step: &Step, e: &sqlx::Error) -> StructuredError {
    StructuredError::new(ErrorCode::INTERNAL_ERROR, e.to_string()).with_step_name(step.name())
}

fn timeout_error(step: &Step) -> StructuredError {
    StructuredError::new(ErrorCode::STEP_TIMEOUT, "operação de banco excedeu o timeout".to_string())
        .with_step_name(step.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatabaseConfig, StepCommon};

    fn query_step(dsn: &str, sql: &str) -> Step {
        Step::Database {
            name: "q".to_string(),
            common: StepCommon::default(),
            database: DatabaseConfig {
                dialect: "sqlite".to_string(),
                dsn: dsn.to_string(),
            },
            operation: DatabaseOperation::Query,
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }

    #[tokio::test]
    async fn query_against_in_memory_sqlite_returns_rows() {
        sqlx::any::install_default_drivers();
        let step = query_step("sqlite::memory:", "SELECT 1 AS one, 'a' AS letter");
        let vm = VariableManager::new();
        let outcome = perform(&step, &vm, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.response["rowcount"], 1);
        assert_eq!(outcome.response["rows"][0]["one"], 1);
        assert_eq!(outcome.response["rows"][0]["letter"], "a");
    }

    #[tokio::test]
    async fn invalid_dsn_yields_connection_error() {
        sqlx::any::install_default_drivers();
        let step = query_step("not-a-valid-dsn", "SELECT 1");
        let vm = VariableManager::new();
        let result = perform(&step, &vm, Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
