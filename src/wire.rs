use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::StaydAuthSource;
use crate::engine::Engine;
use crate::model::{rfc3339, ReservationInfo};
use crate::sql::{self, Command};

pub struct StaydHandler {
    engine: Arc<Engine>,
    query_parser: Arc<StaydQueryParser>,
}

impl StaydHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(StaydQueryParser),
        }
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = crate::observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.dispatch(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            crate::observability::QUERIES_TOTAL,
            "command" => label,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            crate::observability::QUERY_DURATION_SECONDS,
            "command" => label
        )
        .record(start.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertUnit {
                id,
                name,
                nightly_rate,
                owner_id,
                smart_lock_id,
            } => {
                engine
                    .create_unit(id, name, nightly_rate, owner_id, smart_lock_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateUnit {
                id,
                name,
                nightly_rate,
                is_available,
                smart_lock_id,
            } => {
                engine
                    .update_unit(id, name, nightly_rate, is_available, smart_lock_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteUnit { id } => {
                engine.delete_unit(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectUnits { only_available } => {
                let units = engine.list_units(only_available).await;
                let schema = Arc::new(units_schema());
                let rows: Vec<PgWireResult<_>> = units
                    .into_iter()
                    .map(|u| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&u.id.to_string())?;
                        encoder.encode_field(&u.name)?;
                        encoder.encode_field(&u.nightly_rate.to_string())?;
                        encoder.encode_field(&flag(u.is_available))?;
                        encoder.encode_field(&u.owner_id.to_string())?;
                        encoder.encode_field(&u.smart_lock_id)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::InsertReservation {
                id,
                unit_id,
                guest_id,
                check_in,
                check_out,
                total_price,
            } => {
                engine
                    .create_reservation(id, unit_id, guest_id, check_in, check_out, total_price)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::CancelReservation { id } => {
                engine.cancel_reservation(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteReservation { id } => {
                engine.delete_reservation(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectReservations { unit_id, id } => {
                let reservations = match (id, unit_id) {
                    (Some(id), _) => match engine.get_reservation(id).await {
                        Ok(r) => vec![r],
                        Err(crate::engine::EngineError::NotFound(_)) => vec![],
                        Err(e) => return Err(engine_err(e)),
                    },
                    (None, Some(unit_id)) => {
                        engine.get_reservations(unit_id).await.map_err(engine_err)?
                    }
                    (None, None) => vec![],
                };
                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| encode_reservation(&schema, &r))
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::InsertPayment {
                id,
                reservation_id,
                amount,
                method,
                transaction_id,
            } => {
                engine
                    .record_payment(id, reservation_id, amount, method, transaction_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SelectPayments { reservation_id } => {
                let payments = engine
                    .get_payments(reservation_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(payments_schema());
                let rows: Vec<PgWireResult<_>> = payments
                    .into_iter()
                    .map(|p| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&p.id.to_string())?;
                        encoder.encode_field(&p.reservation_id.to_string())?;
                        encoder.encode_field(&p.amount.to_string())?;
                        encoder.encode_field(&p.method)?;
                        encoder.encode_field(&p.transaction_id)?;
                        encoder.encode_field(&p.status.as_str())?;
                        encoder.encode_field(&rfc3339(p.recorded_at))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAvailability {
                unit_id,
                check_in,
                check_out,
            } => {
                let quote = engine
                    .quote(unit_id, check_in, check_out)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&quote.unit_id.to_string())?;
                encoder.encode_field(&flag(quote.available))?;
                encoder.encode_field(&quote.nights.to_string())?;
                encoder.encode_field(&quote.total_price.to_string())?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::IssueAccessCode { reservation_id } => {
                let code = engine
                    .issue_access_code(reservation_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(access_codes_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&code.reservation_id.to_string())?;
                encoder.encode_field(&code.code)?;
                encoder.encode_field(&rfc3339(code.valid_until))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectHealth => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                let schema = Arc::new(health_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&"ok")?;
                encoder.encode_field(&rfc3339(now))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
        }
    }
}

fn encode_reservation(
    schema: &Arc<Vec<FieldInfo>>,
    r: &ReservationInfo,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&r.id.to_string())?;
    encoder.encode_field(&r.unit_id.to_string())?;
    encoder.encode_field(&r.guest_id.to_string())?;
    encoder.encode_field(&rfc3339(r.check_in))?;
    encoder.encode_field(&rfc3339(r.check_out))?;
    encoder.encode_field(&r.total_price.to_string())?;
    encoder.encode_field(&r.status.as_str())?;
    encoder.encode_field(&flag(r.paid))?;
    encoder.encode_field(&r.access_code)?;
    encoder.encode_field(&rfc3339(r.created_at))?;
    Ok(encoder.take_row())
}

fn varchar(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

/// Postgres text-format boolean. Every column goes over the wire as
/// VARCHAR text so simple and extended (binary-requesting) clients read
/// identical bytes.
fn flag(b: bool) -> &'static str {
    if b { "t" } else { "f" }
}

fn units_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("name"),
        varchar("nightly_rate"),
        varchar("is_available"),
        varchar("owner_id"),
        varchar("smart_lock_id"),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("unit_id"),
        varchar("guest_id"),
        varchar("check_in"),
        varchar("check_out"),
        varchar("total_price"),
        varchar("status"),
        varchar("paid"),
        varchar("access_code"),
        varchar("created_at"),
    ]
}

fn payments_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("reservation_id"),
        varchar("amount"),
        varchar("method"),
        varchar("transaction_id"),
        varchar("status"),
        varchar("recorded_at"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        varchar("unit_id"),
        varchar("available"),
        varchar("nights"),
        varchar("total_price"),
    ]
}

fn access_codes_schema() -> Vec<FieldInfo> {
    vec![varchar("reservation_id"), varchar("code"), varchar("valid_until")]
}

fn health_schema() -> Vec<FieldInfo> {
    vec![varchar("status"), varchar("now")]
}

/// Result schema for a statement, by the table it touches. SELECTs and the
/// access-code INSERT return rows; other commands return bare tags.
fn statement_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("ACCESS_CODES") {
        access_codes_schema()
    } else if upper.contains("SELECT") && upper.contains("RESERVATIONS") {
        reservations_schema()
    } else if upper.contains("SELECT") && upper.contains("PAYMENTS") {
        payments_schema()
    } else if upper.contains("SELECT") && upper.contains("UNITS") {
        units_schema()
    } else if upper.contains("SELECT") && upper.contains("HEALTH") {
        health_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for StaydHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct StaydQueryParser;

#[async_trait]
impl QueryParser for StaydQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for StaydHandler {
    type Statement = String;
    type QueryParser = StaydQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            statement_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(statement_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct StaydFactory {
    handler: Arc<StaydHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<StaydAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl StaydFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = StaydAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(StaydHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for StaydFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection over the Postgres wire protocol.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = StaydFactory::new(engine, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
