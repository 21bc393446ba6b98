//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (serialization failure / deadlock) | `40001`, `40P01` | `Conflict` |
//! | Database (other) | any other | `Database` |
//! | PoolClosed / PoolTimedOut | n/a | `Unavailable` |
//! | RowNotFound | n/a | `NotFound` |
//!
//! Multi-row writes (ticket + void audit, invoice + lines + ticket links,
//! usage check + deactivation) each run in a single transaction.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use weighbridge_core::{
    Actor, CustomerId, InvoiceId, LookupId, ProductId, TicketId, VehicleId,
};
use weighbridge_invoicing::{
    GenerationWindow, Invoice, InvoiceLine, InvoicePlan, InvoiceQuery, InvoiceStatus,
    InvoiceSummary, InvoiceVoid, format_invoice_no,
};
use weighbridge_reference::{
    Customer, Deactivation, Lookup, LookupKind, Product, Vehicle, plan_deactivation,
};
use weighbridge_tickets::{Page, PageWindow, Ticket, TicketQuery, TicketVoid};

use super::{
    InvoiceStore, ReferenceStore, SequenceGenerator, SequenceKind, StoreError, StoreResult,
    TicketStore, TicketSummary,
};
use crate::config::Settings;

const SCHEMA: &str = include_str!("../../schema.sql");

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Columns written by insert/update, in bind order (`$2..`); `id` is `$1`.
const TICKET_FIELDS: [&str; 31] = [
    "ticket_no",
    "datetime",
    "status",
    "direction",
    "transaction_type",
    "customer_id",
    "vehicle_id",
    "product_id",
    "haulier_id",
    "driver_id",
    "container_id",
    "destination_id",
    "yard_id",
    "area_id",
    "waste_code_id",
    "waste_producer_id",
    "licence_id",
    "invoice_id",
    "gross_kg",
    "tare_kg",
    "net_kg",
    "qty",
    "unit_id",
    "unit_price",
    "total",
    "dont_invoice",
    "paid",
    "payment_method_id",
    "version",
    "created_at",
    "updated_at",
];

const INVOICE_COLUMNS: &str = "i.id, i.invoice_no, i.customer_id, i.invoice_date, i.status, \
     i.net_total, i.vat_total, i.gross_total, i.payment_method_id, i.paid_at, i.paid_by, \
     i.version, i.created_at, i.updated_at";

const TICKET_LIST_JOINS: &str = "FROM tickets t \
     LEFT JOIN vehicles v ON v.id = t.vehicle_id \
     LEFT JOIN customers c ON c.id = t.customer_id";

const TICKET_LIST_FILTER: &str = "WHERE ($1::timestamptz IS NULL OR t.datetime >= $1) \
     AND ($2::timestamptz IS NULL OR t.datetime < $2) \
     AND ($3::text IS NULL OR t.status = $3) \
     AND ($4::text IS NULL OR t.direction = $4) \
     AND ($5::text IS NULL OR t.transaction_type = $5) \
     AND ($6::text IS NULL OR t.ticket_no ILIKE $6) \
     AND ($7::text IS NULL OR t.ticket_no ILIKE $7 OR v.registration ILIKE $7 OR c.name ILIKE $7)";

fn ticket_columns() -> String {
    std::iter::once("t.id".to_string())
        .chain(TICKET_FIELDS.iter().map(|f| format!("t.{f}")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ticket_placeholders() -> String {
    (2..=TICKET_FIELDS.len() + 1)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `%text%` for ILIKE with the wildcards in `text` escaped.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn uuid_of<T: Into<Uuid>>(id: Option<T>) -> Option<Uuid> {
    id.map(Into::into)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}

fn bind_ticket_fields<'q>(q: PgQuery<'q>, t: &'q Ticket) -> PgQuery<'q> {
    q.bind(t.ticket_no.as_str())
        .bind(t.datetime)
        .bind(t.status.as_str())
        .bind(t.direction.as_str())
        .bind(t.transaction_type.as_str())
        .bind(uuid_of(t.customer_id))
        .bind(uuid_of(t.vehicle_id))
        .bind(uuid_of(t.product_id))
        .bind(uuid_of(t.haulier_id))
        .bind(uuid_of(t.driver_id))
        .bind(uuid_of(t.container_id))
        .bind(uuid_of(t.destination_id))
        .bind(uuid_of(t.yard_id))
        .bind(uuid_of(t.area_id))
        .bind(uuid_of(t.waste_code_id))
        .bind(uuid_of(t.waste_producer_id))
        .bind(uuid_of(t.licence_id))
        .bind(uuid_of(t.invoice_id))
        .bind(t.gross_kg)
        .bind(t.tare_kg)
        .bind(t.net_kg)
        .bind(t.qty)
        .bind(uuid_of(t.unit_id))
        .bind(t.unit_price)
        .bind(t.total)
        .bind(t.dont_invoice)
        .bind(t.paid)
        .bind(uuid_of(t.payment_method_id))
        .bind(t.version as i64)
        .bind(t.created_at)
        .bind(t.updated_at)
}

fn ticket_from_row(row: &PgRow) -> Result<Ticket, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("ticket", e);
    let status: String = row.try_get("status").map_err(get_err)?;
    let direction: String = row.try_get("direction").map_err(get_err)?;
    let transaction_type: String = row.try_get("transaction_type").map_err(get_err)?;
    let lookup = |col: &str| -> Result<Option<LookupId>, StoreError> {
        let v: Option<Uuid> = row.try_get(col).map_err(|e| StoreError::corrupt("ticket", e))?;
        Ok(v.map(LookupId::from_uuid))
    };
    let version: i64 = row.try_get("version").map_err(get_err)?;

    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(get_err)?),
        ticket_no: row.try_get("ticket_no").map_err(get_err)?,
        datetime: row.try_get("datetime").map_err(get_err)?,
        status: status.parse().map_err(|e| StoreError::corrupt("ticket", e))?,
        direction: direction.parse().map_err(|e| StoreError::corrupt("ticket", e))?,
        transaction_type: transaction_type
            .parse()
            .map_err(|e| StoreError::corrupt("ticket", e))?,
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")
            .map_err(get_err)?
            .map(CustomerId::from_uuid),
        vehicle_id: row
            .try_get::<Option<Uuid>, _>("vehicle_id")
            .map_err(get_err)?
            .map(VehicleId::from_uuid),
        product_id: row
            .try_get::<Option<Uuid>, _>("product_id")
            .map_err(get_err)?
            .map(ProductId::from_uuid),
        haulier_id: lookup("haulier_id")?,
        driver_id: lookup("driver_id")?,
        container_id: lookup("container_id")?,
        destination_id: lookup("destination_id")?,
        yard_id: lookup("yard_id")?,
        area_id: lookup("area_id")?,
        waste_code_id: lookup("waste_code_id")?,
        waste_producer_id: lookup("waste_producer_id")?,
        licence_id: lookup("licence_id")?,
        invoice_id: row
            .try_get::<Option<Uuid>, _>("invoice_id")
            .map_err(get_err)?
            .map(InvoiceId::from_uuid),
        gross_kg: row.try_get("gross_kg").map_err(get_err)?,
        tare_kg: row.try_get("tare_kg").map_err(get_err)?,
        net_kg: row.try_get("net_kg").map_err(get_err)?,
        qty: row.try_get("qty").map_err(get_err)?,
        unit_id: lookup("unit_id")?,
        unit_price: row.try_get("unit_price").map_err(get_err)?,
        total: row.try_get("total").map_err(get_err)?,
        dont_invoice: row.try_get("dont_invoice").map_err(get_err)?,
        paid: row.try_get("paid").map_err(get_err)?,
        payment_method_id: lookup("payment_method_id")?,
        version: version as u64,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn actor_from(raw: String, what: &str) -> Result<Actor, StoreError> {
    Actor::new(raw).map_err(|e| StoreError::corrupt(what, e))
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("invoice", e);
    let status: String = row.try_get("status").map_err(get_err)?;
    let paid_by: Option<String> = row.try_get("paid_by").map_err(get_err)?;
    let version: i64 = row.try_get("version").map_err(get_err)?;
    Ok(Invoice {
        id: InvoiceId::from_uuid(row.try_get("id").map_err(get_err)?),
        invoice_no: row.try_get("invoice_no").map_err(get_err)?,
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(get_err)?),
        invoice_date: row.try_get::<NaiveDate, _>("invoice_date").map_err(get_err)?,
        status: status
            .parse::<InvoiceStatus>()
            .map_err(|e| StoreError::corrupt("invoice", e))?,
        net_total: row.try_get("net_total").map_err(get_err)?,
        vat_total: row.try_get("vat_total").map_err(get_err)?,
        gross_total: row.try_get("gross_total").map_err(get_err)?,
        payment_method_id: row
            .try_get::<Option<Uuid>, _>("payment_method_id")
            .map_err(get_err)?
            .map(LookupId::from_uuid),
        paid_at: row.try_get("paid_at").map_err(get_err)?,
        paid_by: paid_by.map(|a| actor_from(a, "invoice")).transpose()?,
        version: version as u64,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn line_from_row(row: &PgRow) -> Result<InvoiceLine, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("invoice line", e);
    let line_no: i32 = row.try_get("line_no").map_err(get_err)?;
    Ok(InvoiceLine {
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id").map_err(get_err)?),
        line_no: line_no as u32,
        ticket_id: row
            .try_get::<Option<Uuid>, _>("ticket_id")
            .map_err(get_err)?
            .map(TicketId::from_uuid),
        description: row.try_get("description").map_err(get_err)?,
        quantity: row.try_get("quantity").map_err(get_err)?,
        unit_price: row.try_get("unit_price").map_err(get_err)?,
        net: row.try_get("net").map_err(get_err)?,
        vat: row.try_get("vat").map_err(get_err)?,
        gross: row.try_get("gross").map_err(get_err)?,
    })
}

fn lookup_from_row(row: &PgRow) -> Result<Lookup, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("lookup", e);
    let kind: String = row.try_get("kind").map_err(get_err)?;
    Ok(Lookup {
        id: LookupId::from_uuid(row.try_get("id").map_err(get_err)?),
        kind: kind.parse().map_err(|e| StoreError::corrupt("lookup", e))?,
        code: row.try_get("code").map_err(get_err)?,
        description: row.try_get("description").map_err(get_err)?,
        rate_percent: row.try_get("rate_percent").map_err(get_err)?,
        is_active: row.try_get("is_active").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("customer", e);
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get("id").map_err(get_err)?),
        account_code: row.try_get("account_code").map_err(get_err)?,
        name: row.try_get("name").map_err(get_err)?,
        is_active: row.try_get("is_active").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("vehicle", e);
    Ok(Vehicle {
        id: VehicleId::from_uuid(row.try_get("id").map_err(get_err)?),
        registration: row.try_get("registration").map_err(get_err)?,
        owner_customer_id: row
            .try_get::<Option<Uuid>, _>("owner_customer_id")
            .map_err(get_err)?
            .map(CustomerId::from_uuid),
        default_tare_kg: row.try_get("default_tare_kg").map_err(get_err)?,
        is_active: row.try_get("is_active").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("product", e);
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id").map_err(get_err)?),
        code: row.try_get("code").map_err(get_err)?,
        description: row.try_get("description").map_err(get_err)?,
        unit_id: row
            .try_get::<Option<Uuid>, _>("unit_id")
            .map_err(get_err)?
            .map(LookupId::from_uuid),
        unit_price: row.try_get::<Option<Decimal>, _>("unit_price").map_err(get_err)?,
        tax_rate_id: row
            .try_get::<Option<Uuid>, _>("tax_rate_id")
            .map_err(get_err)?
            .map(LookupId::from_uuid),
        is_active: row.try_get("is_active").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}

fn ticket_void_from_row(row: &PgRow) -> Result<TicketVoid, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("ticket void", e);
    Ok(TicketVoid {
        ticket_id: TicketId::from_uuid(row.try_get("ticket_id").map_err(get_err)?),
        reason_id: LookupId::from_uuid(row.try_get("reason_id").map_err(get_err)?),
        note: row.try_get("note").map_err(get_err)?,
        voided_at: row.try_get("voided_at").map_err(get_err)?,
        voided_by: actor_from(row.try_get("voided_by").map_err(get_err)?, "ticket void")?,
    })
}

fn invoice_void_from_row(row: &PgRow) -> Result<InvoiceVoid, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::corrupt("invoice void", e);
    Ok(InvoiceVoid {
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id").map_err(get_err)?),
        reason_id: LookupId::from_uuid(row.try_get("reason_id").map_err(get_err)?),
        note: row.try_get("note").map_err(get_err)?,
        voided_at: row.try_get("voided_at").map_err(get_err)?,
        voided_by: actor_from(row.try_get("voided_by").map_err(get_err)?, "invoice void")?,
    })
}

/// Owned bind values for the ticket list filter (`$1..$7`).
struct TicketListArgs {
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    status: Option<&'static str>,
    direction: Option<&'static str>,
    transaction_type: Option<&'static str>,
    ticket_no: Option<String>,
    q: Option<String>,
}

impl TicketListArgs {
    fn new(query: &TicketQuery) -> Self {
        Self {
            from: query.from_instant(),
            until: query.until_instant(),
            status: query.status.map(|s| s.as_str()),
            direction: query.direction.map(|d| d.as_str()),
            transaction_type: query.transaction_type.map(|t| t.as_str()),
            ticket_no: query.ticket_no_filter().map(like_pattern),
            q: query.search_text().map(like_pattern),
        }
    }

    fn bind<'q>(&'q self, q: PgQuery<'q>) -> PgQuery<'q> {
        q.bind(self.from)
            .bind(self.until)
            .bind(self.status)
            .bind(self.direction)
            .bind(self.transaction_type)
            .bind(self.ticket_no.as_deref())
            .bind(self.q.as_deref())
    }
}

/// Postgres implementation of every store trait over one pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool sized from settings. Fails when `DATABASE_URL` is unset.
    pub async fn connect(settings: &Settings) -> StoreResult<Self> {
        let url = settings
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("DATABASE_URL is not set".into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_tickets(&self, operation: &str, query: PgQuery<'_>) -> StoreResult<Vec<Ticket>> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(ticket_from_row).collect()
    }
}

/// Insert-if-absent then increment-and-read on the caller's transaction. The
/// UPDATE takes the row lock, so concurrent callers queue on it until commit.
async fn draw_number(conn: &mut PgConnection, kind: SequenceKind, year: i32) -> StoreResult<i64> {
    sqlx::query(
        r#"
        INSERT INTO sequences (kind, year, last_number)
        VALUES ($1, $2, 0)
        ON CONFLICT (kind, year) DO NOTHING
        "#,
    )
    .bind(kind.as_str())
    .bind(year)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("ensure_sequence", e))?;

    let row = sqlx::query(
        r#"
        UPDATE sequences
        SET last_number = last_number + 1
        WHERE kind = $1 AND year = $2
        RETURNING last_number
        "#,
    )
    .bind(kind.as_str())
    .bind(year)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("increment_sequence", e))?;
    row.try_get("last_number")
        .map_err(|e| StoreError::corrupt("sequence", e))
}

#[async_trait::async_trait]
impl SequenceGenerator for PostgresStore {
    #[instrument(skip(self), fields(kind = kind.as_str(), year), err)]
    async fn next_number(&self, kind: SequenceKind, year: i32) -> StoreResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let number = draw_number(&mut tx, kind, year).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(number)
    }

    async fn last_number(&self, kind: SequenceKind, year: i32) -> StoreResult<i64> {
        let row = sqlx::query("SELECT last_number FROM sequences WHERE kind = $1 AND year = $2")
            .bind(kind.as_str())
            .bind(year)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("last_number", e))?;
        match row {
            None => Ok(0),
            Some(r) => r
                .try_get("last_number")
                .map_err(|e| StoreError::corrupt("sequence", e)),
        }
    }
}

#[async_trait::async_trait]
impl TicketStore for PostgresStore {
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.id, ticket_no = %ticket.ticket_no), err)]
    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO tickets (id, {}) VALUES ($1, {})",
            TICKET_FIELDS.join(", "),
            ticket_placeholders()
        );
        bind_ticket_fields(sqlx::query(&sql).bind(ticket.id.as_uuid()), ticket)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_ticket", e))?;
        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        let sql = format!("SELECT {} FROM tickets t WHERE t.id = $1", ticket_columns());
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_ticket", e))?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    #[instrument(
        skip(self, ticket, void),
        fields(ticket_id = %ticket.id, expected_version, voided = void.is_some()),
        err
    )]
    async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        void: Option<&TicketVoid>,
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!(
            "UPDATE tickets SET ({}) = ({}) WHERE id = $1 AND version = ${}",
            TICKET_FIELDS.join(", "),
            ticket_placeholders(),
            TICKET_FIELDS.len() + 2
        );
        let result = bind_ticket_fields(sqlx::query(&sql).bind(ticket.id.as_uuid()), ticket)
            .bind(expected_version as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_ticket", e))?;

        if result.rows_affected() == 0 {
            let current = sqlx::query("SELECT version FROM tickets WHERE id = $1")
                .bind(ticket.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_ticket_version", e))?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(match current {
                None => StoreError::NotFound,
                Some(row) => {
                    let found: i64 = row
                        .try_get("version")
                        .map_err(|e| StoreError::corrupt("ticket", e))?;
                    StoreError::Conflict(format!(
                        "ticket was modified (expected version {expected_version}, found {found})"
                    ))
                }
            });
        }

        if let Some(v) = void {
            sqlx::query(
                r#"
                INSERT INTO ticket_voids (ticket_id, reason_id, note, voided_at, voided_by)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(v.ticket_id.as_uuid())
            .bind(v.reason_id.as_uuid())
            .bind(&v.note)
            .bind(v.voided_at)
            .bind(v.voided_by.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_ticket_void", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn ticket_voids(&self, id: TicketId) -> StoreResult<Vec<TicketVoid>> {
        let rows = sqlx::query(
            r#"
            SELECT ticket_id, reason_id, note, voided_at, voided_by
            FROM ticket_voids
            WHERE ticket_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ticket_voids", e))?;
        rows.iter().map(ticket_void_from_row).collect()
    }

    #[instrument(skip(self, query), err)]
    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Page<TicketSummary>> {
        let args = TicketListArgs::new(query);

        let count_sql = format!("SELECT COUNT(*) AS total {TICKET_LIST_JOINS} {TICKET_LIST_FILTER}");
        let total: i64 = args
            .bind(sqlx::query(&count_sql))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_tickets", e))?
            .try_get("total")
            .map_err(|e| StoreError::corrupt("count", e))?;

        let window = PageWindow::new(query.requested_page(), query.page_size(), total.max(0) as u64);
        let page_sql = format!(
            "SELECT {}, v.registration AS vehicle_registration, c.name AS customer_name \
             {TICKET_LIST_JOINS} {TICKET_LIST_FILTER} \
             ORDER BY t.datetime DESC, \
                 CASE t.status WHEN 'OPEN' THEN 0 WHEN 'COMPLETE' THEN 1 ELSE 2 END, \
                 t.ticket_no DESC \
             LIMIT $8 OFFSET $9",
            ticket_columns()
        );
        let rows = args
            .bind(sqlx::query(&page_sql))
            .bind(i64::from(window.page_size))
            .bind(window.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tickets", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(TicketSummary {
                ticket: ticket_from_row(row)?,
                vehicle_registration: row
                    .try_get("vehicle_registration")
                    .map_err(|e| StoreError::corrupt("ticket", e))?,
                customer_name: row
                    .try_get("customer_name")
                    .map_err(|e| StoreError::corrupt("ticket", e))?,
            });
        }
        Ok(Page { items, window })
    }

    async fn recent_open_tickets(&self, since: DateTime<Utc>) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets t WHERE t.status = 'OPEN' AND t.created_at >= $1",
            ticket_columns()
        );
        self.fetch_tickets("recent_open_tickets", sqlx::query(&sql).bind(since))
            .await
    }

    async fn tickets_in_window(&self, window: &GenerationWindow) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets t \
             WHERE t.customer_id = $1 \
               AND ($2::timestamptz IS NULL OR t.datetime >= $2) \
               AND ($3::timestamptz IS NULL OR t.datetime < $3) \
             ORDER BY t.datetime ASC, t.ticket_no ASC",
            ticket_columns()
        );
        let customer = *window.customer_id.as_uuid();
        let (from, until) = (window.from_instant(), window.until_instant());
        let query = sqlx::query(&sql).bind(customer).bind(from).bind(until);
        self.fetch_tickets("tickets_in_window", query).await
    }

    async fn tickets_for_invoice(&self, id: InvoiceId) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT {} FROM tickets t WHERE t.invoice_id = $1 ORDER BY t.datetime ASC, t.ticket_no ASC",
            ticket_columns()
        );
        let id = *id.as_uuid();
        self.fetch_tickets("tickets_for_invoice", sqlx::query(&sql).bind(id))
            .await
    }
}

#[async_trait::async_trait]
impl InvoiceStore for PostgresStore {
    /// The number is drawn on the same transaction as the inserts, so a
    /// rollback also returns it to the counter.
    #[instrument(skip(self, plan), fields(invoice_id = %id, lines = plan.lines.len()), err)]
    async fn create_invoice(
        &self,
        plan: &InvoicePlan,
        id: InvoiceId,
        now: DateTime<Utc>,
    ) -> StoreResult<(Invoice, Vec<InvoiceLine>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let year = plan.invoice_date.year();
        let invoice_no = loop {
            let number = draw_number(&mut tx, SequenceKind::Invoice, year).await?;
            let candidate = format_invoice_no(year, number);
            let held: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM invoices WHERE invoice_no = $1)")
                    .bind(&candidate)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("invoice_no_taken", e))?;
            if !held {
                break candidate;
            }
        };
        let (invoice, lines) = plan.build(id, invoice_no, now);
        let ticket_ids = plan.ticket_ids();

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_no, customer_id, invoice_date, status,
                net_total, vat_total, gross_total,
                payment_method_id, paid_at, paid_by,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(&invoice.invoice_no)
        .bind(invoice.customer_id.as_uuid())
        .bind(invoice.invoice_date)
        .bind(invoice.status.as_str())
        .bind(invoice.net_total)
        .bind(invoice.vat_total)
        .bind(invoice.gross_total)
        .bind(uuid_of(invoice.payment_method_id))
        .bind(invoice.paid_at)
        .bind(invoice.paid_by.as_ref().map(|a| a.as_str()))
        .bind(invoice.version as i64)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    invoice_id, line_no, ticket_id, description,
                    quantity, unit_price, net, vat, gross
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(line.invoice_id.as_uuid())
            .bind(line.line_no as i32)
            .bind(uuid_of(line.ticket_id))
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.net)
            .bind(line.vat)
            .bind(line.gross)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_invoice_line", e))?;
        }

        let ids: Vec<Uuid> = ticket_ids.iter().map(|id| *id.as_uuid()).collect();
        let linked = sqlx::query(
            r#"
            UPDATE tickets
            SET invoice_id = $1, version = version + 1, updated_at = $3
            WHERE id = ANY($2) AND invoice_id IS NULL AND status = 'COMPLETE'
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(&ids)
        .bind(invoice.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("link_tickets", e))?;

        if linked.rows_affected() != ids.len() as u64 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "{} of {} tickets are no longer invoiceable",
                ids.len() as u64 - linked.rows_affected(),
                ids.len()
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((invoice, lines))
    }

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_invoice", e))?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn invoice_lines(&self, id: InvoiceId) -> StoreResult<Vec<InvoiceLine>> {
        let rows = sqlx::query(
            r#"
            SELECT invoice_id, line_no, ticket_id, description,
                   quantity, unit_price, net, vat, gross
            FROM invoice_lines
            WHERE invoice_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("invoice_lines", e))?;
        rows.iter().map(line_from_row).collect()
    }

    #[instrument(
        skip(self, invoice, void),
        fields(invoice_id = %invoice.id, expected_version, status = invoice.status.as_str()),
        err
    )]
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected_version: u64,
        void: Option<&InvoiceVoid>,
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $2, payment_method_id = $3, paid_at = $4, paid_by = $5,
                version = $6, updated_at = $7
            WHERE id = $1 AND version = $8
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.status.as_str())
        .bind(uuid_of(invoice.payment_method_id))
        .bind(invoice.paid_at)
        .bind(invoice.paid_by.as_ref().map(|a| a.as_str()))
        .bind(invoice.version as i64)
        .bind(invoice.updated_at)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_invoice", e))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM invoices WHERE id = $1")
                .bind(invoice.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_invoice_version", e))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(if exists {
                StoreError::Conflict(format!(
                    "invoice was modified (expected version {expected_version})"
                ))
            } else {
                StoreError::NotFound
            });
        }

        if let Some(v) = void {
            sqlx::query(
                r#"
                INSERT INTO invoice_voids (invoice_id, reason_id, note, voided_at, voided_by)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(v.invoice_id.as_uuid())
            .bind(v.reason_id.as_uuid())
            .bind(&v.note)
            .bind(v.voided_at)
            .bind(v.voided_by.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_invoice_void", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn invoice_voids(&self, id: InvoiceId) -> StoreResult<Vec<InvoiceVoid>> {
        let rows = sqlx::query(
            r#"
            SELECT invoice_id, reason_id, note, voided_at, voided_by
            FROM invoice_voids
            WHERE invoice_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("invoice_voids", e))?;
        rows.iter().map(invoice_void_from_row).collect()
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Page<InvoiceSummary>> {
        let pattern = query.search_text().map(like_pattern);
        let status = query.status.map(|s| s.as_str());
        let filter = "FROM invoices i JOIN customers c ON c.id = i.customer_id \
             WHERE ($1::text IS NULL OR i.invoice_no ILIKE $1 OR c.name ILIKE $1) \
               AND ($2::text IS NULL OR i.status = $2)";

        let count_sql = format!("SELECT COUNT(*) AS total {filter}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(pattern.as_deref())
            .bind(status)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_invoices", e))?
            .try_get("total")
            .map_err(|e| StoreError::corrupt("count", e))?;

        let window = PageWindow::new(query.requested_page(), query.page_size(), total.max(0) as u64);
        let page_sql = format!(
            "SELECT {INVOICE_COLUMNS}, c.name AS customer_name {filter} \
             ORDER BY i.invoice_date DESC, i.invoice_no DESC \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&page_sql)
            .bind(pattern.as_deref())
            .bind(status)
            .bind(i64::from(window.page_size))
            .bind(window.offset() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_invoices", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(InvoiceSummary {
                invoice: invoice_from_row(row)?,
                customer_name: row
                    .try_get("customer_name")
                    .map_err(|e| StoreError::corrupt("invoice", e))?,
            });
        }
        Ok(Page { items, window })
    }
}

#[async_trait::async_trait]
impl ReferenceStore for PostgresStore {
    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, account_code, name, is_active, created_at FROM customers WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_customer", e))?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn get_vehicle(&self, id: VehicleId) -> StoreResult<Option<Vehicle>> {
        let row = sqlx::query(
            r#"
            SELECT id, registration, owner_customer_id, default_tare_kg, is_active, created_at
            FROM vehicles WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_vehicle", e))?;
        row.as_ref().map(vehicle_from_row).transpose()
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, description, unit_id, unit_price, tax_rate_id, is_active, created_at
            FROM products WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn get_lookup(&self, id: LookupId) -> StoreResult<Option<Lookup>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, code, description, rate_percent, is_active, created_at, updated_at
            FROM lookups WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_lookup", e))?;
        row.as_ref().map(lookup_from_row).transpose()
    }

    async fn find_lookup(&self, kind: LookupKind, code: &str) -> StoreResult<Option<Lookup>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, code, description, rate_percent, is_active, created_at, updated_at
            FROM lookups WHERE kind = $1 AND code = $2
            "#,
        )
        .bind(kind.as_str())
        .bind(code)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_lookup", e))?;
        row.as_ref().map(lookup_from_row).transpose()
    }

    async fn list_lookups(&self, kind: LookupKind) -> StoreResult<Vec<Lookup>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, code, description, rate_percent, is_active, created_at, updated_at
            FROM lookups WHERE kind = $1
            ORDER BY code ASC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_lookups", e))?;
        rows.iter().map(lookup_from_row).collect()
    }

    async fn customer_code_taken(&self, account_code: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM customers WHERE account_code = $1")
            .bind(account_code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("customer_code_taken", e))?;
        Ok(row.is_some())
    }

    async fn registration_taken(&self, registration: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM vehicles WHERE registration = $1")
            .bind(registration)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("registration_taken", e))?;
        Ok(row.is_some())
    }

    async fn product_code_taken(&self, code: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM products WHERE code = $1")
            .bind(code)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product_code_taken", e))?;
        Ok(row.is_some())
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, account_code, name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.account_code)
        .bind(&customer.name)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    async fn insert_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicles (id, registration, owner_customer_id, default_tare_kg, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(vehicle.id.as_uuid())
        .bind(&vehicle.registration)
        .bind(uuid_of(vehicle.owner_customer_id))
        .bind(vehicle.default_tare_kg)
        .bind(vehicle.is_active)
        .bind(vehicle.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_vehicle", e))?;
        Ok(())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, code, description, unit_id, unit_price, tax_rate_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.code)
        .bind(&product.description)
        .bind(uuid_of(product.unit_id))
        .bind(product.unit_price)
        .bind(uuid_of(product.tax_rate_id))
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn insert_lookup(&self, lookup: &Lookup) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lookups (id, kind, code, description, rate_percent, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(lookup.id.as_uuid())
        .bind(lookup.kind.as_str())
        .bind(&lookup.code)
        .bind(lookup.description.as_deref())
        .bind(lookup.rate_percent)
        .bind(lookup.is_active)
        .bind(lookup.created_at)
        .bind(lookup.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_lookup", e))?;
        Ok(())
    }

    /// Locks the lookup row, checks ticket usage, then writes, all in one
    /// transaction.
    #[instrument(skip(self), fields(kind = kind.as_str(), lookup_id = %id), err)]
    async fn deactivate_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        now: DateTime<Utc>,
    ) -> StoreResult<Deactivation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, kind, code, description, rate_percent, is_active, created_at, updated_at
            FROM lookups WHERE id = $1 AND kind = $2
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .bind(kind.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_lookup", e))?;
        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::NotFound);
        };
        let lookup = lookup_from_row(&row)?;

        let referenced = match kind.ticket_column() {
            None => false,
            Some(column) => {
                let sql = format!("SELECT EXISTS (SELECT 1 FROM tickets WHERE {column} = $1) AS used");
                sqlx::query(&sql)
                    .bind(id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("lookup_usage", e))?
                    .try_get::<bool, _>("used")
                    .map_err(|e| StoreError::corrupt("lookup usage", e))?
            }
        };

        let decision = plan_deactivation(&lookup, referenced);
        if decision == Deactivation::Deactivate {
            sqlx::query("UPDATE lookups SET is_active = FALSE, updated_at = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("deactivate_lookup", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(decision)
    }

    async fn activate_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE lookups SET is_active = TRUE, updated_at = $3 WHERE id = $1 AND kind = $2 AND NOT is_active",
        )
        .bind(id.as_uuid())
        .bind(kind.as_str())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("activate_lookup", e))?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get_lookup(id).await? {
            Some(l) if l.kind == kind => Ok(false),
            _ => Err(StoreError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("26-0"), "%26-0%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn ticket_statements_line_up() {
        assert_eq!(ticket_placeholders().split(", ").count(), TICKET_FIELDS.len());
        assert!(ticket_placeholders().ends_with("$32"));
        assert!(ticket_columns().starts_with("t.id, t.ticket_no"));
    }

    #[test]
    fn schema_creates_every_table() {
        for table in [
            "sequences",
            "customers",
            "lookups",
            "vehicles",
            "products",
            "invoices",
            "tickets",
            "ticket_voids",
            "invoice_lines",
            "invoice_voids",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing {table}"
            );
        }
    }
}
