use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Datelike, Utc};

use weighbridge_core::{CustomerId, InvoiceId, LookupId, ProductId, TicketId, VehicleId};
use weighbridge_invoicing::{
    GenerationWindow, Invoice, InvoiceLine, InvoicePlan, InvoiceQuery, InvoiceSummary,
    InvoiceVoid, format_invoice_no, invoice_list_order,
};
use weighbridge_reference::{
    Customer, Deactivation, Lookup, LookupKind, Product, Vehicle, activate, deactivate,
    plan_deactivation,
};
use weighbridge_tickets::{
    Page, PageWindow, SearchContext, Ticket, TicketQuery, TicketStatus, TicketVoid, list_order,
};

use super::{
    InvoiceStore, ReferenceStore, SequenceGenerator, SequenceKind, StoreError, StoreResult,
    TicketStore, TicketSummary,
};

#[derive(Debug, Default)]
struct State {
    tickets: HashMap<TicketId, Ticket>,
    ticket_voids: Vec<TicketVoid>,
    invoices: HashMap<InvoiceId, Invoice>,
    invoice_lines: HashMap<InvoiceId, Vec<InvoiceLine>>,
    invoice_voids: Vec<InvoiceVoid>,
    customers: HashMap<CustomerId, Customer>,
    vehicles: HashMap<VehicleId, Vehicle>,
    products: HashMap<ProductId, Product>,
    lookups: HashMap<LookupId, Lookup>,
    sequences: HashMap<(SequenceKind, i32), i64>,
}

impl State {
    fn search_context(&self, ticket: &Ticket) -> SearchContext<'_> {
        SearchContext {
            vehicle_registration: ticket
                .vehicle_id
                .and_then(|id| self.vehicles.get(&id))
                .map(|v| v.registration.as_str()),
            customer_name: ticket
                .customer_id
                .and_then(|id| self.customers.get(&id))
                .map(|c| c.name.as_str()),
        }
    }
}

fn page_of<T: Clone>(rows: Vec<T>, requested_page: u32, page_size: u32) -> Page<T> {
    let window = PageWindow::new(requested_page, page_size, rows.len() as u64);
    let items = rows
        .into_iter()
        .skip(window.offset() as usize)
        .take(window.page_size as usize)
        .collect();
    Page { items, window }
}

fn check_version(kind: &str, found: u64, expected: u64) -> StoreResult<()> {
    if found != expected {
        return Err(StoreError::Conflict(format!(
            "{kind} was modified (expected version {expected}, found {found})"
        )));
    }
    Ok(())
}

/// In-memory store for dev/tests.
///
/// All tables sit behind one lock, so every trait method is atomic with
/// respect to every other.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    /// Start a counter at `last_number` (imports, tests).
    pub fn set_last_number(&self, kind: SequenceKind, year: i32, last_number: i64) -> StoreResult<()> {
        self.write()?.sequences.insert((kind, year), last_number);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SequenceGenerator for InMemoryStore {
    async fn next_number(&self, kind: SequenceKind, year: i32) -> StoreResult<i64> {
        let mut state = self.write()?;
        let counter = state.sequences.entry((kind, year)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn last_number(&self, kind: SequenceKind, year: i32) -> StoreResult<i64> {
        Ok(self.read()?.sequences.get(&(kind, year)).copied().unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl TicketStore for InMemoryStore {
    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.tickets.values().any(|t| t.ticket_no == ticket.ticket_no) {
            return Err(StoreError::UniqueViolation(format!(
                "ticket number {} already exists",
                ticket.ticket_no
            )));
        }
        if state.tickets.contains_key(&ticket.id) {
            return Err(StoreError::UniqueViolation(format!("ticket {} already exists", ticket.id)));
        }
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        Ok(self.read()?.tickets.get(&id).cloned())
    }

    async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        void: Option<&TicketVoid>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        let current = state.tickets.get(&ticket.id).ok_or(StoreError::NotFound)?;
        check_version("ticket", current.version, expected_version)?;
        state.tickets.insert(ticket.id, ticket.clone());
        if let Some(v) = void {
            state.ticket_voids.push(v.clone());
        }
        Ok(())
    }

    async fn ticket_voids(&self, id: TicketId) -> StoreResult<Vec<TicketVoid>> {
        Ok(self
            .read()?
            .ticket_voids
            .iter()
            .filter(|v| v.ticket_id == id)
            .cloned()
            .collect())
    }

    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Page<TicketSummary>> {
        let state = self.read()?;
        let mut hits: Vec<&Ticket> = state
            .tickets
            .values()
            .filter(|t| query.matches(t, state.search_context(t)))
            .collect();
        hits.sort_by(|a, b| list_order(a, b));
        let rows = hits
            .into_iter()
            .map(|t| {
                let ctx = state.search_context(t);
                TicketSummary {
                    ticket: t.clone(),
                    vehicle_registration: ctx.vehicle_registration.map(str::to_string),
                    customer_name: ctx.customer_name.map(str::to_string),
                }
            })
            .collect();
        Ok(page_of(rows, query.requested_page(), query.page_size()))
    }

    async fn recent_open_tickets(&self, since: DateTime<Utc>) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .read()?
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Open && t.created_at >= since)
            .cloned()
            .collect())
    }

    async fn tickets_in_window(&self, window: &GenerationWindow) -> StoreResult<Vec<Ticket>> {
        let mut rows: Vec<Ticket> = self
            .read()?
            .tickets
            .values()
            .filter(|t| window.covers(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.ticket_no.cmp(&b.ticket_no)));
        Ok(rows)
    }

    async fn tickets_for_invoice(&self, id: InvoiceId) -> StoreResult<Vec<Ticket>> {
        let mut rows: Vec<Ticket> = self
            .read()?
            .tickets
            .values()
            .filter(|t| t.invoice_id == Some(id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.ticket_no.cmp(&b.ticket_no)));
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl InvoiceStore for InMemoryStore {
    async fn create_invoice(
        &self,
        plan: &InvoicePlan,
        id: InvoiceId,
        now: DateTime<Utc>,
    ) -> StoreResult<(Invoice, Vec<InvoiceLine>)> {
        let mut state = self.write()?;
        let ticket_ids = plan.ticket_ids();

        // Check every precondition before the first write.
        for ticket_id in &ticket_ids {
            match state.tickets.get(ticket_id) {
                None => {
                    return Err(StoreError::Conflict(format!("ticket {ticket_id} no longer exists")));
                }
                Some(t) if t.invoice_id.is_some() || t.status != TicketStatus::Complete => {
                    return Err(StoreError::Conflict(format!(
                        "ticket {} is no longer invoiceable",
                        t.ticket_no
                    )));
                }
                Some(_) => {}
            }
        }

        let year = plan.invoice_date.year();
        let key = (SequenceKind::Invoice, year);
        let mut number = state.sequences.get(&key).copied().unwrap_or(0);
        let invoice_no = loop {
            number += 1;
            let candidate = format_invoice_no(year, number);
            if !state.invoices.values().any(|i| i.invoice_no == candidate) {
                break candidate;
            }
        };
        let (invoice, lines) = plan.build(id, invoice_no, now);

        state.sequences.insert(key, number);
        for ticket_id in &ticket_ids {
            if let Some(t) = state.tickets.get_mut(ticket_id) {
                t.invoice_id = Some(invoice.id);
                t.version += 1;
                t.updated_at = invoice.created_at;
            }
        }
        state.invoices.insert(invoice.id, invoice.clone());
        state.invoice_lines.insert(invoice.id, lines.clone());
        Ok((invoice, lines))
    }

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Option<Invoice>> {
        Ok(self.read()?.invoices.get(&id).cloned())
    }

    async fn invoice_lines(&self, id: InvoiceId) -> StoreResult<Vec<InvoiceLine>> {
        let mut lines = self.read()?.invoice_lines.get(&id).cloned().unwrap_or_default();
        lines.sort_by_key(|l| l.line_no);
        Ok(lines)
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected_version: u64,
        void: Option<&InvoiceVoid>,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        let current = state.invoices.get(&invoice.id).ok_or(StoreError::NotFound)?;
        check_version("invoice", current.version, expected_version)?;
        state.invoices.insert(invoice.id, invoice.clone());
        if let Some(v) = void {
            state.invoice_voids.push(v.clone());
        }
        Ok(())
    }

    async fn invoice_voids(&self, id: InvoiceId) -> StoreResult<Vec<InvoiceVoid>> {
        Ok(self
            .read()?
            .invoice_voids
            .iter()
            .filter(|v| v.invoice_id == id)
            .cloned()
            .collect())
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Page<InvoiceSummary>> {
        let state = self.read()?;
        let name_of = |i: &Invoice| state.customers.get(&i.customer_id).map(|c| c.name.clone());
        let mut hits: Vec<&Invoice> = state
            .invoices
            .values()
            .filter(|i| query.matches(i, name_of(i).as_deref()))
            .collect();
        hits.sort_by(|a, b| invoice_list_order(a, b));
        let rows = hits
            .into_iter()
            .map(|i| InvoiceSummary { invoice: i.clone(), customer_name: name_of(i) })
            .collect();
        Ok(page_of(rows, query.requested_page(), query.page_size()))
    }
}

#[async_trait::async_trait]
impl ReferenceStore for InMemoryStore {
    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        Ok(self.read()?.customers.get(&id).cloned())
    }

    async fn get_vehicle(&self, id: VehicleId) -> StoreResult<Option<Vehicle>> {
        Ok(self.read()?.vehicles.get(&id).cloned())
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn get_lookup(&self, id: LookupId) -> StoreResult<Option<Lookup>> {
        Ok(self.read()?.lookups.get(&id).cloned())
    }

    async fn find_lookup(&self, kind: LookupKind, code: &str) -> StoreResult<Option<Lookup>> {
        Ok(self
            .read()?
            .lookups
            .values()
            .find(|l| l.kind == kind && l.code == code)
            .cloned())
    }

    async fn list_lookups(&self, kind: LookupKind) -> StoreResult<Vec<Lookup>> {
        let mut rows: Vec<Lookup> = self
            .read()?
            .lookups
            .values()
            .filter(|l| l.kind == kind)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rows)
    }

    async fn customer_code_taken(&self, account_code: &str) -> StoreResult<bool> {
        Ok(self.read()?.customers.values().any(|c| c.account_code == account_code))
    }

    async fn registration_taken(&self, registration: &str) -> StoreResult<bool> {
        Ok(self.read()?.vehicles.values().any(|v| v.registration == registration))
    }

    async fn product_code_taken(&self, code: &str) -> StoreResult<bool> {
        Ok(self.read()?.products.values().any(|p| p.code == code))
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.customers.values().any(|c| c.account_code == customer.account_code) {
            return Err(StoreError::UniqueViolation(format!(
                "account code {} already exists",
                customer.account_code
            )));
        }
        state.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn insert_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.vehicles.values().any(|v| v.registration == vehicle.registration) {
            return Err(StoreError::UniqueViolation(format!(
                "registration {} already exists",
                vehicle.registration
            )));
        }
        state.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.products.values().any(|p| p.code == product.code) {
            return Err(StoreError::UniqueViolation(format!(
                "product code {} already exists",
                product.code
            )));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn insert_lookup(&self, lookup: &Lookup) -> StoreResult<()> {
        let mut state = self.write()?;
        if state
            .lookups
            .values()
            .any(|l| l.kind == lookup.kind && l.code == lookup.code)
        {
            return Err(StoreError::UniqueViolation(format!(
                "{} code {} already exists",
                lookup.kind, lookup.code
            )));
        }
        state.lookups.insert(lookup.id, lookup.clone());
        Ok(())
    }

    async fn deactivate_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        now: DateTime<Utc>,
    ) -> StoreResult<Deactivation> {
        let mut state = self.write()?;
        let referenced = state.tickets.values().any(|t| t.lookup_ref(kind) == Some(id));
        let lookup = state
            .lookups
            .get_mut(&id)
            .filter(|l| l.kind == kind)
            .ok_or(StoreError::NotFound)?;
        let decision = plan_deactivation(lookup, referenced);
        if decision == Deactivation::Deactivate {
            deactivate(lookup, now);
        }
        Ok(decision)
    }

    async fn activate_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        let lookup = state
            .lookups
            .get_mut(&id)
            .filter(|l| l.kind == kind)
            .ok_or(StoreError::NotFound)?;
        Ok(activate(lookup, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use weighbridge_invoicing::{DraftLine, InvoiceStatus, InvoiceTotals, LineAmounts};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap()
    }

    fn haulier(code: &str) -> Lookup {
        Lookup {
            id: LookupId::new(),
            kind: LookupKind::Haulier,
            code: code.into(),
            description: None,
            rate_percent: None,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn complete_ticket(no: &str) -> Ticket {
        let mut t = Ticket::quick(TicketId::new(), no.into(), now());
        t.status = TicketStatus::Complete;
        t.qty = Some(Decimal::ONE);
        t.unit_price = Some(Decimal::TEN);
        t.total = Some(Decimal::TEN);
        t
    }

    fn plan_for(tickets: &[&Ticket]) -> InvoicePlan {
        let amounts = LineAmounts { net: Decimal::TEN, vat: Decimal::ZERO, gross: Decimal::TEN };
        InvoicePlan {
            customer_id: CustomerId::new(),
            invoice_date: now().date_naive(),
            lines: tickets
                .iter()
                .map(|t| DraftLine {
                    ticket_id: t.id,
                    ticket_no: t.ticket_no.clone(),
                    datetime: t.datetime,
                    description: format!("Ticket {}", t.ticket_no),
                    quantity: Decimal::ONE,
                    unit_price: Decimal::TEN,
                    rate_percent: None,
                    amounts,
                })
                .collect(),
            totals: InvoiceTotals::from_amounts(std::iter::repeat_n(&amounts, tickets.len())),
        }
    }

    #[tokio::test]
    async fn sequence_continues_from_last_number() {
        let store = InMemoryStore::new();
        store.set_last_number(SequenceKind::Ticket, 2026, 41).unwrap();
        assert_eq!(store.next_number(SequenceKind::Ticket, 2026).await.unwrap(), 42);
        assert_eq!(store.next_number(SequenceKind::Invoice, 2026).await.unwrap(), 1);
        assert_eq!(store.next_number(SequenceKind::Ticket, 2027).await.unwrap(), 1);
        assert_eq!(store.last_number(SequenceKind::Ticket, 2026).await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_are_distinct_and_gapless() {
        let store = Arc::new(InMemoryStore::new());
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.next_number(SequenceKind::Invoice, 2026).await })
            })
            .collect();
        let mut got = Vec::new();
        for h in handles {
            got.push(h.await.unwrap().unwrap());
        }
        got.sort_unstable();
        assert_eq!(got, (1..=64).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = InMemoryStore::new();
        let mut t = Ticket::quick(TicketId::new(), "26-00001".into(), now());
        store.insert_ticket(&t).await.unwrap();

        t.version = 1;
        store.update_ticket(&t, 0, None).await.unwrap();
        let err = store.update_ticket(&t, 0, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_ticket_number_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_ticket(&Ticket::quick(TicketId::new(), "26-00001".into(), now())).await.unwrap();
        let err = store
            .insert_ticket(&Ticket::quick(TicketId::new(), "26-00001".into(), now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn create_invoice_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let a = complete_ticket("26-00001");
        let mut b = complete_ticket("26-00002");
        b.invoice_id = Some(InvoiceId::new());
        store.insert_ticket(&a).await.unwrap();
        store.insert_ticket(&b).await.unwrap();

        let id = InvoiceId::new();
        let err = store.create_invoice(&plan_for(&[&a, &b]), id, now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_invoice(id).await.unwrap().is_none());
        assert_eq!(store.get_ticket(a.id).await.unwrap().unwrap().invoice_id, None);
        assert_eq!(store.last_number(SequenceKind::Invoice, 2026).await.unwrap(), 0);

        let (inv, lines) = store.create_invoice(&plan_for(&[&a]), id, now()).await.unwrap();
        assert_eq!(inv.invoice_no, "INV-26-00001");
        assert_eq!(inv.status, InvoiceStatus::Draft);
        assert_eq!(lines.len(), 1);
        assert_eq!(store.last_number(SequenceKind::Invoice, 2026).await.unwrap(), 1);
        let linked = store.get_ticket(a.id).await.unwrap().unwrap();
        assert_eq!(linked.invoice_id, Some(inv.id));
        assert_eq!(linked.version, a.version + 1);
    }

    #[tokio::test]
    async fn invoice_numbers_already_held_are_passed_over() {
        let store = InMemoryStore::new();
        let (held, _) = store.create_invoice(&plan_for(&[]), InvoiceId::new(), now()).await.unwrap();
        assert_eq!(held.invoice_no, "INV-26-00001");
        // Counter rewound behind existing data, e.g. after a partial restore.
        store.set_last_number(SequenceKind::Invoice, 2026, 0).unwrap();

        let t = complete_ticket("26-00001");
        store.insert_ticket(&t).await.unwrap();
        let (inv, _) = store.create_invoice(&plan_for(&[&t]), InvoiceId::new(), now()).await.unwrap();
        assert_eq!(inv.invoice_no, "INV-26-00002");
        assert_eq!(store.last_number(SequenceKind::Invoice, 2026).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn deactivation_guard_checks_ticket_usage() {
        let store = InMemoryStore::new();
        let used = haulier("H1");
        let spare = haulier("H2");
        store.insert_lookup(&used).await.unwrap();
        store.insert_lookup(&spare).await.unwrap();
        let mut t = Ticket::quick(TicketId::new(), "26-00001".into(), now());
        t.haulier_id = Some(used.id);
        store.insert_ticket(&t).await.unwrap();

        let d = store.deactivate_lookup(LookupKind::Haulier, used.id, now()).await.unwrap();
        assert_eq!(d, Deactivation::InUse);
        assert!(store.get_lookup(used.id).await.unwrap().unwrap().is_active);

        let d = store.deactivate_lookup(LookupKind::Haulier, spare.id, now()).await.unwrap();
        assert_eq!(d, Deactivation::Deactivate);
        let d = store.deactivate_lookup(LookupKind::Haulier, spare.id, now()).await.unwrap();
        assert_eq!(d, Deactivation::AlreadyInactive);

        let err = store.deactivate_lookup(LookupKind::Driver, spare.id, now()).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }
}
