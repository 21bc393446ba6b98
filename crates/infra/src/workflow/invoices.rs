//! Invoice workflows: preview, generation, listing, payment and void.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use weighbridge_core::{Actor, InvoiceId};
use weighbridge_invoicing::{
    GenerateInvoice, GenerationWindow, Invoice, InvoiceLine, InvoicePreview, InvoiceQuery,
    InvoiceSummary, InvoiceVoid, InvoiceVoidOutcome, MarkPaid, VoidInvoice, plan_invoice,
    preview,
};
use weighbridge_reference::ReferenceSnapshot;
use weighbridge_tickets::{Page, Ticket};

use super::{MAX_NUMBER_ATTEMPTS, Services, WorkflowError, WorkflowResult, check_expected};
use crate::store::StoreError;

pub const GENERATION_FAILED_MESSAGE: &str = "Invoice generation failed.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub customer_name: Option<String>,
    pub lines: Vec<InvoiceLine>,
    /// Linked tickets, datetime ascending.
    pub tickets: Vec<Ticket>,
    pub voids: Vec<InvoiceVoid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaymentRequest {
    #[serde(flatten)]
    pub payment: MarkPaid,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvoiceVoidRequest {
    #[serde(flatten)]
    pub void: VoidInvoice,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceVoidResult {
    pub invoice: Invoice,
    /// The invoice was already VOID; nothing was written.
    pub already_void: bool,
}

impl Services {
    async fn load_invoice(&self, id: InvoiceId) -> WorkflowResult<Invoice> {
        self.invoices
            .get_invoice(id)
            .await?
            .ok_or_else(WorkflowError::not_found)
    }

    /// Candidate tickets of the window plus the products and tax rates their
    /// lines are priced from.
    async fn generation_inputs(
        &self,
        window: &GenerationWindow,
    ) -> WorkflowResult<(Vec<Ticket>, ReferenceSnapshot)> {
        let candidates = self.tickets.tickets_in_window(window).await?;

        let mut snapshot = ReferenceSnapshot::new();
        let product_ids: HashSet<_> = candidates.iter().filter_map(|t| t.product_id).collect();
        let mut tax_rate_ids = HashSet::new();
        for id in product_ids {
            if let Some(product) = self.reference.get_product(id).await? {
                tax_rate_ids.extend(product.tax_rate_id);
                snapshot.insert_product(product);
            }
        }
        self.add_lookups(&mut snapshot, tax_rate_ids).await?;
        Ok((candidates, snapshot))
    }

    /// Dry run: what a generation with this request would include and exclude.
    #[instrument(skip(self, request), err)]
    pub async fn preview_invoice(&self, request: &GenerateInvoice) -> WorkflowResult<InvoicePreview> {
        let window = request.validate()?;
        let (candidates, refs) = self.generation_inputs(&window).await?;
        Ok(preview(&window, &candidates, &refs))
    }

    /// Create a DRAFT invoice from every eligible ticket of the window.
    ///
    /// The number, the invoice, its lines and the ticket links are written by
    /// one store call, so a failure never consumes a number. A number taken by
    /// a concurrent writer retries the whole call; a ticket that became
    /// ineligible meanwhile fails the request with a conflict.
    #[instrument(skip(self, request), fields(customer_id = ?request.customer_id), err)]
    pub async fn generate_invoice(&self, request: &GenerateInvoice) -> WorkflowResult<InvoiceDetail> {
        let window = request.validate()?;
        let (candidates, refs) = self.generation_inputs(&window).await?;
        let now = self.clock.now();
        let plan = plan_invoice(&window, &candidates, &refs, now.date_naive())
            .inspect_err(|e| debug!(error = %e, "nothing to invoice"))?;

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            match self.invoices.create_invoice(&plan, InvoiceId::new(), now).await {
                Ok((invoice, lines)) => {
                    info!(
                        invoice_id = %invoice.id,
                        invoice_no = %invoice.invoice_no,
                        lines = lines.len(),
                        gross_total = %invoice.gross_total,
                        "invoice generated"
                    );
                    let tickets = self.tickets.tickets_for_invoice(invoice.id).await?;
                    let customer_name = self
                        .reference
                        .get_customer(invoice.customer_id)
                        .await?
                        .map(|c| c.name);
                    return Ok(InvoiceDetail {
                        invoice,
                        customer_name,
                        lines,
                        tickets,
                        voids: Vec::new(),
                    });
                }
                Err(StoreError::UniqueViolation(msg)) => {
                    debug!(attempt, %msg, "invoice number taken, drawing another");
                }
                Err(e @ StoreError::Conflict(_)) => {
                    info!(error = %e, "invoice generation lost a race for its tickets");
                    return Err(e.into());
                }
                Err(e) => return Err(generation_failed(&e)),
            }
        }
        error!(attempts = MAX_NUMBER_ATTEMPTS, "no free invoice number");
        Err(WorkflowError::Failed(GENERATION_FAILED_MESSAGE.into()))
    }

    pub async fn list_invoices(&self, query: &InvoiceQuery) -> WorkflowResult<Page<InvoiceSummary>> {
        Ok(self.invoices.list_invoices(query).await?)
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    pub async fn invoice_detail(&self, id: InvoiceId) -> WorkflowResult<InvoiceDetail> {
        let invoice = self.load_invoice(id).await?;
        let lines = self.invoices.invoice_lines(id).await?;
        let tickets = self.tickets.tickets_for_invoice(id).await?;
        let voids = self.invoices.invoice_voids(id).await?;
        let customer_name = self
            .reference
            .get_customer(invoice.customer_id)
            .await?
            .map(|c| c.name);
        Ok(InvoiceDetail { invoice, customer_name, lines, tickets, voids })
    }

    #[instrument(skip(self, request, actor), fields(invoice_id = %id), err)]
    pub async fn mark_invoice_paid(
        &self,
        id: InvoiceId,
        request: &PaymentRequest,
        actor: &Actor,
    ) -> WorkflowResult<Invoice> {
        let mut invoice = self.load_invoice(id).await?;
        check_expected(request.expected_version, &invoice)?;
        let loaded = invoice.version;

        let refs = self
            .snapshot_with_lookup(request.payment.payment_method_id.as_deref())
            .await?;
        invoice
            .mark_paid(&request.payment, &refs, actor, self.clock.now())
            .inspect_err(|e| debug!(error = %e, "mark paid rejected"))?;
        self.invoices.update_invoice(&invoice, loaded, None).await?;
        info!(invoice_no = %invoice.invoice_no, actor = %actor, "invoice marked paid");
        Ok(invoice)
    }

    #[instrument(skip(self, request, actor), fields(invoice_id = %id), err)]
    pub async fn void_invoice(
        &self,
        id: InvoiceId,
        request: &InvoiceVoidRequest,
        actor: &Actor,
    ) -> WorkflowResult<InvoiceVoidResult> {
        let mut invoice = self.load_invoice(id).await?;
        check_expected(request.expected_version, &invoice)?;
        let loaded = invoice.version;

        let refs = self
            .snapshot_with_lookup(request.void.void_reason_id.as_deref())
            .await?;
        let outcome = invoice
            .void(&request.void, &refs, actor, self.clock.now())
            .inspect_err(|e| debug!(error = %e, "invoice void rejected"))?;
        match outcome {
            InvoiceVoidOutcome::AlreadyVoid => Ok(InvoiceVoidResult { invoice, already_void: true }),
            InvoiceVoidOutcome::Voided(record) => {
                self.invoices.update_invoice(&invoice, loaded, Some(&record)).await?;
                info!(invoice_no = %invoice.invoice_no, actor = %actor, "invoice voided");
                Ok(InvoiceVoidResult { invoice, already_void: false })
            }
        }
    }
}

fn generation_failed(err: &StoreError) -> WorkflowError {
    error!(error = %err, "invoice generation failed");
    WorkflowError::Failed(GENERATION_FAILED_MESSAGE.into())
}
