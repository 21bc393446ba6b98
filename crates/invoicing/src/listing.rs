//! Invoice list filter and ordering.

use serde::{Deserialize, Serialize};

use weighbridge_tickets::listing::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use crate::invoice::{Invoice, InvoiceStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceQuery {
    /// Case-insensitive substring of invoice number or customer name.
    pub q: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl InvoiceQuery {
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn requested_page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn search_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches(&self, invoice: &Invoice, customer_name: Option<&str>) -> bool {
        if self.status.is_some_and(|s| s != invoice.status) {
            return false;
        }
        match self.search_text() {
            None => true,
            Some(q) => {
                let q = q.to_lowercase();
                invoice.invoice_no.to_lowercase().contains(&q)
                    || customer_name.is_some_and(|n| n.to_lowercase().contains(&q))
            }
        }
    }
}

/// Newest invoice date first, then highest number.
pub fn invoice_list_order(a: &Invoice, b: &Invoice) -> core::cmp::Ordering {
    b.invoice_date
        .cmp(&a.invoice_date)
        .then_with(|| b.invoice_no.cmp(&a.invoice_no))
}

/// Row shown in the invoice list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub customer_name: Option<String>,
}
