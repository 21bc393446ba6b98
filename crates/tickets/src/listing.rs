//! Ticket list filters, ordering and pagination.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{Direction, TicketStatus, TransactionType};
use crate::ticket::Ticket;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketQuery {
    /// Inclusive, whole days.
    pub date_from: Option<NaiveDate>,
    /// Inclusive, whole days.
    pub date_to: Option<NaiveDate>,
    pub status: Option<TicketStatus>,
    pub direction: Option<Direction>,
    pub transaction_type: Option<TransactionType>,
    /// Case-insensitive substring of the ticket number.
    pub ticket_no: Option<String>,
    /// Case-insensitive substring of ticket number, vehicle registration or customer name.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Names joined onto a ticket for free-text search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchContext<'a> {
    pub vehicle_registration: Option<&'a str>,
    pub customer_name: Option<&'a str>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl TicketQuery {
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn requested_page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn ticket_no_filter(&self) -> Option<&str> {
        non_blank(&self.ticket_no)
    }

    pub fn search_text(&self) -> Option<&str> {
        non_blank(&self.q)
    }

    /// Start of `date_from` (inclusive lower bound).
    pub fn from_instant(&self) -> Option<DateTime<Utc>> {
        self.date_from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| n.and_utc())
    }

    /// Start of the day after `date_to` (exclusive upper bound).
    pub fn until_instant(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| n.and_utc())
    }

    pub fn matches(&self, ticket: &Ticket, ctx: SearchContext<'_>) -> bool {
        if self.from_instant().is_some_and(|from| ticket.datetime < from) {
            return false;
        }
        if self.until_instant().is_some_and(|until| ticket.datetime >= until) {
            return false;
        }
        if self.status.is_some_and(|s| s != ticket.status) {
            return false;
        }
        if self.direction.is_some_and(|d| d != ticket.direction) {
            return false;
        }
        if self.transaction_type.is_some_and(|t| t != ticket.transaction_type) {
            return false;
        }
        if let Some(no) = self.ticket_no_filter() {
            if !contains_ci(&ticket.ticket_no, no) {
                return false;
            }
        }
        if let Some(q) = self.search_text() {
            let hit = contains_ci(&ticket.ticket_no, q)
                || ctx.vehicle_registration.is_some_and(|r| contains_ci(r, q))
                || ctx.customer_name.is_some_and(|n| contains_ci(n, q));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Newest first; OPEN before COMPLETE before VOID at the same instant.
pub fn list_order(a: &Ticket, b: &Ticket) -> core::cmp::Ordering {
    b.datetime
        .cmp(&a.datetime)
        .then_with(|| a.status.priority().cmp(&b.status.priority()))
        .then_with(|| b.ticket_no.cmp(&a.ticket_no))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
}

impl PageWindow {
    /// Clamp the requested page to the last available page (at least 1).
    pub fn new(requested_page: u32, page_size: u32, total_count: u64) -> Self {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let pages = total_count.div_ceil(u64::from(page_size)).max(1);
        let total_pages = u32::try_from(pages).unwrap_or(u32::MAX);
        Self {
            page: requested_page.clamp(1, total_pages),
            page_size,
            total_count,
            total_pages,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(flatten)]
    pub window: PageWindow,
}
