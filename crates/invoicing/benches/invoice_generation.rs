use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use weighbridge_core::{CustomerId, LookupId, ProductId, TicketId};
use weighbridge_invoicing::{GenerationWindow, InvoiceTotals, line_amounts, plan_invoice, preview};
use weighbridge_reference::{Lookup, LookupKind, Product, ReferenceSnapshot};
use weighbridge_tickets::{Ticket, TicketStatus};

struct Fixture {
    window: GenerationWindow,
    tickets: Vec<Ticket>,
    refs: ReferenceSnapshot,
}

/// `count` tickets for one customer; every tenth one is not invoiceable.
fn fixture(count: usize) -> Fixture {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 6, 0, 0).unwrap();
    let customer = CustomerId::new();
    let rate = Lookup {
        id: LookupId::new(),
        kind: LookupKind::TaxRate,
        code: "STD".into(),
        description: None,
        rate_percent: Some(Decimal::from(20)),
        is_active: true,
        created_at: start,
        updated_at: start,
    };
    let product = Product {
        id: ProductId::new(),
        code: "SOIL".into(),
        description: "Soil and stones".into(),
        unit_id: None,
        unit_price: Some(Decimal::new(1275, 2)),
        tax_rate_id: Some(rate.id),
        is_active: true,
        created_at: start,
    };

    let tickets = (0..count)
        .map(|i| {
            let at = start + Duration::minutes(i as i64 * 7);
            let mut t = Ticket::quick(TicketId::new(), format!("26-{:05}", i + 1), at);
            t.status = if i % 10 == 9 { TicketStatus::Open } else { TicketStatus::Complete };
            t.customer_id = Some(customer);
            t.product_id = Some(product.id);
            let qty = Decimal::new(1000 + (i as i64 % 997), 3);
            t.qty = Some(qty);
            t.unit_price = product.unit_price;
            t.total = Some(qty * Decimal::new(1275, 2));
            t
        })
        .collect();

    Fixture {
        window: GenerationWindow { customer_id: customer, date_from: None, date_to: None },
        tickets,
        refs: ReferenceSnapshot::new().with_lookup(rate).with_product(product),
    }
}

fn bench_line_amounts(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_amounts");
    group.throughput(Throughput::Elements(1));
    group.bench_function("twenty_percent", |b| {
        b.iter(|| line_amounts(black_box(Decimal::new(123_456, 3)), black_box(Some(Decimal::from(20)))))
    });
    group.finish();
}

fn bench_totals(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_totals");
    for size in [100usize, 1_000, 10_000] {
        let amounts: Vec<_> = (0..size)
            .map(|i| line_amounts(Decimal::new(i as i64 * 37 + 1, 2), Some(Decimal::from(20))))
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("sum", size), &amounts, |b, amounts| {
            b.iter(|| InvoiceTotals::from_amounts(black_box(amounts)))
        });
    }
    group.finish();
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_generation");
    let today = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
    for size in [100usize, 1_000, 10_000] {
        let f = fixture(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("preview", size), &f, |b, f| {
            b.iter(|| preview(black_box(&f.window), black_box(&f.tickets), &f.refs))
        });
        group.bench_with_input(BenchmarkId::new("plan", size), &f, |b, f| {
            b.iter(|| plan_invoice(black_box(&f.window), black_box(&f.tickets), &f.refs, today))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_line_amounts, bench_totals, bench_generation);
criterion_main!(benches);
