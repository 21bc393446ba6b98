use std::sync::Arc;

use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use weighbridge_api::app::{AppServices, build_app};
use weighbridge_core::{Clock, FixedClock};
use weighbridge_infra::Settings;

const ACTOR: &str = "operator";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        weighbridge_observability::init_for_tests();
        // Same router as prod, over seeded in-memory stores and a fixed clock.
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap(),
        ));
        let services = AppServices::in_memory(Settings::default(), clock)
            .await
            .expect("failed to seed in-memory stores");
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, client: reqwest::Client::new(), handle }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("x-actor", ACTOR)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("x-actor", ACTOR)
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Customer, owned vehicle, haulier and a 50.00 product taxed at 20%.
struct Reference {
    customer_id: String,
    vehicle_id: String,
    product_id: String,
    haulier_id: String,
}

async fn seed_reference(srv: &TestServer) -> Reference {
    let (status, tax) = srv
        .post("/lookups/tax-rate", json!({ "code": "std", "rate_percent": "20" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{tax}");

    let (status, customer) = srv
        .post("/customers", json!({ "account_code": "acme", "name": "Acme Skips" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{customer}");
    assert_eq!(customer["account_code"], "ACME");

    let (status, vehicle) = srv
        .post(
            "/vehicles",
            json!({ "registration": "ab12 cde", "owner_customer_id": customer["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{vehicle}");

    let (status, product) = srv
        .post(
            "/products",
            json!({
                "code": "mixed",
                "description": "Mixed waste",
                "unit_price": "50",
                "tax_rate_id": tax["id"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");

    let (status, haulier) = srv.post("/lookups/haulier", json!({ "code": "haul1" })).await;
    assert_eq!(status, StatusCode::CREATED, "{haulier}");

    Reference {
        customer_id: customer["id"].as_str().unwrap().to_string(),
        vehicle_id: vehicle["id"].as_str().unwrap().to_string(),
        product_id: product["id"].as_str().unwrap().to_string(),
        haulier_id: haulier["id"].as_str().unwrap().to_string(),
    }
}

fn complete_form(r: &Reference) -> Value {
    json!({
        "action": "complete",
        "datetime": "2026-03-14T09:00",
        "direction": "INWARD",
        "transaction_type": "WASTEIN",
        "vehicle_id": r.vehicle_id,
        "product_id": r.product_id,
        "haulier_id": r.haulier_id,
        "gross_kg": "3000",
        "tare_kg": "1000",
        "qty": "2",
    })
}

#[tokio::test]
async fn actor_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(format!("{}/tickets", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(format!("{}/whoami", srv.base_url))
        .header("x-actor", "  ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn write_without_actor_never_reaches_the_handler() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(format!("{}/tickets/quick", srv.base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, page) = srv.get("/tickets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 0);

    // The first ticket still gets the first number.
    let (status, created) = srv.post("/tickets/quick", json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["ticket"]["ticket_no"], "26-00001");
}

#[tokio::test]
async fn whoami_reports_actor_and_backend() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actor"], ACTOR);
    assert_eq!(body["backend"], "in-memory");
}

#[tokio::test]
async fn quick_create_numbers_and_dedups_within_window() {
    let srv = TestServer::spawn().await;

    let (status, first) = srv.post("/tickets/quick", json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["ticket"]["ticket_no"], "26-00001");
    assert_eq!(first["ticket"]["status"], "OPEN");

    // The clock is frozen, so the second press lands inside the dedup window.
    let (status, again) = srv.post("/tickets/quick", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["created"], false);
    assert_eq!(again["ticket"]["id"], first["ticket"]["id"]);

    let (status, page) = srv.get("/tickets?status=OPEN").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 1);
}

#[tokio::test]
async fn tare_before_gross_is_rejected() {
    let srv = TestServer::spawn().await;
    let (_, created) = srv.post("/tickets/quick", json!({})).await;
    let id = created["ticket"]["id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .post(&format!("/tickets/{id}/weights/tare"), json!({ "weight_kg": "1200" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["errors"][0], "Weigh-in (gross) is required before tare.");

    let (status, body) = srv
        .post(&format!("/tickets/{id}/weights/gross"), json!({ "weight_kg": "3000" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticket"]["gross_kg"], "3000");
}

#[tokio::test]
async fn completed_ticket_is_locked_and_invoiced() {
    let srv = TestServer::spawn().await;
    let r = seed_reference(&srv).await;

    let (_, created) = srv.post("/tickets/quick", json!({})).await;
    let id = created["ticket"]["id"].as_str().unwrap().to_string();

    let (status, done) = srv.post(&format!("/tickets/{id}"), complete_form(&r)).await;
    assert_eq!(status, StatusCode::OK, "{done}");
    assert_eq!(done["ticket"]["status"], "COMPLETE");
    assert_eq!(done["ticket"]["customer_id"], r.customer_id.as_str());
    assert_eq!(done["ticket"]["total"], "100.00");

    let mut edit = complete_form(&r);
    edit["action"] = json!("save");
    edit["qty"] = json!("5");
    let (status, body) = srv.post(&format!("/tickets/{id}"), edit).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "locked");

    let window = json!({
        "customer_id": r.customer_id,
        "date_from": "2026-03-14",
        "date_to": "2026-03-14",
    });
    let (status, preview) = srv.post("/invoices/preview", window.clone()).await;
    assert_eq!(status, StatusCode::OK, "{preview}");

    let (status, detail) = srv.post("/invoices/generate", window.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{detail}");
    assert_eq!(detail["invoice"]["invoice_no"], "INV-26-00001");
    assert_eq!(detail["invoice"]["net_total"], "100.00");
    assert_eq!(detail["invoice"]["vat_total"], "20.00");
    assert_eq!(detail["invoice"]["gross_total"], "120.00");
    assert_eq!(detail["lines"].as_array().unwrap().len(), 1);

    let (_, view) = srv.get(&format!("/tickets/{id}")).await;
    assert_eq!(view["ticket"]["invoice_id"], detail["invoice"]["id"]);

    let (status, body) = srv.post("/invoices/generate", window).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0], "No invoiceable tickets found.");
}

#[tokio::test]
async fn referenced_haulier_cannot_be_deactivated() {
    let srv = TestServer::spawn().await;
    let r = seed_reference(&srv).await;

    let (_, created) = srv.post("/tickets/quick", json!({})).await;
    let id = created["ticket"]["id"].as_str().unwrap().to_string();
    let mut form = complete_form(&r);
    form["action"] = json!("save");
    let (status, _) = srv.post(&format!("/tickets/{id}"), form).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .post(&format!("/lookups/haulier/{}/deactivate", r.haulier_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Cannot deactivate: in use by tickets.");

    let (_, list) = srv.get("/lookups/haulier").await;
    let haulier = list["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["id"] == r.haulier_id.as_str())
        .cloned()
        .unwrap();
    assert_eq!(haulier["is_active"], true);
}

#[tokio::test]
async fn unknown_ids_and_tables_are_reported() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get("/tickets/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, _) = srv.get(&format!("/invoices/{}", uuid_like())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv.get("/lookups/colours").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let res = srv
        .client
        .get(format!("{}/tickets/product-defaults", srv.base_url))
        .header("x-actor", ACTOR)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

fn uuid_like() -> String {
    weighbridge_core::InvoiceId::new().to_string()
}
