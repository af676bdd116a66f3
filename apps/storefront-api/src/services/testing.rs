//! Fixtures shared by the service tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use storefront_core::order::{CreateOrderRequest, LineItemRequest};
use storefront_core::payment::{PaymentPayload, ProviderResult, StatusReport};
use storefront_core::{
    Address, InventoryPolicy, NewProduct, NotificationOutboxEntry, Order, Payment, PaymentMethod,
    PaymentStatus,
};
use storefront_db::{Database, DbConfig};

use super::notification::{Notifier, NotifyError};
use super::payment_service::{PaymentService, ProcessPaymentRequest};
use crate::config::AppConfig;
use crate::providers::{
    ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, ProviderRegistry, WebhookEvent,
};
use crate::AppState;

/// How the fake card gateway answers `charge`.
#[derive(Debug, Clone)]
pub enum ChargeScript {
    Pending,
    Completed,
    Decline(String),
    Error,
}

/// Card provider double. Webhooks authenticate with the signature `"valid"`
/// and carry a JSON [`StatusReport`].
pub struct FakeProvider {
    script: Mutex<ChargeScript>,
    statuses: Mutex<HashMap<String, ProviderResult>>,
    timeout: Mutex<Duration>,
    charges: AtomicUsize,
    fail_polls: AtomicBool,
}

impl FakeProvider {
    pub fn new(script: ChargeScript) -> Self {
        FakeProvider {
            script: Mutex::new(script),
            statuses: Mutex::new(HashMap::new()),
            timeout: Mutex::new(Duration::from_secs(1800)),
            charges: AtomicUsize::new(0),
            fail_polls: AtomicBool::new(false),
        }
    }

    pub fn script(&self, script: ChargeScript) {
        *self.script.lock().unwrap() = script;
    }

    /// What `retrieve_status` reports for `provider_ref` from now on.
    pub fn set_status(&self, provider_ref: &str, result: ProviderResult) {
        self.statuses
            .lock()
            .unwrap()
            .insert(provider_ref.to_string(), result);
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = timeout;
    }

    pub fn fail_polls(&self) {
        self.fail_polls.store(true, Ordering::SeqCst);
    }

    pub fn charges(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap()
    }

    async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeResponse, ProviderError> {
        let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
        let provider_ref = format!("fake_{n}");
        let script = self.script.lock().unwrap().clone();

        let result = match script {
            ChargeScript::Pending => ProviderResult::Pending { provider_ref },
            ChargeScript::Completed => ProviderResult::Completed { provider_ref },
            ChargeScript::Decline(reason) => ProviderResult::Failed { reason },
            ChargeScript::Error => {
                return Err(ProviderError::Rejected {
                    status: 500,
                    message: "gateway unavailable".to_string(),
                })
            }
        };
        Ok(ChargeResponse {
            client_secret: Some(format!("secret_{n}")),
            result,
        })
    }

    async fn retrieve_status(&self, provider_ref: &str) -> Result<ProviderResult, ProviderError> {
        if self.fail_polls.load(Ordering::SeqCst) {
            return Err(ProviderError::InvalidResponse("poll failed".to_string()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(provider_ref)
            .cloned()
            .unwrap_or_else(|| ProviderResult::Pending {
                provider_ref: provider_ref.to_string(),
            }))
    }

    fn parse_webhook(&self, signature: &str, body: &[u8]) -> Result<WebhookEvent, ProviderError> {
        if signature != "valid" {
            return Err(ProviderError::InvalidSignature("bad signature".to_string()));
        }
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if value.get("provider_ref").is_some() {
            let report: StatusReport = serde_json::from_value(value)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            return Ok(WebhookEvent::Report(report));
        }
        Ok(WebhookEvent::Ignored {
            event_type: value["type"].as_str().unwrap_or("unknown").to_string(),
        })
    }
}

/// Records delivered notifications; optionally fails every send.
#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        FakeNotifier {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent_for(&self, payment_id: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == payment_id)
            .count()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, entry: &NotificationOutboxEntry) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Status(503));
        }
        self.sent.lock().unwrap().push(entry.payment_id.clone());
        Ok(())
    }
}

pub fn test_config(policy: InventoryPolicy) -> AppConfig {
    AppConfig {
        database_path: PathBuf::from(":memory:"),
        db_max_connections: 1,
        inventory_policy: policy,
        frontend_url: "http://localhost:3000".to_string(),
        card: None,
        mobile_money: None,
        sweep_interval_secs: 60,
        notification_webhook_url: None,
    }
}

pub async fn state_with(
    script: ChargeScript,
    policy: InventoryPolicy,
) -> (Arc<AppState>, Arc<FakeProvider>) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    assemble(db, script, policy)
}

/// Same as [`test_state`] over a file-backed pool of several connections,
/// for tests that race writers. Keep the `TempDir` alive.
pub async fn file_state(script: ChargeScript) -> (Arc<AppState>, Arc<FakeProvider>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("storefront.db")).max_connections(8);
    let db = Database::new(config).await.unwrap();
    let (state, provider) = assemble(db, script, InventoryPolicy::OnPayment);
    (state, provider, dir)
}

fn assemble(
    db: Database,
    script: ChargeScript,
    policy: InventoryPolicy,
) -> (Arc<AppState>, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider::new(script));
    let mut providers = ProviderRegistry::new();
    providers.register(provider.clone());

    let state = AppState {
        db,
        providers,
        notifier: Arc::new(FakeNotifier::default()),
        config: test_config(policy),
    };
    (Arc::new(state), provider)
}

/// State with the fake card provider and the default inventory policy.
pub async fn test_state(script: ChargeScript) -> (Arc<AppState>, Arc<FakeProvider>) {
    state_with(script, InventoryPolicy::OnPayment).await
}

pub fn address() -> Address {
    Address {
        recipient_name: "Grace Hopper".to_string(),
        phone: None,
        line1: "1 Harbour St".to_string(),
        line2: None,
        city: "Kigali".to_string(),
        region: None,
        postal_code: None,
        country: "RW".to_string(),
    }
}

pub fn new_product(sku: &str, price_cents: i64, stock: i64) -> NewProduct {
    NewProduct {
        sku: sku.to_string(),
        name: format!("{sku} item"),
        description: None,
        price_cents,
        initial_stock: stock,
        low_stock_threshold: None,
        is_featured: false,
    }
}

pub fn order_request(product_id: &str, quantity: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: "cust-1".to_string(),
        items: vec![LineItemRequest {
            product_id: product_id.to_string(),
            quantity,
        }],
        shipping_address: address(),
        tax_cents: 0,
        shipping_cents: 0,
        discount_cents: 0,
        currency: None,
        notes: None,
        total_cents: None,
    }
}

/// A one-line order for `qty` of a fresh product holding `stock` units.
pub async fn order_for(state: &AppState, stock: i64, qty: i64) -> (Order, String) {
    let product = state
        .db
        .products()
        .insert(&new_product("TEE", 1000, stock))
        .await
        .unwrap();
    let details = state
        .db
        .orders()
        .create(&order_request(&product.id, qty), state.config.inventory_policy)
        .await
        .unwrap();
    (details.order, product.id)
}

pub fn card_request(order_id: &str) -> ProcessPaymentRequest {
    ProcessPaymentRequest {
        order_id: order_id.to_string(),
        method: PaymentMethod::Card,
        payload: PaymentPayload::Card {
            payment_method_id: "pm_card_visa".to_string(),
            card_holder: Some("Grace Hopper".to_string()),
            save_card: false,
        },
        customer_id: None,
    }
}

pub fn report(provider_ref: &str, status: PaymentStatus) -> StatusReport {
    StatusReport {
        provider_ref: provider_ref.to_string(),
        status,
        reason: None,
    }
}

/// An order settled by a synchronously completed card charge.
pub async fn paid_order(notifier: Arc<FakeNotifier>) -> (Arc<AppState>, Payment) {
    let (state, _) = test_state(ChargeScript::Completed).await;
    let state = Arc::new(AppState {
        db: state.db.clone(),
        providers: state.providers.clone(),
        notifier,
        config: state.config.clone(),
    });
    let (order, _) = order_for(&state, 5, 1).await;
    let payment = PaymentService::new(state.clone())
        .initiate(&card_request(&order.id))
        .await
        .unwrap()
        .payment;
    assert_eq!(payment.status, PaymentStatus::Completed);
    (state, payment)
}
