//! Cross-crate scenarios: ledger + workflow + publish engine over the
//! in-memory stores.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use atelier_catalog::ProductId;
use atelier_core::{AggregateId, FixedClock, TenantId};
use atelier_production::{ArticleStatus, ChargeKind, ProductionError};
use atelier_stock::{ConsumptionPolicy, ConsumptionReason, RestockSource};

use crate::in_memory::{InMemoryBatchStore, InMemoryCatalog, InMemoryProductionStore};
use crate::ledger::StockLedger;
use crate::publish::{ArticlePublishRequest, EngineError, PublishEngine, PublishRequest};
use crate::store::{CatalogSink, StoreError};
use crate::workflow::ProductionService;

struct World {
    tenant_id: TenantId,
    ledger: StockLedger<InMemoryBatchStore>,
    service: ProductionService<InMemoryProductionStore>,
    engine: PublishEngine<InMemoryBatchStore, InMemoryProductionStore, InMemoryCatalog>,
    catalog: Arc<InMemoryCatalog>,
}

fn world() -> World {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let batches = Arc::new(InMemoryBatchStore::new());
    let productions = Arc::new(InMemoryProductionStore::new());
    let catalog = Arc::new(InMemoryCatalog::new());

    World {
        tenant_id: TenantId::new(),
        ledger: StockLedger::new(Arc::clone(&batches), clock.clone()),
        service: ProductionService::new(Arc::clone(&productions), clock.clone()),
        engine: PublishEngine::new(batches, productions, Arc::clone(&catalog), clock),
        catalog,
    }
}

fn request(selling_price: i64, stock_quantity: i64) -> PublishRequest {
    PublishRequest {
        selling_price,
        stock_quantity,
        category: None,
        description: None,
        policy: ConsumptionPolicy::Fifo,
    }
}

fn article_request(selling_price: i64) -> ArticlePublishRequest {
    ArticlePublishRequest {
        selling_price,
        category: None,
        description: None,
        policy: ConsumptionPolicy::Fifo,
    }
}

fn seeded_material(w: &World, quantity: i64, cost: i64) -> ProductId {
    let product_id = ProductId::new(AggregateId::new());
    w.ledger
        .restock(w.tenant_id, product_id, quantity, cost, RestockSource::Purchase)
        .unwrap();
    product_id
}

#[test]
fn publish_materializes_product_and_debits_materials() {
    let w = world();
    let flour = seeded_material(&w, 5, 100);
    let butter = seeded_material(&w, 5, 300);

    let production_id = w.service.create(w.tenant_id, "Croissants".to_string()).unwrap();
    w.service
        .add_material(w.tenant_id, production_id, flour, 3, 200, "kg".to_string())
        .unwrap();
    w.service
        .add_material(w.tenant_id, production_id, butter, 2, 150, "kg".to_string())
        .unwrap();
    w.service
        .attach_charge(
            w.tenant_id,
            production_id,
            ChargeKind::Fixed,
            "Electricity".to_string(),
            500,
            None,
        )
        .unwrap();

    // effective cost = 3*200 + 2*150 + 500 = 1400, spread over 10 units.
    let product_id = w
        .engine
        .publish(w.tenant_id, production_id, request(900, 10))
        .unwrap();

    let record = w.catalog.get_product(w.tenant_id, product_id).unwrap();
    assert_eq!(record.name, "Croissants");
    assert_eq!(record.cost_price, 140);
    assert_eq!(record.selling_price, 900);

    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, flour).unwrap(), 2);
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, butter).unwrap(), 3);
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, product_id).unwrap(), 10);

    let production = w.service.get(w.tenant_id, production_id).unwrap();
    assert!(production.is_published());
    assert_eq!(production.published_product_id(), Some(product_id));

    // Second publish is refused.
    let err = w
        .engine
        .publish(w.tenant_id, production_id, request(900, 10))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Production(ProductionError::AlreadyPublished)
    ));
}

#[test]
fn short_material_aborts_publish_with_nothing_committed() {
    let w = world();
    let flour = seeded_material(&w, 5, 100);
    let butter = seeded_material(&w, 1, 300);

    let production_id = w.service.create(w.tenant_id, "Croissants".to_string()).unwrap();
    w.service
        .add_material(w.tenant_id, production_id, flour, 3, 200, "kg".to_string())
        .unwrap();
    w.service
        .add_material(w.tenant_id, production_id, butter, 2, 150, "kg".to_string())
        .unwrap();

    let err = w
        .engine
        .publish(w.tenant_id, production_id, request(900, 10))
        .unwrap_err();
    match err {
        EngineError::InsufficientMaterials(shortfalls) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].product_id, butter);
            assert_eq!(shortfalls[0].required, 2);
            assert_eq!(shortfalls[0].available, 1);
            assert_eq!(shortfalls[0].shortfall, 1);
        }
        other => panic!("expected InsufficientMaterials, got {other:?}"),
    }

    // No partial debit, no product, no publish flag.
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, flour).unwrap(), 5);
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, butter).unwrap(), 1);
    assert!(!w.service.get(w.tenant_id, production_id).unwrap().is_published());
}

#[test]
fn cost_snapshot_survives_later_batch_repricing() {
    let w = world();
    let flour_id = ProductId::new(AggregateId::new());
    let batch_id = w
        .ledger
        .restock(w.tenant_id, flour_id, 10, 250, RestockSource::Purchase)
        .unwrap();

    let production_id = w.service.create(w.tenant_id, "Boules".to_string()).unwrap();
    w.service
        .add_material(w.tenant_id, production_id, flour_id, 4, 250, "kg".to_string())
        .unwrap();

    // Repricing the live batch after the snapshot was taken.
    w.ledger
        .adjust_batch(w.tenant_id, flour_id, batch_id, 0, Some(999))
        .unwrap();

    // effective cost stays 4*250 = 1000, over 2 units.
    let product_id = w
        .engine
        .publish(w.tenant_id, production_id, request(1200, 2))
        .unwrap();
    let record = w.catalog.get_product(w.tenant_id, product_id).unwrap();
    assert_eq!(record.cost_price, 500);
}

#[test]
fn cost_gate_requires_validation_before_publish() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let batches = Arc::new(InMemoryBatchStore::new());
    let productions = Arc::new(InMemoryProductionStore::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let tenant_id = TenantId::new();

    let ledger = StockLedger::new(Arc::clone(&batches), clock.clone());
    let service = ProductionService::new(Arc::clone(&productions), clock.clone());
    let engine = PublishEngine::new(batches, productions, Arc::clone(&catalog), clock)
        .with_required_cost_validation();

    let flour = ProductId::new(AggregateId::new());
    ledger
        .restock(tenant_id, flour, 10, 100, RestockSource::Purchase)
        .unwrap();

    let production_id = service.create(tenant_id, "Boules".to_string()).unwrap();
    service
        .add_material(tenant_id, production_id, flour, 2, 100, "kg".to_string())
        .unwrap();

    let err = engine
        .publish(tenant_id, production_id, request(500, 2))
        .unwrap_err();
    assert!(matches!(err, EngineError::CostNotValidated));

    service.validate_cost(tenant_id, production_id, 400).unwrap();
    let product_id = engine
        .publish(tenant_id, production_id, request(500, 2))
        .unwrap();
    // Validated amount (400 over 2 units) wins over the calculated 200.
    let record = catalog.get_product(tenant_id, product_id).unwrap();
    assert_eq!(record.cost_price, 200);
}

#[test]
fn article_publish_debits_materials_pro_rata() {
    let w = world();
    let dough = seeded_material(&w, 30, 50);

    let production_id = w.service.create(w.tenant_id, "Bread day".to_string()).unwrap();
    w.service
        .add_material(w.tenant_id, production_id, dough, 30, 50, "kg".to_string())
        .unwrap();
    w.service.validate_cost(w.tenant_id, production_id, 3000).unwrap();

    let boule = w
        .service
        .add_article(w.tenant_id, production_id, "Boule".to_string(), 10)
        .unwrap();
    w.service
        .add_article(w.tenant_id, production_id, "Baguette".to_string(), 20)
        .unwrap();
    w.service
        .change_article_status(w.tenant_id, production_id, boule, ArticleStatus::Ready, None)
        .unwrap();

    let product_id = w
        .engine
        .publish_article(w.tenant_id, production_id, boule, article_request(700))
        .unwrap();

    // Boule holds 10 of 30 units: debit 30 × 10/30 = 10; unit cost 3000/30.
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, dough).unwrap(), 20);
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, product_id).unwrap(), 10);
    let record = w.catalog.get_product(w.tenant_id, product_id).unwrap();
    assert_eq!(record.name, "Boule");
    assert_eq!(record.cost_price, 100);

    let production = w.service.get(w.tenant_id, production_id).unwrap();
    assert_eq!(production.published_articles_count(), 1);
    assert!(!production.is_published());
}

#[test]
fn bulk_article_publish_reports_per_item_outcomes() {
    let w = world();
    let dough = seeded_material(&w, 20, 50);

    let production_id = w.service.create(w.tenant_id, "Bread day".to_string()).unwrap();
    w.service
        .add_material(w.tenant_id, production_id, dough, 20, 50, "kg".to_string())
        .unwrap();

    let ready = w
        .service
        .add_article(w.tenant_id, production_id, "Boule".to_string(), 10)
        .unwrap();
    let still_draft = w
        .service
        .add_article(w.tenant_id, production_id, "Baguette".to_string(), 10)
        .unwrap();
    w.service
        .change_article_status(w.tenant_id, production_id, ready, ArticleStatus::Ready, None)
        .unwrap();

    let outcomes = w.engine.bulk_publish_articles(
        w.tenant_id,
        production_id,
        &[ready, still_draft],
        &article_request(700),
    );

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].1.is_ok());
    assert!(matches!(
        outcomes[1].1,
        Err(EngineError::Production(ProductionError::InvariantViolation(_)))
    ));

    // The failed item did not roll back the successful one.
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, dough).unwrap(), 10);
}

#[test]
fn produce_then_sell_consumes_the_published_batch() {
    let w = world();
    let flour = seeded_material(&w, 10, 100);

    let production_id = w.service.create(w.tenant_id, "Boules".to_string()).unwrap();
    w.service
        .add_material(w.tenant_id, production_id, flour, 5, 100, "kg".to_string())
        .unwrap();

    let product_id = w
        .engine
        .publish(w.tenant_id, production_id, request(300, 10))
        .unwrap();

    let trace = w
        .ledger
        .consume(
            w.tenant_id,
            product_id,
            4,
            ConsumptionPolicy::Fifo,
            ConsumptionReason::Sale,
        )
        .unwrap();

    // The sale is costed from the publish-created batch (unit cost 500/10 = 50).
    assert_eq!(trace.total_cost(), 4 * 50);
    assert_eq!(w.ledger.stock_on_hand(w.tenant_id, product_id).unwrap(), 6);
}

#[test]
fn unknown_production_surfaces_store_not_found() {
    let w = world();
    let err = w
        .engine
        .publish(
            w.tenant_id,
            atelier_production::ProductionId::new(AggregateId::new()),
            request(100, 1),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::NotFound)));
}
