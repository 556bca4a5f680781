use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use wealth_metrics_lib::models::{
    CashHolding, InvestmentHolding, KpiPayload, LinkStatus, Period, Scope, SourceGeneration, SubjectRole,
};
use wealth_metrics_lib::{MetricsEngine, Relation};

fn engine_with(relations: &[Relation]) -> (tempfile::TempDir, MetricsEngine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = MetricsEngine::open(&dir.path().join("metrics.db")).expect("engine");
    for relation in relations {
        engine.install_relation(*relation).expect("install");
    }
    (dir, engine)
}

fn cash(owner: &str, generation: SourceGeneration, amount: Decimal) -> CashHolding {
    CashHolding {
        owner_id: owner.to_string(),
        generation,
        amount,
        recorded_at: Utc::now() - Duration::minutes(5),
    }
}

fn investment(owner: &str, kind: Option<&str>, value: Decimal) -> InvestmentHolding {
    InvestmentHolding {
        owner_id: owner.to_string(),
        generation: SourceGeneration::Aggregator,
        asset_type: kind.map(ToString::to_string),
        quantity: Decimal::ONE,
        current_value: value,
        recorded_at: Utc::now() - Duration::minutes(5),
    }
}

fn dashboard(engine: &MetricsEngine, scope: Scope) -> KpiPayload {
    engine
        .dashboard(&scope, &Period::current_month(Utc::now()))
        .expect("dashboard")
        .data()
        .expect("allowed")
}

fn book(consultant_id: &str) -> Scope {
    Scope::ConsultantBook {
        consultant_id: consultant_id.to_string(),
    }
}

#[test]
fn aggregator_generation_is_never_summed_with_legacy() {
    let (_dir, engine) = engine_with(&[Relation::ConnectedAccounts, Relation::LedgerAccounts]);
    engine
        .record_cash_holding(&cash("c1", SourceGeneration::Aggregator, Decimal::new(100_000, 2)))
        .expect("aggregator cash");
    engine
        .record_cash_holding(&cash("c1", SourceGeneration::Legacy, Decimal::from(500)))
        .expect("legacy cash");

    let snapshot = engine.snapshot("c1").expect("snapshot");
    assert_eq!(snapshot.cash, Decimal::new(100_000, 2));

    let value = serde_json::to_value(snapshot).expect("serialize");
    for field in ["cash", "investments", "debt", "netWorth"] {
        assert!(value[field].is_number(), "{field} must be a number");
    }
}

#[test]
fn platform_dashboard_without_payments_keeps_user_figures() {
    let (_dir, engine) = engine_with(&[Relation::ConnectedAccounts]);
    engine
        .register_subject("c1", "Carla", SubjectRole::Customer)
        .expect("customer");
    engine
        .register_subject("k1", "Kofi", SubjectRole::Consultant)
        .expect("consultant");
    engine
        .register_subject("a1", "Ada", SubjectRole::Admin)
        .expect("admin");
    engine.set_blocked("c1", true).expect("block");

    let payload = dashboard(&engine, Scope::Platform);
    let revenue = payload.revenue.expect("revenue");
    assert_eq!(revenue.total, Decimal::ZERO);
    assert_eq!(revenue.growth, Decimal::ZERO);
    assert!(revenue.monthly.is_empty());

    let users = payload.users.expect("users");
    assert_eq!((users.customers, users.consultants, users.admins), (1, 1, 1));
    assert_eq!(users.blocked, 1);
    assert_eq!(users.new_in_period, 3);
    assert_eq!(users.new_users_growth, Decimal::ONE_HUNDRED);
}

#[test]
fn platform_revenue_compares_with_previous_period() {
    let (_dir, engine) = engine_with(&[Relation::Payments]);
    let period = Period::month(2025, 6).expect("period");
    let paid = |month: u32, day: u32| Utc.with_ymd_and_hms(2025, month, day, 14, 30, 0).single().expect("timestamp");
    for (cents, paid_at) in [(15_000, paid(6, 12)), (10_000, paid(5, 20)), (4_000, paid(2, 3)), (9_900, paid(7, 1))] {
        engine
            .record_payment("c1", Decimal::new(cents, 2), paid_at)
            .expect("payment");
    }

    let payload = engine
        .dashboard(&Scope::Platform, &period)
        .expect("dashboard")
        .data()
        .expect("allowed");
    let revenue = payload.revenue.expect("revenue");
    assert_eq!(revenue.total, Decimal::new(15_000, 2));
    assert_eq!(revenue.previous_total, Decimal::new(10_000, 2));
    assert_eq!(revenue.growth, Decimal::from(50));
    assert_eq!(revenue.monthly.len(), 12);
    assert_eq!(revenue.monthly[1].total, Decimal::new(4_000, 2));
    assert_eq!(revenue.monthly[6].total, Decimal::new(9_900, 2));
}

#[test]
fn book_only_counts_active_shared_clients() {
    let (_dir, engine) = engine_with(&[Relation::ConnectedAccounts]);
    for (customer, amount) in [("c1", 100), ("c2", 200), ("c3", 400)] {
        engine
            .record_cash_holding(&cash(customer, SourceGeneration::Aggregator, Decimal::from(amount)))
            .expect("cash");
    }
    engine.invite_client("k1", "c1", true).expect("invite");
    engine.invite_client("k1", "c2", false).expect("invite");
    engine.invite_client("k1", "c3", true).expect("invite");
    engine
        .update_link_status("k1", "c1", LinkStatus::Active)
        .expect("activate");
    engine
        .update_link_status("k1", "c2", LinkStatus::Active)
        .expect("activate");

    let payload = dashboard(&engine, book("k1"));
    assert_eq!(payload.snapshot.cash, Decimal::from(100));
    let clients = payload.clients.expect("client counts");
    assert_eq!((clients.active, clients.pending, clients.visible), (2, 1, 1));
}

#[test]
fn writes_are_visible_on_the_next_read() {
    let (_dir, engine) = engine_with(&[Relation::ConnectedAccounts]);
    engine
        .record_cash_holding(&cash("c1", SourceGeneration::Aggregator, Decimal::from(100)))
        .expect("cash");
    engine.invite_client("k1", "c1", true).expect("invite");
    engine
        .update_link_status("k1", "c1", LinkStatus::Active)
        .expect("activate");

    assert_eq!(dashboard(&engine, book("k1")).snapshot.cash, Decimal::from(100));
    assert_eq!(dashboard(&engine, Scope::Platform).snapshot.cash, Decimal::from(100));

    engine
        .record_cash_holding(&cash("c1", SourceGeneration::Aggregator, Decimal::from(50)))
        .expect("cash");
    assert_eq!(dashboard(&engine, book("k1")).snapshot.cash, Decimal::from(150));
    assert_eq!(dashboard(&engine, Scope::Platform).snapshot.cash, Decimal::from(150));

    engine.set_link_visibility("k1", "c1", false).expect("hide");
    assert_eq!(dashboard(&engine, book("k1")).snapshot.cash, Decimal::ZERO);

    engine.disconnect_client("k1", "c1").expect("disconnect");
    assert_eq!(dashboard(&engine, book("k1")).clients.expect("counts").active, 0);
}

#[test]
fn consultant_client_dashboard_is_refused_not_zeroed() {
    let (_dir, engine) = engine_with(&[Relation::ConnectedAccounts]);
    engine
        .record_cash_holding(&cash("c1", SourceGeneration::Aggregator, Decimal::from(100)))
        .expect("cash");
    engine.invite_client("k1", "c1", true).expect("invite");

    let scope = Scope::ConsultantClient {
        consultant_id: "k1".to_string(),
        customer_id: "c1".to_string(),
    };
    let period = Period::current_month(Utc::now());
    let pending = engine.dashboard(&scope, &period).expect("dashboard");
    let value = serde_json::to_value(&pending).expect("serialize");
    assert_eq!(value["status"], "denied");
    assert_eq!(value["decision"]["reason"], "link_pending");

    engine
        .update_link_status("k1", "c1", LinkStatus::Active)
        .expect("activate");
    let payload = engine
        .dashboard(&scope, &period)
        .expect("dashboard")
        .data()
        .expect("allowed");
    assert_eq!(payload.snapshot.cash, Decimal::from(100));
    assert_eq!(payload.scope, "consultant:k1:client:c1");
}

#[test]
fn breakdown_totals_match_investments() {
    let (_dir, engine) = engine_with(&[Relation::ConnectedInvestments]);
    engine
        .record_investment_holding(&investment("c1", Some("stock"), Decimal::new(30_050, 2)))
        .expect("stock");
    engine
        .record_investment_holding(&investment("c1", None, Decimal::new(9_950, 2)))
        .expect("untyped");
    engine
        .record_investment_holding(&investment("c1", Some("unknown"), Decimal::from(20)))
        .expect("unknown");

    let payload = dashboard(
        &engine,
        Scope::Customer {
            customer_id: "c1".to_string(),
        },
    );
    let other = payload
        .breakdown
        .iter()
        .find(|entry| entry.kind == "other")
        .expect("other bucket");
    assert_eq!(other.count, 2);
    let total: Decimal = payload.breakdown.iter().map(|entry| entry.total).sum();
    assert_eq!(total, payload.snapshot.investments);
    assert_eq!(payload.snapshot.investments, Decimal::from(420));
}
