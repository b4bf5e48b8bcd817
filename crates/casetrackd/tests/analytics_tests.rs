//! Analytics engine tests against an in-memory store.
//!
//! Fixtures write through the normal store API; created_at is backdated
//! with direct SQL where a test needs cases on specific calendar days.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use casetrack_shared::{CasePayload, CaseStatus, Error, EventType};
use casetrackd::analytics::{AnalyticsEngine, TrendPeriod};
use casetrackd::store::{NewEvent, Store};

fn payload(codigo: &str) -> CasePayload {
    CasePayload {
        codigo_sc: codigo.into(),
        dni_cif: "12345678A".into(),
        nombre_apellidos: "Laura Fernández García".into(),
        cups: "ES0021000000000101LF".into(),
        contrato_nc: "NC-101-2024".into(),
        linea_negocio: "Electricidad".into(),
        direccion_completa: "Calle Gran Vía 45, 2A".into(),
        codigo_postal: "28013".into(),
        municipio: "Madrid".into(),
        provincia: "Madrid".into(),
        ccaa: "Madrid".into(),
        distribuidora: "UFD".into(),
        grupo_distribuidora: "Naturgy".into(),
        email_contacto: "laura@example.com".into(),
        telefono_contacto: "+34 600 101 101".into(),
        proceso: "M1 - Alta de suministro".into(),
        potencia_actual: None,
        potencia_solicitada: None,
        status: None,
        email_thread_id: None,
        fecha_primer_contacto: "2024-03-01".into(),
    }
}

async fn add_case(store: &Store, codigo: &str) {
    store.create_case(&payload(codigo), Utc::now()).await.unwrap();
}

async fn add_event(
    store: &Store,
    codigo: &str,
    event_type: EventType,
    metadata: Option<serde_json::Value>,
    timestamp: DateTime<Utc>,
) {
    store
        .insert_event(
            codigo,
            NewEvent {
                event_type,
                description: "entry".into(),
                metadata,
                timestamp: Some(timestamp),
            },
        )
        .await
        .unwrap();
}

/// Move a case's creation to `days` days ago.
async fn backdate(store: &Store, codigo: &str, days: i64) {
    let ts = (Utc::now() - Duration::days(days)).timestamp();
    let codigo = codigo.to_string();
    store
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE cases SET created_at = ?1 WHERE codigo_sc = ?2",
                rusqlite::params![ts, codigo],
            )
            .map_err(Error::from)
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn empty_store_yields_zeroes_not_errors() {
    let store = Store::open_in_memory().unwrap();
    let engine = AnalyticsEngine::new(store);

    let overview = engine.overview(None, None).await.unwrap();
    assert_eq!(overview.automation.cases_processed, 0);
    assert_eq!(overview.automation.automation_rate, 0);
    assert_eq!(overview.automation.hours_saved, 0.0);
    assert_eq!(overview.communication.call_success_rate, 0);
    assert_eq!(overview.communication.avg_response_time, 0.0);
    assert_eq!(overview.cases.total, 0);
    assert_eq!(overview.cases.resolution_rate, 0);
    assert_eq!(overview.efficiency.events_per_case, 0.0);
    assert_eq!(overview.efficiency.retry_rate, 0);
    assert_eq!(overview.efficiency.review_rate, 0);
    assert_eq!(overview.efficiency.avg_wait_time, 0.0);

    assert!(engine.trends(TrendPeriod::SevenDays).await.unwrap().is_empty());
    let dist = engine.distribution().await.unwrap();
    assert!(dist.event_types.is_empty());
    assert!(dist.geographic.is_empty());
}

#[tokio::test]
async fn automation_metrics_use_result_events_and_time_model() {
    let store = Store::open_in_memory().unwrap();
    let now = Utc::now();
    for codigo in ["SC-1", "SC-2", "SC-3", "SC-4"] {
        add_case(&store, codigo).await;
    }
    add_event(&store, "SC-1", EventType::Result, None, now).await;

    let engine = AnalyticsEngine::new(store);
    let overview = engine.overview(None, None).await.unwrap();

    assert_eq!(overview.automation.cases_processed, 4);
    // 4 cases x (2h manual - 0.25h automated) = 7h, at 20/h = 140.
    assert_eq!(overview.automation.hours_saved, 7.0);
    assert_eq!(overview.automation.cost_savings, 140);
    // 1 of 4 cases has a result event.
    assert_eq!(overview.automation.automation_rate, 25);
}

#[tokio::test]
async fn communication_metrics_pair_first_send_with_first_reply() {
    let store = Store::open_in_memory().unwrap();
    let base = Utc::now() - Duration::days(1);

    add_case(&store, "SC-1").await;
    add_case(&store, "SC-2").await;

    // SC-1: replied after 2h. SC-2: sent but never answered - excluded
    // from the average instead of counting as zero.
    add_event(&store, "SC-1", EventType::EmailSent, None, base).await;
    add_event(
        &store,
        "SC-1",
        EventType::IncomingEmail,
        None,
        base + Duration::hours(2),
    )
    .await;
    add_event(&store, "SC-2", EventType::EmailSent, None, base).await;

    add_event(
        &store,
        "SC-1",
        EventType::Call,
        Some(json!({ "callStatus": "Reached" })),
        base + Duration::hours(3),
    )
    .await;
    add_event(
        &store,
        "SC-2",
        EventType::Call,
        Some(json!({ "callStatus": "Not reached" })),
        base + Duration::hours(3),
    )
    .await;

    let engine = AnalyticsEngine::new(store);
    let overview = engine.overview(None, None).await.unwrap();
    let communication = overview.communication;

    assert_eq!(communication.total_emails.sent, 2);
    assert_eq!(communication.total_emails.received, 1);
    assert_eq!(communication.total_calls.total, 2);
    assert_eq!(communication.total_calls.reached, 1);
    assert_eq!(communication.total_calls.not_reached, 1);
    assert_eq!(communication.total_calls.needs_help, 0);
    assert_eq!(communication.call_success_rate, 50);
    assert_eq!(communication.avg_response_time, 2.0);
}

#[tokio::test]
async fn case_metrics_resolution_spans_first_event_to_last_result() {
    let store = Store::open_in_memory().unwrap();
    let base = Utc::now() - Duration::days(5);

    add_case(&store, "SC-1").await;
    add_case(&store, "SC-2").await;
    store
        .update_case(
            "SC-2",
            &casetrack_shared::CaseUpdate {
                status: Some(CaseStatus::RevisarGestor),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    add_event(&store, "SC-1", EventType::EmailSent, None, base).await;
    add_event(
        &store,
        "SC-1",
        EventType::Result,
        None,
        base + Duration::days(2),
    )
    .await;
    add_event(&store, "SC-2", EventType::EmailSent, None, base).await;

    let engine = AnalyticsEngine::new(store);
    let overview = engine.overview(None, None).await.unwrap();
    let cases = overview.cases;

    assert_eq!(cases.total, 2);
    assert_eq!(cases.resolved, 1);
    assert_eq!(cases.resolution_rate, 50);
    assert_eq!(cases.avg_resolution_time, 2.0);
    assert_eq!(cases.by_status.len(), 2);
    assert!(cases
        .by_status
        .iter()
        .any(|s| s.status == CaseStatus::RevisarGestor && s.count == 1));
}

#[tokio::test]
async fn efficiency_metrics_cover_retries_reviews_and_gaps() {
    let store = Store::open_in_memory().unwrap();
    let base = Utc::now() - Duration::days(2);

    add_case(&store, "SC-1").await;
    add_case(&store, "SC-2").await;
    add_case(&store, "SC-3").await;

    // SC-1: two calls (a retry) and gaps of 1h and 2h.
    add_event(
        &store,
        "SC-1",
        EventType::Call,
        Some(json!({ "callStatus": "Not reached" })),
        base,
    )
    .await;
    add_event(
        &store,
        "SC-1",
        EventType::Call,
        Some(json!({ "callStatus": "Reached" })),
        base + Duration::hours(1),
    )
    .await;
    add_event(
        &store,
        "SC-1",
        EventType::Result,
        None,
        base + Duration::hours(3),
    )
    .await;

    // SC-2: a single review event.
    add_event(&store, "SC-2", EventType::NeedsReview, None, base).await;

    let engine = AnalyticsEngine::new(store);
    let overview = engine.overview(None, None).await.unwrap();
    let efficiency = overview.efficiency;

    // (3 + 1 + 0) events over 3 cases.
    assert_eq!(efficiency.events_per_case, 1.3);
    // 1 of 3 cases has more than one call.
    assert_eq!(efficiency.retry_rate, 33);
    // 1 of 3 cases has a needs_review event.
    assert_eq!(efficiency.review_rate, 33);
    // Gaps exist only inside SC-1: 1h and 2h.
    assert_eq!(efficiency.avg_wait_time, 1.5);
}

#[tokio::test]
async fn window_excludes_cases_created_outside_range() {
    let store = Store::open_in_memory().unwrap();
    add_case(&store, "SC-OLD").await;
    backdate(&store, "SC-OLD", 60).await;
    add_case(&store, "SC-NEW").await;

    let engine = AnalyticsEngine::new(store);
    let overview = engine.overview(None, None).await.unwrap();
    assert_eq!(overview.automation.cases_processed, 1);
    assert_eq!(overview.cases.total, 1);
}

#[tokio::test]
async fn trends_return_one_point_per_day_inside_the_window() {
    let store = Store::open_in_memory().unwrap();

    for codigo in ["SC-1", "SC-2", "SC-3"] {
        add_case(&store, codigo).await;
        backdate(&store, codigo, 2).await;
    }
    add_case(&store, "SC-4").await;
    backdate(&store, "SC-4", 10).await;

    let engine = AnalyticsEngine::new(store);
    let trends = engine.trends(TrendPeriod::SevenDays).await.unwrap();

    let expected_date = (Utc::now() - Duration::days(2))
        .format("%Y-%m-%d")
        .to_string();
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].date, expected_date);
    assert_eq!(trends[0].cases, 3);

    // The 90-day window sees both days, ascending.
    let trends = engine.trends(TrendPeriod::NinetyDays).await.unwrap();
    assert_eq!(trends.len(), 2);
    assert!(trends[0].date < trends[1].date);
    assert_eq!(trends[0].cases, 1);
    assert_eq!(trends[1].cases, 3);
}

#[tokio::test]
async fn distribution_ranks_descending_by_count() {
    let store = Store::open_in_memory().unwrap();
    let now = Utc::now();

    add_case(&store, "SC-1").await;
    let mut other = payload("SC-2");
    other.ccaa = "Cataluña".into();
    other.proceso = "M2 - Cambio de titular".into();
    other.distribuidora = "Nedgia".into();
    store.create_case(&other, now).await.unwrap();
    let mut third = payload("SC-3");
    third.ccaa = "Cataluña".into();
    store.create_case(&third, now).await.unwrap();

    add_event(&store, "SC-1", EventType::EmailSent, None, now).await;
    add_event(&store, "SC-1", EventType::EmailSent, None, now).await;
    add_event(&store, "SC-2", EventType::Call, None, now).await;

    let engine = AnalyticsEngine::new(store);
    let dist = engine.distribution().await.unwrap();

    assert_eq!(dist.event_types[0].event_type, "email_sent");
    assert_eq!(dist.event_types[0].count, 2);
    assert_eq!(dist.event_types[1].event_type, "call");

    assert_eq!(dist.geographic[0].region, "Cataluña");
    assert_eq!(dist.geographic[0].count, 2);

    assert_eq!(dist.process_types[0].process, "M1 - Alta de suministro");
    assert_eq!(dist.process_types[0].count, 2);

    assert_eq!(dist.distributors[0].distributor, "UFD");
    assert_eq!(dist.distributors[0].count, 2);
}
