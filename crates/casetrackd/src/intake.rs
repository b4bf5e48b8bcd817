//! Case intake: reconcile a submission with existing state, forward it to
//! the automation platform, and record the outcome on the timeline.
//!
//! The multi-step sequence (lookup, create/update, gateway call, event)
//! is deliberately not one transaction: the case write is atomic on its
//! own and must survive a failing webhook. Only the post-gateway tail
//! (run-id persist + event insert) is batched, in [`Store::record_intake`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use casetrack_shared::error::FieldError;
use casetrack_shared::model::parse_first_contact;
use casetrack_shared::{Case, CasePayload, CaseUpdate, DuplicateMode, Error, EventType, Result};

use crate::gateway::{run_tracking_url, AutomationGateway};
use crate::metrics::ApiMetrics;
use crate::store::{NewEvent, Store};

/// How a submission was reconciled against existing state. Drives the
/// HTTP status at the boundary: only `Created` maps to 201.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    Created,
    Appended,
    Overwritten,
}

impl IntakeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeOutcome::Created => "created",
            IntakeOutcome::Appended => "appended",
            IntakeOutcome::Overwritten => "overwritten",
        }
    }
}

pub struct IntakeEngine {
    store: Store,
    gateway: Arc<dyn AutomationGateway>,
    run_url_template: String,
    metrics: ApiMetrics,
}

impl IntakeEngine {
    pub fn new(
        store: Store,
        gateway: Arc<dyn AutomationGateway>,
        run_url_template: String,
        metrics: ApiMetrics,
    ) -> Self {
        Self {
            store,
            gateway,
            run_url_template,
            metrics,
        }
    }

    /// Submit a case: create it, or reconcile with the existing record per
    /// `mode`. Always forwards to the automation platform (best-effort) and
    /// always appends exactly one `automation_started` event.
    pub async fn submit(
        &self,
        payload: CasePayload,
        mode: DuplicateMode,
    ) -> Result<(Case, IntakeOutcome)> {
        let fecha = payload.validate().map_err(Error::Validation)?;

        let existing = self.store.find_case(&payload.codigo_sc).await?;
        let outcome = match (existing, mode) {
            (None, _) => match self.store.create_case(&payload, fecha).await {
                Ok(_) => {
                    info!(codigo_sc = %payload.codigo_sc, "Created new case");
                    IntakeOutcome::Created
                }
                // Lost the lookup-then-insert race against a concurrent
                // submission of the same code. The UNIQUE constraint is the
                // backstop; treat it as the append path.
                Err(e) if e.is_unique_violation() => {
                    info!(codigo_sc = %payload.codigo_sc, "Concurrent create, appending instead");
                    IntakeOutcome::Appended
                }
                Err(e) => return Err(e),
            },
            (Some(_), DuplicateMode::Overwrite) => {
                info!(codigo_sc = %payload.codigo_sc, "Case exists, overwriting");
                self.store
                    .update_case(
                        &payload.codigo_sc,
                        &CaseUpdate::from_payload(&payload),
                        Some(fecha),
                    )
                    .await?;
                IntakeOutcome::Overwritten
            }
            (Some(_), DuplicateMode::Append) => {
                info!(codigo_sc = %payload.codigo_sc, "Case exists, appending events");
                IntakeOutcome::Appended
            }
        };

        // Best-effort forward: a gateway failure must never fail intake.
        let run_id = match self.gateway.forward(&payload).await {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!(
                    codigo_sc = %payload.codigo_sc,
                    error = %e,
                    "Automation gateway call failed, case kept"
                );
                self.metrics.gateway_failures_total.inc();
                None
            }
        };

        let description = match outcome {
            IntakeOutcome::Overwritten => "Automatización iniciada (caso sobrescrito)",
            _ => "Automatización iniciada",
        };
        let mut metadata = json!({
            "proceso": payload.proceso,
            "duplicateMode": mode.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(run_id) = &run_id {
            metadata["runId"] = json!(run_id);
            metadata["trackingUrl"] = json!(run_tracking_url(&self.run_url_template, run_id));
        }
        self.store
            .record_intake(
                &payload.codigo_sc,
                run_id.as_deref(),
                NewEvent {
                    event_type: EventType::AutomationStarted,
                    description: description.to_string(),
                    metadata: Some(metadata),
                    timestamp: None,
                },
            )
            .await?;

        self.metrics
            .intake_total
            .with_label_values(&[outcome.as_str()])
            .inc();

        let case = self.store.get_case(&payload.codigo_sc).await?;
        Ok((case, outcome))
    }

    /// Sparse field update. Re-derives the first-contact timestamp when the
    /// update carries one as a string. Never touches events.
    pub async fn update(&self, codigo_sc: &str, update: CaseUpdate) -> Result<Case> {
        let fecha = match update.fecha_primer_contacto.as_deref() {
            Some(raw) => Some(parse_first_contact(raw).ok_or_else(|| {
                Error::Validation(vec![FieldError::new(
                    "fechaPrimerContacto",
                    "Fecha de primer contacto must be a valid date",
                )])
            })?),
            None => None,
        };
        self.store.update_case(codigo_sc, &update, fecha).await
    }

    /// Correlate a case with an inbound email thread.
    pub async fn set_thread(&self, codigo_sc: &str, email_thread_id: String) -> Result<Case> {
        let update = CaseUpdate {
            email_thread_id: Some(email_thread_id),
            ..Default::default()
        };
        self.store.update_case(codigo_sc, &update, None).await
    }

    /// Remove a case and, transitively, its timeline.
    pub async fn delete(&self, codigo_sc: &str) -> Result<()> {
        self.store.delete_case(codigo_sc).await
    }
}
