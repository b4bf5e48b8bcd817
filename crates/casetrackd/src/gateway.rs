//! Outbound forwarding of case data to the automation platform.
//!
//! The webhook consumes a flat key-value document whose keys are the
//! human-readable column headers of the upstream Excel export. They are an
//! external contract: names and (missing) diacritics must match exactly.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use casetrack_shared::{CasePayload, Error, Result};

use crate::config::GatewayConfig;

/// The one operation the intake engine needs from the automation platform:
/// forward a case, get back an optional run identifier.
#[async_trait]
pub trait AutomationGateway: Send + Sync {
    async fn forward(&self, case: &CasePayload) -> Result<Option<String>>;
}

/// HTTP webhook implementation.
pub struct WebhookGateway {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Upstream(e.to_string()))?;
        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
        })
    }
}

#[async_trait]
impl AutomationGateway for WebhookGateway {
    async fn forward(&self, case: &CasePayload) -> Result<Option<String>> {
        info!(codigo_sc = %case.codigo_sc, "Forwarding case to automation platform");

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&flatten_case(case))
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "webhook returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let run_id = body
            .get("queued_run_ids")
            .and_then(|ids| ids.as_array())
            .and_then(|ids| ids.first())
            .and_then(|id| id.as_str())
            .map(str::to_string);

        info!(
            codigo_sc = %case.codigo_sc,
            run_id = run_id.as_deref().unwrap_or("-"),
            "Automation platform accepted case"
        );
        Ok(run_id)
    }
}

/// Flatten a case payload into the webhook's header/value document.
/// Status, thread id and first-contact date are internal and not forwarded.
fn flatten_case(case: &CasePayload) -> Value {
    json!({
        "DNI/CIF": case.dni_cif,
        "Nombre y apellidos": case.nombre_apellidos,
        "CUPS": case.cups,
        "Contrato NC": case.contrato_nc,
        "Linea de negocio": case.linea_negocio,
        "Codigo SC": case.codigo_sc,
        "Direccion completa": case.direccion_completa,
        "Codigo postal": case.codigo_postal,
        "Municipio": case.municipio,
        "Provincia": case.provincia,
        "CCAA": case.ccaa,
        "Distribuidora": case.distribuidora,
        "Grupo distribuidora": case.grupo_distribuidora,
        "Email contacto Naturgy": case.email_contacto,
        "Telefono contacto Naturgy": case.telefono_contacto,
        "Proceso": case.proceso,
        "Potencia actual": case.potencia_actual.as_deref().unwrap_or(""),
        "Potencia solicitada": case.potencia_solicitada.as_deref().unwrap_or(""),
    })
}

/// Tracking URL for a run, from the configured template.
pub fn run_tracking_url(template: &str, run_id: &str) -> String {
    template.replace("{run_id}", run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CasePayload {
        CasePayload {
            codigo_sc: "SC-2024-001".into(),
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
            potencia_solicitada: Some("5.75".into()),
            status: None,
            email_thread_id: None,
            fecha_primer_contacto: "2024-03-01".into(),
        }
    }

    #[test]
    fn webhook_document_uses_exact_external_labels() {
        let doc = flatten_case(&payload());
        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        // The upstream contract: these header names, no diacritics.
        for expected in [
            "DNI/CIF",
            "Nombre y apellidos",
            "CUPS",
            "Contrato NC",
            "Linea de negocio",
            "Codigo SC",
            "Direccion completa",
            "Codigo postal",
            "Municipio",
            "Provincia",
            "CCAA",
            "Distribuidora",
            "Grupo distribuidora",
            "Email contacto Naturgy",
            "Telefono contacto Naturgy",
            "Proceso",
            "Potencia actual",
            "Potencia solicitada",
        ] {
            assert!(keys.contains(&expected), "missing label {expected:?}");
        }
        assert_eq!(keys.len(), 18);
        assert_eq!(doc["Potencia actual"], "");
        assert_eq!(doc["Potencia solicitada"], "5.75");
        assert!(doc.get("status").is_none());
        assert!(doc.get("emailThreadId").is_none());
    }

    #[test]
    fn tracking_url_substitutes_run_id() {
        let url = run_tracking_url("https://runs.example/run?run_id={run_id}", "abc-123");
        assert_eq!(url, "https://runs.example/run?run_id=abc-123");
    }
}
