//! Domain model: cases, timeline events, and the intake payload.
//!
//! The serde representation here is the dashboard wire contract - field
//! names are camelCase with the two historical exceptions (`codigoSC`,
//! `contratoNC`) spelled the way every consumer already expects them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FieldError;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Case lifecycle status as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    #[serde(rename = "In progress")]
    InProgress,
    #[serde(rename = "Revisar gestor")]
    RevisarGestor,
    #[serde(rename = "Cancelar SC")]
    CancelarSc,
    #[serde(rename = "Relanzar SC")]
    RelanzarSc,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::InProgress => "In progress",
            CaseStatus::RevisarGestor => "Revisar gestor",
            CaseStatus::CancelarSc => "Cancelar SC",
            CaseStatus::RelanzarSc => "Relanzar SC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "In progress" => Some(CaseStatus::InProgress),
            "Revisar gestor" => Some(CaseStatus::RevisarGestor),
            "Cancelar SC" => Some(CaseStatus::CancelarSc),
            "Relanzar SC" => Some(CaseStatus::RelanzarSc),
            _ => None,
        }
    }
}

impl Default for CaseStatus {
    fn default() -> Self {
        CaseStatus::InProgress
    }
}

/// Timeline event types. The analytics engine keys on `result`,
/// `email_sent`, `incoming_email`, `call` and `needs_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AutomationStarted,
    EmailSent,
    IncomingEmail,
    Call,
    MissingInformation,
    WaitTime,
    NeedsReview,
    Result,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AutomationStarted => "automation_started",
            EventType::EmailSent => "email_sent",
            EventType::IncomingEmail => "incoming_email",
            EventType::Call => "call",
            EventType::MissingInformation => "missing_information",
            EventType::WaitTime => "wait_time",
            EventType::NeedsReview => "needs_review",
            EventType::Result => "result",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automation_started" => Some(EventType::AutomationStarted),
            "email_sent" => Some(EventType::EmailSent),
            "incoming_email" => Some(EventType::IncomingEmail),
            "call" => Some(EventType::Call),
            "missing_information" => Some(EventType::MissingInformation),
            "wait_time" => Some(EventType::WaitTime),
            "needs_review" => Some(EventType::NeedsReview),
            "result" => Some(EventType::Result),
            _ => None,
        }
    }
}

/// Call outcome, carried in the `callStatus` metadata key of `call` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    #[serde(rename = "Reached")]
    Reached,
    #[serde(rename = "Not reached")]
    NotReached,
    #[serde(rename = "Needs help")]
    NeedsHelp,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Reached => "Reached",
            CallStatus::NotReached => "Not reached",
            CallStatus::NeedsHelp => "Needs help",
        }
    }
}

/// Intake policy when a submitted `codigoSC` already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    Append,
    Overwrite,
}

impl Default for DuplicateMode {
    fn default() -> Self {
        DuplicateMode::Append
    }
}

impl DuplicateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateMode::Append => "append",
            DuplicateMode::Overwrite => "overwrite",
        }
    }
}

/// A tracked rejection case with its event timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: i64,
    #[serde(rename = "codigoSC")]
    pub codigo_sc: String,
    pub dni_cif: String,
    pub nombre_apellidos: String,
    pub cups: String,
    #[serde(rename = "contratoNC")]
    pub contrato_nc: String,
    pub linea_negocio: String,
    pub direccion_completa: String,
    pub codigo_postal: String,
    pub municipio: String,
    pub provincia: String,
    pub ccaa: String,
    pub distribuidora: String,
    pub grupo_distribuidora: String,
    pub email_contacto: String,
    pub telefono_contacto: String,
    pub proceso: String,
    pub potencia_actual: Option<String>,
    pub potencia_solicitada: Option<String>,
    pub status: CaseStatus,
    pub email_thread_id: Option<String>,
    pub automation_run_id: Option<String>,
    pub fecha_primer_contacto: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// One timeline entry attached to a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub case_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub description: String,
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// A fully specified case submission, as posted by the automation platform.
///
/// Every field deserializes leniently (missing means empty) so that
/// `validate` can report the complete list of failing fields instead of
/// the first deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePayload {
    #[serde(default, rename = "codigoSC")]
    pub codigo_sc: String,
    #[serde(default)]
    pub dni_cif: String,
    #[serde(default)]
    pub nombre_apellidos: String,
    #[serde(default)]
    pub cups: String,
    #[serde(default, rename = "contratoNC")]
    pub contrato_nc: String,
    #[serde(default)]
    pub linea_negocio: String,
    #[serde(default)]
    pub direccion_completa: String,
    #[serde(default)]
    pub codigo_postal: String,
    #[serde(default)]
    pub municipio: String,
    #[serde(default)]
    pub provincia: String,
    #[serde(default)]
    pub ccaa: String,
    #[serde(default)]
    pub distribuidora: String,
    #[serde(default)]
    pub grupo_distribuidora: String,
    #[serde(default)]
    pub email_contacto: String,
    #[serde(default)]
    pub telefono_contacto: String,
    #[serde(default)]
    pub proceso: String,
    #[serde(default)]
    pub potencia_actual: Option<String>,
    #[serde(default)]
    pub potencia_solicitada: Option<String>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub email_thread_id: Option<String>,
    #[serde(default)]
    pub fecha_primer_contacto: String,
}

impl CasePayload {
    /// Check every field and return the parsed first-contact timestamp, or
    /// the complete list of failing fields.
    pub fn validate(&self) -> Result<DateTime<Utc>, Vec<FieldError>> {
        let mut errors = Vec::new();

        let required = [
            ("codigoSC", &self.codigo_sc, "Código SC is required"),
            ("dniCif", &self.dni_cif, "DNI/CIF is required"),
            ("nombreApellidos", &self.nombre_apellidos, "Nombre is required"),
            ("cups", &self.cups, "CUPS is required"),
            ("contratoNC", &self.contrato_nc, "Contrato NC is required"),
            ("lineaNegocio", &self.linea_negocio, "Línea de negocio is required"),
            ("direccionCompleta", &self.direccion_completa, "Dirección is required"),
            ("codigoPostal", &self.codigo_postal, "Código postal is required"),
            ("municipio", &self.municipio, "Municipio is required"),
            ("provincia", &self.provincia, "Provincia is required"),
            ("ccaa", &self.ccaa, "CCAA is required"),
            ("distribuidora", &self.distribuidora, "Distribuidora is required"),
            (
                "grupoDistribuidora",
                &self.grupo_distribuidora,
                "Grupo distribuidora is required",
            ),
            ("telefonoContacto", &self.telefono_contacto, "Teléfono is required"),
            ("proceso", &self.proceso, "Proceso is required"),
        ];

        for (field, value, message) in required {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, message));
            }
        }

        if !EMAIL_RE.is_match(self.email_contacto.trim()) {
            errors.push(FieldError::new("emailContacto", "Invalid email"));
        }

        let fecha = parse_first_contact(&self.fecha_primer_contacto);
        if fecha.is_none() {
            errors.push(FieldError::new(
                "fechaPrimerContacto",
                "Fecha de primer contacto must be a valid date",
            ));
        }

        match fecha {
            Some(f) if errors.is_empty() => Ok(f),
            _ => Err(errors),
        }
    }
}

/// Parse a first-contact date: RFC 3339, a bare datetime, or a bare date
/// (midnight UTC).
pub fn parse_first_contact(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Sparse field update for an existing case. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseUpdate {
    #[serde(default)]
    pub dni_cif: Option<String>,
    #[serde(default)]
    pub nombre_apellidos: Option<String>,
    #[serde(default)]
    pub cups: Option<String>,
    #[serde(default, rename = "contratoNC")]
    pub contrato_nc: Option<String>,
    #[serde(default)]
    pub linea_negocio: Option<String>,
    #[serde(default)]
    pub direccion_completa: Option<String>,
    #[serde(default)]
    pub codigo_postal: Option<String>,
    #[serde(default)]
    pub municipio: Option<String>,
    #[serde(default)]
    pub provincia: Option<String>,
    #[serde(default)]
    pub ccaa: Option<String>,
    #[serde(default)]
    pub distribuidora: Option<String>,
    #[serde(default)]
    pub grupo_distribuidora: Option<String>,
    #[serde(default)]
    pub email_contacto: Option<String>,
    #[serde(default)]
    pub telefono_contacto: Option<String>,
    #[serde(default)]
    pub proceso: Option<String>,
    #[serde(default)]
    pub potencia_actual: Option<String>,
    #[serde(default)]
    pub potencia_solicitada: Option<String>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub email_thread_id: Option<String>,
    #[serde(default)]
    pub fecha_primer_contacto: Option<String>,
}

impl CaseUpdate {
    /// The overwrite path of intake: replace every mutable field with the
    /// resubmitted payload's values.
    pub fn from_payload(payload: &CasePayload) -> Self {
        Self {
            dni_cif: Some(payload.dni_cif.clone()),
            nombre_apellidos: Some(payload.nombre_apellidos.clone()),
            cups: Some(payload.cups.clone()),
            contrato_nc: Some(payload.contrato_nc.clone()),
            linea_negocio: Some(payload.linea_negocio.clone()),
            direccion_completa: Some(payload.direccion_completa.clone()),
            codigo_postal: Some(payload.codigo_postal.clone()),
            municipio: Some(payload.municipio.clone()),
            provincia: Some(payload.provincia.clone()),
            ccaa: Some(payload.ccaa.clone()),
            distribuidora: Some(payload.distribuidora.clone()),
            grupo_distribuidora: Some(payload.grupo_distribuidora.clone()),
            email_contacto: Some(payload.email_contacto.clone()),
            telefono_contacto: Some(payload.telefono_contacto.clone()),
            proceso: Some(payload.proceso.clone()),
            potencia_actual: payload.potencia_actual.clone(),
            potencia_solicitada: payload.potencia_solicitada.clone(),
            status: payload.status,
            email_thread_id: payload.email_thread_id.clone(),
            fecha_primer_contacto: Some(payload.fecha_primer_contacto.clone()),
        }
    }

}
