//! SQLite-backed store for cases and their event timelines.
//!
//! Schema:
//! - cases: one row per rejection case, business key `codigo_sc` (UNIQUE)
//! - events: timeline entries, FK to cases(codigo_sc) with cascade delete
//!
//! Timestamps are stored as INTEGER unix epoch seconds. The connection is
//! shared behind an async mutex; every statement is a single SQLite
//! transaction unless explicitly batched (intake's run-id + event write).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use casetrack_shared::api::{CaseStatsResponse, ListCasesQuery, StatusCount};
use casetrack_shared::{
    Case, CasePayload, CaseStatus, CaseUpdate, Error, Event, EventType, Result,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    codigo_sc TEXT NOT NULL UNIQUE,
    dni_cif TEXT NOT NULL,
    nombre_apellidos TEXT NOT NULL,
    cups TEXT NOT NULL,
    contrato_nc TEXT NOT NULL,
    linea_negocio TEXT NOT NULL,
    direccion_completa TEXT NOT NULL,
    codigo_postal TEXT NOT NULL,
    municipio TEXT NOT NULL,
    provincia TEXT NOT NULL,
    ccaa TEXT NOT NULL,
    distribuidora TEXT NOT NULL,
    grupo_distribuidora TEXT NOT NULL,
    email_contacto TEXT NOT NULL,
    telefono_contacto TEXT NOT NULL,
    proceso TEXT NOT NULL,
    potencia_actual TEXT,
    potencia_solicitada TEXT,
    status TEXT NOT NULL DEFAULT 'In progress',
    email_thread_id TEXT,
    automation_run_id TEXT,
    fecha_primer_contacto INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);
CREATE INDEX IF NOT EXISTS idx_cases_created_at ON cases(created_at);
CREATE INDEX IF NOT EXISTS idx_cases_thread ON cases(email_thread_id);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL REFERENCES cases(codigo_sc) ON DELETE CASCADE,
    type TEXT NOT NULL,
    description TEXT NOT NULL,
    metadata TEXT,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_case ON events(case_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
"#;

/// A new timeline entry, before it is assigned an id.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub description: String,
    pub metadata: Option<Value>,
    /// Defaults to now when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

/// SQLite-backed case store. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the store at a filesystem path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Store(e.to_string()))?;
        }
        let conn = Connection::open(path_ref)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// In-memory store for tests and engine-level exercises.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the live connection. The analytics engine
    /// issues its aggregate queries through this.
    pub async fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Drop and recreate the schema, discarding all data.
    pub async fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("DROP TABLE IF EXISTS events; DROP TABLE IF EXISTS cases;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cases
    // -----------------------------------------------------------------------

    /// Insert a new case. Status defaults to "In progress" when the payload
    /// leaves it unset. Fails with a UNIQUE violation if the code exists.
    pub async fn create_case(
        &self,
        payload: &CasePayload,
        fecha_primer_contacto: DateTime<Utc>,
    ) -> Result<Case> {
        let conn = self.conn.lock().await;
        let now = Utc::now().timestamp();
        let status = payload.status.unwrap_or_default();
        conn.execute(
            "INSERT INTO cases (
                codigo_sc, dni_cif, nombre_apellidos, cups, contrato_nc,
                linea_negocio, direccion_completa, codigo_postal, municipio,
                provincia, ccaa, distribuidora, grupo_distribuidora,
                email_contacto, telefono_contacto, proceso, potencia_actual,
                potencia_solicitada, status, email_thread_id,
                fecha_primer_contacto, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                      ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                payload.codigo_sc,
                payload.dni_cif,
                payload.nombre_apellidos,
                payload.cups,
                payload.contrato_nc,
                payload.linea_negocio,
                payload.direccion_completa,
                payload.codigo_postal,
                payload.municipio,
                payload.provincia,
                payload.ccaa,
                payload.distribuidora,
                payload.grupo_distribuidora,
                payload.email_contacto,
                payload.telefono_contacto,
                payload.proceso,
                payload.potencia_actual,
                payload.potencia_solicitada,
                status.as_str(),
                payload.email_thread_id,
                fecha_primer_contacto.timestamp(),
                now,
                now,
            ],
        )?;
        get_case_required(&conn, &payload.codigo_sc)
    }

    /// Full case with its timeline, newest events first.
    pub async fn get_case(&self, codigo_sc: &str) -> Result<Case> {
        let conn = self.conn.lock().await;
        get_case_required(&conn, codigo_sc)
    }

    /// Case lookup that distinguishes "absent" from failure.
    pub async fn find_case(&self, codigo_sc: &str) -> Result<Option<Case>> {
        let conn = self.conn.lock().await;
        get_case_opt(&conn, codigo_sc)
    }

    /// Case lookup by email thread correlation id.
    pub async fn find_case_by_thread(&self, thread_id: &str) -> Result<Option<Case>> {
        let conn = self.conn.lock().await;
        let codigo: Option<String> = conn
            .query_row(
                "SELECT codigo_sc FROM cases WHERE email_thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?;
        match codigo {
            Some(codigo) => get_case_opt(&conn, &codigo),
            None => Ok(None),
        }
    }

    /// Filtered, paginated listing with total count. Search matches the
    /// case code, the holder name, the CUPS and the process classifier,
    /// case-insensitively.
    pub async fn list_cases(&self, query: &ListCasesQuery) -> Result<(Vec<Case>, i64)> {
        let conn = self.conn.lock().await;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut filter_params: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            where_clauses.push(format!("status = ?{}", filter_params.len() + 1));
            filter_params.push(status.to_string().into());
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            let n = filter_params.len() + 1;
            where_clauses.push(format!(
                "(codigo_sc LIKE ?{n} COLLATE NOCASE
                  OR nombre_apellidos LIKE ?{n} COLLATE NOCASE
                  OR cups LIKE ?{n} COLLATE NOCASE
                  OR proceso LIKE ?{n} COLLATE NOCASE)"
            ));
            filter_params.push(format!("%{}%", search).into());
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM cases {where_sql}"),
            params_from_iter(filter_params.iter()),
            |row| row.get(0),
        )?;

        let mut list_params = filter_params.clone();
        let limit = query.limit.unwrap_or(-1);
        let offset = query.offset.unwrap_or(0);
        let limit_sql = format!(
            "LIMIT ?{} OFFSET ?{}",
            list_params.len() + 1,
            list_params.len() + 2
        );
        list_params.push(limit.into());
        list_params.push(offset.into());

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM cases {where_sql} ORDER BY created_at DESC, id DESC {limit_sql}"
        ))?;
        let mut cases: Vec<Case> = stmt
            .query_map(params_from_iter(list_params.iter()), map_case)?
            .collect::<std::result::Result<_, _>>()?;
        for case in &mut cases {
            case.events = events_for(&conn, &case.codigo_sc)?;
        }

        Ok((cases, total))
    }

    /// Sparse in-place update. `fecha_primer_contacto` arrives already
    /// parsed; the engine owns string-to-date derivation.
    pub async fn update_case(
        &self,
        codigo_sc: &str,
        update: &CaseUpdate,
        fecha_primer_contacto: Option<DateTime<Utc>>,
    ) -> Result<Case> {
        let conn = self.conn.lock().await;

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        let mut push = |column: &str, value: Option<rusqlite::types::Value>| {
            if let Some(value) = value {
                values.push(value);
                sets.push(format!("{} = ?{}", column, values.len()));
            }
        };

        push("dni_cif", update.dni_cif.clone().map(Into::into));
        push(
            "nombre_apellidos",
            update.nombre_apellidos.clone().map(Into::into),
        );
        push("cups", update.cups.clone().map(Into::into));
        push("contrato_nc", update.contrato_nc.clone().map(Into::into));
        push("linea_negocio", update.linea_negocio.clone().map(Into::into));
        push(
            "direccion_completa",
            update.direccion_completa.clone().map(Into::into),
        );
        push("codigo_postal", update.codigo_postal.clone().map(Into::into));
        push("municipio", update.municipio.clone().map(Into::into));
        push("provincia", update.provincia.clone().map(Into::into));
        push("ccaa", update.ccaa.clone().map(Into::into));
        push("distribuidora", update.distribuidora.clone().map(Into::into));
        push(
            "grupo_distribuidora",
            update.grupo_distribuidora.clone().map(Into::into),
        );
        push(
            "email_contacto",
            update.email_contacto.clone().map(Into::into),
        );
        push(
            "telefono_contacto",
            update.telefono_contacto.clone().map(Into::into),
        );
        push("proceso", update.proceso.clone().map(Into::into));
        push(
            "potencia_actual",
            update.potencia_actual.clone().map(Into::into),
        );
        push(
            "potencia_solicitada",
            update.potencia_solicitada.clone().map(Into::into),
        );
        push(
            "status",
            update.status.map(|s| s.as_str().to_string().into()),
        );
        push(
            "email_thread_id",
            update.email_thread_id.clone().map(Into::into),
        );
        push(
            "fecha_primer_contacto",
            fecha_primer_contacto.map(|f| f.timestamp().into()),
        );

        values.push(Utc::now().timestamp().into());
        sets.push(format!("updated_at = ?{}", values.len()));

        values.push(codigo_sc.to_string().into());
        let changed = conn.execute(
            &format!(
                "UPDATE cases SET {} WHERE codigo_sc = ?{}",
                sets.join(", "),
                values.len()
            ),
            params_from_iter(values.iter()),
        )?;
        if changed == 0 {
            return Err(Error::NotFound("Case"));
        }
        get_case_required(&conn, codigo_sc)
    }

    /// Delete a case; its events go with it (FK cascade).
    pub async fn delete_case(&self, codigo_sc: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("DELETE FROM cases WHERE codigo_sc = ?1", params![codigo_sc])?;
        if changed == 0 {
            return Err(Error::NotFound("Case"));
        }
        Ok(())
    }

    /// Dashboard headline numbers: totals and the status histogram.
    pub async fn case_stats(&self) -> Result<CaseStatsResponse> {
        let conn = self.conn.lock().await;
        let (total, in_progress, pending_action): (i64, i64, i64) = conn.query_row(
            "SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'In progress'),
                COUNT(*) FILTER (WHERE status IN ('Revisar gestor', 'Cancelar SC'))
             FROM cases",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM cases GROUP BY status ORDER BY status")?;
        let by_status = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(status, count)| {
                CaseStatus::parse(&status).map(|status| StatusCount { status, count })
            })
            .collect();

        Ok(CaseStatsResponse {
            total,
            in_progress,
            pending_action,
            by_status,
        })
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Append one event to a case's timeline. The owning case must exist.
    pub async fn insert_event(&self, case_id: &str, event: NewEvent) -> Result<Event> {
        let conn = self.conn.lock().await;
        insert_event_sync(&conn, case_id, event)
    }

    /// The intake tail: persist the run identifier (when the gateway
    /// returned one) and the automation-started event as one transaction,
    /// so a run id is never stored without its timeline entry.
    pub async fn record_intake(
        &self,
        case_id: &str,
        run_id: Option<&str>,
        event: NewEvent,
    ) -> Result<Event> {
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction()?;
        if let Some(run_id) = run_id {
            tx.execute(
                "UPDATE cases SET automation_run_id = ?1, updated_at = ?2 WHERE codigo_sc = ?3",
                params![run_id, Utc::now().timestamp(), case_id],
            )?;
        }
        let inserted = insert_event_sync(&tx, case_id, event)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Timeline of one case, newest first. An unknown case has an empty
    /// timeline rather than being an error.
    pub async fn events_for_case(&self, case_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock().await;
        events_for(&conn, case_id)
    }

    /// One event together with its owning case.
    pub async fn get_event(&self, event_id: &str) -> Result<(Event, Case)> {
        let conn = self.conn.lock().await;
        let event = conn
            .query_row(
                "SELECT id, case_id, type, description, metadata, timestamp
                 FROM events WHERE id = ?1",
                params![event_id],
                map_event,
            )
            .optional()?
            .ok_or(Error::NotFound("Event"))?;
        let case = get_case_required(&conn, &event.case_id)?;
        Ok((event, case))
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("DELETE FROM events WHERE id = ?1", params![event_id])?;
        if changed == 0 {
            return Err(Error::NotFound("Event"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sync helpers (run under the connection lock)
// ---------------------------------------------------------------------------

fn insert_event_sync(conn: &Connection, case_id: &str, event: NewEvent) -> Result<Event> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM cases WHERE codigo_sc = ?1",
            params![case_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(Error::NotFound("Case"));
    }

    let id = Uuid::new_v4().to_string();
    let timestamp = event.timestamp.unwrap_or_else(Utc::now);
    let metadata = event
        .metadata
        .as_ref()
        .map(|m| serde_json::to_string(m))
        .transpose()
        .map_err(|e| Error::Store(e.to_string()))?;
    conn.execute(
        "INSERT INTO events (id, case_id, type, description, metadata, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            case_id,
            event.event_type.as_str(),
            event.description,
            metadata,
            timestamp.timestamp(),
        ],
    )?;
    conn.query_row(
        "SELECT id, case_id, type, description, metadata, timestamp FROM events WHERE id = ?1",
        params![id],
        map_event,
    )
    .map_err(Error::from)
}

fn get_case_required(conn: &Connection, codigo_sc: &str) -> Result<Case> {
    get_case_opt(conn, codigo_sc)?.ok_or(Error::NotFound("Case"))
}

fn get_case_opt(conn: &Connection, codigo_sc: &str) -> Result<Option<Case>> {
    let case = conn
        .query_row(
            "SELECT * FROM cases WHERE codigo_sc = ?1",
            params![codigo_sc],
            map_case,
        )
        .optional()?;
    match case {
        Some(mut case) => {
            case.events = events_for(conn, &case.codigo_sc)?;
            Ok(Some(case))
        }
        None => Ok(None),
    }
}

fn events_for(conn: &Connection, case_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, type, description, metadata, timestamp
         FROM events WHERE case_id = ?1
         ORDER BY timestamp DESC, rowid DESC",
    )?;
    let events = stmt
        .query_map(params![case_id], map_event)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(events)
}

fn map_case(row: &Row<'_>) -> rusqlite::Result<Case> {
    Ok(Case {
        id: row.get("id")?,
        codigo_sc: row.get("codigo_sc")?,
        dni_cif: row.get("dni_cif")?,
        nombre_apellidos: row.get("nombre_apellidos")?,
        cups: row.get("cups")?,
        contrato_nc: row.get("contrato_nc")?,
        linea_negocio: row.get("linea_negocio")?,
        direccion_completa: row.get("direccion_completa")?,
        codigo_postal: row.get("codigo_postal")?,
        municipio: row.get("municipio")?,
        provincia: row.get("provincia")?,
        ccaa: row.get("ccaa")?,
        distribuidora: row.get("distribuidora")?,
        grupo_distribuidora: row.get("grupo_distribuidora")?,
        email_contacto: row.get("email_contacto")?,
        telefono_contacto: row.get("telefono_contacto")?,
        proceso: row.get("proceso")?,
        potencia_actual: row.get("potencia_actual")?,
        potencia_solicitada: row.get("potencia_solicitada")?,
        status: CaseStatus::parse(&row.get::<_, String>("status")?)
            .unwrap_or(CaseStatus::InProgress),
        email_thread_id: row.get("email_thread_id")?,
        automation_run_id: row.get("automation_run_id")?,
        fecha_primer_contacto: epoch(row.get("fecha_primer_contacto")?),
        created_at: epoch(row.get("created_at")?),
        updated_at: epoch(row.get("updated_at")?),
        events: Vec::new(),
    })
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let metadata: Option<String> = row.get("metadata")?;
    Ok(Event {
        id: row.get("id")?,
        case_id: row.get("case_id")?,
        event_type: EventType::parse(&row.get::<_, String>("type")?)
            .unwrap_or(EventType::AutomationStarted),
        description: row.get("description")?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        timestamp: epoch(row.get("timestamp")?),
    })
}

fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use casetrack_shared::DuplicateMode;

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

    fn event(event_type: EventType) -> NewEvent {
        NewEvent {
            event_type,
            description: "entry".into(),
            metadata: None,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn create_defaults_status_and_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let case = store
            .create_case(&payload("SC-1"), Utc::now())
            .await
            .unwrap();
        assert_eq!(case.status, CaseStatus::InProgress);
        assert_eq!(case.codigo_sc, "SC-1");
        assert!(case.events.is_empty());
    }

    #[tokio::test]
    async fn duplicate_codigo_sc_is_rejected_by_unique_constraint() {
        let store = Store::open_in_memory().unwrap();
        store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();
        let err = store
            .create_case(&payload("SC-1"), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn sparse_update_changes_only_given_fields() {
        let store = Store::open_in_memory().unwrap();
        store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();

        let update = CaseUpdate {
            municipio: Some("Getafe".into()),
            status: Some(CaseStatus::RevisarGestor),
            ..Default::default()
        };
        let case = store.update_case("SC-1", &update, None).await.unwrap();
        assert_eq!(case.municipio, "Getafe");
        assert_eq!(case.status, CaseStatus::RevisarGestor);
        assert_eq!(case.provincia, "Madrid");
    }

    #[tokio::test]
    async fn update_missing_case_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .update_case("SC-404", &CaseUpdate::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_events() {
        let store = Store::open_in_memory().unwrap();
        store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();
        store
            .insert_event("SC-1", event(EventType::EmailSent))
            .await
            .unwrap();
        store
            .insert_event("SC-1", event(EventType::NeedsReview))
            .await
            .unwrap();

        store.delete_case("SC-1").await.unwrap();

        let orphans: i64 = store
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
                    .map_err(Error::from)
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);

        let err = store.delete_case("SC-1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn event_requires_existing_case() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .insert_event("SC-404", event(EventType::Call))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn timeline_is_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();
        let base = Utc::now();
        for (i, event_type) in [EventType::EmailSent, EventType::Call, EventType::Result]
            .into_iter()
            .enumerate()
        {
            store
                .insert_event(
                    "SC-1",
                    NewEvent {
                        event_type,
                        description: format!("entry {i}"),
                        metadata: None,
                        timestamp: Some(base + chrono::Duration::hours(i as i64)),
                    },
                )
                .await
                .unwrap();
        }

        let events = store.events_for_case("SC-1").await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![EventType::Result, EventType::Call, EventType::EmailSent]
        );
    }

    #[tokio::test]
    async fn record_intake_persists_run_id_and_event_together() {
        let store = Store::open_in_memory().unwrap();
        store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();

        let metadata = serde_json::json!({
            "proceso": "M1 - Alta de suministro",
            "duplicateMode": DuplicateMode::Append.as_str(),
            "runId": "run-42",
        });
        store
            .record_intake(
                "SC-1",
                Some("run-42"),
                NewEvent {
                    event_type: EventType::AutomationStarted,
                    description: "Automatización iniciada".into(),
                    metadata: Some(metadata),
                    timestamp: None,
                },
            )
            .await
            .unwrap();

        let case = store.get_case("SC-1").await.unwrap();
        assert_eq!(case.automation_run_id.as_deref(), Some("run-42"));
        assert_eq!(case.events.len(), 1);
        assert_eq!(case.events[0].event_type, EventType::AutomationStarted);
        let meta = case.events[0].metadata.as_ref().unwrap();
        assert_eq!(meta["runId"], "run-42");
    }

    #[tokio::test]
    async fn list_filters_by_status_and_search() {
        let store = Store::open_in_memory().unwrap();
        store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();
        let mut other = payload("SC-2");
        other.nombre_apellidos = "Miguel Ángel Torres".into();
        other.status = Some(CaseStatus::RevisarGestor);
        store.create_case(&other, Utc::now()).await.unwrap();

        let (cases, total) = store
            .list_cases(&ListCasesQuery {
                status: Some("Revisar gestor".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(cases[0].codigo_sc, "SC-2");

        let (cases, total) = store
            .list_cases(&ListCasesQuery {
                search: Some("miguel".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(cases[0].codigo_sc, "SC-2");

        let (cases, total) = store
            .list_cases(&ListCasesQuery {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(cases.len(), 1);
    }

    #[tokio::test]
    async fn stats_count_pending_action_statuses() {
        let store = Store::open_in_memory().unwrap();
        for (codigo, status) in [
            ("SC-1", None),
            ("SC-2", Some(CaseStatus::RevisarGestor)),
            ("SC-3", Some(CaseStatus::CancelarSc)),
            ("SC-4", Some(CaseStatus::RelanzarSc)),
        ] {
            let mut p = payload(codigo);
            p.status = status;
            store.create_case(&p, Utc::now()).await.unwrap();
        }

        let stats = store.case_stats().await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.pending_action, 2);
        assert_eq!(stats.by_status.len(), 4);
    }

    #[tokio::test]
    async fn thread_lookup_finds_correlated_case() {
        let store = Store::open_in_memory().unwrap();
        let mut p = payload("SC-1");
        p.email_thread_id = Some("thread-abc".into());
        store.create_case(&p, Utc::now()).await.unwrap();

        let found = store.find_case_by_thread("thread-abc").await.unwrap();
        assert_eq!(found.unwrap().codigo_sc, "SC-1");
        assert!(store.find_case_by_thread("thread-xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casetrack.db");
        {
            let store = Store::open_at(&path).unwrap();
            store.create_case(&payload("SC-1"), Utc::now()).await.unwrap();
        }
        let store = Store::open_at(&path).unwrap();
        assert!(store.find_case("SC-1").await.unwrap().is_some());
    }
}
