use crate::auth::Role;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use csv::StringRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// RECORDS
// JSON keys follow the Spanish column names so the web pages and any
// existing consumers of the API keep working unchanged.
// ============================================================================

/// A physical plate tracked per supplier
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Plate {
    #[serde(default)]
    pub id: i64,

    #[serde(rename = "descripcion", default)]
    pub description: String,

    #[serde(rename = "ancho")]
    pub width: f64,

    #[serde(rename = "alto")]
    pub height: f64,

    /// Email of the supplier the plate belongs to
    #[serde(rename = "proveedor")]
    pub recipient: String,

    // ========================================================================
    // EXTENSIBLE METADATA (other attributes, stored as a JSON column)
    // Serialized beside the named columns, like any other column of the row.
    // ========================================================================
    #[serde(flatten)]
    pub metadata: HashMap<String, Value>,
}

/// Price-list entry keyed by physical dimensions, priced per set of sheets
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PriceEntry {
    #[serde(default)]
    pub id: i64,

    #[serde(rename = "ancho")]
    pub width: f64,

    #[serde(rename = "alto")]
    pub height: f64,

    #[serde(rename = "costo_set")]
    pub set_price: f64,

    /// 0 means "no per-unit price" (resolves to 0, never an error)
    #[serde(rename = "placas_por_set")]
    pub sheets_per_set: i64,

    #[serde(rename = "moneda")]
    pub currency: String,
}

/// Shipment record ("envío")
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Shipment {
    #[serde(default)]
    pub id: i64,

    #[serde(rename = "fecha")]
    pub date: NaiveDate,

    /// Email of the supplier the shipment was billed to
    #[serde(rename = "destinatario")]
    pub recipient: String,

    #[serde(rename = "descripcion", default)]
    pub description: String,

    /// None is treated as 0 by every total
    #[serde(rename = "costo_total", default)]
    pub total_cost: Option<f64>,

    /// "Pagado" means paid; anything else (or None) is pending.
    /// Rows in the wild carry stray whitespace around the value.
    #[serde(rename = "estado_pago", default)]
    pub payment_status: Option<String>,

    #[serde(flatten)]
    pub metadata: HashMap<String, Value>,
}

/// Paper-stock catalog record (read-only reference data)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Paper {
    #[serde(default)]
    pub id: i64,

    #[serde(rename = "nombre")]
    pub name: String,

    #[serde(rename = "gramaje", default)]
    pub grammage: Option<f64>,

    #[serde(rename = "ancho")]
    pub width: f64,

    #[serde(rename = "alto")]
    pub height: f64,

    #[serde(default)]
    pub stock: i64,

    #[serde(flatten)]
    pub metadata: HashMap<String, Value>,
}

/// Supplier account. The password hash never leaves the store layer.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Supplier {
    pub id: i64,
    pub email: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "rol")]
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
}

/// Which shipments (or plates) a query returns.
/// Produced by the access-scoping policy, never straight from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipmentFilter {
    Recipient(String),
    Everyone,
}

/// Tables that can be counted from the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Plates,
    PriceEntries,
    Shipments,
    Papers,
    Suppliers,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Plates => "placas",
            Table::PriceEntries => "costos",
            Table::Shipments => "envios",
            Table::Papers => "papeles",
            Table::Suppliers => "proveedores",
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS placas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            descripcion TEXT NOT NULL DEFAULT '',
            ancho REAL NOT NULL,
            alto REAL NOT NULL,
            proveedor TEXT NOT NULL,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS costos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ancho REAL NOT NULL,
            alto REAL NOT NULL,
            costo_set REAL NOT NULL,
            placas_por_set INTEGER NOT NULL CHECK (placas_por_set >= 0),
            moneda TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS envios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fecha TEXT NOT NULL,
            destinatario TEXT NOT NULL,
            descripcion TEXT NOT NULL DEFAULT '',
            costo_total REAL,
            estado_pago TEXT,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS papeles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL,
            gramaje REAL,
            ancho REAL NOT NULL,
            alto REAL NOT NULL,
            stock INTEGER NOT NULL DEFAULT 0,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS proveedores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT UNIQUE NOT NULL,
            nombre TEXT NOT NULL,
            rol TEXT NOT NULL DEFAULT 'proveedor',
            password_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sesiones (
            token TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_envios_fecha ON envios(fecha);
        CREATE INDEX IF NOT EXISTS idx_envios_destinatario ON envios(destinatario);
        CREATE INDEX IF NOT EXISTS idx_placas_proveedor ON placas(proveedor);",
    )?;

    Ok(())
}

// ============================================================================
// IMPORT
// ============================================================================

/// Records that can be imported from a CSV file.
///
/// Columns listed in `NUMERIC_COLUMNS` are parsed as numbers, every other
/// column is kept as text. Columns the record does not name end up in its
/// `metadata`.
pub trait CsvRecord: DeserializeOwned {
    const NUMERIC_COLUMNS: &'static [&'static str];
}

impl CsvRecord for Plate {
    const NUMERIC_COLUMNS: &'static [&'static str] = &["id", "ancho", "alto"];
}

impl CsvRecord for PriceEntry {
    const NUMERIC_COLUMNS: &'static [&'static str] =
        &["id", "ancho", "alto", "costo_set", "placas_por_set"];
}

impl CsvRecord for Shipment {
    const NUMERIC_COLUMNS: &'static [&'static str] = &["id", "costo_total"];
}

impl CsvRecord for Paper {
    const NUMERIC_COLUMNS: &'static [&'static str] = &["id", "gramaje", "ancho", "alto", "stock"];
}

fn parse_number(field: &str) -> Option<Value> {
    if let Ok(n) = field.parse::<i64>() {
        return Some(Value::from(n));
    }
    field
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// One CSV row as a JSON object. Blank fields are left out so optional
/// columns fall back to their defaults.
fn csv_row_to_json(
    headers: &StringRecord,
    record: &StringRecord,
    numeric_columns: &[&str],
) -> Result<Map<String, Value>> {
    let mut object = Map::new();

    for (column, field) in headers.iter().zip(record.iter()) {
        let column = column.trim();
        if column.is_empty() || field.trim().is_empty() {
            continue;
        }

        let value = if numeric_columns.contains(&column) {
            parse_number(field.trim())
                .with_context(|| format!("Column {} is not a number: {:?}", column, field))?
        } else {
            Value::String(field.to_string())
        };
        object.insert(column.to_string(), value);
    }

    Ok(object)
}

/// Load any of the record types from a CSV file whose headers are the
/// Spanish column names (ancho, alto, fecha, ...)
pub fn load_csv<T: CsvRecord>(csv_path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read headers of {}", csv_path.display()))?
        .clone();

    let mut records = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let row = line + 2;
        let record = result
            .with_context(|| format!("Failed to read row {} of {}", row, csv_path.display()))?;

        let object = csv_row_to_json(&headers, &record, T::NUMERIC_COLUMNS)
            .with_context(|| format!("Bad value in row {} of {}", row, csv_path.display()))?;
        let parsed: T = serde_json::from_value(Value::Object(object))
            .with_context(|| format!("Failed to deserialize row {} of {}", row, csv_path.display()))?;
        records.push(parsed);
    }

    Ok(records)
}

fn metadata_to_json(metadata: &HashMap<String, Value>) -> Result<Option<String>> {
    if metadata.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(metadata)?))
    }
}

pub fn insert_plates(conn: &Connection, plates: &[Plate]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO placas (descripcion, ancho, alto, proveedor, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    let mut inserted = 0;
    for plate in plates {
        inserted += stmt.execute(params![
            plate.description,
            plate.width,
            plate.height,
            plate.recipient,
            metadata_to_json(&plate.metadata)?,
        ])?;
    }

    Ok(inserted)
}

pub fn insert_price_entries(conn: &Connection, entries: &[PriceEntry]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO costos (ancho, alto, costo_set, placas_por_set, moneda)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    let mut inserted = 0;
    for entry in entries {
        inserted += stmt
            .execute(params![
                entry.width,
                entry.height,
                entry.set_price,
                entry.sheets_per_set,
                entry.currency,
            ])
            .with_context(|| {
                format!(
                    "Failed to insert price entry {}x{} (placas_por_set = {})",
                    entry.width, entry.height, entry.sheets_per_set
                )
            })?;
    }

    Ok(inserted)
}

pub fn insert_shipments(conn: &Connection, shipments: &[Shipment]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO envios (fecha, destinatario, descripcion, costo_total, estado_pago, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    let mut inserted = 0;
    for shipment in shipments {
        inserted += stmt.execute(params![
            shipment.date.format("%Y-%m-%d").to_string(),
            shipment.recipient,
            shipment.description,
            shipment.total_cost,
            shipment.payment_status,
            metadata_to_json(&shipment.metadata)?,
        ])?;
    }

    Ok(inserted)
}

pub fn insert_papers(conn: &Connection, papers: &[Paper]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO papeles (nombre, gramaje, ancho, alto, stock, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    let mut inserted = 0;
    for paper in papers {
        inserted += stmt.execute(params![
            paper.name,
            paper.grammage,
            paper.width,
            paper.height,
            paper.stock,
            metadata_to_json(&paper.metadata)?,
        ])?;
    }

    Ok(inserted)
}

/// Insert a supplier. `password_hash` must already be salted + hashed.
pub fn insert_supplier(
    conn: &Connection,
    email: &str,
    name: &str,
    role: Role,
    password_hash: &str,
) -> Result<i64> {
    let result = conn.execute(
        "INSERT INTO proveedores (email, nombre, rol, password_hash) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, role.as_str(), password_hash],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            anyhow::bail!("Supplier {} already exists", email)
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// QUERIES
// ============================================================================

fn parse_metadata(json: Option<String>) -> HashMap<String, Value> {
    json.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn plate_from_row(row: &Row) -> rusqlite::Result<Plate> {
    Ok(Plate {
        id: row.get(0)?,
        description: row.get(1)?,
        width: row.get(2)?,
        height: row.get(3)?,
        recipient: row.get(4)?,
        metadata: parse_metadata(row.get(5)?),
    })
}

fn shipment_from_row(row: &Row) -> rusqlite::Result<Shipment> {
    let date_str: String = row.get(1)?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Shipment {
        id: row.get(0)?,
        date,
        recipient: row.get(2)?,
        description: row.get(3)?,
        total_cost: row.get(4)?,
        payment_status: row.get(5)?,
        metadata: parse_metadata(row.get(6)?),
    })
}

fn supplier_from_row(row: &Row) -> rusqlite::Result<Supplier> {
    let role_str: String = row.get(3)?;
    let role = role_str.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Supplier {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role,
        password_hash: row.get(4)?,
    })
}

pub fn get_all_plates(conn: &Connection) -> Result<Vec<Plate>> {
    let mut stmt = conn.prepare(
        "SELECT id, descripcion, ancho, alto, proveedor, metadata FROM placas ORDER BY id",
    )?;

    let plates = stmt
        .query_map([], plate_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(plates)
}

pub fn get_plates(conn: &Connection, filter: &ShipmentFilter) -> Result<Vec<Plate>> {
    match filter {
        ShipmentFilter::Everyone => get_all_plates(conn),
        ShipmentFilter::Recipient(email) => get_plates_for_recipient(conn, email),
    }
}

pub fn get_plates_for_recipient(conn: &Connection, recipient: &str) -> Result<Vec<Plate>> {
    let mut stmt = conn.prepare(
        "SELECT id, descripcion, ancho, alto, proveedor, metadata
         FROM placas
         WHERE proveedor = ?1
         ORDER BY id",
    )?;

    let plates = stmt
        .query_map([recipient], plate_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(plates)
}

/// Price entries in insertion order. The order matters: the price resolver
/// keeps the last entry seen for a given (ancho, alto).
pub fn get_all_price_entries(conn: &Connection) -> Result<Vec<PriceEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, ancho, alto, costo_set, placas_por_set, moneda FROM costos ORDER BY id",
    )?;

    let entries = stmt
        .query_map([], |row| {
            Ok(PriceEntry {
                id: row.get(0)?,
                width: row.get(1)?,
                height: row.get(2)?,
                set_price: row.get(3)?,
                sheets_per_set: row.get(4)?,
                currency: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

/// Shipments newest first.
///
/// The monthly aggregation relies on this ordering: same-month shipments
/// must be contiguous, so keep the ORDER BY in sync with `shipments::group_by_month`.
pub fn get_shipments(conn: &Connection, filter: &ShipmentFilter) -> Result<Vec<Shipment>> {
    let base = "SELECT id, fecha, destinatario, descripcion, costo_total, estado_pago, metadata
                FROM envios";

    let shipments = match filter {
        ShipmentFilter::Everyone => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY fecha DESC, id DESC", base))?;
            let rows = stmt
                .query_map([], shipment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        ShipmentFilter::Recipient(email) => {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE destinatario = ?1 ORDER BY fecha DESC, id DESC",
                base
            ))?;
            let rows = stmt
                .query_map([email], shipment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(shipments)
}

/// Plain table dump in storage order (no grouping, no date ordering)
pub fn get_all_shipments_raw(conn: &Connection) -> Result<Vec<Shipment>> {
    let mut stmt = conn.prepare(
        "SELECT id, fecha, destinatario, descripcion, costo_total, estado_pago, metadata
         FROM envios
         ORDER BY id",
    )?;

    let shipments = stmt
        .query_map([], shipment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(shipments)
}

pub fn get_all_papers(conn: &Connection) -> Result<Vec<Paper>> {
    let mut stmt = conn.prepare(
        "SELECT id, nombre, gramaje, ancho, alto, stock, metadata FROM papeles ORDER BY nombre, id",
    )?;

    let papers = stmt
        .query_map([], |row| {
            Ok(Paper {
                id: row.get(0)?,
                name: row.get(1)?,
                grammage: row.get(2)?,
                width: row.get(3)?,
                height: row.get(4)?,
                stock: row.get(5)?,
                metadata: parse_metadata(row.get(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(papers)
}

pub fn get_supplier_by_email(conn: &Connection, email: &str) -> Result<Option<Supplier>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, nombre, rol, password_hash FROM proveedores WHERE email = ?1",
    )?;

    let mut rows = stmt.query_map([email], supplier_from_row)?;
    match rows.next() {
        Some(supplier) => Ok(Some(supplier?)),
        None => Ok(None),
    }
}

pub fn get_all_suppliers(conn: &Connection) -> Result<Vec<Supplier>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, nombre, rol, password_hash FROM proveedores ORDER BY nombre, email",
    )?;

    let suppliers = stmt
        .query_map([], supplier_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(suppliers)
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.as_str()),
        [],
        |row| row.get(0),
    )?;

    Ok(count)
}
