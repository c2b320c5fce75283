// 📦 Shipment Aggregator - monthly groups with billed / paid / pending totals
//
// Input must already be ordered by date (newest first, as the store returns
// it). The walk is a single pass that closes a group whenever the month
// changes; it never sorts or regroups. Shipments of the same month that are
// not adjacent therefore end up in separate groups.

use crate::db::Shipment;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Normalized status that counts a shipment as paid
pub const PAID_STATUS: &str = "Pagado";

/// English month name (as printed by `%B`) → Spanish label
const MONTH_NAMES: [(&str, &str); 12] = [
    ("January", "Enero"),
    ("February", "Febrero"),
    ("March", "Marzo"),
    ("April", "Abril"),
    ("May", "Mayo"),
    ("June", "Junio"),
    ("July", "Julio"),
    ("August", "Agosto"),
    ("September", "Septiembre"),
    ("October", "Octubre"),
    ("November", "Noviembre"),
    ("December", "Diciembre"),
];

// ============================================================================
// MONTHLY GROUP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyGroup {
    /// "YYYY-MM"
    #[serde(rename = "mes")]
    pub month_key: String,

    /// e.g. "Marzo 2024"
    #[serde(rename = "mes_display")]
    pub month_display: String,

    #[serde(rename = "envios")]
    pub shipments: Vec<Shipment>,

    #[serde(rename = "total_facturado")]
    pub total_billed: f64,

    #[serde(rename = "total_pagado")]
    pub total_paid: f64,

    /// Always total_billed - total_paid
    #[serde(rename = "total_pendiente")]
    pub total_pending: f64,
}

impl MonthlyGroup {
    fn open(month_key: String, date: NaiveDate) -> Self {
        MonthlyGroup {
            month_key,
            month_display: month_display(date),
            shipments: Vec::new(),
            total_billed: 0.0,
            total_paid: 0.0,
            total_pending: 0.0,
        }
    }

    fn add(&mut self, shipment: Shipment) {
        let cost = shipment.total_cost.unwrap_or(0.0);
        self.total_billed += cost;
        if is_paid(&shipment) {
            self.total_paid += cost;
        }
        self.shipments.push(shipment);
    }

    fn close(mut self) -> Self {
        self.total_pending = self.total_billed - self.total_paid;
        self
    }

    pub fn shipment_count(&self) -> usize {
        self.shipments.len()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Spanish name for an English month name; unknown names pass through untouched
pub fn translate_month(english: &str) -> &str {
    MONTH_NAMES
        .iter()
        .find(|(en, _)| *en == english)
        .map(|(_, es)| *es)
        .unwrap_or(english)
}

/// "<Mes> <Año>", e.g. "Marzo 2024"
pub fn month_display(date: NaiveDate) -> String {
    let english = date.format("%B").to_string();
    format!("{} {}", translate_month(&english), date.year())
}

/// Trim stray whitespace; a missing status stays missing
pub fn normalize_payment_status(status: Option<String>) -> Option<String> {
    status.map(|s| s.trim().to_string())
}

pub fn is_paid(shipment: &Shipment) -> bool {
    shipment.payment_status.as_deref().map(str::trim) == Some(PAID_STATUS)
}

/// True when every month's shipments form a single run in `shipments`.
/// `group_by_month` only produces one group per month when this holds.
pub fn month_runs_are_contiguous(shipments: &[Shipment]) -> bool {
    let mut closed: HashSet<String> = HashSet::new();
    let mut current: Option<String> = None;

    for shipment in shipments {
        let key = month_key(shipment.date);
        if current.as_deref() == Some(key.as_str()) {
            continue;
        }
        if closed.contains(&key) {
            return false;
        }
        if let Some(previous) = current.replace(key) {
            closed.insert(previous);
        }
    }

    true
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Partition date-ordered shipments into monthly groups, preserving input order.
///
/// ```
/// use portal_proveedores::{group_by_month, Shipment};
/// use chrono::NaiveDate;
/// use std::collections::HashMap;
///
/// let shipment = |date: &str, cost: f64, status: Option<&str>| Shipment {
///     id: 0,
///     date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
///     recipient: "ana@example.com".to_string(),
///     description: String::new(),
///     total_cost: Some(cost),
///     payment_status: status.map(String::from),
///     metadata: HashMap::new(),
/// };
///
/// let groups = group_by_month(vec![
///     shipment("2024-03-05", 100.0, Some("Pagado")),
///     shipment("2024-03-01", 50.0, None),
///     shipment("2024-02-20", 30.0, Some("Pagado")),
/// ]);
///
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups[0].month_display, "Marzo 2024");
/// assert_eq!(groups[0].total_pending, 50.0);
/// assert_eq!(groups[1].total_paid, 30.0);
/// ```
pub fn group_by_month(shipments: Vec<Shipment>) -> Vec<MonthlyGroup> {
    let mut groups: Vec<MonthlyGroup> = Vec::new();
    let mut open: Option<MonthlyGroup> = None;
    let mut closed_keys: HashSet<String> = HashSet::new();

    for mut shipment in shipments {
        shipment.payment_status = normalize_payment_status(shipment.payment_status.take());
        let key = month_key(shipment.date);

        let same_month = open.as_ref().map(|g| g.month_key == key).unwrap_or(false);
        if !same_month {
            if let Some(group) = open.take() {
                closed_keys.insert(group.month_key.clone());
                groups.push(group.close());
            }
            if closed_keys.contains(&key) {
                warn!(
                    mes = %key,
                    envio_id = shipment.id,
                    "shipments are not ordered by date, month split into several groups"
                );
            }
            open = Some(MonthlyGroup::open(key, shipment.date));
        }

        if let Some(group) = open.as_mut() {
            group.add(shipment);
        }
    }

    if let Some(group) = open {
        groups.push(group.close());
    }

    groups
}
