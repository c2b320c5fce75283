// 🔐 Authentication + access scoping
//
// Principals are resolved per request from the session cookie and handed to
// the handlers explicitly. Nothing here keeps login state in memory: sessions
// live in the `sesiones` table next to the data they guard.

use crate::db::{get_supplier_by_email, ShipmentFilter, Supplier};
use crate::error::{PortalError, PortalResult};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ROLES + PRINCIPAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Proveedor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Proveedor => "proveedor",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "proveedor" => Ok(Role::Proveedor),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub email: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "rol")]
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Supplier> for Principal {
    fn from(supplier: Supplier) -> Self {
        Principal {
            email: supplier.email,
            name: supplier.name,
            role: supplier.role,
        }
    }
}

// ============================================================================
// SHIPMENT SCOPE
// ============================================================================

/// What a request asks to see, as given by the `proveedor` query parameter.
///
/// - absent or `"default"` → the caller's own shipments
/// - `"all"` → every supplier
/// - anything else → that literal recipient. It is not checked against the
///   list of known suppliers; an unknown recipient simply yields no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipmentScope {
    Own,
    All,
    Recipient(String),
}

impl ShipmentScope {
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("") | Some("default") => ShipmentScope::Own,
            Some("all") => ShipmentScope::All,
            Some(email) => ShipmentScope::Recipient(email.to_string()),
        }
    }

    pub fn is_elevated(&self) -> bool {
        !matches!(self, ShipmentScope::Own)
    }

    /// A recipient naming the caller is just the caller's own scope
    fn relative_to(self, principal: &Principal) -> Self {
        match self {
            ShipmentScope::Recipient(email) if email == principal.email => ShipmentScope::Own,
            other => other,
        }
    }
}

/// Turn a requested scope into a store filter, or refuse it.
///
/// Only admins may look past their own shipments.
pub fn authorize_scope(principal: &Principal, scope: ShipmentScope) -> PortalResult<ShipmentFilter> {
    let scope = scope.relative_to(principal);
    if scope.is_elevated() && !principal.is_admin() {
        return Err(PortalError::forbidden(format!(
            "role '{}' may only view its own shipments",
            principal.role
        )));
    }

    Ok(match scope {
        ShipmentScope::Own => ShipmentFilter::Recipient(principal.email.clone()),
        ShipmentScope::All => ShipmentFilter::Everyone,
        ShipmentScope::Recipient(email) => ShipmentFilter::Recipient(email),
    })
}

/// Plates follow the same rule without a selector: admins see every plate.
pub fn plate_filter(principal: &Principal) -> ShipmentFilter {
    if principal.is_admin() {
        ShipmentFilter::Everyone
    } else {
        ShipmentFilter::Recipient(principal.email.clone())
    }
}

// ============================================================================
// PASSWORDS (salted SHA-256, stored as "salt$hexdigest")
// ============================================================================

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) if !salt.is_empty() => {
            let actual = digest(salt, password);
            // Compare every byte so timing does not leak the matching prefix
            actual.len() == expected.len()
                && actual
                    .bytes()
                    .zip(expected.bytes())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
        }
        _ => false,
    }
}

/// Check email + password against the store.
///
/// Bad credentials are `Ok(None)`, not an error: the caller shows a message.
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<Option<Principal>> {
    let supplier = match get_supplier_by_email(conn, email.trim())? {
        Some(supplier) => supplier,
        None => return Ok(None),
    };

    if verify_password(password, &supplier.password_hash) {
        Ok(Some(supplier.into()))
    } else {
        Ok(None)
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

pub const SESSION_COOKIE: &str = "sesion";

pub fn create_session(conn: &Connection, principal: &Principal) -> Result<String> {
    let token = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO sesiones (token, email, created_at) VALUES (?1, ?2, ?3)",
        params![token, principal.email, Utc::now().to_rfc3339()],
    )?;

    Ok(token)
}

/// Resolve a session token. A session whose supplier was deleted resolves to None.
pub fn principal_for_session(conn: &Connection, token: &str) -> Result<Option<Principal>> {
    let email: Option<String> = conn
        .query_row(
            "SELECT email FROM sesiones WHERE token = ?1",
            [token],
            |row| row.get(0),
        )
        .optional()?;

    match email {
        Some(email) => Ok(get_supplier_by_email(conn, &email)?.map(Principal::from)),
        None => Ok(None),
    }
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM sesiones WHERE token = ?1", [token])?;
    Ok(deleted > 0)
}

/// Pull the session token out of a raw `Cookie` header value
pub fn session_token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
