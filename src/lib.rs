// Portal de Proveedores - Core Library
// Exposes all modules for use in the CLI, the web server and tests

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pricing;   // Price Resolver: plate ↔ price-list join
pub mod shipments; // Shipment Aggregator: monthly groups + totals

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use db::{
    Plate, PriceEntry, Shipment, Paper, Supplier, ShipmentFilter, Table, CsvRecord,
    open_database, setup_database, load_csv,
    insert_plates, insert_price_entries, insert_shipments, insert_papers, insert_supplier,
    get_all_plates, get_plates, get_plates_for_recipient, get_all_price_entries,
    get_shipments, get_all_shipments_raw, get_all_papers,
    get_supplier_by_email, get_all_suppliers, count_rows,
};
pub use auth::{
    Role, Principal, ShipmentScope,
    authorize_scope, plate_filter, hash_password, verify_password, authenticate,
    create_session, principal_for_session, delete_session,
};
pub use pricing::{
    DimensionKey, UnitPrice, PricedPlate, PriceResolver, price_plates,
};
pub use shipments::{
    MonthlyGroup, group_by_month, month_display, month_key, month_runs_are_contiguous,
    is_paid as is_paid_shipment, PAID_STATUS,
};
pub use config::{PortalConfig, ConfigError};
pub use error::{PortalError, PortalResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
