// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portal_proveedores::{
    count_rows, hash_password, insert_papers, insert_plates, insert_price_entries,
    insert_shipments, insert_supplier, load_csv, logging, open_database, CsvRecord, Paper, Plate,
    PortalConfig, PriceEntry, Role, Shipment, Table,
};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "portal-proveedores", version, about = "Supplier portal: data import and terminal viewer")]
struct Cli {
    /// Config file (defaults to ./portal.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides [database] path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load placas.csv, costos.csv, envios.csv and papeles.csv from a directory
    Import {
        /// Directory holding the CSV files (missing files are skipped)
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Create a supplier account
    AddSupplier {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        /// Grant the admin role (may view every supplier's shipments)
        #[arg(long)]
        admin: bool,
    },

    /// Browse shipments by month and priced plates (default)
    View {
        /// Supplier email to show; all suppliers when omitted
        #[arg(long)]
        proveedor: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PortalConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    logging::init(&config.logging);

    match cli.command.unwrap_or(Command::View { proveedor: None }) {
        Command::Import { dir } => run_import(&config.database.path, &dir),
        Command::AddSupplier { email, name, password, admin } => {
            run_add_supplier(&config.database.path, &email, &name, &password, admin)
        }
        Command::View { proveedor } => run_ui_mode(&config.database.path, proveedor),
    }
}

fn import_file<T, F>(conn: &Connection, dir: &Path, file: &str, insert: F) -> Result<Option<usize>>
where
    T: CsvRecord,
    F: Fn(&Connection, &[T]) -> Result<usize>,
{
    let path = dir.join(file);
    if !path.exists() {
        println!("  · {} not found, skipped", file);
        return Ok(None);
    }

    let records: Vec<T> = load_csv(&path)?;
    let inserted = insert(conn, &records).with_context(|| format!("Failed to import {}", file))?;
    println!("  ✓ {}: {} rows", file, inserted);
    Ok(Some(inserted))
}

fn run_import(db_path: &Path, dir: &Path) -> Result<()> {
    println!("🗄️  Import: CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(db_path)?;
    println!("✓ Database ready at {}", db_path.display());

    // One transaction so a bad file leaves the database untouched
    conn.execute_batch("BEGIN")?;
    let result = (|| -> Result<()> {
        import_file::<Plate, _>(&conn, dir, "placas.csv", insert_plates)?;
        import_file::<PriceEntry, _>(&conn, dir, "costos.csv", insert_price_entries)?;
        import_file::<Shipment, _>(&conn, dir, "envios.csv", insert_shipments)?;
        import_file::<Paper, _>(&conn, dir, "papeles.csv", insert_papers)?;
        Ok(())
    })();

    match result {
        Ok(()) => conn.execute_batch("COMMIT")?,
        Err(e) => {
            conn.execute_batch("ROLLBACK")?;
            return Err(e);
        }
    }

    println!("\n🔍 Rows in database:");
    for table in [Table::Plates, Table::PriceEntries, Table::Shipments, Table::Papers, Table::Suppliers] {
        println!("  {:<12} {}", table.as_str(), count_rows(&conn, table)?);
    }

    info!(dir = %dir.display(), "import finished");
    Ok(())
}

fn run_add_supplier(db_path: &Path, email: &str, name: &str, password: &str, admin: bool) -> Result<()> {
    let conn = open_database(db_path)?;
    let role = if admin { Role::Admin } else { Role::Proveedor };

    let id = insert_supplier(&conn, email.trim(), name, role, &hash_password(password))?;
    println!("✓ Supplier {} ({}) created with id {}", email, role, id);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(db_path: &Path, proveedor: Option<String>) -> Result<()> {
    use portal_proveedores::{get_all_price_entries, get_plates, get_shipments, group_by_month, price_plates, ShipmentFilter};

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run `portal-proveedores import` first.",
            db_path.display()
        );
    }

    let conn = open_database(db_path)?;

    let (filter, scope_label) = match proveedor {
        Some(email) => (ShipmentFilter::Recipient(email.clone()), email),
        None => (ShipmentFilter::Everyone, "Todos los proveedores".to_string()),
    };

    let groups = group_by_month(get_shipments(&conn, &filter)?);
    let plates = price_plates(&get_all_price_entries(&conn)?, get_plates(&conn, &filter)?);
    info!(months = groups.len(), plates = plates.len(), "viewer data loaded");

    let mut app = ui::App::new(scope_label, groups, plates);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_db_path: &Path, _proveedor: Option<String>) -> Result<()> {
    anyhow::bail!(
        "TUI mode not available. Rebuild with `--features tui` or use the web server: \
         cargo run --bin portal-server --features server"
    )
}
