use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    run_migrations(&db).await?;

    Ok(db)
}

/// Fresh in-memory database, one connection wide.
pub async fn init_memory_db() -> Result<DatabaseConnection, DbErr> {
    init_db("sqlite::memory:", 1).await
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        total_borrow_days INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        category_id INTEGER NOT NULL REFERENCES categories(id),
        estimated_price_cents INTEGER,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_counters (
        item_id INTEGER PRIMARY KEY REFERENCES items(id),
        total INTEGER NOT NULL,
        available INTEGER NOT NULL CHECK (available >= 0),
        requested INTEGER NOT NULL DEFAULT 0 CHECK (requested >= 0),
        reserved INTEGER NOT NULL DEFAULT 0 CHECK (reserved >= 0),
        borrowed INTEGER NOT NULL DEFAULT 0 CHECK (borrowed >= 0),
        lost INTEGER NOT NULL DEFAULT 0 CHECK (lost >= 0),
        queued INTEGER NOT NULL DEFAULT 0 CHECK (queued >= 0),
        version INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES items(id),
        barcode TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS condition_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        instance_id INTEGER NOT NULL REFERENCES instances(id),
        condition TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patron_email TEXT NOT NULL UNIQUE,
        holder_name TEXT NOT NULL,
        status TEXT NOT NULL,
        expires_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS digital_resources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS borrow_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        card_id INTEGER NOT NULL REFERENCES cards(id),
        status TEXT NOT NULL,
        borrow_type TEXT NOT NULL,
        expiration_date TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS request_lines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id INTEGER NOT NULL REFERENCES borrow_requests(id) ON DELETE CASCADE,
        item_id INTEGER NOT NULL REFERENCES items(id),
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_lines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id INTEGER NOT NULL REFERENCES borrow_requests(id) ON DELETE CASCADE,
        resource_id INTEGER NOT NULL REFERENCES digital_resources(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reservation_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id INTEGER NOT NULL,
        card_id INTEGER NOT NULL REFERENCES cards(id),
        item_id INTEGER NOT NULL REFERENCES items(id),
        status TEXT NOT NULL,
        reserved_at TEXT NOT NULL,
        instance_id INTEGER REFERENCES instances(id),
        assigned_at TEXT,
        pickup_from TEXT,
        pickup_until TEXT,
        expires_at TEXT,
        closed_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS borrow_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        card_id INTEGER NOT NULL REFERENCES cards(id),
        request_id INTEGER,
        borrow_type TEXT NOT NULL,
        origin TEXT NOT NULL,
        borrowed_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS record_details (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES borrow_records(id) ON DELETE CASCADE,
        card_id INTEGER NOT NULL,
        instance_id INTEGER NOT NULL REFERENCES instances(id),
        item_id INTEGER NOT NULL REFERENCES items(id),
        status TEXT NOT NULL,
        due_date TEXT,
        return_date TEXT,
        condition_before TEXT NOT NULL,
        condition_after TEXT,
        extension_count INTEGER NOT NULL DEFAULT 0,
        reservation_extension_used INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS extension_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        detail_id INTEGER NOT NULL REFERENCES record_details(id) ON DELETE CASCADE,
        previous_due_date TEXT NOT NULL,
        new_due_date TEXT NOT NULL,
        extended_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fine_policies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        condition_type TEXT NOT NULL,
        charge TEXT NOT NULL,
        amount_cents INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        detail_id INTEGER NOT NULL REFERENCES record_details(id) ON DELETE CASCADE,
        card_id INTEGER NOT NULL REFERENCES cards(id),
        policy_id INTEGER NOT NULL REFERENCES fine_policies(id),
        condition_type TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_instances_item ON instances(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_request_lines_request ON request_lines(request_id)",
    "CREATE INDEX IF NOT EXISTS idx_reservation_item_status ON reservation_queue(item_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_record_details_card ON record_details(card_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_condition_records_instance ON condition_records(instance_id)",
];

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    for sql in SCHEMA {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            (*sql).to_owned(),
        ))
        .await?;
    }
    tracing::debug!(statements = SCHEMA.len(), "schema ready");
    Ok(())
}
