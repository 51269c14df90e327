// crates/tillhouse-store-sqlite/src/schema.rs
// ============================================================================
// Module: Tillhouse Schema
// Description: Canonical tenant and master DDL plus additive column history.
// Purpose: Define every table once so create and migrate cannot drift apart.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A [`SchemaPlan`] lists the canonical tables, the columns added to those
//! tables after their first release, the secondary indexes, and the version
//! stamped into `PRAGMA user_version`. Creating a database and upgrading one
//! both walk the same plan.
//!
//! The plan is additive only: entries are never removed, renamed, or retyped.
//! New structure is appended and the version constant bumped.

// ============================================================================
// SECTION: Types
// ============================================================================

/// One canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: &'static str,
    /// Full current `CREATE TABLE IF NOT EXISTS` statement.
    pub ddl: &'static str,
}

/// One column added after its table was first released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Owning table.
    pub table: &'static str,
    /// Column name.
    pub column: &'static str,
    /// Column definition accepted by `ALTER TABLE ... ADD COLUMN`.
    pub definition: &'static str,
}

/// One secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name.
    pub name: &'static str,
    /// `CREATE INDEX IF NOT EXISTS` statement.
    pub ddl: &'static str,
}

/// Full description of one database kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaPlan {
    /// Label used in reports and errors.
    pub label: &'static str,
    /// Canonical tables.
    pub tables: &'static [TableSpec],
    /// Column history.
    pub columns: &'static [ColumnSpec],
    /// Secondary indexes, created after every column exists.
    pub indexes: &'static [IndexSpec],
    /// Rows inserted once when a database is created.
    pub seeds: &'static [&'static str],
    /// Version stamped into `PRAGMA user_version`.
    pub version: i64,
}

impl SchemaPlan {
    /// Returns the canonical table names.
    pub fn table_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|table| table.name)
    }
}

// ============================================================================
// SECTION: Versions
// ============================================================================

/// Tenant schema version written after create or migration.
pub const TENANT_SCHEMA_VERSION: i64 = 4;
/// Master schema version written after initialization.
pub const MASTER_SCHEMA_VERSION: i64 = 2;

// ============================================================================
// SECTION: Tenant Schema
// ============================================================================

/// Tenant database schema.
pub const TENANT_SCHEMA: SchemaPlan = SchemaPlan {
    label: "tenant",
    tables: TENANT_TABLES,
    columns: TENANT_COLUMNS,
    indexes: TENANT_INDEXES,
    seeds: TENANT_SEEDS,
    version: TENANT_SCHEMA_VERSION,
};

/// Canonical tenant tables in creation order.
const TENANT_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "users",
        ddl: "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT,
            role TEXT NOT NULL DEFAULT 'cashier',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "categories",
        ddl: "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "products",
        ddl: "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            price REAL NOT NULL DEFAULT 0,
            cost_price REAL NOT NULL DEFAULT 0,
            stock_quantity REAL NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            track_stock INTEGER NOT NULL DEFAULT 1,
            barcode TEXT,
            purchase_rate REAL NOT NULL DEFAULT 0,
            weight_value REAL,
            weight_unit TEXT,
            vat_percentage REAL NOT NULL DEFAULT 0,
            base_unit TEXT NOT NULL DEFAULT 'pcs',
            purchase_unit TEXT,
            sale_unit TEXT
        )",
    },
    TableSpec {
        name: "customers",
        ddl: "CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            address TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "delivery_agents",
        ddl: "CREATE TABLE IF NOT EXISTS delivery_agents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "sales",
        ddl: "CREATE TABLE IF NOT EXISTS sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_number TEXT NOT NULL UNIQUE,
            customer_id INTEGER REFERENCES customers(id) ON DELETE SET NULL,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            subtotal REAL NOT NULL DEFAULT 0,
            tax_amount REAL NOT NULL DEFAULT 0,
            discount REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            payment_method TEXT NOT NULL DEFAULT 'cash',
            status TEXT NOT NULL DEFAULT 'completed',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            order_type TEXT NOT NULL DEFAULT 'dine_in',
            delivery_agent_id INTEGER,
            delivery_address TEXT,
            delivery_charge REAL NOT NULL DEFAULT 0,
            delivery_status TEXT
        )",
    },
    TableSpec {
        name: "sale_items",
        ddl: "CREATE TABLE IF NOT EXISTS sale_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sale_id INTEGER NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
            product_id INTEGER REFERENCES products(id) ON DELETE SET NULL,
            product_name TEXT NOT NULL,
            quantity REAL NOT NULL,
            unit_price REAL NOT NULL,
            total REAL NOT NULL,
            vat_percentage REAL NOT NULL DEFAULT 0,
            vat_amount REAL NOT NULL DEFAULT 0,
            unit TEXT,
            conversion_factor REAL NOT NULL DEFAULT 1,
            base_quantity REAL
        )",
    },
    TableSpec {
        name: "held_sales",
        ddl: "CREATE TABLE IF NOT EXISTS held_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT,
            cart_json TEXT NOT NULL,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "settings",
        ddl: "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "employees",
        ddl: "CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT,
            designation TEXT,
            base_salary REAL NOT NULL DEFAULT 0,
            joined_on TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "salary_records",
        ddl: "CREATE TABLE IF NOT EXISTS salary_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
            period TEXT NOT NULL,
            amount REAL NOT NULL,
            paid_on TEXT,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "salary_advances",
        ddl: "CREATE TABLE IF NOT EXISTS salary_advances (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
            amount REAL NOT NULL,
            given_on TEXT NOT NULL,
            settled INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "suppliers",
        ddl: "CREATE TABLE IF NOT EXISTS suppliers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            address TEXT,
            balance REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "supplier_ledger",
        ddl: "CREATE TABLE IF NOT EXISTS supplier_ledger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            supplier_id INTEGER NOT NULL REFERENCES suppliers(id) ON DELETE CASCADE,
            entry_type TEXT NOT NULL CHECK (entry_type IN ('purchase', 'payment', 'adjustment')),
            amount REAL NOT NULL,
            reference TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "purchase_orders",
        ddl: "CREATE TABLE IF NOT EXISTS purchase_orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            supplier_id INTEGER NOT NULL REFERENCES suppliers(id),
            order_number TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'draft'
                CHECK (status IN ('draft', 'confirmed', 'received', 'cancelled')),
            total REAL NOT NULL DEFAULT 0,
            paid_amount REAL NOT NULL DEFAULT 0,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            confirmed_at TEXT,
            received_at TEXT
        )",
    },
    TableSpec {
        name: "purchase_order_items",
        ddl: "CREATE TABLE IF NOT EXISTS purchase_order_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            purchase_order_id INTEGER NOT NULL REFERENCES purchase_orders(id) ON DELETE CASCADE,
            product_id INTEGER NOT NULL REFERENCES products(id),
            quantity REAL NOT NULL,
            unit_cost REAL NOT NULL,
            total REAL NOT NULL,
            unit TEXT,
            conversion_factor REAL NOT NULL DEFAULT 1
        )",
    },
    TableSpec {
        name: "expense_categories",
        ddl: "CREATE TABLE IF NOT EXISTS expense_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "expenses",
        ddl: "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER REFERENCES expense_categories(id) ON DELETE SET NULL,
            amount REAL NOT NULL,
            description TEXT,
            spent_on TEXT NOT NULL,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "cash_ledger",
        ddl: "CREATE TABLE IF NOT EXISTS cash_ledger (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_type TEXT NOT NULL CHECK (entry_type IN ('in', 'out')),
            amount REAL NOT NULL,
            source TEXT NOT NULL,
            reference_id INTEGER,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    },
    TableSpec {
        name: "unit_conversions",
        ddl: "CREATE TABLE IF NOT EXISTS unit_conversions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            from_unit TEXT NOT NULL,
            to_unit TEXT NOT NULL,
            factor REAL NOT NULL CHECK (factor > 0),
            UNIQUE (product_id, from_unit, to_unit)
        )",
    },
];

/// Columns added to tenant tables after their first release.
const TENANT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { table: "products", column: "track_stock", definition: "INTEGER NOT NULL DEFAULT 1" },
    ColumnSpec { table: "products", column: "barcode", definition: "TEXT" },
    ColumnSpec { table: "products", column: "purchase_rate", definition: "REAL NOT NULL DEFAULT 0" },
    ColumnSpec { table: "products", column: "weight_value", definition: "REAL" },
    ColumnSpec { table: "products", column: "weight_unit", definition: "TEXT" },
    ColumnSpec { table: "products", column: "vat_percentage", definition: "REAL NOT NULL DEFAULT 0" },
    ColumnSpec { table: "products", column: "base_unit", definition: "TEXT NOT NULL DEFAULT 'pcs'" },
    ColumnSpec { table: "products", column: "purchase_unit", definition: "TEXT" },
    ColumnSpec { table: "products", column: "sale_unit", definition: "TEXT" },
    ColumnSpec { table: "sales", column: "order_type", definition: "TEXT NOT NULL DEFAULT 'dine_in'" },
    ColumnSpec { table: "sales", column: "delivery_agent_id", definition: "INTEGER" },
    ColumnSpec { table: "sales", column: "delivery_address", definition: "TEXT" },
    ColumnSpec { table: "sales", column: "delivery_charge", definition: "REAL NOT NULL DEFAULT 0" },
    ColumnSpec { table: "sales", column: "delivery_status", definition: "TEXT" },
    ColumnSpec { table: "sale_items", column: "vat_percentage", definition: "REAL NOT NULL DEFAULT 0" },
    ColumnSpec { table: "sale_items", column: "vat_amount", definition: "REAL NOT NULL DEFAULT 0" },
    ColumnSpec { table: "sale_items", column: "unit", definition: "TEXT" },
    ColumnSpec {
        table: "sale_items",
        column: "conversion_factor",
        definition: "REAL NOT NULL DEFAULT 1",
    },
    ColumnSpec { table: "sale_items", column: "base_quantity", definition: "REAL" },
];

/// Tenant secondary indexes.
const TENANT_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "idx_products_barcode",
        ddl: "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode)",
    },
    IndexSpec {
        name: "idx_sales_created_at",
        ddl: "CREATE INDEX IF NOT EXISTS idx_sales_created_at ON sales(created_at)",
    },
    IndexSpec {
        name: "idx_sale_items_sale_id",
        ddl: "CREATE INDEX IF NOT EXISTS idx_sale_items_sale_id ON sale_items(sale_id)",
    },
    IndexSpec {
        name: "idx_supplier_ledger_supplier_id",
        ddl: "CREATE INDEX IF NOT EXISTS idx_supplier_ledger_supplier_id ON supplier_ledger(supplier_id)",
    },
    IndexSpec {
        name: "idx_purchase_order_items_order_id",
        ddl: "CREATE INDEX IF NOT EXISTS idx_purchase_order_items_order_id \
              ON purchase_order_items(purchase_order_id)",
    },
    IndexSpec {
        name: "idx_expenses_spent_on",
        ddl: "CREATE INDEX IF NOT EXISTS idx_expenses_spent_on ON expenses(spent_on)",
    },
    IndexSpec {
        name: "idx_cash_ledger_created_at",
        ddl: "CREATE INDEX IF NOT EXISTS idx_cash_ledger_created_at ON cash_ledger(created_at)",
    },
];

/// Default settings seeded into every new tenant database.
const TENANT_SEEDS: &[&str] = &[
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('currency', 'USD')",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('tax_rate', '0')",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('receipt_footer', 'Thank you for your visit!')",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('low_stock_threshold', '10')",
];

// ============================================================================
// SECTION: Master Schema
// ============================================================================

/// Master registry schema.
pub const MASTER_SCHEMA: SchemaPlan = SchemaPlan {
    label: "master",
    tables: MASTER_TABLES,
    columns: MASTER_COLUMNS,
    indexes: MASTER_INDEXES,
    seeds: &[],
    version: MASTER_SCHEMA_VERSION,
};

/// Canonical master tables.
const MASTER_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "tenants",
        ddl: "CREATE TABLE IF NOT EXISTS tenants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_code TEXT NOT NULL UNIQUE,
            business_name TEXT NOT NULL,
            owner_name TEXT NOT NULL,
            owner_email TEXT NOT NULL UNIQUE,
            owner_phone TEXT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'inactive', 'active')),
            created_by_role TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            activated_at INTEGER,
            valid_until INTEGER
        )",
    },
    TableSpec {
        name: "super_admins",
        ddl: "CREATE TABLE IF NOT EXISTS super_admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    },
    TableSpec {
        name: "admins",
        ddl: "CREATE TABLE IF NOT EXISTS admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_by TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )",
    },
    TableSpec {
        name: "activity_logs",
        ddl: "CREATE TABLE IF NOT EXISTS activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_role TEXT,
            actor TEXT,
            action TEXT NOT NULL,
            tenant_code TEXT,
            detail TEXT,
            created_at INTEGER NOT NULL
        )",
    },
];

/// Columns added to master tables after their first release.
const MASTER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { table: "tenants", column: "activated_at", definition: "INTEGER" },
    ColumnSpec { table: "tenants", column: "valid_until", definition: "INTEGER" },
];

/// Master secondary indexes.
const MASTER_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "idx_tenants_status",
        ddl: "CREATE INDEX IF NOT EXISTS idx_tenants_status ON tenants(status)",
    },
    IndexSpec {
        name: "idx_activity_logs_created_at",
        ddl: "CREATE INDEX IF NOT EXISTS idx_activity_logs_created_at ON activity_logs(created_at)",
    },
];

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::MASTER_SCHEMA;
    use super::SchemaPlan;
    use super::TENANT_SCHEMA;

    fn assert_consistent(plan: &SchemaPlan) {
        let tables: BTreeSet<_> = plan.table_names().collect();
        assert_eq!(tables.len(), plan.tables.len(), "duplicate table in {}", plan.label);
        for column in plan.columns {
            assert!(tables.contains(column.table), "unknown table {}", column.table);
            let ddl = plan.tables.iter().find(|table| table.name == column.table).map(|t| t.ddl);
            assert!(
                ddl.is_some_and(|ddl| ddl.contains(&format!("{} {}", column.column, column.definition))),
                "canonical DDL for {} lacks {}",
                column.table,
                column.column
            );
        }
        for table in plan.tables {
            assert!(table.ddl.starts_with("CREATE TABLE IF NOT EXISTS"));
        }
        for index in plan.indexes {
            assert!(index.ddl.contains(index.name));
        }
    }

    #[test]
    fn tenant_plan_is_self_consistent() {
        assert_consistent(&TENANT_SCHEMA);
        assert_eq!(TENANT_SCHEMA.tables.len(), 20);
    }

    #[test]
    fn master_plan_is_self_consistent() {
        assert_consistent(&MASTER_SCHEMA);
        assert!(MASTER_SCHEMA.seeds.is_empty());
    }
}
