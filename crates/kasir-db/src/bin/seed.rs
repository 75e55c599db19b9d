//! # Demo Menu Seeder
//!
//! Populates a local database with a small warung menu and its store row.
//!
//! ## Usage
//! ```bash
//! # Seed ./kasir_dev.db for store "demo-owner"
//! cargo run -p kasir-db --bin seed
//!
//! # Custom database and store
//! cargo run -p kasir-db --bin seed -- --db ./data/kasir.db --store owner-42
//! ```
//!
//! Drinks are untracked (brewed to order); packaged goods and portioned
//! dishes get a stock count.

use chrono::Utc;
use kasir_core::{MenuItem, Money, Store};
use kasir_db::{Database, DbConfig};
use std::env;
use uuid::Uuid;

/// (category, name, price in Rupiah, stock)
const MENU: &[(&str, &str, i64, Option<i64>)] = &[
    ("Makanan", "Nasi Goreng", 15_000, Some(30)),
    ("Makanan", "Mie Goreng", 12_000, Some(30)),
    ("Makanan", "Mie Rebus", 12_000, Some(30)),
    ("Makanan", "Nasi Uduk", 10_000, Some(25)),
    ("Makanan", "Ayam Geprek", 18_000, Some(20)),
    ("Makanan", "Soto Ayam", 16_000, Some(20)),
    ("Makanan", "Gado-Gado", 14_000, Some(15)),
    ("Minuman", "Es Teh Manis", 5_000, None),
    ("Minuman", "Teh Tawar", 3_000, None),
    ("Minuman", "Es Jeruk", 7_000, None),
    ("Minuman", "Kopi Hitam", 5_000, None),
    ("Minuman", "Kopi Susu", 8_000, None),
    ("Minuman", "Air Mineral", 4_000, Some(48)),
    ("Camilan", "Kerupuk", 2_000, Some(100)),
    ("Camilan", "Tahu Isi", 2_500, Some(40)),
    ("Camilan", "Pisang Goreng", 3_000, Some(40)),
    ("Camilan", "Tempe Mendoan", 3_000, Some(40)),
];

/// Items pinned to the top of the cashier grid.
const FAVORITES: &[&str] = &["Nasi Goreng", "Es Teh Manis", "Kopi Susu"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kasir_dev.db");
    let mut store_id = String::from("demo-owner");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasir Demo Menu Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./kasir_dev.db)");
                println!("  -s, --store <ID>     Store (owner) id (default: demo-owner)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kasir Demo Menu Seeder");
    println!("======================");
    println!("Database: {}", db_path);
    println!("Store:    {}", store_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.stores().get(&store_id).await?.is_none() {
        db.stores()
            .upsert(&Store {
                id: store_id.clone(),
                name: "Warung Demo".to_string(),
                max_transactions: 0,
                max_menus: 0,
                suspended: false,
                expires_at: None,
            })
            .await?;
        println!("✓ Store row created (unlimited caps)");
    }

    let existing = db.menu().count(&store_id).await?;
    if existing > 0 {
        println!("⚠ Store already has {} menu items", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let now = Utc::now();
    let mut generated = 0;
    for (category, name, price, stock) in MENU {
        let item = MenuItem {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.clone(),
            name: name.to_string(),
            price: Money::from_minor(*price),
            category: category.to_string(),
            stock: *stock,
            favorite: FAVORITES.contains(name),
            sync_version: 1,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = db.menu().upsert(&item).await {
            eprintln!("Failed to insert {}: {}", item.name, e);
            continue;
        }
        generated += 1;
    }

    println!();
    println!("✓ Generated {} menu items", generated);

    let goreng = db.menu().search(&store_id, "goreng", None).await?;
    println!("  Search 'goreng': {} results", goreng.len());
    println!("  Categories: {}", db.menu().categories(&store_id).await?.join(", "));

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
