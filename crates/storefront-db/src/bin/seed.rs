//! # Seed Data Generator
//!
//! Populates a development database with a storefront catalog.
//!
//! ## Usage
//! ```bash
//! # Generate 200 products (default)
//! cargo run -p storefront-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p storefront-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p storefront-db --bin seed -- --db ./data/storefront.db
//! ```
//!
//! Each product has a unique SKU `{CATEGORY}-{NAME}-{SIZE}`, a price derived
//! from its position, and opening stock between 0 and 60 so low-stock and
//! out-of-stock reporting has something to show.

use std::env;
use storefront_core::NewProduct;
use storefront_db::{Database, DbConfig};

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "TOP",
        &[
            "Crew Neck Tee",
            "V-Neck Tee",
            "Polo Shirt",
            "Oxford Shirt",
            "Linen Shirt",
            "Hoodie",
            "Zip Hoodie",
            "Sweatshirt",
            "Cardigan",
            "Tank Top",
        ],
    ),
    (
        "BTM",
        &[
            "Slim Jeans",
            "Straight Jeans",
            "Chinos",
            "Cargo Pants",
            "Joggers",
            "Shorts",
            "Swim Shorts",
            "Pleated Skirt",
            "Denim Skirt",
            "Leggings",
        ],
    ),
    (
        "ACC",
        &[
            "Baseball Cap",
            "Beanie",
            "Tote Bag",
            "Backpack",
            "Leather Belt",
            "Wool Scarf",
            "Sunglasses",
            "Canvas Wallet",
            "Socks 3-Pack",
            "Enamel Mug",
        ],
    ),
    (
        "SHO",
        &[
            "Canvas Sneakers",
            "Running Shoes",
            "Leather Boots",
            "Sandals",
            "Slip-Ons",
            "Loafers",
        ],
    ),
];

/// Size variants with their price addon in cents.
const SIZES: &[(&str, i64)] = &[("S", 0), ("M", 0), ("L", 200), ("XL", 400)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./storefront_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./storefront_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Storefront Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating products...");

    let mut generated = 0;
    let start = std::time::Instant::now();

    'outer: for (category_code, names) in CATEGORIES {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, price_addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let product = generate_product(category_code, name, size, *price_addon, name_idx * 10 + size_idx);
                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.sku, e);
                    continue;
                }

                generated += 1;
                if generated % 50 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);

    let stats = db.products().inventory_stats().await?;
    println!();
    println!("Inventory:");
    println!("  Units in stock: {}", stats.total_units_in_stock);
    println!("  Low stock:      {}", stats.low_stock_count);
    println!("  Out of stock:   {}", stats.out_of_stock_count);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds one catalog entry with deterministic data.
fn generate_product(category: &str, name: &str, size: &str, price_addon: i64, seed: usize) -> NewProduct {
    let code: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(6)
        .collect();
    let sku = format!("{}-{}-{}", category, code.to_uppercase(), size);

    // $9.99 - $89.99 + size addon
    let price_cents = 999 + ((seed * 37) % 80) as i64 * 100 + price_addon;

    NewProduct {
        sku,
        name: format!("{} ({})", name, size),
        description: None,
        price_cents,
        initial_stock: ((seed * 13) % 61) as i64,
        low_stock_threshold: None,
        is_featured: seed % 17 == 0,
    }
}
