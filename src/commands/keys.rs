use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use rand::{Rng, RngCore};
use std::path::Path;

use wiretap::{config, server, store};

const ADJECTIVES: &[&str] = &[
    "Ancient",
    "Gnarled",
    "Forgotten",
    "Hollow",
    "Leafy",
    "Lonesome",
    "Lush",
    "Majestic",
    "Noble",
    "Powerful",
    "Serene",
    "Shady",
    "Stunted",
    "Towering",
    "Vibrant",
    "Whispering",
];

const TREES: &[&str] = &[
    "Alder",
    "Arbutus",
    "Aspen",
    "Birch",
    "Cedar",
    "Elm",
    "Fir",
    "Maple",
    "Oak",
    "Pine",
    "Poplar",
    "Sequoia",
    "Spruce",
    "Sycamore",
    "Willow",
];

/// Execute the keys generate command
///
/// A user-supplied name that already exists keeps its existing key; a
/// generated name that collides is regenerated until it is unique.
pub async fn generate(config_path: &Path, name: Option<String>) -> Result<()> {
    let cfg = config::load_config(&config_path.to_string_lossy())?;
    let pool = server::init_pool(&cfg.database.path).await?;

    if let Some(name) = name {
        if store::api_key_name_exists(&pool, &name).await? {
            println!(
                "A key named {} already exists; keeping its existing key",
                name.bold()
            );
            return Ok(());
        }
        let key = generate_key();
        store::create_api_key(&pool, &name, &key).await?;
        print_new_key(&name, &key);
        return Ok(());
    }

    let (name, key) = loop {
        let candidate = generate_key_name();
        if !store::api_key_name_exists(&pool, &candidate).await? {
            break (candidate, generate_key());
        }
    };
    store::create_api_key(&pool, &name, &key).await?;
    print_new_key(&name, &key);
    Ok(())
}

/// Execute the keys list command
pub async fn list(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(&config_path.to_string_lossy())?;
    let pool = server::init_pool(&cfg.database.path).await?;
    let keys = store::list_api_keys(&pool).await?;

    if keys.is_empty() {
        println!("No api keys");
        return Ok(());
    }

    println!("{}", "current api keys".bold());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("NAME").fg(Color::Cyan),
        Cell::new("CREATED AT").fg(Color::Cyan),
    ]);
    for key in &keys {
        table.add_row(vec![
            Cell::new(&key.name),
            Cell::new(key.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Execute the keys delete command
pub async fn delete(config_path: &Path, name: &str) -> Result<()> {
    let cfg = config::load_config(&config_path.to_string_lossy())?;
    let pool = server::init_pool(&cfg.database.path).await?;

    let deleted = store::delete_api_key(&pool, name).await?;
    if deleted > 0 {
        println!("Key {} deleted", name.bold());
    } else {
        println!("{}", format!("No key named {}", name).yellow());
    }
    Ok(())
}

fn print_new_key(name: &str, key: &str) {
    println!("{}", "✓ Key created".green());
    println!("  Name: {}", name.bold());
    println!("  Key:  {}", key.bold());
    println!();
    println!("Send it in the {} header when calling the read API", "x-wiretap-key".bold());
}

/// 32 hex characters from 16 cryptographically strong random bytes.
fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A somewhat-unique and somewhat-readable name, AdjectiveTree00x style.
fn generate_key_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let tree = TREES[rng.gen_range(0..TREES.len())];
    let number: u8 = rng.gen_range(10..100);
    let letter = (b'a' + rng.gen_range(0..26u8)) as char;
    format!("{}{}{}{}", adjective, tree, number, letter)
}
