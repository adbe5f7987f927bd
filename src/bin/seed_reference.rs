//! Seed and maintain the fixed reference data outside the running service.
//!
//! Usage: cargo run --bin seed_reference <config.json> [command]
//!
//! Commands:
//!   (none)                          seed regions / templates / stock rows
//!   regions                         list regions with their chat bindings
//!   stock <vaccine> <quantity>      set the national on-hand quantity
//!   link-chat <region_id> <chat>    bind a Telegram chat to a region
//!   unlink-chat <region_id>         remove a region's chat binding

use vaccibot::config::Config;
use vaccibot::db::Database;
use vaccibot::schedule;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(config_path) = args.get(1) else {
        eprintln!("Usage: seed_reference <config.json> [command]");
        std::process::exit(2);
    };
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    std::fs::create_dir_all(&config.data_dir).ok();
    let db = Database::load_or_new(&config.database_path);

    match args.get(2).map(String::as_str) {
        None => {
            let (regions, templates, stock_rows) = schedule::seed_reference(&db);
            println!("Seeded {regions} region(s), {templates} template(s), {stock_rows} stock row(s)");
        }
        Some("regions") => {
            for region in db.regions() {
                let chat = region.telegram_chat_id.as_deref().unwrap_or("-");
                println!(
                    "{:<3} {:<35} births/yr {:<8} chat {}",
                    region.id, region.name, region.estimated_annual_births, chat
                );
            }
        }
        Some("stock") => {
            let (Some(vaccine), Some(quantity)) =
                (args.get(3), args.get(4).and_then(|s| s.parse::<i64>().ok()))
            else {
                eprintln!("Usage: seed_reference <config.json> stock <vaccine> <quantity>");
                std::process::exit(2);
            };
            if !db.vaccine_exists(vaccine) {
                eprintln!("Unknown vaccine '{vaccine}'. Known: {}", db.distinct_vaccines().join(", "));
                std::process::exit(2);
            }
            db.set_stock(vaccine, quantity);
            println!("Stock for {vaccine} set to {quantity}");
        }
        Some("link-chat") => {
            let (Some(region_id), Some(chat)) =
                (args.get(3).and_then(|s| s.parse::<i64>().ok()), args.get(4))
            else {
                eprintln!("Usage: seed_reference <config.json> link-chat <region_id> <chat_id>");
                std::process::exit(2);
            };
            if db.region(region_id).is_none() {
                eprintln!("Unknown region {region_id}");
                std::process::exit(2);
            }
            db.set_region_chat(region_id, Some(chat));
            println!("Region {region_id} linked to chat {chat}");
        }
        Some("unlink-chat") => {
            let Some(region_id) = args.get(3).and_then(|s| s.parse::<i64>().ok()) else {
                eprintln!("Usage: seed_reference <config.json> unlink-chat <region_id>");
                std::process::exit(2);
            };
            db.set_region_chat(region_id, None);
            println!("Region {region_id} unlinked");
        }
        Some(other) => {
            eprintln!("Unknown command '{other}'");
            std::process::exit(2);
        }
    }
}
