///! # CLI - EmberKV Interactive Shell
///!
///! A REPL-style command-line interface for the EmberKV store. Reads
///! commands from stdin, executes them against a `Store<String, String>`,
///! and prints results to stdout. Designed for both interactive use and
///! scripted testing (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! INSERT key value   Insert a new key-value pair (fails if key exists)
///! GET key            Look up a key (prints value or "(nil)")
///! UPDATE key value   Replace the value of an existing key
///! UPSERT key value   Update the key, inserting it when missing
///! DEL key            Delete a key (its block is marked free)
///! KEYS               List every key with its block offset and value
///! FIRST / LAST       Print the smallest / largest key
///! TRUNCATE           Drop all pairs and reset the data file
///! STATS              Print store debug info
///! EXIT / QUIT        Shut down
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! EMBER_DATA_PATH    data file path                 (default: "data.kv")
///! EMBER_SYNC         sync_data after every flush    (default: "false")
///! EMBER_PADDING_PCT  padding percent for new blocks (default: 20)
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! EmberKV started (path=data.kv, entries=0, file=0B, padding=20%)
///! > INSERT name Alice
///! OK
///! > GET name
///! Alice
///! > KEYS
///! name @0 -> Alice
///! (1 entries)
///! > EXIT
///! bye
///! ```

use anyhow::Result;
use std::io::{self, BufRead, Write};
use store::{Store, StoreError};
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Maps a store result to the REPL's one-line answer.
fn reply(result: Result<(), StoreError>) -> String {
    match result {
        Ok(()) => "OK".to_string(),
        Err(e) => format!("ERR {}", e),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let data_path = env_or("EMBER_DATA_PATH", "data.kv");
    let sync: bool = env_or("EMBER_SYNC", "false").parse().unwrap_or(false);
    let padding_pct: u32 = env_or("EMBER_PADDING_PCT", "20").parse().unwrap_or(20);

    let store: Store<String, String> = Store::with_options(padding_pct as f32 / 100.0, sync);
    store.load(&data_path)?;

    println!(
        "EmberKV started (path={}, entries={}, file={}B, padding={}%)",
        data_path,
        store.len(),
        store.data_file_size(),
        padding_pct
    );
    println!("Commands: INSERT key value | GET key | UPDATE key value | UPSERT key value");
    println!("          DEL key | KEYS | FIRST | LAST | TRUNCATE | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                op @ ("INSERT" | "UPDATE" | "UPSERT") => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: {} key value", op);
                        } else {
                            let result = match op {
                                "INSERT" => store.insert(k.to_string(), v),
                                "UPDATE" => store.update(&k.to_string(), &v, None),
                                _ => store.upsert(k.to_string(), v),
                            };
                            println!("{}", reply(result));
                        }
                    } else {
                        println!("ERR usage: {} key value", op);
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match store.find_value(&k.to_string(), None) {
                            Ok(v) => println!("{}", v),
                            Err(StoreError::NotFound) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        println!("{}", reply(store.delete(&k.to_string())));
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "KEYS" => {
                    let mut count = 0usize;
                    for (key, offset) in store.iter() {
                        match store.find_value(&key, Some(offset)) {
                            Ok(v) => println!("{} @{} -> {}", key, offset, v),
                            Err(e) => println!("{} @{} -> ERR {}", key, offset, e),
                        }
                        count += 1;
                    }
                    println!("({} entries)", count);
                }
                "FIRST" => match store.first() {
                    Some((k, off)) => println!("{} @{}", k, off),
                    None => println!("(empty)"),
                },
                "LAST" => match store.last() {
                    Some((k, off)) => println!("{} @{}", k, off),
                    None => println!("(empty)"),
                },
                "TRUNCATE" => {
                    println!("{}", reply(store.truncate()));
                }
                "STATS" => {
                    println!("{:#?}", store);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("ERR unknown command: {}", other);
                }
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
