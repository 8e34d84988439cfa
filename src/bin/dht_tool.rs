//! A small inspection/maintenance CLI over a `.dht` file.
//!
//! Recovers the diagnostic value of the original library's `show_ht`,
//! `show_st`, and `show_ds` debug dumpers (out of scope as library
//! internals, per spec §1) as an ordinary command-line surface instead.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Builder;

use dht::{OpenFlags, Table, TableOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and edit memory-mapped .dht hash table files", long_about = None)]
struct Cli {
    /// Path to the .dht file.
    path: PathBuf,

    /// Maximum key length (excluding the NUL terminator). Required when
    /// creating a new file; 0 to accept whatever is already on disk.
    #[arg(long, default_value_t = 0)]
    key_maxlen: u32,

    /// Fixed payload width in bytes. Required when creating a new file;
    /// 0 to accept whatever is already on disk.
    #[arg(long, default_value_t = 0)]
    object_datalen: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print size, capacity, slots_used, and dirty_slots.
    Stat,
    /// Look up a key and print its payload as hex.
    Get { key: String },
    /// Insert or overwrite a key with a hex-encoded payload.
    Put { key: String, hex_payload: String },
    /// Delete a key.
    Del { key: String },
    /// Dump every live entry via indexed_lookup, in store-table order.
    Dump,
}

fn main() -> ExitCode {
    Builder::new()
        .parse_filters(&env::var("DHT_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("dht-tool: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), dht::DhtError> {
    let opts = TableOptions::new(cli.key_maxlen, cli.object_datalen);

    match cli.command {
        Command::Stat => {
            let table = Table::open(&cli.path, opts, OpenFlags::read_only())?;
            println!("size:         {}", table.size());
            println!("capacity:     {}", table.capacity());
            println!("slots_used:   {}", table.slots_used());
            println!("dirty_slots:  {}", table.dirty_slots());
        }
        Command::Get { key } => {
            let table = Table::open(&cli.path, opts, OpenFlags::read_only())?;
            match table.lookup(&key)? {
                Some(payload) => println!("{}", hex_encode(payload)),
                None => {
                    eprintln!("not found");
                    return Err(dht::DhtError::InvalidArgument);
                }
            }
        }
        Command::Put { key, hex_payload } => {
            let payload = hex_decode(&hex_payload).map_err(|_| dht::DhtError::InvalidArgument)?;
            let mut table = Table::open(&cli.path, opts, OpenFlags::create())?;
            if !table.insert(&key, &payload)? {
                table.update(&key, &payload)?;
            }
        }
        Command::Del { key } => {
            let mut table = Table::open(&cli.path, opts, OpenFlags::read_write())?;
            if !table.delete(&key)? {
                eprintln!("not found");
            }
        }
        Command::Dump => {
            let table = Table::open(&cli.path, opts, OpenFlags::read_only())?;
            for index in 0..table.cursor() {
                match table.indexed_lookup(index) {
                    Ok((key, payload)) => println!("{key}\t{}", hex_encode(&payload)),
                    Err(dht::DhtError::NoData) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
