//! nvlog Log Inspector
//!
//! Prints a log file's header, its records and whether it ends in a torn
//! record.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use nvlog::logfile::LogReader;
use nvlog::NvlogError;
use tracing_subscriber::{fmt, EnvFilter};

/// nvlog log inspector
#[derive(Parser, Debug)]
#[command(name = "nvlog-inspect")]
#[command(about = "Dump the contents of an nvlog log file")]
#[command(version)]
struct Args {
    /// Log file to inspect
    path: PathBuf,

    /// Print counts only
    #[arg(short, long)]
    summary: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    let mut reader = match LogReader::open(&args.path) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("cannot open {}: {}", args.path.display(), e);
            process::exit(1);
        }
    };

    match reader.header() {
        Some(header) => println!(
            "header: version {} strategy {}",
            header.version, header.strategy
        ),
        None => println!("header: <empty log>"),
    }

    let mut records = 0u64;
    let mut torn = None;
    loop {
        match reader.next_record() {
            Ok(Some(record)) => {
                records += 1;
                if !args.summary {
                    let payload = record.payload.as_ref().map(|p| p.len()).unwrap_or(0);
                    println!(
                        "{:>10} {:<7?} txn={} table={} tuple={} payload={}B",
                        record.lsn,
                        record.record_type,
                        record.txn_id,
                        record.locator.table_id,
                        record.locator.tuple_id,
                        payload
                    );
                }
            }
            Ok(None) => break,
            Err(NvlogError::TornRecord { offset, reason }) => {
                torn = Some((offset, reason));
                break;
            }
            Err(e) => {
                eprintln!("read error: {}", e);
                process::exit(1);
            }
        }
    }

    println!(
        "records: {}  last lsn: {}  valid bytes: {}",
        records,
        reader.last_lsn(),
        reader.valid_offset()
    );
    match torn {
        Some((offset, reason)) => println!("torn tail at offset {}: {}", offset, reason),
        None => println!("no torn tail"),
    }
}
