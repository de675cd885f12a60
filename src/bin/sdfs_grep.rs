//! Distributed grep client (SPEC_FULL §B). Fans a grep pattern out to
//! every node in the cluster and prints each node's matches plus a grand
//! total, mirroring `grep_client.go`'s CLI.

use sdfs::config::Config;
use sdfs::grep::{fan_out, GrepRequest};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let mut args = std::env::args().skip(1);
    let pattern = match args.next() {
        Some(p) => p,
        None => {
            eprintln!("usage: sdfs-grep <pattern> <file-glob> [grep-args...]");
            std::process::exit(2);
        }
    };
    let file_glob = match args.next() {
        Some(g) => g,
        None => {
            eprintln!("usage: sdfs-grep <pattern> <file-glob> [grep-args...]");
            std::process::exit(2);
        }
    };
    let grep_args: Vec<String> = args.collect();

    let config = Config::load("sdfs.json").unwrap_or_default();
    let request = GrepRequest {
        grep_args,
        file_glob,
        pattern,
    };

    let results = fan_out(&config, config.n, request).await;
    let mut total = 0usize;
    for (ordinal, outcome) in results {
        match outcome {
            Ok(reply) => {
                total += reply.num_lines;
                println!("--- ordinal {ordinal} ({} lines) ---", reply.num_lines);
                print!("{}", reply.output);
            }
            Err(e) => eprintln!("--- ordinal {ordinal} unreachable: {e} ---"),
        }
    }
    println!("=== total matches: {total} ===");
}
