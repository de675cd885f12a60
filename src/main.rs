// sdfs node entry point.
//
// Wires identity, membership, the gossip engine, the membership event bus,
// the replication controller, and the file/grep RPC listeners together,
// then drops into the interactive command prompt (§6).

use sdfs::config::Config;
use sdfs::event_bus::EventBus;
use sdfs::gossip::GossipEngine;
use sdfs::identity::{self, Ordinal};
use sdfs::membership::MembershipList;
use sdfs::replication_controller;
use sdfs::rpc::{self, client};
use sdfs::store::FileStore;
use sdfs::{grep, Result, VERSION};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    match run().await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!("fatal: {e}");
            std::process::exit(1);
        }
    }
}

/// §9 initialization order: identity -> membership -> gossip listeners ->
/// event bus -> replication controller subscription -> file RPC listener
/// -> join.
async fn run() -> Result<()> {
    let config = Arc::new(Config::load("sdfs.json")?);
    let self_ordinal = identity::own_ordinal(&config)?;
    tracing::info!(
        "ordinal={self_ordinal} n={} introducer={}",
        config.n,
        config.introducer
    );

    let membership = Arc::new(MembershipList::new(config.n, self_ordinal));
    let (bus, subscriber) = EventBus::with_subscriber(5);
    let gossip = GossipEngine::new(config.clone(), membership.clone(), bus);
    let handles = gossip.listen().await?;

    let store = Arc::new(FileStore::init(&config.data_dir, config.v)?);

    tokio::spawn(replication_controller::run(
        config.clone(),
        store.clone(),
        self_ordinal,
        subscriber,
    ));

    {
        let config = config.clone();
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(e) = rpc::server::serve(config, store, self_ordinal).await {
                tracing::error!("file RPC server crashed: {e}");
            }
        });
    }
    {
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = grep::serve(&config, self_ordinal).await {
                tracing::error!("grep RPC server crashed: {e}");
            }
        });
    }

    gossip.join_and_run(handles).await?;

    println!();
    println!("sdfs node {self_ordinal} ready (v{VERSION}). Type `help` for commands.");
    run_cli(config, membership, gossip, store, self_ordinal).await
}

async fn run_cli(
    config: Arc<Config>,
    membership: Arc<MembershipList>,
    gossip: Arc<GossipEngine>,
    store: Arc<FileStore>,
    self_ordinal: Ordinal,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("sdfs> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        match command {
            "leave" => {
                gossip.leave().await;
                println!("left the cluster");
                return Ok(());
            }
            "print_fail" => {
                for ordinal in 1..=config.n {
                    if ordinal != self_ordinal && membership.is_failed(ordinal) {
                        println!("{ordinal}");
                    }
                }
            }
            "memlist" => {
                let live = membership.snapshot_live();
                for ordinal in 1..=config.n {
                    println!(
                        "{ordinal}: {}",
                        if live[ordinal as usize] {
                            "alive"
                        } else {
                            "failed"
                        }
                    );
                }
            }
            "clear" => print!("\x1B[2J\x1B[1;1H"),
            "put" => match rest.as_slice() {
                [local_name, sdfs_name] => match std::fs::read(local_name) {
                    Ok(bytes) => {
                        let live = membership.snapshot_live();
                        let report = client::put(&config, &live, sdfs_name, &bytes).await;
                        report_outcome("put", report.elapsed, report.outcome);
                    }
                    Err(e) => println!("could not read {local_name}: {e}"),
                },
                _ => println!("usage: put <local-name> <sdfs-name>"),
            },
            "get" => match rest.as_slice() {
                [sdfs_name, local_name] => {
                    let live = membership.snapshot_live();
                    let report = client::get(&config, &live, sdfs_name).await;
                    match report.outcome {
                        Ok(bytes) => match std::fs::write(local_name, &bytes) {
                            Ok(()) => println!("get succeeded in {:?}", report.elapsed),
                            Err(e) => println!("fetched but could not write {local_name}: {e}"),
                        },
                        Err(e) => println!("get failed in {:?}: {e}", report.elapsed),
                    }
                }
                _ => println!("usage: get <sdfs-name> <local-name>"),
            },
            "delete" => match rest.as_slice() {
                [sdfs_name] => {
                    let report = client::delete(&config, config.n, sdfs_name).await;
                    report_outcome("delete", report.elapsed, report.outcome.map(|v| v.len()));
                }
                _ => println!("usage: delete <sdfs-name>"),
            },
            "ls" => match rest.as_slice() {
                [sdfs_name] => {
                    let report = client::list(&config, config.n, sdfs_name).await;
                    match report.outcome {
                        Ok(holders) => println!("held by: {holders:?}"),
                        Err(e) => println!("ls failed: {e}"),
                    }
                }
                _ => println!("usage: ls <sdfs-name>"),
            },
            "store" => match store.local_names() {
                Ok(names) => names.iter().for_each(|n| println!("{n}")),
                Err(e) => println!("store listing failed: {e}"),
            },
            "get-versions" => match rest.as_slice() {
                [sdfs_name, k, local_name] => match k.parse::<usize>() {
                    Ok(k) => {
                        let live = membership.snapshot_live();
                        let report = client::get_versions(&config, &live, sdfs_name, k).await;
                        match report.outcome {
                            Ok(bytes) => match std::fs::write(local_name, &bytes) {
                                Ok(()) => {
                                    println!("get-versions succeeded in {:?}", report.elapsed)
                                }
                                Err(e) => println!("fetched but could not write {local_name}: {e}"),
                            },
                            Err(e) => println!("get-versions failed: {e}"),
                        }
                    }
                    Err(_) => println!("num-versions must be an integer"),
                },
                _ => println!("usage: get-versions <sdfs-name> <num-versions> <local-name>"),
            },
            "help" => print_help(),
            other => println!("unknown command '{other}'; type `help` for a list"),
        }
    }
    Ok(())
}

fn report_outcome<T>(label: &str, elapsed: std::time::Duration, outcome: Result<T>)
where
    T: std::fmt::Debug,
{
    match outcome {
        Ok(value) => println!("{label} succeeded in {elapsed:?}: {value:?}"),
        Err(e) => println!("{label} failed in {elapsed:?}: {e}"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  leave                                   leave the cluster and exit");
    println!("  print_fail                               list ordinals believed failed");
    println!("  memlist                                  print the full membership view");
    println!("  clear                                    clear the screen");
    println!("  put <local-name> <sdfs-name>             quorum-write a file");
    println!("  get <sdfs-name> <local-name>              fetch the current version");
    println!("  delete <sdfs-name>                        remove a file cluster-wide");
    println!("  ls <sdfs-name>                            list ordinals holding a file");
    println!("  store                                     list files held locally");
    println!("  get-versions <sdfs-name> <k> <local-name> fetch k most recent versions");
    println!("  help                                      show this message");
}

fn print_banner() {
    println!("+----------------------------------------------+");
    println!("|  sdfs -- small distributed file layer v{:<8}|", VERSION);
    println!("+----------------------------------------------+");
}
