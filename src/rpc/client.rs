//! File RPC client-side coordination (§4.6): quorum put, fan-out-first-
//! success get/get-versions, broadcast delete/list, and one-shot
//! replicate-send. Grounded on `file_sys_remote.go`'s `PutFile`/`GetFile`/
//! `DeleteFile`/`LSFile` concurrent-dial pattern, reworked onto
//! `tokio::task::JoinSet` instead of goroutines + `sync.WaitGroup`.

use super::wire::{read_frame, write_frame, Request, Response};
use crate::config::Config;
use crate::error::{Result, SdfsError};
use crate::identity::Ordinal;
use crate::placement;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

/// Every file RPC reports its wall-clock latency alongside its outcome,
/// per §4.6 "observed latency reported to the caller for diagnostics".
pub struct CallReport<T> {
    pub elapsed: Duration,
    pub outcome: Result<T>,
}

async fn call(config: &Config, ordinal: Ordinal, request: Request) -> Result<Response> {
    let addr = format!("{}:{}", config.address_of(ordinal), config.file_port);
    let mut stream = TcpStream::connect(&addr).await?;
    write_frame(&mut stream, &request).await?;
    read_frame(&mut stream).await
}

/// §4.6 put: quorum write to `placement(name, live_mask, R)`.
pub async fn put(config: &Config, live_mask: &[bool], name: &str, bytes: &[u8]) -> CallReport<()> {
    let started = Instant::now();
    let replicas = placement::placement(name, live_mask, config.r);
    let mut calls = JoinSet::new();
    for replica in replicas {
        let config = config.clone();
        let name = name.to_string();
        let bytes = bytes.to_vec();
        calls.spawn(async move { call(&config, replica, Request::Put { name, bytes }).await });
    }

    let mut acked = 0usize;
    while let Some(joined) = calls.join_next().await {
        if matches!(joined, Ok(Ok(Response::Ack))) {
            acked += 1;
        }
    }

    let outcome = if acked >= config.q {
        Ok(())
    } else {
        Err(SdfsError::QuorumShortfall {
            acked,
            required: config.q,
        })
    };
    CallReport {
        elapsed: started.elapsed(),
        outcome,
    }
}

/// §4.6 get: fan out to replicas, take the first error-free response.
pub async fn get(config: &Config, live_mask: &[bool], name: &str) -> CallReport<Vec<u8>> {
    fan_out_first_success(
        config,
        live_mask,
        Request::Get {
            name: name.to_string(),
        },
    )
    .await
}

/// §4.6 get-versions: same fan-out-first-success shape as `get`.
pub async fn get_versions(
    config: &Config,
    live_mask: &[bool],
    name: &str,
    k: usize,
) -> CallReport<Vec<u8>> {
    fan_out_first_success(
        config,
        live_mask,
        Request::GetVersions {
            name: name.to_string(),
            k,
        },
    )
    .await
}

async fn fan_out_first_success(
    config: &Config,
    live_mask: &[bool],
    request: Request,
) -> CallReport<Vec<u8>> {
    let started = Instant::now();
    let replicas = placement::placement(request_name(&request), live_mask, config.r);

    let mut calls = JoinSet::new();
    for replica in replicas {
        let config = config.clone();
        let request = request.clone();
        calls.spawn(async move { call(&config, replica, request).await });
    }

    let mut outcome = Err(SdfsError::NotFound(request_name(&request).to_string()));
    while let Some(joined) = calls.join_next().await {
        match joined {
            Ok(Ok(Response::Payload(bytes))) => {
                outcome = Ok(bytes);
                break;
            }
            Ok(Ok(Response::Error(e))) => outcome = Err(SdfsError::Storage(e)),
            Ok(Err(e)) => outcome = Err(e),
            _ => {}
        }
    }
    CallReport {
        elapsed: started.elapsed(),
        outcome,
    }
}

fn request_name(request: &Request) -> &str {
    match request {
        Request::Put { name, .. }
        | Request::Get { name }
        | Request::Delete { name }
        | Request::Ls { name }
        | Request::GetVersions { name, .. }
        | Request::SendFile { name, .. } => name,
    }
}

/// §4.6 delete: broadcast to all N ordinals (not just the replica set),
/// returning the ordinals that had reported holding the file.
pub async fn delete(config: &Config, n: u32, name: &str) -> CallReport<Vec<Ordinal>> {
    broadcast_presence(
        config,
        n,
        Request::Delete {
            name: name.to_string(),
        },
    )
    .await
}

/// §4.6 list: broadcast to all N ordinals, returning which hold the name.
pub async fn list(config: &Config, n: u32, name: &str) -> CallReport<Vec<Ordinal>> {
    broadcast_presence(
        config,
        n,
        Request::Ls {
            name: name.to_string(),
        },
    )
    .await
}

async fn broadcast_presence(config: &Config, n: u32, request: Request) -> CallReport<Vec<Ordinal>> {
    let started = Instant::now();
    let mut calls = JoinSet::new();
    for ordinal in 1..=n {
        let config = config.clone();
        let request = request.clone();
        calls.spawn(async move { (ordinal, call(&config, ordinal, request).await) });
    }

    let mut holders = Vec::new();
    while let Some(joined) = calls.join_next().await {
        if let Ok((ordinal, Ok(Response::Present(true)))) = joined {
            holders.push(ordinal);
        }
    }
    holders.sort_unstable();
    CallReport {
        elapsed: started.elapsed(),
        outcome: Ok(holders),
    }
}

/// §4.6 replicate-send: one-shot unicast, received via the target's
/// `FileStore::receive`.
pub async fn replicate_send(
    config: &Config,
    target: Ordinal,
    name: &str,
    bytes: &[u8],
) -> Result<()> {
    match call(
        config,
        target,
        Request::SendFile {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        },
    )
    .await?
    {
        Response::Ack => Ok(()),
        Response::Error(e) => Err(SdfsError::Storage(e)),
        _ => Err(SdfsError::Network(format!(
            "unexpected reply from ordinal {target}"
        ))),
    }
}
