//! Distributed log-grep fan-out (SPEC_FULL §B). A stateless TCP RPC
//! wrapping the local `grep` binary, grounded directly on
//! `examples/original_source/src/grep_server/grep_server.go` and
//! `grep_client.go`: one request/response pair per peer, fanned out to
//! every ordinal by the client and aggregated.

use crate::config::Config;
use crate::error::{Result, SdfsError};
use crate::identity::Ordinal;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::task::JoinSet;

/// Flags the server always passes ahead of caller-supplied args, matching
/// the original's `DefaultGrepArgs = []string{"-n", "-H"}`.
const DEFAULT_GREP_ARGS: [&str; 2] = ["-n", "-H"];

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct GrepRequest {
    pub grep_args: Vec<String>,
    pub file_glob: String,
    pub pattern: String,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct GrepReply {
    pub output: String,
    pub num_lines: usize,
}

const CONFIG: bincode::config::Configuration = bincode::config::standard();

async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| SdfsError::Serialization("grep frame too large".into()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

/// Runs the server's accept loop on the grep port. One connection, one
/// request/response pair, same shape as the file RPC server.
pub async fn serve(config: &Config, self_ordinal: Ordinal) -> Result<()> {
    let addr = format!("{}:{}", config.address_of(self_ordinal), config.grep_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| SdfsError::BindFailure {
            port: config.grep_port,
            source,
        })?;
    tracing::info!("grep RPC listening on {addr}");

    loop {
        let (mut stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&mut stream).await {
                tracing::debug!("grep connection from {peer} failed: {e}");
            }
        });
    }
}

async fn handle_connection(stream: &mut TcpStream) -> Result<()> {
    let body = read_frame(stream).await?;
    let (request, _): (GrepRequest, _) =
        bincode::decode_from_slice(&body, CONFIG).map_err(|e| SdfsError::Decode(e.to_string()))?;
    let reply = run_local_grep(&request).await;
    let encoded = bincode::encode_to_vec(&reply, CONFIG)?;
    write_frame(stream, &encoded).await
}

/// Shells out to the local `grep` binary. Exit code 1 ("no match") is not
/// an error; any other nonzero code is.
async fn run_local_grep(request: &GrepRequest) -> GrepReply {
    let mut args: Vec<&str> = DEFAULT_GREP_ARGS.to_vec();
    args.extend(request.grep_args.iter().map(String::as_str));
    args.push(&request.pattern);
    args.push(&request.file_glob);

    let output = Command::new("grep")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() || output.status.code() == Some(1) => {
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            let num_lines = if text.is_empty() {
                0
            } else {
                text.lines().count()
            };
            GrepReply {
                output: text,
                num_lines,
            }
        }
        Ok(output) => GrepReply {
            output: format!("grep failed: {}", String::from_utf8_lossy(&output.stderr)),
            num_lines: 0,
        },
        Err(e) => GrepReply {
            output: format!("grep failed to start: {e}"),
            num_lines: 0,
        },
    }
}

/// Client fan-out: dial every ordinal 1..=n concurrently, collect each
/// reply (or its dial failure) without letting one peer's failure abort
/// the others, mirroring `grep_client.go`'s per-server loop.
pub async fn fan_out(
    config: &Config,
    n: u32,
    request: GrepRequest,
) -> Vec<(Ordinal, Result<GrepReply>)> {
    let mut calls = JoinSet::new();
    for ordinal in 1..=n {
        let config = config.clone();
        let request = request.clone();
        calls.spawn(async move { (ordinal, call_one(&config, ordinal, &request).await) });
    }

    let mut results = Vec::new();
    while let Some(joined) = calls.join_next().await {
        if let Ok(pair) = joined {
            results.push(pair);
        }
    }
    results.sort_by_key(|(ordinal, _)| *ordinal);
    results
}

async fn call_one(config: &Config, ordinal: Ordinal, request: &GrepRequest) -> Result<GrepReply> {
    let addr = format!("{}:{}", config.address_of(ordinal), config.grep_port);
    let mut stream = TcpStream::connect(&addr).await?;
    let encoded = bincode::encode_to_vec(request, CONFIG)?;
    write_frame(&mut stream, &encoded).await?;
    let body = read_frame(&mut stream).await?;
    let (reply, _) =
        bincode::decode_from_slice(&body, CONFIG).map_err(|e| SdfsError::Decode(e.to_string()))?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn server_reports_match_count_and_no_match_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"alpha\nbeta ERROR\ngamma ERROR\n")
            .unwrap();

        let matching = run_local_grep(&GrepRequest {
            grep_args: vec![],
            file_glob: path.to_string_lossy().into_owned(),
            pattern: "ERROR".to_string(),
        })
        .await;
        assert_eq!(matching.num_lines, 2);
        assert!(matching.output.contains("ERROR"));

        let none = run_local_grep(&GrepRequest {
            grep_args: vec![],
            file_glob: path.to_string_lossy().into_owned(),
            pattern: "NOPE_NOT_PRESENT".to_string(),
        })
        .await;
        assert_eq!(none.num_lines, 0);
        assert!(
            !none.output.contains("failed"),
            "exit code 1 must not surface as an error"
        );
    }
}
