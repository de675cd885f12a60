//! File RPC wire types and framing (§6 "Stream port"). Each call is one
//! length-prefixed bincode frame each way over a fresh TCP connection, the
//! same one-shot-dial-per-call style as `file_sys_remote.go`'s
//! `RequestMachines`/`PutFile` functions (no connection pooling).

use crate::error::{Result, SdfsError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Argument record (§6): {local-name, sdfs-name, payload bytes, num-versions}
/// collapsed into one enum per operation rather than a single flat struct,
/// since each operation only ever uses a subset of those fields.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub enum Request {
    Put { name: String, bytes: Vec<u8> },
    Get { name: String },
    Delete { name: String },
    Ls { name: String },
    GetVersions { name: String, k: usize },
    SendFile { name: String, bytes: Vec<u8> },
}

/// Reply record (§6): {on-machine boolean, payload bytes}, again split by
/// shape of payload actually carried.
#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub enum Response {
    Ack,
    Payload(Vec<u8>),
    Present(bool),
    Error(String),
}

pub async fn write_frame<T: bincode::Encode>(stream: &mut TcpStream, value: &T) -> Result<()> {
    let body = bincode::encode_to_vec(value, CONFIG)?;
    let len = u32::try_from(body.len())
        .map_err(|_| SdfsError::Serialization("frame too large".into()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&body).await?;
    Ok(())
}

pub async fn read_frame<T: bincode::Decode<()>>(stream: &mut TcpStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    let (value, _) =
        bincode::decode_from_slice(&body, CONFIG).map_err(|e| SdfsError::Decode(e.to_string()))?;
    Ok(value)
}
