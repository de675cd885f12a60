//! Length-prefix-free datagram encode/decode helpers. Each UDP payload is a
//! single bincode-encoded value (`Vec<WireEntry>` for gossip, `u32` for an
//! ACK) — "length-delimited" per §6 in the sense that UDP already delimits
//! datagrams; no extra framing is layered on top, matching the simplicity of
//! `failure.go`'s raw `json.Marshal`/`Unmarshal` over each packet.

use crate::error::{Result, SdfsError};
use crate::membership::WireEntry;

const CONFIG: bincode::config::Configuration = bincode::config::standard();

pub fn encode_deltas(deltas: &[WireEntry]) -> Result<Vec<u8>> {
    Ok(bincode::encode_to_vec(deltas, CONFIG)?)
}

/// §7 decode-error policy: callers get `Err` and are expected to log and
/// drop the datagram rather than propagate.
pub fn decode_deltas(buf: &[u8]) -> Result<Vec<WireEntry>> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    let (deltas, _) =
        bincode::decode_from_slice(buf, CONFIG).map_err(|e| SdfsError::Decode(e.to_string()))?;
    Ok(deltas)
}

pub fn encode_ordinal(ordinal: u32) -> Result<Vec<u8>> {
    Ok(bincode::encode_to_vec(ordinal, CONFIG)?)
}

pub fn decode_ordinal(buf: &[u8]) -> Result<u32> {
    let (ordinal, _) =
        bincode::decode_from_slice(buf, CONFIG).map_err(|e| SdfsError::Decode(e.to_string()))?;
    Ok(ordinal)
}
