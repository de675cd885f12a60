//! File RPC server: one accept loop on the file port, one task per
//! connection, each connection carrying exactly one request/response pair.
//! Grounded on `file_sys.go`'s `HandleFileRequests` dispatch switch.

use super::wire::{read_frame, write_frame, Request, Response};
use crate::config::Config;
use crate::error::SdfsError;
use crate::store::FileStore;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

pub async fn serve(
    config: Arc<Config>,
    store: Arc<FileStore>,
    self_ordinal: u32,
) -> crate::error::Result<()> {
    let addr = format!("{}:{}", config.address_of(self_ordinal), config.file_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| SdfsError::BindFailure {
            port: config.file_port,
            source,
        })?;
    tracing::info!("file RPC listening on {addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &store).await {
                tracing::debug!("file RPC connection from {peer} failed: {e}");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, store: &FileStore) -> crate::error::Result<()> {
    let request: Request = read_frame(&mut stream).await?;
    let response = dispatch(store, request);
    write_frame(&mut stream, &response).await
}

fn dispatch(store: &FileStore, request: Request) -> Response {
    match request {
        Request::Put { name, bytes } => match store.put(&name, &bytes) {
            Ok(()) => Response::Ack,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Get { name } => match store.get(&name) {
            Ok(bytes) => Response::Payload(bytes),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Delete { name } => match store.delete(&name) {
            Ok(was_present) => Response::Present(was_present),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Ls { name } => Response::Present(store.list(&name)),
        Request::GetVersions { name, k } => match store.get_versions(&name, k) {
            Ok(bytes) => Response::Payload(bytes),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::SendFile { name, bytes } => match store.receive(&name, &bytes) {
            Ok(()) => Response::Ack,
            Err(e) => Response::Error(e.to_string()),
        },
    }
}
