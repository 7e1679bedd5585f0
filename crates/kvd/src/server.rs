//! Accept loop and per-connection request processing

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use bytes::BytesMut;
use kvcache::SharedStorage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::handler::CommandHandler;
use crate::resp::Frame;

/// Serve connections until `shutdown` resolves
///
/// Every connection gets its own task and holds one of `max_connections`
/// permits; further clients wait in the listen backlog. On shutdown the
/// listener is dropped, each connection finishes the requests it has already
/// read, and this returns once all of them have closed.
pub async fn serve<F>(
    listener: TcpListener,
    storage: Arc<dyn SharedStorage>,
    max_connections: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let permits = Arc::new(Semaphore::new(max_connections));
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(done) = connections.join_next() => {
                if let Err(e) = done {
                    error!("Connection task failed: {}", e);
                }
            }
            accepted = accept(&listener, &permits) => {
                let (stream, addr, permit) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        continue;
                    }
                };

                info!("New connection from {}", addr);
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stop = stop_rx.clone();

                connections.spawn(async move {
                    if let Err(e) = handle_client(stream, handler, stop).await {
                        error!("Error handling client {}: {}", addr, e);
                    }
                    info!("Connection closed: {}", addr);
                    drop(permit);
                });
            }
        }
    }

    drop(listener);
    info!("Stopping {} open connection(s)", connections.len());
    let _ = stop_tx.send(true);

    while let Some(done) = connections.join_next().await {
        if let Err(e) = done {
            error!("Connection task failed: {}", e);
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn accept(
    listener: &TcpListener,
    permits: &Arc<Semaphore>,
) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
    let permit = Arc::clone(permits).acquire_owned().await?;
    let (stream, addr) = listener.accept().await?;
    Ok((stream, addr, permit))
}

async fn handle_client(
    mut stream: TcpStream,
    handler: CommandHandler,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut replies = BytesMut::with_capacity(4096);

    loop {
        let n = tokio::select! {
            read = stream.read_buf(&mut buffer) => read?,
            _ = stop.changed() => return Ok(()),
        };

        if n == 0 {
            // Connection closed
            return Ok(());
        }

        // One reply per complete request, in order
        loop {
            match Frame::decode(&mut buffer) {
                Ok(Some(request)) => handler.handle(request).encode(&mut replies),
                Ok(None) => break,
                Err(e) => {
                    warn!("Protocol error: {}", e);
                    Frame::Error(format!("ERR {}", e)).encode(&mut replies);
                    buffer.clear();
                    break;
                }
            }
        }

        if !replies.is_empty() {
            stream.write_all(&replies).await?;
            replies.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvcache::{Guarded, LruStore};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        stop: oneshot::Sender<()>,
        task: JoinHandle<Result<()>>,
    }

    async fn start(max_size: usize) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage: Arc<dyn SharedStorage> = Arc::new(Guarded::new(LruStore::new(max_size)));
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(serve(listener, storage, 8, async move {
            let _ = stopped.await;
        }));

        TestServer { addr, stop, task }
    }

    async fn roundtrip(stream: &mut TcpStream, request: &[u8], expected: &[u8]) {
        stream.write_all(request).await.unwrap();
        let mut reply = vec![0u8; expected.len()];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_redis_client_commands() {
        let server = start(1024).await;
        let url = format!("redis://{}/", server.addr);

        tokio::task::spawn_blocking(move || {
            let client = redis::Client::open(url).unwrap();
            let mut con = client.get_connection().unwrap();

            let pong: String = redis::cmd("PING").query(&mut con).unwrap();
            assert_eq!(pong, "PONG");

            let ok: String = redis::cmd("SET").arg("k").arg("v").query(&mut con).unwrap();
            assert_eq!(ok, "OK");
            let value: Option<Vec<u8>> = redis::cmd("GET").arg("k").query(&mut con).unwrap();
            assert_eq!(value, Some(b"v".to_vec()));

            let added: i64 = redis::cmd("SETNX").arg("k").arg("w").query(&mut con).unwrap();
            assert_eq!(added, 0);
            let replaced: Option<String> =
                redis::cmd("SET").arg("k").arg("w").arg("XX").query(&mut con).unwrap();
            assert_eq!(replaced.as_deref(), Some("OK"));

            let deleted: i64 = redis::cmd("DEL").arg("k").arg("other").query(&mut con).unwrap();
            assert_eq!(deleted, 1);
            let value: Option<Vec<u8>> = redis::cmd("GET").arg("k").query(&mut con).unwrap();
            assert_eq!(value, None);
        })
        .await
        .unwrap();

        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_eviction_over_the_wire() {
        let server = start(20).await;
        let url = format!("redis://{}/", server.addr);

        tokio::task::spawn_blocking(move || {
            let client = redis::Client::open(url).unwrap();
            let mut con = client.get_connection().unwrap();

            let _: String = redis::cmd("SET").arg("k1").arg("aaaaaaaa").query(&mut con).unwrap();
            let _: String = redis::cmd("SET").arg("k2").arg("bbbbbbbb").query(&mut con).unwrap();
            let _: String = redis::cmd("SET").arg("k3").arg("c").query(&mut con).unwrap();

            let k1: Option<Vec<u8>> = redis::cmd("GET").arg("k1").query(&mut con).unwrap();
            assert_eq!(k1, None);
            let k2: Option<Vec<u8>> = redis::cmd("GET").arg("k2").query(&mut con).unwrap();
            assert_eq!(k2, Some(b"bbbbbbbb".to_vec()));

            let too_large: redis::RedisResult<String> = redis::cmd("SET")
                .arg("k")
                .arg("v".repeat(25))
                .query(&mut con);
            assert!(too_large.is_err());
        })
        .await
        .unwrap();

        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pipelined_requests() {
        let server = start(1024).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut stream,
            b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n",
            b"+OK\r\n$1\r\n1\r\n",
        )
        .await;

        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_protocol_error_keeps_connection() {
        let server = start(1024).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(&mut stream, b"?junk\r\n", b"-ERR unknown RESP type byte 0x3f\r\n").await;
        roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_deeply_nested_request_is_rejected() {
        let server = start(1024).await;

        let mut hostile = TcpStream::connect(server.addr).await.unwrap();
        let request = format!("{}$4\r\nPING\r\n", "*1\r\n".repeat(200_000));
        hostile.write_all(request.as_bytes()).await.unwrap();
        let expected = b"-ERR array nesting too deep\r\n";
        let mut reply = vec![0u8; expected.len()];
        hostile.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, expected);

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        drop(hostile);
        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let server = start(1024).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        roundtrip(&mut stream, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        server.stop.send(()).unwrap();
        server.task.await.unwrap().unwrap();

        let mut rest = Vec::new();
        let n = stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);
    }
}
