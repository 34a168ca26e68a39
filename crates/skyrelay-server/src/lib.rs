pub mod basestation;
pub mod broadcaster;
pub mod builder;
pub mod relay;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use skyrelay_feed::StateFeed;
use skyrelay_types::RelayError;

pub use basestation::{BaseStationMessage, TransmissionType};
pub use broadcaster::Broadcaster;
pub use builder::{build_messages, render_messages, Watermark};
pub use relay::{Relay, RelayConfig};

/// Listen for BaseStation clients on `addr` and relay `feed` to them until
/// `shutdown` is cancelled.
///
/// Fails only if the listener cannot be bound. An in-flight poll is allowed
/// to finish before this returns.
pub async fn serve_relay<F: StateFeed>(
    addr: SocketAddr,
    feed: F,
    config: RelayConfig,
    shutdown: CancellationToken,
) -> Result<(), RelayError> {
    let broadcaster = Arc::new(Broadcaster::new());
    let accept = broadcaster.clone().listen(addr).await?;

    let relay = Arc::new(Relay::new(feed, broadcaster, config));
    let loops = relay.start(&shutdown);

    shutdown.cancelled().await;
    for handle in loops {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "relay loop panicked");
        }
    }
    accept.abort();
    tracing::info!("relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skyrelay_feed::FeedSnapshot;
    use skyrelay_types::StateSample;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    struct OneAircraft;

    impl StateFeed for OneAircraft {
        async fn fetch(&self) -> Result<FeedSnapshot, RelayError> {
            Ok(FeedSnapshot {
                time: None,
                samples: vec![StateSample {
                    latitude: Some(51.5),
                    longitude: Some(-0.1),
                    ..StateSample::new("4ca2d6")
                }],
            })
        }
    }

    async fn free_addr() -> SocketAddr {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clients_receive_full_state_via_tickle() {
        let addr = free_addr().await;
        let shutdown = CancellationToken::new();
        let config = RelayConfig {
            poll_interval: Duration::from_secs(3600),
            tickle_interval: Duration::from_millis(1),
        };
        let server = tokio::spawn(serve_relay(addr, OneAircraft, config, shutdown.clone()));

        let mut client = None;
        for _ in 0..200 {
            if let Ok(stream) = TcpStream::connect(addr).await {
                client = Some(stream);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut client = client.expect("relay never started listening");

        // the first poll may predate the connection; the keep-alive will not
        let mut buf = vec![0u8; 512];
        let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("no payload within 5s")
            .unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.starts_with("MSG,2,1,1,4CA2D6,"));
        assert!(text.contains(",51.50000,-0.10000,"));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_is_returned() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig {
            poll_interval: Duration::from_secs(1),
            tickle_interval: Duration::ZERO,
        };
        let err = serve_relay(taken.local_addr().unwrap(), OneAircraft, config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
