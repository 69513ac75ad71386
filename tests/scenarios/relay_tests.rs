//! Framed relay delivery over a Unix socket bound on disk.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::test_helpers::utf8_tempdir;
use eyre::{Result, ensure, eyre};
use kiln::relay::{
    adapters::{memory::QueuedScheduler, unix::UnixRelayLink},
    domain::{ChannelId, RelayEndpoint},
    services::StreamRelay,
};
use rstest::rstest;
use tokio::net::UnixListener;

const LOGS: ChannelId = ChannelId::new(0);
const ARTIFACTS: ChannelId = ChannelId::new(1);

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queued_messages_reach_the_proxy_whole_and_in_order() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let endpoint = RelayEndpoint::new(root.join("logproxy.sock"));
    let listener = UnixListener::bind(endpoint.path())?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut link = UnixRelayLink::from_stream(stream);
        let mut received = Vec::new();
        while let Some(message) = link.next_message().await? {
            received.push(message);
        }
        Ok::<_, eyre::Report>(received)
    });

    let mut link = UnixRelayLink::connect(&endpoint).await?;
    let mut relay = StreamRelay::new(QueuedScheduler::new());
    let drained = Arc::new(AtomicUsize::new(0));
    relay.enqueue(LOGS, b"Building...\n")?;
    relay.enqueue(ARTIFACTS, b"artifact bytes")?;
    relay.enqueue(LOGS, b"Done.\n")?;
    let counter = Arc::clone(&drained);
    relay.on_drained_all(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // The artifact channel drains first even though logs were queued earlier.
    link.pump_channel(&mut relay, ARTIFACTS, 4).await?;
    ensure!(relay.pending(LOGS) == 2);
    ensure!(drained.load(Ordering::SeqCst) == 0);
    link.pump_channel(&mut relay, LOGS, 1).await?;
    ensure!(relay.is_drained());
    ensure!(drained.load(Ordering::SeqCst) == 1);
    drop(link);

    let received = server.await.map_err(|err| eyre!("server task: {err}"))??;
    ensure!(
        received
            == vec![
                b"artifact bytes".to_vec(),
                b"Building...\n".to_vec(),
                b"Done.\n".to_vec(),
            ]
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connecting_to_a_missing_socket_fails() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let endpoint = RelayEndpoint::new(root.join("absent.sock"));
    ensure!(UnixRelayLink::connect(&endpoint).await.is_err());
    Ok(())
}
