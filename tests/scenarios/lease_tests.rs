//! The `kiln-lease` binary against a live lease authority.

use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use crate::test_helpers::{StepClock, utf8_tempdir};
use camino::Utf8Path;
use eyre::{Result, bail, ensure, eyre};
use kiln::coordination::{
    domain::{Envelope, RequesterId},
    services::ResourceAuthority,
};
use kiln::relay::adapters::unix::UnixRelayLink;
use rstest::rstest;
use tokio::net::UnixListener;

const REQUESTER: RequesterId = RequesterId::new(1);

/// Answers one requester, then reports the resource's allocation while the
/// lease was held and after the requester hung up.
async fn serve_one(
    listener: UnixListener,
    mut authority: ResourceAuthority<StepClock>,
    resource: &str,
) -> Result<(Option<u32>, Option<u32>)> {
    let (stream, _) = listener.accept().await?;
    let mut link = UnixRelayLink::from_stream(stream);
    let Some(message) = link.next_message().await? else {
        bail!("requester hung up before asking");
    };
    let Envelope::LeaseRequest(request) = Envelope::from_json(&message)? else {
        bail!("expected a lease request");
    };
    for reply in authority.request(REQUESTER, request) {
        link.send_message(&Envelope::LeaseResponse(reply.response).to_json()?)
            .await?;
    }
    let held = authority.allocated(resource);
    // Either a clean close or a reset means the requester is gone.
    let _gone = link.next_message().await;
    authority.disconnect(REQUESTER);
    Ok((held, authority.allocated(resource)))
}

async fn run_requester(socket: &Utf8Path, args: &[&str]) -> Result<ExitStatus> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_kiln-lease"))
        .args(args)
        .env("KILN_RESOURCE_PROXY", socket.as_str())
        .env("KILN_LEASE_TIMEOUT_SECS", "10")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .map_err(|err| eyre!("wait task: {err}"))??;
    Ok(status)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_resource_is_denied_and_requester_fails() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let socket = root.join("resource.sock");
    let listener = UnixListener::bind(&socket)?;
    let authority =
        ResourceAuthority::new(Arc::new(StepClock::new())).with_resource("device-B", 1);
    let server = tokio::spawn(async move { serve_one(listener, authority, "device-B").await });

    let status = run_requester(&socket, &["device-A", "1", "30", "abc"]).await?;
    ensure!(!status.success(), "a denied lease must fail the requester");
    ensure!(status.code() == Some(1));

    let (held, after) = server.await.map_err(|err| eyre!("server task: {err}"))??;
    ensure!(held == Some(0) && after == Some(0), "nothing was allocated");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn granted_lease_ends_requester_successfully() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let socket = root.join("resource.sock");
    let listener = UnixListener::bind(&socket)?;
    let authority =
        ResourceAuthority::new(Arc::new(StepClock::new())).with_resource("device-A", 2);
    let server = tokio::spawn(async move { serve_one(listener, authority, "device-A").await });

    let status = run_requester(&socket, &["device-A", "1", "30", "abc"]).await?;
    ensure!(status.success());

    let (held, after) = server.await.map_err(|err| eyre!("server task: {err}"))??;
    ensure!(held == Some(1), "the lease was held while answered");
    ensure!(after == Some(0), "the lease ends with its requester");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_arguments_exit_with_usage_status() -> Result<()> {
    let (_dir, root) = utf8_tempdir()?;
    let status = run_requester(&root.join("unused.sock"), &["device-A", "zero"]).await?;
    ensure!(status.code() == Some(2));
    Ok(())
}
