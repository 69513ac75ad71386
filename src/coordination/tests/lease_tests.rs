//! Requester side of the lease exchange over a socket pair.

use std::time::Duration;

use crate::coordination::{
    domain::{Envelope, LeaseError, LeaseOutcome, LeaseRequest, LeaseResponse},
    services::LeaseRequester,
};
use crate::relay::adapters::unix::UnixRelayLink;
use eyre::{Result, bail, ensure};
use rstest::{fixture, rstest};
use tokio::net::UnixStream;

#[fixture]
fn lease() -> LeaseRequest {
    LeaseRequest {
        resource_name: "device-A".to_owned(),
        cookie: "abc".to_owned(),
        amount: 1,
        lease_seconds: 30,
    }
}

fn linked() -> Result<(LeaseRequester<UnixRelayLink>, UnixRelayLink)> {
    let (requester, authority) = UnixStream::pair()?;
    Ok((
        LeaseRequester::new(UnixRelayLink::from_stream(requester)),
        UnixRelayLink::from_stream(authority),
    ))
}

async fn answer(authority: &mut UnixRelayLink, response: LeaseResponse) -> Result<LeaseRequest> {
    let Some(message) = authority.next_message().await? else {
        bail!("requester hung up");
    };
    let Envelope::LeaseRequest(request) = Envelope::from_json(&message)? else {
        bail!("expected a lease request");
    };
    authority
        .send_message(&Envelope::LeaseResponse(response).to_json()?)
        .await?;
    Ok(request)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn denial_is_reported_with_reason(lease: LeaseRequest) -> Result<()> {
    let (mut requester, mut authority) = linked()?;
    let denial = LeaseResponse::denied(&lease, "unknown resource");
    let server = tokio::spawn(async move { answer(&mut authority, denial).await });

    let outcome = requester.request(&lease).await?;

    ensure!(outcome == LeaseOutcome::Denied("unknown resource".to_owned()));
    ensure!(server.await?? == lease);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn grant_for_other_cookie_is_skipped(lease: LeaseRequest) -> Result<()> {
    let (mut requester, mut authority) = linked()?;
    let mut other = lease.clone();
    other.cookie = "someone-else".to_owned();
    let grant = LeaseResponse::granted(&lease);
    let server = tokio::spawn(async move {
        if authority.next_message().await?.is_none() {
            bail!("requester hung up");
        }
        for response in [LeaseResponse::granted(&other), grant] {
            authority
                .send_message(&Envelope::LeaseResponse(response).to_json()?)
                .await?;
        }
        Ok::<(), eyre::Report>(())
    });

    ensure!(requester.request(&lease).await? == LeaseOutcome::Granted);
    server.await??;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn authority_hanging_up_is_no_reply(lease: LeaseRequest) -> Result<()> {
    let (mut requester, authority) = linked()?;
    drop(authority);
    let result = requester.request(&lease).await;
    ensure!(
        matches!(result, Err(LeaseError::NoReply | LeaseError::Transport(_))),
        "unexpected result {result:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn silent_authority_times_out(lease: LeaseRequest) -> Result<()> {
    let (mut requester, _authority) = linked()?;
    let result = requester
        .request_within(&lease, Duration::from_millis(50))
        .await;
    ensure!(matches!(result, Err(LeaseError::TimedOut(_))));
    Ok(())
}
