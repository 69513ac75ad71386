//! Requester side of a resource lease exchange.

use crate::coordination::domain::{Envelope, LeaseError, LeaseOutcome, LeaseRequest};
use crate::relay::ports::MessageLink;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sends one lease request and waits for the authority's answer.
#[derive(Debug)]
pub struct LeaseRequester<L> {
    link: L,
}

impl<L> LeaseRequester<L>
where
    L: MessageLink,
{
    /// Wraps a link to the lease authority.
    #[must_use]
    pub const fn new(link: L) -> Self {
        Self { link }
    }

    /// Issues `request` and waits for the matching response.
    ///
    /// Messages for other cookies or of other schemas are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError`] when the link fails, a message is malformed,
    /// or the authority disconnects first.
    pub async fn request(&mut self, request: &LeaseRequest) -> Result<LeaseOutcome, LeaseError> {
        let payload = Envelope::LeaseRequest(request.clone()).to_json()?;
        info!(
            resource = %request.resource_name,
            cookie = %request.cookie,
            amount = request.amount,
            lease_seconds = request.lease_seconds,
            "issuing lease request"
        );
        self.link.send(&payload).await?;

        loop {
            let Some(message) = self.link.receive().await? else {
                warn!(cookie = %request.cookie, "lease authority disconnected");
                return Err(LeaseError::NoReply);
            };
            match Envelope::from_json(&message)? {
                Envelope::LeaseResponse(response) if response.cookie == request.cookie => {
                    let outcome = response.outcome();
                    match &outcome {
                        LeaseOutcome::Granted => info!(cookie = %request.cookie, "lease granted"),
                        LeaseOutcome::Denied(reason) => {
                            warn!(cookie = %request.cookie, reason = %reason, "lease denied");
                        }
                    }
                    return Ok(outcome);
                }
                other => debug!(schema = other.schema(), "skipping unrelated message"),
            }
        }
    }

    /// Like [`Self::request`], giving up after `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::TimedOut`] when no answer arrives in time, or
    /// any error of [`Self::request`].
    pub async fn request_within(
        &mut self,
        request: &LeaseRequest,
        limit: Duration,
    ) -> Result<LeaseOutcome, LeaseError> {
        tokio::time::timeout(limit, self.request(request))
            .await
            .map_err(|_| LeaseError::TimedOut(limit))?
    }
}
