//! Requests a lease on a shared resource and exits once it is answered.
//!
//! Usage:
//!
//! ```text
//! kiln-lease <resource> <amount> <lease-secs> <cookie>
//! ```
//!
//! The lease authority's socket path is read from `KILN_RESOURCE_PROXY`.
//! The process exits successfully only when the lease is granted. A denial,
//! a transport failure or, when `KILN_LEASE_TIMEOUT_SECS` is set, a reply
//! that does not arrive in time ends it with a failure status. Without a
//! timeout the requester waits until its parent gives up on it.

use kiln::config::RelayConfig;
use kiln::coordination::{
    domain::{LeaseError, LeaseOutcome, LeaseRequest},
    services::LeaseRequester,
};
use kiln::relay::{adapters::unix::UnixRelayLink, domain::RelayEndpoint};
use kiln::telemetry;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Builder;
use tracing::{error, info};

/// Environment variable bounding the wait for a reply, in seconds.
const TIMEOUT_VAR: &str = "KILN_LEASE_TIMEOUT_SECS";

const USAGE: &str = "expected <resource> <amount> <lease-secs> <cookie>";

/// Errors ending the requester.
#[derive(Debug, Error)]
enum RequesterError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0} does not name a lease authority socket")]
    NoEndpoint(String),
    #[error("invalid value {0:?} for {TIMEOUT_VAR}")]
    InvalidTimeout(String),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error(transparent)]
    Lease(#[from] LeaseError),
    #[error("lease denied: {0}")]
    Denied(String),
}

fn main() -> ExitCode {
    telemetry::init();
    match run(std::env::args().skip(1), |name| std::env::var(name).ok()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ RequesterError::InvalidArgs(_)) => {
            error!(error = %err, "usage: kiln-lease <resource> <amount> <lease-secs> <cookie>");
            ExitCode::from(2)
        }
        Err(err) => {
            error!(error = %err, "lease request failed");
            ExitCode::FAILURE
        }
    }
}

fn run(
    args: impl IntoIterator<Item = String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), RequesterError> {
    let request = parse_args(args)?;
    let timeout = parse_timeout(lookup(TIMEOUT_VAR).as_deref())?;
    let var = RelayConfig::default().resource_proxy_var;
    let endpoint = RelayEndpoint::from_lookup(&var, &lookup)
        .ok_or_else(move || RequesterError::NoEndpoint(var))?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RequesterError::RuntimeInit)?;
    runtime.block_on(request_lease(&endpoint, &request, timeout))
}

async fn request_lease(
    endpoint: &RelayEndpoint,
    request: &LeaseRequest,
    timeout: Option<Duration>,
) -> Result<(), RequesterError> {
    let link = UnixRelayLink::connect(endpoint)
        .await
        .map_err(LeaseError::from)?;
    let mut requester = LeaseRequester::new(link);
    let outcome = match timeout {
        Some(limit) => requester.request_within(request, limit).await?,
        None => requester.request(request).await?,
    };
    match outcome {
        LeaseOutcome::Granted => {
            info!(resource = %request.resource_name, cookie = %request.cookie, "lease held");
            Ok(())
        }
        LeaseOutcome::Denied(reason) => Err(RequesterError::Denied(reason)),
    }
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<LeaseRequest, RequesterError> {
    let mut args = raw.into_iter();
    let (Some(resource_name), Some(amount_arg), Some(lease_arg), Some(cookie), None) = (
        args.next(),
        args.next(),
        args.next(),
        args.next(),
        args.next(),
    ) else {
        return Err(RequesterError::InvalidArgs(USAGE.to_owned()));
    };

    let amount = amount_arg
        .parse::<u32>()
        .ok()
        .filter(|units| *units > 0)
        .ok_or_else(|| {
            RequesterError::InvalidArgs(format!("amount {amount_arg:?} is not a positive integer"))
        })?;
    let lease_seconds = lease_arg.parse::<u32>().map_err(|_| {
        RequesterError::InvalidArgs(format!("lease-secs {lease_arg:?} is not a number"))
    })?;
    if cookie.trim().is_empty() {
        return Err(RequesterError::InvalidArgs("cookie must not be empty".to_owned()));
    }

    Ok(LeaseRequest {
        resource_name,
        cookie,
        amount,
        lease_seconds,
    })
}

fn parse_timeout(value: Option<&str>) -> Result<Option<Duration>, RequesterError> {
    value
        .map(|secs| {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| RequesterError::InvalidTimeout(secs.to_owned()))
        })
        .transpose()
}
