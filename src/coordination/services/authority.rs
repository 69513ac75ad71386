//! Server-side allocation of shared resources to lease requesters.

use crate::coordination::domain::{LeaseRequest, LeaseResponse, RequesterId};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A response addressed to the requester that must receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseReply {
    /// Connection the reply goes to.
    pub requester: RequesterId,
    /// The answer.
    pub response: LeaseResponse,
}

#[derive(Debug, Clone)]
struct Requisition {
    requester: RequesterId,
    request: LeaseRequest,
}

#[derive(Debug, Clone)]
struct Lease {
    requisition: Requisition,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Resource {
    budget: u32,
    allocated: u32,
    queued: VecDeque<Requisition>,
    leased: Vec<Lease>,
}

impl Resource {
    const fn new(budget: u32) -> Self {
        Self {
            budget,
            allocated: 0,
            queued: VecDeque::new(),
            leased: Vec::new(),
        }
    }

    /// Grants queued requests in arrival order while the budget allows.
    ///
    /// The first request that does not fit blocks every request behind it.
    fn grant_queued(&mut self, name: &str, now: DateTime<Utc>) -> Vec<LeaseReply> {
        let mut replies = Vec::new();
        while let Some(head) = self.queued.front() {
            let free = self.budget.saturating_sub(self.allocated);
            if head.request.amount > free {
                break;
            }
            let Some(requisition) = self.queued.pop_front() else {
                break;
            };
            self.allocated += requisition.request.amount;
            let expires_at = now + TimeDelta::seconds(i64::from(requisition.request.lease_seconds));
            info!(
                resource = name,
                cookie = %requisition.request.cookie,
                amount = requisition.request.amount,
                allocated = self.allocated,
                budget = self.budget,
                "leased resource"
            );
            replies.push(LeaseReply {
                requester: requisition.requester,
                response: LeaseResponse::granted(&requisition.request),
            });
            self.leased.push(Lease {
                requisition,
                expires_at,
            });
        }
        replies
    }

    fn free_lease(&mut self, name: &str, lease: &Lease) {
        self.allocated = self
            .allocated
            .saturating_sub(lease.requisition.request.amount);
        info!(
            resource = name,
            cookie = %lease.requisition.request.cookie,
            allocated = self.allocated,
            budget = self.budget,
            "freed lease"
        );
    }

    fn holds_cookie(&self, cookie: &str) -> bool {
        self.queued
            .iter()
            .any(|queued| queued.request.cookie == cookie)
            || self
                .leased
                .iter()
                .any(|lease| lease.requisition.request.cookie == cookie)
    }
}

/// Authority handing out leases on well-known, budgeted resources.
pub struct ResourceAuthority<C>
where
    C: Clock + Send + Sync,
{
    clock: Arc<C>,
    resources: BTreeMap<String, Resource>,
}

impl<C> ResourceAuthority<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an authority with no resources.
    #[must_use]
    pub const fn new(clock: Arc<C>) -> Self {
        Self {
            clock,
            resources: BTreeMap::new(),
        }
    }

    /// Declares a well-known resource with `budget` units.
    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>, budget: u32) -> Self {
        self.resources.insert(name.into(), Resource::new(budget));
        self
    }

    /// Handles a lease request from `requester`.
    ///
    /// Unknown resources, empty requests, requests larger than the whole
    /// budget and cookies already in use are denied at once. Anything else
    /// joins the resource's queue; the returned replies hold every grant the
    /// request made possible.
    pub fn request(&mut self, requester: RequesterId, request: LeaseRequest) -> Vec<LeaseReply> {
        let now = self.clock.utc();
        let cookie_in_use = self
            .resources
            .values()
            .any(|resource| resource.holds_cookie(&request.cookie));
        let Some(resource) = self.resources.get_mut(&request.resource_name) else {
            warn!(resource = %request.resource_name, %requester, "lease request for unknown resource");
            return vec![deny(requester, &request, "unknown resource")];
        };

        let refusal = if request.amount == 0 {
            Some("empty request")
        } else if request.amount > resource.budget {
            Some("request exceeds resource budget")
        } else if cookie_in_use {
            Some("cookie already in use")
        } else {
            None
        };
        if let Some(reason) = refusal {
            warn!(
                resource = %request.resource_name,
                %requester,
                amount = request.amount,
                budget = resource.budget,
                reason,
                "denying lease request"
            );
            return vec![deny(requester, &request, reason)];
        }

        debug!(resource = %request.resource_name, cookie = %request.cookie, "queued lease request");
        let name = request.resource_name.clone();
        resource.queued.push_back(Requisition { requester, request });
        resource.grant_queued(&name, now)
    }

    /// Frees the lease or queued request holding `cookie`.
    ///
    /// Returns the grants made possible by the release.
    pub fn release(&mut self, cookie: &str) -> Vec<LeaseReply> {
        let now = self.clock.utc();
        for (name, resource) in &mut self.resources {
            if let Some(index) = resource
                .leased
                .iter()
                .position(|lease| lease.requisition.request.cookie == cookie)
            {
                let lease = resource.leased.remove(index);
                resource.free_lease(name, &lease);
                return resource.grant_queued(name, now);
            }
            if let Some(index) = resource
                .queued
                .iter()
                .position(|queued| queued.request.cookie == cookie)
            {
                resource.queued.remove(index);
                debug!(resource = %name, cookie, "dropped queued lease request");
                return resource.grant_queued(name, now);
            }
        }
        warn!(cookie, "release for unknown lease");
        Vec::new()
    }

    /// Ends every lease whose term ran out at `now`.
    ///
    /// Returns the grants made possible by the expiries.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<LeaseReply> {
        let mut replies = Vec::new();
        for (name, resource) in &mut self.resources {
            let (expired, live): (Vec<Lease>, Vec<Lease>) = resource
                .leased
                .drain(..)
                .partition(|lease| lease.expires_at <= now);
            resource.leased = live;
            if expired.is_empty() {
                continue;
            }
            for lease in &expired {
                info!(resource = %name, cookie = %lease.requisition.request.cookie, "lease expired");
                resource.free_lease(name, lease);
            }
            replies.extend(resource.grant_queued(name, now));
        }
        replies
    }

    /// Ends every lease whose term has run out by now.
    ///
    /// Returns the grants made possible by the expiries.
    pub fn expire_due(&mut self) -> Vec<LeaseReply> {
        let now = self.clock.utc();
        self.expire(now)
    }

    /// Drops every lease and queued request of a departed requester.
    ///
    /// Returns the grants made possible for the remaining requesters.
    pub fn disconnect(&mut self, requester: RequesterId) -> Vec<LeaseReply> {
        let now = self.clock.utc();
        let mut replies = Vec::new();
        for (name, resource) in &mut self.resources {
            let before = resource.queued.len() + resource.leased.len();
            resource
                .queued
                .retain(|queued| queued.requester != requester);
            let (dropped, kept): (Vec<Lease>, Vec<Lease>) = resource
                .leased
                .drain(..)
                .partition(|lease| lease.requisition.requester == requester);
            resource.leased = kept;
            for lease in &dropped {
                resource.free_lease(name, lease);
            }
            if before != resource.queued.len() + resource.leased.len() {
                debug!(resource = %name, %requester, "dropped requests of departed requester");
                replies.extend(resource.grant_queued(name, now));
            }
        }
        replies
    }

    /// Returns the units of `resource` currently leased.
    #[must_use]
    pub fn allocated(&self, resource: &str) -> Option<u32> {
        self.resources.get(resource).map(|entry| entry.allocated)
    }

    /// Returns how many requests wait on `resource`.
    #[must_use]
    pub fn queued(&self, resource: &str) -> usize {
        self.resources
            .get(resource)
            .map_or(0, |entry| entry.queued.len())
    }
}

fn deny(requester: RequesterId, request: &LeaseRequest, reason: &str) -> LeaseReply {
    LeaseReply {
        requester,
        response: LeaseResponse::denied(request, reason),
    }
}
