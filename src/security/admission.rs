//! Admission policy: the per-attempt decision.
//!
//! Operator lists are consulted first and are authoritative. Only an address
//! on neither list reaches the attempt buckets, where the IP, login and
//! password must all be under their ceilings.

use crate::error::{GuardError, GuardResult};
use crate::metrics;
use crate::security::buckets::{AttemptLimiter, KeyType};
use crate::security::ip_lists::{IpListStore, ListKind};
use crate::security::ip_range::{IpRange, format_address, parse_address};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Address is inside a blacklist range. Buckets untouched.
    Blacklisted,
    /// Address is inside a whitelist range. Buckets untouched.
    Whitelisted,
    /// All three buckets were under their ceilings.
    Admitted,
    /// At least one bucket reached its ceiling.
    Throttled,
}

impl Verdict {
    pub fn allowed(self) -> bool {
        matches!(self, Verdict::Whitelisted | Verdict::Admitted)
    }

    /// Label used in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Blacklisted => "blacklisted",
            Verdict::Whitelisted => "whitelisted",
            Verdict::Admitted => "admitted",
            Verdict::Throttled => "throttled",
        }
    }
}

/// Combines the range lists with an attempt limiter.
///
/// This is also the surface transports talk to: every administrative call is
/// routed through here so they share one place for deadlines and logging.
#[derive(Clone)]
pub struct AdmissionPolicy {
    lists: Arc<IpListStore>,
    limiter: Arc<dyn AttemptLimiter>,
}

impl AdmissionPolicy {
    pub fn new(lists: Arc<IpListStore>, limiter: Arc<dyn AttemptLimiter>) -> Self {
        Self { lists, limiter }
    }

    /// Decide one attempt.
    ///
    /// Listed addresses are decided without looking at `login` or `password`.
    /// Otherwise both must be non-empty before any bucket is touched, and all
    /// three buckets record the attempt whatever the others return.
    pub async fn evaluate(&self, ip: &str, login: &str, password: &str) -> GuardResult<Verdict> {
        let addr = parse_address(ip)?;

        let verdict = if self.lists.contains_addr(ListKind::Black, addr) {
            info!(ip = %format_address(addr), login, "attempt from blacklisted range");
            Verdict::Blacklisted
        } else if self.lists.contains_addr(ListKind::White, addr) {
            debug!(ip = %format_address(addr), login, "attempt from whitelisted range");
            Verdict::Whitelisted
        } else {
            if login.is_empty() {
                return Err(GuardError::EmptyKey(KeyType::Login));
            }
            if password.is_empty() {
                return Err(GuardError::EmptyKey(KeyType::Password));
            }
            let ip_key = format_address(addr);
            let ip_ok = self.limiter.check(KeyType::Ip, &ip_key).await?;
            let login_ok = self.limiter.check(KeyType::Login, login).await?;
            let password_ok = self.limiter.check(KeyType::Password, password).await?;

            if ip_ok && login_ok && password_ok {
                debug!(ip = %ip_key, login, "attempt admitted");
                Verdict::Admitted
            } else {
                info!(
                    ip = %ip_key,
                    login,
                    ip_ok,
                    login_ok,
                    password_ok,
                    "attempt throttled"
                );
                Verdict::Throttled
            }
        };

        metrics::record_decision(verdict.as_str());
        Ok(verdict)
    }

    /// `true` if the attempt may proceed to credential verification.
    pub async fn authorize(&self, ip: &str, login: &str, password: &str) -> GuardResult<bool> {
        Ok(self.evaluate(ip, login, password).await?.allowed())
    }

    /// Clear one bucket.
    ///
    /// IP keys are normalized the same way [`AdmissionPolicy::evaluate`]
    /// stores them, so `010.0.0.1` resets the bucket for `10.0.0.1`.
    pub async fn reset_bucket(&self, kind: KeyType, key: &str, deadline: Instant) -> GuardResult<()> {
        let key = match kind {
            KeyType::Ip => format_address(parse_address(key)?),
            KeyType::Login | KeyType::Password => {
                if key.is_empty() {
                    return Err(GuardError::EmptyKey(kind));
                }
                key.to_string()
            }
        };
        if Instant::now() >= deadline {
            return Err(GuardError::Cancelled);
        }

        tokio::time::timeout_at(deadline, self.limiter.reset(kind, &key))
            .await
            .map_err(|_| GuardError::Cancelled)??;
        info!(kind = %kind, "bucket reset by operator");
        Ok(())
    }

    pub async fn add_white(&self, addr: &str, mask: &str, deadline: Instant) -> GuardResult<IpRange> {
        self.lists.add_white(addr, mask, deadline).await
    }

    pub async fn add_black(&self, addr: &str, mask: &str, deadline: Instant) -> GuardResult<IpRange> {
        self.lists.add_black(addr, mask, deadline).await
    }

    pub async fn del_white(&self, addr: &str, deadline: Instant) -> GuardResult<()> {
        self.lists.del_white(addr, deadline).await
    }

    pub async fn del_black(&self, addr: &str, deadline: Instant) -> GuardResult<()> {
        self.lists.del_black(addr, deadline).await
    }

    pub fn list_white(&self) -> Vec<IpRange> {
        self.lists.list_white()
    }

    pub fn list_black(&self) -> Vec<IpRange> {
        self.lists.list_black()
    }
}
