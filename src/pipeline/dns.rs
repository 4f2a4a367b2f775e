// ABOUTME: DNS propagation wait used before requesting certificates.
// ABOUTME: Resolution goes through DnsResolver so tests can script answers.

use super::error::StageError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Whether `domain` currently resolves to at least one address.
    async fn resolves(&self, domain: &str) -> bool;
}

/// The host's resolver via getaddrinfo.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolves(&self, domain: &str) -> bool {
        match tokio::net::lookup_host((domain, 80)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                tracing::debug!(domain, error = %e, "lookup failed");
                false
            }
        }
    }
}

/// Poll until `domain` resolves. Always tries at least once.
pub async fn wait_for_dns(
    resolver: &dyn DnsResolver,
    domain: &str,
    poll: Duration,
    timeout: Duration,
) -> Result<(), StageError> {
    let deadline = Instant::now() + timeout;
    loop {
        if resolver.resolves(domain).await {
            tracing::debug!(domain, "domain resolves");
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(StageError::DnsTimeout {
                domain: domain.to_string(),
                waited: timeout,
            });
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AfterAttempts {
        needed: usize,
        seen: AtomicUsize,
    }

    #[async_trait]
    impl DnsResolver for AfterAttempts {
        async fn resolves(&self, _domain: &str) -> bool {
            self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.needed
        }
    }

    #[tokio::test]
    async fn waits_until_the_domain_resolves() {
        let resolver = AfterAttempts {
            needed: 3,
            seen: AtomicUsize::new(0),
        };
        wait_for_dns(
            &resolver,
            "a.example.com",
            Duration::from_millis(5),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(resolver.seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_per_domain() {
        let resolver = AfterAttempts {
            needed: usize::MAX,
            seen: AtomicUsize::new(0),
        };
        let err = wait_for_dns(
            &resolver,
            "never.example.com",
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("DNS propagation timeout for never.example.com"));
        assert!(resolver.seen.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn localhost_resolves() {
        assert!(SystemResolver.resolves("localhost").await);
    }
}
