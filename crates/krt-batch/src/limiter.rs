//! Shared rate limiter for external extractor calls
//!
//! One limiter is shared by every worker in a batch. Permit acquisition is
//! serialized by governor's atomic state, so concurrent workers can never
//! exceed the configured call rate together.

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};

use crate::BatchError;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct CallRateLimiter {
    limiter: DirectRateLimiter,
    per_minute: NonZeroU32,
}

impl CallRateLimiter {
    /// Limit to `requests_per_minute` calls, allowing a burst of one
    /// minute's quota
    pub fn per_minute(requests_per_minute: u32) -> Result<Self, BatchError> {
        let per_minute = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            BatchError::InvalidConfig("requests_per_minute must be > 0".to_string())
        })?;
        Ok(Self {
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            per_minute,
        })
    }

    /// Wait until a call is permitted
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit only if one is available now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.per_minute.get()
    }
}

impl std::fmt::Debug for CallRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRateLimiter")
            .field("requests_per_minute", &self.per_minute)
            .finish()
    }
}
