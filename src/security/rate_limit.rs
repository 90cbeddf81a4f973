//! In-memory fixed-window rate limiting.
//!
//! Counters are keyed by identity and endpoint, live only in this process and are
//! dropped by a periodic sweep once their window has passed. Users with declared
//! accessibility needs get a larger quota over a longer window.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use crate::database::models::{AccessibilityPreferences, VisualImpairmentLevel};

/// Endpoints with a built-in quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Register,
    PasswordReset,
    SendVerificationCode,
    ApiGeneral,
    AccessibilityUpdate,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Login => "login",
            Endpoint::Register => "register",
            Endpoint::PasswordReset => "password_reset",
            Endpoint::SendVerificationCode => "send_verification_code",
            Endpoint::ApiGeneral => "api_general",
            Endpoint::AccessibilityUpdate => "accessibility_update",
        }
    }

    pub fn default_policy(&self) -> RateLimitPolicy {
        let (max_requests, window_minutes) = match self {
            Endpoint::Login => (10, 1),
            Endpoint::Register => (5, 1),
            Endpoint::PasswordReset => (3, 60),
            Endpoint::SendVerificationCode => (3, 60),
            Endpoint::ApiGeneral => (1000, 60),
            Endpoint::AccessibilityUpdate => (50, 1),
        };
        RateLimitPolicy { max_requests, window_minutes }
    }
}

/// Request quota over a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_minutes: u32,
}

impl RateLimitPolicy {
    /// Quota after the accessibility bonus: 1.5x requests over 1.2x the window, rounded down
    pub fn effective(&self, is_accessibility_user: bool) -> RateLimitPolicy {
        if !is_accessibility_user {
            return *self;
        }
        RateLimitPolicy {
            max_requests: scale_down(self.max_requests, 3, 2),
            window_minutes: scale_down(self.window_minutes, 6, 5),
        }
    }
}

fn scale_down(value: u32, numerator: u64, denominator: u64) -> u32 {
    (value as u64 * numerator / denominator).min(u32::MAX as u64) as u32
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Effective maximum for this caller
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets; set only when denied
    pub retry_after_seconds: Option<i64>,
    pub accessibility_bonus: bool,
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Process-local rate limiter shared by all request handlers
#[derive(Debug, Default)]
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter key: the user id when known, otherwise the client address
    pub fn key(ip: &str, endpoint: &str, user_id: Option<&str>) -> String {
        match user_id {
            Some(user_id) => format!("user:{}:{}", user_id, endpoint),
            None => format!("ip:{}:{}", ip, endpoint),
        }
    }

    pub fn check_and_consume(
        &self,
        key: &str,
        base_max: u32,
        base_window_minutes: u32,
        is_accessibility_user: bool,
    ) -> RateLimitDecision {
        self.check_and_consume_at(key, base_max, base_window_minutes, is_accessibility_user, Utc::now())
    }

    /// Count one request against `key` as of `now`
    pub fn check_and_consume_at(
        &self,
        key: &str,
        base_max: u32,
        base_window_minutes: u32,
        is_accessibility_user: bool,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let policy = RateLimitPolicy { max_requests: base_max, window_minutes: base_window_minutes }
            .effective(is_accessibility_user);
        let max = policy.max_requests;

        let new_expiry = match now.checked_add_signed(Duration::minutes(policy.window_minutes as i64)) {
            Some(expiry) => expiry,
            None => {
                // Never lock users out because of a limiter fault
                error!("Rate limit window overflow for key {}; allowing request", key);
                return RateLimitDecision {
                    allowed: true,
                    limit: max,
                    remaining: max,
                    reset_at: now,
                    retry_after_seconds: None,
                    accessibility_bonus: is_accessibility_user,
                };
            }
        };

        let mut entries = self.entries.lock();

        let active = entries.get_mut(key).filter(|entry| now <= entry.expires_at);
        let (allowed, count, reset_at) = match active {
            Some(entry) if entry.count >= max => (false, entry.count, entry.expires_at),
            Some(entry) => {
                entry.count += 1;
                (true, entry.count, entry.expires_at)
            }
            None if max == 0 => (false, 0, new_expiry),
            None => {
                entries.insert(
                    key.to_string(),
                    RateLimitEntry { count: 1, window_start: now, expires_at: new_expiry },
                );
                (true, 1, new_expiry)
            }
        };
        drop(entries);

        if !allowed {
            let retry_after = seconds_until(now, reset_at);
            warn!("Rate limit exceeded for {} ({} requests); retry in {}s", key, count, retry_after);
            return RateLimitDecision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_at,
                retry_after_seconds: Some(retry_after),
                accessibility_bonus: is_accessibility_user,
            };
        }

        RateLimitDecision {
            allowed: true,
            limit: max,
            remaining: max.saturating_sub(count),
            reset_at,
            retry_after_seconds: None,
            accessibility_bonus: is_accessibility_user,
        }
    }

    /// Check against a named policy
    pub fn check_policy(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        is_accessibility_user: bool,
    ) -> RateLimitDecision {
        self.check_and_consume(key, policy.max_requests, policy.window_minutes, is_accessibility_user)
    }

    /// Drop counters whose window has passed; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        before - entries.len()
    }

    /// Number of live counters
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().len()
    }

    /// Start of the current window for `key`, if one is being tracked
    pub fn window_start(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(key).map(|entry| entry.window_start)
    }

    /// Run the expiry sweep every `interval` on a background thread.
    ///
    /// The thread holds a weak reference and exits once the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: StdDuration) -> io::Result<JoinHandle<()>> {
        let limiter = Arc::downgrade(self);

        thread::Builder::new()
            .name("rate-limit-sweeper".to_string())
            .spawn(move || loop {
                thread::sleep(interval);

                let Some(limiter) = limiter.upgrade() else {
                    debug!("Rate limiter dropped; stopping sweeper");
                    break;
                };
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    debug!("Swept {} expired rate limit entries", removed);
                }
            })
    }
}

fn seconds_until(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    let millis = (at - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}

/// Whether a user's declared needs qualify for the larger quota
pub fn is_accessibility_user(prefs: &AccessibilityPreferences) -> bool {
    prefs.screen_reader_user
        || matches!(
            prefs.visual_impairment_level,
            VisualImpairmentLevel::Blind | VisualImpairmentLevel::LowVision
        )
        || prefs.extended_timeout_needed
        || prefs.voice_commands_enabled
}
