//! PKCE material and the pending-flow map
//!
//! Every login attempt lives in an in-memory TTL map keyed by `state`. The
//! map is swept at a fixed cadence; a flow is consumed exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

/// A pending OAuth login flow
#[derive(Debug, Clone)]
pub struct PendingFlow {
    pub state: String,
    pub provider_id: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub created_at: Instant,
}

/// Generate a random `state` value (128 bits, base64url)
pub fn generate_state() -> String {
    random_urlsafe(16)
}

/// Generate a PKCE code verifier (43-128 chars of base64url)
pub fn generate_verifier() -> String {
    // 48 random bytes encode to 64 characters
    random_urlsafe(48)
}

/// Derive the S256 code challenge for a verifier
pub fn challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// TTL map of pending login flows keyed by `state`
#[derive(Clone)]
pub struct FlowMap {
    flows: Arc<Mutex<HashMap<String, PendingFlow>>>,
    ttl: Duration,
}

impl FlowMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            flows: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn insert(&self, flow: PendingFlow) {
        let mut flows = self.flows.lock().await;
        flows.insert(flow.state.clone(), flow);
    }

    /// Consume the flow for `state`, if present and unexpired
    pub async fn take(&self, state: &str) -> Option<PendingFlow> {
        let mut flows = self.flows.lock().await;
        match flows.remove(state) {
            Some(flow) if flow.created_at.elapsed() < self.ttl => Some(flow),
            Some(_) => None,
            None => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.flows.lock().await.len()
    }

    /// Spawn the expiry sweeper
    pub fn spawn_gc(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let flows = self.flows.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let mut guard = flows.lock().await;
                let before = guard.len();
                guard.retain(|_, flow| flow.created_at.elapsed() < ttl);
                let removed = before - guard.len();
                if removed > 0 {
                    debug!(removed, "expired login flows swept");
                }
            }
        })
    }
}
