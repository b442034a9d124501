//! Client-facing MCP session state
//!
//! A session is created by the first `initialize` and identified by the
//! `Mcp-Session-Id` header the gateway issues. `notifications/initialized`
//! gates every other method. Idle sessions are reaped after a TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{McpError, McpResult};

/// Header carrying the session id
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Per-client session state
#[derive(Debug, Clone)]
pub struct McpSession {
    pub session_id: String,
    pub user_id: String,
    pub protocol_version: String,
    pub created_at: Instant,
    pub last_seen: Instant,
    pub initialized: bool,
}

/// Owns every live client session
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, McpSession>>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Create a session for a negotiated protocol version. Returns the
    /// issued session id (random 128 bits, base64url).
    pub async fn create(&self, user_id: &str, protocol_version: &str) -> String {
        let mut raw = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw);
        let session_id = URL_SAFE_NO_PAD.encode(raw);

        let now = Instant::now();
        let session = McpSession {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            protocol_version: protocol_version.to_string(),
            created_at: now,
            last_seen: now,
            initialized: false,
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);
        debug!(session_id = %session_id, "session created");
        session_id
    }

    /// Look up a session, refresh its activity clock, and enforce ownership
    pub async fn touch(&self, session_id: &str, user_id: &str) -> McpResult<McpSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .filter(|s| s.user_id == user_id)
            .ok_or(McpError::NotInitialized)?;
        session.last_seen = Instant::now();
        Ok(session.clone())
    }

    /// Like [`touch`], but additionally requires the initialized handshake
    /// to have completed.
    pub async fn touch_ready(&self, session_id: &str, user_id: &str) -> McpResult<McpSession> {
        let session = self.touch(session_id, user_id).await?;
        if !session.initialized {
            return Err(McpError::NotInitialized);
        }
        Ok(session)
    }

    /// Mark the session initialized (notifications/initialized received)
    pub async fn mark_initialized(&self, session_id: &str, user_id: &str) -> McpResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .filter(|s| s.user_id == user_id)
            .ok_or(McpError::NotInitialized)?;
        session.initialized = true;
        session.last_seen = Instant::now();
        Ok(())
    }

    pub async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Spawn the idle-session reaper
    pub fn spawn_reaper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let mut guard = sessions.write().await;
                let before = guard.len();
                guard.retain(|_, session| session.last_seen.elapsed() < ttl);
                let reaped = before - guard.len();
                if reaped > 0 {
                    info!(reaped, "idle sessions reaped");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.create("u1", "2025-06-18").await;

        // Not yet initialized: ready-gated access fails
        assert!(matches!(
            manager.touch_ready(&id, "u1").await,
            Err(McpError::NotInitialized)
        ));

        manager.mark_initialized(&id, "u1").await.unwrap();
        let session = manager.touch_ready(&id, "u1").await.unwrap();
        assert_eq!(session.protocol_version, "2025-06-18");

        manager.remove(&id).await;
        assert!(manager.touch(&id, "u1").await.is_err());
    }

    #[tokio::test]
    async fn test_session_is_owner_bound() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let id = manager.create("u1", "2025-06-18").await;
        manager.mark_initialized(&id, "u1").await.unwrap();

        // A different principal cannot ride the session
        assert!(manager.touch_ready(&id, "u2").await.is_err());
    }

    #[tokio::test]
    async fn test_session_ids_are_distinct_urlsafe() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let a = manager.create("u1", "2025-06-18").await;
        let b = manager.create("u1", "2025-06-18").await;
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        // 128 bits of entropy encode to 22 base64url characters
        assert_eq!(a.len(), 22);
    }
}
