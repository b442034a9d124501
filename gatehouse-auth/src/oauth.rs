//! OAuth 2.1 authorization-code flow with PKCE S256
//!
//! Every provider goes through the same flow: initiate builds the authorize
//! URL and parks the verifier under `state`; callback exchanges the code,
//! fetches userinfo, upserts the user, applies AD group mappings, and mints
//! a JWT.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use gatehouse_audit::{AuditEvent, AuditKind, AuditRecorder};
use gatehouse_config::AuthConfig;
use gatehouse_rbac::{Enforcer, DEFAULT_ROLE};
use gatehouse_storage::{ProviderRecord, Store, UserRecord};

use crate::crypto::SecretCipher;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{Claims, TokenSigner};
use crate::pkce::{challenge_s256, generate_state, generate_verifier, FlowMap, PendingFlow};

/// Authenticated identity derived from a verified token
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub provider_id: String,
}

/// Public view of an enabled provider
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderSummary {
    pub provider_id: String,
    pub provider_name: String,
    pub scopes: Vec<String>,
}

/// Parameters for registering a provider
#[derive(Debug, Clone, Deserialize)]
pub struct NewProvider {
    pub provider_id: String,
    pub provider_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
}

/// The authentication plane
#[derive(Clone)]
pub struct AuthService {
    store: Store,
    cipher: SecretCipher,
    signer: TokenSigner,
    audit: AuditRecorder,
    enforcer: Enforcer,
    flows: FlowMap,
    http: reqwest::Client,
    callback_url: String,
}

impl AuthService {
    pub fn new(
        store: Store,
        cipher: SecretCipher,
        signer: TokenSigner,
        audit: AuditRecorder,
        enforcer: Enforcer,
        config: &AuthConfig,
        callback_url: String,
    ) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()
            .map_err(|e| AuthError::crypto(format!("http client: {}", e)))?;
        Ok(Self {
            store,
            cipher,
            signer,
            audit,
            enforcer,
            flows: FlowMap::new(config.flow_ttl),
            http,
            callback_url,
        })
    }

    /// Background GC of expired login flows
    pub fn spawn_flow_gc(&self) -> tokio::task::JoinHandle<()> {
        self.flows.spawn_gc(Duration::from_secs(60))
    }

    pub async fn public_providers(&self) -> AuthResult<Vec<ProviderSummary>> {
        let providers = self.store.providers().list(true).await?;
        Ok(providers
            .into_iter()
            .map(|p| ProviderSummary {
                provider_id: p.provider_id,
                provider_name: p.provider_name,
                scopes: p.scopes,
            })
            .collect())
    }

    /// Register a provider, sealing its client secret
    pub async fn add_provider(&self, params: NewProvider) -> AuthResult<ProviderRecord> {
        let record = ProviderRecord {
            provider_id: params.provider_id,
            provider_name: params.provider_name,
            client_id: params.client_id,
            client_secret_ciphertext: self.cipher.encrypt_str(&params.client_secret)?,
            authorize_url: params.authorize_url,
            token_url: params.token_url,
            userinfo_url: params.userinfo_url,
            scopes: params.scopes,
            enabled: true,
        };
        self.store.providers().put(&record).await?;
        Ok(record)
    }

    pub async fn remove_provider(&self, provider_id: &str) -> AuthResult<()> {
        self.store.providers().delete(provider_id).await?;
        Ok(())
    }

    /// Start a login attempt; returns the provider authorize URL
    pub async fn initiate(&self, provider_id: &str) -> AuthResult<String> {
        let provider = self.store.providers().get(provider_id).await?;
        if !provider.enabled {
            return Err(AuthError::provider(provider_id, "provider disabled"));
        }

        let state = generate_state();
        let code_verifier = generate_verifier();
        let code_challenge = challenge_s256(&code_verifier);

        self.flows
            .insert(PendingFlow {
                state: state.clone(),
                provider_id: provider_id.to_string(),
                code_verifier,
                redirect_uri: self.callback_url.clone(),
                created_at: std::time::Instant::now(),
            })
            .await;

        let mut authorize = url::Url::parse(&provider.authorize_url)
            .map_err(|e| AuthError::provider(provider_id, format!("authorize_url: {}", e)))?;
        authorize
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("scope", &provider.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        debug!(provider_id, "login flow initiated");
        Ok(authorize.into())
    }

    /// Complete a login attempt. On success returns the bearer token and
    /// its claims.
    pub async fn callback(&self, state: &str, code: &str) -> AuthResult<(String, Claims)> {
        match self.callback_inner(state, code).await {
            Ok(result) => Ok(result),
            Err(err) => {
                self.audit
                    .record(
                        AuditEvent::failure(AuditKind::LoginFailure)
                            .details(serde_json::json!({"reason": err.to_string()})),
                    )
                    .await;
                Err(err)
            }
        }
    }

    async fn callback_inner(&self, state: &str, code: &str) -> AuthResult<(String, Claims)> {
        let flow = self.flows.take(state).await.ok_or(AuthError::FlowNotFound)?;
        let provider = self.store.providers().get(&flow.provider_id).await?;
        let client_secret = self.cipher.decrypt_str(&provider.client_secret_ciphertext)?;

        let access_token = self
            .exchange_code(&provider, &client_secret, code, &flow)
            .await?;
        let info = self.fetch_userinfo(&provider, &access_token).await?;

        let email = info
            .email
            .clone()
            .ok_or_else(|| AuthError::provider(&provider.provider_id, "userinfo missing email"))?;
        let subject = info.sub.clone().unwrap_or_else(|| email.clone());
        let display_name = info.name.clone().unwrap_or_else(|| email.clone());

        let user = self
            .upsert_user(&provider.provider_id, &subject, &email, &display_name)
            .await?;
        if !user.enabled {
            return Err(AuthError::AccountDisabled {
                user_id: user.user_id,
            });
        }

        self.apply_group_mappings(&user.user_id, &info.groups).await?;
        self.store
            .users()
            .touch_login(&user.user_id, &display_name, &provider.provider_id, &subject)
            .await?;

        let (token, claims) = self.signer.issue(&user)?;

        self.audit
            .record(
                AuditEvent::new(AuditKind::LoginSuccess)
                    .user(&user.user_id, &user.email)
                    .details(serde_json::json!({"provider": provider.provider_id})),
            )
            .await;
        self.audit
            .record(
                AuditEvent::new(AuditKind::TokenIssued)
                    .user(&user.user_id, &user.email)
                    .details(serde_json::json!({"jti": claims.jti, "exp": claims.exp})),
            )
            .await;

        Ok((token, claims))
    }

    /// Exchange the authorization code, with one retry on network errors
    async fn exchange_code(
        &self,
        provider: &ProviderRecord,
        client_secret: &str,
        code: &str,
        flow: &PendingFlow,
    ) -> AuthResult<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &flow.redirect_uri),
            ("code_verifier", &flow.code_verifier),
        ];

        let mut last_err = None;
        for attempt in 0..2 {
            let response = self
                .http
                .post(&provider.token_url)
                .basic_auth(&provider.client_id, Some(client_secret))
                .form(&params)
                .send()
                .await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: TokenResponse = resp.json().await.map_err(|e| {
                        AuthError::provider(&provider.provider_id, format!("token body: {}", e))
                    })?;
                    return Ok(body.access_token);
                }
                Ok(resp) => {
                    return Err(AuthError::provider(
                        &provider.provider_id,
                        format!("token endpoint returned {}", resp.status()),
                    ));
                }
                Err(e) if attempt == 0 && (e.is_connect() || e.is_timeout()) => {
                    warn!(provider_id = %provider.provider_id, error = %e, "token exchange retry");
                    last_err = Some(e);
                }
                Err(e) => {
                    return Err(AuthError::provider(
                        &provider.provider_id,
                        format!("token exchange: {}", e),
                    ));
                }
            }
        }
        Err(AuthError::provider(
            &provider.provider_id,
            format!(
                "token exchange: {}",
                last_err.map(|e| e.to_string()).unwrap_or_default()
            ),
        ))
    }

    async fn fetch_userinfo(
        &self,
        provider: &ProviderRecord,
        access_token: &str,
    ) -> AuthResult<UserInfo> {
        let resp = self
            .http
            .get(&provider.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::provider(&provider.provider_id, format!("userinfo: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AuthError::provider(
                &provider.provider_id,
                format!("userinfo returned {}", resp.status()),
            ));
        }
        resp.json()
            .await
            .map_err(|e| AuthError::provider(&provider.provider_id, format!("userinfo body: {}", e)))
    }

    /// Find the user by (provider, subject), then by email, else create one
    /// with the default role.
    async fn upsert_user(
        &self,
        provider_id: &str,
        subject: &str,
        email: &str,
        display_name: &str,
    ) -> AuthResult<UserRecord> {
        if let Some(user) = self.store.users().get_by_subject(provider_id, subject).await? {
            return Ok(user);
        }
        if let Some(user) = self.store.users().get_by_email(email).await? {
            return Ok(user);
        }

        let user = UserRecord {
            user_id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            provider_id: Some(provider_id.to_string()),
            subject: Some(subject.to_string()),
            enabled: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.store.users().insert(&user).await?;

        if let Some(role) = self.store.roles().get_by_name(DEFAULT_ROLE).await? {
            self.store.roles().assign(&user.user_id, &role.role_id).await?;
            self.enforcer.invalidate(&user.user_id).await;
        } else {
            warn!("default role '{}' missing; new user has no role", DEFAULT_ROLE);
        }

        debug!(user_id = %user.user_id, "user created on first login");
        Ok(user)
    }

    /// Union the roles mapped from every matching group DN
    async fn apply_group_mappings(&self, user_id: &str, groups: &[String]) -> AuthResult<()> {
        let mut assigned = false;
        for dn in groups {
            if let Some(mapping) = self.store.mappings().get(dn).await? {
                for role_id in &mapping.role_ids {
                    self.store.roles().assign(user_id, role_id).await?;
                    assigned = true;
                }
            }
        }
        if assigned {
            self.enforcer.invalidate(user_id).await;
        }
        Ok(())
    }

    /// Verify a bearer token and resolve its principal
    pub async fn verify(&self, token: &str) -> AuthResult<Principal> {
        let claims = self.signer.verify(token)?;
        let user = self
            .store
            .users()
            .get(&claims.sub)
            .await
            .map_err(|_| AuthError::unauthenticated("unknown subject"))?;
        if !user.enabled {
            return Err(AuthError::AccountDisabled {
                user_id: user.user_id,
            });
        }
        Ok(Principal {
            user_id: user.user_id,
            email: user.email,
            name: user.display_name,
            provider_id: claims.provider,
        })
    }

    /// Server-side logout is an audit record; the client drops the token
    pub async fn logout(&self, principal: &Principal) {
        self.audit
            .record(
                AuditEvent::new(AuditKind::Logout).user(&principal.user_id, &principal.email),
            )
            .await;
    }
}
