//! Management JSON-RPC surface: POST /manage
//!
//! Every method is gated by an explicit permission; every mutation records
//! its audit event durably before the response is produced.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use gatehouse_audit::{AuditEvent, AuditKind};
use gatehouse_auth::{NewProvider, Principal};
use gatehouse_mcp::{JsonRpcRequest, JsonRpcResponse, McpError};
use gatehouse_rbac::Permission;
use gatehouse_storage::{AclRecord, AuditQuery, ProviderRecord, ServerRecord};

use crate::error::{auth_error_to_mcp, rbac_error_to_mcp};
use crate::state::GatewayCore;

/// POST /manage
pub async fn manage_endpoint(
    State(core): State<GatewayCore>,
    crate::middleware::CurrentUser(principal): crate::middleware::CurrentUser,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let id = request.id.clone();
    if let Err(err) = request.validate() {
        return rpc_error(&err, id);
    }

    match dispatch(&core, &principal, &request).await {
        Ok(result) => Json(JsonRpcResponse::success(result, id)).into_response(),
        Err(err) => rpc_error(&err, id),
    }
}

async fn dispatch(
    core: &GatewayCore,
    principal: &Principal,
    request: &JsonRpcRequest,
) -> Result<Value, McpError> {
    let params = request.params.clone();
    match request.method.as_str() {
        "server.add" => server_add(core, principal, params).await,
        "server.list" => server_list(core, principal).await,
        "server.get" => server_get(core, principal, params).await,
        "server.remove" => server_remove(core, principal, params).await,
        "server.test" => server_test(core, principal, params).await,
        "oauth.provider.add" => provider_add(core, principal, params).await,
        "oauth.provider.list" => provider_list(core, principal).await,
        "oauth.provider.remove" => provider_remove(core, principal, params).await,
        "role.list" => role_list(core, principal).await,
        "role.create" => role_create(core, principal, params).await,
        "role.update" => role_update(core, principal, params).await,
        "role.delete" => role_delete(core, principal, params).await,
        "user.list" => user_list(core, principal).await,
        "user.assign_role" => assign_role(core, principal, params).await,
        "user.revoke_role" => revoke_role(core, principal, params).await,
        "acl.set" => acl_set(core, principal, params).await,
        "acl.clear" => acl_clear(core, principal, params).await,
        "mapping.set" => mapping_set(core, principal, params).await,
        "mapping.list" => mapping_list(core, principal).await,
        "mapping.delete" => mapping_delete(core, principal, params).await,
        "audit.query" => audit_query(core, principal, params).await,
        "audit.statistics" => audit_statistics(core, principal).await,
        "config.get" => config_get(core, principal, params).await,
        "config.set" => config_set(core, principal, params).await,
        other => Err(McpError::method_not_found(other)),
    }
}

/// Gate a method behind a permission; denials are audited
async fn require(
    core: &GatewayCore,
    principal: &Principal,
    permission: Permission,
) -> Result<(), McpError> {
    let allowed = core
        .enforcer
        .has_permission(&principal.user_id, permission)
        .await?;
    if !allowed {
        core.enforcer
            .audit_permission_denied(&principal.user_id, permission)
            .await;
        return Err(McpError::forbidden(format!("{} required", permission)));
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, McpError> {
    let params = params.ok_or_else(|| McpError::bad_request("params required"))?;
    serde_json::from_value(params).map_err(|e| McpError::bad_request(e.to_string()))
}

// === servers ===

#[derive(Deserialize)]
struct ServerAddParams {
    url: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ServerIdParams {
    server_id: String,
}

async fn server_add(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ServerAdd).await?;
    let params: ServerAddParams = parse(params)?;

    let record = core
        .registry
        .add_server(&params.url, params.description.as_deref())
        .await?;
    core.router.rebuild_catalog().await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ServerAdded)
                .user(&principal.user_id, &principal.email)
                .resource("server", &record.server_id)
                .action("server.add")
                .details(json!({"url": record.url, "tool_count": record.tool_count})),
        )
        .await;

    Ok(server_view(&record))
}

async fn server_list(core: &GatewayCore, principal: &Principal) -> Result<Value, McpError> {
    require(core, principal, Permission::ServerView).await?;
    let servers = core.registry.list_servers().await?;
    Ok(json!({ "servers": servers.iter().map(server_view).collect::<Vec<_>>() }))
}

async fn server_get(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ServerView).await?;
    let params: ServerIdParams = parse(params)?;
    let record = core.registry.get_server(&params.server_id).await?;
    Ok(server_view(&record))
}

async fn server_remove(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ServerDelete).await?;
    let params: ServerIdParams = parse(params)?;

    let record = core.registry.remove_server(&params.server_id).await?;
    core.router.rebuild_catalog().await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ServerRemoved)
                .user(&principal.user_id, &principal.email)
                .resource("server", &record.server_id)
                .action("server.remove")
                .details(json!({"url": record.url})),
        )
        .await;

    Ok(json!({"removed": record.server_id}))
}

async fn server_test(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ServerTest).await?;
    let params: ServerIdParams = parse(params)?;

    let report = core.registry.test_server(&params.server_id).await?;
    core.audit
        .record(
            AuditEvent::new(AuditKind::ServerTest)
                .user(&principal.user_id, &principal.email)
                .resource("server", &params.server_id)
                .action("server.test")
                .details(serde_json::to_value(&report).unwrap_or_default()),
        )
        .await;

    Ok(serde_json::to_value(report).map_err(McpError::from)?)
}

fn server_view(record: &ServerRecord) -> Value {
    json!({
        "server_id": record.server_id,
        "name": record.name,
        "url": record.url,
        "description": record.description,
        "protocol_version": record.protocol_version,
        "tool_count": record.tool_count,
        "enabled": record.enabled,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
    })
}

// === oauth providers ===

#[derive(Deserialize)]
struct ProviderIdParams {
    provider_id: String,
}

async fn provider_add(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::OauthManage).await?;
    let params: NewProvider = parse(params)?;

    let record = core
        .auth
        .add_provider(params)
        .await
        .map_err(auth_error_to_mcp)?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ProviderAdded)
                .user(&principal.user_id, &principal.email)
                .resource("oauth_provider", &record.provider_id)
                .action("oauth.provider.add")
                .details(json!({"provider_name": record.provider_name})),
        )
        .await;

    Ok(provider_view(&record))
}

async fn provider_list(core: &GatewayCore, principal: &Principal) -> Result<Value, McpError> {
    require(core, principal, Permission::OauthManage).await?;
    let providers = core.store.providers().list(false).await?;
    Ok(json!({ "providers": providers.iter().map(provider_view).collect::<Vec<_>>() }))
}

async fn provider_remove(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::OauthManage).await?;
    let params: ProviderIdParams = parse(params)?;

    core.auth
        .remove_provider(&params.provider_id)
        .await
        .map_err(auth_error_to_mcp)?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ProviderRemoved)
                .user(&principal.user_id, &principal.email)
                .resource("oauth_provider", &params.provider_id)
                .action("oauth.provider.remove"),
        )
        .await;

    Ok(json!({"removed": params.provider_id}))
}

/// Public view: the client secret never leaves the store, even encrypted
fn provider_view(record: &ProviderRecord) -> Value {
    json!({
        "provider_id": record.provider_id,
        "provider_name": record.provider_name,
        "client_id": record.client_id,
        "authorize_url": record.authorize_url,
        "token_url": record.token_url,
        "userinfo_url": record.userinfo_url,
        "scopes": record.scopes,
        "enabled": record.enabled,
    })
}

// === roles ===

#[derive(Deserialize)]
struct RoleCreateParams {
    name: String,
    #[serde(default)]
    description: String,
    permissions: Vec<String>,
}

#[derive(Deserialize)]
struct RoleUpdateParams {
    role_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RoleIdParams {
    role_id: String,
}

async fn role_list(core: &GatewayCore, principal: &Principal) -> Result<Value, McpError> {
    require(core, principal, Permission::RoleView).await?;
    let roles = core.roles.list().await.map_err(rbac_error_to_mcp)?;
    Ok(json!({ "roles": roles }))
}

async fn role_create(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::RoleManage).await?;
    let params: RoleCreateParams = parse(params)?;

    let role = core
        .roles
        .create(&params.name, &params.description, &params.permissions)
        .await
        .map_err(rbac_error_to_mcp)?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::RoleCreated)
                .user(&principal.user_id, &principal.email)
                .resource("role", &role.role_id)
                .action("role.create")
                .details(json!({"name": role.name, "permissions": role.permissions})),
        )
        .await;

    Ok(serde_json::to_value(role).map_err(McpError::from)?)
}

async fn role_update(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::RoleManage).await?;
    let params: RoleUpdateParams = parse(params)?;

    let role = core
        .roles
        .update(
            &params.role_id,
            params.description.as_deref(),
            params.permissions.as_deref(),
        )
        .await
        .map_err(rbac_error_to_mcp)?;
    core.enforcer.invalidate_all().await;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::RoleUpdated)
                .user(&principal.user_id, &principal.email)
                .resource("role", &role.role_id)
                .action("role.update")
                .details(json!({"permissions": role.permissions})),
        )
        .await;

    Ok(serde_json::to_value(role).map_err(McpError::from)?)
}

async fn role_delete(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::RoleManage).await?;
    let params: RoleIdParams = parse(params)?;

    core.roles
        .delete(&params.role_id)
        .await
        .map_err(rbac_error_to_mcp)?;
    core.enforcer.invalidate_all().await;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::RoleDeleted)
                .user(&principal.user_id, &principal.email)
                .resource("role", &params.role_id)
                .action("role.delete"),
        )
        .await;

    Ok(json!({"deleted": params.role_id}))
}

// === users ===

#[derive(Deserialize)]
struct BindingParams {
    user_id: String,
    role_id: String,
}

async fn user_list(core: &GatewayCore, principal: &Principal) -> Result<Value, McpError> {
    require(core, principal, Permission::UserView).await?;
    let users = core.store.users().list().await?;
    Ok(json!({ "users": users }))
}

async fn assign_role(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::UserManage).await?;
    let params: BindingParams = parse(params)?;

    // Both sides must exist before binding
    core.store.users().get(&params.user_id).await?;
    core.store.roles().get(&params.role_id).await?;
    core.store.roles().assign(&params.user_id, &params.role_id).await?;
    core.enforcer.invalidate(&params.user_id).await;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::RoleAssigned)
                .user(&principal.user_id, &principal.email)
                .resource("role", &params.role_id)
                .action("user.assign_role")
                .details(json!({"target_user_id": params.user_id})),
        )
        .await;

    Ok(json!({"assigned": true}))
}

async fn revoke_role(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::UserManage).await?;
    let params: BindingParams = parse(params)?;

    core.store.roles().revoke(&params.user_id, &params.role_id).await?;
    core.enforcer.invalidate(&params.user_id).await;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::RoleRevoked)
                .user(&principal.user_id, &principal.email)
                .resource("role", &params.role_id)
                .action("user.revoke_role")
                .details(json!({"target_user_id": params.user_id})),
        )
        .await;

    Ok(json!({"revoked": true}))
}

// === ACLs ===

#[derive(Deserialize)]
struct AclSetParams {
    user_id: String,
    server_id: String,
    /// Absent means every tool on the server
    #[serde(default)]
    allowed_tools: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct AclClearParams {
    user_id: String,
    server_id: String,
}

async fn acl_set(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ToolManage).await?;
    let params: AclSetParams = parse(params)?;

    core.store.users().get(&params.user_id).await?;
    core.registry.get_server(&params.server_id).await?;
    core.store
        .acls()
        .set(&AclRecord {
            user_id: params.user_id.clone(),
            server_id: params.server_id.clone(),
            allowed_tools: params.allowed_tools.clone(),
        })
        .await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::AclChanged)
                .user(&principal.user_id, &principal.email)
                .resource("server_acl", &params.server_id)
                .action("acl.set")
                .details(json!({
                    "target_user_id": params.user_id,
                    "allowed_tools": params.allowed_tools,
                })),
        )
        .await;

    Ok(json!({"set": true}))
}

async fn acl_clear(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ToolManage).await?;
    let params: AclClearParams = parse(params)?;

    core.store.acls().clear(&params.user_id, &params.server_id).await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::AclChanged)
                .user(&principal.user_id, &principal.email)
                .resource("server_acl", &params.server_id)
                .action("acl.clear")
                .details(json!({"target_user_id": params.user_id})),
        )
        .await;

    Ok(json!({"cleared": true}))
}

// === AD group mappings ===

#[derive(Deserialize)]
struct MappingSetParams {
    dn: String,
    role_ids: Vec<String>,
}

#[derive(Deserialize)]
struct MappingDnParams {
    dn: String,
}

async fn mapping_set(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::UserManage).await?;
    let params: MappingSetParams = parse(params)?;

    for role_id in &params.role_ids {
        core.store.roles().get(role_id).await?;
    }
    core.store
        .mappings()
        .put(&gatehouse_storage::AdGroupMapping {
            dn: params.dn.clone(),
            role_ids: params.role_ids.clone(),
        })
        .await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ConfigChanged)
                .user(&principal.user_id, &principal.email)
                .resource("ad_group_mapping", &params.dn)
                .action("mapping.set")
                .details(json!({"role_ids": params.role_ids})),
        )
        .await;

    Ok(json!({"set": true}))
}

async fn mapping_list(core: &GatewayCore, principal: &Principal) -> Result<Value, McpError> {
    require(core, principal, Permission::UserView).await?;
    let mappings = core.store.mappings().list().await?;
    Ok(json!({ "mappings": mappings }))
}

async fn mapping_delete(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::UserManage).await?;
    let params: MappingDnParams = parse(params)?;

    core.store.mappings().delete(&params.dn).await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ConfigChanged)
                .user(&principal.user_id, &principal.email)
                .resource("ad_group_mapping", &params.dn)
                .action("mapping.delete"),
        )
        .await;

    Ok(json!({"deleted": params.dn}))
}

// === audit ===

#[derive(Deserialize)]
struct AuditQueryParams {
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    until: Option<DateTime<Utc>>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    100
}

async fn audit_query(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::AuditView).await?;
    let params: AuditQueryParams = match params {
        Some(value) => serde_json::from_value(value).map_err(|e| McpError::bad_request(e.to_string()))?,
        None => serde_json::from_value(json!({})).map_err(|e| McpError::bad_request(e.to_string()))?,
    };

    let events = core
        .store
        .audit()
        .query(&AuditQuery {
            since: params.since,
            until: params.until,
            kind: params.kind,
            severity: params.severity,
            user_id: params.user_id,
            user_email: params.user_email,
            limit: params.limit,
            offset: params.offset,
        })
        .await?;

    Ok(json!({ "events": events }))
}

async fn audit_statistics(core: &GatewayCore, principal: &Principal) -> Result<Value, McpError> {
    require(core, principal, Permission::AuditView).await?;
    let stats = core.store.audit().statistics().await?;
    Ok(serde_json::to_value(stats).map_err(McpError::from)?)
}

// === config ===

#[derive(Deserialize)]
struct ConfigGetParams {
    #[serde(default)]
    key: Option<String>,
}

#[derive(Deserialize)]
struct ConfigSetParams {
    key: String,
    value: Value,
}

async fn config_get(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ConfigView).await?;
    let params: ConfigGetParams = match params {
        Some(value) => serde_json::from_value(value).map_err(|e| McpError::bad_request(e.to_string()))?,
        None => ConfigGetParams { key: None },
    };

    match params.key {
        Some(key) => {
            let value = core
                .store
                .config()
                .get(&key)
                .await?
                .ok_or_else(|| McpError::not_found("config", &key))?;
            Ok(json!({ "key": key, "value": value }))
        }
        None => {
            let entries = core.store.config().all().await?;
            let map: serde_json::Map<String, Value> = entries.into_iter().collect();
            Ok(Value::Object(map))
        }
    }
}

async fn config_set(
    core: &GatewayCore,
    principal: &Principal,
    params: Option<Value>,
) -> Result<Value, McpError> {
    require(core, principal, Permission::ConfigEdit).await?;
    let params: ConfigSetParams = parse(params)?;

    core.store.config().set(&params.key, &params.value).await?;

    core.audit
        .record_durable(
            AuditEvent::new(AuditKind::ConfigChanged)
                .user(&principal.user_id, &principal.email)
                .resource("config", &params.key)
                .action("config.set")
                .details(json!({"key": params.key})),
        )
        .await;

    Ok(json!({"set": true}))
}

fn rpc_error(err: &McpError, id: Option<Value>) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_response(id))).into_response()
}
