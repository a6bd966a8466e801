use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for one OpenAPI-backed bridge.
///
/// All fields use camelCase on the wire. Credentials are expected to arrive
/// via environment interpolation in the config file; they are never taken
/// from tool arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiBridgeConfig {
    /// Path (or label) of the OpenAPI document. Used for error locations.
    pub spec: String,
    /// Backend base URL. Falls back to the document's first `servers` entry.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Active role for this process.
    pub role: String,
    /// Role definitions. The role `all` is built in and exposes everything.
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub defaults: EndpointDefaults,
    /// Parameter names whose values must never be logged.
    #[serde(default)]
    pub sensitive_params: Vec<String>,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<AllowRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AllowRuleConfig {
    /// HTTP methods this rule covers. Empty means every method.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Path pattern with `*` (any run) and `?` (single char) wildcards.
    pub path: String,
    #[serde(default)]
    pub access: RuleAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAccess {
    /// Rule only ever matches non-mutating operations.
    ReadOnly,
    #[default]
    ReadWrite,
}

/// How outbound requests authenticate against the backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    Header {
        name: String,
        value: String,
    },
    Query {
        name: String,
        value: String,
    },
    /// Login once, reuse the returned token as a header until it expires.
    Session(SessionAuthConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionAuthConfig {
    /// Login endpoint, relative to the base URL. Called with Basic auth.
    pub login_path: String,
    pub username: String,
    pub password: String,
    /// Field of the login response body holding the token.
    #[serde(default = "default_token_field")]
    pub token_field: String,
    /// Header the token is replayed under on every request.
    #[serde(default = "default_token_header")]
    pub token_header: String,
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_token_field() -> String {
    "Token".to_string()
}

fn default_token_header() -> String {
    "X-Auth-Token".to_string()
}

fn default_token_ttl_secs() -> u64 {
    3000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointDefaults {
    /// Per-request timeout in seconds. `0` disables the timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Extra headers applied to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaginationConfig {
    /// Follow `next` links in `{results, next}` response bodies (GET only).
    #[serde(default)]
    pub follow_next: bool,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            follow_next: false,
            max_pages: default_max_pages(),
        }
    }
}

fn default_max_pages() -> usize {
    10
}
