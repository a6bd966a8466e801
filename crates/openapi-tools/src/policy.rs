//! Role-based operation filtering.
//!
//! A role is an ordered list of allow rules over (method set, path pattern).
//! Patterns support `*` (any run of characters) and `?` (exactly one).
//! Operations matching no rule are not exposed at all; they never reach the
//! synthesizer or the dispatcher.

use crate::config::{RoleConfig, RuleAccess};
use crate::error::{BridgeError, Result};
use crate::spec::{Method, OperationDescriptor};

#[derive(Debug, Clone)]
pub struct AllowRule {
    /// `None` covers every method.
    methods: Option<Vec<Method>>,
    pattern: String,
    access: RuleAccess,
}

impl AllowRule {
    fn matches(&self, op: &OperationDescriptor) -> bool {
        if self.access == RuleAccess::ReadOnly && op.method.is_mutating() {
            return false;
        }
        if let Some(methods) = &self.methods
            && !methods.contains(&op.method)
        {
            return false;
        }
        glob_match(&self.pattern, &op.path)
    }

    /// Length of the pattern up to the first wildcard. More literal context
    /// means a more specific rule.
    fn literal_prefix_len(&self) -> usize {
        self.pattern
            .find(['*', '?'])
            .unwrap_or(self.pattern.len())
    }
}

/// Immutable for the process lifetime; changing roles means restarting.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    name: String,
    rules: Vec<AllowRule>,
}

impl RolePolicy {
    /// Look up `role_name` in the configured roles. The only built-in role is
    /// `all`, a single catch-all. Anything else unconfigured is fatal.
    pub fn resolve(roles: &[RoleConfig], role_name: &str) -> Result<Self> {
        if let Some(role) = roles.iter().find(|r| r.name == role_name) {
            let mut rules = Vec::with_capacity(role.rules.len());
            for rule in &role.rules {
                let methods = if rule.methods.is_empty() {
                    None
                } else {
                    Some(
                        rule.methods
                            .iter()
                            .map(|m| Method::parse(m))
                            .collect::<Result<Vec<_>>>()?,
                    )
                };
                rules.push(AllowRule {
                    methods,
                    pattern: rule.path.clone(),
                    access: rule.access,
                });
            }
            return Ok(Self {
                name: role_name.to_string(),
                rules,
            });
        }

        if role_name == "all" {
            tracing::warn!(
                "role 'all' selected: every operation in the document will be exposed, \
                 the role safety boundary is off"
            );
            return Ok(Self {
                name: "all".to_string(),
                rules: vec![AllowRule {
                    methods: None,
                    pattern: "*".to_string(),
                    access: RuleAccess::ReadWrite,
                }],
            });
        }

        Err(BridgeError::UnknownRole(role_name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered subset of `operations` this role exposes.
    pub fn filter(&self, operations: &[OperationDescriptor]) -> Vec<OperationDescriptor> {
        operations
            .iter()
            .filter(|op| self.matching_rule(op).is_some())
            .cloned()
            .collect()
    }

    /// The winning rule is the matching one with the longest literal prefix
    /// before any wildcard; declaration order breaks ties.
    fn matching_rule(&self, op: &OperationDescriptor) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, rule) in self.rules.iter().enumerate() {
            if !rule.matches(op) {
                continue;
            }
            let prefix = rule.literal_prefix_len();
            if best.is_none_or(|(best_prefix, _)| prefix > best_prefix) {
                best = Some((prefix, idx));
            }
        }
        best.map(|(_, idx)| idx)
    }
}

/// Glob matcher over path strings. `*` matches any run (including empty),
/// `?` exactly one character. Case-sensitive, byte-wise.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<u8> = pattern.bytes().collect();
    let t: Vec<u8> = text.bytes().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == b'?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowRuleConfig;
    use crate::spec::ParamLocation;

    fn op(method: Method, path: &str) -> OperationDescriptor {
        OperationDescriptor {
            method,
            path: path.to_string(),
            operation_id: None,
            description: format!("Calls {method} {path}"),
            parameters: vec![crate::spec::ParameterDescriptor {
                name: "id".into(),
                location: ParamLocation::Query,
                required: false,
                nullable: false,
                sensitive: false,
                schema: serde_json::json!({"type": "string"}),
            }],
            response_schema: None,
        }
    }

    fn role(name: &str, rules: Vec<AllowRuleConfig>) -> RoleConfig {
        RoleConfig {
            name: name.to_string(),
            rules,
        }
    }

    fn rule(methods: &[&str], path: &str, access: RuleAccess) -> AllowRuleConfig {
        AllowRuleConfig {
            methods: methods.iter().map(|m| (*m).to_string()).collect(),
            path: path.to_string(),
            access,
        }
    }

    #[test]
    fn glob_basics() {
        assert!(glob_match("/devices/*", "/devices/123"));
        assert!(glob_match("/devices/*", "/devices/"));
        assert!(glob_match("*", "/anything/at/all"));
        assert!(glob_match("/devices/?", "/devices/a"));
        assert!(!glob_match("/devices/?", "/devices/ab"));
        assert!(!glob_match("/devices/*", "/interfaces/123"));
        assert!(glob_match("/orgs/*/networks/*", "/orgs/1/networks/n2"));
    }

    #[test]
    fn filter_is_an_ordered_subset() {
        let roles = [role(
            "noc",
            vec![rule(&["GET"], "/devices/*", RuleAccess::ReadWrite)],
        )];
        let policy = RolePolicy::resolve(&roles, "noc").expect("resolve");
        let ops = vec![
            op(Method::Get, "/devices/a"),
            op(Method::Post, "/devices/a"),
            op(Method::Get, "/interfaces/x"),
            op(Method::Get, "/devices/b"),
        ];
        let kept = policy.filter(&ops);
        let kept: Vec<_> = kept.iter().map(|o| (o.method, o.path.as_str())).collect();
        assert_eq!(
            kept,
            vec![(Method::Get, "/devices/a"), (Method::Get, "/devices/b")]
        );
    }

    #[test]
    fn read_only_rule_never_matches_mutating_verbs() {
        let roles = [role("audit", vec![rule(&[], "*", RuleAccess::ReadOnly)])];
        let policy = RolePolicy::resolve(&roles, "audit").expect("resolve");
        let ops = vec![
            op(Method::Get, "/config"),
            op(Method::Put, "/config"),
            op(Method::Delete, "/config"),
        ];
        let kept = policy.filter(&ops);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].method, Method::Get);
    }

    #[test]
    fn longest_literal_prefix_wins_regardless_of_declaration_order() {
        // Catch-all declared first must not shadow the specific rule.
        let roles = [role(
            "ops",
            vec![
                rule(&[], "*", RuleAccess::ReadOnly),
                rule(&["POST"], "/devices/*/reboot", RuleAccess::ReadWrite),
            ],
        )];
        let policy = RolePolicy::resolve(&roles, "ops").expect("resolve");
        let ops = vec![
            op(Method::Post, "/devices/sw1/reboot"),
            op(Method::Post, "/devices/sw1/rename"),
        ];
        let kept = policy.filter(&ops);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, "/devices/sw1/reboot");
    }

    #[test]
    fn unknown_role_is_fatal() {
        let err = RolePolicy::resolve(&[], "netops").unwrap_err();
        assert!(matches!(err, BridgeError::UnknownRole(name) if name == "netops"));
    }

    #[test]
    fn builtin_all_exposes_everything() {
        let policy = RolePolicy::resolve(&[], "all").expect("resolve");
        let ops = vec![
            op(Method::Get, "/a"),
            op(Method::Put, "/b"),
            op(Method::Delete, "/c/d"),
        ];
        assert_eq!(policy.filter(&ops).len(), 3);
    }

    #[test]
    fn configured_role_shadows_builtin_all() {
        let roles = [role("all", vec![])];
        let policy = RolePolicy::resolve(&roles, "all").expect("resolve");
        assert!(policy.filter(&[op(Method::Get, "/a")]).is_empty());
    }

    #[test]
    fn empty_rule_list_yields_zero_tools() {
        let roles = [role("lurker", vec![])];
        let policy = RolePolicy::resolve(&roles, "lurker").expect("resolve");
        let ops = vec![op(Method::Get, "/devices/a")];
        assert!(policy.filter(&ops).is_empty());
    }

    #[test]
    fn invalid_method_in_rule_is_a_config_error() {
        let roles = [role("x", vec![rule(&["FETCH"], "*", RuleAccess::ReadWrite)])];
        let err = RolePolicy::resolve(&roles, "x").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
