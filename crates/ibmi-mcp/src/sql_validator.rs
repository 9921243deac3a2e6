//! C2 (thin wrapper): adapts a tool's declared [`ToolSecurity`] into the
//! shared SQL policy engine in `ibmi_core::sql`. The algorithm itself lives
//! in `ibmi-core` so both this crate and `ibmi-gateway` (C4) can call it
//! without a dependency cycle — see `DESIGN.md`.

use ibmi_core::config::model::ToolSecurity;
use ibmi_core::sql::{check_policy, SecurityPolicy, SqlPolicyError};

/// Build the [`SecurityPolicy`] a tool's declared security block implies.
/// `security` is an optional *override* of the default policy, not an
/// opt-out: a tool whose YAML omits `security:` entirely still gets the
/// default (read-only) policy, same as `ToolSecurity::default()` would
/// produce if it had been declared explicitly.
pub fn policy_for(security: Option<&ToolSecurity>) -> SecurityPolicy {
    let defaulted;
    let s = match security {
        Some(s) => s,
        None => {
            defaulted = ToolSecurity::default();
            &defaulted
        }
    };
    SecurityPolicy {
        read_only: s.read_only.unwrap_or(true),
        max_query_length: s.max_sql_length.unwrap_or(10_000),
        forbidden_keywords: s.forbidden_keywords.clone(),
    }
}

/// Validate `sql` against a tool's declared security block, or the default
/// (read-only) policy when the tool declares none.
pub fn validate(sql: &str, security: Option<&ToolSecurity>) -> Result<(), SqlPolicyError> {
    check_policy(sql, &policy_for(security))
}
