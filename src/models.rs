//! Model-allowlist policy
//!
//! `custom_models` is a comma-separated rule list evaluated left to right
//! with last match winning:
//!
//! - `-all` / `+all` block or allow every model
//! - `-name` / `+name` block or allow a model by name
//! - `name@provider` scopes a rule to one provider (case-insensitive)
//!
//! Unmatched models stay allowed, so an empty rule list blocks nothing.

/// Returns true when the named model is explicitly disallowed for the
/// provider under the given rules. An absent model name is never blocked.
pub fn is_model_blocked(custom_models: &str, model: Option<&str>, provider: &str) -> bool {
    let Some(model) = model else {
        return false;
    };
    if custom_models.is_empty() {
        return false;
    }

    let mut blocked = false;

    for rule in custom_models.split(',').map(str::trim) {
        if rule.is_empty() {
            continue;
        }

        let (is_block, target) = match rule.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, rule.strip_prefix('+').unwrap_or(rule)),
        };

        let (name, scope) = match target.split_once('@') {
            Some((name, scope)) => (name, Some(scope)),
            None => (target, None),
        };

        if let Some(scope) = scope {
            if !scope.eq_ignore_ascii_case(provider) {
                continue;
            }
        }

        if name == "all" || name.eq_ignore_ascii_case(model) {
            blocked = is_block;
        }
    }

    blocked
}
