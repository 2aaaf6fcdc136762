/// Replace `${ENV_VAR}` and `${ENV_VAR:-fallback}` placeholders in config text.
///
/// Unresolvable variables without a fallback are left as-is, so a path like
/// `${HOME}/ext` stays visibly broken instead of silently turning into `/ext`.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Placeholder expansion against an arbitrary lookup, testable without
/// touching the process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the remainder verbatim.
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => result.push_str(&value),
            (false, None, Some(fallback)) => result.push_str(fallback),
            _ => {
                result.push_str("${");
                result.push_str(body);
                result.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "RIBBON_EXT_ROOT" => Some("/srv/ext".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("root=${RIBBON_EXT_ROOT}/tools", lookup),
            "root=/srv/ext/tools"
        );
    }

    #[test]
    fn falls_back_when_unset() {
        assert_eq!(
            substitute_env_with("${RIBBON_MISSING:-/opt/ext}", lookup),
            "/opt/ext"
        );
        assert_eq!(
            substitute_env_with("${RIBBON_EXT_ROOT:-/opt/ext}", lookup),
            "/srv/ext"
        );
    }

    #[test]
    fn leaves_unknown_var_and_unterminated_text() {
        assert_eq!(
            substitute_env_with("${RIBBON_MISSING}", lookup),
            "${RIBBON_MISSING}"
        );
        assert_eq!(substitute_env_with("a ${oops", lookup), "a ${oops");
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
