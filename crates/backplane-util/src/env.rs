//! Client-side `${VAR}` expansion for setup scripts.
//!
//! Setup scripts are expanded locally before being sent to a sandbox, so
//! secrets only ever cross the wire already resolved. Unknown variables
//! are left untouched rather than replaced with an empty string, which
//! keeps literal `${...}` text in scripts intact.

/// Expand `${VAR}` references using the process environment.
pub fn expand_env(input: &str) -> String {
    expand_env_with(input, |name| std::env::var(name).ok())
}

/// Expand `${VAR}` references using the given lookup function.
pub fn expand_env_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference, keep the literal text.
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/dev".to_string()),
            "TOKEN" => Some("s3cret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_known_vars() {
        assert_eq!(
            expand_env_with("cd ${HOME} && auth ${TOKEN}", lookup),
            "cd /home/dev && auth s3cret"
        );
    }

    #[test]
    fn test_unknown_vars_left_untouched() {
        assert_eq!(expand_env_with("echo ${MISSING}", lookup), "echo ${MISSING}");
    }

    #[test]
    fn test_unterminated_reference() {
        assert_eq!(expand_env_with("echo ${HOME", lookup), "echo ${HOME");
    }

    #[test]
    fn test_no_references() {
        assert_eq!(expand_env_with("plain text", lookup), "plain text");
    }
}
