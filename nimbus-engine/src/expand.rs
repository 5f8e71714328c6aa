//! Environment-style placeholder expansion
//!
//! Path, filter and run-name fields may reference pipeline variables as
//! `$VAR` or `${VAR}`. Unknown variables are left intact so the remote
//! side sees exactly what the caller wrote.

use std::collections::HashMap;

/// Expand `$VAR` / `${VAR}` references in `input` against `vars`.
pub fn expand(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some(&(_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                match vars.get(&name) {
                    Some(value) if closed => out.push_str(value),
                    _ if closed => {
                        out.push_str("${");
                        out.push_str(&name);
                        out.push('}');
                    }
                    // Unclosed brace: keep the raw remainder.
                    _ => {
                        out.push_str(&input[start..]);
                        break;
                    }
                }
            }
            Some(&(_, c)) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match vars.get(&name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('$');
                        out.push_str(&name);
                    }
                }
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Expand an optional field, preserving absence.
pub fn expand_opt(input: Option<&str>, vars: &HashMap<String, String>) -> Option<String> {
    input.map(|s| expand(s, vars))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("WORKSPACE".to_string(), "/builds/42".to_string()),
            ("BUILD_NUMBER".to_string(), "42".to_string()),
        ])
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(expand("app.apk", &vars()), "app.apk");
    }

    #[test]
    fn bare_reference() {
        assert_eq!(expand("$WORKSPACE/app.apk", &vars()), "/builds/42/app.apk");
    }

    #[test]
    fn braced_reference() {
        assert_eq!(expand("run-${BUILD_NUMBER}", &vars()), "run-42");
    }

    #[test]
    fn unknown_variable_kept() {
        assert_eq!(expand("$NOPE/app.apk", &vars()), "$NOPE/app.apk");
        assert_eq!(expand("${NOPE}", &vars()), "${NOPE}");
    }

    #[test]
    fn literal_dollar() {
        assert_eq!(expand("cost: $5", &vars()), "cost: $5");
        assert_eq!(expand("trailing $", &vars()), "trailing $");
    }

    #[test]
    fn unclosed_brace_kept() {
        assert_eq!(expand("${WORKSPACE", &vars()), "${WORKSPACE");
    }

    #[test]
    fn expand_opt_preserves_absence() {
        assert_eq!(expand_opt(None, &vars()), None);
        assert_eq!(
            expand_opt(Some("$BUILD_NUMBER"), &vars()),
            Some("42".to_string())
        );
    }
}
