// ─── Variable Substitution ───
// Expands `${VAR}` and bare `$VAR` placeholders from an environment map.
//
// A placeholder is only spliced when the environment yields a non-empty
// value; unknown or empty variables stay literal. Replaced text is not
// rescanned, so values containing `$` pass through untouched.

use std::collections::HashMap;

pub fn expand_variables(input: &str, env: &HashMap<String, String>) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        // brace form: ${NAME}
        if chars.get(i + 1) == Some(&'{') {
            match chars[i + 2..].iter().position(|&c| c == '}') {
                Some(offset) => {
                    let close = i + 2 + offset;
                    let name: String = chars[i + 2..close].iter().collect();
                    match env.get(&name).filter(|v| !v.is_empty()) {
                        Some(value) => out.push_str(value),
                        None => out.extend(&chars[i..=close]),
                    }
                    i = close + 1;
                }
                None => {
                    // unterminated brace: everything stays literal
                    out.extend(&chars[i..]);
                    i = chars.len();
                }
            }
            continue;
        }

        // bare form: $NAME
        let mut end = i + 1;
        while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        if end == i + 1 {
            // a lone '$'
            out.push('$');
            i += 1;
            continue;
        }
        let name: String = chars[i + 1..end].iter().collect();
        match env.get(&name).filter(|v| !v.is_empty()) {
            Some(value) => out.push_str(value),
            None => out.extend(&chars[i..end]),
        }
        i = end;
    }
    out
}
