//! Prompt templates and response parsing.

/// Prompt asking for a revision that kills a surviving mutant.
pub fn tighten_prompt(code: &str, test: &str, mutant: &str) -> String {
    format!(
        r#"You are provided with the following block of Rust code, which is assumed to be the ground truth, a property-based test written with the proptest crate, and a mutant of the code. The mutant was not killed by the property-based test during mutation testing. Analyze why the property-based test failed to kill the mutant and improve the test so that the mutant is killed.

Ground-truth code:
```rust
{code}
```

Property-based test:
```rust
{test}
```

Mutant code:
```rust
{mutant}
```

First, explain why the mutant was not killed by the property-based test. Then, improve the property-based test so that it detects the mutant. Keep the test's name and attributes unchanged and return only the test function. Format your response as such:

(Explanation of why the mutant was not killed)

```rust
(your code)
```
"#
    )
}

/// Prompt asking for a revision that lets a killed mutant pass.
pub fn generalize_prompt(code: &str, test: &str, mutant: &str) -> String {
    format!(
        r#"You are provided with the following block of Rust code, which is assumed to be the ground truth, a property-based test written with the proptest crate, and a mutant of the code. The mutant was killed by the property-based test during mutation testing. Analyze why the property-based test killed the mutant and change the test so that the mutant is no longer killed.

Ground-truth code:
```rust
{code}
```

Property-based test:
```rust
{test}
```

Mutant code:
```rust
{mutant}
```

First, explain why the mutant was killed by the property-based test. Then, change the property-based test so that it passes on the mutant. Keep the test's name and attributes unchanged and return only the test function. Format your response as such:

(Explanation of why the mutant was killed)

```rust
(your code)
```
"#
    )
}

/// The first fenced block tagged `rust` (or untagged) in `text`.
///
/// Fences count only at the start of a line; backticks inside prose are skipped.
pub fn extract_code_block(text: &str) -> Option<String> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(tag) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        let tag = tag.trim();
        if tag.contains(|c: char| c.is_whitespace() || c == '`') {
            continue;
        }

        let mut body = Vec::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if line.trim_start().starts_with("```") {
                closed = true;
                break;
            }
            body.push(line);
        }
        if !closed {
            return None;
        }

        if tag.is_empty() || tag == "rust" || tag == "rs" {
            let code = body.join("\n");
            let code = code.trim();
            if !code.is_empty() {
                return Some(code.to_string());
            }
        }
    }
    None
}
