//! Text templating used by the Mail unit and by `@name` placeholders.
//!
//! The bundled renderer understands a small Velocity-flavoured reference
//! syntax: `$name`, `$name.path`, `${name.path}` and the quiet forms
//! `$!name` / `$!{name}`. A reference that resolves to nothing renders
//! literally unless it is quiet, in which case it renders empty.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::Context;
use crate::errors::TemplateError;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("valid placeholder regex"));

/// Replaces every `@identifier` in `text` with the context value of the same
/// name. Missing names expand to the empty string.
///
/// An `@` directly after a letter or digit is literal, so email addresses
/// survive expansion. Placeholders may follow each other directly.
#[must_use]
pub fn expand_placeholders(text: &str, context: &Context) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let follows_placeholder = last > 0 && whole.start() == last;
        let literal = !follows_placeholder
            && text[..whole.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric());
        if literal {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push_str(&context.get_string(name.as_str()));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Renders a template against a context.
pub trait TemplateRenderer: Send + Sync + std::fmt::Debug {
    /// Renders `template` with references resolved from `context`.
    fn render(&self, template: &str, context: &Context) -> Result<String, TemplateError>;
}

/// The bundled reference-substitution renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct VelocityRenderer;

impl VelocityRenderer {
    /// Creates a new renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Reads a dotted reference starting at `start`, returning its end offset.
fn scan_path(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && is_ident_char(chars[end]) {
        end += 1;
    }
    while end + 1 < chars.len() && chars[end] == '.' && is_ident_char(chars[end + 1]) {
        end += 1;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
    }
    end
}

impl TemplateRenderer for VelocityRenderer {
    fn render(&self, template: &str, context: &Context) -> Result<String, TemplateError> {
        let chars: Vec<char> = template.chars().collect();
        let mut out = String::with_capacity(template.len());
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '$' {
                out.push(chars[i]);
                i += 1;
                continue;
            }

            let ref_start = i;
            let mut j = i + 1;
            let quiet = chars.get(j) == Some(&'!');
            if quiet {
                j += 1;
            }

            let (path, end) = if chars.get(j) == Some(&'{') {
                let close = chars[j + 1..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|offset| j + 1 + offset)
                    .ok_or_else(|| {
                        TemplateError(format!("unterminated reference at offset {ref_start}"))
                    })?;
                let path: String = chars[j + 1..close].iter().collect();
                (path.trim().to_string(), close + 1)
            } else if chars.get(j).copied().is_some_and(is_ident_start) {
                let end = scan_path(&chars, j);
                (chars[j..end].iter().collect(), end)
            } else {
                out.push('$');
                i += 1;
                continue;
            };

            match context.get_path(&path) {
                Some(value) if !value.is_null() => out.push_str(&value.to_string()),
                _ if quiet => {}
                _ => out.extend(&chars[ref_start..end]),
            }
            i = end;
        }

        Ok(out)
    }
}
