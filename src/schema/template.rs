/// Authored text templates with `{slot}` references.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("template parse error in '{text}': {reason}")]
    Parse { text: String, reason: String },
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Reference to a variation slot: `{location}`.
    SlotRef(String),
}

/// A parsed template — a sequence of segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{slot_name}` → `SlotRef`
    /// - `{{` / `}}` → literal braces
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let error = |reason: &str| TemplateError::Parse {
            text: input.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(error("nested braces are not allowed"));
                        }
                        end += 1;
                    }
                    if end >= len {
                        return Err(error("unclosed brace"));
                    }
                    let name: String = chars[start..end].iter().collect();
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(error("empty braces"));
                    }
                    segments.push(TemplateSegment::SlotRef(name.to_string()));
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => return Err(error("unmatched closing brace")),
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Names of every slot this template references.
    pub fn slot_refs(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::SlotRef(name) => Some(name.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }

    /// Substitute resolved slot values. Unresolved refs are kept verbatim.
    pub fn render(&self, values: &BTreeMap<String, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::SlotRef(name) => match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("A storm rolls in.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("A storm rolls in.".to_string())]
        );
    }

    #[test]
    fn parse_slot_refs() {
        let t = Template::parse("You meet {ally} at {location}.").unwrap();
        assert_eq!(t.segments.len(), 5);
        assert_eq!(t.segments[1], TemplateSegment::SlotRef("ally".to_string()));
        let refs: Vec<&str> = t.slot_refs().collect();
        assert_eq!(refs, vec!["ally", "location"]);
    }

    #[test]
    fn parse_escaped_braces() {
        let t = Template::parse("Use {{braces}} here.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Use {braces} here.".to_string())]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Template::parse("Bad {} here").is_err());
        assert!(Template::parse("Bad {outer{inner}} here").is_err());
        assert!(Template::parse("Bad {unclosed here").is_err());
        assert!(Template::parse("Bad } here").is_err());
    }

    #[test]
    fn render_substitutes_values() {
        let t = Template::parse("{ally} waits in {location}.").unwrap();
        let values = BTreeMap::from([
            ("ally".to_string(), "Vera".to_string()),
            ("location".to_string(), "the conservatory".to_string()),
        ]);
        assert_eq!(t.render(&values), "Vera waits in the conservatory.");
    }

    #[test]
    fn render_keeps_unresolved_refs() {
        let t = Template::parse("Meet at {location}.").unwrap();
        assert_eq!(t.render(&BTreeMap::new()), "Meet at {location}.");
    }

    #[test]
    fn empty_template() {
        let t = Template::parse("").unwrap();
        assert!(t.is_empty());
        assert_eq!(t.render(&BTreeMap::new()), "");
    }
}
