//! Route template compilation.
//!
//! A template such as `/content-types/{typeId}/content/{id}` becomes an
//! anchored regular expression where each `{identifier}` captures one or more
//! characters other than `/` and everything else matches literally.

use regex::Regex;

use crate::dispatch::error::DispatchError;

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl PathMatcher {
    /// Compile a template.
    ///
    /// A `{` that does not open a well-formed `{identifier}` placeholder is
    /// taken literally.
    pub fn compile(template: &str) -> Result<Self, DispatchError> {
        let (pattern, param_names) = translate(template);
        let regex = Regex::new(&pattern).map_err(|e| DispatchError::InvalidTemplate {
            template: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            param_names,
        })
    }

    /// The template this matcher was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in left-to-right order. Informational only; matching
    /// is positional.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Match a concrete path, returning the captured segments in template order.
    pub fn matches(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn translate(template: &str) -> (String, Vec<String>) {
    let mut pattern = String::from("^");
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (literal, tail) = rest.split_at(open);
        pattern.push_str(&regex::escape(literal));

        let placeholder = tail[1..]
            .find('}')
            .map(|close| &tail[1..1 + close])
            .filter(|name| is_identifier(name));

        match placeholder {
            Some(name) => {
                pattern.push_str("([^/]+)");
                names.push(name.to_string());
                rest = &tail[name.len() + 2..];
            }
            None => {
                pattern.push_str(&regex::escape("{"));
                rest = &tail[1..];
            }
        }
    }

    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    (pattern, names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(template: &str, path: &str) -> Option<Vec<String>> {
        PathMatcher::compile(template).unwrap().matches(path)
    }

    #[test]
    fn test_extracts_params_in_template_order() {
        assert_eq!(
            params("/content-types/{typeId}/content/{id}", "/content-types/7/content/42"),
            Some(vec!["7".to_string(), "42".to_string()])
        );
    }

    #[test]
    fn test_literal_template() {
        assert_eq!(params("/settings", "/settings"), Some(vec![]));
        assert_eq!(params("/settings", "/settings/"), None);
        assert_eq!(params("/settings", "/api/settings"), None);
    }

    #[test]
    fn test_placeholder_must_be_non_empty() {
        assert_eq!(params("/products/{id}", "/products/"), None);
        assert_eq!(params("/products/{id}/edit", "/products//edit"), None);
    }

    #[test]
    fn test_placeholder_does_not_cross_slash() {
        assert_eq!(params("/products/{id}", "/products/1/2"), None);
    }

    #[test]
    fn test_anchored_at_both_ends() {
        assert_eq!(params("/a/{b}", "/x/a/1"), None);
        assert_eq!(params("/a/{b}", "/a/1/c"), None);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert_eq!(params("/files/{name}.json", "/files/report.json"), Some(vec!["report".to_string()]));
        assert_eq!(params("/files/{name}.json", "/files/reportXjson"), None);
        assert_eq!(params("/a+b/(c)", "/a+b/(c)"), Some(vec![]));
    }

    #[test]
    fn test_unclosed_brace_is_literal() {
        assert_eq!(params("/odd/{x", "/odd/{x"), Some(vec![]));
        assert_eq!(params("/odd/{not valid}", "/odd/{not valid}"), Some(vec![]));
    }

    #[test]
    fn test_duplicate_names_stay_positional() {
        let matcher = PathMatcher::compile("/{id}/{id}").unwrap();
        assert_eq!(matcher.param_names(), ["id", "id"]);
        assert_eq!(matcher.matches("/1/2"), Some(vec!["1".to_string(), "2".to_string()]));
    }
}
