use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{RegistryError, ToolError};

/// Handler for a fixed URI.
pub type FixedHandler = Arc<dyn Fn() -> Result<String, ToolError> + Send + Sync>;

/// Handler for a URI template; receives the placeholder value.
pub type TemplateHandler = Arc<dyn Fn(&str) -> Result<String, ToolError> + Send + Sync>;

/// How a resource URI is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriPattern {
    Fixed(String),
    /// `prefix{variable}suffix`
    Template {
        prefix: String,
        variable: String,
        suffix: String,
    },
}

impl UriPattern {
    /// Parse a URI or a URI template with exactly one `{variable}`.
    pub fn parse(pattern: &str) -> Result<Self, RegistryError> {
        let invalid = || RegistryError::InvalidPattern(pattern.to_string());

        let Some(open) = pattern.find('{') else {
            if pattern.contains('}') {
                return Err(invalid());
            }
            return Ok(UriPattern::Fixed(pattern.to_string()));
        };
        let close = pattern[open..].find('}').map(|i| open + i).ok_or_else(invalid)?;

        let variable = &pattern[open + 1..close];
        let suffix = &pattern[close + 1..];
        if variable.is_empty() || suffix.contains(['{', '}']) || pattern[..open].contains('}') {
            return Err(invalid());
        }

        Ok(UriPattern::Template {
            prefix: pattern[..open].to_string(),
            variable: variable.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Placeholder value carried by `uri`, by prefix/suffix stripping.
    pub fn extract<'a>(&self, uri: &'a str) -> Option<&'a str> {
        match self {
            UriPattern::Fixed(_) => None,
            UriPattern::Template { prefix, suffix, .. } => uri
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                .filter(|value| !value.is_empty()),
        }
    }
}

impl fmt::Display for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriPattern::Fixed(uri) => f.write_str(uri),
            UriPattern::Template {
                prefix,
                variable,
                suffix,
            } => write!(f, "{prefix}{{{variable}}}{suffix}"),
        }
    }
}

#[derive(Clone)]
enum ResourceHandler {
    Fixed(FixedHandler),
    Template(TemplateHandler),
}

/// A URI-addressed, read-only data source.
#[derive(Clone)]
pub struct Resource {
    pattern: UriPattern,
    name: String,
    description: String,
    handler: ResourceHandler,
}

impl Resource {
    /// A resource served at exactly `uri`.
    pub fn fixed<F>(
        uri: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn() -> Result<String, ToolError> + Send + Sync + 'static,
    {
        match UriPattern::parse(uri)? {
            pattern @ UriPattern::Fixed(_) => Ok(Self {
                pattern,
                name: name.into(),
                description: description.into(),
                handler: ResourceHandler::Fixed(Arc::new(handler)),
            }),
            UriPattern::Template { .. } => Err(RegistryError::InvalidPattern(uri.to_string())),
        }
    }

    /// A resource served for every URI matching `template`.
    pub fn template<F>(
        template: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        match UriPattern::parse(template)? {
            pattern @ UriPattern::Template { .. } => Ok(Self {
                pattern,
                name: name.into(),
                description: description.into(),
                handler: ResourceHandler::Template(Arc::new(handler)),
            }),
            UriPattern::Fixed(_) => Err(RegistryError::InvalidPattern(template.to_string())),
        }
    }

    pub fn pattern(&self) -> &UriPattern {
        &self.pattern
    }

    pub fn is_template(&self) -> bool {
        matches!(self.pattern, UriPattern::Template { .. })
    }

    /// Whether this resource serves `uri`.
    pub fn matches(&self, uri: &str) -> bool {
        match &self.pattern {
            UriPattern::Fixed(fixed) => fixed == uri,
            template => template.extract(uri).is_some(),
        }
    }

    /// Produce the resource text for `uri`. Callers check [`Resource::matches`] first.
    pub fn read(&self, uri: &str) -> Result<String, ToolError> {
        match &self.handler {
            ResourceHandler::Fixed(handler) => handler(),
            ResourceHandler::Template(handler) => {
                let value = self.pattern.extract(uri).unwrap_or_default();
                handler(value)
            }
        }
    }

    /// Entry for `resources/list` or `resources/templates/list`.
    pub fn descriptor(&self) -> Value {
        let key = if self.is_template() { "uriTemplate" } else { "uri" };
        let mut entry = serde_json::Map::new();
        entry.insert(key.to_string(), Value::String(self.pattern.to_string()));
        entry.insert("name".to_string(), Value::String(self.name.clone()));
        entry.insert("description".to_string(), Value::String(self.description.clone()));
        entry.insert("mimeType".to_string(), Value::String("text/plain".to_string()));
        Value::Object(entry)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
