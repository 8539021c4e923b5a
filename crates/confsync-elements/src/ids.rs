//! Element identifiers
//!
//! Path-like identifiers composed of adapter name, type name, an id kind and
//! an optional nested name path. The dot-joined full name is globally unique
//! within one model snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ElementError, ElementResult};

/// Separator between the parts of a full element name.
pub const NAMESPACE_SEPARATOR: &str = ".";

/// Reserved instance name for singleton settings instances.
pub const CONFIG_NAME: &str = "_config";

/// Escape character for name parts inside full names.
const ESCAPE: char = '@';

/// Escape `.` and `@` so a name part never contains the separator.
fn escape_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            ESCAPE => out.push_str("@@"),
            '.' => out.push_str("@v"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_part(part: &str) -> Option<String> {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next()? {
            ESCAPE => out.push(ESCAPE),
            'v' => out.push('.'),
            _ => return None,
        }
    }
    Some(out)
}

/// The kind of element an identifier points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    /// An object type.
    Type,
    /// An instance of an object type (or a value nested inside one).
    Instance,
    /// A field of an object type.
    Field,
    /// A top-level annotation of an object type.
    Annotation,
}

impl IdType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Type => "type",
            IdType::Instance => "instance",
            IdType::Field => "field",
            IdType::Annotation => "attr",
        }
    }

    /// Parse the id kind from its full-name marker.
    #[must_use]
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "instance" => Some(IdType::Instance),
            "field" => Some(IdType::Field),
            "attr" => Some(IdType::Annotation),
            _ => None,
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier of an element or of a value nested inside an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ElemId {
    adapter: String,
    type_name: String,
    id_type: IdType,
    name_parts: Vec<String>,
}

impl ElemId {
    /// Identifier of an object type.
    pub fn type_id(adapter: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Type,
            name_parts: Vec::new(),
        }
    }

    /// Identifier of a named instance of a type.
    pub fn instance_id(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Instance,
            name_parts: vec![name.into()],
        }
    }

    /// Identifier of a field of a type.
    pub fn field_id(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Field,
            name_parts: vec![field_name.into()],
        }
    }

    /// Identifier of the singleton settings instance of a type.
    pub fn config_instance_id(adapter: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::instance_id(adapter, type_name, CONFIG_NAME)
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    pub fn name_parts(&self) -> &[String] {
        &self.name_parts
    }

    /// The last name component, or the type name for a type id.
    pub fn name(&self) -> &str {
        self.name_parts
            .last()
            .map_or(self.type_name.as_str(), String::as_str)
    }

    /// Create an identifier nested below this one.
    ///
    /// Nesting below a type id addresses one of its annotations.
    #[must_use]
    pub fn create_nested_id<I, S>(&self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut nested = self.clone();
        if nested.id_type == IdType::Type {
            nested.id_type = IdType::Annotation;
        }
        nested.name_parts.extend(parts.into_iter().map(Into::into));
        nested
    }

    /// Whether the identifier points at a top-level element.
    pub fn is_top_level(&self) -> bool {
        match self.id_type {
            IdType::Type => true,
            IdType::Instance => self.name_parts.len() == 1,
            IdType::Field | IdType::Annotation => false,
        }
    }

    /// Whether the identifier points at a settings singleton.
    pub fn is_config(&self) -> bool {
        self.id_type == IdType::Instance
            && self.name_parts.first().is_some_and(|n| n == CONFIG_NAME)
    }

    /// Split into the enclosing top-level element id and the remaining path.
    pub fn create_top_level_parent_id(&self) -> (ElemId, Vec<String>) {
        match self.id_type {
            IdType::Instance => {
                let mut parts = self.name_parts.iter();
                let name = parts.next().cloned().unwrap_or_default();
                (
                    ElemId::instance_id(self.adapter.clone(), self.type_name.clone(), name),
                    parts.cloned().collect(),
                )
            }
            IdType::Type | IdType::Field | IdType::Annotation => (
                ElemId::type_id(self.adapter.clone(), self.type_name.clone()),
                self.name_parts.clone(),
            ),
        }
    }

    /// Whether `other` is strictly nested below this identifier.
    pub fn is_parent_of(&self, other: &ElemId) -> bool {
        let own = self.full_name_parts();
        let theirs = other.full_name_parts();
        theirs.len() > own.len() && theirs[..own.len()] == own[..]
    }

    /// Full name split into its components, unescaped.
    pub fn full_name_parts(&self) -> Vec<String> {
        let mut parts = vec![self.adapter.clone(), self.type_name.clone()];
        if self.id_type != IdType::Type {
            parts.push(self.id_type.as_str().to_string());
            parts.extend(self.name_parts.iter().cloned());
        }
        parts
    }

    /// Dot-joined full name.
    ///
    /// Name parts are escaped: `.` is written `@v` and `@` is written `@@`.
    pub fn full_name(&self) -> String {
        self.full_name_parts()
            .iter()
            .map(|part| escape_part(part))
            .collect::<Vec<_>>()
            .join(NAMESPACE_SEPARATOR)
    }

    /// Parse a dot-joined full name.
    pub fn parse(full_name: &str) -> ElementResult<Self> {
        let invalid = || ElementError::InvalidElemId {
            id: full_name.to_string(),
        };
        let parts: Vec<&str> = full_name.split(NAMESPACE_SEPARATOR).collect();
        match parts.as_slice() {
            [adapter, type_name] if !adapter.is_empty() && !type_name.is_empty() => {
                Ok(Self::type_id(
                    unescape_part(adapter).ok_or_else(invalid)?,
                    unescape_part(type_name).ok_or_else(invalid)?,
                ))
            }
            [adapter, type_name, kind, rest @ ..] if !rest.is_empty() => {
                let id_type = IdType::parse_str(kind).ok_or_else(invalid)?;
                let name_parts = rest
                    .iter()
                    .map(|part| unescape_part(part))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(invalid)?;
                Ok(Self {
                    adapter: unescape_part(adapter).ok_or_else(invalid)?,
                    type_name: unescape_part(type_name).ok_or_else(invalid)?,
                    id_type,
                    name_parts,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ElemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

impl FromStr for ElemId {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ElemId> for String {
    fn from(id: ElemId) -> Self {
        id.full_name()
    }
}

impl TryFrom<String> for ElemId {
    type Error = ElementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Anything that carries an element identifier.
pub trait Identified {
    fn elem_id(&self) -> &ElemId;
}

impl Identified for ElemId {
    fn elem_id(&self) -> &ElemId {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_names() {
        assert_eq!(ElemId::type_id("zendesk", "group").full_name(), "zendesk.group");
        assert_eq!(
            ElemId::instance_id("zendesk", "group", "support").full_name(),
            "zendesk.group.instance.support"
        );
        assert_eq!(
            ElemId::field_id("zendesk", "group", "name").full_name(),
            "zendesk.group.field.name"
        );
        assert_eq!(
            ElemId::type_id("zendesk", "group")
                .create_nested_id(["_parent"])
                .full_name(),
            "zendesk.group.attr._parent"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        for name in [
            "zendesk.group",
            "zendesk.group.instance.support",
            "zendesk.section.instance.s1.articles.0",
            "okta.Group.field.users",
        ] {
            let id = ElemId::parse(name).unwrap();
            assert_eq!(id.full_name(), name);
        }
        assert!(ElemId::parse("zendesk").is_err());
        assert!(ElemId::parse("zendesk.group.unknown.x").is_err());
        assert!(ElemId::parse("zendesk.group.instance").is_err());
    }

    #[test]
    fn test_top_level_parent() {
        let nested =
            ElemId::instance_id("zendesk", "section", "s1").create_nested_id(["articles", "2"]);
        assert!(!nested.is_top_level());
        let (parent, path) = nested.create_top_level_parent_id();
        assert_eq!(parent, ElemId::instance_id("zendesk", "section", "s1"));
        assert!(parent.is_top_level());
        assert_eq!(path, vec!["articles".to_string(), "2".to_string()]);
        assert!(parent.is_parent_of(&nested));
        assert!(!nested.is_parent_of(&parent));
    }

    #[test]
    fn test_name_and_config() {
        let id = ElemId::config_instance_id("zendesk", "account_settings");
        assert!(id.is_config());
        assert_eq!(id.name(), CONFIG_NAME);
        assert_eq!(ElemId::type_id("zendesk", "brand").name(), "brand");
    }

    #[test]
    fn test_names_with_separator_stay_top_level() {
        let id = ElemId::instance_id("zendesk", "macro", "v1.2");
        assert!(id.is_top_level());
        assert_eq!(id.full_name(), "zendesk.macro.instance.v1@v2");

        let back = ElemId::parse(&id.full_name()).unwrap();
        assert_eq!(back, id);
        assert!(back.is_top_level());
        assert_eq!(back.name_parts(), ["v1.2".to_string()]);

        let email = ElemId::instance_id("zendesk", "user", "agent@acme.com");
        assert_eq!(email.full_name(), "zendesk.user.instance.agent@@acme@vcom");
        assert_eq!(ElemId::parse(&email.full_name()).unwrap(), email);

        let literal = ElemId::instance_id("zendesk", "macro", "a@v");
        assert_eq!(ElemId::parse(&literal.full_name()).unwrap(), literal);

        assert!(ElemId::parse("zendesk.macro.instance.bad@x").is_err());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<ElemId>(&json).unwrap(), id);
    }

    #[test]
    fn test_serde_as_string() {
        let id = ElemId::instance_id("zendesk", "group", "support");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"zendesk.group.instance.support\"");
        let back: ElemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
