//! Locale fields to language settings references.
//!
//! Help center articles, sections and categories carry a raw `locale` (and
//! `source_locale`) string. The matching language settings instance is only
//! unique per brand, so lookup goes through a `(brand, locale)` key.

use async_trait::async_trait;
use tracing::debug;

use confsync_elements::element::{Element, InstanceElement};
use confsync_elements::resolver::{LookupTable, ReferenceResolver, Resolution};
use confsync_elements::value::Value;

use crate::config::LocaleRule;
use crate::error::AdapterResult;
use crate::filter::{Filter, FilterContext, FilterPhase};
use crate::filters::instances_of;

const LOCALE_FIELD: &str = "locale";
const SOURCE_LOCALE_FIELD: &str = "source_locale";

/// Key component of a brand or locale value. A brand already turned into a
/// reference keys by its target id.
fn key_part(value: &Value) -> Option<String> {
    match value {
        Value::Reference(reference) => reference
            .target_id()
            .and_then(Value::to_key_string)
            .or_else(|| Some(reference.elem_id.full_name())),
        other => other.to_key_string(),
    }
}

fn locale_key(brand: &Value, locale: &Value) -> Option<String> {
    Some(format!("{}/{}", key_part(brand)?, key_part(locale)?))
}

pub struct LocaleFilter {
    adapter: String,
    rules: Vec<LocaleRule>,
    guide_enabled: bool,
}

impl LocaleFilter {
    pub fn new(ctx: &FilterContext) -> Self {
        Self {
            adapter: ctx.adapter().to_string(),
            rules: ctx.config.filters.locales.clone(),
            guide_enabled: ctx.config.fetch.guide_enabled,
        }
    }

    fn resolve_field(
        resolver: &ReferenceResolver,
        rule: &LocaleRule,
        inst: &mut InstanceElement,
        field: &str,
    ) -> bool {
        let Some(brand) = inst.get(&rule.brand_field).cloned() else {
            return false;
        };
        let Some(key) = inst.get(field).and_then(|locale| locale_key(&brand, locale)) else {
            return false;
        };
        match resolver.resolve(&key, &rule.settings_type) {
            Resolution::Reference(reference) => {
                inst.value.insert(field.to_string(), Value::Reference(reference));
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Filter for LocaleFilter {
    fn name(&self) -> &str {
        "locale"
    }

    fn phases(&self) -> &'static [FilterPhase] {
        &[FilterPhase::OnFetch]
    }

    async fn on_fetch(&mut self, elements: &mut Vec<Element>) -> AdapterResult<()> {
        if !self.guide_enabled {
            return Ok(());
        }
        for rule in &self.rules {
            let table = LookupTable::from_instances_by(
                format!("{}_by_brand_locale", rule.settings_type),
                instances_of(elements, &rule.settings_type),
                |settings| {
                    locale_key(settings.get(&rule.brand_field)?, settings.get(LOCALE_FIELD)?)
                },
            );
            if table.is_empty() {
                continue;
            }
            // Unmatched locales stay raw strings.
            let resolver = ReferenceResolver::new(self.adapter.as_str(), false).with_table(table);

            let mut resolved = 0usize;
            for inst in elements
                .iter_mut()
                .filter_map(Element::as_instance_mut)
                .filter(|inst| rule.locale_types.iter().any(|t| t == inst.type_name()))
            {
                if Self::resolve_field(&resolver, rule, inst, LOCALE_FIELD) {
                    resolved += 1;
                }
                if rule.source_locale_types.iter().any(|t| t == inst.type_name())
                    && Self::resolve_field(&resolver, rule, inst, SOURCE_LOCALE_FIELD)
                {
                    resolved += 1;
                }
            }
            debug!(settings_type = %rule.settings_type, resolved, "Resolved locales");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiClient, ApiResponse, HttpError, HttpMethod};
    use crate::config::AdapterConfig;
    use confsync_elements::element::InMemoryElementSource;
    use confsync_elements::ids::ElemId;
    use confsync_elements::reference::ReferenceExpression;
    use confsync_elements::value::values_from_json;
    use serde_json::{json, Value as JsonValue};
    use std::sync::Arc;

    struct NoopClient;

    #[async_trait]
    impl ApiClient for NoopClient {
        async fn request(
            &self,
            _method: HttpMethod,
            _url: &str,
            _body: Option<JsonValue>,
        ) -> Result<ApiResponse, HttpError> {
            Ok(ApiResponse::ok(JsonValue::Null))
        }
    }

    fn context(guide_enabled: bool) -> FilterContext {
        let mut config = AdapterConfig::new("zendesk", "https://acme.zendesk.com");
        config.fetch.guide_enabled = guide_enabled;
        config.filters.locales.push(LocaleRule {
            settings_type: "guide_language_settings".into(),
            brand_field: "brand".into(),
            locale_types: vec!["article".into(), "article_translation".into()],
            source_locale_types: vec!["article".into()],
        });
        FilterContext::new(
            Arc::new(config),
            Arc::new(NoopClient),
            Arc::new(InMemoryElementSource::new()),
        )
    }

    fn instance(type_name: &str, name: &str, value: JsonValue) -> InstanceElement {
        InstanceElement::new(name, &ElemId::type_id("zendesk", type_name), values_from_json(value))
    }

    fn elements() -> Vec<Element> {
        vec![
            Element::Instance(instance(
                "guide_language_settings",
                "acme_en_us",
                json!({"brand": 1, "locale": "en-us"}),
            )),
            Element::Instance(instance(
                "guide_language_settings",
                "acme_he",
                json!({"brand": 1, "locale": "he"}),
            )),
            Element::Instance(instance(
                "guide_language_settings",
                "other_en_us",
                json!({"brand": 2, "locale": "en-us"}),
            )),
            Element::Instance(instance(
                "article",
                "intro",
                json!({"brand": 2, "locale": "en-us", "source_locale": "en-us"}),
            )),
            Element::Instance(instance(
                "article_translation",
                "intro_he",
                json!({"brand": 1, "locale": "he", "source_locale": "he"}),
            )),
            Element::Instance(instance("article", "lost", json!({"brand": 2, "locale": "fr"}))),
        ]
    }

    fn reference_name<'a>(elements: &'a [Element], index: usize, field: &str) -> Option<&'a str> {
        elements[index]
            .as_instance()?
            .get(field)?
            .as_reference()
            .map(|r| r.elem_id.name())
    }

    #[tokio::test]
    async fn test_locales_resolve_per_brand() {
        let mut elements = elements();
        LocaleFilter::new(&context(true)).on_fetch(&mut elements).await.unwrap();

        assert_eq!(reference_name(&elements, 3, "locale"), Some("other_en_us"));
        assert_eq!(reference_name(&elements, 3, "source_locale"), Some("other_en_us"));
        assert_eq!(reference_name(&elements, 4, "locale"), Some("acme_he"));
        // Translations carry no source locale reference.
        assert_eq!(
            elements[4].as_instance().unwrap().get("source_locale"),
            Some(&Value::from("he"))
        );
        assert_eq!(elements[5].as_instance().unwrap().get("locale"), Some(&Value::from("fr")));
    }

    #[tokio::test]
    async fn test_brand_references_key_by_target_id() {
        let brand = instance("brand", "other", json!({"id": 2}));
        let mut elements = elements();
        if let Some(article) = elements[3].as_instance_mut() {
            article.value.insert(
                "brand".into(),
                Value::Reference(ReferenceExpression::resolved(
                    brand.elem_id.clone(),
                    Value::Map(brand.value.clone()),
                )),
            );
        }
        LocaleFilter::new(&context(true)).on_fetch(&mut elements).await.unwrap();
        assert_eq!(reference_name(&elements, 3, "locale"), Some("other_en_us"));
    }

    #[tokio::test]
    async fn test_guide_disabled_is_noop() {
        let mut elements = elements();
        LocaleFilter::new(&context(false)).on_fetch(&mut elements).await.unwrap();
        assert_eq!(elements, self::elements());
    }
}
