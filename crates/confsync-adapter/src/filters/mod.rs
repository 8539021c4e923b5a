//! Reusable filters
//!
//! Every filter is configured from [`FilterSettings`](crate::config::FilterSettings)
//! and does nothing for types it has no rule for.

pub mod body_template;
pub mod child_order;
pub mod id_references;
pub mod list_coercion;
pub mod locale;
pub mod order_instance;
pub mod removal_last;

pub use body_template::BodyTemplateFilter;
pub use child_order::ChildOrderFilter;
pub use id_references::IdReferenceFilter;
pub use list_coercion::ListCoercionFilter;
pub use locale::LocaleFilter;
pub use order_instance::OrderInstanceFilter;
pub use removal_last::RemovalLastFilter;

use confsync_elements::element::{Element, InstanceElement};

use crate::filter::{creator, FilterCreator};

/// The standard filter list, in execution order.
///
/// Reference-producing filters run after list coercion so they see
/// normalized lists; deploy filters claim their changes before the
/// generic deployer.
pub fn default_filters() -> Vec<FilterCreator> {
    vec![
        creator(|ctx| Box::new(ListCoercionFilter::new(ctx))),
        creator(|ctx| Box::new(IdReferenceFilter::new(ctx))),
        creator(|ctx| Box::new(LocaleFilter::new(ctx))),
        creator(|ctx| Box::new(BodyTemplateFilter::new(ctx))),
        creator(|ctx| Box::new(ChildOrderFilter::new(ctx))),
        creator(|ctx| Box::new(OrderInstanceFilter::new(ctx))),
        creator(|ctx| Box::new(RemovalLastFilter::new(ctx))),
    ]
}

/// Instances of `type_name` among fetched elements.
pub(crate) fn instances_of<'a>(
    elements: &'a [Element],
    type_name: &'a str,
) -> impl Iterator<Item = &'a InstanceElement> + 'a {
    elements
        .iter()
        .filter_map(Element::as_instance)
        .filter(move |inst| inst.type_name() == type_name)
}
