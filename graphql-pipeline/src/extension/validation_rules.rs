use std::sync::Arc;

use super::Extension;
use super::ExtensionFactory;
use super::Region;
use crate::execution_context::ExecutionContext;
use crate::spec::ValidationRule;

/// Adds validation rules to every request, on top of the rules it was built with.
///
/// The rules are added when the request region is entered, so they also take
/// part in the cache key of a [`super::ValidationCache`].
#[derive(Clone)]
pub struct AddValidationRules {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl AddValidationRules {
    pub fn new(rules: impl IntoIterator<Item = Arc<dyn ValidationRule>>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn factory(&self) -> ExtensionFactory {
        let extension = self.clone();
        ExtensionFactory::new(
            "add_validation_rules",
            move |_: &ExecutionContext| -> Box<dyn Extension> { Box::new(extension.clone()) },
        )
    }
}

impl std::fmt::Debug for AddValidationRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

impl Extension for AddValidationRules {
    fn on_enter(&mut self, region: Region, context: &mut ExecutionContext) {
        if region == Region::Request && !context.add_validation_rules(self.rules.iter().cloned()) {
            tracing::debug!("errors already determined, validation rules not added");
        }
    }

    fn name(&self) -> &'static str {
        "add_validation_rules"
    }
}
