use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::Digest;
use sha2::Sha256;

use super::Extension;
use super::ExtensionFactory;
use super::Region;
use crate::execution_context::ExecutionContext;
use crate::graphql::Error;
use crate::spec::Document;
use crate::spec::validate_document;

/// Remembers the validation errors of queries across requests.
///
/// Requests served from the cache skip the pipeline's own validator: the
/// cached errors are recorded when the validation region is entered.
#[derive(Clone)]
pub struct ValidationCache {
    inner: Arc<Mutex<LruCache<String, Vec<Error>>>>,
}

impl ValidationCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// A factory for extensions sharing this cache.
    pub fn factory(&self) -> ExtensionFactory {
        let cache = self.clone();
        ExtensionFactory::new(
            "validation_cache",
            move |_: &ExecutionContext| -> Box<dyn Extension> {
                Box::new(CachedValidation {
                    cache: cache.clone(),
                })
            },
        )
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn get_or_validate(&self, context: &ExecutionContext, document: &Document) -> Vec<Error> {
        let key = cache_key(context);
        if let Some(errors) = self.inner.lock().get(&key) {
            tracing::debug!(%key, "validation cache hit");
            return errors.clone();
        }
        tracing::debug!(%key, "validation cache miss");

        // validate outside of the lock
        let errors = validate_document(context.schema(), document, context.validation_rules());
        self.inner.lock().put(key, errors.clone());
        errors
    }
}

impl std::fmt::Debug for ValidationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ValidationCache")
            .field("len", &inner.len())
            .field("capacity", &inner.cap())
            .finish()
    }
}

fn cache_key(context: &ExecutionContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(context.schema().fingerprint().as_bytes());
    hasher.update([0xFF]);
    hasher.update(context.query().as_bytes());
    for rule in context.validation_rules() {
        hasher.update([0xFF]);
        hasher.update(rule.name().as_bytes());
    }
    hex::encode(hasher.finalize())
}

struct CachedValidation {
    cache: ValidationCache,
}

impl Extension for CachedValidation {
    fn on_enter(&mut self, region: Region, context: &mut ExecutionContext) {
        if region != Region::Validation || !context.errors().is_undetermined() {
            return;
        }
        let Some(document) = context.document().cloned() else {
            return;
        };
        let errors = self.cache.get_or_validate(context, &document);
        context.record_errors(errors);
    }

    fn name(&self) -> &'static str {
        "validation_cache"
    }
}
