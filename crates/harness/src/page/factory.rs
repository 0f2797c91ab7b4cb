//! Page object factory backed by a capacity-1 cache

use std::any::{Any, TypeId};
use std::sync::Arc;

use tracing::debug;

use crate::browser::BrowserPage;
use crate::error::HarnessResult;
use crate::page::PageObject;
use crate::poll::{poll_until, PollConfig};

struct CachedPage {
    type_id: TypeId,
    type_name: &'static str,
    any: Arc<dyn Any + Send + Sync>,
    page: Arc<dyn PageObject>,
}

/// Holds at most one live page object
#[derive(Default)]
pub struct PageCache {
    entry: Option<CachedPage>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<P: PageObject>(&self) -> Option<Arc<P>> {
        let entry = self.entry.as_ref()?;
        if entry.type_id != TypeId::of::<P>() {
            return None;
        }
        entry.any.clone().downcast::<P>().ok()
    }

    /// Replace the cached page, disposing the previous one
    pub fn insert<P: PageObject>(&mut self, page: Arc<P>) {
        self.evict_and_dispose();
        let any: Arc<dyn Any + Send + Sync> = page.clone();
        let object: Arc<dyn PageObject> = page;
        self.entry = Some(CachedPage {
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
            any,
            page: object,
        });
    }

    /// Dispose the cached page, if any, and empty the cache
    pub fn evict_and_dispose(&mut self) -> Option<&'static str> {
        let entry = self.entry.take()?;
        entry.page.dispose();
        Some(entry.type_name)
    }

    pub fn len(&self) -> usize {
        usize::from(self.entry.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn cached_type(&self) -> Option<TypeId> {
        self.entry.as_ref().map(|e| e.type_id)
    }

    pub fn cached_type_name(&self) -> Option<&'static str> {
        self.entry.as_ref().map(|e| e.type_name)
    }
}

/// Creates page objects and keeps the current real page cached
pub struct PageObjectFactory {
    cache: PageCache,
    poll: PollConfig,
}

impl PageObjectFactory {
    pub fn new(poll: PollConfig) -> Self {
        Self {
            cache: PageCache::new(),
            poll,
        }
    }

    /// Return the cached `P` or build, initialize and (for real pages) cache a new one
    pub async fn get<P: PageObject>(
        &mut self,
        page: &Arc<dyn BrowserPage>,
        check_stability: bool,
    ) -> HarnessResult<Arc<P>> {
        if let Some(existing) = self.cache.get::<P>() {
            return Ok(existing);
        }

        let object = Arc::new(P::construct(page.clone(), self.poll.clone()));
        object.initialize().await?;

        if check_stability {
            let target: &P = &object;
            poll_until(&self.poll, std::any::type_name::<P>(), move || target.is_page_stable()).await?;
        }

        if object.can_navigate_with_url() {
            debug!("Caching page object {}", std::any::type_name::<P>());
            self.cache.insert(object.clone());
        }

        Ok(object)
    }

    /// Dispose every cached page object and empty the cache
    pub fn clear(&mut self) {
        if let Some(name) = self.cache.evict_and_dispose() {
            debug!("Disposed page object {}", name);
        }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
