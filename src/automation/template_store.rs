use std::sync::{Arc, PoisonError, RwLock};

use crate::core::frame::Template;

/// Holds the most recently captured template. Replaced wholesale, never edited.
#[derive(Default)]
pub struct TemplateStore {
    current: RwLock<Option<Arc<Template>>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Template>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, template: Template) -> Arc<Template> {
        let template = Arc::new(template);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&template));
        template
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
