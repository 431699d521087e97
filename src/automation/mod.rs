pub mod cache;
pub mod matcher;
pub mod template_store;

pub use cache::ScreenCache;
pub use matcher::Matcher;
pub use template_store::TemplateStore;
