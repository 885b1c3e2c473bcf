//! Role services and the machinery around them.
//!
//! 1. **Shortener** (`shortener`): the backend role's business logic over storage
//! 2. **Middleware** (`middleware`): Tower layers wrapping the dispatch gateway
//! 3. **Background workers** (`worker`): periodic tasks (discovery polling)

pub mod middleware;
pub mod shortener;
pub mod worker;

pub use middleware::{build_dispatch_pipeline, DispatchPipeline};
pub use shortener::ShortenerService;
pub use worker::{BackgroundRunnable, BackgroundWorker};
