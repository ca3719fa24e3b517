pub mod debounce;
pub mod event_bus;
pub mod metrics;
pub mod retry;
pub mod work_queue;

pub use debounce::*;
pub use event_bus::*;
pub use metrics::*;
pub use retry::*;
pub use work_queue::*;
