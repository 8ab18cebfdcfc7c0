pub mod fs_atomic;
pub mod ids;
pub mod logging;

pub use fs_atomic::atomic_write_file;
pub use ids::{validate_identifier_value, GraphId, StageId};
pub use logging::{append_service_log_line, service_log_path};
