mod files;
mod headers;
pub mod progress;

// Export utility functions
pub use self::files::{name_from_url, resolve_output_path};
pub use self::headers::{parse_and_add_header, parse_headers};
