//! Utility functions for streamsift

pub mod fallback;
pub mod mime;
pub mod url;

pub use self::fallback::*;
pub use self::mime::*;
pub use self::url::*;
