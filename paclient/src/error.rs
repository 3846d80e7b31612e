//! Re-export of the core error taxonomy for public-API consumers.

pub use paclient_core::error::{ClientError, Result};
