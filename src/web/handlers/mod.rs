// Route handlers, one file per endpoint.

pub mod analyze;
pub mod status;
