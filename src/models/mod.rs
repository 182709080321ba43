// Re-export model modules
mod currencies;
mod locale;

pub use currencies::*;
pub use locale::*;
