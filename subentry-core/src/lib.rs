pub mod config;
pub mod core_collective;
pub mod core_dit;
pub mod core_subentry;
pub mod logging;
pub mod metrics;

#[cfg(test)]
pub mod test_utils;

pub use config::{Config, EngineConfig};
pub use core_collective::{AugmentedView, SubentryService};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = EngineConfig::default();
    }
}
