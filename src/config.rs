//! Compiler configuration

/// Tunables for the fixed-point driver and table composers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Upper bound on driver sweeps before reporting a stall
    pub max_sweeps: usize,
    /// Log every stage transition at debug level
    pub debug: bool,
    /// Added to the sparse side of the dense/sparse cost comparison;
    /// positive values favour dense tables
    pub dispatch_density_bias: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sweeps: 256,
            debug: false,
            dispatch_density_bias: 0,
        }
    }
}

impl Config {
    /// Build a configuration from `CLASSC_*` environment variables,
    /// falling back to defaults for anything absent or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(sweeps) = std::env::var("CLASSC_MAX_SWEEPS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.max_sweeps = sweeps.max(1);
        }
        config.debug = std::env::var("CLASSC_DEBUG").is_ok();
        config
    }

    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps.max(1);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_density_bias(mut self, bias: i64) -> Self {
        self.dispatch_density_bias = bias;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_sweeps, 256);
        assert!(!config.debug);
        assert_eq!(config.dispatch_density_bias, 0);
    }

    #[test]
    fn test_max_sweeps_never_zero() {
        assert_eq!(Config::default().with_max_sweeps(0).max_sweeps, 1);
    }

    #[test]
    fn test_builder_setters() {
        let config = Config::default().with_debug(true).with_density_bias(-4);
        assert!(config.debug);
        assert_eq!(config.dispatch_density_bias, -4);
        assert_eq!(config.max_sweeps, 256);
    }
}
