/*!
Run configuration for the sampler.

A [`SamplerConfig`] collects the knobs a caller sets once per run: the number
of iterations, the burn-in and sampling interval used by state processors, the
number of independent chains and an optional global seed. It can be read from
a TOML document; every field has a default.

```rust
use roundtrips::config::SamplerConfig;

let config = SamplerConfig::from_toml_str(
    r#"
    iterations = 10000
    burn_in = 1000
    sampling_interval = 10
    seed = 42
    "#,
)
.unwrap();
assert_eq!(config.n_chains, 1);
assert_eq!(config.schedule().interval, 10);
```
*/

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::io::SamplingSchedule;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Iterations per chain.
    pub iterations: u64,
    /// Iterations before state processors start materializing output.
    pub burn_in: u64,
    /// Materialize every `sampling_interval`-th iteration after burn-in.
    pub sampling_interval: u64,
    /// Iterations between two progress log lines.
    pub msg_interval: u64,
    /// Number of independent chains.
    pub n_chains: usize,
    /// Global seed; chain `i` is seeded with `seed + i`.
    pub seed: Option<u64>,
    /// Directory receiving logger output.
    pub output_dir: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            burn_in: 10_000,
            sampling_interval: 100,
            msg_interval: 10_000,
            n_chains: 1,
            seed: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl SamplerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SamplerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_interval == 0 {
            return Err(ConfigError::Invalid(
                "sampling_interval must be at least 1".to_string(),
            ));
        }
        if self.msg_interval == 0 {
            return Err(ConfigError::Invalid(
                "msg_interval must be at least 1".to_string(),
            ));
        }
        if self.n_chains == 0 {
            return Err(ConfigError::Invalid(
                "n_chains must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn schedule(&self) -> SamplingSchedule {
        SamplingSchedule::new(self.burn_in, self.sampling_interval)
    }
}
