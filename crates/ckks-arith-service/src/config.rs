//! Service configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML
//! file, then `CKKS_ARITH_*` environment variables.

use std::path::Path;

use anyhow::{bail, Context, Result};
use ckks_arith_core::{CkksError, ParameterSet, SecurityLevel};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "CKKS_ARITH_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Polynomial ring degree N.
    pub ring_degree: usize,
    /// Bit widths of the modulus chain, q_0 first.
    pub modulus_chain_bits: Vec<u32>,
    /// log₂ of the encoding scale Δ.
    pub scale_bits: u32,
    /// One of `none`, `tc128`, `tc192`, `tc256`.
    pub security_level: SecurityLevel,
    /// Default tracing directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ring_degree: 4096,
            modulus_chain_bits: vec![49, 30, 30],
            scale_bits: 30,
            security_level: SecurityLevel::Tc128,
            log_filter: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration, merging `path` (if given) and the environment over
    /// the defaults. A path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                bail!("configuration file {} not found", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context("could not parse configuration")
    }

    /// Validate and build the parameter set this configuration describes.
    pub fn parameter_set(&self) -> std::result::Result<ParameterSet, CkksError> {
        ParameterSet::new(
            self.ring_degree,
            &self.modulus_chain_bits,
            self.scale_bits,
            self.security_level,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_| {
            let config = ServiceConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config, ServiceConfig::default());

            let params = config.parameter_set().map_err(|e| e.to_string())?;
            assert_eq!(params.ring_degree(), 4096);
            assert_eq!(params.max_level(), 2);
            assert_eq!(params.security_level(), SecurityLevel::Tc128);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ckks.yaml",
                r#"
ring_degree: 2048
modulus_chain_bits: [34, 20]
scale_bits: 20
"#,
            )?;
            let config =
                ServiceConfig::load(Some(Path::new("ckks.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.ring_degree, 2048);
            assert_eq!(config.modulus_chain_bits, vec![34, 20]);
            assert_eq!(config.scale_bits, 20);
            // Untouched keys keep their defaults
            assert_eq!(config.security_level, SecurityLevel::Tc128);
            assert_eq!(config.log_filter, "info");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("ckks.yaml", "scale_bits: 20\nlog_filter: warn\n")?;
            jail.set_env("CKKS_ARITH_SCALE_BITS", "25");
            jail.set_env("CKKS_ARITH_SECURITY_LEVEL", "none");
            jail.set_env("CKKS_ARITH_MODULUS_CHAIN_BITS", "[45, 25, 25]");

            let config =
                ServiceConfig::load(Some(Path::new("ckks.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.scale_bits, 25);
            assert_eq!(config.log_filter, "warn");
            assert_eq!(config.modulus_chain_bits, vec![45, 25, 25]);
            assert_eq!(config.security_level, SecurityLevel::None);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        Jail::expect_with(|_| {
            assert!(ServiceConfig::load(Some(Path::new("absent.yaml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_parameters_surface() {
        let config = ServiceConfig {
            ring_degree: 4096,
            modulus_chain_bits: vec![60, 60],
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.parameter_set(),
            Err(CkksError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_unknown_security_level_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file("ckks.yaml", "security_level: tc64\n")?;
            assert!(ServiceConfig::load(Some(Path::new("ckks.yaml"))).is_err());

            jail.create_file("other.yaml", "security_level: tc192\n")?;
            let config =
                ServiceConfig::load(Some(Path::new("other.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.security_level, SecurityLevel::Tc192);
            Ok(())
        });
    }

    #[test]
    fn test_rescale_primes_must_match_scale() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ckks.yaml",
                r#"
ring_degree: 4096
modulus_chain_bits: [60, 40]
scale_bits: 20
security_level: none
"#,
            )?;
            let config =
                ServiceConfig::load(Some(Path::new("ckks.yaml"))).map_err(|e| e.to_string())?;
            assert!(matches!(
                config.parameter_set(),
                Err(CkksError::InvalidParameters(_))
            ));
            Ok(())
        });
    }
}
