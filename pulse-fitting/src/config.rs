use crate::{
    Real,
    error::ConfigError,
    likelihood::LogFactorialTable,
    optimizer::OptimiserSettings,
    response::{ResponseModel, ResponseParameters},
    seeder::SeederSettings,
};
use ucn_common::Microseconds;

#[derive(Clone, Debug, PartialEq)]
pub struct FitterSettings {
    pub bin_width: Microseconds,
    /// Used when `bin_width` gives a window fewer than two bins.
    pub fine_bin_width: Microseconds,
    /// Largest gap between consecutive hits of the same window.
    pub min_gap: Microseconds,
    pub seeder: SeederSettings,
    pub optimiser: OptimiserSettings,
}

impl Default for FitterSettings {
    fn default() -> Self {
        Self {
            bin_width: 1.0,
            fine_bin_width: 0.25,
            min_gap: 10.0,
            seeder: SeederSettings::default(),
            optimiser: OptimiserSettings::default(),
        }
    }
}

fn positive(name: &'static str, value: Real) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

impl FitterSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("bin width", self.bin_width)?;
        positive("fine bin width", self.fine_bin_width)?;
        if self.fine_bin_width >= self.bin_width {
            return Err(ConfigError::FineBinWidth {
                primary: self.bin_width,
                fine: self.fine_bin_width,
            });
        }
        positive("minimum gap", self.min_gap)?;
        positive("seed threshold factor", self.seeder.threshold_factor)?;

        let (lower, upper) = self.optimiser.amplitude_bounds;
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(ConfigError::AmplitudeBounds { lower, upper });
        }
        positive("relative tolerance", self.optimiser.relative_tolerance)?;
        positive("acceptance threshold", self.optimiser.acceptance_threshold)?;
        positive("offset step", self.optimiser.offset_step)?;
        positive("amplitude step fraction", self.optimiser.amplitude_step_fraction)?;
        Ok(())
    }
}

/// Everything a fitter reads and never writes. Built once and shared by
/// reference between fitters running on different threads.
#[derive(Clone, Debug)]
pub struct FitterConfig {
    settings: FitterSettings,
    response: ResponseModel,
    log_factorials: LogFactorialTable,
}

impl FitterConfig {
    pub fn new(
        parameters: &ResponseParameters,
        settings: FitterSettings,
    ) -> Result<Self, ConfigError> {
        parameters.validate()?;
        settings.validate()?;
        Ok(Self {
            settings,
            response: ResponseModel::new(parameters),
            log_factorials: LogFactorialTable::new(),
        })
    }

    pub fn settings(&self) -> &FitterSettings {
        &self.settings
    }

    pub fn response(&self) -> &ResponseModel {
        &self.response
    }

    pub fn log_factorials(&self) -> &LogFactorialTable {
        &self.log_factorials
    }
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            settings: FitterSettings::default(),
            response: ResponseModel::new(&ResponseParameters::default()),
            log_factorials: LogFactorialTable::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(FitterSettings::default().validate().is_ok());
        assert!(FitterConfig::new(&ResponseParameters::default(), FitterSettings::default()).is_ok());
    }

    #[test]
    fn rejects_non_positive_bin_width() {
        let settings = FitterSettings {
            bin_width: 0.0,
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::NotPositive {
                name: "bin width",
                value: 0.0
            })
        );
    }

    #[test]
    fn rejects_coarse_fallback() {
        let settings = FitterSettings {
            fine_bin_width: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::FineBinWidth { .. })
        ));
    }

    #[test]
    fn rejects_empty_amplitude_bounds() {
        let mut settings = FitterSettings::default();
        settings.optimiser.amplitude_bounds = (300.0, 1.0);
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::AmplitudeBounds { .. })
        ));
    }

    #[test]
    fn config_is_shareable() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<FitterConfig>();
    }
}
