// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Circulation settings.
//!
//! Layered lowest to highest: built-in defaults, an optional settings file,
//! then `LIBRARY_`-prefixed environment variables (`LIBRARY_DAILY_RATE`,
//! `LIBRARY_LOAN_PERIOD_DAYS`).

use crate::policy::{DEFAULT_DAILY_RATE, DEFAULT_LOAN_PERIOD_DAYS, MAX_DAILY_RATE};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("loan period must be at least one day")]
    ZeroLoanPeriod,

    #[error("daily rate must not be negative (got {0})")]
    NegativeDailyRate(Decimal),

    #[error("daily rate must not exceed 1000000 (got {0})")]
    DailyRateTooHigh(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CirculationConfig {
    /// Days between issue and due date.
    pub loan_period_days: u32,
    /// Fine per overdue day.
    pub daily_rate: Decimal,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            daily_rate: DEFAULT_DAILY_RATE,
        }
    }
}

impl CirculationConfig {
    /// Load settings from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("loan_period_days", i64::from(DEFAULT_LOAN_PERIOD_DAYS))?
            .set_default("daily_rate", DEFAULT_DAILY_RATE.to_string())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix("LIBRARY").try_parsing(true))
            .build()?;

        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loan_period_days == 0 {
            return Err(ConfigError::ZeroLoanPeriod);
        }
        if self.daily_rate < Decimal::ZERO {
            return Err(ConfigError::NegativeDailyRate(self.daily_rate));
        }
        if self.daily_rate > MAX_DAILY_RATE {
            return Err(ConfigError::DailyRateTooHigh(self.daily_rate));
        }
        Ok(())
    }
}
