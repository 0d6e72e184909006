// crates/am_config/src/units.rs

//! 排放单位
//!
//! 排放速率在进入网格前统一换算为 μg/s。只接受四种单位字符串，
//! 其他任何写法都在配置阶段报错，不做默认回退。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 一年的秒数（365 天）
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// 一短吨对应的微克数
pub const UG_PER_SHORT_TON: f64 = 907_184_740_000.0;

/// 一千克对应的微克数
pub const UG_PER_KG: f64 = 1.0e9;

/// 排放单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EmissionUnits {
    /// 短吨/年
    #[default]
    TonsPerYear,
    /// 千克/年
    KgPerYear,
    /// 微克/秒
    UgPerSecond,
}

impl EmissionUnits {
    /// 换算到 μg/s 的系数
    pub fn to_ug_per_s(self) -> f64 {
        match self {
            Self::TonsPerYear => UG_PER_SHORT_TON / SECONDS_PER_YEAR,
            Self::KgPerYear => UG_PER_KG / SECONDS_PER_YEAR,
            Self::UgPerSecond => 1.0,
        }
    }

    /// 单位字符串
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TonsPerYear => "tons/year",
            Self::KgPerYear => "kg/year",
            Self::UgPerSecond => "ug/s",
        }
    }
}

impl FromStr for EmissionUnits {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tons/year" => Ok(Self::TonsPerYear),
            "kg/year" => Ok(Self::KgPerYear),
            "ug/s" | "μg/s" => Ok(Self::UgPerSecond),
            other => Err(ConfigError::invalid(
                "emission_units",
                other,
                "只支持 tons/year, kg/year, ug/s, μg/s",
            )),
        }
    }
}

impl TryFrom<String> for EmissionUnits {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EmissionUnits> for String {
    fn from(units: EmissionUnits) -> Self {
        units.as_str().to_string()
    }
}

impl fmt::Display for EmissionUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_spellings() {
        assert_eq!("tons/year".parse::<EmissionUnits>().unwrap(), EmissionUnits::TonsPerYear);
        assert_eq!("kg/year".parse::<EmissionUnits>().unwrap(), EmissionUnits::KgPerYear);
        assert_eq!("ug/s".parse::<EmissionUnits>().unwrap(), EmissionUnits::UgPerSecond);
        assert_eq!("μg/s".parse::<EmissionUnits>().unwrap(), EmissionUnits::UgPerSecond);
    }

    #[test]
    fn test_reject_unknown() {
        assert!("tonnes/year".parse::<EmissionUnits>().is_err());
        assert!("".parse::<EmissionUnits>().is_err());
    }

    #[test]
    fn test_conversion_factors() {
        let tons = EmissionUnits::TonsPerYear.to_ug_per_s();
        assert!((tons - 28_766.639_396_245_56).abs() < 1e-6);
        let kg = EmissionUnits::KgPerYear.to_ug_per_s();
        assert!((kg * SECONDS_PER_YEAR - 1.0e9).abs() < 1e-3);
        assert_eq!(EmissionUnits::UgPerSecond.to_ug_per_s(), 1.0);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&EmissionUnits::KgPerYear).unwrap();
        assert_eq!(json, "\"kg/year\"");
        let back: EmissionUnits = serde_json::from_str("\"μg/s\"").unwrap();
        assert_eq!(back, EmissionUnits::UgPerSecond);
        assert!(serde_json::from_str::<EmissionUnits>("\"lb/day\"").is_err());
    }
}
