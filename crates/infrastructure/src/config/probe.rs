//! Probe section of the config file: the rate curve.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use domain::probe::entity::{CurvePoint, ProbeConfig};

use super::common::duration_string;

/// `probe:` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSection {
    #[serde(default)]
    pub rate_curve: CurveSection,
}

/// `probe.rate_curve:` section, three points keyed `"0"`, `"1"`, `"2"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurveSection {
    #[serde(rename = "0", default)]
    pub zero: CurvePointSection,
    #[serde(rename = "1", default)]
    pub one: CurvePointSection,
    #[serde(rename = "2", default)]
    pub two: CurvePointSection,
}

/// One curve point; age and rate are duration strings like `20s`.
/// Omitted fields read as zero and take the probe defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurvePointSection {
    #[serde(default, with = "duration_string")]
    pub age: Duration,
    #[serde(default, with = "duration_string")]
    pub rate: Duration,
}

impl ProbeSection {
    /// Convert into the domain probe configuration. Defaulting and
    /// validation happen when the configuration is applied to the probe.
    pub fn to_probe_config(&self) -> ProbeConfig {
        let point = |p: &CurvePointSection| CurvePoint::new(p.age, p.rate);
        ProbeConfig {
            curve: [
                point(&self.rate_curve.zero),
                point(&self.rate_curve.one),
                point(&self.rate_curve.two),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_section_parses_duration_strings() {
        let yaml = r#"
rate_curve:
  "0": { age: 0s, rate: 10ms }
  "1": { age: 50ms, rate: 25ms }
  "2": { age: 100ms, rate: 50ms }
"#;
        let section: ProbeSection = serde_yaml_ng::from_str(yaml).unwrap();
        let cfg = section.to_probe_config();
        assert_eq!(cfg.curve[0].age, Duration::ZERO);
        assert_eq!(cfg.curve[0].rate, Duration::from_millis(10));
        assert_eq!(cfg.curve[1].age, Duration::from_millis(50));
        assert_eq!(cfg.curve[2].rate, Duration::from_millis(50));
    }

    #[test]
    fn missing_points_read_as_zero() {
        let yaml = r#"
rate_curve:
  "1": { age: 2m }
"#;
        let section: ProbeSection = serde_yaml_ng::from_str(yaml).unwrap();
        let cfg = section.to_probe_config();
        assert_eq!(cfg.curve[0].age, Duration::ZERO);
        assert_eq!(cfg.curve[0].rate, Duration::ZERO);
        assert_eq!(cfg.curve[1].age, Duration::from_secs(120));
        assert_eq!(cfg.curve[1].rate, Duration::ZERO);
    }

    #[test]
    fn empty_section_is_all_zero() {
        let section = ProbeSection::default();
        let cfg = section.to_probe_config();
        assert!(cfg.curve.iter().all(|p| p.age.is_zero() && p.rate.is_zero()));
    }
}
