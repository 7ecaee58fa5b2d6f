//! Rate-curve configuration of the loaded probe.
//!
//! The curve is written into the `config_ratecurve` array, then the
//! ready sentinel into `config`. The BPF object treats anything other
//! than the sentinel as "do not emit", so the write order makes the
//! fully-initialized curve visible before the first event can fire.

use anyhow::Context;
use aya::maps::{Array, MapData};
use tracing::info;

use domain::probe::entity::ProbeConfig;
use ebpf_common::acct::{
    CONFIG_MAP, CONFIG_READY_KEY, CONFIG_READY_VALUE, CURVE0_AGE, CURVE0_RATE, CURVE1_AGE,
    CURVE1_RATE, CURVE2_AGE, CURVE2_RATE, RATECURVE_MAP,
};

use super::loader::AcctBpf;

/// The probe's two configuration arrays.
pub struct ProbeConfigMaps {
    config: Array<MapData, u64>,
    curve: Array<MapData, i64>,
}

impl ProbeConfigMaps {
    pub fn new(bpf: &mut AcctBpf) -> anyhow::Result<Self> {
        let config = Array::try_from(bpf.take_map(CONFIG_MAP)?)
            .with_context(|| format!("map '{CONFIG_MAP}' has unexpected shape"))?;
        let curve = Array::try_from(bpf.take_map(RATECURVE_MAP)?)
            .with_context(|| format!("map '{RATECURVE_MAP}' has unexpected shape"))?;
        Ok(Self { config, curve })
    }

    /// Apply defaults, validate and write `cfg`, then mark the probe
    /// ready. Must run before any hook attaches.
    pub fn apply(&mut self, cfg: &ProbeConfig) -> anyhow::Result<()> {
        let cfg = cfg.with_defaults();
        cfg.validate()?;

        let points = [
            (CURVE0_AGE, cfg.curve[0].age),
            (CURVE0_RATE, cfg.curve[0].rate),
            (CURVE1_AGE, cfg.curve[1].age),
            (CURVE1_RATE, cfg.curve[1].rate),
            (CURVE2_AGE, cfg.curve[2].age),
            (CURVE2_RATE, cfg.curve[2].rate),
        ];
        for (key, value) in points {
            self.curve
                .set(key, value.as_nanos() as i64, 0)
                .with_context(|| format!("writing {RATECURVE_MAP}[{key}]"))?;
        }

        // Sentinel last: it is the emission gate.
        self.config
            .set(CONFIG_READY_KEY, CONFIG_READY_VALUE, 0)
            .context("writing ready sentinel")?;

        info!(
            curve0 = ?cfg.curve[0],
            curve1 = ?cfg.curve[1],
            curve2 = ?cfg.curve[2],
            "probe rate curve configured"
        );
        Ok(())
    }
}
