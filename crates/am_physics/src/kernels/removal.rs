// crates/am_physics/src/kernels/removal.rs

//! 源汇计算核：排放、干/湿沉降、化学

use super::{Kernel, Snapshot};
use crate::mechanism::Mechanism;
use am_foundation::AmResult;
use am_grid::{Cell, SpeciesClass, SpeciesSet};
use std::sync::Arc;

/// 排放：`cf += flux·dt`
#[derive(Debug, Clone, Copy, Default)]
pub struct AddEmissionsFlux;

impl Kernel for AddEmissionsFlux {
    fn name(&self) -> &'static str {
        "AddEmissionsFlux"
    }

    fn apply(&self, cell: &mut Cell, _: &Snapshot, dt: f64) -> AmResult<()> {
        for (cf, flux) in cell.cf.iter_mut().zip(&cell.emis_flux) {
            *cf += flux * dt;
        }
        Ok(())
    }
}

/// 干沉降，仅地面层：`cf *= exp(−vd·dt/dz)`
#[derive(Debug, Clone)]
pub struct DryDeposition {
    classes: Vec<SpeciesClass>,
}

impl DryDeposition {
    /// 按物种相态选择沉降速度
    pub fn new(species: &SpeciesSet) -> Self {
        Self {
            classes: (0..species.len()).map(|i| species.class(i)).collect(),
        }
    }
}

impl Kernel for DryDeposition {
    fn name(&self) -> &'static str {
        "DryDeposition"
    }

    fn apply(&self, cell: &mut Cell, _: &Snapshot, dt: f64) -> AmResult<()> {
        if cell.layer != 0 {
            return Ok(());
        }
        let gas = (-cell.met.dry_dep_gas * dt / cell.dz).exp();
        let particle = (-cell.met.dry_dep_particle * dt / cell.dz).exp();
        for (cf, class) in cell.cf.iter_mut().zip(&self.classes) {
            *cf *= match class {
                SpeciesClass::Gas => gas,
                SpeciesClass::Particle => particle,
            };
        }
        Ok(())
    }
}

/// 湿沉降：`cf *= exp(−wd·dt)`
#[derive(Debug, Clone, Copy, Default)]
pub struct WetDeposition;

impl Kernel for WetDeposition {
    fn name(&self) -> &'static str {
        "WetDeposition"
    }

    fn apply(&self, cell: &mut Cell, _: &Snapshot, dt: f64) -> AmResult<()> {
        let factor = (-cell.met.wet_dep * dt).exp();
        for cf in cell.cf.iter_mut() {
            *cf *= factor;
        }
        Ok(())
    }
}

/// 化学：委托给机制
#[derive(Debug, Clone)]
pub struct Chemistry {
    mechanism: Arc<dyn Mechanism>,
}

impl Chemistry {
    /// 使用给定机制
    pub fn new(mechanism: Arc<dyn Mechanism>) -> Self {
        Self { mechanism }
    }
}

impl Kernel for Chemistry {
    fn name(&self) -> &'static str {
        "Chemistry"
    }

    fn apply(&self, cell: &mut Cell, _: &Snapshot, dt: f64) -> AmResult<()> {
        let met = cell.met;
        self.mechanism.chemistry(&mut cell.cf, &met, dt);
        Ok(())
    }
}
