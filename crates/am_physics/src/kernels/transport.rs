// crates/am_physics/src/kernels/transport.rs

//! 输运计算核：一阶迎风平流、涡扩散混合、水平蜿蜒混合

use super::{Kernel, Snapshot};
use am_foundation::AmResult;
use am_grid::{Axis, Cell, Face, Meteorology};

/// 蜿蜒混合的时间尺度 [s]：K_m = τ·(u² + v²)
const MEANDER_TIMESCALE: f64 = 10.0;

fn velocity(met: &Meteorology, axis: Axis) -> f64 {
    match axis {
        Axis::X => met.u,
        Axis::Y => met.v,
        Axis::Z => met.w,
    }
}

/// 外法向速度：正面取原值，负面取反
fn outward(face: Face, v: f64) -> f64 {
    if face.is_positive() {
        v
    } else {
        -v
    }
}

/// 一阶有限体积迎风平流
///
/// 交界面速度取两侧单元速度的平均；流出取本单元 `ci`，流入取迎风邻居 `ci`。
/// 侧面与顶面边界：流入为洁净空气，流出自由；地面不透。
#[derive(Debug, Clone, Copy, Default)]
pub struct UpwindAdvection;

impl Kernel for UpwindAdvection {
    fn name(&self) -> &'static str {
        "UpwindAdvection"
    }

    fn apply(&self, cell: &mut Cell, snapshot: &Snapshot, dt: f64) -> AmResult<()> {
        let volume = cell.volume();
        let own = cell.ci.clone();
        let mut delta = vec![0.0; cell.cf.len()];

        for face in Face::ALL {
            let axis = face.axis();
            let list = cell.neighbors.on(face);
            if list.is_empty() {
                if face == Face::Below && cell.layer == 0 {
                    continue;
                }
                let vo = outward(face, velocity(&cell.met, axis));
                if vo > 0.0 {
                    let q = vo * cell.face_area(face) * dt / volume;
                    for (d, c) in delta.iter_mut().zip(&own) {
                        *d -= q * c;
                    }
                }
                continue;
            }
            for n in list {
                let other = snapshot.get(n.id)?;
                let v_face = 0.5 * (velocity(&cell.met, axis) + velocity(&other.met, axis));
                let vo = outward(face, v_face);
                let q = vo * n.area * dt / volume;
                let upwind = if vo > 0.0 { &own } else { &other.ci };
                for (d, c) in delta.iter_mut().zip(upwind) {
                    *d -= q * c;
                }
            }
        }

        for (cf, d) in cell.cf.iter_mut().zip(delta) {
            *cf += d;
        }
        Ok(())
    }
}

/// 涡扩散混合：侧面用平均 Kxxyy，上下用平均 Kzz，距离取中心间距；边界零通量
#[derive(Debug, Clone, Copy, Default)]
pub struct Mixing;

impl Kernel for Mixing {
    fn name(&self) -> &'static str {
        "Mixing"
    }

    fn apply(&self, cell: &mut Cell, snapshot: &Snapshot, dt: f64) -> AmResult<()> {
        let volume = cell.volume();
        let center = [cell.center().x, cell.center().y, cell.z_center()];
        let mut delta = vec![0.0; cell.cf.len()];

        for (face, n) in cell.neighbors.iter() {
            let other = snapshot.get(n.id)?;
            let (k, dist) = match face.axis() {
                Axis::X => (0.5 * (cell.met.kxxyy + other.met.kxxyy), (other.center[0] - center[0]).abs()),
                Axis::Y => (0.5 * (cell.met.kxxyy + other.met.kxxyy), (other.center[1] - center[1]).abs()),
                Axis::Z => (0.5 * (cell.met.kzz + other.met.kzz), (other.center[2] - center[2]).abs()),
            };
            if dist <= 0.0 {
                continue;
            }
            let q = k * n.area * dt / (dist * volume);
            for ((d, cn), cc) in delta.iter_mut().zip(&other.ci).zip(&cell.ci) {
                *d += q * (cn - cc);
            }
        }

        for (cf, d) in cell.cf.iter_mut().zip(delta) {
            *cf += d;
        }
        Ok(())
    }
}

/// 次网格水平蜿蜒混合：交换系数与水平风速平方成正比，仅作用于侧面
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanderMixing;

impl Kernel for MeanderMixing {
    fn name(&self) -> &'static str {
        "MeanderMixing"
    }

    fn apply(&self, cell: &mut Cell, snapshot: &Snapshot, dt: f64) -> AmResult<()> {
        let volume = cell.volume();
        let speed2 = |m: &Meteorology| m.u * m.u + m.v * m.v;
        let mut delta = vec![0.0; cell.cf.len()];

        for face in Face::LATERAL {
            for n in cell.neighbors.on(face) {
                let other = snapshot.get(n.id)?;
                let k = MEANDER_TIMESCALE * 0.5 * (speed2(&cell.met) + speed2(&other.met));
                let idx = if face.axis() == Axis::X { 0 } else { 1 };
                let here = if idx == 0 { cell.center().x } else { cell.center().y };
                let dist = (other.center[idx] - here).abs();
                if dist <= 0.0 {
                    continue;
                }
                let q = k * n.area * dt / (dist * volume);
                for ((d, cn), cc) in delta.iter_mut().zip(&other.ci).zip(&cell.ci) {
                    *d += q * (cn - cc);
                }
            }
        }

        for (cf, d) in cell.cf.iter_mut().zip(delta) {
            *cf += d;
        }
        Ok(())
    }
}
