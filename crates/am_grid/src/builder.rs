// crates/am_grid/src/builder.rs

//! 网格构建
//!
//! `CellFactory` 负责为给定范围生成完整初始化的单元（层几何、气象、
//! 人口、死亡率、排放通量），构建器与变异引擎共用。
//! `GridBuilder::regular` 生成最粗一级嵌套网格并建立拓扑。

use crate::cell::{Cell, Meteorology};
use crate::domain::{Domain, GridCriteria};
use crate::emissions::Emissions;
use crate::inputs::StaticInputs;
use crate::species::SpeciesSet;
use am_config::VarGridConfig;
use am_foundation::{AmError, AmResult};
use am_geo::BoundingBox;
use std::sync::Arc;

/// 覆盖率低于该值的排放记录会记录 debug 日志
const COVERAGE_WARN: f64 = 1.0 - 1.0e-6;

/// 单元工厂
#[derive(Debug, Clone)]
pub struct CellFactory<'a> {
    config: &'a VarGridConfig,
    inputs: &'a StaticInputs,
    emissions: &'a Emissions,
    species: Arc<SpeciesSet>,
    pop_columns: Vec<usize>,
    mortality_columns: Vec<usize>,
}

impl<'a> CellFactory<'a> {
    /// 创建工厂，解析人口与死亡率列
    pub fn new(
        config: &'a VarGridConfig,
        inputs: &'a StaticInputs,
        emissions: &'a Emissions,
        species: Arc<SpeciesSet>,
    ) -> AmResult<Self> {
        emissions.check_species(&species)?;
        let pop_columns = inputs.population.select(&config.census_pop_columns)?;
        let mortality_columns = inputs.mortality.select(&config.mortality_columns())?;
        Ok(Self {
            config,
            inputs,
            emissions,
            species,
            pop_columns,
            mortality_columns,
        })
    }

    /// 网格配置
    pub fn config(&self) -> &VarGridConfig {
        self.config
    }

    /// 静态输入
    pub fn inputs(&self) -> &StaticInputs {
        self.inputs
    }

    /// 排放
    pub fn emissions(&self) -> &Emissions {
        self.emissions
    }

    /// 物种表
    pub fn species(&self) -> &SpeciesSet {
        &self.species
    }

    /// 层数（取自 CTM）
    pub fn nlayers(&self) -> usize {
        self.inputs.ctm.nlayers()
    }

    /// 创建空域
    pub fn new_domain(&self) -> Domain {
        Domain::new(
            self.nlayers(),
            Arc::clone(&self.species),
            self.config.census_pop_columns.clone(),
            self.config.mortality_columns(),
            GridCriteria {
                pop_conc_threshold: self.config.pop_conc_threshold,
            },
        )
    }

    /// 生成完整初始化的单元，浓度为零
    pub fn make_cell(&self, layer: usize, index: Vec<[usize; 2]>, bounds: BoundingBox) -> AmResult<Cell> {
        let (z_bottom, dz) = self.inputs.ctm.layer_geometry(layer)?;
        let mut cell = Cell::new(layer, index, bounds, self.species.len());
        cell.z_bottom = z_bottom;
        cell.dz = dz;
        cell.met = self.inputs.ctm.sample(&bounds, layer)?;
        cell.population = self.population_for(&bounds);
        cell.mortality = self.mortality_for(&bounds)?;
        cell.emis_flux = self.emission_flux(&bounds, layer, cell.volume())?;
        Ok(cell)
    }

    /// 重新采样气象；CTM 无法覆盖时返回 `fallback`
    pub fn resample_met(&self, bounds: &BoundingBox, layer: usize, fallback: Meteorology) -> AmResult<Meteorology> {
        match self.inputs.ctm.sample(bounds, layer) {
            Ok(met) => Ok(met),
            Err(AmError::MissingCoverage { .. }) => Ok(fallback),
            Err(e) => Err(e),
        }
    }

    /// 是否有人口数据可供重新分摊
    pub fn has_population(&self) -> bool {
        !self.inputs.population.is_empty()
    }

    /// 是否有死亡率数据可供重新采样
    pub fn has_mortality(&self) -> bool {
        !self.inputs.mortality.is_empty()
    }

    /// 范围内的人口（广延量）
    pub fn population_for(&self, bounds: &BoundingBox) -> Vec<f64> {
        self.inputs.population.allocate_extensive(bounds, &self.pop_columns)
    }

    /// 范围内的死亡率（强度量）
    pub fn mortality_for(&self, bounds: &BoundingBox) -> AmResult<Vec<f64>> {
        self.inputs.mortality.allocate_intensive(bounds, &self.mortality_columns)
    }

    /// 最粗嵌套网格的水平范围
    pub fn extent(&self) -> BoundingBox {
        let (min_x, min_y, max_x, max_y) = self.config.extent();
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    /// 范围内的排放通量 [μg/m³/s]
    pub fn emission_flux(&self, bounds: &BoundingBox, layer: usize, volume: f64) -> AmResult<Vec<f64>> {
        self.emissions.flux_for(bounds, layer, volume, &self.species, &self.extent())
    }
}

/// 网格构建器
pub struct GridBuilder;

impl GridBuilder {
    /// 构建最粗一级嵌套网格：每层 `x_nests[0] × y_nests[0]` 个单元，
    /// 按层、行、列顺序排列，随后建立邻接关系
    pub fn regular(factory: &CellFactory<'_>) -> AmResult<Domain> {
        let config = factory.config();
        let (nx, ny) = match (config.x_nests.first(), config.y_nests.first()) {
            (Some(&nx), Some(&ny)) if nx > 0 && ny > 0 => (nx, ny),
            _ => return Err(AmError::invalid_config("grid.x_nests", "[]", "嵌套级数不能为空")),
        };

        let mut domain = factory.new_domain();
        for layer in 0..factory.nlayers() {
            for j in 0..ny {
                for i in 0..nx {
                    let bounds = BoundingBox::new(
                        config.x0 + i as f64 * config.dx,
                        config.y0 + j as f64 * config.dy,
                        config.x0 + (i + 1) as f64 * config.dx,
                        config.y0 + (j + 1) as f64 * config.dy,
                    );
                    domain.push_cell(factory.make_cell(layer, vec![[i, j]], bounds)?)?;
                }
            }
        }
        domain.link_all()?;
        report_uncovered_emissions(&domain, factory.emissions());

        log::info!(
            "规则网格构建完成: {} 层 × {}×{} = {} 个单元",
            factory.nlayers(),
            nx,
            ny,
            domain.len()
        );
        Ok(domain)
    }
}

/// 未完全落入网格的排放记录只记录 debug 日志
pub fn report_uncovered_emissions(domain: &Domain, emissions: &Emissions) {
    if emissions.is_empty() {
        return;
    }
    let Some(extent) = domain.extent() else { return };
    let coverage = emissions.coverage(domain.iter().map(|(_, c)| (c.layer, &c.bounds)), &extent);
    for (i, covered) in coverage.iter().enumerate() {
        if *covered < COVERAGE_WARN {
            log::debug!("排放记录 #{i} 仅有 {:.3} 落入网格，其余部分忽略", covered);
        }
    }
}
