//! 挂接在外部扫描框架上的密度聚合算子。
//!
//! 外部框架对每个索引分区运行一个独立的[DensityScan]，逐条送入记录，
//! 只在记录之间检查[AggregatingScan::is_full]，满了就取出一批编码结果。
//! 合并各分区的部分网格不在这里完成。
use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

use crate::{
    codec,
    config::{DensityConfig, DensityOptions},
    feature::{Feature, Schema},
    grid::RenderingGrid,
    render::GeometryRenderer,
    weigher::Weigher,
    Result,
};

/// 外部扫描框架驱动聚合算子的接口
pub trait AggregatingScan {
    /// 每批的编码结果
    type Output;

    /// 累加一条记录
    fn aggregate(&mut self, feature: &Feature);

    /// 当前批是否已满
    fn is_full(&self) -> bool;

    /// 当前批是否还没有任何内容
    fn is_empty(&self) -> bool;

    /// 编码当前批并开始新的一批
    fn encode_result(&mut self) -> Self::Output;
}

/// 聚合算子的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// 刚初始化，网格为空
    Initialized,
    /// 正在累加，网格未满
    Accumulating,
    /// 占用的像素数达到批大小
    Full,
    /// 刚刷新过一批，新网格为空
    Encoded,
}

/// 密度聚合算子
///
/// # 示例
///
/// ```rust
/// # fn main() -> geo_density::Result<()> {
/// use std::{collections::HashMap, sync::Arc};
/// use geo::Point;
/// use geo_density::{
///     codec, AttributeDescriptor, AttributeType, DensityConfig, DensityScan, Feature,
///     GeometryBinding, Schema,
/// };
///
/// let schema = Arc::new(Schema::new(
///     "sites",
///     vec![AttributeDescriptor::new("geom", AttributeType::Geometry(GeometryBinding::Point))],
/// ));
/// let options: HashMap<String, String> = [
///     ("envelope".to_string(), "-180,180,-90,90".to_string()),
///     ("grid".to_string(), "2,2".to_string()),
/// ]
/// .into_iter()
/// .collect();
///
/// let mut scan = DensityScan::initialize(&options, &schema, &DensityConfig::default())?;
/// for id in ["a", "b"] {
///     let feature = Feature::new(id, schema.clone(), vec![Some(Point::new(-90., -45.)).into()]);
///     scan.accumulate(&feature);
/// }
/// let snap = *scan.grid().snap();
/// let blob = scan.flush();
/// let points = codec::decode(blob, snap).collect::<geo_density::Result<Vec<_>>>()?;
/// assert_eq!(points.len(), 1);
/// assert_eq!(points[0].weight, 2.0);
/// # Ok(())}
/// ```
#[derive(Debug, Clone)]
pub struct DensityScan {
    renderer: GeometryRenderer,
    grid: RenderingGrid,
    batch_size: usize,
    state: ScanState,
    batches: usize,
}

impl DensityScan {
    /// 由原始选项初始化
    ///
    /// # 错误
    /// 选项缺失或格式错误、模式没有几何属性、权重表达式无法编译时返回错误；
    /// 不会留下部分初始化的算子
    pub fn initialize(
        options: &HashMap<String, String>,
        schema: &Schema,
        config: &DensityConfig,
    ) -> Result<Self> {
        Self::with_options(DensityOptions::parse(options)?, schema, config)
    }

    /// 由已解析的选项初始化；选项中的批大小优先于`config`
    pub fn with_options(
        options: DensityOptions,
        schema: &Schema,
        config: &DensityConfig,
    ) -> Result<Self> {
        let snap = options.snap()?;
        let weigher = Weigher::for_schema(options.weight.as_deref(), schema)?;
        let renderer = GeometryRenderer::for_schema(schema, weigher)?;
        let batch_size = options.batch_size.unwrap_or(config.batch_size).max(1);
        debug!(
            schema = schema.name(),
            renderer = ?renderer.kind(),
            weigher = renderer.weigher().kind(),
            width = snap.width(),
            height = snap.height(),
            batch_size,
            sampling = ?options.sampling,
            operator = "DensityScan",
            "density scan initialized"
        );
        Ok(DensityScan {
            renderer,
            grid: RenderingGrid::new(snap, options.sampling),
            batch_size,
            state: ScanState::Initialized,
            batches: 0,
        })
    }

    /// 把一条记录渲染到当前网格
    pub fn accumulate(&mut self, feature: &Feature) {
        self.renderer.render(&mut self.grid, feature);
        self.state = if self.is_full() {
            ScanState::Full
        } else {
            ScanState::Accumulating
        };
    }

    /// 当前网格占用的像素数是否达到批大小
    pub fn is_full(&self) -> bool {
        self.grid.size() >= self.batch_size
    }

    /// 编码当前网格，并以同样配置的新网格继续
    pub fn flush(&mut self) -> Bytes {
        let next = self.grid.fresh();
        let grid = std::mem::replace(&mut self.grid, next);
        let blob = codec::encode(&grid);
        self.batches += 1;
        self.state = ScanState::Encoded;
        debug!(
            cells = grid.size(),
            bytes = blob.len(),
            batch = self.batches,
            operator = "DensityScan",
            "flushed density batch"
        );
        blob
    }

    pub fn grid(&self) -> &RenderingGrid {
        &self.grid
    }

    pub fn renderer(&self) -> &GeometryRenderer {
        &self.renderer
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// 已刷新的批数
    pub fn batches(&self) -> usize {
        self.batches
    }
}

impl AggregatingScan for DensityScan {
    type Output = Bytes;

    fn aggregate(&mut self, feature: &Feature) {
        self.accumulate(feature);
    }

    fn is_full(&self) -> bool {
        DensityScan::is_full(self)
    }

    fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    fn encode_result(&mut self) -> Bytes {
        self.flush()
    }
}

/// 按外部框架的方式驱动一次完整扫描
///
/// 每条记录之后检查是否已满，满了就取出一批；最后一批非空时也会取出。
pub fn run_scan<'a, S, I>(scan: &mut S, features: I) -> Vec<S::Output>
where
    S: AggregatingScan,
    I: IntoIterator<Item = &'a Feature>,
{
    let mut batches = Vec::new();
    for feature in features {
        scan.aggregate(feature);
        if scan.is_full() {
            batches.push(scan.encode_result());
        }
    }
    if !scan.is_empty() {
        batches.push(scan.encode_result());
    }
    batches
}
