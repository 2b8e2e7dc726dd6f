//! 扫描选项、进程级默认值，以及查询端的选项推导。
//!
//! | 键 | 格式 | 含义 |
//! |---|---|---|
//! | `envelope` | `"minX,maxX,minY,maxY"` | 地理窗口 |
//! | `grid` | `"width,height"` | 像素分辨率 |
//! | `weight` | 属性名或表达式（可选） | 权重策略 |
//! | `batch` | 正整数（可选） | 每批最多占用的像素数 |
//! | `sampling` | `vertices` / `traced`（可选） | 采样方式 |
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    grid::Sampling,
    snap::{Envelope, GridSnap},
    DensityError, Result,
};

pub const ENVELOPE_OPT: &str = "envelope";
pub const GRID_OPT: &str = "grid";
pub const WEIGHT_OPT: &str = "weight";
pub const BATCH_OPT: &str = "batch";
pub const SAMPLING_OPT: &str = "sampling";

/// 每批最多占用的像素数的默认值
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// 覆盖[DensityConfig::batch_size]的环境变量
pub const BATCH_SIZE_ENV: &str = "GEO_DENSITY_BATCH_SIZE";

/// 进程级默认配置，在初始化扫描时显式传入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// 网格占用的像素数达到该值时刷新一批
    pub batch_size: usize,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl DensityConfig {
    /// 默认值叠加环境变量覆盖
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// 用`lookup`查找覆盖值；无法解析或为0的值被忽略
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(BATCH_SIZE_ENV)
            .and_then(|x| x.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            self.batch_size = v;
        }
        self
    }
}

/// 解析后的扫描选项
#[derive(Debug, Clone, PartialEq)]
pub struct DensityOptions {
    pub envelope: Envelope,
    pub width: usize,
    pub height: usize,
    pub weight: Option<String>,
    pub batch_size: Option<usize>,
    pub sampling: Sampling,
}

impl DensityOptions {
    /// 校验并解析选项；任何错误都在处理记录之前返回
    pub fn parse(options: &HashMap<String, String>) -> Result<Self> {
        let envelope = parse_envelope(required(options, ENVELOPE_OPT)?)?;
        let (width, height) = parse_grid(required(options, GRID_OPT)?)?;
        let weight = options
            .get(WEIGHT_OPT)
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(str::to_string);
        let batch_size = options
            .get(BATCH_OPT)
            .map(|v| parse_batch(v))
            .transpose()?;
        let sampling = options
            .get(SAMPLING_OPT)
            .map(|v| parse_sampling(v))
            .transpose()?
            .unwrap_or_default();
        Ok(DensityOptions {
            envelope,
            width,
            height,
            weight,
            batch_size,
            sampling,
        })
    }

    pub fn snap(&self) -> Result<GridSnap> {
        GridSnap::new(self.envelope, self.width, self.height)
    }
}

fn required<'a>(options: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str> {
    options
        .get(key)
        .map(String::as_str)
        .ok_or(DensityError::MissingOption(key))
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> DensityError {
    DensityError::InvalidOption {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_envelope(value: &str) -> Result<Envelope> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| invalid(ENVELOPE_OPT, value, e.to_string()))?;
    match parts[..] {
        [min_x, max_x, min_y, max_y] => Envelope::new(min_x, max_x, min_y, max_y),
        _ => Err(invalid(ENVELOPE_OPT, value, "需要4个数字: minX,maxX,minY,maxY")),
    }
}

fn parse_grid(value: &str) -> Result<(usize, usize)> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| invalid(GRID_OPT, value, e.to_string()))?;
    match parts[..] {
        [width, height] if width > 0 && height > 0 => Ok((width, height)),
        [_, _] => Err(DensityError::InvalidGrid),
        _ => Err(invalid(GRID_OPT, value, "需要2个整数: width,height")),
    }
}

fn parse_batch(value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(v) if v > 0 => Ok(v),
        Ok(_) => Err(invalid(BATCH_OPT, value, "必须大于0")),
        Err(e) => Err(invalid(BATCH_OPT, value, e.to_string())),
    }
}

fn parse_sampling(value: &str) -> Result<Sampling> {
    match value.trim().to_ascii_lowercase().as_str() {
        "vertices" => Ok(Sampling::Vertices),
        "traced" => Ok(Sampling::Traced),
        _ => Err(invalid(SAMPLING_OPT, value, "需要vertices或traced")),
    }
}

/// 查询端：由密度请求推导扫描选项
///
/// # 示例
///
/// ```rust
/// # fn main() -> geo_density::Result<()> {
/// use geo_density::{DensityOptions, DensityQuery, Envelope};
///
/// let query = DensityQuery::new(Envelope::new(-180., 180., -90., 90.)?, 512, 256);
/// let options = query.to_options();
/// assert_eq!(options.len(), 2);
/// assert_eq!(options["grid"], "512,256");
/// assert_eq!(DensityOptions::parse(&options)?.width, 512);
/// # Ok(())}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityQuery {
    pub envelope: Envelope,
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub sampling: Sampling,
}

impl DensityQuery {
    pub fn new(envelope: Envelope, width: usize, height: usize) -> Self {
        DensityQuery {
            envelope,
            width,
            height,
            weight: None,
            batch_size: None,
            sampling: Sampling::default(),
        }
    }

    pub fn weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = Some(weight.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// 生成扫描选项；未指定的可选项被省略，以便使用扫描端的默认值
    pub fn to_options(&self) -> HashMap<String, String> {
        let Envelope {
            min_x,
            max_x,
            min_y,
            max_y,
        } = self.envelope;
        let mut options = HashMap::new();
        options.insert(
            ENVELOPE_OPT.to_string(),
            format!("{min_x},{max_x},{min_y},{max_y}"),
        );
        options.insert(GRID_OPT.to_string(), format!("{},{}", self.width, self.height));
        if let Some(weight) = &self.weight {
            options.insert(WEIGHT_OPT.to_string(), weight.clone());
        }
        if let Some(batch_size) = self.batch_size {
            options.insert(BATCH_OPT.to_string(), batch_size.to_string());
        }
        if self.sampling != Sampling::default() {
            options.insert(SAMPLING_OPT.to_string(), "traced".to_string());
        }
        options
    }
}
