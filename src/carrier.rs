//! 让编码后的密度网格借道只认识几何要素的传输层。
//!
//! 载体是一条固定模式的要素：唯一的几何属性恒为原点，
//! 真正的数据作为带外元数据挂在[DENSITY_KEY]下。
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use geo::Point;

use crate::{
    feature::{AttributeDescriptor, AttributeType, Feature, GeometryBinding, Schema},
    DensityError, Result,
};

/// 载体模式的名称
pub const DENSITY_TYPE_NAME: &str = "density";
/// 载体模式唯一的属性名
pub const DENSITY_GEOM: &str = "geom";
/// 载体要素上存放编码网格的元数据键
pub const DENSITY_KEY: &str = "density.result";
/// 载体要素的标识
const DENSITY_ID: &str = "density";

/// 密度结果类型的标记
///
/// “这是不是密度结果”由模式决定，与具体载荷无关。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DensityFeatureType;

impl DensityFeatureType {
    /// 固定的单属性点模式，所有载体共享同一个实例
    pub fn schema() -> Arc<Schema> {
        static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();
        SCHEMA
            .get_or_init(|| {
                Arc::new(Schema::new(
                    DENSITY_TYPE_NAME,
                    vec![AttributeDescriptor::new(
                        DENSITY_GEOM,
                        AttributeType::Geometry(GeometryBinding::Point),
                    )],
                ))
            })
            .clone()
    }

    /// 给定模式是否为载体模式
    pub fn matches(schema: &Schema) -> bool {
        *schema == *Self::schema()
    }
}

/// 携带一批编码网格的要素
#[derive(Debug, Clone)]
pub struct DensityCarrier {
    feature: Feature,
}

impl DensityCarrier {
    /// 载体的类型标记
    pub fn feature_type(&self) -> DensityFeatureType {
        DensityFeatureType
    }

    /// 携带的编码网格
    pub fn payload(&self) -> Option<&Bytes> {
        self.feature.user_data(DENSITY_KEY)
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    pub fn into_feature(self) -> Feature {
        self.feature
    }
}

/// 只比较模式，载荷不参与
impl PartialEq for DensityCarrier {
    fn eq(&self, other: &Self) -> bool {
        self.feature.schema() == other.feature.schema()
    }
}

impl From<DensityCarrier> for Feature {
    fn from(carrier: DensityCarrier) -> Self {
        carrier.feature
    }
}

impl TryFrom<Feature> for DensityCarrier {
    type Error = DensityError;

    /// # 错误
    /// 要素模式不是载体模式时返回[DensityError::Malformed]
    fn try_from(feature: Feature) -> Result<Self> {
        if DensityFeatureType::matches(feature.schema()) {
            Ok(DensityCarrier { feature })
        } else {
            Err(DensityError::Malformed(format!(
                "模式`{}`不是密度结果模式",
                feature.schema().name()
            )))
        }
    }
}

/// 把编码网格包装成载体要素
pub fn wrap(blob: Bytes) -> DensityCarrier {
    let mut feature = Feature::new(
        DENSITY_ID,
        DensityFeatureType::schema(),
        vec![Some(Point::new(0.0, 0.0)).into()],
    );
    feature.set_user_data(DENSITY_KEY, blob);
    DensityCarrier { feature }
}

/// 从载体要素中取出编码网格，供下游解码
///
/// # 错误
/// 要素上没有挂载载荷时返回[DensityError::MissingPayload]
pub fn unwrap(feature: &Feature) -> Result<Bytes> {
    feature
        .user_data(DENSITY_KEY)
        .cloned()
        .ok_or(DensityError::MissingPayload)
}
