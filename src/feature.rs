//! 扫描框架传入的要素记录模型。
//!
//! 密度聚合只按索引读取属性或对整条记录求值表达式，从不修改记录。
use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use geo::Geometry;

/// 模式中声明的几何类型绑定，用于在扫描开始时选择渲染器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryBinding {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    /// 任意几何类型（含几何集合）
    Geometry,
}

/// 属性的声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    String,
    Geometry(GeometryBinding),
}

impl AttributeType {
    /// 是否为数值类型
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AttributeType::Integer | AttributeType::Long | AttributeType::Float | AttributeType::Double
        )
    }
}

/// 属性描述：名称与声明类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    name: String,
    kind: AttributeType,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        AttributeDescriptor {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeType {
        self.kind
    }
}

/// 要素模式：有序的属性列表，第一个几何属性作为默认几何
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    name: String,
    attributes: Vec<AttributeDescriptor>,
    default_geometry: Option<usize>,
}

impl Schema {
    pub fn new(name: impl Into<String>, attributes: Vec<AttributeDescriptor>) -> Self {
        let default_geometry = attributes
            .iter()
            .position(|attribute| matches!(attribute.kind, AttributeType::Geometry(_)));
        Schema {
            name: name.into(),
            attributes,
            default_geometry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> Option<&AttributeDescriptor> {
        self.attributes.get(index)
    }

    /// 按名称查找属性索引
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attribute| attribute.name == name)
    }

    /// 默认几何属性的索引及其几何绑定
    pub fn default_geometry(&self) -> Option<(usize, GeometryBinding)> {
        let index = self.default_geometry?;
        match self.attributes[index].kind {
            AttributeType::Geometry(binding) => Some((index, binding)),
            _ => None,
        }
    }
}

/// 单个属性值
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Geometry(Geometry<f64>),
}

static NULL_VALUE: AttributeValue = AttributeValue::Null;

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// 数值属性的浮点值；非数值返回`None`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// 尽力而为的浮点转换：数值原样返回，文本按小数解析，布尔值映射为1/0
    pub fn convert_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Text(text) => text.trim().parse::<f64>().ok(),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl<G: Into<Geometry<f64>>> From<Option<G>> for AttributeValue {
    fn from(v: Option<G>) -> Self {
        match v {
            Some(geometry) => AttributeValue::Geometry(geometry.into()),
            None => AttributeValue::Null,
        }
    }
}

/// 一条要素记录
///
/// `user_data`是不属于模式的带外元数据，按固定键存放不透明字节。
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: String,
    schema: Arc<Schema>,
    values: Vec<AttributeValue>,
    user_data: HashMap<String, Bytes>,
}

impl Feature {
    /// 创建要素；缺失的尾部属性视为空值
    pub fn new(id: impl Into<String>, schema: Arc<Schema>, mut values: Vec<AttributeValue>) -> Self {
        values.resize(schema.attributes().len(), AttributeValue::Null);
        Feature {
            id: id.into(),
            schema,
            values,
            user_data: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// 按索引读取属性；越界索引返回空值
    pub fn attribute(&self, index: usize) -> &AttributeValue {
        self.values.get(index).unwrap_or(&NULL_VALUE)
    }

    pub fn set_attribute(&mut self, index: usize, value: AttributeValue) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// 读取几何属性；空值或非几何值返回`None`
    pub fn geometry(&self, index: usize) -> Option<&Geometry<f64>> {
        match self.attribute(index) {
            AttributeValue::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }

    pub fn user_data(&self, key: &str) -> Option<&Bytes> {
        self.user_data.get(key)
    }

    pub fn set_user_data(&mut self, key: impl Into<String>, value: Bytes) {
        self.user_data.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(
            "sites",
            vec![
                AttributeDescriptor::new("name", AttributeType::String),
                AttributeDescriptor::new("count", AttributeType::Integer),
                AttributeDescriptor::new("geom", AttributeType::Geometry(GeometryBinding::Point)),
            ],
        ))
    }

    #[test]
    fn default_geometry_is_first_geometry_attribute() {
        let schema = schema();
        assert_eq!(schema.default_geometry(), Some((2, GeometryBinding::Point)));
        assert_eq!(schema.index_of("count"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn short_value_lists_are_padded_with_nulls() {
        let feature = Feature::new("f1", schema(), vec!["a".into()]);
        assert!(feature.attribute(1).is_null());
        assert!(feature.attribute(2).is_null());
        assert!(feature.attribute(17).is_null());
        assert_eq!(feature.geometry(2), None);
    }

    #[test]
    fn geometry_attribute_is_readable() {
        let feature = Feature::new(
            "f1",
            schema(),
            vec!["a".into(), 3i64.into(), Some(Point::new(1.0, 2.0)).into()],
        );
        assert_eq!(feature.geometry(2), Some(&Point::new(1.0, 2.0).into()));
    }

    #[test]
    fn conversions() {
        assert_eq!(AttributeValue::Int(4).as_f64(), Some(4.0));
        assert_eq!(AttributeValue::from(" 2.5 ").convert_f64(), Some(2.5));
        assert_eq!(AttributeValue::from("abc").convert_f64(), None);
        assert_eq!(AttributeValue::Bool(true).convert_f64(), Some(1.0));
        assert_eq!(AttributeValue::from("abc").as_f64(), None);
    }
}
