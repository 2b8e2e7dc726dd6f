use tracing::trace;

use crate::{
    expr::WeightExpr,
    feature::{Feature, Schema},
    Result,
};

/// 计算要素权重的策略
///
/// 在扫描配置时通过[Weigher::for_schema]选定一次，之后逐条记录调用[Weigher::weight]。
#[derive(Debug, Clone, PartialEq)]
pub enum Weigher {
    /// 每个要素固定贡献1.0
    Constant,
    /// 读取数值属性；空值为0.0
    Numeric(usize),
    /// 读取非数值属性并尝试转换为浮点数；空值为0.0，转换失败为1.0
    Converted(usize),
    /// 对整条记录求值表达式；空结果为0.0
    Expression(WeightExpr),
}

impl Weigher {
    /// 按权重选项选择策略
    ///
    /// * 没有选项 → [Weigher::Constant]
    /// * 选项是数值属性名 → [Weigher::Numeric]
    /// * 选项是非数值属性名 → [Weigher::Converted]
    /// * 其他（函数调用、算术表达式等）→ [Weigher::Expression]
    ///
    /// # 错误
    /// 表达式无法编译时返回相应错误
    pub fn for_schema(weight: Option<&str>, schema: &Schema) -> Result<Self> {
        let Some(weight) = weight.map(str::trim) else {
            return Ok(Weigher::Constant);
        };
        match schema.index_of(weight) {
            Some(index) => {
                let numeric = schema
                    .attribute(index)
                    .map(|attribute| attribute.kind().is_numeric())
                    .unwrap_or(false);
                if numeric {
                    Ok(Weigher::Numeric(index))
                } else {
                    Ok(Weigher::Converted(index))
                }
            }
            None => WeightExpr::compile(weight, schema).map(Weigher::Expression),
        }
    }

    /// 计算要素的权重
    ///
    /// 表达式求出的负数原样返回
    pub fn weight(&self, feature: &Feature) -> f64 {
        match self {
            Weigher::Constant => 1.0,
            Weigher::Numeric(index) => feature.attribute(*index).as_f64().unwrap_or(0.0),
            Weigher::Converted(index) => {
                let value = feature.attribute(*index);
                if value.is_null() {
                    0.0
                } else {
                    // 无法转换的值仍然把该要素计数一次
                    value.convert_f64().unwrap_or(1.0)
                }
            }
            Weigher::Expression(expr) => match expr.evaluate(feature) {
                Some(v) => v,
                None => {
                    trace!(feature = feature.id(), "weight expression produced no number");
                    0.0
                }
            },
        }
    }

    /// 用于日志的策略名称
    pub fn kind(&self) -> &'static str {
        match self {
            Weigher::Constant => "constant",
            Weigher::Numeric(_) => "numeric",
            Weigher::Converted(_) => "converted",
            Weigher::Expression(_) => "expression",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::feature::{AttributeDescriptor, AttributeType, AttributeValue, GeometryBinding};
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(
            "obs",
            vec![
                AttributeDescriptor::new("magnitude", AttributeType::Double),
                AttributeDescriptor::new("label", AttributeType::String),
                AttributeDescriptor::new("geom", AttributeType::Geometry(GeometryBinding::Point)),
            ],
        ))
    }

    fn feature(magnitude: AttributeValue, label: AttributeValue) -> Feature {
        Feature::new("f", schema(), vec![magnitude, label])
    }

    #[test]
    fn selection_policy() -> anyhow::Result<()> {
        let schema = schema();
        assert_eq!(Weigher::for_schema(None, &schema)?, Weigher::Constant);
        assert_eq!(
            Weigher::for_schema(Some("magnitude"), &schema)?,
            Weigher::Numeric(0)
        );
        assert_eq!(
            Weigher::for_schema(Some(" label "), &schema)?,
            Weigher::Converted(1)
        );
        assert_eq!(
            Weigher::for_schema(Some("magnitude * 2"), &schema)?.kind(),
            "expression"
        );
        assert!(Weigher::for_schema(Some("nope + 1"), &schema).is_err());
        Ok(())
    }

    #[test]
    fn constant_ignores_attributes() {
        let f = feature(12.0.into(), "x".into());
        assert_eq!(Weigher::Constant.weight(&f), 1.0);
    }

    #[test]
    fn numeric_null_is_zero() {
        assert_eq!(Weigher::Numeric(0).weight(&feature(AttributeValue::Null, "x".into())), 0.0);
        assert_eq!(Weigher::Numeric(0).weight(&feature(2.5.into(), "x".into())), 2.5);
    }

    #[test]
    fn converted_falls_back_to_one() {
        let w = Weigher::Converted(1);
        assert_eq!(w.weight(&feature(AttributeValue::Null, "not a number".into())), 1.0);
        assert_eq!(w.weight(&feature(AttributeValue::Null, "4.5".into())), 4.5);
        assert_eq!(w.weight(&feature(AttributeValue::Null, AttributeValue::Null)), 0.0);
    }

    #[test]
    fn expression_results() -> anyhow::Result<()> {
        let schema = schema();
        let w = Weigher::for_schema(Some("magnitude - 10"), &schema)?;
        assert_eq!(w.weight(&feature(4.0.into(), AttributeValue::Null)), -6.0);
        assert_eq!(w.weight(&feature(AttributeValue::Null, AttributeValue::Null)), 0.0);
        Ok(())
    }
}
