use geo::Geometry;
use tracing::warn;

use crate::{
    feature::{Feature, GeometryBinding, Schema},
    grid::RenderingGrid,
    weigher::Weigher,
    DensityError, Result,
};

/// 渲染器变体，与模式声明的几何绑定一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    /// 在渲染时接受任意几何类型
    Generic,
}

impl From<GeometryBinding> for RendererKind {
    fn from(binding: GeometryBinding) -> Self {
        match binding {
            GeometryBinding::Point => RendererKind::Point,
            GeometryBinding::MultiPoint => RendererKind::MultiPoint,
            GeometryBinding::LineString => RendererKind::LineString,
            GeometryBinding::MultiLineString => RendererKind::MultiLineString,
            GeometryBinding::Polygon => RendererKind::Polygon,
            GeometryBinding::MultiPolygon => RendererKind::MultiPolygon,
            GeometryBinding::Geometry => RendererKind::Generic,
        }
    }
}

/// 把一条要素的几何属性按权重栅格化到网格中
///
/// 绑定固定的几何属性索引和一个[Weigher]，每次扫描选择一次。
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRenderer {
    kind: RendererKind,
    geometry: usize,
    weigher: Weigher,
}

impl GeometryRenderer {
    pub fn new(kind: RendererKind, geometry: usize, weigher: Weigher) -> Self {
        GeometryRenderer {
            kind,
            geometry,
            weigher,
        }
    }

    /// 按模式的默认几何属性选择渲染器
    ///
    /// # 错误
    /// 模式没有几何属性时返回[DensityError::NoGeometry]
    pub fn for_schema(schema: &Schema, weigher: Weigher) -> Result<Self> {
        let (geometry, binding) = schema
            .default_geometry()
            .ok_or_else(|| DensityError::NoGeometry(schema.name().to_string()))?;
        Ok(GeometryRenderer::new(binding.into(), geometry, weigher))
    }

    pub fn kind(&self) -> RendererKind {
        self.kind
    }

    pub fn weigher(&self) -> &Weigher {
        &self.weigher
    }

    /// 渲染一条要素；空几何不做任何事
    pub fn render(&self, grid: &mut RenderingGrid, feature: &Feature) {
        let Some(geometry) = feature.geometry(self.geometry) else {
            return;
        };
        let weight = self.weigher.weight(feature);
        match (self.kind, geometry) {
            (RendererKind::Point, Geometry::Point(point)) => grid.render(point, weight),
            (RendererKind::MultiPoint, Geometry::MultiPoint(points)) => grid.render(points, weight),
            (RendererKind::LineString, Geometry::LineString(ls)) => grid.render(ls, weight),
            (RendererKind::MultiLineString, Geometry::MultiLineString(lines)) => {
                grid.render(lines, weight)
            }
            (RendererKind::Polygon, Geometry::Polygon(poly)) => grid.render(poly, weight),
            (RendererKind::MultiPolygon, Geometry::MultiPolygon(polys)) => {
                grid.render(polys, weight)
            }
            (RendererKind::Generic, geometry) => grid.render(geometry, weight),
            (kind, geometry) => {
                warn!(
                    feature = feature.id(),
                    expected = ?kind,
                    "geometry does not match the declared binding, rendering generically"
                );
                grid.render(geometry, weight)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        feature::{AttributeDescriptor, AttributeType, AttributeValue},
        grid::Sampling,
        snap::{Envelope, GridSnap},
    };
    use geo::{line_string, MultiPoint, Point};
    use pretty_assertions::assert_eq;

    fn schema(binding: GeometryBinding) -> Arc<Schema> {
        Arc::new(Schema::new(
            "things",
            vec![
                AttributeDescriptor::new("weight", AttributeType::Double),
                AttributeDescriptor::new("geom", AttributeType::Geometry(binding)),
            ],
        ))
    }

    fn grid() -> RenderingGrid {
        let envelope = Envelope::new(0.0, 10.0, 0.0, 10.0).unwrap();
        RenderingGrid::new(GridSnap::new(envelope, 10, 10).unwrap(), Sampling::Vertices)
    }

    #[test]
    fn selection_follows_binding() -> anyhow::Result<()> {
        let r = GeometryRenderer::for_schema(&schema(GeometryBinding::MultiPoint), Weigher::Constant)?;
        assert_eq!(r.kind(), RendererKind::MultiPoint);
        let r = GeometryRenderer::for_schema(&schema(GeometryBinding::Geometry), Weigher::Constant)?;
        assert_eq!(r.kind(), RendererKind::Generic);

        let no_geom = Schema::new("flat", vec![AttributeDescriptor::new("a", AttributeType::Long)]);
        assert_eq!(
            GeometryRenderer::for_schema(&no_geom, Weigher::Constant),
            Err(DensityError::NoGeometry("flat".into()))
        );
        Ok(())
    }

    #[test]
    fn weighted_line_renders_each_vertex() -> anyhow::Result<()> {
        let schema = schema(GeometryBinding::LineString);
        let renderer = GeometryRenderer::for_schema(&schema, Weigher::Numeric(0))?;
        let feature = Feature::new(
            "l",
            schema,
            vec![3.0.into(), Some(line_string![(x: 1., y: 1.), (x: 1., y: 8.)]).into()],
        );
        let mut g = grid();
        renderer.render(&mut g, &feature);
        assert_eq!(g.iter().collect::<Vec<_>>(), vec![((1, 1), 3.0), ((8, 1), 3.0)]);
        Ok(())
    }

    #[test]
    fn null_geometry_is_a_no_op() -> anyhow::Result<()> {
        let schema = schema(GeometryBinding::Point);
        let renderer = GeometryRenderer::for_schema(&schema, Weigher::Constant)?;
        let feature = Feature::new("n", schema, vec![1.0.into(), AttributeValue::Null]);
        let mut g = grid();
        renderer.render(&mut g, &feature);
        assert!(g.is_empty());
        Ok(())
    }

    #[test]
    fn mismatched_geometry_still_renders() -> anyhow::Result<()> {
        let schema = schema(GeometryBinding::Point);
        let renderer = GeometryRenderer::for_schema(&schema, Weigher::Constant)?;
        let points: MultiPoint<f64> = vec![Point::new(2.5, 2.5), Point::new(2.6, 2.4)].into();
        let feature = Feature::new("m", schema, vec![AttributeValue::Null, Some(points).into()]);
        let mut g = grid();
        renderer.render(&mut g, &feature);
        assert_eq!(g.get(2, 2), Some(2.0));
        Ok(())
    }
}
