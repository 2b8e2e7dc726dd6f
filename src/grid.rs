//! 稀疏密度累加网格。
use std::collections::{BTreeMap, HashSet};

use euclid::{Point2D, UnknownUnit};
use geo::{
    algorithm::{coords_iter::CoordsIter, map_coords::MapCoords},
    Coord, Geometry, GeometryCollection, Line, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon, Rect, Triangle,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{line::rasterize_line, poly::rasterize_polygon, snap::GridSnap};

/// 欧几里得点类型，用于把世界坐标变换到像素空间。
type EuclidPoint = Point2D<f64, UnknownUnit>;

/// 几何图形分解为采样点的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// 每个顶点是一个采样点（闭合环的重复终点不计）
    #[default]
    Vertices,
    /// 线逐像素追踪，多边形扫描线填充（孔洞除外）；
    /// 同一条线串或同一个多边形触及的每个像素只得到一次权重
    Traced,
}

/// 稀疏累加网格：`(row, col)`到累计权重的映射
///
/// 只在累加时增长，从不隐式写入零值。内部按行优先升序保存，
/// 所以[RenderingGrid::iter]的顺序是确定的。
///
/// # 示例
///
/// ```rust
/// # fn main() -> geo_density::Result<()> {
/// use geo::Point;
/// use geo_density::{Envelope, GridSnap, RenderingGrid, Sampling};
///
/// let snap = GridSnap::new(Envelope::new(-180., 180., -90., 90.)?, 2, 2)?;
/// let mut grid = RenderingGrid::new(snap, Sampling::Vertices);
/// grid.render(&Point::new(-90., -45.), 1.0);
/// grid.render(&Point::new(-90., -45.), 1.0);
///
/// assert_eq!(grid.size(), 1);
/// assert_eq!(grid.get(0, 0), Some(2.0));
/// # Ok(())}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingGrid {
    snap: GridSnap,
    sampling: Sampling,
    cells: BTreeMap<(usize, usize), f64>,
}

impl RenderingGrid {
    pub fn new(snap: GridSnap, sampling: Sampling) -> Self {
        RenderingGrid {
            snap,
            sampling,
            cells: BTreeMap::new(),
        }
    }

    /// 同样配置的空网格
    pub fn fresh(&self) -> Self {
        RenderingGrid::new(self.snap, self.sampling)
    }

    pub fn snap(&self) -> &GridSnap {
        &self.snap
    }

    pub fn sampling(&self) -> Sampling {
        self.sampling
    }

    pub fn width(&self) -> usize {
        self.snap.width()
    }

    pub fn height(&self) -> usize {
        self.snap.height()
    }

    /// 被占用的不同像素个数
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(&(row, col)).copied()
    }

    /// 向像素累加权重
    pub fn add(&mut self, row: usize, col: usize, weight: f64) {
        debug_assert!(row < self.height());
        debug_assert!(col < self.width());
        *self.cells.entry((row, col)).or_insert(0.0) += weight;
    }

    /// 把一个地理坐标处的权重累加到其所在像素；非有限坐标被忽略
    pub fn render_coord(&mut self, coord: Coord<f64>, weight: f64) {
        if coord.x.is_finite() && coord.y.is_finite() {
            let (row, col) = self.snap.to_pixel(coord.x, coord.y);
            self.add(row, col, weight);
        }
    }

    /// 栅格化一个几何形状并累加权重
    pub fn render<S: Rasterize + ?Sized>(&mut self, shape: &S, weight: f64) {
        shape.rasterize(self, weight);
    }

    /// 按行优先升序遍历`((row, col), weight)`
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.cells.iter().map(|(&key, &weight)| (key, weight))
    }

    /// 清空所有像素
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// 导出为稠密数组，索引为`[row, col]`，未占用的像素为0
    pub fn to_array(&self) -> Array2<f64> {
        let mut pixels = Array2::zeros((self.height(), self.width()));
        for ((row, col), weight) in self.iter() {
            pixels[[row, col]] = weight;
        }
        pixels
    }

    /// 在像素空间追踪一个形状，被触及的每个像素累加一次权重
    fn trace<G, F>(&mut self, shape: &G, weight: f64, burn: F)
    where
        G: MapCoords<f64, f64, Output = G> + CoordsIter<Scalar = f64>,
        F: FnOnce(&G, &mut Burner),
    {
        let all_finite = shape
            .coords_iter()
            .all(|coordinate| coordinate.x.is_finite() && coordinate.y.is_finite());
        if !all_finite {
            return;
        }
        let transform = self.snap.geo_to_pix();
        let pix = shape.map_coords(|coord| {
            transform
                .transform_point(EuclidPoint::new(coord.x, coord.y))
                .to_tuple()
                .into()
        });
        let mut burner = Burner::new(self.width(), self.height());
        burn(&pix, &mut burner);
        for (row, col) in burner.burnt {
            self.add(row, col, weight);
        }
    }
}

/// 收集追踪过程中触及的像素，每个像素只记录一次
///
/// 坐标使用像素空间：`ix`为列，`iy`为行，越界写入被丢弃。
#[derive(Debug)]
pub(crate) struct Burner {
    width: usize,
    height: usize,
    burnt: HashSet<(usize, usize)>,
}

impl Burner {
    fn new(width: usize, height: usize) -> Self {
        Burner {
            width,
            height,
            burnt: HashSet::new(),
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn fill_pixel(&mut self, ix: usize, iy: usize) {
        if ix < self.width && iy < self.height {
            self.burnt.insert((iy, ix));
        }
    }

    /// 填充水平线段，`x_end`不包含
    pub(crate) fn fill_horizontal_line(&mut self, x_start: usize, x_end: usize, y: usize) {
        for x in x_start..x_end.min(self.width) {
            self.fill_pixel(x, y);
        }
    }

    /// 填充水平线段，两端都包含
    pub(crate) fn fill_span(&mut self, x_start: usize, x_end: usize, y: usize) {
        self.fill_horizontal_line(x_start, x_end + 1, y);
    }

    /// 填充垂直线段，两端都包含
    pub(crate) fn fill_column(&mut self, x: usize, y_start: usize, y_end: usize) {
        for y in y_start..=y_end.min(self.height.saturating_sub(1)) {
            self.fill_pixel(x, y);
        }
    }

    pub(crate) fn fill_linestring(&mut self, line_string: &LineString<f64>) {
        line_string
            .lines()
            .for_each(|line| rasterize_line(&line, self));
    }

    #[cfg(test)]
    pub(crate) fn burnt(&self) -> &HashSet<(usize, usize)> {
        &self.burnt
    }

    #[cfg(test)]
    pub(crate) fn for_tests(width: usize, height: usize) -> Self {
        Burner::new(width, height)
    }
}

/// 定义栅格化能力的特性
///
/// 每种几何类型把自己分解为采样点（或在追踪模式下分解为被触及的像素）
/// 并向网格累加权重。
pub trait Rasterize {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64);
}

/// 环的顶点，闭合环的重复终点不计
fn ring_vertices(line_string: &LineString<f64>) -> &[Coord<f64>] {
    let coords = &line_string.0[..];
    if coords.len() > 1 && line_string.is_closed() {
        &coords[..coords.len() - 1]
    } else {
        coords
    }
}

impl Rasterize for Coord<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        grid.render_coord(*self, weight);
    }
}

impl Rasterize for Point<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        grid.render_coord(self.0, weight);
    }
}

impl Rasterize for MultiPoint<f64> {
    /// 每个点独立贡献一次权重
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        self.iter().for_each(|point| point.rasterize(grid, weight));
    }
}

impl Rasterize for Line<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        match grid.sampling {
            Sampling::Vertices => {
                grid.render_coord(self.start, weight);
                grid.render_coord(self.end, weight);
            }
            Sampling::Traced => grid.trace(self, weight, rasterize_line),
        }
    }
}

impl Rasterize for LineString<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        match grid.sampling {
            Sampling::Vertices => ring_vertices(self)
                .iter()
                .for_each(|coord| grid.render_coord(*coord, weight)),
            Sampling::Traced if self.0.len() == 1 => grid.render_coord(self.0[0], weight),
            Sampling::Traced => grid.trace(self, weight, |ls, burner| burner.fill_linestring(ls)),
        }
    }
}

impl Rasterize for MultiLineString<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        self.iter()
            .for_each(|line_string| line_string.rasterize(grid, weight));
    }
}

impl Rasterize for Polygon<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        match grid.sampling {
            Sampling::Vertices => std::iter::once(self.exterior())
                .chain(self.interiors())
                .flat_map(ring_vertices)
                .for_each(|coord| grid.render_coord(*coord, weight)),
            Sampling::Traced => grid.trace(self, weight, |poly, burner| {
                rasterize_polygon(poly.exterior(), poly.interiors(), burner)
            }),
        }
    }
}

impl Rasterize for MultiPolygon<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        self.iter().for_each(|poly| poly.rasterize(grid, weight));
    }
}

impl Rasterize for Rect<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        self.to_polygon().rasterize(grid, weight);
    }
}

impl Rasterize for Triangle<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        self.to_polygon().rasterize(grid, weight);
    }
}

impl Rasterize for GeometryCollection<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        self.iter().for_each(|thing| thing.rasterize(grid, weight));
    }
}

impl Rasterize for Geometry<f64> {
    fn rasterize(&self, grid: &mut RenderingGrid, weight: f64) {
        match self {
            Geometry::Point(point) => point.rasterize(grid, weight),
            Geometry::Line(line) => line.rasterize(grid, weight),
            Geometry::LineString(ls) => ls.rasterize(grid, weight),
            Geometry::Polygon(poly) => poly.rasterize(grid, weight),
            Geometry::GeometryCollection(gc) => gc.rasterize(grid, weight),
            Geometry::MultiPoint(points) => points.rasterize(grid, weight),
            Geometry::MultiLineString(lines) => lines.rasterize(grid, weight),
            Geometry::MultiPolygon(polys) => polys.rasterize(grid, weight),
            Geometry::Rect(rect) => rect.rasterize(grid, weight),
            Geometry::Triangle(tri) => tri.rasterize(grid, weight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snap::Envelope;
    use geo::{line_string, polygon, MultiPoint};
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn grid(sampling: Sampling) -> RenderingGrid {
        let envelope = Envelope::new(0.0, 10.0, 0.0, 10.0).unwrap();
        RenderingGrid::new(GridSnap::new(envelope, 10, 10).unwrap(), sampling)
    }

    #[test]
    fn repeated_points_accumulate() {
        let mut g = grid(Sampling::Vertices);
        g.render(&Point::new(2.5, 3.5), 1.0);
        g.render(&Point::new(2.5, 3.5), 1.5);
        g.render(&Point::new(7.5, 3.5), 0.0);
        assert_eq!(g.size(), 2);
        assert_eq!(g.get(3, 2), Some(2.5));
        // 零权重也占用像素
        assert_eq!(g.get(3, 7), Some(0.0));
    }

    #[test]
    fn multipoint_counts_each_point() {
        let mut g = grid(Sampling::Vertices);
        let points: MultiPoint<f64> = vec![(1.5, 1.5), (1.6, 1.4), (9.0, 9.0)].into();
        g.render(&points, 2.0);
        assert_eq!(g.get(1, 1), Some(4.0));
        assert_eq!(g.get(9, 9), Some(2.0));
    }

    #[test]
    fn line_vertices() {
        let mut g = grid(Sampling::Vertices);
        g.render(&line_string![(x: 1., y: 1.), (x: 8., y: 8.)], 3.0);
        assert_eq!(g.iter().collect::<Vec<_>>(), vec![((1, 1), 3.0), ((8, 8), 3.0)]);
    }

    #[test]
    fn closed_rings_skip_repeated_vertex() {
        let mut g = grid(Sampling::Vertices);
        let poly = polygon![(x: 1., y: 1.), (x: 5., y: 1.), (x: 5., y: 5.), (x: 1., y: 1.)];
        g.render(&poly, 1.0);
        assert_eq!(g.get(1, 1), Some(1.0));
        assert_eq!(g.size(), 3);
    }

    #[test]
    fn empty_and_non_finite_geometries_are_ignored() {
        let mut g = grid(Sampling::Vertices);
        g.render(&MultiPoint::<f64>::new(vec![]), 1.0);
        g.render(&Point::new(f64::NAN, 1.0), 1.0);
        let mut traced = grid(Sampling::Traced);
        traced.render(&line_string![(x: 1., y: 1.), (x: f64::INFINITY, y: 8.)], 1.0);
        traced.render(&LineString::<f64>::new(vec![]), 1.0);
        assert!(g.is_empty());
        assert!(traced.is_empty());
    }

    #[test]
    fn traced_lines_count_each_pixel_once() {
        let envelope = Envelope::new(0.0, 5.0, 0.0, 5.0).unwrap();
        let mut g = RenderingGrid::new(GridSnap::new(envelope, 5, 5).unwrap(), Sampling::Traced);
        for line in [Line::new((0., 0.), (5., 5.)), Line::new((5., 0.), (0., 5.))] {
            g.render(&line, 1.0);
        }
        assert_eq!(
            g.to_array(),
            array![
                [1., 0., 0., 0., 1.],
                [0., 1., 0., 1., 1.],
                [0., 0., 2., 1., 0.],
                [0., 1., 1., 1., 0.],
                [1., 1., 0., 0., 1.]
            ]
        );
    }

    #[test]
    fn traced_polygon_fills_interior_once() {
        let mut g = grid(Sampling::Traced);
        let square = polygon![
            (x: 2., y: 2.), (x: 6., y: 2.), (x: 6., y: 6.), (x: 2., y: 6.), (x: 2., y: 2.)
        ];
        g.render(&square, 0.5);
        assert!(g.iter().all(|(_, weight)| weight == 0.5));
        for row in 2..6 {
            for col in 2..6 {
                assert_eq!(g.get(row, col), Some(0.5), "({row}, {col})");
            }
        }
        assert_eq!(g.get(1, 1), None);
        assert_eq!(g.get(7, 7), None);
    }

    #[test]
    fn traced_lines_on_max_edges_match_vertices() {
        let on_max_x = line_string![(x: 10., y: 2.), (x: 10., y: 8.)];
        let on_max_y = line_string![(x: 2., y: 10.), (x: 8., y: 10.)];

        let mut vertices = grid(Sampling::Vertices);
        vertices.render(&on_max_x, 1.0);
        assert_eq!(vertices.get(2, 9), Some(1.0));
        assert_eq!(vertices.get(8, 9), Some(1.0));

        let mut traced = grid(Sampling::Traced);
        traced.render(&on_max_x, 1.0);
        let cells: Vec<_> = traced.iter().map(|(cell, _)| cell).collect();
        assert_eq!(cells, (2..=8).map(|row| (row, 9)).collect::<Vec<_>>());

        let mut traced = grid(Sampling::Traced);
        traced.render(&on_max_y, 1.0);
        let cells: Vec<_> = traced.iter().map(|(cell, _)| cell).collect();
        assert_eq!(cells, (2..=8).map(|col| (9, col)).collect::<Vec<_>>());
    }

    #[test]
    fn geometry_dispatch_matches_concrete_types() {
        let shapes: Vec<Geometry<f64>> = vec![
            Point::new(0.5, 0.5).into(),
            Rect::new((1.5, 1.5), (3.5, 3.5)).into(),
            Triangle::new((5.5, 5.5).into(), (6.5, 5.5).into(), (6.5, 6.5).into()).into(),
        ];
        let mut dynamic = grid(Sampling::Vertices);
        let collection = GeometryCollection(shapes.clone());
        dynamic.render(&collection, 1.0);

        let mut concrete = grid(Sampling::Vertices);
        for shape in &shapes {
            concrete.render(shape, 1.0);
        }
        assert_eq!(dynamic, concrete);
        assert_eq!(dynamic.size(), 1 + 4 + 3);
    }
}
