use std::iter::once;

use geo::{coords_iter::CoordsIter, winding_order::Winding, LineString, Point};
use itertools::Itertools;

use crate::grid::Burner;

/// 所有环顶点的像素行号
///
/// # 参数
/// * `first` - 外环
/// * `rest` - 内环（孔洞）
fn y_coordinates<'a>(
    first: &'a LineString<f64>,
    rest: &'a [LineString<f64>],
) -> impl Iterator<Item = isize> + 'a {
    once(first)
        .chain(rest)
        .flat_map(|line_string| line_string.points().map(|point| point.y().floor() as isize))
}

/// 线段的两个端点
type PointPair = (Point<f64>, Point<f64>);

/// 把所有环按顺时针方向拆成相邻点对
///
/// 每个环都统一成顺时针，扫描线求交时不必区分外环和孔洞。
fn into_pointpairs(first: &LineString<f64>, rest: &[LineString<f64>]) -> Vec<PointPair> {
    let num_pairs = once(first)
        .chain(rest)
        .map(|ls| ls.0.len().saturating_sub(1))
        .sum();
    let mut result = Vec::with_capacity(num_pairs);

    // 逆时针的环反向遍历
    for ls in once(first).chain(rest) {
        if ls.is_cw() {
            result.extend(ls.points().tuple_windows::<PointPair>());
        } else {
            result.extend(ls.points().rev().tuple_windows::<PointPair>());
        }
    }

    result
}

/// 扫描线填充像素空间中的多边形（孔洞除外），然后追踪所有环的边界
///
/// # 参数
/// * `first` - 外环，坐标已变换到像素空间
/// * `rest` - 内环（孔洞）
/// * `burner` - 收集被触及像素的容器
///
/// # 说明
/// 参考GDAL的`GDALdllImageFilledPolygon`，扫描线穿过每一行的中心。
/// 主要步骤:
/// 1. 由所有顶点求出覆盖的行范围，并截断到网格内
/// 2. 逐行求扫描线与每条边的交点
/// 3. 水平边直接填充
/// 4. 交点排序后两两配对，填充每对之间的像素
/// 5. 最后追踪所有环的边界，使贴边的像素不被遗漏
///
/// 网格以外的部分被裁剪掉。同一像素在一个多边形内只记录一次。
pub(crate) fn rasterize_polygon(
    first: &LineString<f64>,
    rest: &[LineString<f64>],
    burner: &mut Burner,
) {
    // 环必须闭合，否则点对会漏掉最后一条边
    debug_assert!(first.is_closed() && rest.iter().all(|ls| ls.is_closed()));

    // 交点个数不会超过顶点总数
    let total_points = first.coords_count()
        + rest
            .iter()
            .map(|line_string| line_string.coords_count())
            .sum::<usize>();
    // 覆盖的行范围；空多边形没有顶点
    let (Some(min_y), Some(max_y)) = (
        y_coordinates(first, rest).min(),
        y_coordinates(first, rest).max(),
    ) else {
        return;
    };
    let min_y = min_y.max(0);
    let max_y = max_y.min(burner.height() as isize - 1);
    let min_x = 0;
    let max_x = burner.width() - 1;

    let mut xs: Vec<isize> = Vec::with_capacity(total_points);
    let cw_points = into_pointpairs(first, rest);

    for y in min_y..=max_y {
        // 扫描线的中心高度
        let dy = 0.5 + (y as f64);

        // 逐条边求交
        for (ind1, ind2) in cw_points.iter() {
            let mut dy1 = ind1.y();
            let mut dy2 = ind2.y();

            // 边完全在扫描线上方或下方
            if (dy1 < dy && dy2 < dy) || (dy1 > dy && dy2 > dy) {
                continue;
            }

            // 让(dx1, dy1)成为较低的端点
            let (dx1, dx2) = if dy1 < dy2 {
                (ind1.x(), ind2.x())
            } else if dy1 > dy2 {
                std::mem::swap(&mut dy1, &mut dy2);
                (ind2.x(), ind1.x())
            } else {
                // 水平边
                if ind1.x() > ind2.x() {
                    let horizontal_x1 = (ind2.x() + 0.5).floor() as isize;
                    let horizontal_x2 = (ind1.x() + 0.5).floor() as isize;
                    if horizontal_x1 > (max_x as isize) || horizontal_x2 <= min_x {
                        continue;
                    }
                    burner.fill_horizontal_line(
                        horizontal_x1.max(0) as usize,
                        horizontal_x2 as usize,
                        y as usize,
                    );
                }
                continue;
            };

            // 半开区间，避免顶点处被两条边重复计数
            if dy < dy2 && dy >= dy1 {
                let intersect = (dy - dy1) * (dx2 - dx1) / (dy2 - dy1) + dx1;
                xs.push((intersect + 0.5).floor() as isize);
            }
        }

        // 交点两两配对，夹在中间的像素在多边形内
        xs.sort_unstable();
        for pair in xs[..].chunks_exact(2) {
            let x_start = pair[0].max(min_x);
            let x_end = pair[1].min((max_x + 1) as isize);
            if x_start <= (max_x as isize) && x_end > min_x {
                burner.fill_horizontal_line(x_start as usize, x_end as usize, y as usize);
            }
        }
        xs.clear();
    }

    // 边界
    once(first)
        .chain(rest)
        .for_each(|ls| burner.fill_linestring(ls));
}
