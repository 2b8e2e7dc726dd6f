use euclid::{Transform2D, UnknownUnit};
use serde::{Deserialize, Serialize};

use crate::{DensityError, Result};

/// 仿射变换，用于描述如何将世界空间坐标转换为连续的像素坐标。
/// 变换后x对应列，y对应行。
pub type Transform = Transform2D<f64, UnknownUnit, UnknownUnit>;

/// 被栅格化的矩形地理窗口
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Envelope {
    /// 创建包络范围
    ///
    /// # 错误
    /// 任一边界非有限，或者 `min_x >= max_x`、`min_y >= max_y` 时返回[DensityError::InvalidEnvelope]
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Result<Self> {
        let finite = [min_x, max_x, min_y, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x >= max_x || min_y >= max_y {
            return Err(DensityError::InvalidEnvelope);
        }
        Ok(Envelope {
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// 闭区间包含判断
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// 地理坐标与像素索引之间的映射
///
/// 列由x轴计算，行由y轴计算，第0行位于`min_y`一侧：
///
/// * `col = floor((x - min_x) / dx)`，`dx = (max_x - min_x) / width`
/// * `row = floor((y - min_y) / dy)`，`dy = (max_y - min_y) / height`
///
/// 边界策略是固定的：恰好落在`max_x`/`max_y`上的点归入最后一列/行，
/// 包络范围以外的坐标被截断到最近的边缘像素。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSnap {
    envelope: Envelope,
    width: usize,
    height: usize,
    dx: f64,
    dy: f64,
}

impl GridSnap {
    /// # 错误
    /// 宽度或高度为0时返回[DensityError::InvalidGrid]
    pub fn new(envelope: Envelope, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DensityError::InvalidGrid);
        }
        // 绕过`Envelope::new`构造的值同样要检查
        let envelope = Envelope::new(
            envelope.min_x,
            envelope.max_x,
            envelope.min_y,
            envelope.max_y,
        )?;
        Ok(GridSnap {
            envelope,
            width,
            height,
            dx: envelope.width() / width as f64,
            dy: envelope.height() / height as f64,
        })
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// 世界坐标到连续像素坐标的变换，不做截断
    pub fn geo_to_pix(&self) -> Transform {
        Transform::translation(-self.envelope.min_x, -self.envelope.min_y)
            .then_scale(1.0 / self.dx, 1.0 / self.dy)
    }

    /// x坐标所在的列
    pub fn col(&self, x: f64) -> usize {
        snap((x - self.envelope.min_x) / self.dx, self.width)
    }

    /// y坐标所在的行
    pub fn row(&self, y: f64) -> usize {
        snap((y - self.envelope.min_y) / self.dy, self.height)
    }

    /// 地理坐标到`(row, col)`像素索引
    pub fn to_pixel(&self, x: f64, y: f64) -> (usize, usize) {
        (self.row(y), self.col(x))
    }

    /// 列中心的x坐标
    pub fn x(&self, col: usize) -> f64 {
        self.envelope.min_x + (col as f64 + 0.5) * self.dx
    }

    /// 行中心的y坐标
    pub fn y(&self, row: usize) -> f64 {
        self.envelope.min_y + (row as f64 + 0.5) * self.dy
    }

    /// 像素中心的地理坐标`(x, y)`
    pub fn from_pixel(&self, row: usize, col: usize) -> (f64, f64) {
        (self.x(col), self.y(row))
    }
}

fn snap(offset: f64, cells: usize) -> usize {
    // NaN和负数都落到第0格
    if !(offset > 0.0) {
        return 0;
    }
    (offset.floor() as usize).min(cells - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::Point2D;
    use pretty_assertions::assert_eq;

    fn world(width: usize, height: usize) -> GridSnap {
        let envelope = Envelope::new(-180.0, 180.0, -90.0, 90.0).unwrap();
        GridSnap::new(envelope, width, height).unwrap()
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert_eq!(
            Envelope::new(1.0, 1.0, 0.0, 2.0),
            Err(DensityError::InvalidEnvelope)
        );
        assert_eq!(
            Envelope::new(0.0, f64::NAN, 0.0, 2.0),
            Err(DensityError::InvalidEnvelope)
        );
        let envelope = Envelope::new(0.0, 1.0, 0.0, 1.0).unwrap();
        assert_eq!(GridSnap::new(envelope, 0, 3), Err(DensityError::InvalidGrid));
        let inverted = Envelope {
            min_x: 5.0,
            max_x: 1.0,
            min_y: 0.0,
            max_y: 1.0,
        };
        assert_eq!(
            GridSnap::new(inverted, 3, 3),
            Err(DensityError::InvalidEnvelope)
        );
    }

    #[test]
    fn quadrants() {
        let snap = world(2, 2);
        assert_eq!(snap.to_pixel(-90.0, -45.0), (0, 0));
        assert_eq!(snap.to_pixel(90.0, -45.0), (0, 1));
        assert_eq!(snap.to_pixel(-90.0, 45.0), (1, 0));
        assert_eq!(snap.to_pixel(90.0, 45.0), (1, 1));
    }

    #[test]
    fn edges_and_outside_are_clamped() {
        let snap = world(4, 2);
        assert_eq!(snap.to_pixel(-180.0, -90.0), (0, 0));
        assert_eq!(snap.to_pixel(180.0, 90.0), (1, 3));
        assert_eq!(snap.to_pixel(0.0, 0.0), (1, 2));
        assert_eq!(snap.to_pixel(-500.0, 1000.0), (1, 0));
        assert_eq!(snap.to_pixel(f64::NAN, f64::NAN), (0, 0));
    }

    #[test]
    fn pixel_centers_snap_back() {
        let snap = world(7, 5);
        for row in 0..5 {
            for col in 0..7 {
                let (x, y) = snap.from_pixel(row, col);
                assert_eq!(snap.to_pixel(x, y), (row, col));
            }
        }
        assert_eq!(snap.from_pixel(0, 0), (-180.0 + 360.0 / 14.0, -90.0 + 18.0));
    }

    #[test]
    fn transform_matches_snapping() {
        let snap = world(360, 180);
        let pix = snap
            .geo_to_pix()
            .transform_point(Point2D::new(10.25, -20.75));
        assert_eq!((pix.y.floor() as usize, pix.x.floor() as usize), snap.to_pixel(10.25, -20.75));
    }
}
