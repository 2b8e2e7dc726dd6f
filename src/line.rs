use geo::Line;

use crate::grid::Burner;

/// 把像素空间坐标换算为索引
///
/// 恰好落在网格上边缘（`v == size`）的坐标归入最后一格，与[crate::GridSnap]一致；
/// 其余越界值原样返回，由调用方判断是否裁剪。
fn edge_index(v: f64, size: usize) -> isize {
    if v == size as f64 {
        size as isize - 1
    } else {
        v.floor() as isize
    }
}

/// 将像素空间中的线段追踪为被触及的像素
///
/// 坐标已经变换到像素空间：x对应列，y对应行。
///
/// # 参数
/// * `line` - 像素空间中的线段
/// * `burner` - 收集被触及像素的容器
///
/// # 说明
/// 落在网格外的部分被裁剪而不是截断到边缘像素；位于`maxX`/`maxY`边上的线段
/// 仍然落入最后一列/行。
pub(crate) fn rasterize_line(line: &Line<f64>, burner: &mut Burner) {
    // 网格尺寸
    let width = burner.width() as f64;
    let height = burner.height() as f64;

    // 完全在网格外的线段直接跳过
    if (line.start.y < 0. && line.end.y < 0.)
        || (line.start.y > height && line.end.y > height)
        || (line.start.x < 0. && line.end.x < 0.)
        || (line.start.x > width && line.end.x > width)
    {
        return;
    }

    // 从左向右处理，必要时交换端点
    let line = if line.start.x > line.end.x {
        Line::new(line.end, line.start)
    } else {
        *line
    };

    // 落在同一列/行，或者近似平行于坐标轴的线段走特殊路径
    const THRESHOLD: f64 = 0.01;
    let is_vertical = (line.start.x.floor() == line.end.x.floor()) || line.dx().abs() < THRESHOLD;
    let is_horizontal = (line.start.y.floor() == line.end.y.floor()) || line.dy().abs() < THRESHOLD;

    if is_vertical {
        // 垂直线段：保证y_start不大于y_end
        let (y_start, y_end) = if line.start.y > line.end.y {
            (line.end.y, line.start.y)
        } else {
            (line.start.y, line.end.y)
        };
        // 所在列必须在网格内
        let ix = edge_index(line.end.x, burner.width());
        if ix < 0 || ix >= (burner.width() as isize) {
            return;
        }

        // 把行范围限制在网格内；负数转换为usize时饱和到0
        let last_row = burner.height() - 1;
        let y_start = (y_start.floor() as usize).min(last_row);
        let y_end = (y_end.floor() as usize).min(last_row);
        burner.fill_column(ix as usize, y_start, y_end);
    } else if is_horizontal {
        // 水平线段：端点已经按x排序，所在行必须在网格内
        let iy = edge_index(line.start.y, burner.height());
        if iy < 0 || iy >= (burner.height() as isize) {
            return;
        }

        // 把列范围限制在网格内
        let last_col = burner.width() - 1;
        let x_start = (line.start.x.floor() as usize).min(last_col);
        let x_end = (line.end.x.floor() as usize).min(last_col);
        burner.fill_span(x_start, x_end, iy as usize);
    } else {
        // 一般斜线
        let slope = line.slope();
        let (mut x_start, mut y_start) = line.start.x_y();
        let (mut x_end, mut y_end) = line.end.x_y();

        // 在x方向裁剪
        if x_end > width {
            y_end -= (x_end - width) * slope;
            x_end = width;
        }
        if x_start < 0. {
            y_start += (0. - x_start) * slope;
            x_start = 0.;
        }

        // 在y方向裁剪
        if y_end > y_start {
            // 向上倾斜
            if y_start < 0. {
                x_start += -y_start / slope;
                y_start = 0.;
            }
            if y_end >= height {
                x_end += (y_end - height) / slope;
            }
        } else {
            // 向下倾斜
            if y_start >= height {
                x_start += (height - y_start) / slope;
                y_start = height;
            }
            if y_end < 0. {
                x_end -= y_end / slope;
            }
        }

        // 逐像素前进，每一步走到下一条列边界或行边界中较近的一条
        while (x_start >= 0.) && (x_start < x_end) {
            let ix = x_start.floor() as isize;
            let iy = y_start.floor() as isize;

            if iy >= 0 && ((iy as usize) < burner.height()) {
                burner.fill_pixel(ix as usize, iy as usize);
            }

            // 先假设走到下一条列边界
            let mut x_step = (x_start + 1.).floor() - x_start;
            let mut y_step = x_step * slope;

            if ((y_start + y_step).floor() as isize) == iy {
                // 仍在当前扫描线上
            } else if slope < 0. {
                // 先穿过下方的行边界
                const STEP_THRESHOLD: f64 = -0.000000001;
                y_step = ((iy as f64) - y_start).min(STEP_THRESHOLD);
                x_step = y_step / slope;
            } else {
                // 先穿过上方的行边界
                const STEP_THRESHOLD: f64 = 0.000000001;
                y_step = (((iy + 1) as f64) - y_start).max(STEP_THRESHOLD);
                x_step = y_step / slope;
            }

            x_start += x_step;
            y_start += y_step;
        }
    }
}
