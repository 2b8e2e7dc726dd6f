use proptest::prelude::*;

use crate::{codec, Envelope, GridSnap, RenderingGrid, Sampling};

fn snap(width: usize, height: usize) -> GridSnap {
    let envelope = Envelope::new(-180., 180., -90., 90.).unwrap();
    GridSnap::new(envelope, width, height).unwrap()
}

prop_compose! {
    /// 网格尺寸，以及落在网格内的若干像素和整数权重
    fn cells()(width in 1usize..300, height in 1usize..300)
        (cells in prop::collection::vec((0..height, 0..width, -8i32..64), 0..200),
         width in Just(width), height in Just(height))
        -> (usize, usize, Vec<(usize, usize, i32)>) {
        (width, height, cells)
    }
}

proptest! {
    #[test]
    fn encoded_grid_decodes_to_same_cells((width, height, cells) in cells()) {
        let mut grid = RenderingGrid::new(snap(width, height), Sampling::Vertices);
        for &(row, col, weight) in &cells {
            grid.add(row, col, weight as f64);
        }
        let blob = codec::encode(&grid);

        let mut decoded = grid.fresh();
        codec::decode_into(blob.clone(), &mut decoded).unwrap();
        prop_assert_eq!(&decoded, &grid);

        // 解码出的像素中心落回原像素
        let snap = *grid.snap();
        for (point, ((row, col), weight)) in codec::decode(blob, snap).zip(grid.iter()) {
            let point = point.unwrap();
            prop_assert_eq!(snap.to_pixel(point.x, point.y), (row, col));
            prop_assert_eq!(point.weight, weight);
        }
    }

    #[test]
    fn accumulation_is_order_independent(
        points in prop::collection::vec((-200f64..200., -100f64..100., 0u8..8), 0..100),
        seed in any::<u64>(),
    ) {
        let mut forward = RenderingGrid::new(snap(36, 18), Sampling::Vertices);
        for &(x, y, weight) in &points {
            forward.render(&geo::Point::new(x, y), weight as f64);
        }

        let mut shuffled = points.clone();
        let len = shuffled.len();
        if len > 1 {
            for i in 0..len {
                let j = (seed.rotate_left(i as u32) as usize ^ i) % len;
                shuffled.swap(i, j);
            }
        }
        let mut backward = forward.fresh();
        for &(x, y, weight) in shuffled.iter().rev() {
            backward.render(&geo::Point::new(x, y), weight as f64);
        }
        prop_assert_eq!(backward, forward);
    }

    #[test]
    fn pixel_lookup_never_leaves_grid(x in any::<f64>(), y in any::<f64>()) {
        let snap = snap(7, 3);
        let (row, col) = snap.to_pixel(x, y);
        prop_assert!(row < 3);
        prop_assert!(col < 7);
    }
}
