//! 密度网格的二进制编码。
//!
//! ```text
//! blob      := row_entry*
//! row_entry := row_index:varint  col_count:varint  col_entry{col_count}
//! col_entry := col_index:varint  weight:f64
//! ```
//!
//! varint是无符号LEB128（与protobuf相同），权重是大端序IEEE-754双精度浮点数。
//! 没有长度前缀和终止符，输入耗尽即结束。行和列都按升序写出，
//! 因此相同的网格总是得到相同的字节。
use std::iter::FusedIterator;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use itertools::Itertools;
use prost::encoding::{decode_varint, encode_varint};

use crate::{grid::RenderingGrid, snap::GridSnap, DensityError, Result};

/// 解码出的一个像素：像素中心坐标和累计权重
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityPoint {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}

/// 把网格编码为字节
pub fn encode(grid: &RenderingGrid) -> Bytes {
    // 稀疏网格的典型开销：列号1-2字节、权重8字节
    let mut buf = BytesMut::with_capacity(grid.size() * 10);
    let mut columns = Vec::new();
    for (row, cells) in &grid.iter().chunk_by(|((row, _), _)| *row) {
        columns.clear();
        columns.extend(cells.map(|((_, col), weight)| (col, weight)));
        encode_varint(row as u64, &mut buf);
        encode_varint(columns.len() as u64, &mut buf);
        for &(col, weight) in &columns {
            encode_varint(col as u64, &mut buf);
            buf.put_f64(weight);
        }
    }
    buf.freeze()
}

/// 惰性解码，使用编码时相同的包络范围和分辨率
///
/// 返回的迭代器只能向前遍历一次；重新遍历需要再次调用`decode`。
pub fn decode<B: Buf>(blob: B, snap: GridSnap) -> DensityPoints<B> {
    DensityPoints {
        buf: blob,
        snap,
        row: 0,
        y: 0.0,
        remaining: 0,
        failed: false,
    }
}

/// 把解码结果按像素累加进已有网格
///
/// 网格必须与编码时使用相同的分辨率。
///
/// # 错误
/// 数据被截断或损坏时返回[DensityError::Malformed]，此时网格保持不变。
pub fn decode_into<B: Buf>(blob: B, grid: &mut RenderingGrid) -> Result<()> {
    let mut points = decode(blob, *grid.snap());
    let mut cells = Vec::new();
    while let Some(cell) = points.next_cell()? {
        cells.push(cell);
    }
    for (row, col, weight) in cells {
        grid.add(row, col, weight);
    }
    Ok(())
}

/// [decode]返回的惰性像素序列
///
/// 第一个错误之后迭代结束。
#[derive(Debug)]
pub struct DensityPoints<B> {
    buf: B,
    snap: GridSnap,
    row: usize,
    /// 当前行中心的y坐标
    y: f64,
    /// 当前行剩余的列数
    remaining: u64,
    failed: bool,
}

impl<B: Buf> DensityPoints<B> {
    fn read_index(&mut self, what: &str, limit: usize) -> Result<usize> {
        let value = decode_varint(&mut self.buf)
            .map_err(|e| DensityError::Malformed(format!("{what}: {e}")))?;
        match usize::try_from(value) {
            Ok(index) if index < limit => Ok(index),
            _ => Err(DensityError::Malformed(format!(
                "{what}索引{value}超出范围0..{limit}"
            ))),
        }
    }

    fn next_cell(&mut self) -> Result<Option<(usize, usize, f64)>> {
        while self.remaining == 0 {
            if !self.buf.has_remaining() {
                return Ok(None);
            }
            self.row = self.read_index("row", self.snap.height())?;
            self.y = self.snap.y(self.row);
            self.remaining = decode_varint(&mut self.buf)
                .map_err(|e| DensityError::Malformed(format!("column count: {e}")))?;
        }
        let col = self.read_index("column", self.snap.width())?;
        if self.buf.remaining() < 8 {
            return Err(DensityError::Malformed(format!(
                "权重需要8字节，只剩{}字节",
                self.buf.remaining()
            )));
        }
        let weight = self.buf.get_f64();
        self.remaining -= 1;
        Ok(Some((self.row, col, weight)))
    }
}

impl<B: Buf> Iterator for DensityPoints<B> {
    type Item = Result<DensityPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_cell() {
            Ok(Some((_, col, weight))) => Some(Ok(DensityPoint {
                x: self.snap.x(col),
                y: self.y,
                weight,
            })),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<B: Buf> FusedIterator for DensityPoints<B> {}
