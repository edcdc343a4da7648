//! Thin edge map with quantized gradient directions.

use nalgebra::Vector2;
use qyoo_core::ImageError;
use serde::{Deserialize, Serialize};

/// Gradient direction quantized to 8 sectors of 45°.
///
/// Image axes: x right, y down. The direction points from dark to light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
    ];

    /// Quantize a gradient vector. A zero gradient reads as `East`.
    pub fn from_gradient(gx: f32, gy: f32) -> Self {
        let sector = gy.atan2(gx) / std::f32::consts::FRAC_PI_4;
        let idx = (sector.round() as i32).rem_euclid(8);
        Self::from_index(idx as u8)
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_index(i: u8) -> Self {
        Self::ALL[(i % 8) as usize]
    }

    /// Pixel step `(dx, dy)` along this direction.
    #[inline]
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        Self::from_index(self.index() + 4)
    }

    /// True for East/West, i.e. a gradient across a vertical edge.
    #[inline]
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::East | Direction::West)
    }

    #[inline]
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    pub fn unit_vector(self) -> Vector2<f32> {
        let a = self.index() as f32 * std::f32::consts::FRAC_PI_4;
        Vector2::new(a.cos(), a.sin())
    }

    /// Oriented angle in `[0, pi]` between this direction and `v`.
    pub fn angle_to(self, v: Vector2<f32>) -> f32 {
        let n = v.norm();
        if n <= f32::EPSILON {
            return std::f32::consts::PI;
        }
        (self.unit_vector().dot(&v) / n).clamp(-1.0, 1.0).acos()
    }
}

/// Binary edge map; every edge pixel keeps its gradient direction.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeMap {
    width: usize,
    height: usize,
    cells: Vec<Option<Direction>>,
}

impl EdgeMap {
    /// Empty map of the given size.
    pub fn new(width: usize, height: usize) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            cells: vec![None; width * height],
        })
    }

    pub(crate) fn from_cells(width: usize, height: usize, cells: Vec<Option<Direction>>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self {
            width,
            height,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<Direction> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells[y * self.width + x]
    }

    #[inline]
    pub fn get_signed(&self, x: i32, y: i32) -> Option<Direction> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize)
    }

    #[inline]
    pub fn is_edge(&self, x: usize, y: usize) -> bool {
        self.get(x, y).is_some()
    }

    /// Mark or clear a pixel. Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, dir: Option<Direction>) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = dir;
        }
    }

    pub fn edge_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Edge pixels in row-major order.
    pub fn iter_edges(&self) -> impl Iterator<Item = (usize, usize, Direction)> + '_ {
        let w = self.width;
        self.cells
            .iter()
            .enumerate()
            .filter_map(move |(i, c)| c.map(|d| (i % w, i / w, d)))
    }

    /// Distance from `(x, y)` to the nearest edge pixel within the square
    /// window of `radius` whose direction satisfies `accept`.
    pub fn nearest_matching(
        &self,
        x: f32,
        y: f32,
        radius: usize,
        accept: impl Fn(Direction) -> bool,
    ) -> Option<f32> {
        let r = radius as i32;
        let cx = x.round() as i32;
        let cy = y.round() as i32;
        let mut best: Option<f32> = None;
        for dy in -r..=r {
            for dx in -r..=r {
                let (px, py) = (cx + dx, cy + dy);
                let Some(dir) = self.get_signed(px, py) else {
                    continue;
                };
                if !accept(dir) {
                    continue;
                }
                let d = ((px as f32 - x).powi(2) + (py as f32 - y).powi(2)).sqrt();
                if best.is_none_or(|b| d < b) {
                    best = Some(d);
                }
            }
        }
        best
    }

    /// 8-bit mask, 255 on edge pixels.
    pub fn to_mask(&self) -> Vec<u8> {
        self.cells
            .iter()
            .map(|c| if c.is_some() { 255 } else { 0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quantization_follows_screen_axes() {
        assert_eq!(Direction::from_gradient(1.0, 0.0), Direction::East);
        assert_eq!(Direction::from_gradient(0.0, 1.0), Direction::South);
        assert_eq!(Direction::from_gradient(-1.0, 0.1), Direction::West);
        assert_eq!(Direction::from_gradient(1.0, -1.0), Direction::NorthEast);
        assert_eq!(Direction::from_gradient(0.0, 0.0), Direction::East);
        assert_eq!(Direction::SouthEast.opposite(), Direction::NorthWest);
        assert_eq!(Direction::North.offset(), (0, -1));
    }

    #[test]
    fn nearest_matching_filters_by_direction() {
        let mut map = EdgeMap::new(10, 10).unwrap();
        map.set(5, 5, Some(Direction::East));
        map.set(4, 5, Some(Direction::West));
        let d = map
            .nearest_matching(4.2, 5.0, 2, |dir| dir == Direction::East)
            .unwrap();
        assert_relative_eq!(d, 0.8, epsilon = 1e-5);
        assert!(map.nearest_matching(0.0, 0.0, 2, |_| true).is_none());
        assert_eq!(map.edge_count(), 2);
        let edges: Vec<_> = map.iter_edges().collect();
        assert_eq!(edges[0], (4, 5, Direction::West));
    }
}
