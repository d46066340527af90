//! Region assignment: which tiles display a full-frame pixel
//!
//! A pixel always belongs to the tile of the cell it falls in. A pixel within
//! `overlap_margin` of the lower edge of its cell (left or top, away from the
//! frame origin edge) is also shown by the neighbouring tile on that side,
//! because that neighbour's overlap strip reaches across the edge. Near an
//! interior corner both edge conditions hold and the diagonal neighbour shows
//! the pixel too, so a pixel maps to 1, 2 or 4 tiles and never 3.

use std::fmt;

use super::TileGrid;
use crate::{FinderError, Result};

/// The tiles showing one pixel, sorted ascending, primary tile included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSet {
    primary: u32,
    ids: [u32; 4],
    len: usize,
}

impl RegionSet {
    fn new(primary: u32) -> Self {
        RegionSet {
            primary,
            ids: [primary, 0, 0, 0],
            len: 1,
        }
    }

    fn push(&mut self, tile_id: u32) {
        self.ids[self.len] = tile_id;
        self.len += 1;
        self.ids[..self.len].sort_unstable();
    }

    /// The tile whose cell holds the pixel
    pub fn primary(&self) -> u32 {
        self.primary
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; every pixel has a primary tile
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, tile_id: u32) -> bool {
        self.as_slice().contains(&tile_id)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ids[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.as_slice().iter().copied()
    }
}

impl fmt::Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.iter().map(|id| id.to_string()).collect();
        write!(f, "{{{}}}", ids.join(", "))
    }
}

impl TileGrid {
    /// Tiles that should display the full-frame pixel `(x, y)`
    ///
    /// # Errors
    ///
    /// `FinderError::RegionAssignment` when the pixel is off the frame or a
    /// computed tile id falls outside [1, rows * cols].
    pub fn assign_regions(&self, x: i64, y: i64) -> Result<RegionSet> {
        if !self.contains(x, y) {
            return Err(FinderError::RegionAssignment(format!(
                "pixel ({}, {}) is outside the {}x{} frame",
                x, y, self.width, self.height
            )));
        }

        let (px, py) = (x as u32, y as u32);
        let (row, col) = self.cell_of(px, py);

        // Offsets are taken inside the clamped cell, so pixels in the
        // oversized last row/column never look like they sit on an edge.
        let offset_x = px - col * self.tile_nominal_size;
        let offset_y = py - row * self.tile_nominal_size;
        let overlap_x = col > 0 && offset_x <= self.overlap_margin;
        let overlap_y = row > 0 && offset_y <= self.overlap_margin;

        let mut regions = RegionSet::new(self.tile_id(row, col));
        if overlap_x {
            regions.push(self.tile_id(row, col - 1));
        }
        if overlap_y {
            regions.push(self.tile_id(row - 1, col));
        }
        if overlap_x && overlap_y {
            regions.push(self.tile_id(row - 1, col - 1));
        }

        for tile_id in regions.iter() {
            self.check_tile_id(tile_id).map_err(|_| {
                FinderError::RegionAssignment(format!(
                    "pixel ({}, {}) mapped to tile {} outside [1,{}]",
                    x,
                    y,
                    tile_id,
                    self.tile_count()
                ))
            })?;
        }
        Ok(regions)
    }
}

/// Tiles that should display the full-frame pixel `(x, y)` on `grid`
pub fn assign_regions(grid: &TileGrid, x: i64, y: i64) -> Result<RegionSet> {
    grid.assign_regions(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn grid() -> TileGrid {
        TileGrid::default()
    }

    #[test]
    fn test_every_pixel_maps_to_valid_tiles() {
        let grid = grid();
        for y in (0..grid.height as i64).step_by(3) {
            for x in (0..grid.width as i64).step_by(3) {
                let regions = grid.assign_regions(x, y).unwrap();
                assert!(!regions.is_empty());
                assert!(
                    matches!(regions.len(), 1 | 2 | 4),
                    "pixel ({}, {}) mapped to {}",
                    x,
                    y,
                    regions
                );
                for tile_id in regions.iter() {
                    assert!((1..=12).contains(&tile_id));
                    let (lx, ly) = grid.local_coordinate(tile_id, x, y).unwrap();
                    assert!(lx < grid.tile_size() && ly < grid.tile_size());
                }
                assert!(regions.contains(regions.primary()));
            }
        }
    }

    #[test]
    fn test_frame_edges_and_corners() {
        let grid = grid();
        for &(x, y) in &[(0, 0), (1724, 0), (0, 1299), (1724, 1299)] {
            let regions = grid.assign_regions(x, y).unwrap();
            assert_eq!(regions.len(), 1, "corner ({}, {})", x, y);
        }
    }

    #[rstest]
    #[case(200, 200, 1)]
    #[case(600, 200, 2)]
    #[case(200, 600, 5)]
    #[case(1500, 1100, 12)]
    #[case(1720, 1295, 12)]
    fn test_interior_pixels_map_to_one_tile(#[case] x: i64, #[case] y: i64, #[case] tile: u32) {
        let regions = grid().assign_regions(x, y).unwrap();
        assert_eq!(regions.as_slice(), &[tile]);
        assert_eq!(regions.primary(), tile);
    }

    #[test]
    fn test_vertical_boundary_maps_to_two_adjacent_columns() {
        let grid = grid();
        for x in [425, 440, 450, 850, 875, 1275, 1300] {
            let regions = grid.assign_regions(x, 200).unwrap();
            assert_eq!(regions.len(), 2, "x = {}", x);
            let cols: Vec<u32> = regions
                .iter()
                .map(|id| grid.tile_position(id).unwrap().1)
                .collect();
            assert_eq!(cols[1] - cols[0], 1);
        }
        // One past the margin is interior again
        assert_eq!(grid.assign_regions(451, 200).unwrap().len(), 1);
    }

    #[test]
    fn test_horizontal_boundary_maps_to_two_adjacent_rows() {
        let grid = grid();
        let regions = grid.assign_regions(200, 430).unwrap();
        assert_eq!(regions.as_slice(), &[1, 5]);

        let regions = grid.assign_regions(200, 860).unwrap();
        assert_eq!(regions.as_slice(), &[5, 9]);
    }

    #[rstest]
    #[case(425, 425, [1, 2, 5, 6])]
    #[case(440, 440, [1, 2, 5, 6])]
    #[case(870, 860, [6, 7, 10, 11])]
    #[case(1290, 850, [7, 8, 11, 12])]
    fn test_interior_corner_maps_to_four_tiles(
        #[case] x: i64,
        #[case] y: i64,
        #[case] expected: [u32; 4],
    ) {
        let regions = grid().assign_regions(x, y).unwrap();
        assert_eq!(regions.as_slice(), &expected);
    }

    #[test]
    fn test_overlap_neighbour_scenario() {
        // 430 mod 425 = 5 <= 25 and the pixel is in the second column
        let regions = assign_regions(&grid(), 430, 10).unwrap();
        assert_eq!(regions.primary(), 2);
        assert_eq!(regions.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_clamped_last_row_does_not_fake_an_edge() {
        // y = 1280 is past 3 * 425 but belongs to the last row's cell interior
        let regions = grid().assign_regions(200, 1280).unwrap();
        assert_eq!(regions.as_slice(), &[9]);
    }

    #[rstest]
    #[case(-1, 10)]
    #[case(10, -1)]
    #[case(1725, 10)]
    #[case(10, 1300)]
    fn test_off_frame_pixels_are_rejected(#[case] x: i64, #[case] y: i64) {
        assert!(matches!(
            grid().assign_regions(x, y),
            Err(FinderError::RegionAssignment(_))
        ));
    }

    #[test]
    fn test_display() {
        let regions = grid().assign_regions(430, 10).unwrap();
        assert_eq!(regions.to_string(), "{1, 2}");
    }
}
