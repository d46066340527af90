//! Display tile grid
//!
//! A full-frame exposure is cut into `rows x cols` display tiles. Tile cells
//! start every `tile_nominal_size` pixels and each tile extends
//! `overlap_margin` pixels past its cell into the next one, so neighbouring
//! tiles share a strip of pixels. The last row and column absorb whatever is
//! left of the frame.
//!
//! Tiles are numbered row-major from the frame origin:
//! `tile_id = row * cols + col + 1`. [`TileGrid::tile_id`] is the only place
//! this formula lives.

use serde::{Deserialize, Serialize};

use crate::{FinderError, Result};

pub mod regions;

pub use regions::{assign_regions, RegionSet};

/// Inclusive full-frame pixel bounds of one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileBounds {
    /// Check whether a full-frame pixel lies inside these bounds
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x_min as i64
            && x <= self.x_max as i64
            && y >= self.y_min as i64
            && y <= self.y_max as i64
    }
}

/// Static description of how a full frame is partitioned into tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    /// Number of tile rows (R)
    pub rows: u32,
    /// Number of tile columns (C)
    pub cols: u32,
    /// Cell pitch in pixels (S)
    pub tile_nominal_size: u32,
    /// Shared strip past each interior cell edge (M)
    pub overlap_margin: u32,
    /// Full-frame width in pixels
    pub width: u32,
    /// Full-frame height in pixels
    pub height: u32,
    /// Expected number of tiles, checked against `rows * cols` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_count: Option<u32>,
}

impl Default for TileGrid {
    /// The WFPC2 wide-field layout: 12 tiles of 425 pixels with a 25 pixel margin
    fn default() -> Self {
        TileGrid {
            rows: 3,
            cols: 4,
            tile_nominal_size: 425,
            overlap_margin: 25,
            width: 1725,
            height: 1300,
            tile_count: Some(12),
        }
    }
}

impl TileGrid {
    /// Build and validate a grid
    pub fn new(
        rows: u32,
        cols: u32,
        tile_nominal_size: u32,
        overlap_margin: u32,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let grid = TileGrid {
            rows,
            cols,
            tile_nominal_size,
            overlap_margin,
            width,
            height,
            tile_count: None,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Check that the grid is self-consistent and covers the frame
    ///
    /// Every pixel of the frame must land in exactly one cell, and the last
    /// row and column may not run past a full tile, otherwise local tile
    /// coordinates could exceed the tile size.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(FinderError::InvalidGrid(format!(
                "rows and cols must be positive, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.tile_nominal_size == 0 {
            return Err(FinderError::InvalidGrid(
                "tile_nominal_size must be positive".to_string(),
            ));
        }
        if self.overlap_margin == 0 {
            return Err(FinderError::InvalidGrid(
                "overlap_margin must be positive".to_string(),
            ));
        }
        if self.overlap_margin >= self.tile_nominal_size {
            return Err(FinderError::InvalidGrid(format!(
                "overlap_margin {} must be smaller than tile_nominal_size {}",
                self.overlap_margin, self.tile_nominal_size
            )));
        }

        let tiles = self.rows.checked_mul(self.cols).ok_or_else(|| {
            FinderError::InvalidGrid(format!("{}x{} tiles overflow", self.rows, self.cols))
        })?;
        if let Some(expected) = self.tile_count {
            if expected != tiles {
                return Err(FinderError::InvalidGrid(format!(
                    "{} rows x {} cols gives {} tiles, expected {}",
                    self.rows, self.cols, tiles, expected
                )));
            }
        }

        if self.checked_tile_size().is_none() {
            return Err(FinderError::InvalidGrid(format!(
                "tile_nominal_size {} plus overlap_margin {} overflows",
                self.tile_nominal_size, self.overlap_margin
            )));
        }

        self.check_axis("width", self.width, self.cols)?;
        self.check_axis("height", self.height, self.rows)?;
        Ok(())
    }

    fn check_axis(&self, name: &str, extent: u32, cells: u32) -> Result<()> {
        let last_start = (cells as u64 - 1) * self.tile_nominal_size as u64;
        if extent as u64 <= last_start {
            return Err(FinderError::InvalidGrid(format!(
                "{} {} leaves the last of {} cells empty (cells start every {} pixels)",
                name, extent, cells, self.tile_nominal_size
            )));
        }
        if extent as u64 - last_start > self.tile_size() as u64 {
            return Err(FinderError::InvalidGrid(format!(
                "{} {} overflows the last cell: {} pixels past {} exceeds tile size {}",
                name,
                extent,
                extent as u64 - last_start,
                last_start,
                self.tile_size()
            )));
        }
        Ok(())
    }

    /// Number of tiles, `rows * cols`
    pub fn tile_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// Edge length of a tile in pixels: the cell plus its inclusive overlap strip
    ///
    /// Saturates on grids that [`TileGrid::validate`] rejects.
    pub fn tile_size(&self) -> u32 {
        self.checked_tile_size().unwrap_or(u32::MAX)
    }

    fn checked_tile_size(&self) -> Option<u32> {
        self.tile_nominal_size
            .checked_add(self.overlap_margin)?
            .checked_add(1)
    }

    /// The one tile numbering formula
    pub fn tile_id(&self, row: u32, col: u32) -> u32 {
        row * self.cols + col + 1
    }

    /// Row and column of a tile id
    pub fn tile_position(&self, tile_id: u32) -> Result<(u32, u32)> {
        self.check_tile_id(tile_id)?;
        let index = tile_id - 1;
        Ok((index / self.cols, index % self.cols))
    }

    /// Fail unless `tile_id` is in [1, rows * cols]
    pub fn check_tile_id(&self, tile_id: u32) -> Result<()> {
        if tile_id == 0 || tile_id > self.tile_count() {
            return Err(FinderError::RegionAssignment(format!(
                "tile id {} is not in [1,{}]",
                tile_id,
                self.tile_count()
            )));
        }
        Ok(())
    }

    /// Check whether a full-frame pixel lies on the frame
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    /// Cell holding a full-frame pixel, clamped to the last row and column
    ///
    /// Callers are expected to check [`TileGrid::contains`] first.
    pub fn cell_of(&self, x: u32, y: u32) -> (u32, u32) {
        let row = (y / self.tile_nominal_size).min(self.rows - 1);
        let col = (x / self.tile_nominal_size).min(self.cols - 1);
        (row, col)
    }

    /// Full-frame bounds of a tile, overlap strip included
    pub fn tile_bounds(&self, tile_id: u32) -> Result<TileBounds> {
        let (row, col) = self.tile_position(tile_id)?;
        let (x_min, x_max) = self.span(col, self.cols, self.width);
        let (y_min, y_max) = self.span(row, self.rows, self.height);
        Ok(TileBounds {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    fn span(&self, index: u32, cells: u32, extent: u32) -> (u32, u32) {
        let start = index * self.tile_nominal_size;
        let end = if index + 1 < cells {
            start
                .saturating_add(self.tile_nominal_size)
                .saturating_add(self.overlap_margin)
        } else {
            extent - 1
        };
        (start, end.min(extent - 1))
    }

    /// Full-frame pixel of a tile's local origin
    pub fn tile_origin(&self, tile_id: u32) -> Result<(u32, u32)> {
        let bounds = self.tile_bounds(tile_id)?;
        Ok((bounds.x_min, bounds.y_min))
    }

    /// Convert a full-frame pixel to coordinates local to a tile
    ///
    /// # Errors
    ///
    /// `FinderError::RegionAssignment` when the pixel is not covered by the tile.
    pub fn local_coordinate(&self, tile_id: u32, x: i64, y: i64) -> Result<(u32, u32)> {
        let bounds = self.tile_bounds(tile_id)?;
        if !bounds.contains(x, y) {
            return Err(FinderError::RegionAssignment(format!(
                "pixel ({}, {}) is outside tile {} {:?}",
                x, y, tile_id, bounds
            )));
        }
        let local_x = (x - bounds.x_min as i64) as u32;
        let local_y = (y - bounds.y_min as i64) as u32;
        debug_assert!(local_x < self.tile_size() && local_y < self.tile_size());
        Ok((local_x, local_y))
    }
}
