use crate::{
    arena::Handle,
    common::{Color, Tile, TileIdx},
    error::{Error, Result},
    tileset::Tileset,
};

/// Grid of tiles, row-major.
#[derive(Clone, Debug)]
pub struct Tilemap {
    rows: usize,
    cols: usize,
    tiles: Vec<Tile>,
    bg_color: Option<Color>,
    tileset: Option<Handle<Tileset>>,
}

impl Tilemap {
    /// An empty `tiles` vector yields a grid of empty tiles.
    pub fn new(
        rows: usize,
        cols: usize,
        tiles: Vec<Tile>,
        bg_color: Option<Color>,
        tileset: Option<Handle<Tileset>>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::WrongSize(format!("tilemap {}x{}", rows, cols)));
        }
        let tiles = if tiles.is_empty() {
            vec![Tile::EMPTY; rows * cols]
        } else {
            tiles
        };
        if tiles.len() != rows * cols {
            return Err(Error::WrongSize(format!(
                "{} tiles for a {}x{} tilemap",
                tiles.len(),
                rows,
                cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            tiles,
            bg_color,
            tileset,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn bg_color(&self) -> Option<Color> {
        self.bg_color
    }

    pub fn set_bg_color(&mut self, color: Option<Color>) {
        self.bg_color = color;
    }

    pub fn tileset(&self) -> Option<Handle<Tileset>> {
        self.tileset
    }

    pub fn set_tileset(&mut self, tileset: Option<Handle<Tileset>>) {
        self.tileset = tileset;
    }

    fn offset(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::OutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    pub fn get_tile(&self, row: usize, col: usize) -> Result<Tile> {
        Ok(self.tiles[self.offset(row, col)?])
    }

    pub fn set_tile(&mut self, row: usize, col: usize, tile: Tile) -> Result<()> {
        let offset = self.offset(row, col)?;
        self.tiles[offset] = tile;
        Ok(())
    }

    /// Tile at wrapped coordinates; used by the renderer.
    pub(crate) fn tile_wrapped(&self, row: usize, col: usize) -> Tile {
        self.tiles[(row % self.rows) * self.cols + col % self.cols]
    }

    fn check_block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<()> {
        let fits = |start: usize, len: usize, max: usize| {
            start.checked_add(len).map_or(false, |end| end <= max)
        };
        if !fits(row, rows, self.rows) || !fits(col, cols, self.cols) {
            return Err(Error::OutOfBounds {
                row: row.saturating_add(rows),
                col: col.saturating_add(cols),
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// Copies out a `rows` x `cols` block starting at (`row`, `col`).
    pub fn block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Vec<Tile>> {
        self.check_block(row, col, rows, cols)?;
        let mut out = Vec::with_capacity(rows * cols);
        for r in row..row + rows {
            let start = r * self.cols + col;
            out.extend_from_slice(&self.tiles[start..start + cols]);
        }
        Ok(out)
    }

    pub fn set_block(
        &mut self,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
        tiles: &[Tile],
    ) -> Result<()> {
        self.check_block(row, col, rows, cols)?;
        if tiles.len() != rows * cols {
            return Err(Error::WrongSize(format!(
                "{} tiles for a {}x{} block",
                tiles.len(),
                rows,
                cols
            )));
        }
        if cols == 0 {
            return Ok(());
        }
        for (r, src) in tiles.chunks_exact(cols).enumerate() {
            let start = (row + r) * self.cols + col;
            self.tiles[start..start + cols].copy_from_slice(src);
        }
        Ok(())
    }

    /// Replaces every tile with index `from` by `to`, keeping flags.
    pub fn replace_tiles(&mut self, from: TileIdx, to: TileIdx) -> usize {
        let mut count = 0;
        for tile in self.tiles.iter_mut().filter(|t| t.index == from) {
            tile.index = to;
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::TileFlags, error::ErrorKind};

    fn numbered(rows: usize, cols: usize) -> Tilemap {
        let tiles = (0..rows * cols).map(|i| Tile::new(i as TileIdx)).collect();
        Tilemap::new(rows, cols, tiles, None, None).unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let mut map = Tilemap::new(3, 5, vec![], Some(Color::WHITE), None).unwrap();
        for row in 0..3 {
            for col in 0..5 {
                let tile = Tile::with_flags((row * 5 + col) as TileIdx, TileFlags::FLIP_Y);
                map.set_tile(row, col, tile).unwrap();
                assert_eq!(map.get_tile(row, col).unwrap(), tile);
            }
        }
        assert_eq!(map.bg_color(), Some(Color::WHITE));
    }

    #[test]
    fn test_out_of_bounds_fails() {
        let mut map = numbered(3, 5);
        assert_eq!(map.get_tile(3, 0).unwrap_err().kind(), ErrorKind::WrongSize);
        assert!(map.get_tile(0, 5).is_err());
        assert!(map.set_tile(2, 5, Tile::new(1)).is_err());
        assert_eq!(map.get_tile(2, 4).unwrap(), Tile::new(14));
    }

    #[test]
    fn test_new_checks_shape() {
        assert!(Tilemap::new(0, 5, vec![], None, None).is_err());
        assert!(Tilemap::new(2, 2, vec![Tile::EMPTY; 3], None, None).is_err());
    }

    #[test]
    fn test_blocks() {
        let mut map = numbered(4, 4);
        let block = map.block(1, 1, 2, 2).unwrap();
        assert_eq!(
            block.iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![5, 6, 9, 10]
        );
        assert!(map.block(3, 3, 2, 1).is_err());
        assert!(map.block(usize::MAX, 0, 2, 1).is_err());

        map.set_block(0, 2, 2, 2, &block).unwrap();
        assert_eq!(map.get_tile(0, 2).unwrap().index, 5);
        assert_eq!(map.get_tile(1, 3).unwrap().index, 10);
        assert!(map.set_block(0, 0, 2, 2, &block[..3]).is_err());
    }

    #[test]
    fn test_replace_tiles_keeps_flags() {
        let mut map = Tilemap::new(1, 3, vec![Tile::new(4); 3], None, None).unwrap();
        map.set_tile(0, 1, Tile::with_flags(4, TileFlags::FLIP_X)).unwrap();
        map.set_tile(0, 2, Tile::new(2)).unwrap();
        assert_eq!(map.replace_tiles(4, 7), 2);
        assert_eq!(
            map.get_tile(0, 1).unwrap(),
            Tile::with_flags(7, TileFlags::FLIP_X)
        );
        assert_eq!(map.get_tile(0, 2).unwrap(), Tile::new(2));
        assert_eq!(map.tile_wrapped(3, 4), Tile::with_flags(7, TileFlags::FLIP_X));
    }
}
