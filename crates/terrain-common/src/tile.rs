//! Source tile addressing types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named partitioning of the terrain surface into source tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TilingScheme {
    /// Topographic map 1:25 000 sheet layout (6' x 10' sheets)
    Tk25,
}

impl TilingScheme {
    /// Name used in configuration and in the source tile tree.
    pub fn name(&self) -> &'static str {
        match self {
            TilingScheme::Tk25 => "TK25",
        }
    }
}

impl fmt::Display for TilingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TilingScheme {
    type Err = UnknownTilingScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(' ', "").as_str() {
            "TK25" => Ok(TilingScheme::Tk25),
            _ => Err(UnknownTilingScheme(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Unknown tiling scheme: {0}")]
pub struct UnknownTilingScheme(pub String);

/// One source tile under a tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    pub row: u32,
    pub col: u32,
}

impl TileIndex {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Human-readable sheet number, e.g. `4109` for row 41, column 9.
    pub fn sheet_number(&self) -> String {
        format!("{:02}{:02}", self.row, self.col)
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sheet_number())
    }
}

/// Inclusive range of tile rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub row_from: u32,
    pub row_to: u32,
    pub col_from: u32,
    pub col_to: u32,
}

impl TileRange {
    /// Smallest range containing every given index.
    pub fn enclosing<I>(indices: I) -> Option<Self>
    where
        I: IntoIterator<Item = TileIndex>,
    {
        indices.into_iter().fold(None, |acc, t| {
            Some(match acc {
                None => TileRange {
                    row_from: t.row,
                    row_to: t.row,
                    col_from: t.col,
                    col_to: t.col,
                },
                Some(r) => TileRange {
                    row_from: r.row_from.min(t.row),
                    row_to: r.row_to.max(t.row),
                    col_from: r.col_from.min(t.col),
                    col_to: r.col_to.max(t.col),
                },
            })
        })
    }

    pub fn contains(&self, index: &TileIndex) -> bool {
        (self.row_from..=self.row_to).contains(&index.row)
            && (self.col_from..=self.col_to).contains(&index.col)
    }

    /// Number of tiles in the range.
    pub fn tile_count(&self) -> usize {
        let rows = (self.row_to - self.row_from + 1) as usize;
        let cols = (self.col_to - self.col_from + 1) as usize;
        rows * cols
    }

    /// All indices in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = TileIndex> + '_ {
        (self.row_from..=self.row_to)
            .flat_map(move |row| (self.col_from..=self.col_to).map(move |col| TileIndex::new(row, col)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_number_padding() {
        assert_eq!(TileIndex::new(41, 9).sheet_number(), "4109");
        assert_eq!(TileIndex::new(5, 12).sheet_number(), "0512");
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("TK25".parse::<TilingScheme>().unwrap(), TilingScheme::Tk25);
        assert_eq!("tk 25".parse::<TilingScheme>().unwrap(), TilingScheme::Tk25);
        assert!("TK100".parse::<TilingScheme>().is_err());
    }

    #[test]
    fn test_enclosing_range() {
        let range = TileRange::enclosing([
            TileIndex::new(42, 9),
            TileIndex::new(41, 10),
            TileIndex::new(41, 9),
        ])
        .unwrap();
        assert_eq!(range.row_from, 41);
        assert_eq!(range.row_to, 42);
        assert_eq!(range.col_from, 9);
        assert_eq!(range.col_to, 10);
        assert_eq!(range.tile_count(), 4);
        assert!(TileRange::enclosing(Vec::new()).is_none());
    }

    #[test]
    fn test_iter_row_major() {
        let range = TileRange {
            row_from: 1,
            row_to: 2,
            col_from: 3,
            col_to: 4,
        };
        let tiles: Vec<_> = range.iter().collect();
        assert_eq!(
            tiles,
            vec![
                TileIndex::new(1, 3),
                TileIndex::new(1, 4),
                TileIndex::new(2, 3),
                TileIndex::new(2, 4)
            ]
        );
    }
}
