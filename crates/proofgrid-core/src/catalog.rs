use serde::Serialize;

/// A `(row, col)` offset relative to a shape's top-left origin.
pub type Cell = (u8, u8);

/// Bumped whenever a shape is added, removed, or edited. Preview surfaces
/// compare it against the value they cached.
pub const CATALOG_VERSION: u32 = 1;

/// Width and height of the square play grid every proof is checked against.
pub const DEFAULT_GRID_SIZE: usize = 10;

/// A named target pattern. Cells are origin-normalized (min row and min
/// col are both zero) and unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShapeDef {
    pub name: &'static str,
    pub cells: &'static [Cell],
}

impl ShapeDef {
    /// Bounding box as `(rows, cols)`.
    pub fn extent(&self) -> (usize, usize) {
        let rows = self.cells.iter().map(|c| c.0 as usize + 1).max().unwrap_or(0);
        let cols = self.cells.iter().map(|c| c.1 as usize + 1).max().unwrap_or(0);
        (rows, cols)
    }
}

/// The shape catalog. The server publishes this exact table over
/// `/api/v1/catalog`, so clients never keep their own copy.
pub const CATALOG: &[ShapeDef] = &[
    ShapeDef {
        name: "Square",
        cells: &[(0, 0), (0, 1), (1, 0), (1, 1)],
    },
    ShapeDef {
        name: "Line H",
        cells: &[(0, 0), (0, 1), (0, 2), (0, 3)],
    },
    ShapeDef {
        name: "Line V",
        cells: &[(0, 0), (1, 0), (2, 0), (3, 0)],
    },
    ShapeDef {
        name: "Short Line",
        cells: &[(0, 0), (0, 1), (0, 2)],
    },
    ShapeDef {
        name: "Corner",
        cells: &[(0, 0), (1, 0), (1, 1)],
    },
    ShapeDef {
        name: "L-Shape",
        cells: &[(0, 0), (1, 0), (2, 0), (2, 1)],
    },
    ShapeDef {
        name: "J-Shape",
        cells: &[(0, 1), (1, 1), (2, 0), (2, 1)],
    },
    ShapeDef {
        name: "T-Shape",
        cells: &[(0, 0), (0, 1), (0, 2), (1, 1)],
    },
    ShapeDef {
        name: "Half Cross",
        cells: &[(0, 1), (1, 0), (1, 1), (1, 2)],
    },
    ShapeDef {
        name: "Z-Shape",
        cells: &[(0, 0), (0, 1), (1, 1), (1, 2)],
    },
    ShapeDef {
        name: "S-Shape",
        cells: &[(0, 1), (0, 2), (1, 0), (1, 1)],
    },
    ShapeDef {
        name: "Stair",
        cells: &[(0, 0), (1, 0), (1, 1), (2, 1)],
    },
    ShapeDef {
        name: "Diagonal",
        cells: &[(0, 0), (1, 1), (2, 2), (3, 3)],
    },
    ShapeDef {
        name: "Reverse Diagonal",
        cells: &[(0, 3), (1, 2), (2, 1), (3, 0)],
    },
    ShapeDef {
        name: "Diamond",
        cells: &[(0, 1), (1, 0), (1, 2), (2, 1)],
    },
];

/// Look up a catalog entry by its display name.
pub fn shape_by_name(name: &str) -> Option<&'static ShapeDef> {
    CATALOG.iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn catalog_has_enough_entries() {
        assert!(CATALOG.len() >= 9);
    }

    #[test]
    fn shapes_have_three_or_four_cells() {
        for shape in CATALOG {
            assert!(
                (3..=4).contains(&shape.cells.len()),
                "{} has {} cells",
                shape.name,
                shape.cells.len()
            );
        }
    }

    #[test]
    fn shapes_are_origin_normalized() {
        for shape in CATALOG {
            let min_row = shape.cells.iter().map(|c| c.0).min().unwrap();
            let min_col = shape.cells.iter().map(|c| c.1).min().unwrap();
            assert_eq!((min_row, min_col), (0, 0), "{} is not normalized", shape.name);
        }
    }

    #[test]
    fn cells_within_a_shape_are_unique() {
        for shape in CATALOG {
            let unique: HashSet<_> = shape.cells.iter().collect();
            assert_eq!(unique.len(), shape.cells.len(), "{} repeats a cell", shape.name);
        }
    }

    #[test]
    fn names_and_cell_sets_are_unique() {
        let names: HashSet<_> = CATALOG.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), CATALOG.len());

        let cell_sets: HashSet<Vec<Cell>> = CATALOG
            .iter()
            .map(|s| {
                let mut cells = s.cells.to_vec();
                cells.sort_unstable();
                cells
            })
            .collect();
        assert_eq!(
            cell_sets.len(),
            CATALOG.len(),
            "two catalog entries share a cell set"
        );
    }

    #[test]
    fn every_shape_fits_the_default_grid() {
        for shape in CATALOG {
            let (h, w) = shape.extent();
            assert!(h <= DEFAULT_GRID_SIZE && w <= DEFAULT_GRID_SIZE);
        }
    }

    #[test]
    fn extent_of_square() {
        assert_eq!(shape_by_name("Square").unwrap().extent(), (2, 2));
        assert_eq!(shape_by_name("Line H").unwrap().extent(), (1, 4));
    }
}
