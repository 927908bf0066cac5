use crate::catalog::Cell;

/// Returns true when `selected` (flat indices into a `grid_size`×`grid_size`
/// grid) reproduces `shape` up to translation.
///
/// Orientation is fixed: a rotated or mirrored selection does not match.
/// This is the only authority on proof correctness, so it re-validates its
/// input instead of trusting the caller: empty selections, a zero-width
/// grid, out-of-grid indices and repeated indices never match.
pub fn proof_matches(selected: &[u32], shape: &[Cell], grid_size: usize) -> bool {
    if selected.is_empty() || selected.len() != shape.len() || grid_size == 0 {
        return false;
    }

    let cell_count = grid_size.saturating_mul(grid_size);
    let mut coords: Vec<(usize, usize)> = Vec::with_capacity(selected.len());
    for &index in selected {
        let index = index as usize;
        if index >= cell_count {
            return false;
        }
        coords.push((index / grid_size, index % grid_size));
    }

    let min_row = coords.iter().map(|c| c.0).min().unwrap_or(0);
    let min_col = coords.iter().map(|c| c.1).min().unwrap_or(0);
    for c in &mut coords {
        c.0 -= min_row;
        c.1 -= min_col;
    }
    coords.sort_unstable();
    if coords.windows(2).any(|w| w[0] == w[1]) {
        return false;
    }

    let mut target: Vec<(usize, usize)> = shape
        .iter()
        .map(|&(r, c)| (r as usize, c as usize))
        .collect();
    target.sort_unstable();

    coords == target
}

/// Flat index of `(row, col)` on a grid of width `grid_size`.
pub fn cell_index(row: usize, col: usize, grid_size: usize) -> u32 {
    (row * grid_size + col) as u32
}
