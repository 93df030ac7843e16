//! Hilbert curve mapping between a linear cell index and a grid coordinate.
//!
//! The grid is square with side `2^order`. Both directions are total bijections over the
//! valid domain; anything outside it is a caller bug and panics.

/// Largest supported order. Side length `2^16` still fits `u32` coordinates and the
/// cell count `4^16` fits `u64` indices with room for the `s * s * 3` term.
pub const MAX_ORDER: u8 = 16;

pub const fn side_len(order: u8) -> u32 {
    assert!(order <= MAX_ORDER, "hilbert order exceeds MAX_ORDER");
    1u32 << order
}

pub const fn cell_count(order: u8) -> u64 {
    assert!(order <= MAX_ORDER, "hilbert order exceeds MAX_ORDER");
    1u64 << (2 * order as u32)
}

pub fn index_to_xy(order: u8, index: u64) -> (u32, u32) {
    let n = side_len(order) as u64;
    assert!(
        index < cell_count(order),
        "hilbert index {index} out of range for order {order}"
    );

    let mut remaining = index;
    let mut x = 0u64;
    let mut y = 0u64;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (remaining / 2);
        let ry = 1 & (remaining ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        remaining /= 4;
        s *= 2;
    }
    (x as u32, y as u32)
}

pub fn xy_to_index(order: u8, x: u32, y: u32) -> u64 {
    let n = side_len(order) as u64;
    assert!(
        (x as u64) < n && (y as u64) < n,
        "hilbert coordinate ({x}, {y}) out of range for order {order}"
    );

    let mut x = x as u64;
    let mut y = y as u64;
    let mut index = 0u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        index += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    index
}

// Quadrant rotation shared by both directions.
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_zero_is_single_cell() {
        assert_eq!(index_to_xy(0, 0), (0, 0));
        assert_eq!(xy_to_index(0, 0, 0), 0);
    }

    #[test]
    fn index_round_trips_for_every_cell_up_to_order_six() {
        for order in 0..=6u8 {
            for index in 0..cell_count(order) {
                let (x, y) = index_to_xy(order, index);
                assert_eq!(
                    xy_to_index(order, x, y),
                    index,
                    "order {order} index {index} -> ({x}, {y})"
                );
            }
        }
    }

    #[test]
    fn every_coordinate_is_visited_exactly_once() {
        let order = 5;
        let side = side_len(order) as usize;
        let mut visited = vec![false; side * side];
        for index in 0..cell_count(order) {
            let (x, y) = index_to_xy(order, index);
            let slot = y as usize * side + x as usize;
            assert!(!visited[slot], "cell ({x}, {y}) visited twice");
            visited[slot] = true;
        }
        assert!(visited.iter().all(|cell| *cell));
    }

    #[test]
    fn consecutive_indices_are_grid_neighbours() {
        let order = 6;
        let mut previous = index_to_xy(order, 0);
        for index in 1..cell_count(order) {
            let current = index_to_xy(order, index);
            let distance =
                previous.0.abs_diff(current.0) + previous.1.abs_diff(current.1);
            assert_eq!(distance, 1, "step {index} jumps from {previous:?} to {current:?}");
            previous = current;
        }
    }

    #[test]
    fn curve_starts_and_ends_on_the_bottom_edge_corners() {
        let order = 4;
        let last = cell_count(order) - 1;
        assert_eq!(index_to_xy(order, 0), (0, 0));
        assert_eq!(index_to_xy(order, last), (side_len(order) - 1, 0));
    }

    #[test]
    fn max_order_extremes_round_trip() {
        let last = cell_count(MAX_ORDER) - 1;
        for index in [0, 1, 12_345_678, last / 2, last] {
            let (x, y) = index_to_xy(MAX_ORDER, index);
            assert_eq!(xy_to_index(MAX_ORDER, x, y), index);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn index_past_the_grid_panics() {
        let _ = index_to_xy(2, 16);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn coordinate_past_the_grid_panics() {
        let _ = xy_to_index(2, 4, 0);
    }
}
