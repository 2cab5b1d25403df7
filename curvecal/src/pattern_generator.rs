//! Chessboard test patterns for single and multi-output displays.
//!
//! Every pattern is placed through three nested rectangles: the canvas, a
//! group (one physical output) and the active area inside the group. Pixels
//! of the group outside the active area are the black pad, pixels of the
//! canvas outside the group keep the white background.

use tracing::debug;

use crate::error::{CalibError, Result};
use crate::image_buffer::{ImageBuffer, ImageViewMut, BLACK, WHITE};
use crate::rect::{GridSpec, Rect};

/// Colour of the cells whose `(col + row)` is even.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CellParity {
    /// Cell `(0, 0)` is black.
    BlackFirst,
    /// Cell `(0, 0)` is white; used when the board sits on a black pad.
    WhiteFirst,
}

impl CellParity {
    pub fn color(&self, col: u32, row: u32) -> [u8; 3] {
        let even = (col + row) % 2 == 0;
        match (self, even) {
            (CellParity::BlackFirst, true) | (CellParity::WhiteFirst, false) => BLACK,
            _ => WHITE,
        }
    }
}

/// Draws `grid` so that it exactly tiles `area` of `image`.
pub fn draw_chess_board(
    image: &mut ImageViewMut,
    area: &Rect,
    grid: GridSpec,
    parity: CellParity,
) -> Result<()> {
    Rect::of_size(image.width(), image.height()).ensure_contains(area, "image", "board area")?;
    grid.ensure_fits(area)?;

    for row in 0..grid.rows {
        let (y0, y1) = GridSpec::cell_span(row, area.height, grid.rows);
        for col in 0..grid.cols {
            let (x0, x1) = GridSpec::cell_span(col, area.width, grid.cols);
            let cell = Rect::new(area.x + x0, area.y + y0, x1 - x0, y1 - y0);
            image.fill_rect(&cell, parity.color(col, row))?;
        }
    }
    Ok(())
}

/// Placement of one chessboard on a shared canvas.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChessBoardLayout {
    pub total_width: u32,
    pub total_height: u32,
    /// Group rectangle in canvas coordinates.
    pub group: Rect,
    /// Active rectangle relative to the group origin.
    pub active: Rect,
    pub grid: GridSpec,
    pub parity: CellParity,
}

impl ChessBoardLayout {
    /// A board filling the whole group.
    pub fn full_group(
        total_width: u32,
        total_height: u32,
        group: Rect,
        grid: GridSpec,
    ) -> ChessBoardLayout {
        ChessBoardLayout {
            total_width,
            total_height,
            group,
            active: Rect::of_size(group.width, group.height),
            grid,
            parity: CellParity::BlackFirst,
        }
    }

    /// Checks Active ⊆ Group ⊆ Canvas and that the grid fits the active
    /// area. Returns the active rectangle in canvas coordinates.
    pub fn validate(&self) -> Result<Rect> {
        let canvas = Rect::of_size(self.total_width, self.total_height);
        canvas.ensure_non_empty("canvas")?;
        canvas.ensure_contains(&self.group, "canvas", "group")?;
        Rect::of_size(self.group.width, self.group.height).ensure_contains(
            &self.active,
            "group",
            "active area",
        )?;
        self.grid.ensure_fits(&self.active)?;
        self.group.offset(&self.active)
    }

    /// Allocates a white canvas and draws this layout into it.
    pub fn render(&self) -> Result<ImageBuffer> {
        self.validate()?;
        let mut canvas = ImageBuffer::new(self.total_width, self.total_height, WHITE)?;
        self.render_into(&mut canvas.view_mut())?;
        Ok(canvas)
    }

    fn render_into(&self, canvas: &mut ImageViewMut) -> Result<()> {
        let active = self.validate()?;
        if active != self.group {
            canvas.fill_rect(&self.group, BLACK)?;
        }
        draw_chess_board(canvas, &active, self.grid, self.parity)?;
        debug!(
            "drew {}x{} board into {:?} (group {:?})",
            self.grid.cols, self.grid.rows, active, self.group
        );
        Ok(())
    }
}

/// Draws a `cols` x `rows` board covering the canvas from `(start_x, start_y)`
/// to its bottom-right corner. Pixels left of or above the board stay white.
pub fn generate_chess_board(
    width: u32,
    height: u32,
    cols: u32,
    rows: u32,
    start_x: u32,
    start_y: u32,
) -> Result<ImageBuffer> {
    let grid = GridSpec::new(cols, rows)?;
    if start_x >= width || start_y >= height {
        return Err(CalibError::invalid(format!(
            "board origin ({start_x}, {start_y}) lies outside the {width}x{height} canvas"
        )));
    }
    let group = Rect::new(start_x, start_y, width - start_x, height - start_y);
    ChessBoardLayout::full_group(width, height, group, grid).render()
}

/// Draws a full board inside the group at `(group_x_offset, 0)` of a
/// `total_width` x `total_height` canvas.
pub fn generate_chess_board_group(
    total_width: u32,
    total_height: u32,
    group_x_offset: u32,
    group_width: u32,
    group_height: u32,
    cols: u32,
    rows: u32,
) -> Result<ImageBuffer> {
    let grid = GridSpec::new(cols, rows)?;
    let group = Rect::new(group_x_offset, 0, group_width, group_height);
    ChessBoardLayout::full_group(total_width, total_height, group, grid).render()
}

/// Draws a board inside the active area of a group and pads the remainder of
/// the group with black. Active offsets are relative to the group origin.
#[allow(clippy::too_many_arguments)]
pub fn generate_chess_board_group_with_black_pad(
    total_width: u32,
    total_height: u32,
    group_x_offset: u32,
    group_y_offset: u32,
    group_width: u32,
    group_height: u32,
    active_x_offset: u32,
    active_y_offset: u32,
    active_width: u32,
    active_height: u32,
    cols: u32,
    rows: u32,
) -> Result<ImageBuffer> {
    let layout = ChessBoardLayout {
        total_width,
        total_height,
        group: Rect::new(group_x_offset, group_y_offset, group_width, group_height),
        active: Rect::new(active_x_offset, active_y_offset, active_width, active_height),
        grid: GridSpec::new(cols, rows)?,
        parity: CellParity::WhiteFirst,
    };
    layout.render()
}

/// Renders several layouts that share one canvas. Groups must not overlap and
/// must all describe the same canvas size.
pub fn compose_layout(layouts: &[ChessBoardLayout]) -> Result<ImageBuffer> {
    let first = layouts
        .first()
        .ok_or_else(|| CalibError::invalid("at least one layout is required"))?;
    for (i, layout) in layouts.iter().enumerate() {
        layout.validate()?;
        if (layout.total_width, layout.total_height) != (first.total_width, first.total_height) {
            return Err(CalibError::invalid(format!(
                "layout {i} uses a {}x{} canvas, expected {}x{}",
                layout.total_width, layout.total_height, first.total_width, first.total_height
            )));
        }
        for (j, other) in layouts[..i].iter().enumerate() {
            if layout.group.intersects(&other.group) {
                return Err(CalibError::invalid(format!(
                    "groups {j} and {i} overlap: {:?} and {:?}",
                    other.group, layout.group
                )));
            }
        }
    }

    let mut canvas = ImageBuffer::new(first.total_width, first.total_height, WHITE)?;
    for layout in layouts {
        layout.render_into(&mut canvas.view_mut())?;
    }
    Ok(canvas)
}

/// Renders one output of a multi-output wall as its own group-sized image.
///
/// The cells are laid out over the whole `total_width` x `total_height`
/// canvas, so the slices of all groups line up into one continuous board.
/// Only the part overlapping `active` (relative to the group origin) is
/// drawn; the rest of the slice is black. Cell `(0, 0)` is white.
pub fn generate_layout_slice(
    total_width: u32,
    total_height: u32,
    group: Rect,
    active: Rect,
    cols: u32,
    rows: u32,
) -> Result<ImageBuffer> {
    let grid = GridSpec::new(cols, rows)?;
    let canvas = Rect::of_size(total_width, total_height);
    canvas.ensure_non_empty("canvas")?;
    canvas.ensure_contains(&group, "canvas", "group")?;
    Rect::of_size(group.width, group.height).ensure_contains(&active, "group", "active area")?;
    grid.ensure_fits(&canvas)?;
    let active_abs = group.offset(&active)?;

    let mut slice = ImageBuffer::new(group.width, group.height, BLACK)?;
    let mut view = slice.view_mut();
    let parity = CellParity::WhiteFirst;
    for row in 0..grid.rows {
        let (gy0, gy1) = GridSpec::cell_span(row, total_height, grid.rows);
        let y0 = gy0.max(active_abs.y);
        let y1 = (gy1 as u64).min(active_abs.bottom()) as u32;
        if y1 <= y0 {
            continue;
        }
        for col in 0..grid.cols {
            let (gx0, gx1) = GridSpec::cell_span(col, total_width, grid.cols);
            let x0 = gx0.max(active_abs.x);
            let x1 = (gx1 as u64).min(active_abs.right()) as u32;
            if x1 <= x0 {
                continue;
            }
            let color = parity.color(col, row);
            if color == BLACK {
                continue;
            }
            let local = Rect::new(x0 - group.x, y0 - group.y, x1 - x0, y1 - y0);
            view.fill_rect(&local, color)?;
        }
    }
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts maximal runs of equal colour along a scan line.
    fn runs(pixels: impl Iterator<Item = [u8; 3]>) -> Vec<([u8; 3], usize)> {
        let mut out: Vec<([u8; 3], usize)> = Vec::new();
        for p in pixels {
            match out.last_mut() {
                Some((c, n)) if *c == p => *n += 1,
                _ => out.push((p, 1)),
            }
        }
        out
    }

    #[test]
    fn board_800_has_64_cells_of_100() {
        let img = generate_chess_board(800, 800, 8, 8, 0, 0).unwrap();
        assert_eq!((img.width(), img.height()), (800, 800));
        for row in 0..8 {
            for col in 0..8 {
                let (x0, y0) = (col * 100, row * 100);
                let color = img.get_rgb(x0, y0);
                // the whole cell is uniform
                assert_eq!(img.get_rgb(x0 + 99, y0), color);
                assert_eq!(img.get_rgb(x0, y0 + 99), color);
                assert_eq!(img.get_rgb(x0 + 99, y0 + 99), color);
                assert_eq!(img.get_rgb(x0 + 50, y0 + 50), color);
                if col > 0 {
                    assert_ne!(img.get_rgb(x0 - 1, y0), color);
                }
                if row > 0 {
                    assert_ne!(img.get_rgb(x0, y0 - 1), color);
                }
            }
        }
        assert_eq!(img.get_rgb(0, 0), BLACK);
        assert_eq!(img.get_rgb(100, 0), WHITE);
    }

    #[test]
    fn remainder_goes_to_last_cell() {
        let img = generate_chess_board(103, 50, 4, 2, 0, 0).unwrap();
        let row = runs((0..103).map(|x| img.get_rgb(x, 0)));
        assert_eq!(row.len(), 4);
        let widths: Vec<usize> = row.iter().map(|(_, n)| *n).collect();
        assert_eq!(widths, vec![25, 25, 25, 28]);
        let col = runs((0..50).map(|y| img.get_rgb(0, y)));
        assert_eq!(col.iter().map(|(_, n)| *n).collect::<Vec<_>>(), vec![25, 25]);
    }

    #[test]
    fn offset_board_leaves_background() {
        let img = generate_chess_board(110, 60, 5, 3, 10, 0).unwrap();
        for y in 0..60 {
            for x in 0..10 {
                assert_eq!(img.get_rgb(x, y), WHITE);
            }
        }
        // grid spans exactly 100x60 from x = 10
        let row = runs((10..110).map(|x| img.get_rgb(x, 30)));
        assert_eq!(row.len(), 5);
        assert!(row.iter().all(|(_, n)| *n == 20));
        assert_eq!(img.get_rgb(10, 0), BLACK);
    }

    #[test]
    fn cell_count_and_alternation_over_many_sizes() {
        for &(w, h, cols, rows) in &[(37, 29, 3, 4), (64, 64, 8, 8), (91, 13, 7, 2)] {
            let img = generate_chess_board(w, h, cols, rows, 0, 0).unwrap();
            let top = runs((0..w).map(|x| img.get_rgb(x, 0)));
            let left = runs((0..h).map(|y| img.get_rgb(0, y)));
            assert_eq!(top.len() as u32, cols);
            assert_eq!(left.len() as u32, rows);
            for pair in top.windows(2) {
                assert_ne!(pair[0].0, pair[1].0);
            }
        }
    }

    #[test]
    fn invalid_board_parameters() {
        assert!(matches!(
            generate_chess_board(800, 800, 0, 8, 0, 0),
            Err(CalibError::InvalidParameter(_))
        ));
        assert!(matches!(
            generate_chess_board(800, 800, 8, 0, 0, 0),
            Err(CalibError::InvalidParameter(_))
        ));
        assert!(generate_chess_board(800, 800, 8, 8, 800, 0).is_err());
        assert!(generate_chess_board(10, 10, 8, 8, 5, 0).is_err());
        assert!(generate_chess_board(0, 10, 1, 1, 0, 0).is_err());
    }

    #[test]
    fn group_board_is_confined() {
        let img = generate_chess_board_group(300, 100, 100, 100, 100, 4, 4).unwrap();
        assert_eq!((img.width(), img.height()), (300, 100));
        for y in 0..100 {
            assert_eq!(img.get_rgb(50, y), WHITE);
            assert_eq!(img.get_rgb(250, y), WHITE);
        }
        assert_eq!(img.get_rgb(100, 0), BLACK);
        assert_eq!(img.get_rgb(125, 0), WHITE);
        assert_eq!(img.get_rgb(199, 99), BLACK);
        assert!(generate_chess_board_group(300, 100, 250, 100, 100, 4, 4).is_err());
        assert!(generate_chess_board_group(300, 100, 0, 100, 101, 4, 4).is_err());
    }

    #[test]
    fn black_pad_surrounds_active_area() {
        let group = Rect::new(40, 20, 120, 80);
        let active = Rect::new(60, 40, 40, 30); // absolute (100, 60)
        let img = generate_chess_board_group_with_black_pad(
            200, 120, group.x, group.y, group.width, group.height, 60, 40, 40, 30, 4, 3,
        )
        .unwrap();
        let active_abs = group.offset(&active).unwrap();
        for y in 0..120 {
            for x in 0..200 {
                let p = img.get_rgb(x, y);
                if !group.contains_point(x, y) {
                    assert_eq!(p, WHITE, "outside group at ({x},{y})");
                } else if !active_abs.contains_point(x, y) {
                    assert_eq!(p, BLACK, "pad at ({x},{y})");
                }
            }
        }
        // first cell is white, its neighbour black
        assert_eq!(img.get_rgb(100, 60), WHITE);
        assert_eq!(img.get_rgb(110, 60), BLACK);
        assert_eq!(img.get_rgb(100, 70), BLACK);
    }

    #[test]
    fn black_pad_rejects_escaping_active_area() {
        let r = generate_chess_board_group_with_black_pad(
            200, 120, 40, 20, 120, 80, 100, 0, 40, 30, 4, 3,
        );
        assert!(matches!(r, Err(CalibError::InvalidParameter(_))));
        let r = generate_chess_board_group_with_black_pad(
            200, 120, 100, 20, 120, 80, 0, 0, 40, 30, 4, 3,
        );
        assert!(matches!(r, Err(CalibError::InvalidParameter(_))));
        let r = generate_chess_board_group_with_black_pad(
            200, 120, 40, 20, 120, 80, 0, 0, 0, 30, 4, 3,
        );
        assert!(matches!(r, Err(CalibError::InvalidParameter(_))));
    }

    #[test]
    fn composed_groups_do_not_overlap() {
        let grid = GridSpec::new(4, 4).unwrap();
        let left = ChessBoardLayout::full_group(200, 100, Rect::new(0, 0, 100, 100), grid);
        let right = ChessBoardLayout {
            active: Rect::new(0, 0, 60, 100),
            parity: CellParity::WhiteFirst,
            ..ChessBoardLayout::full_group(200, 100, Rect::new(100, 0, 100, 100), grid)
        };
        let img = compose_layout(&[left, right]).unwrap();
        assert_eq!(img.get_rgb(0, 0), BLACK);
        assert_eq!(img.get_rgb(100, 0), WHITE);
        assert_eq!(img.get_rgb(180, 50), BLACK);

        let clash = ChessBoardLayout::full_group(200, 100, Rect::new(50, 0, 100, 100), grid);
        assert!(compose_layout(&[left, clash]).is_err());
        assert!(compose_layout(&[]).is_err());
    }

    #[test]
    fn layout_slices_line_up() {
        // two 100px wide outputs showing one 4x2 board over a 200x100 wall
        let left = generate_layout_slice(
            200, 100, Rect::new(0, 0, 100, 100), Rect::new(0, 0, 100, 100), 4, 2,
        )
        .unwrap();
        let right = generate_layout_slice(
            200, 100, Rect::new(100, 0, 100, 100), Rect::new(0, 0, 50, 100), 4, 2,
        )
        .unwrap();
        assert_eq!((left.width(), left.height()), (100, 100));
        assert_eq!(left.get_rgb(0, 0), WHITE);
        assert_eq!(left.get_rgb(50, 0), BLACK);
        // global column 2 starts at x = 100
        assert_eq!(right.get_rgb(0, 0), WHITE);
        assert_eq!(right.get_rgb(0, 50), BLACK);
        // outside the active area of the right group
        assert_eq!(right.get_rgb(75, 0), BLACK);
        assert_eq!(right.get_rgb(75, 60), BLACK);
    }
}
