use crate::error::{CalibError, Result};

/// An axis-aligned rectangle in pixel coordinates.
///
/// The same type describes the canvas, a group (one physical output) and the
/// active area inside a group, so containment is validated in one place.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect { x, y, width, height }
    }

    /// A rectangle anchored at the origin, typically the whole canvas.
    pub fn of_size(width: u32, height: u32) -> Self {
        Rect::new(0, 0, width, height)
    }

    /// Right edge (exclusive). Computed in `u64` so huge offsets cannot wrap.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    ///
    /// ```
    /// # use curvecal::rect::Rect;
    /// let group = Rect::new(100, 0, 200, 100);
    /// assert!(group.contains_rect(&Rect::new(100, 0, 200, 100)));
    /// assert!(!group.contains_rect(&Rect::new(250, 0, 60, 10)));
    /// ```
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && (x as u64) < self.right() && (y as u64) < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        (self.x as u64) < other.right()
            && (other.x as u64) < self.right()
            && (self.y as u64) < other.bottom()
            && (other.y as u64) < self.bottom()
    }

    /// Translates a rectangle expressed relative to `self`'s origin into the
    /// coordinate space `self` lives in.
    pub fn offset(&self, inner: &Rect) -> Result<Rect> {
        let x = self.x.checked_add(inner.x);
        let y = self.y.checked_add(inner.y);
        match (x, y) {
            (Some(x), Some(y)) => Ok(Rect::new(x, y, inner.width, inner.height)),
            _ => Err(CalibError::invalid(format!(
                "rectangle {inner:?} overflows when offset by ({}, {})",
                self.x, self.y
            ))),
        }
    }

    /// Fails with `InvalidParameter` unless the rectangle has non-zero extents.
    pub fn ensure_non_empty(&self, what: &str) -> Result<()> {
        if self.is_empty() {
            return Err(CalibError::invalid(format!(
                "{what} must have non-zero extents, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Fails with `InvalidParameter` unless `inner` is non-empty and contained in `self`.
    pub fn ensure_contains(&self, inner: &Rect, outer_name: &str, inner_name: &str) -> Result<()> {
        inner.ensure_non_empty(inner_name)?;
        if !self.contains_rect(inner) {
            return Err(CalibError::invalid(format!(
                "{inner_name} {inner:?} is not contained in {outer_name} {self:?}"
            )));
        }
        Ok(())
    }
}

/// Column and row count of a chessboard.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GridSpec {
    pub cols: u32,
    pub rows: u32,
}

impl GridSpec {
    pub fn new(cols: u32, rows: u32) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(CalibError::invalid(format!(
                "grid dimensions must be positive, got {cols}x{rows}"
            )));
        }
        Ok(GridSpec { cols, rows })
    }

    /// Bounds `[start, end)` of cell `index` when `extent` pixels are split
    /// into `count` cells. Every cell is `extent / count` wide except the last,
    /// which absorbs the remainder.
    ///
    /// ```
    /// # use curvecal::rect::GridSpec;
    /// assert_eq!(GridSpec::cell_span(0, 10, 3), (0, 3));
    /// assert_eq!(GridSpec::cell_span(2, 10, 3), (6, 10));
    /// ```
    pub fn cell_span(index: u32, extent: u32, count: u32) -> (u32, u32) {
        let size = extent / count;
        let start = index * size;
        let end = if index + 1 == count { extent } else { start + size };
        (start, end)
    }

    /// Fails if a cell of `area` would be less than one pixel on a side.
    pub fn ensure_fits(&self, area: &Rect) -> Result<()> {
        if area.width < self.cols || area.height < self.rows {
            return Err(CalibError::invalid(format!(
                "a {}x{} grid does not fit in a {}x{} area",
                self.cols, self.rows, area.width, area.height
            )));
        }
        Ok(())
    }
}
