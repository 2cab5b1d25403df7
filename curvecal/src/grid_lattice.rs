use kd_tree::{KdPoint, KdTree};
use tracing::debug;

use crate::corner_detector::Corner;
use crate::error::{CalibError, Result};

/// A corner stored in the lattice search tree.
#[derive(Debug, Copy, Clone, PartialEq)]
struct CornerPoint {
    xy: [f32; 2],
    index: usize,
}

impl KdPoint for CornerPoint {
    type Scalar = f32;
    type Dim = typenum::U2;
    fn at(&self, k: usize) -> f32 {
        self.xy[k]
    }
}

fn query(x: f32, y: f32) -> CornerPoint {
    CornerPoint {
        xy: [x, y],
        index: usize::MAX,
    }
}

/// Intersections organised as a `cols x rows` lattice, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub cols: usize,
    pub rows: usize,
    /// `rows` rows of `cols` points, left to right, top to bottom.
    pub points: Vec<[f32; 2]>,
    /// Median distance between horizontal and between vertical neighbours.
    pub spacing: [f32; 2],
}

impl Lattice {
    pub fn row(&self, r: usize) -> &[[f32; 2]] {
        &self.points[r * self.cols..(r + 1) * self.cols]
    }
}

/// Neighbours examined around a corner. Enough to hold both axis neighbours
/// for cells up to about 4:1.
const NEIGHBOURHOOD: usize = 13;

struct Walker<'a> {
    tree: &'a KdTree<CornerPoint>,
    used: Vec<bool>,
}

impl Walker<'_> {
    /// Unused corner within `tolerance` of `(x, y)`.
    fn claim_near(&mut self, x: f32, y: f32, tolerance: f32) -> Option<[f32; 2]> {
        let found = self.tree.nearest(&query(x, y))?;
        if found.squared_distance.sqrt() > tolerance || self.used[found.item.index] {
            return None;
        }
        self.used[found.item.index] = true;
        Some(found.item.xy)
    }

    /// Follows a chain of corners from `from`, predicting each next one from
    /// the previous step. Returns the chain without `from`.
    fn walk(&mut self, from: [f32; 2], step: [f32; 2], tolerance: f32) -> Vec<[f32; 2]> {
        let mut chain = Vec::new();
        let (mut current, mut step) = (from, step);
        while let Some(next) =
            self.claim_near(current[0] + step[0], current[1] + step[1], tolerance)
        {
            step = [next[0] - current[0], next[1] - current[1]];
            current = next;
            chain.push(next);
        }
        chain
    }
}

/// Picks the neighbour of `origin` closest in direction to `axis`.
fn axis_neighbour(
    tree: &KdTree<CornerPoint>,
    origin: [f32; 2],
    axis: [f32; 2],
    max_dist: f32,
) -> Option<[f32; 2]> {
    tree.nearests(&query(origin[0], origin[1]), NEIGHBOURHOOD)
        .into_iter()
        .filter_map(|n| {
            let v = [n.item.xy[0] - origin[0], n.item.xy[1] - origin[1]];
            let len = (v[0] * v[0] + v[1] * v[1]).sqrt();
            if len <= f32::EPSILON || len > max_dist {
                return None;
            }
            let cos = (v[0] * axis[0] + v[1] * axis[1]) / len;
            (cos > 0.7).then_some((cos, v))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v)
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(f32::total_cmp);
    values[values.len() / 2]
}

/// Median distance from each corner to its nearest mostly-horizontal and its
/// nearest mostly-vertical neighbour. Cells are sized per axis, so the two
/// differ on anything but a square board. Without vertical neighbours (a
/// single row) the horizontal spacing is used for both.
fn axis_spacings(tree: &KdTree<CornerPoint>, points: &[CornerPoint]) -> Option<[f32; 2]> {
    let mut horizontal = Vec::with_capacity(points.len());
    let mut vertical = Vec::with_capacity(points.len());
    for p in points {
        let mut nearest = [f32::INFINITY; 2];
        for n in tree.nearests(p, NEIGHBOURHOOD) {
            let len = n.squared_distance.sqrt();
            if len <= f32::EPSILON {
                continue;
            }
            let (dx, dy) = (n.item.xy[0] - p.xy[0], n.item.xy[1] - p.xy[1]);
            let axis = usize::from(dy.abs() > dx.abs());
            nearest[axis] = nearest[axis].min(len);
        }
        if nearest[0].is_finite() {
            horizontal.push(nearest[0]);
        }
        if nearest[1].is_finite() {
            vertical.push(nearest[1]);
        }
    }
    if horizontal.is_empty() {
        return None;
    }
    let sx = median(&mut horizontal);
    let sy = if vertical.is_empty() { sx } else { median(&mut vertical) };
    Some([sx, sy])
}

/// Organises loose corners into the `cols x rows` lattice closest to the
/// centre of the detections.
///
/// Starting from the corner nearest the centroid, the centre column is
/// followed up and down, then every row is followed left and right. The
/// largest rectangular block present in every row is then cropped to the
/// centred `cols x rows` window.
pub fn assemble_lattice(
    corners: &[Corner],
    cols: usize,
    rows: usize,
    link_tolerance: f32,
) -> Result<Lattice> {
    if corners.len() < cols * rows {
        return Err(CalibError::detection(format!(
            "found {} intersections, expected {}x{}",
            corners.len(),
            cols,
            rows
        )));
    }

    let points: Vec<CornerPoint> = corners
        .iter()
        .enumerate()
        .map(|(index, c)| CornerPoint {
            xy: [c.x, c.y],
            index,
        })
        .collect();
    let tree = KdTree::build_by_ordered_float(points.clone());

    let spacing = axis_spacings(&tree, &points)
        .ok_or_else(|| CalibError::detection("not enough intersections to form a lattice"))?;
    let [sx, sy] = spacing;
    if sx <= 0.0 || sy <= 0.0 {
        return Err(CalibError::detection("intersections are not separated"));
    }

    let n = points.len() as f32;
    let centroid = points.iter().fold([0.0f32; 2], |acc, p| {
        [acc[0] + p.xy[0] / n, acc[1] + p.xy[1] / n]
    });
    let start = tree
        .nearest(&query(centroid[0], centroid[1]))
        .map(|found| *found.item)
        .ok_or_else(|| CalibError::detection("no intersections"))?;

    let (reach_x, reach_y) = (1.5 * sx, 1.5 * sy);
    let right = axis_neighbour(&tree, start.xy, [1.0, 0.0], reach_x)
        .or_else(|| axis_neighbour(&tree, start.xy, [-1.0, 0.0], reach_x).map(|v| [-v[0], -v[1]]))
        .ok_or_else(|| CalibError::detection("no horizontal neighbour at the lattice centre"))?;
    // a single-row board has no vertical neighbour; the column walk then stops at once
    let down = axis_neighbour(&tree, start.xy, [0.0, 1.0], reach_y)
        .or_else(|| axis_neighbour(&tree, start.xy, [0.0, -1.0], reach_y).map(|v| [-v[0], -v[1]]))
        .unwrap_or_else(|| {
            let k = sy / (right[0] * right[0] + right[1] * right[1]).sqrt();
            [-right[1] * k, right[0] * k]
        });

    // a walk never reaches halfway to the neighbouring row or column
    let along_row = (link_tolerance * sx).min(0.5 * sy);
    let along_column = (link_tolerance * sy).min(0.5 * sx);

    let mut walker = Walker {
        tree: &tree,
        used: vec![false; points.len()],
    };
    walker.used[start.index] = true;

    let up_chain = walker.walk(start.xy, [-down[0], -down[1]], along_column);
    let down_chain = walker.walk(start.xy, down, along_column);
    let column: Vec<[f32; 2]> = up_chain
        .into_iter()
        .rev()
        .chain(std::iter::once(start.xy))
        .chain(down_chain)
        .collect();

    // each row: its points and the column offset of the first one
    let mut lattice_rows: Vec<(i64, Vec<[f32; 2]>)> = Vec::with_capacity(column.len());
    for &anchor in &column {
        let left = walker.walk(anchor, [-right[0], -right[1]], along_row);
        let right_chain = walker.walk(anchor, right, along_row);
        let first = -(left.len() as i64);
        let row: Vec<[f32; 2]> = left
            .into_iter()
            .rev()
            .chain(std::iter::once(anchor))
            .chain(right_chain)
            .collect();
        lattice_rows.push((first, row));
    }

    debug!(
        "lattice walk: spacing {:.2}x{:.2}px, {} rows, widths {:?}",
        sx,
        sy,
        lattice_rows.len(),
        lattice_rows.iter().map(|(_, r)| r.len()).collect::<Vec<_>>()
    );

    if lattice_rows.len() < rows {
        return Err(CalibError::detection(format!(
            "lattice has {} rows, expected {}",
            lattice_rows.len(),
            rows
        )));
    }
    let row_start = (lattice_rows.len() - rows) / 2;
    let window = &lattice_rows[row_start..row_start + rows];

    let lo = window.iter().map(|(first, _)| *first).max().unwrap_or(0);
    let hi = window
        .iter()
        .map(|(first, row)| first + row.len() as i64)
        .min()
        .unwrap_or(0);
    let available = (hi - lo).max(0) as usize;
    if available < cols {
        return Err(CalibError::detection(format!(
            "lattice has {} complete columns, expected {}",
            available, cols
        )));
    }
    let col_start = lo + ((available - cols) / 2) as i64;

    let mut out = Vec::with_capacity(cols * rows);
    for (first, row) in window {
        let offset = (col_start - first) as usize;
        out.extend_from_slice(&row[offset..offset + cols]);
    }

    Ok(Lattice {
        cols,
        rows,
        points: out,
        spacing,
    })
}
