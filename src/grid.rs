use crate::coord::Direction;

/// Row-major flat grid. No per-cell allocation beyond `T` itself.
/// Row 0 is the northern edge, column 0 the western edge; edges do not wrap.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub w: usize,
    pub h: usize,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            data: vec![T::default(); w * h],
            w,
            h,
        }
    }
}

impl<T> Grid<T> {
    pub fn from_vec(data: Vec<T>, w: usize, h: usize) -> Self {
        debug_assert_eq!(data.len(), w * h);
        Self { data, w, h }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.w && y < self.h);
        y * self.w + x
    }

    /// (x, y) = (column, row) of a flat index.
    #[inline]
    pub fn xy(&self, i: usize) -> (usize, usize) {
        (i % self.w, i / self.w)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.w..(y + 1) * self.w]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.w.max(1))
    }

    /// Flat index one step from `i` along `dir`, or `None` past an edge.
    #[inline]
    pub fn step(&self, i: usize, dir: Direction) -> Option<usize> {
        let (x, y) = self.xy(i);
        step_xy(x, y, dir, self.w, self.h).map(|(nx, ny)| ny * self.w + nx)
    }

    /// Flat indices of the up to 8 neighbors of `i`, clipped at the edges.
    pub fn neighbors8(&self, i: usize) -> impl Iterator<Item = usize> {
        let (x, y) = self.xy(i);
        let (w, h) = (self.w, self.h);
        Direction::ALL
            .into_iter()
            .filter_map(move |d| step_xy(x, y, d, w, h).map(|(nx, ny)| ny * w + nx))
    }
}

/// Step (x, y) along `dir`. Returns None outside the grid (no wrapping).
#[inline]
pub fn step_xy(x: usize, y: usize, dir: Direction, w: usize, h: usize) -> Option<(usize, usize)> {
    let (dy, dx) = dir.delta();
    let nx = x as i64 + dx as i64;
    let ny = y as i64 + dy as i64;
    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
        return None;
    }
    Some((nx as usize, ny as usize))
}
