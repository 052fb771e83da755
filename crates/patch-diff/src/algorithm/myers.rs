//! Myers diff algorithm in linear space.
//!
//! Implements Eugene Myers' O(ND) difference algorithm as described in
//! "An O(ND) Difference Algorithm and Its Variations" (1986), using the
//! divide-and-conquer "middle snake" refinement so memory stays linear in
//! the input size. Common prefixes and suffixes are stripped at every level
//! of the recursion.

use super::{CancelToken, Cancelled, EditSink};
use crate::edit::Edit;

/// Diff `a` against `b`, appending edits to `sink`.
pub(crate) fn diff<T: Eq>(
    a: &[T],
    b: &[T],
    cancel: &CancelToken,
    sink: &mut EditSink,
) -> Result<(), Cancelled> {
    diff_range(a, 0, a.len(), b, 0, b.len(), cancel, sink)
}

/// Diff the sub-ranges `a[a_lo..a_hi]` and `b[b_lo..b_hi]`, reporting
/// edits in whole-sequence coordinates.
#[allow(clippy::too_many_arguments)]
pub(crate) fn diff_range<T: Eq>(
    a: &[T],
    a_lo: usize,
    a_hi: usize,
    b: &[T],
    b_lo: usize,
    b_hi: usize,
    cancel: &CancelToken,
    sink: &mut EditSink,
) -> Result<(), Cancelled> {
    let max_d = max_d(a_hi - a_lo, b_hi - b_lo);
    let mut vf = V::new(max_d);
    let mut vb = V::new(max_d);
    conquer(a, a_lo, a_hi, b, b_lo, b_hi, &mut vf, &mut vb, cancel, sink)
}

fn max_d(n: usize, m: usize) -> usize {
    (n + m + 1) / 2 + 1
}

/// Furthest-reaching x per diagonal, indexed by signed diagonal number.
struct V {
    offset: isize,
    v: Vec<usize>,
}

impl V {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize + 1,
            v: vec![0; 2 * max_d + 3],
        }
    }

    fn get(&self, k: isize) -> usize {
        self.v[(k + self.offset) as usize]
    }

    fn set(&mut self, k: isize, x: usize) {
        self.v[(k + self.offset) as usize] = x;
    }
}

#[allow(clippy::too_many_arguments)]
fn conquer<T: Eq>(
    a: &[T],
    mut a_lo: usize,
    mut a_hi: usize,
    b: &[T],
    mut b_lo: usize,
    mut b_hi: usize,
    vf: &mut V,
    vb: &mut V,
    cancel: &CancelToken,
    sink: &mut EditSink,
) -> Result<(), Cancelled> {
    cancel.check()?;

    // Trim common prefix
    while a_lo < a_hi && b_lo < b_hi && a[a_lo] == b[b_lo] {
        a_lo += 1;
        b_lo += 1;
    }

    // Trim common suffix
    while a_lo < a_hi && b_lo < b_hi && a[a_hi - 1] == b[b_hi - 1] {
        a_hi -= 1;
        b_hi -= 1;
    }

    if a_lo == a_hi || b_lo == b_hi {
        sink.push(Edit::new(a_lo, a_hi, b_lo, b_hi));
        return Ok(());
    }

    match middle_snake(a, a_lo, a_hi, b, b_lo, b_hi, vf, vb, cancel)? {
        Some((x, y)) if (x, y) != (a_lo, b_lo) && (x, y) != (a_hi, b_hi) => {
            conquer(a, a_lo, x, b, b_lo, y, vf, vb, cancel, sink)?;
            conquer(a, x, a_hi, b, y, b_hi, vf, vb, cancel, sink)
        }
        _ => {
            sink.push(Edit::new(a_lo, a_hi, b_lo, b_hi));
            Ok(())
        }
    }
}

/// Find the start of the middle snake of an optimal path through the edit
/// graph of the two ranges. Both ranges are non-empty and share no common
/// prefix or suffix.
#[allow(clippy::too_many_arguments)]
fn middle_snake<T: Eq>(
    a: &[T],
    a_lo: usize,
    a_hi: usize,
    b: &[T],
    b_lo: usize,
    b_hi: usize,
    vf: &mut V,
    vb: &mut V,
    cancel: &CancelToken,
) -> Result<Option<(usize, usize)>, Cancelled> {
    let n = a_hi - a_lo;
    let m = b_hi - b_lo;
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;
    vf.set(1, 0);
    vb.set(1, 0);

    let d_max = max_d(n, m) as isize;
    for d in 0..d_max {
        cancel.check()?;

        // Forward path
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && vf.get(k - 1) < vf.get(k + 1)) {
                vf.get(k + 1)
            } else {
                vf.get(k - 1) + 1
            };
            let y = x as isize - k;
            let (x0, y0) = (x, y);
            if x < n && y >= 0 && (y as usize) < m {
                let mut y = y as usize;
                while x < n && y < m && a[a_lo + x] == b[b_lo + y] {
                    x += 1;
                    y += 1;
                }
            }
            vf.set(k, x);
            if odd && (k - delta).abs() <= d - 1 && vf.get(k) + vb.get(-(k - delta)) >= n {
                let x0 = x0.min(n);
                let y0 = y0.clamp(0, m as isize) as usize;
                return Ok(Some((a_lo + x0, b_lo + y0)));
            }
            k -= 2;
        }

        // Backward path
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && vb.get(k - 1) < vb.get(k + 1)) {
                vb.get(k + 1)
            } else {
                vb.get(k - 1) + 1
            };
            let mut y = x as isize - k;
            if x < n && y >= 0 && (y as usize) < m {
                while x < n
                    && (y as usize) < m
                    && a[a_hi - x - 1] == b[b_hi - y as usize - 1]
                {
                    x += 1;
                    y += 1;
                }
            }
            vb.set(k, x);
            if !odd && (k - delta).abs() <= d && vb.get(k) + vf.get(-(k - delta)) >= n {
                let x = n.saturating_sub(x);
                let y = (m as isize - y).clamp(0, m as isize) as usize;
                return Ok(Some((a_lo + x, b_lo + y)));
            }
            k -= 2;
        }
    }
    Ok(None)
}
