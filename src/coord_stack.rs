//! Bounded coordinate stack for flood fills
//!
//! Every flood fill (particles, walls, decoration, gravity mask) walks the
//! grid iteratively with an explicit stack bounded at one entry per pixel.
//! Overflow is reported, never grown past the bound, so a runaway fill
//! aborts instead of exhausting memory.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("maximum number of entries in the coordinate stack was exceeded")]
pub struct CoordStackOverflow;

pub struct CoordStack {
    stack: Vec<(u16, u16)>,
    limit: usize,
}

impl CoordStack {
    pub fn new(limit: usize) -> Self {
        CoordStack {
            stack: Vec::with_capacity(limit.min(1 << 16)),
            limit,
        }
    }

    pub fn push(&mut self, x: i32, y: i32) -> Result<(), CoordStackOverflow> {
        if self.stack.len() >= self.limit {
            return Err(CoordStackOverflow);
        }
        self.stack.push((x as u16, y as u16));
        Ok(())
    }

    pub fn pop(&mut self) -> Option<(i32, i32)> {
        self.stack.pop().map(|(x, y)| (x as i32, y as i32))
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut cs = CoordStack::new(8);
        cs.push(1, 2).unwrap();
        cs.push(3, 4).unwrap();
        assert_eq!(cs.pop(), Some((3, 4)));
        assert_eq!(cs.pop(), Some((1, 2)));
        assert_eq!(cs.pop(), None);
    }

    #[test]
    fn overflow_is_reported_at_the_limit() {
        let mut cs = CoordStack::new(2);
        cs.push(0, 0).unwrap();
        cs.push(0, 1).unwrap();
        assert_eq!(cs.push(0, 2), Err(CoordStackOverflow));
        assert_eq!(cs.len(), 2);
    }
}
