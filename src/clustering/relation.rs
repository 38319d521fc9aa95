/// What is known about an ordered pair of clusters `(i, j)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Relation {
    /// Neither ordered nor (yet) similar.
    #[default]
    Unknown,
    /// `i` must precede `j`; the two may never be merged.
    Ordered,
    /// Candidate for merging, with a positive similarity.
    Similar(f64),
}

impl Relation {
    /// `Similar(s)` for positive `s`, `Unknown` otherwise.
    pub fn from_similarity(s: f64) -> Self {
        if s > 0.0 {
            Relation::Similar(s)
        } else {
            Relation::Unknown
        }
    }
}

/// Dense `n x n` matrix of [`Relation`]s, indexed by stage-local cluster id.
#[derive(Debug, Clone)]
pub struct SimMatrix {
    n: usize,
    cells: Vec<Relation>,
}

impl SimMatrix {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            cells: vec![Relation::Unknown; n * n],
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Relation {
        self.cells[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, rel: Relation) {
        self.cells[i * self.n + j] = rel;
    }

    pub fn order(&mut self, i: usize, j: usize) {
        self.set(i, j, Relation::Ordered);
    }

    pub fn is_ordered(&self, i: usize, j: usize) -> bool {
        self.get(i, j) == Relation::Ordered
    }

    pub fn is_unknown(&self, i: usize, j: usize) -> bool {
        self.get(i, j) == Relation::Unknown
    }

    /// Ordered in either direction.
    pub fn is_constrained(&self, i: usize, j: usize) -> bool {
        self.is_ordered(i, j) || self.is_ordered(j, i)
    }

    /// The similarity of `(i, j)`, or 0 when there is none.
    pub fn sim(&self, i: usize, j: usize) -> f64 {
        match self.get(i, j) {
            Relation::Similar(s) => s,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_unknown() {
        let m = SimMatrix::new(3);
        assert_eq!(m.len(), 3);
        assert!(m.is_unknown(0, 2));
        assert_eq!(m.sim(1, 2), 0.0);
    }

    #[test]
    fn test_ordering_is_directed() {
        let mut m = SimMatrix::new(2);
        m.order(0, 1);
        assert!(m.is_ordered(0, 1));
        assert!(!m.is_ordered(1, 0));
        assert!(m.is_constrained(1, 0));
        assert_eq!(m.sim(0, 1), 0.0);
    }

    #[test]
    fn test_from_similarity() {
        assert_eq!(Relation::from_similarity(0.25), Relation::Similar(0.25));
        assert_eq!(Relation::from_similarity(0.0), Relation::Unknown);
        assert_eq!(Relation::from_similarity(-1.0), Relation::Unknown);
    }
}
