use crate::{constants::REGION_SAFETY_FACTOR, coords::Coords};

/// Axis-aligned square (2D) or cube (3D), given by its center and half-extent.
///
/// Child slots are numbered by one bit per axis: the bit is set when the
/// coordinate lies strictly above the center on that axis. Points on a
/// dividing plane belong to the lower child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region<P: Coords> {
    pub center: P,
    pub len: f64,
}

impl<P: Coords> Region<P> {
    pub fn new(center: P, len: f64) -> Self {
        Self { center, len }
    }

    /// Smallest region the tree seeds for two bodies.
    pub fn around(a: P, b: P) -> Self {
        Self {
            center: a.midpoint(b),
            len: a.max_axis_distance(b) * REGION_SAFETY_FACTOR,
        }
    }

    /// Full edge length.
    #[inline]
    pub fn size(&self) -> f64 {
        2.0 * self.len
    }

    /// Closed-interval containment on every axis.
    #[inline]
    pub fn contains(&self, pt: &P) -> bool {
        (0..P::DIM)
            .all(|i| self.center[i] - self.len <= pt[i] && pt[i] <= self.center[i] + self.len)
    }

    #[inline]
    pub fn child_index(&self, pt: &P) -> usize {
        (0..P::DIM).fold(0, |index, i| {
            index | (usize::from(pt[i] > self.center[i]) << i)
        })
    }

    /// The region of child slot `index`.
    pub fn child(&self, index: usize) -> Self {
        let len = self.len / 2.0;
        let mut center = self.center;
        for i in 0..P::DIM {
            if index & (1 << i) != 0 {
                center[i] += len;
            } else {
                center[i] -= len;
            }
        }
        Self { center, len }
    }

    /// Descend one level into the child that contains `pt`.
    pub fn shrink_toward(&mut self, pt: &P) {
        *self = self.child(self.child_index(pt));
    }

    /// Double the region away from `pt` until it is contained. The old region
    /// stays one of the children of the result.
    pub fn enlarge_to_contain(&mut self, pt: &P) {
        while !self.contains(pt) {
            for i in 0..P::DIM {
                if pt[i] <= self.center[i] {
                    self.center[i] -= self.len;
                } else {
                    self.center[i] += self.len;
                }
            }
            self.len *= 2.0;
        }
    }

    /// Shrink towards `a` until `a` and `b` fall into different children
    /// while both stay inside. Returns `false` when no cell tells them apart:
    /// they coincide, or sit so few ulps apart that halving stops moving the
    /// center or rounds a point out of the cell.
    pub fn shrink_until_distinct(&mut self, a: &P, b: &P) -> bool {
        loop {
            let index = self.child_index(a);
            if index != self.child_index(b) {
                return self.contains(a) && self.contains(b);
            }
            let child = self.child(index);
            let moved = (0..P::DIM).all(|i| child.center[i] != self.center[i]);
            if !moved || !child.contains(a) || !child.contains(b) {
                return false;
            }
            *self = child;
        }
    }

    /// Shrink towards `inner` while it and `pt` share a child that is still
    /// larger than `inner`. Returns whether they ended up in different
    /// children.
    pub fn separate(&mut self, inner: &Region<P>, pt: &P) -> bool {
        loop {
            let index = self.child_index(&inner.center);
            if index != self.child_index(pt) {
                return true;
            }
            let child = self.child(index);
            if child.len <= inner.len {
                return false;
            }
            *self = child;
        }
    }

    /// Whether `inner` fits child slot `index`, judged by its center and
    /// extent. Nested regions are rebuilt by halving, so exact edges can be
    /// off by rounding.
    pub fn holds(&self, index: usize, inner: &Region<P>) -> bool {
        let cell = self.child(index);
        cell.contains(&inner.center)
            && self.child_index(&inner.center) == index
            && inner.len <= cell.len
    }

    /// Whether `other` lies completely inside this region.
    pub fn encloses(&self, other: &Region<P>) -> bool {
        (0..P::DIM).all(|i| {
            self.center[i] - self.len <= other.center[i] - other.len
                && other.center[i] + other.len <= self.center[i] + self.len
        })
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point2, Point3};

    use super::*;

    fn unit_square() -> Region<Point2<f64>> {
        Region::new(Point2::new(0.0, 0.0), 1.0)
    }

    #[test]
    fn boundary_is_inside() {
        let region = unit_square();
        assert!(region.contains(&Point2::new(1.0, -1.0)));
        assert!(region.contains(&Point2::new(0.0, 0.0)));
        assert!(!region.contains(&Point2::new(1.0 + 1e-12, 0.0)));
    }

    #[test]
    fn child_index_sets_one_bit_per_axis() {
        let region = Region::new(Point3::new(0.0, 0.0, 0.0), 1.0);
        assert_eq!(region.child_index(&Point3::new(-0.5, -0.5, -0.5)), 0);
        assert_eq!(region.child_index(&Point3::new(0.5, -0.5, -0.5)), 1);
        assert_eq!(region.child_index(&Point3::new(-0.5, 0.5, -0.5)), 2);
        assert_eq!(region.child_index(&Point3::new(0.5, 0.5, 0.5)), 7);
        // ties go to the lower side
        assert_eq!(region.child_index(&Point3::new(0.0, 0.0, 0.0)), 0);
    }

    #[test]
    fn child_regions_match_child_index() {
        let region = unit_square();
        for index in 0..4 {
            let child = region.child(index);
            assert_eq!(child.len, 0.5);
            assert_eq!(region.child_index(&child.center), index);
            assert!(region.encloses(&child));
        }
    }

    #[test]
    fn shrink_toward_keeps_point_inside() {
        let mut region = unit_square();
        let pt = Point2::new(0.3, -0.9);
        region.shrink_toward(&pt);
        assert_eq!(region, Region::new(Point2::new(0.5, -0.5), 0.5));
        assert!(region.contains(&pt));
    }

    #[test]
    fn enlarge_doubles_until_contained() {
        let mut region = unit_square();
        let pt = Point2::new(5.0, -0.5);
        region.enlarge_to_contain(&pt);
        assert!(region.contains(&pt));
        assert_eq!(region, Region::new(Point2::new(3.0, 1.0), 4.0));
        assert!(region.encloses(&unit_square()));
        // the old region is exactly one of the new children
        let old = unit_square();
        let mut child = region;
        while child.len > old.len {
            child.shrink_toward(&old.center);
        }
        assert_eq!(child, old);
    }

    #[test]
    fn shrink_until_distinct_separates_close_points() {
        let mut region = unit_square();
        let a = Point2::new(0.1, 0.1);
        let b = Point2::new(0.1 + 1e-6, 0.1);
        assert!(region.shrink_until_distinct(&a, &b));
        assert_ne!(region.child_index(&a), region.child_index(&b));
        assert!(region.contains(&a) && region.contains(&b));
        assert!(region.len < 1e-5);
    }

    #[test]
    fn shrink_until_distinct_is_noop_when_already_distinct() {
        let mut region = unit_square();
        assert!(region.shrink_until_distinct(&Point2::new(-0.5, -0.5), &Point2::new(0.5, 0.5)));
        assert_eq!(region, unit_square());
    }

    #[test]
    fn shrink_until_distinct_gives_up_on_coincident_points() {
        let mut region = unit_square();
        let a = Point2::new(0.25, 0.25);
        assert!(!region.shrink_until_distinct(&a, &a));
        assert!(region.len > 0.0 && region.len < 1e-10);
    }

    #[test]
    fn shrink_until_distinct_handles_ulp_neighbours() {
        let x = -0.5149999999999996_f64;
        let neighbours = [
            (x, f64::from_bits(x.to_bits() - 1)),
            (x, f64::from_bits(x.to_bits() + 1)),
            (0.3, f64::from_bits(0.3_f64.to_bits() + 2)),
            (1.0 / 3.0, f64::from_bits((1.0_f64 / 3.0).to_bits() + 16)),
        ];
        for start in [unit_square(), Region::new(Point2::new(-10.3, 0.0), 20.6)] {
            for (ax, bx) in neighbours {
                let a = Point2::new(ax, 0.0);
                let b = Point2::new(bx, 0.0);
                let mut region = start;
                if region.shrink_until_distinct(&a, &b) {
                    assert_ne!(region.child_index(&a), region.child_index(&b));
                    assert!(region.contains(&a) && region.contains(&b));
                }
                assert!(region.len > 0.0, "{a:?} and {b:?} collapsed the region");
            }
        }
    }

    #[test]
    fn separate_stops_above_the_inner_region() {
        let inner = Region::new(Point2::new(0.75, 0.75), 0.25);

        let mut region = Region::new(Point2::new(0.0, 0.0), 4.0);
        assert!(region.separate(&inner, &Point2::new(1.5, 0.1)));
        assert_eq!(region, Region::new(Point2::new(1.0, 1.0), 1.0));

        // a point in the inner region's own cell cannot be separated from it
        let mut region = Region::new(Point2::new(0.0, 0.0), 1.0);
        assert!(!region.separate(&inner, &Point2::new(0.9, 0.9)));
        assert_eq!(region.len, 0.5);
    }

    #[test]
    fn holds_accepts_children_and_their_descendants() {
        let region = unit_square();
        let cell = region.child(3);
        assert!(region.holds(3, &cell));
        assert!(!region.holds(2, &cell));
        assert!(region.holds(3, &cell.child(0)));
        assert!(!region.holds(3, &region));
    }

    #[test]
    fn around_contains_both_points_with_margin() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(149.6e9, 0.0);
        let region = Region::around(a, b);
        assert!(region.contains(&a) && region.contains(&b));
        assert!(region.len > 149.6e9);
    }
}
