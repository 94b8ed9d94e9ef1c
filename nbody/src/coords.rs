//! Point and mass-point arithmetic shared by the 2D and 3D trees.

use std::fmt::Debug;
use std::ops::{Index, IndexMut};

use cgmath::{EuclideanSpace, InnerSpace, Point2, Point3, Vector2, Vector3, Zero};

/// A position in 2D or 3D space.
///
/// Implemented for cgmath's `Point2<f64>` and `Point3<f64>`. Everything in the
/// tree is generic over this trait, so quadtree and octree share one
/// implementation.
pub trait Coords:
    Copy + PartialEq + Debug + Send + Sync + Index<usize, Output = f64> + IndexMut<usize> + 'static
{
    type Vector: InnerSpace<Scalar = f64>
        + Index<usize, Output = f64>
        + IndexMut<usize>
        + PartialEq
        + Debug
        + Send
        + Sync
        + 'static;

    /// Number of axes.
    const DIM: usize;
    /// Number of child slots of a branch, `2^DIM`.
    const CHILDREN: usize = 1 << Self::DIM;

    fn origin() -> Self;
    fn from_vec(v: Self::Vector) -> Self;
    fn to_vec(self) -> Self::Vector;

    /// Euclidean distance.
    #[inline]
    fn distance(self, other: Self) -> f64 {
        (other.to_vec() - self.to_vec()).magnitude()
    }

    /// Largest per-axis separation (Chebyshev distance).
    #[inline]
    fn max_axis_distance(self, other: Self) -> f64 {
        (0..Self::DIM).fold(0.0, |acc, i| f64::max(acc, (self[i] - other[i]).abs()))
    }

    #[inline]
    fn midpoint(self, other: Self) -> Self {
        Self::from_vec((self.to_vec() + other.to_vec()) * 0.5)
    }

    /// `self + dir * factor`
    #[inline]
    fn moved_by(self, dir: Self::Vector, factor: f64) -> Self {
        Self::from_vec(self.to_vec() + dir * factor)
    }
}

macro_rules! impl_coords {
    ($point:ident, $vector:ident, $dim:expr) => {
        impl Coords for $point<f64> {
            type Vector = $vector<f64>;

            const DIM: usize = $dim;

            #[inline]
            fn origin() -> Self {
                <Self as EuclideanSpace>::origin()
            }

            #[inline]
            fn from_vec(v: Self::Vector) -> Self {
                <Self as EuclideanSpace>::from_vec(v)
            }

            #[inline]
            fn to_vec(self) -> Self::Vector {
                <Self as EuclideanSpace>::to_vec(self)
            }
        }
    };
}

impl_coords!(Point2, Vector2, 2);
impl_coords!(Point3, Vector3, 3);

/// A position carrying mass: a single body, or the center of gravity and total
/// mass of a subtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassPoint<P: Coords> {
    pub pos: P,
    pub mass: f64,
}

impl<P: Coords> MassPoint<P> {
    pub fn new(pos: P, mass: f64) -> Self {
        Self { pos, mass }
    }

    pub fn empty() -> Self {
        Self {
            pos: P::origin(),
            mass: 0.0,
        }
    }

    /// Mass-weighted average position and summed mass. Massless input yields
    /// [`MassPoint::empty`].
    pub fn weighted_average(points: impl IntoIterator<Item = MassPoint<P>>) -> Self {
        let mut weighted = P::Vector::zero();
        let mut mass = 0.0;
        for point in points {
            weighted = weighted + point.pos.to_vec() * point.mass;
            mass += point.mass;
        }
        if mass > 0.0 {
            Self {
                pos: P::from_vec(weighted / mass),
                mass,
            }
        } else {
            Self::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_slot_count_follows_dimension() {
        assert_eq!(<Point2<f64> as Coords>::CHILDREN, 4);
        assert_eq!(<Point3<f64> as Coords>::CHILDREN, 8);
    }

    #[test]
    fn max_axis_distance_picks_widest_axis() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, -5.0, 2.0);
        assert_eq!(a.max_axis_distance(b), 5.0);
        assert_eq!(Coords::distance(a, Point3::new(3.0, 4.0, 0.0)), 5.0);
    }

    #[test]
    fn midpoint_is_halfway() {
        let m = Coords::midpoint(Point2::new(-1.0, 2.0), Point2::new(3.0, 4.0));
        assert_eq!(m, Point2::new(1.0, 3.0));
    }

    #[test]
    fn weighted_average_of_equal_masses_is_exact() {
        let avg = MassPoint::weighted_average([
            MassPoint::new(Point2::new(-1.0, 0.0), 10.0),
            MassPoint::new(Point2::new(1.0, 0.0), 10.0),
        ]);
        assert_eq!(avg.pos, Point2::new(0.0, 0.0));
        assert_eq!(avg.mass, 20.0);
    }

    #[test]
    fn weighted_average_leans_towards_heavier_point() {
        let avg = MassPoint::weighted_average([
            MassPoint::new(Point3::new(0.0, 0.0, 0.0), 3.0),
            MassPoint::new(Point3::new(4.0, 0.0, 0.0), 1.0),
        ]);
        assert_eq!(avg.pos, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn weighted_average_of_nothing_is_empty() {
        let avg = MassPoint::<Point3<f64>>::weighted_average([]);
        assert_eq!(avg, MassPoint::empty());
    }
}
