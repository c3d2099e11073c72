//! k-DOP types and the fixed slab directions they project onto.

use std::fmt;

use nalgebra::{Point3, Vector3};

use crate::error::BvhError;

/// Number of distinct slab directions shared by every k-DOP type.
pub const KDOP_AXIS_COUNT: usize = 13;

/// The slab directions. They are intentionally not normalized, see
/// [`KDOP_AXIS_LENGTHS`].
pub const KDOP_AXES: [[f32; 3]; KDOP_AXIS_COUNT] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, -1.0, 0.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, -1.0],
];

/// Euclidean length of each entry of [`KDOP_AXES`].
///
/// Inflating a projection interval by `distance * length` grows the hull by
/// `distance` in world space.
pub const KDOP_AXIS_LENGTHS: [f32; KDOP_AXIS_COUNT] = [
    1.0,
    1.0,
    1.0,
    1.732_050_8,
    1.732_050_8,
    1.732_050_8,
    1.732_050_8,
    1.414_213_6,
    1.414_213_6,
    1.414_213_6,
    1.414_213_6,
    1.414_213_6,
    1.414_213_6,
];

const AXES_6: [usize; 3] = [0, 1, 2];
const AXES_8: [usize; 4] = [0, 1, 2, 3];
const AXES_14: [usize; 7] = [0, 1, 2, 3, 4, 5, 6];
const AXES_18: [usize; 9] = [0, 1, 2, 7, 8, 9, 10, 11, 12];
const AXES_26: [usize; 13] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

/// The bounding volume flavour of a tree.
///
/// Every type starts with the x, y and z slabs, so the first three
/// [`AxisRange`]s of any node always form its axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdopType {
    /// Axis-aligned box.
    Kdop6,
    /// Box plus the `(1, 1, 1)` diagonal slab.
    Kdop8,
    /// Box plus the four corner diagonals.
    Kdop14,
    /// Box plus the six edge diagonals.
    Kdop18,
    /// All thirteen directions.
    Kdop26,
}

impl KdopType {
    /// Maps a k-DOP axis count (6, 8, 14, 18 or 26) to its type.
    pub fn from_axis_count(axis_count: usize) -> Result<Self, BvhError> {
        match axis_count {
            6 => Ok(Self::Kdop6),
            8 => Ok(Self::Kdop8),
            14 => Ok(Self::Kdop14),
            18 => Ok(Self::Kdop18),
            26 => Ok(Self::Kdop26),
            other => Err(BvhError::UnsupportedAxisCount(other)),
        }
    }

    /// The `k` of this k-DOP.
    pub fn axis_count(self) -> usize {
        match self {
            Self::Kdop6 => 6,
            Self::Kdop8 => 8,
            Self::Kdop14 => 14,
            Self::Kdop18 => 18,
            Self::Kdop26 => 26,
        }
    }

    /// Indices into [`KDOP_AXES`], in storage order.
    pub fn axes(self) -> &'static [usize] {
        match self {
            Self::Kdop6 => &AXES_6,
            Self::Kdop8 => &AXES_8,
            Self::Kdop14 => &AXES_14,
            Self::Kdop18 => &AXES_18,
            Self::Kdop26 => &AXES_26,
        }
    }

    /// Number of [`AxisRange`]s stored per node.
    #[inline]
    pub fn axis_len(self) -> usize {
        self.axes().len()
    }

    /// Whether trees of these two types may be overlapped.
    ///
    /// The 14-DOP and 18-DOP diagonal sets share nothing beyond the box, and
    /// mixing them is rejected outright.
    pub fn is_compatible(self, other: Self) -> bool {
        let pair = [self, other];
        self == other || !(pair.contains(&Self::Kdop14) && pair.contains(&Self::Kdop18))
    }

    /// Number of leading axes both types store identically.
    pub fn shared_axis_len(self, other: Self) -> usize {
        self.axes()
            .iter()
            .zip(other.axes())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl TryFrom<usize> for KdopType {
    type Error = BvhError;

    fn try_from(axis_count: usize) -> Result<Self, Self::Error> {
        Self::from_axis_count(axis_count)
    }
}

impl fmt::Display for KdopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-DOP", self.axis_count())
    }
}

/// Projection of a point onto a slab direction.
#[inline]
pub fn project(point: &Point3<f32>, axis: usize) -> f32 {
    let [x, y, z] = KDOP_AXES[axis];
    Vector3::new(x, y, z).dot(&point.coords)
}

/// The extent of a bounding volume along one slab direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    /// Smallest projection.
    pub min: f32,
    /// Largest projection.
    pub max: f32,
}

impl AxisRange {
    /// An inverted range that any value extends.
    pub const EMPTY: Self = Self {
        min: f32::MAX,
        max: -f32::MAX,
    };

    /// Creates a range from its bounds.
    #[inline]
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Grows the range to contain `value`.
    #[inline]
    pub fn extend(&mut self, value: f32) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// Grows the range to contain `other`.
    #[inline]
    pub fn union(&mut self, other: &Self) {
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
    }

    /// Moves both bounds outward by `amount`.
    #[inline]
    pub fn inflate(&mut self, amount: f32) {
        self.min -= amount;
        self.max += amount;
    }

    /// `max - min`.
    #[inline]
    pub fn extent(&self) -> f32 {
        self.max - self.min
    }

    /// Closed interval overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.min > other.max || other.min > self.max)
    }

    /// Whether `other` lies within this range.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min <= other.min && self.max >= other.max
    }

    /// Clamps `value` into the range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        let mut value = value;
        if self.min > value {
            value = self.min;
        }
        if self.max < value {
            value = self.max;
        }
        value
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Index (0, 1 or 2) of the longest box axis of a bounding volume.
///
/// Ties go to the later axis.
pub fn largest_box_axis(bounds: &[AxisRange]) -> u8 {
    let x = bounds[0].extent();
    let y = bounds[1].extent();
    let z = bounds[2].extent();
    if x > y {
        if x > z { 0 } else { 2 }
    } else if y > z {
        1
    } else {
        2
    }
}
