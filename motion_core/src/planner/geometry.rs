//! Path geometry of queued segments.
//!
//! Every geometry is parameterised by arc length `s ∈ [0, length]`.

use core::f64::consts::{PI, TAU};

use heapless::Vec;
use motion_common::error::Infeasible;
use motion_common::geometry::Cartesian;

/// Moves shorter than this are dropped by the planner.
pub const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Upper bound of [`Arc::extrema`]: two per axis.
pub const MAX_EXTREMA: usize = 6;

/// Arc sweep below which start and end are treated as coincident.
const MIN_SWEEP: f64 = 1e-12;

/// Kind of a queued segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegmentKind {
    Line = 0,
    Arc = 1,
    RigidTap = 2,
    Dwell = 3,
}

impl SegmentKind {
    /// Whether the segment may pass through its end point at speed.
    #[inline]
    pub const fn is_blendable(self) -> bool {
        matches!(self, Self::Line | Self::Arc)
    }

    /// Whether the executor applies feed override to this segment.
    #[inline]
    pub const fn follows_feed_override(self) -> bool {
        matches!(self, Self::Line | Self::Arc)
    }
}

/// Which half of a rigid-tap cycle a segment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TapPhase {
    /// Feeding into the hole.
    Feed = 0,
    /// Retracting after the reversal.
    Retract = 1,
}

// ─── Line ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    start: Cartesian,
    end: Cartesian,
    unit: Cartesian,
    length: f64,
}

impl Line {
    pub fn new(start: Cartesian, end: Cartesian) -> Result<Self, Infeasible> {
        if !start.is_finite() || !end.is_finite() {
            return Err(Infeasible::NonFinite);
        }
        let delta = end - start;
        let length = delta.norm();
        if length < MIN_SEGMENT_LENGTH {
            return Err(Infeasible::DegenerateGeometry("zero-length line"));
        }
        Ok(Self {
            start,
            end,
            unit: delta * (1.0 / length),
            length,
        })
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn direction(&self) -> Cartesian {
        self.unit
    }

    #[inline]
    pub fn point_at(&self, s: f64) -> Cartesian {
        if s >= self.length {
            self.end
        } else {
            self.start + self.unit * s.max(0.0)
        }
    }
}

// ─── Arc ────────────────────────────────────────────────────────────

/// Circular or helical arc, counter-clockwise about `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    start: Cartesian,
    end: Cartesian,
    /// Center projected into the plane through `start`.
    center: Cartesian,
    normal: Cartesian,
    /// `start − center`.
    r0: Cartesian,
    /// `normal × r0`, the in-plane direction of travel at the start.
    r0_perp: Cartesian,
    radius: f64,
    /// Swept angle [rad], including extra turns.
    sweep: f64,
    /// Travel along `normal` from start to end.
    rise: f64,
    length: f64,
}

impl Arc {
    /// Build an arc from its endpoints, center and rotation axis.
    ///
    /// `start == end` describes a full circle. `turns` adds full
    /// revolutions. Start and end must be equidistant from the center
    /// within `radius_tolerance`.
    pub fn new(
        start: Cartesian,
        end: Cartesian,
        center: Cartesian,
        normal: Cartesian,
        turns: u32,
        radius_tolerance: f64,
    ) -> Result<Self, Infeasible> {
        if !start.is_finite() || !end.is_finite() || !center.is_finite() {
            return Err(Infeasible::NonFinite);
        }
        let normal = normal
            .unit()
            .ok_or(Infeasible::DegenerateGeometry("arc normal has no direction"))?;
        let center = center + normal * (start - center).dot(&normal);
        let r0 = start - center;
        let r1 = (end - center).reject(&normal);
        let radius = r0.norm();
        let end_radius = r1.norm();
        if radius < MIN_SEGMENT_LENGTH {
            return Err(Infeasible::DegenerateGeometry("zero arc radius"));
        }
        if (end_radius - radius).abs() > radius_tolerance {
            return Err(Infeasible::ArcRadiusMismatch {
                start_radius: radius,
                end_radius,
            });
        }

        let mut sweep = r0.cross(&r1).dot(&normal).atan2(r0.dot(&r1));
        if sweep <= MIN_SWEEP {
            sweep += TAU;
        }
        sweep += TAU * turns as f64;
        let rise = (end - center).dot(&normal);
        let length = (radius * sweep).hypot(rise);

        Ok(Self {
            start,
            end,
            center,
            normal,
            r0,
            r0_perp: normal.cross(&r0),
            radius,
            sweep,
            rise,
            length,
        })
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn sweep(&self) -> f64 {
        self.sweep
    }

    /// Travel along the normal (helix pitch times turns).
    #[inline]
    pub fn rise(&self) -> f64 {
        self.rise
    }

    #[inline]
    pub fn normal(&self) -> Cartesian {
        self.normal
    }

    #[inline]
    pub fn center(&self) -> Cartesian {
        self.center
    }

    #[inline]
    fn point_at_angle(&self, phi: f64) -> Cartesian {
        let (sin, cos) = phi.sin_cos();
        self.center + self.r0 * cos + self.r0_perp * sin + self.normal * (self.rise * phi / self.sweep)
    }

    pub fn point_at(&self, s: f64) -> Cartesian {
        if s >= self.length {
            return self.end;
        }
        self.point_at_angle(self.sweep * s.max(0.0) / self.length)
    }

    pub fn tangent_at(&self, s: f64) -> Cartesian {
        let phi = self.sweep * s.clamp(0.0, self.length) / self.length;
        let (sin, cos) = phi.sin_cos();
        let d = (self.r0_perp * cos - self.r0 * sin) * self.sweep + self.normal * self.rise;
        d.unit().unwrap_or(self.r0_perp * (1.0 / self.radius))
    }

    /// Points where some axis reaches an extreme strictly between the
    /// endpoints. Later revolutions repeat the in-plane extremes and the
    /// rise is linear, so only the first revolution is searched.
    pub fn extrema(&self) -> Vec<Cartesian, MAX_EXTREMA> {
        let mut points = Vec::new();
        let limit = self.sweep.min(TAU);
        for axis in 0..3 {
            let extreme = self.r0_perp.axis(axis).atan2(self.r0.axis(axis));
            for base in [extreme, extreme + PI] {
                let phi = base.rem_euclid(TAU);
                if phi > MIN_SWEEP && phi < limit {
                    let _ = points.push(self.point_at_angle(phi));
                }
            }
        }
        points
    }

    /// Axis-aligned bounds including the extrema between the endpoints.
    pub fn bounds(&self) -> (Cartesian, Cartesian) {
        let mut lo = self.start.min(&self.end);
        let mut hi = self.start.max(&self.end);
        for p in self.extrema() {
            lo = lo.min(&p);
            hi = hi.max(&p);
        }
        (lo, hi)
    }
}

// ─── Geometry ───────────────────────────────────────────────────────

/// Shape of a queued segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    Line(Line),
    Arc(Arc),
    RigidTap { line: Line, phase: TapPhase },
    Dwell { position: Cartesian, seconds: f64 },
}

impl Geometry {
    #[inline]
    pub fn kind(&self) -> SegmentKind {
        match self {
            Self::Line(_) => SegmentKind::Line,
            Self::Arc(_) => SegmentKind::Arc,
            Self::RigidTap { .. } => SegmentKind::RigidTap,
            Self::Dwell { .. } => SegmentKind::Dwell,
        }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        match self {
            Self::Line(line) | Self::RigidTap { line, .. } => line.length(),
            Self::Arc(arc) => arc.length(),
            Self::Dwell { .. } => 0.0,
        }
    }

    /// World position at arc length `s` (clamped to the segment).
    #[inline]
    pub fn point_at(&self, s: f64) -> Cartesian {
        match self {
            Self::Line(line) | Self::RigidTap { line, .. } => line.point_at(s),
            Self::Arc(arc) => arc.point_at(s),
            Self::Dwell { position, .. } => *position,
        }
    }

    /// Unit tangent at arc length `s`; zero for a dwell.
    #[inline]
    pub fn tangent_at(&self, s: f64) -> Cartesian {
        match self {
            Self::Line(line) | Self::RigidTap { line, .. } => line.direction(),
            Self::Arc(arc) => arc.tangent_at(s),
            Self::Dwell { .. } => Cartesian::ZERO,
        }
    }

    #[inline]
    pub fn start_point(&self) -> Cartesian {
        self.point_at(0.0)
    }

    #[inline]
    pub fn end_point(&self) -> Cartesian {
        self.point_at(self.length())
    }

    #[inline]
    pub fn start_tangent(&self) -> Cartesian {
        self.tangent_at(0.0)
    }

    #[inline]
    pub fn end_tangent(&self) -> Cartesian {
        self.tangent_at(self.length())
    }

    /// Axis-aligned bounding box of the whole path.
    pub fn bounds(&self) -> (Cartesian, Cartesian) {
        match self {
            Self::Arc(arc) => arc.bounds(),
            _ => {
                let (a, b) = (self.start_point(), self.end_point());
                (a.min(&b), a.max(&b))
            }
        }
    }
}
