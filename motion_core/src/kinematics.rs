//! Kinematics adapters: world pose ↔ joint positions.
//!
//! The executor is generic over [`Kinematics`] so the adapter call is
//! statically dispatched in the tick. Adapters are pure functions of their
//! input and never allocate.

use motion_common::config::KinematicsKind;
use motion_common::error::KinematicsError;
use motion_common::geometry::Cartesian;

/// Maps world poses to joint positions and back.
pub trait Kinematics {
    /// Number of joints written by [`inverse`](Self::inverse).
    fn joint_count(&self) -> usize;

    /// Joint positions for `pose`, written to `joints[..joint_count]`.
    fn inverse(&self, pose: &Cartesian, joints: &mut [f64]) -> Result<(), KinematicsError>;

    /// World pose for `joints[..joint_count]`.
    fn forward(&self, joints: &[f64]) -> Result<Cartesian, KinematicsError>;
}

#[inline]
fn check_len(expected: usize, got: usize) -> Result<(), KinematicsError> {
    if got < expected {
        Err(KinematicsError::JointCount { expected, got })
    } else {
        Ok(())
    }
}

#[inline]
fn check_pose(pose: &Cartesian) -> Result<(), KinematicsError> {
    if pose.is_finite() {
        Ok(())
    } else {
        Err(KinematicsError::Singularity {
            x: pose.x,
            y: pose.y,
            z: pose.z,
            reason: "non-finite pose",
        })
    }
}

/// X, Y, Z drive joints 0, 1, 2 directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrivialKinematics;

impl Kinematics for TrivialKinematics {
    fn joint_count(&self) -> usize {
        3
    }

    fn inverse(&self, pose: &Cartesian, joints: &mut [f64]) -> Result<(), KinematicsError> {
        check_len(3, joints.len())?;
        check_pose(pose)?;
        joints[0] = pose.x;
        joints[1] = pose.y;
        joints[2] = pose.z;
        Ok(())
    }

    fn forward(&self, joints: &[f64]) -> Result<Cartesian, KinematicsError> {
        check_len(3, joints.len())?;
        Ok(Cartesian::new(joints[0], joints[1], joints[2]))
    }
}

/// CoreXY gantry: two belt motors A = X + Y and B = X − Y, Z direct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreXyKinematics;

impl Kinematics for CoreXyKinematics {
    fn joint_count(&self) -> usize {
        3
    }

    fn inverse(&self, pose: &Cartesian, joints: &mut [f64]) -> Result<(), KinematicsError> {
        check_len(3, joints.len())?;
        check_pose(pose)?;
        joints[0] = pose.x + pose.y;
        joints[1] = pose.x - pose.y;
        joints[2] = pose.z;
        Ok(())
    }

    fn forward(&self, joints: &[f64]) -> Result<Cartesian, KinematicsError> {
        check_len(3, joints.len())?;
        Ok(Cartesian::new(
            0.5 * (joints[0] + joints[1]),
            0.5 * (joints[0] - joints[1]),
            joints[2],
        ))
    }
}

/// Adapter chosen at startup from [`KinematicsKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyKinematics {
    Trivial(TrivialKinematics),
    CoreXy(CoreXyKinematics),
}

impl From<KinematicsKind> for AnyKinematics {
    fn from(kind: KinematicsKind) -> Self {
        match kind {
            KinematicsKind::Trivial => Self::Trivial(TrivialKinematics),
            KinematicsKind::CoreXy => Self::CoreXy(CoreXyKinematics),
        }
    }
}

impl Kinematics for AnyKinematics {
    fn joint_count(&self) -> usize {
        match self {
            Self::Trivial(k) => k.joint_count(),
            Self::CoreXy(k) => k.joint_count(),
        }
    }

    fn inverse(&self, pose: &Cartesian, joints: &mut [f64]) -> Result<(), KinematicsError> {
        match self {
            Self::Trivial(k) => k.inverse(pose, joints),
            Self::CoreXy(k) => k.inverse(pose, joints),
        }
    }

    fn forward(&self, joints: &[f64]) -> Result<Cartesian, KinematicsError> {
        match self {
            Self::Trivial(k) => k.forward(joints),
            Self::CoreXy(k) => k.forward(joints),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_is_identity() {
        let k = TrivialKinematics;
        let mut joints = [0.0; 3];
        let pose = Cartesian::new(1.0, -2.0, 3.5);
        k.inverse(&pose, &mut joints).unwrap();
        assert_eq!(joints, [1.0, -2.0, 3.5]);
        assert_eq!(k.forward(&joints).unwrap(), pose);
    }

    #[test]
    fn corexy_round_trips() {
        let k = CoreXyKinematics;
        let mut joints = [0.0; 3];
        let pose = Cartesian::new(10.0, 4.0, -1.0);
        k.inverse(&pose, &mut joints).unwrap();
        assert_eq!(joints, [14.0, 6.0, -1.0]);
        assert_eq!(k.forward(&joints).unwrap(), pose);
    }

    #[test]
    fn short_joint_buffer_is_rejected() {
        let mut joints = [0.0; 2];
        assert_eq!(
            TrivialKinematics.inverse(&Cartesian::ZERO, &mut joints),
            Err(KinematicsError::JointCount {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn non_finite_pose_is_singular() {
        let mut joints = [0.0; 3];
        let pose = Cartesian::new(f64::NAN, 0.0, 0.0);
        assert!(matches!(
            CoreXyKinematics.inverse(&pose, &mut joints),
            Err(KinematicsError::Singularity { .. })
        ));
    }

    #[test]
    fn selected_from_config() {
        let k = AnyKinematics::from(KinematicsKind::CoreXy);
        assert_eq!(k, AnyKinematics::CoreXy(CoreXyKinematics));
        assert_eq!(k.joint_count(), 3);
    }
}
