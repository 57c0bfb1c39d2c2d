//! Joint command stage: positions from kinematics, velocity and
//! acceleration by finite difference over the tick period.

use motion_common::consts::MAX_JOINTS;
use motion_common::setpoint::JointSetpoint;

#[derive(Debug, Clone)]
pub struct JointStage {
    count: usize,
    dt: f64,
    positions: [f64; MAX_JOINTS],
    velocities: [f64; MAX_JOINTS],
}

impl JointStage {
    /// Stage at rest at `positions`.
    pub fn new(positions: &[f64], dt: f64) -> Self {
        let count = positions.len().min(MAX_JOINTS);
        let mut stage = Self {
            count,
            dt,
            positions: [0.0; MAX_JOINTS],
            velocities: [0.0; MAX_JOINTS],
        };
        stage.positions[..count].copy_from_slice(&positions[..count]);
        stage
    }

    #[inline]
    pub fn positions(&self) -> &[f64] {
        &self.positions[..self.count]
    }

    /// Command `next` and write the joint setpoints.
    pub fn update(&mut self, next: &[f64], out: &mut [JointSetpoint]) {
        let inv_dt = 1.0 / self.dt;
        for i in 0..self.count.min(next.len()).min(out.len()) {
            let velocity = (next[i] - self.positions[i]) * inv_dt;
            let acceleration = (velocity - self.velocities[i]) * inv_dt;
            self.positions[i] = next[i];
            self.velocities[i] = velocity;
            out[i] = JointSetpoint {
                position: next[i],
                velocity,
                acceleration,
            };
        }
    }

    /// Repeat the last positions with zero velocity.
    pub fn freeze(&mut self, out: &mut [JointSetpoint]) {
        for i in 0..self.count.min(out.len()) {
            self.velocities[i] = 0.0;
            out[i] = JointSetpoint {
                position: self.positions[i],
                velocity: 0.0,
                acceleration: 0.0,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differences_positions() {
        let mut stage = JointStage::new(&[0.0, 0.0], 0.001);
        let mut out = [JointSetpoint::default(); 2];
        stage.update(&[0.001, 0.0], &mut out);
        assert!((out[0].velocity - 1.0).abs() < 1e-9);
        assert!((out[0].acceleration - 1000.0).abs() < 1e-6);
        stage.update(&[0.002, 0.0], &mut out);
        assert!((out[0].velocity - 1.0).abs() < 1e-9);
        assert!(out[0].acceleration.abs() < 1e-6);
        assert_eq!(out[1].velocity, 0.0);
    }

    #[test]
    fn freeze_holds_position() {
        let mut stage = JointStage::new(&[1.0], 0.001);
        let mut out = [JointSetpoint::default(); 1];
        stage.update(&[1.5], &mut out);
        stage.freeze(&mut out);
        assert_eq!(out[0].position, 1.5);
        assert_eq!(out[0].velocity, 0.0);
        assert_eq!(stage.positions(), &[1.5]);
    }
}
