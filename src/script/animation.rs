//! Pending piece animations and their per-tick integration

use super::Axis;
use crate::model::UnitInstance;
use crate::Vector3;
use log::{trace, warn};
use std::f64::consts::PI;

const DEG_TO_RAD: f64 = PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / PI;

impl Vector3 {
    /// Component along `axis`
    pub fn component(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Mutable component along `axis`
    pub fn component_mut(&mut self, axis: Axis) -> &mut f64 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

/// Immediate translation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetPosition {
    /// Model piece index
    pub piece: usize,
    /// Axis to set
    pub axis: Axis,
    /// Target in model units
    pub target: f64,
}

/// Translation toward a target at constant velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationAnimation {
    /// Model piece index
    pub piece: usize,
    /// Axis to move along
    pub axis: Axis,
    /// Target in model units
    pub target: f64,
    /// Signed velocity in model units per second
    pub velocity: f64,
}

/// Immediate rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetAngle {
    /// Model piece index
    pub piece: usize,
    /// Axis to rotate around
    pub axis: Axis,
    /// Target in degrees
    pub target: f64,
}

/// Rotation toward a target angle along the shorter arc
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAnimation {
    /// Model piece index
    pub piece: usize,
    /// Axis to rotate around
    pub axis: Axis,
    /// Target in degrees
    pub target: f64,
    /// Angular speed in radians per second
    pub speed: f64,
    /// Target as a unit vector
    pub target_polar: (f64, f64),
}

/// Continuous rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinAnimation {
    /// Model piece index
    pub piece: usize,
    /// Axis to rotate around
    pub axis: Axis,
    /// Ramp rate in radians per second squared
    pub acceleration: f64,
    /// Current speed in radians per second
    pub speed: f64,
    /// Steady speed in radians per second
    pub target_speed: f64,
}

/// Rendering flag toggled by cache and shading instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceFlag {
    /// Piece may be cached
    Cache,
    /// Piece is lit
    Shade,
    /// Piece casts a shadow
    Shadow,
}

/// A pending change to a piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Animation {
    /// Set a translation component
    SetPosition(SetPosition),
    /// Move toward a translation target
    Translation(TranslationAnimation),
    /// Set a rotation component
    SetAngle(SetAngle),
    /// Turn toward a rotation target
    Rotation(RotationAnimation),
    /// Spin accelerating toward its steady speed
    SpinUp(SpinAnimation),
    /// Spin at steady speed
    Spin(SpinAnimation),
    /// Spin decelerating to a stop
    SpinDown(SpinAnimation),
    /// Make a piece visible
    Show(usize),
    /// Make a piece invisible
    Hide(usize),
    /// Set a rendering flag of a piece
    SetFlag {
        /// Model piece index
        piece: usize,
        /// Flag to set
        flag: PieceFlag,
        /// New value
        enabled: bool,
    },
}

impl Animation {
    /// Model piece the animation targets
    pub fn piece(&self) -> usize {
        match *self {
            Animation::SetPosition(SetPosition { piece, .. })
            | Animation::Translation(TranslationAnimation { piece, .. })
            | Animation::SetAngle(SetAngle { piece, .. })
            | Animation::Rotation(RotationAnimation { piece, .. })
            | Animation::SpinUp(SpinAnimation { piece, .. })
            | Animation::Spin(SpinAnimation { piece, .. })
            | Animation::SpinDown(SpinAnimation { piece, .. })
            | Animation::Show(piece)
            | Animation::Hide(piece)
            | Animation::SetFlag { piece, .. } => piece,
        }
    }

    /// Whether this animation still moves `piece` along `axis`
    pub fn is_move_of(&self, piece: usize, axis: Axis) -> bool {
        match self {
            Animation::SetPosition(m) => m.piece == piece && m.axis == axis,
            Animation::Translation(m) => m.piece == piece && m.axis == axis,
            _ => false,
        }
    }

    /// Whether this animation still turns `piece` around `axis`
    pub fn is_turn_of(&self, piece: usize, axis: Axis) -> bool {
        match self {
            Animation::SetAngle(t) => t.piece == piece && t.axis == axis,
            Animation::Rotation(t) => t.piece == piece && t.axis == axis,
            _ => false,
        }
    }

    /// The spin state, if this is any spin phase
    pub fn as_spin(&self) -> Option<&SpinAnimation> {
        match self {
            Animation::SpinUp(spin) | Animation::Spin(spin) | Animation::SpinDown(spin) => {
                Some(spin)
            }
            _ => None,
        }
    }
}

fn polar(degrees: f64) -> (f64, f64) {
    let radians = degrees * DEG_TO_RAD;
    (radians.cos(), radians.sin())
}

fn polar_angle((x, y): (f64, f64)) -> f64 {
    let angle = x.clamp(-1.0, 1.0).acos();
    if y >= 0.0 {
        angle
    } else {
        -angle
    }
}

fn rotated((x, y): (f64, f64), radians: f64) -> (f64, f64) {
    let (s, c) = radians.sin_cos();
    (x * c - y * s, x * s + y * c)
}

impl UnitInstance {
    /// Describe a translation of `piece` toward `target` at `speed`
    pub fn begin_translation(&self, piece: usize, axis: Axis, target: f64, speed: f64) -> Animation {
        let current = self
            .pieces
            .get(piece)
            .map_or(0.0, |state| state.translation.component(axis));
        let speed = speed.abs();
        Animation::Translation(TranslationAnimation {
            piece,
            axis,
            target,
            velocity: if target > current { speed } else { -speed },
        })
    }

    /// Describe a rotation of `piece` toward `target` degrees at `speed` degrees per second
    pub fn begin_rotation(&self, piece: usize, axis: Axis, target: f64, speed: f64) -> Animation {
        Animation::Rotation(RotationAnimation {
            piece,
            axis,
            target,
            speed: speed * DEG_TO_RAD,
            target_polar: polar(target),
        })
    }

    /// Describe a spin of `piece` reaching `speed` degrees per second
    ///
    /// A positive acceleration ramps up from rest; otherwise the spin starts
    /// at full speed.
    pub fn begin_spin(&self, piece: usize, axis: Axis, acceleration: f64, speed: f64) -> Animation {
        let spin = SpinAnimation {
            piece,
            axis,
            acceleration: acceleration * DEG_TO_RAD,
            speed: 0.0,
            target_speed: speed * DEG_TO_RAD,
        };
        if acceleration > 0.0 {
            Animation::SpinUp(spin)
        } else {
            Animation::Spin(SpinAnimation {
                speed: spin.target_speed,
                ..spin
            })
        }
    }

    /// Advance one animation by `delta` seconds
    ///
    /// Returns the animation to keep pending, or `None` once it is complete.
    pub fn apply(&mut self, animation: Animation, delta: f64) -> Option<Animation> {
        let Some(state) = self.pieces.get_mut(animation.piece()) else {
            warn!(
                "Dropping animation of piece {} on an instance with {} pieces",
                animation.piece(),
                self.pieces.len()
            );
            return None;
        };

        match animation {
            Animation::SetPosition(m) => {
                *state.translation.component_mut(m.axis) = m.target;
                None
            }
            Animation::Translation(m) => self.apply_translation(m, delta),
            Animation::SetAngle(t) => {
                *state.rotation.component_mut(t.axis) = t.target;
                None
            }
            Animation::Rotation(t) => self.apply_rotation(t, delta),
            Animation::SpinUp(mut spin) => {
                let next = spin.speed + spin.acceleration * delta;
                if next >= spin.target_speed {
                    spin.speed = spin.target_speed;
                    self.apply_spin(&spin, delta);
                    Some(Animation::Spin(spin))
                } else {
                    spin.speed = next;
                    self.apply_spin(&spin, delta);
                    Some(Animation::SpinUp(spin))
                }
            }
            Animation::Spin(spin) => {
                self.apply_spin(&spin, delta);
                Some(Animation::Spin(spin))
            }
            Animation::SpinDown(mut spin) => {
                let next = spin.speed - spin.acceleration * delta;
                // Without deceleration the spin stops at once
                if spin.acceleration <= 0.0 || next <= 0.0 {
                    None
                } else {
                    spin.speed = next;
                    self.apply_spin(&spin, delta);
                    Some(Animation::SpinDown(spin))
                }
            }
            Animation::Show(piece) => {
                state.hidden = false;
                trace!("Show piece {piece}");
                None
            }
            Animation::Hide(piece) => {
                state.hidden = true;
                trace!("Hide piece {piece}");
                None
            }
            Animation::SetFlag { flag, enabled, .. } => {
                match flag {
                    PieceFlag::Cache => state.cache = enabled,
                    PieceFlag::Shade => state.shade = enabled,
                    PieceFlag::Shadow => state.shadow = enabled,
                }
                None
            }
        }
    }

    fn apply_translation(&mut self, m: TranslationAnimation, delta: f64) -> Option<Animation> {
        let value = self.pieces[m.piece].translation.component_mut(m.axis);
        let next = *value + m.velocity * delta;

        let reached = if m.velocity > 0.0 {
            next >= m.target
        } else if m.velocity < 0.0 {
            next <= m.target
        } else {
            true
        };

        if reached {
            *value = m.target;
            None
        } else {
            *value = next;
            Some(Animation::Translation(m))
        }
    }

    fn apply_rotation(&mut self, t: RotationAnimation, delta: f64) -> Option<Animation> {
        let value = self.pieces[t.piece].rotation.component_mut(t.axis);
        let current = polar(*value);
        let rate = t.speed * delta;

        let dot = current.0 * t.target_polar.0 + current.1 * t.target_polar.1;
        if dot.clamp(-1.0, 1.0).acos() <= rate {
            *value = t.target;
            return None;
        }

        let determinant = current.0 * t.target_polar.1 - current.1 * t.target_polar.0;
        let step = if determinant >= 0.0 { rate } else { -rate };
        *value = polar_angle(rotated(current, step)) * RAD_TO_DEG;
        Some(Animation::Rotation(t))
    }

    fn apply_spin(&mut self, spin: &SpinAnimation, delta: f64) {
        let value = self.pieces[spin.piece].rotation.component_mut(spin.axis);
        let next = rotated(polar(*value), spin.speed * delta);
        *value = polar_angle(next) * RAD_TO_DEG;
    }
}
