//! Ball kinematics and wall bounces

use rand::Rng;
use std::f64::consts::{PI, TAU};

use super::Side;

/// Ball speed with no tier bonus, in board widths per tick
pub const BASE_SPEED: f64 = 1.0 / 120.0;

/// Ball radius in board units
pub const BALL_RADIUS: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    /// Travel angle in radians; 0 points right, positive angles point down
    pub angle: f64,
    pub speed: f64,
    pub radius: f64,
    pub first_serve: bool,
}

impl Ball {
    pub fn new() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            angle: 0.0,
            speed: BASE_SPEED,
            radius: BALL_RADIUS,
            first_serve: true,
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Centre the ball and serve it toward `direction`, or a coin flip when unset
    pub fn reset<R: Rng>(&mut self, direction: Option<Side>, rng: &mut R) {
        self.x = 0.5;
        self.y = 0.5;
        self.first_serve = false;
        self.angle = match direction {
            Some(Side::Right) => 0.0,
            Some(Side::Left) => PI,
            None => {
                if rng.gen_bool(0.5) {
                    0.0
                } else {
                    PI
                }
            }
        };
    }

    /// Move one step and bounce off the top and bottom walls.
    ///
    /// Exits through the left or right edge are left to the caller.
    pub fn advance(&mut self) {
        self.x += self.speed * self.angle.cos();
        self.y += self.speed * self.angle.sin();

        let heading = self.angle.rem_euclid(TAU);
        let hits_top = self.y <= self.radius && (PI..=TAU).contains(&heading);
        let hits_bottom = self.y >= 1.0 - self.radius && (0.0..=PI).contains(&heading);

        if hits_top || hits_bottom {
            self.angle = -self.angle;
            self.y = self.y.clamp(self.radius, 1.0 - self.radius);
        }
    }

    /// Side the ball is currently travelling toward
    pub fn heading(&self) -> Side {
        let heading = self.angle.rem_euclid(TAU);
        if (PI / 2.0..=3.0 * PI / 2.0).contains(&heading) {
            Side::Left
        } else {
            Side::Right
        }
    }
}

impl Default for Ball {
    fn default() -> Self {
        Self::new()
    }
}
