//! Paddle movement and contact tests

use super::{Ball, Direction, Side};

pub const PADDLE_HEIGHT: f64 = 0.2;
pub const PADDLE_WIDTH: f64 = 0.02;
pub const PADDLE_SPEED: f64 = 0.01;

/// Horizontal centre of each paddle
pub const LEFT_PADDLE_X: f64 = 0.05;
pub const RIGHT_PADDLE_X: f64 = 0.95;

#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub x: f64,
    pub y: f64,
    pub height: f64,
    pub width: f64,
    pub speed: f64,
}

impl Paddle {
    pub fn new(x: f64) -> Self {
        Self {
            x,
            y: 0.5,
            height: PADDLE_HEIGHT,
            width: PADDLE_WIDTH,
            speed: PADDLE_SPEED,
        }
    }

    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Left => Self::new(LEFT_PADDLE_X),
            Side::Right => Self::new(RIGHT_PADDLE_X),
        }
    }

    pub fn y_min(&self) -> f64 {
        self.y - self.height / 2.0
    }

    pub fn y_max(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn move_up(&mut self) {
        self.y = (self.y - self.speed).max(self.height / 2.0);
    }

    pub fn move_down(&mut self) {
        self.y = (self.y + self.speed).min(1.0 - self.height / 2.0);
    }

    pub fn apply(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.move_up(),
            Direction::Down => self.move_down(),
        }
    }

    /// Whether the ball overlaps the paddle's face, padded by the ball radius
    pub fn is_hit(&self, ball: &Ball) -> bool {
        (ball.x - self.x).abs() <= ball.radius + self.width / 2.0
            && ball.y >= self.y_min() - ball.radius
            && ball.y <= self.y_max() + ball.radius
    }

    pub fn reset_position(&mut self) {
        self.y = 0.5;
    }
}
