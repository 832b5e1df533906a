//! Match state and authoritative tick rules

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_3, PI};
use std::time::{Duration, Instant};

use super::ball::BASE_SPEED;
use super::{Ball, Direction, Paddle, Side};

/// Score that ends the match
pub const POINTS_TO_WIN: u32 = 5;

/// Countdown between the second player joining and the first serve
pub const START_DELAY: Duration = Duration::from_secs(3);

/// Pause between a point and the next serve
pub const SCORE_DELAY: Duration = Duration::from_secs(1);

pub const MAX_PLAYERS: usize = 2;

const SPEED_TIER_1: f64 = 1.25;
const SPEED_TIER_2: f64 = 1.5;
const SPEED_INCREMENT: f64 = 0.1;
const MAX_SPEED_MULTIPLIER: f64 = 3.0;

/// Match lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    /// Fewer than two players have ever been present
    Waiting,
    /// Countdown before the serve
    Starting,
    /// Ball in flight
    Playing,
    /// Ball frozen after a point
    ScorePause,
    /// A player left mid-match
    Paused,
    /// Winner decided
    GameOver,
}

/// Discrete transitions produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    Starting,
    Started,
    Scored { scorer: Side, left: u32, right: u32 },
    Served { toward: Side },
    Paused,
    GameOver { winner: Side },
}

/// One two-paddle game
#[derive(Debug, Clone)]
pub struct Match {
    pub left: Paddle,
    pub right: Paddle,
    pub ball: Ball,
    left_score: u32,
    right_score: u32,
    state: MatchState,
    winner: Option<Side>,
    player_count: usize,
    paddle_hits: u32,
    start_at: Option<Instant>,
    score_at: Option<Instant>,
    conceded: Option<Side>,
    ticks: u64,
    rng: ChaCha8Rng,
}

impl Match {
    pub fn new(seed: u64) -> Self {
        Self {
            left: Paddle::for_side(Side::Left),
            right: Paddle::for_side(Side::Right),
            ball: Ball::new(),
            left_score: 0,
            right_score: 0,
            state: MatchState::Waiting,
            winner: None,
            player_count: 0,
            paddle_hits: 0,
            start_at: None,
            score_at: None,
            conceded: None,
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    #[cfg(test)]
    pub fn paddle_hits(&self) -> u32 {
        self.paddle_hits
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }

    /// Ticks that actually advanced the simulation
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Register a connected player.
    ///
    /// Reaching two players (re)enters the countdown, including after a pause.
    pub fn add_player(&mut self, now: Instant) -> Option<MatchEvent> {
        if self.player_count >= MAX_PLAYERS {
            return None;
        }
        self.player_count += 1;

        if self.player_count == MAX_PLAYERS
            && matches!(self.state, MatchState::Waiting | MatchState::Paused)
        {
            self.state = MatchState::Starting;
            self.start_at = Some(now);
            return Some(MatchEvent::Starting);
        }
        None
    }

    /// Unregister a player; a running match pauses below two players
    pub fn remove_player(&mut self) -> Option<MatchEvent> {
        if self.player_count == 0 {
            return None;
        }
        self.player_count -= 1;

        if self.player_count < MAX_PLAYERS
            && matches!(
                self.state,
                MatchState::Starting | MatchState::Playing | MatchState::ScorePause
            )
        {
            self.state = MatchState::Paused;
            self.start_at = None;
            self.score_at = None;
            self.conceded = None;
            return Some(MatchEvent::Paused);
        }
        None
    }

    pub fn move_paddle(&mut self, side: Side, direction: Direction) {
        if self.state == MatchState::GameOver {
            return;
        }
        self.paddle_mut(side).apply(direction);
    }

    /// Advance the match by one fixed step
    pub fn tick(&mut self, now: Instant) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if self.winner.is_some() || self.player_count < MAX_PLAYERS {
            return events;
        }

        match self.state {
            MatchState::Starting => {
                let elapsed = self
                    .start_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or_default();
                if elapsed >= START_DELAY {
                    self.begin_play();
                    events.push(MatchEvent::Started);
                }
            }
            MatchState::ScorePause => {
                let elapsed = self
                    .score_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or_default();
                if elapsed >= SCORE_DELAY {
                    let toward = self.conceded.take().unwrap_or(Side::Left);
                    self.ball.reset(Some(toward), &mut self.rng);
                    self.score_at = None;
                    self.state = MatchState::Playing;
                    events.push(MatchEvent::Served { toward });
                }
            }
            MatchState::Playing => {
                self.ticks += 1;
                self.step(now, &mut events);
            }
            MatchState::Waiting | MatchState::Paused | MatchState::GameOver => {}
        }

        events
    }

    fn begin_play(&mut self) {
        self.state = MatchState::Playing;
        self.start_at = None;
        self.paddle_hits = 0;
        self.ball.set_speed(BASE_SPEED);
        self.ball.reset(Some(Side::Left), &mut self.rng);
    }

    fn step(&mut self, now: Instant, events: &mut Vec<MatchEvent>) {
        self.ball.advance();

        if self.ball.x <= 0.0 {
            self.handle_score(Side::Right, now, events);
            return;
        }
        if self.ball.x >= 1.0 {
            self.handle_score(Side::Left, now, events);
            return;
        }

        // Only the paddle the ball is heading toward can register a hit
        let heading = self.ball.heading();
        if self.paddle(heading).is_hit(&self.ball) {
            self.handle_paddle_hit(heading);
        }
    }

    fn handle_score(&mut self, scorer: Side, now: Instant, events: &mut Vec<MatchEvent>) {
        match scorer {
            Side::Left => self.left_score += 1,
            Side::Right => self.right_score += 1,
        }
        self.paddle_hits = 0;
        self.ball.set_speed(BASE_SPEED);
        self.left.reset_position();
        self.right.reset_position();
        self.conceded = Some(scorer.opponent());

        events.push(MatchEvent::Scored {
            scorer,
            left: self.left_score,
            right: self.right_score,
        });

        if self.score(scorer) >= POINTS_TO_WIN {
            self.winner = Some(scorer);
            self.state = MatchState::GameOver;
            self.conceded = None;
            events.push(MatchEvent::GameOver { winner: scorer });
        } else {
            self.state = MatchState::ScorePause;
            self.score_at = Some(now);
        }
    }

    fn handle_paddle_hit(&mut self, side: Side) {
        self.paddle_hits += 1;
        self.ball.set_speed(speed_for_hits(self.paddle_hits));
        self.ball.angle = rebound_angle(self.paddle(side), &self.ball, side);
    }
}

/// Ball speed for a run of consecutive paddle hits
pub fn speed_for_hits(hits: u32) -> f64 {
    let multiplier = if hits < 5 {
        1.0
    } else if hits < 10 {
        SPEED_TIER_1
    } else if hits < 20 {
        (SPEED_TIER_2 + f64::from(hits - 10) * SPEED_INCREMENT).min(MAX_SPEED_MULTIPLIER)
    } else {
        MAX_SPEED_MULTIPLIER
    };
    BASE_SPEED * multiplier
}

/// Outgoing angle after striking `paddle`, steered by the contact height.
///
/// The top edge sends the ball upward at 60 degrees, the bottom edge downward.
fn rebound_angle(paddle: &Paddle, ball: &Ball, side: Side) -> f64 {
    let (angle_min, angle_max) = match side {
        Side::Left => (-FRAC_PI_3, FRAC_PI_3),
        Side::Right => (4.0 * PI / 3.0, 2.0 * PI / 3.0),
    };
    let relative_y = ((ball.y - paddle.y_min()) / (paddle.y_max() - paddle.y_min())).clamp(0.0, 1.0);
    angle_min + relative_y * (angle_max - angle_min)
}
