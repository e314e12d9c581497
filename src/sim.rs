use crate::calc::{CalcError, Calculator, InvalidOperandPolicy, Key};
use crate::model::{Avatar, CollisionState, Geometry, Obstacle, Scene, TickEvent, Tuning};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PlayerAction {
    Press(Key),
    HelpToggle,
    Back,
    Quit,
}

/// Fixed-tick kinematics for the avatar and the obstacle. `advance` is the
/// only writer; renderers read the fields.
pub(crate) struct Engine<R> {
    pub(crate) tuning: Tuning,
    pub(crate) screen_width: f32,
    pub(crate) avatar: Avatar,
    pub(crate) obstacle: Obstacle,
    pub(crate) collision: CollisionState,
    pub(crate) clock: Duration,
    pub(crate) ticks: u64,
    rng: R,
}

impl<R> Engine<R> {
    pub(crate) fn is_exploded(&self) -> bool {
        self.collision.exploded
    }
}

impl<R: Rng> Engine<R> {
    pub(crate) fn new(tuning: Tuning, screen_width: f32, rng: R) -> Self {
        Self {
            tuning,
            screen_width,
            avatar: Avatar::default(),
            obstacle: Obstacle { x: screen_width },
            collision: CollisionState::default(),
            clock: Duration::ZERO,
            ticks: 0,
            rng,
        }
    }

    pub(crate) fn set_screen_width(&mut self, width: f32) {
        self.screen_width = width;
    }

    /// Starts a jump if the avatar is on the ground.
    pub(crate) fn jump(&mut self) -> bool {
        if !self.avatar.grounded() {
            return false;
        }
        self.avatar.velocity = self.tuning.jump_strength;
        true
    }

    pub(crate) fn advance(&mut self) -> Vec<TickEvent> {
        let mut events = Vec::new();
        self.ticks += 1;
        self.clock += self.tuning.tick_period();

        if self.collision.exploded {
            if self.collision.reset_at.is_some_and(|at| self.clock >= at) {
                self.recover();
                events.push(TickEvent::Recovered);
            }
            return events;
        }

        self.step_avatar();
        if self.step_obstacle() {
            events.push(TickEvent::Scored);
        }
        if overlaps(&self.tuning.geometry, &self.avatar, &self.obstacle) && self.explode() {
            events.push(TickEvent::Collided);
        }
        events
    }

    /// Clears an explosion early because the player pressed something.
    pub(crate) fn interrupt_explosion(&mut self) -> bool {
        if !self.collision.exploded {
            return false;
        }
        self.recover();
        true
    }

    fn step_avatar(&mut self) {
        let a = &mut self.avatar;
        if !a.airborne() {
            return;
        }
        a.offset += a.velocity;
        a.velocity -= self.tuning.gravity;
        if a.offset <= 0.0 {
            a.offset = 0.0;
            a.velocity = 0.0;
        }
    }

    /// Returns true when the obstacle respawned this tick.
    fn step_obstacle(&mut self) -> bool {
        self.obstacle.x -= self.tuning.obstacle_speed;
        if self.obstacle.x >= self.tuning.geometry.despawn_x {
            return false;
        }
        let gap = self.tuning.respawn_gap;
        let offset = self.rng.gen_range(gap.min..=gap.min + gap.range);
        self.obstacle.x = self.screen_width + offset;
        true
    }

    fn explode(&mut self) -> bool {
        if self.collision.exploded {
            return false;
        }
        self.collision.exploded = true;
        // one deadline per explosion; further overlaps while frozen are ignored
        self.collision.reset_at = Some(self.clock + self.tuning.explosion_reset_delay());
        true
    }

    fn recover(&mut self) {
        self.collision = CollisionState::default();
        self.obstacle.x = self.screen_width + self.tuning.geometry.reset_margin;
    }
}

/// Axis-aligned overlap between the avatar's and the obstacle's hitboxes.
pub(crate) fn overlaps(geom: &Geometry, avatar: &Avatar, obstacle: &Obstacle) -> bool {
    let ax0 = geom.avatar_x;
    let ax1 = ax0 + geom.avatar_width;
    let ox0 = obstacle.x + geom.obstacle_inset;
    let ox1 = ox0 + geom.obstacle_width;
    let x_overlap = ax0 < ox1 && ax1 > ox0;
    let y_overlap = avatar.offset < geom.clear_height;
    x_overlap && y_overlap
}

/// Couples the keypad, the calculator and the engine.
pub(crate) struct Session<R> {
    pub(crate) engine: Engine<R>,
    pub(crate) calc: Calculator,
    pub(crate) score: u32,
    pub(crate) last_error: Option<CalcError>,
    pub(crate) scene: Scene,
}

impl<R: Rng> Session<R> {
    pub(crate) fn new(
        tuning: Tuning,
        policy: InvalidOperandPolicy,
        screen_width: f32,
        rng: R,
    ) -> Self {
        Self {
            engine: Engine::new(tuning, screen_width, rng),
            calc: Calculator::new(policy),
            score: 0,
            last_error: None,
            scene: Scene::Main,
        }
    }

    pub(crate) fn apply(&mut self, action: PlayerAction) {
        match action {
            PlayerAction::Press(key) => self.press(key),
            PlayerAction::HelpToggle => {
                self.scene = match self.scene {
                    Scene::Help => Scene::Main,
                    Scene::Main => Scene::Help,
                };
            }
            PlayerAction::Back => self.scene = Scene::Main,
            PlayerAction::Quit => {}
        }
    }

    /// Every press also tries to jump; that is the only way to play.
    pub(crate) fn press(&mut self, key: Key) {
        if self.engine.interrupt_explosion() {
            debug!(cause = "input", "explosion cleared");
            self.calc.clear();
        }
        self.engine.jump();
        self.last_error = None;
        match self.calc.reduce(key) {
            Ok(next) => self.calc = next,
            Err(err) => {
                warn!(%err, expression = %self.calc.display_text(), "calculation rejected");
                self.last_error = Some(err);
            }
        }
    }

    pub(crate) fn tick(&mut self) -> Vec<TickEvent> {
        let events = self.engine.advance();
        for ev in &events {
            match ev {
                TickEvent::Scored => {
                    self.score += 1;
                    if self.score % 10 == 0 {
                        info!(score = self.score, "milestone");
                    }
                }
                TickEvent::Collided => {
                    self.calc.explode();
                    info!(
                        tick = self.engine.ticks,
                        score = self.score,
                        history = self.calc.last_history.as_deref().unwrap_or(""),
                        "collision"
                    );
                    self.score = 0;
                }
                TickEvent::Recovered => {
                    debug!(cause = "timeout", "explosion cleared");
                    self.calc.clear();
                }
            }
        }
        events
    }
}
