use crate::anim::Timelines;
use crate::config::{load_settings, save_settings_atomic, Paths, Settings};
use crate::input::{collect_input_nonblocking, map_event_to_action};
use crate::model::Scene;
use crate::render::{
    canvas_to_cells, draw_calculator, draw_center_box, draw_hud, draw_keypad, draw_scene,
    draw_scene_ascii, sky_color, Layout, Terminal,
};
use crate::sim::{PlayerAction, Session};
use crossterm::style::Color;
use rand::{rngs::StdRng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fixed steps allowed per frame before the backlog is dropped.
const MAX_STEPS_PER_FRAME: u32 = 8;

const HELP: &str = "Every key press is a jump. Time your math!\n\
The crab walks in from the right; clear it to score.\n\
Touching it blows up the calculator.\n\n\
0-9 .      digits\n\
+ - * /    operators (x also multiplies)\n\
Enter =    equals\n\
Backspace  delete last digit\n\
c Delete   clear\n\
Mouse      click the keypad\n\n\
h toggle help, Esc close, q quit.";

pub(crate) struct App {
    settings: Settings,
    paths: Paths,
    session: Session<StdRng>,
    anim: Timelines,
    term: Terminal,
    layout: Layout,
    should_quit: bool,
}

impl App {
    fn init(paths: Paths) -> anyhow::Result<Self> {
        let settings = load_settings(&paths.settings_path);

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            settings = %paths.settings_path.display(),
            seed = ?settings.seed,
            policy = ?settings.invalid_operand,
            "starting"
        );

        let term = Terminal::begin()?;
        let layout = Layout::new(term.cols, term.rows);
        let session = Session::new(
            settings.tuning.clone(),
            settings.invalid_operand,
            layout.world_width(),
            rng,
        );

        Ok(Self {
            settings,
            paths,
            session,
            anim: Timelines::new(),
            term,
            layout,
            should_quit: false,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let fps = self.settings.fps_cap.clamp(10, 240);
        let frame_dt = Duration::from_secs_f32(1.0 / fps as f32);
        let sim_step = self.session.engine.tuning.tick_period();

        let mut last_frame = Instant::now();
        let mut sim_accum = Duration::ZERO;

        while !self.should_quit {
            let resized = self.term.resize_if_needed()?;
            if resized {
                self.layout = Layout::new(self.term.cols, self.term.rows);
                self.session
                    .engine
                    .set_screen_width(self.layout.world_width());
                debug!(cols = self.term.cols, rows = self.term.rows, "resized");
            }

            // input
            let events = collect_input_nonblocking(frame_dt)?;
            for ev in events {
                match map_event_to_action(self.session.scene, ev, &self.layout) {
                    Some(PlayerAction::Quit) => {
                        self.should_quit = true;
                        break;
                    }
                    Some(action) => self.session.apply(action),
                    None => {}
                }
            }

            // sim fixed-step
            let now = Instant::now();
            let real_dt = now.saturating_duration_since(last_frame);
            last_frame = now;

            if self.session.scene == Scene::Main {
                sim_accum = sim_accum.saturating_add(real_dt);
                let mut steps = 0;
                while sim_accum >= sim_step && steps < MAX_STEPS_PER_FRAME {
                    for ev in self.session.tick() {
                        self.anim.observe(ev, self.session.score);
                    }
                    sim_accum = sim_accum.saturating_sub(sim_step);
                    steps += 1;
                }
                if sim_accum >= sim_step {
                    debug!(behind = ?sim_accum, "dropping simulation backlog");
                    sim_accum = Duration::ZERO;
                }
            } else {
                sim_accum = Duration::ZERO;
            }

            self.anim.advance(real_dt, self.layout.world_width());

            // the screen was wiped on resize, so repaint every cell once
            self.render_frame(!resized)?;

            // frame cap
            spin_sleep(frame_dt, Instant::now());
        }
        Ok(())
    }

    fn render_frame(&mut self, diff_only: bool) -> anyhow::Result<()> {
        let enable_color = self.settings.enable_color;
        self.term.cur.clear(Color::Black);
        let sky = sky_color(&self.anim, enable_color);

        if self.settings.enable_braille {
            draw_scene(
                &mut self.term.canvas,
                &self.session.engine,
                &self.anim,
                &self.layout,
            );
            canvas_to_cells(
                &self.term.canvas,
                &mut self.term.cur,
                self.layout.game_rows,
                enable_color,
                sky,
            );
        } else {
            draw_scene_ascii(
                &mut self.term.cur,
                &self.session.engine,
                &self.anim,
                &self.layout,
                sky,
            );
        }

        draw_hud(&mut self.term.cur, self.session.score, &self.anim, enable_color);
        draw_calculator(
            &mut self.term.cur,
            &self.session.calc,
            self.session.last_error.as_ref(),
            &self.layout,
        );
        draw_keypad(&mut self.term.cur, &self.layout, enable_color);

        if self.session.scene == Scene::Help {
            draw_center_box(&mut self.term.cur, "How to play", HELP);
        }

        self.term.present(diff_only)?;
        Ok(())
    }
}

pub(crate) fn run(paths: Paths) -> anyhow::Result<()> {
    let mut app = App::init(paths)?;
    let outcome = app.run();
    // the terminal must come back even if the loop failed
    app.term.end()?;
    info!(score = app.session.score, "exiting");
    save_settings_atomic(&app.paths.settings_path, &app.settings)?;
    outcome
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, now: Instant) {
    let end = now + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}
