use crate::anim::Timelines;
use crate::calc::{Calculator, CalcError, Key};
use crate::sim::Engine;
use crossterm::{
    cursor,
    event::{DisableMouseCapture, EnableMouseCapture},
    execute, queue,
    style::{
        Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    },
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

/// World px per terminal column / row. Braille gives 2×4 subpixels per cell,
/// so one subpixel is 4×4 world px.
pub(crate) const PX_PER_COL: f32 = 8.0;
pub(crate) const PX_PER_ROW: f32 = 16.0;
const PX_PER_SUBPX: f32 = 4.0;

const GROUND_HEIGHT: f32 = 40.0;
const GRASS_HEIGHT: f32 = 10.0;
/// Creatures stand this far above the bottom of the game panel.
const BASELINE_LIFT: f32 = 30.0;
const AVATAR_LEFT: f32 = 40.0;
const TILE_PITCH: f32 = 50.0;

const MIN_GAME_ROWS: u16 = 4;
const MAX_GAME_ROWS: u16 = 14;
const KEY_ROW_PITCH: u16 = 2;

const SKY: u32 = 0x87CEEB;
const GOLD: u32 = 0xFFD700;

/// Continuation marker for the right half of a double-width glyph.
const WIDE_TAIL: char = '\0';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
    pub(crate) bold: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
            bold: false,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn get(&self, x: u16, y: u16) -> Option<Cell> {
        (x < self.w && y < self.h).then(|| self.cells[self.idx(x, y)])
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    pub(crate) fn clear(&mut self, bg: Color) {
        for c in &mut self.cells {
            *c = Cell { bg, ..Cell::default() };
        }
    }
    fn fill_row(&mut self, y: u16, x0: u16, w: u16, cell: Cell) {
        for x in x0..x0.saturating_add(w) {
            self.set(x, y, cell);
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pixel {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

const fn hex(rgb: u32) -> Pixel {
    Pixel {
        r: (rgb >> 16) as u8,
        g: (rgb >> 8) as u8,
        b: rgb as u8,
        a: 255,
    }
}

const fn hexa(rgb: u32, a: u8) -> Pixel {
    let p = hex(rgb);
    Pixel { a, ..p }
}

fn rgb(hex: u32) -> Color {
    Color::Rgb {
        r: (hex >> 16) as u8,
        g: (hex >> 8) as u8,
        b: hex as u8,
    }
}

fn mix(a: u32, b: u32, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let ch = |shift: u32| {
        let x = ((a >> shift) & 0xFF) as f32;
        let y = ((b >> shift) & 0xFF) as f32;
        (x + (y - x) * t).round() as u8
    };
    Color::Rgb {
        r: ch(16),
        g: ch(8),
        b: ch(0),
    }
}

pub(crate) struct PixelCanvas {
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) px: Vec<Pixel>,
}

impl PixelCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Pixel::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn clear(&mut self, p: Pixel) {
        self.px.fill(p);
    }
    fn blend_over(&mut self, x: i32, y: i32, src: Pixel) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.w || y >= self.h {
            return;
        }
        let i = self.idx(x, y);
        let dst = self.px[i];

        let sa = src.a as f32 / 255.0;
        let da = dst.a as f32 / 255.0;

        let out_a = sa + da * (1.0 - sa);
        if out_a <= 1e-6 {
            self.px[i] = Pixel::default();
            return;
        }

        let blend = |sc: u8, dc: u8| -> u8 {
            let sc = sc as f32 / 255.0;
            let dc = dc as f32 / 255.0;
            let out = (sc * sa + dc * da * (1.0 - sa)) / out_a;
            (out.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
        };

        self.px[i] = Pixel {
            r: blend(src.r, dst.r),
            g: blend(src.g, dst.g),
            b: blend(src.b, dst.b),
            a: (out_a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        };
    }

    fn fill_rect(&mut self, x0: i32, y0: i32, w: i32, h: i32, p: Pixel) {
        for y in y0.max(0)..(y0 + h).min(self.h as i32) {
            for x in x0.max(0)..(x0 + w).min(self.w as i32) {
                self.blend_over(x, y, p);
            }
        }
    }

    fn fill_ellipse(&mut self, cx: i32, cy: i32, rx: i32, ry: i32, p: Pixel) {
        let (rx, ry) = (rx.max(1), ry.max(1));
        for dy in -ry..=ry {
            for dx in -rx..=rx {
                let nx = dx as f32 / rx as f32;
                let ny = dy as f32 / ry as f32;
                if nx * nx + ny * ny <= 1.0 {
                    self.blend_over(cx + dx, cy + dy, p);
                }
            }
        }
    }

    /// A square rotated 45°.
    fn fill_diamond(&mut self, cx: i32, cy: i32, r: i32, p: Pixel) {
        for dy in -r..=r {
            let span = r - dy.abs();
            for dx in -span..=span {
                self.blend_over(cx + dx, cy + dy, p);
            }
        }
    }
}

/* -----------------------------
   Screen layout + keypad
------------------------------ */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ButtonStyle {
    Digit,
    Function,
    Operator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Button {
    pub(crate) x: u16,
    pub(crate) y: u16,
    pub(crate) w: u16,
    pub(crate) label: &'static str,
    pub(crate) key: Key,
    pub(crate) style: ButtonStyle,
}

/// (label, span in quarters of the keypad width)
const KEYPAD: [&[(&str, u16)]; 5] = [
    &[("C", 2), ("▶", 1), ("÷", 1)],
    &[("7", 1), ("8", 1), ("9", 1), ("×", 1)],
    &[("4", 1), ("5", 1), ("6", 1), ("-", 1)],
    &[("1", 1), ("2", 1), ("3", 1), ("+", 1)],
    &[("0", 2), (".", 1), ("=", 1)],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) cols: u16,
    pub(crate) game_rows: u16,
    pub(crate) history_row: u16,
    pub(crate) display_row: u16,
    pub(crate) keypad_top: u16,
}

impl Layout {
    pub(crate) fn new(cols: u16, rows: u16) -> Self {
        let keypad_h = KEYPAD.len() as u16 * KEY_ROW_PITCH - 1;
        let keypad_top = rows.saturating_sub(keypad_h);
        let display_row = keypad_top.saturating_sub(2);
        let history_row = display_row.saturating_sub(1);
        let game_rows = history_row
            .saturating_sub(1)
            .clamp(MIN_GAME_ROWS, MAX_GAME_ROWS);
        Self {
            cols,
            game_rows,
            history_row,
            display_row,
            keypad_top,
        }
    }

    /// Width of the game panel in world px; this is the engine's screen width.
    pub(crate) fn world_width(&self) -> f32 {
        self.cols as f32 * PX_PER_COL
    }

    pub(crate) fn world_height(&self) -> f32 {
        self.game_rows as f32 * PX_PER_ROW
    }

    pub(crate) fn buttons(&self) -> Vec<Button> {
        let unit = self.cols / 4;
        let mut out = Vec::new();
        for (r, row) in KEYPAD.iter().enumerate() {
            let y = self.keypad_top + r as u16 * KEY_ROW_PITCH;
            let mut start = 0u16;
            for &(label, span) in row.iter() {
                let Some(key) = label.chars().next().and_then(Key::from_char) else {
                    continue;
                };
                let style = match key {
                    Key::Digit(_) | Key::Point => ButtonStyle::Digit,
                    Key::Clear => ButtonStyle::Function,
                    Key::Op(_) | Key::Backspace | Key::Equals => ButtonStyle::Operator,
                };
                out.push(Button {
                    x: start * unit + 1,
                    y,
                    w: (span * unit).saturating_sub(2).max(1),
                    label,
                    key,
                    style,
                });
                start += span;
            }
        }
        out
    }

    pub(crate) fn button_at(&self, col: u16, row: u16) -> Option<Key> {
        self.buttons()
            .into_iter()
            .find(|b| b.y == row && col >= b.x && col < b.x + b.w)
            .map(|b| b.key)
    }
}

/* -----------------------------
   Terminal
------------------------------ */

pub(crate) struct Terminal {
    pub(crate) out: io::Stdout,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    pub(crate) prev: CellBuffer,
    pub(crate) cur: CellBuffer,
    pub(crate) canvas: PixelCanvas,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        let prev = CellBuffer::new(cols, rows);
        let cur = CellBuffer::new(cols, rows);

        // Braille: 2×4 pixels per cell
        let canvas = PixelCanvas::new(cols as u32 * 2, rows as u32 * 4);

        Ok(Self {
            out,
            cols,
            rows,
            prev,
            cur,
            canvas,
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            DisableMouseCapture,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        self.canvas = PixelCanvas::new(c as u32 * 2, r as u32 * 4);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    pub(crate) fn present(&mut self, diff_only: bool) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;
        let mut last_bold = None;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if !needs_paint(&self.prev.cells[i], &c, diff_only) {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;

                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }
                if last_bold != Some(c.bold) {
                    let attr = if c.bold {
                        Attribute::Bold
                    } else {
                        Attribute::NormalIntensity
                    };
                    queue!(self.out, SetAttribute(attr))?;
                    last_bold = Some(c.bold);
                }

                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

/// Continuation cells are covered by the wide glyph to their left.
fn needs_paint(prev: &Cell, cur: &Cell, diff_only: bool) -> bool {
    cur.ch != WIDE_TAIL && !(diff_only && prev == cur)
}

/// Best-effort teardown for paths that never reach [`Terminal::end`].
pub(crate) fn restore_terminal() {
    let _ = terminal::disable_raw_mode();
    let mut out = io::stdout();
    let _ = execute!(
        out,
        ResetColor,
        cursor::Show,
        EnableLineWrap,
        DisableMouseCapture,
        LeaveAlternateScreen
    );
}

/* -----------------------------
   Braille encoding: 2×4 pixels -> U+2800..U+28FF
------------------------------ */

fn braille_bit(dx: u32, dy: u32) -> u8 {
    // (0,0)=1 (0,1)=2 (0,2)=4 (0,3)=64
    // (1,0)=8 (1,1)=16 (1,2)=32 (1,3)=128
    match (dx, dy) {
        (0, 0) => 0x01,
        (0, 1) => 0x02,
        (0, 2) => 0x04,
        (0, 3) => 0x40,
        (1, 0) => 0x08,
        (1, 1) => 0x10,
        (1, 2) => 0x20,
        (1, 3) => 0x80,
        _ => 0x00,
    }
}

/// Converts the first `rows` cell rows of `canvas` into braille glyphs.
/// Empty cells keep `bg` as plain spaces.
pub(crate) fn canvas_to_cells(
    canvas: &PixelCanvas,
    out: &mut CellBuffer,
    rows: u16,
    enable_color: bool,
    bg: Color,
) {
    let cols = out.w as u32;
    let rows = rows.min(out.h) as u32;

    for cy in 0..rows {
        for cx in 0..cols {
            let px0 = cx * 2;
            let py0 = cy * 4;

            let mut mask: u8 = 0;
            let mut sum_r: u32 = 0;
            let mut sum_g: u32 = 0;
            let mut sum_b: u32 = 0;
            let mut ink_count: u32 = 0;

            for dy in 0..4 {
                for dx in 0..2 {
                    let x = px0 + dx;
                    let y = py0 + dy;
                    if x >= canvas.w || y >= canvas.h {
                        continue;
                    }
                    let p = canvas.px[canvas.idx(x, y)];
                    // alpha threshold for ink
                    if p.a >= 32 {
                        mask |= braille_bit(dx, dy);
                        sum_r += p.r as u32;
                        sum_g += p.g as u32;
                        sum_b += p.b as u32;
                        ink_count += 1;
                    }
                }
            }

            let ch = if mask == 0 {
                ' '
            } else {
                char::from_u32(0x2800 + mask as u32).unwrap_or(' ')
            };

            let fg = if enable_color && ink_count > 0 {
                Color::Rgb {
                    r: (sum_r / ink_count) as u8,
                    g: (sum_g / ink_count) as u8,
                    b: (sum_b / ink_count) as u8,
                }
            } else {
                Color::White
            };

            out.set(
                cx as u16,
                cy as u16,
                Cell {
                    ch,
                    fg,
                    bg,
                    bold: false,
                },
            );
        }
    }
}

/* -----------------------------
   Voxel scene (world px -> subpixels)
------------------------------ */

#[derive(Clone, Copy)]
struct Faces {
    front: Pixel,
    side: Pixel,
    top: Pixel,
}

const WOOL: Faces = Faces {
    front: hex(0xFFFFFF),
    side: hex(0xCCCCCC),
    top: hex(0xEEEEEE),
};
const FACE: Faces = Faces {
    front: hex(0xFFE4C4),
    side: hex(0xDEB887),
    top: hex(0xF5DEB3),
};
const HOOF: Faces = Faces {
    front: hex(0x333333),
    side: hex(0x111111),
    top: hex(0x222222),
};
const SHELL: Faces = Faces {
    front: hex(0xFF4D4D),
    side: hex(0xCC0000),
    top: hex(0xFF6666),
};

fn sub(v: f32) -> i32 {
    (v / PX_PER_SUBPX).round() as i32
}

/// Draws in world px; `bottom` arguments are heights above the baseline.
struct Painter<'a> {
    canvas: &'a mut PixelCanvas,
    baseline: f32,
}

impl Painter<'_> {
    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, p: Pixel) {
        self.canvas
            .fill_rect(sub(x), sub(y), sub(w).max(1), sub(h).max(1), p);
    }

    fn block(&mut self, left: f32, bottom: f32, w: f32, h: f32, p: Pixel) {
        self.rect(left, self.baseline - bottom - h, w, h, p);
    }

    fn ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, p: Pixel) {
        self.canvas
            .fill_ellipse(sub(cx), sub(cy), sub(rx), sub(ry), p);
    }

    /// Front face plus a top face skewed up-right and a side face skewed up.
    fn voxel(&mut self, left: f32, bottom: f32, w: f32, h: f32, depth: f32, faces: Faces) {
        let x0 = sub(left);
        let y0 = sub(self.baseline - bottom - h);
        let w = sub(w).max(1);
        let h = sub(h).max(1);
        let d = sub(depth).max(1);
        for c in 0..d {
            self.canvas.fill_rect(x0 + w + c, y0 - c - 1, 1, h, faces.side);
        }
        for r in 0..d {
            self.canvas.fill_rect(x0 + r + 1, y0 - r - 1, w, 1, faces.top);
        }
        self.canvas.fill_rect(x0, y0, w, h, faces.front);
    }
}

pub(crate) fn draw_scene<R>(
    canvas: &mut PixelCanvas,
    engine: &Engine<R>,
    anim: &Timelines,
    layout: &Layout,
) {
    canvas.clear(Pixel::default());
    let world_w = layout.world_width();
    let world_h = layout.world_height();
    let ground_top = world_h - GROUND_HEIGHT;

    // hills
    canvas.fill_diamond(sub(50.0), sub(world_h - 140.0), sub(141.0), hex(0x8FBC8F));
    canvas.fill_diamond(
        sub(world_w - 75.0),
        sub(world_h - 165.0),
        sub(177.0),
        hex(0x228B22),
    );

    let mut p = Painter {
        canvas,
        baseline: world_h - BASELINE_LIFT,
    };

    for c in &anim.clouds {
        let s = c.size;
        p.ellipse(c.x + 25.0 * s, c.y + 35.0 * s, 25.0 * s, 25.0 * s, hex(0xFFFFFF));
        p.ellipse(c.x + 55.0 * s, c.y + 30.0 * s, 30.0 * s, 30.0 * s, hex(0xF0F0F0));
        p.ellipse(c.x + 80.0 * s, c.y + 35.0 * s, 20.0 * s, 20.0 * s, hex(0xE0E0E0));
    }

    // ground
    p.rect(0.0, ground_top, world_w, GROUND_HEIGHT, hex(0x654321));
    let offset = anim.ground_offset();
    let tiles = (world_w / TILE_PITCH) as i32 + 2;
    for i in 0..tiles {
        let x = i as f32 * TILE_PITCH + offset;
        p.rect(x, world_h - 20.0, 20.0, 20.0, hexa(0x8B4513, 128));
    }
    p.rect(0.0, ground_top, world_w, GRASS_HEIGHT, hex(0x4CAF50));

    draw_crab(&mut p, engine.obstacle.x, anim.claw_lift());
    draw_sheep(&mut p, AVATAR_LEFT, engine.avatar.offset);

    if engine.is_exploded() {
        let cy = p.baseline - engine.avatar.offset - 20.0;
        p.ellipse(AVATAR_LEFT + 35.0, cy, 36.0, 24.0, hexa(0xFF9F0A, 220));
        p.ellipse(AVATAR_LEFT + 35.0, cy, 18.0, 12.0, hexa(0xFFF176, 240));
    }
}

fn draw_sheep(p: &mut Painter<'_>, left: f32, lift: f32) {
    // shadow stays on the ground
    let ground = p.baseline;
    p.ellipse(left + 30.0, ground + 2.0, 20.0, 5.0, hexa(0x000000, 77));
    for leg in [35.0, 10.0] {
        p.voxel(left + leg, lift, 6.0, 12.0, 4.0, HOOF);
    }
    p.voxel(left, lift + 8.0, 45.0, 35.0, 15.0, WOOL);
    p.voxel(left + 33.0, lift + 15.0, 25.0, 20.0, 8.0, FACE);
    p.block(left + 46.0, lift + 25.0, 4.0, 4.0, hex(0x000000));
    for leg in [25.0, 5.0] {
        p.voxel(left + leg, lift - 5.0, 6.0, 12.0, 4.0, HOOF);
    }
}

fn draw_crab(p: &mut Painter<'_>, left: f32, claw_lift: f32) {
    let red = hex(0xCC0000);
    let ground = p.baseline;
    p.ellipse(left + 25.0, ground + 1.0, 20.0, 4.0, hexa(0x000000, 77));
    p.block(left, 0.0, 5.0, 10.0, red);
    p.block(left + 35.0, 0.0, 5.0, 10.0, red);
    p.voxel(left + 5.0, 5.0, 40.0, 25.0, 10.0, SHELL);
    // eye stalks and eyes
    p.block(left + 15.0, 30.0, 4.0, 10.0, red);
    p.block(left + 26.0, 30.0, 4.0, 10.0, red);
    let eye_y = ground - 39.0;
    p.ellipse(left + 17.0, eye_y, 3.0, 3.0, hex(0x000000));
    p.ellipse(left + 28.0, eye_y, 3.0, 3.0, hex(0x000000));
    let claw_bottom = 18.0 + claw_lift * 5.0;
    p.voxel(left - 10.0, claw_bottom, 12.0, 12.0, 5.0, SHELL);
    p.voxel(left + 43.0, claw_bottom, 12.0, 12.0, 5.0, SHELL);
}

/// Plain-character rendition for terminals without braille glyphs.
pub(crate) fn draw_scene_ascii<R>(
    buf: &mut CellBuffer,
    engine: &Engine<R>,
    anim: &Timelines,
    layout: &Layout,
    sky: Color,
) {
    let world_h = layout.world_height();
    let grass_row = ((world_h - GROUND_HEIGHT) / PX_PER_ROW) as u16;
    let air = Cell {
        bg: sky,
        ..Cell::default()
    };
    for y in 0..grass_row {
        buf.fill_row(y, 0, buf.w, air);
    }
    for y in grass_row..layout.game_rows {
        for x in 0..buf.w {
            let (ch, fg, bg) = if y == grass_row {
                ('▀', Color::Green, Color::DarkYellow)
            } else {
                let wx = x as f32 * PX_PER_COL - anim.ground_offset();
                let tile = wx.rem_euclid(TILE_PITCH) < 20.0;
                (if tile { '▓' } else { '░' }, Color::DarkYellow, Color::Black)
            };
            buf.set(x, y, Cell { ch, fg, bg, bold: false });
        }
    }

    for c in &anim.clouds {
        let x = (c.x / PX_PER_COL).round() as i32;
        let y = (c.y / PX_PER_ROW).round() as i32 + 1;
        draw_sprite(buf, x, y, &[" .--. ", "(____)"], Color::White, sky);
    }

    let baseline = world_h - BASELINE_LIFT;
    let crab_row = (baseline / PX_PER_ROW).ceil() as i32 - 1;
    let crab_col = (engine.obstacle.x / PX_PER_COL).round() as i32;
    let claws = if anim.claw_lift() > 0.5 {
        ["V o o V", " (___) ", " /   \\ "]
    } else {
        ["  o o  ", "v(___)v", " /   \\ "]
    };
    draw_sprite(buf, crab_col - 1, crab_row - 2, &claws, Color::Red, sky);

    let sheep_row = ((baseline - engine.avatar.offset) / PX_PER_ROW).ceil() as i32 - 1;
    let sheep_col = (AVATAR_LEFT / PX_PER_COL).round() as i32;
    let sheep = if engine.is_exploded() {
        ["\\ * /", "*BOOM*", "/ * \\"]
    } else {
        [" @@@@o", "@@@@@ ", " \" \" "]
    };
    draw_sprite(buf, sheep_col, sheep_row - 2, &sheep, Color::White, sky);
}

fn draw_sprite(buf: &mut CellBuffer, x0: i32, y0: i32, lines: &[&str], fg: Color, sky: Color) {
    for (dy, line) in lines.iter().enumerate() {
        let y = y0 + dy as i32;
        if y < 0 || y >= buf.h as i32 {
            continue;
        }
        for (dx, ch) in line.chars().enumerate() {
            let x = x0 + dx as i32;
            if ch == ' ' || x < 0 || x >= buf.w as i32 {
                continue;
            }
            let bg = buf.get(x as u16, y as u16).map_or(sky, |c| c.bg);
            buf.set(x as u16, y as u16, Cell { ch, fg, bg, bold: false });
        }
    }
}

pub(crate) fn sky_color(anim: &Timelines, enable_color: bool) -> Color {
    match (enable_color, anim.gold_sky()) {
        (false, _) => Color::Black,
        (true, true) => rgb(GOLD),
        (true, false) => rgb(SKY),
    }
}

/// Title, score and milestone banner over the game panel.
pub(crate) fn draw_hud(buf: &mut CellBuffer, score: u32, anim: &Timelines, enable_color: bool) {
    let sky = |buf: &CellBuffer, x: u16, y: u16| buf.get(x, y).map_or(Color::Black, |c| c.bg);

    let title = "Action Calc 3D Turbo 🚀";
    let bg = sky(buf, 1, 0);
    draw_text(buf, 1, 0, title, Color::White, bg, true);

    let score_text = format!("Avoid: {score}");
    let x = buf.w.saturating_sub(text_width(&score_text) + 2);
    let pulsing = anim.score_scale() > 1.15;
    let fg = if pulsing && enable_color {
        rgb(GOLD)
    } else {
        Color::White
    };
    let bg = sky(buf, x, 0);
    draw_text(buf, x, 0, &score_text, fg, bg, true);

    let opacity = anim.milestone_opacity();
    if opacity > 0.05 {
        let banner = "SUPER!! 🌟";
        let x = (buf.w / 2).saturating_sub(text_width(banner) / 2);
        let y = 4;
        let fg = if enable_color {
            mix(GOLD, 0xFFFFFF, 1.0 - opacity)
        } else {
            Color::Yellow
        };
        let bg = sky(buf, x, y);
        draw_text(buf, x, y, banner, fg, bg, true);
    }
}

/* -----------------------------
   Calculator display + keypad
------------------------------ */

pub(crate) fn draw_calculator(
    buf: &mut CellBuffer,
    calc: &Calculator,
    error: Option<&CalcError>,
    layout: &Layout,
) {
    let sep = Cell {
        ch: '─',
        ..Cell::default()
    };
    buf.fill_row(layout.game_rows, 0, buf.w, sep);

    let max_w = buf.w.saturating_sub(4) as usize;
    match (error, calc.last_history.as_deref()) {
        (Some(err), _) => {
            let text = format!("error: {err}");
            draw_right(buf, layout.history_row, &tail(&text, max_w), Color::Red, false);
        }
        (None, Some(history)) => {
            let grey = Color::Rgb {
                r: 0x88,
                g: 0x88,
                b: 0x88,
            };
            draw_right(buf, layout.history_row, &tail(history, max_w), grey, false);
        }
        (None, None) => {}
    }

    let text = calc.display_text();
    draw_right(buf, layout.display_row, &tail(&text, max_w), Color::White, true);
}

pub(crate) fn draw_keypad(buf: &mut CellBuffer, layout: &Layout, enable_color: bool) {
    for b in layout.buttons() {
        let (bg, fg) = match (enable_color, b.style) {
            (false, ButtonStyle::Digit) => (Color::DarkGrey, Color::White),
            (false, _) => (Color::White, Color::Black),
            (true, ButtonStyle::Digit) => (rgb(0x333333), Color::White),
            (true, ButtonStyle::Function) => (rgb(0xA5A5A5), Color::Black),
            (true, ButtonStyle::Operator) => (rgb(0xFF9F0A), Color::White),
        };
        buf.fill_row(
            b.y,
            b.x,
            b.w,
            Cell {
                ch: ' ',
                fg,
                bg,
                bold: false,
            },
        );
        let lx = b.x + b.w.saturating_sub(text_width(b.label)) / 2;
        draw_text(buf, lx, b.y, b.label, fg, bg, true);
    }
}

/* -----------------------------
   Text helpers
------------------------------ */

fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x1F300..=0x1FAFF
        | 0x20000..=0x3FFFD)
}

pub(crate) fn text_width(s: &str) -> u16 {
    s.chars().map(|ch| if is_wide(ch) { 2 } else { 1 }).sum()
}

/// Last `max` columns of `s`, so long numbers keep their least significant digits.
fn tail(s: &str, max: usize) -> String {
    let mut out: Vec<char> = Vec::new();
    let mut used = 0usize;
    for ch in s.chars().rev() {
        let w = if is_wide(ch) { 2 } else { 1 };
        if used + w > max {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.into_iter().rev().collect()
}

pub(crate) fn draw_text(
    buf: &mut CellBuffer,
    x: u16,
    y: u16,
    s: &str,
    fg: Color,
    bg: Color,
    bold: bool,
) {
    let mut xx = x;
    for ch in s.chars() {
        let wide = is_wide(ch);
        let need = if wide { 2 } else { 1 };
        if xx.saturating_add(need) > buf.w || y >= buf.h {
            break;
        }
        buf.set(xx, y, Cell { ch, fg, bg, bold });
        if wide {
            buf.set(
                xx + 1,
                y,
                Cell {
                    ch: WIDE_TAIL,
                    fg,
                    bg,
                    bold,
                },
            );
        }
        xx += need;
    }
}

fn draw_right(buf: &mut CellBuffer, y: u16, s: &str, fg: Color, bold: bool) {
    let x = buf.w.saturating_sub(text_width(s) + 2);
    draw_text(buf, x, y, s, fg, Color::Black, bold);
}

pub(crate) fn draw_center_box(buf: &mut CellBuffer, title: &str, body: &str) {
    let (w, h) = (buf.w, buf.h);
    let bw = w.saturating_sub(4).min(56);
    let bh = h.saturating_sub(4).min(18);
    if bw < 2 || bh < 2 {
        return;
    }
    let x0 = (w - bw) / 2;
    let y0 = (h - bh) / 2;

    let put = |buf: &mut CellBuffer, x: u16, y: u16, ch: char| {
        buf.set(
            x,
            y,
            Cell {
                ch,
                ..Cell::default()
            },
        );
    };

    for y in y0..y0 + bh {
        buf.fill_row(y, x0, bw, Cell::default());
    }
    for x in x0..x0 + bw {
        put(buf, x, y0, '─');
        put(buf, x, y0 + bh - 1, '─');
    }
    for y in y0..y0 + bh {
        put(buf, x0, y, '│');
        put(buf, x0 + bw - 1, y, '│');
    }
    put(buf, x0, y0, '┌');
    put(buf, x0 + bw - 1, y0, '┐');
    put(buf, x0, y0 + bh - 1, '└');
    put(buf, x0 + bw - 1, y0 + bh - 1, '┘');

    draw_text(buf, x0 + 2, y0 + 1, title, Color::White, Color::Black, true);
    let mut yy = y0 + 3;
    for line in body.lines() {
        if yy >= y0 + bh - 1 {
            break;
        }
        draw_text(buf, x0 + 2, yy, line, Color::White, Color::Black, false);
        yy += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Operator;
    use crate::model::Tuning;
    use rand::rngs::mock::StepRng;

    fn exploded_engine(exploded: bool) -> Engine<StepRng> {
        let mut e = Engine::new(Tuning::default(), 640.0, StepRng::new(0, 0));
        e.collision.exploded = exploded;
        e
    }

    #[test]
    fn layout_stacks_panel_display_and_keypad() {
        let l = Layout::new(80, 40);
        assert_eq!(l.keypad_top, 31);
        assert_eq!(l.display_row, 29);
        assert_eq!(l.history_row, 28);
        assert_eq!(l.game_rows, MAX_GAME_ROWS);
        assert_eq!(l.world_width(), 640.0);
    }

    #[test]
    fn small_terminal_shrinks_game_panel() {
        let l = Layout::new(40, 22);
        assert_eq!(l.keypad_top, 13);
        assert_eq!(l.game_rows, 9);
    }

    #[test]
    fn clicks_hit_the_right_button() {
        let l = Layout::new(80, 40);
        assert_eq!(l.button_at(5, 31), Some(Key::Clear));
        assert_eq!(l.button_at(45, 31), Some(Key::Backspace));
        assert_eq!(l.button_at(65, 31), Some(Key::Op(Operator::Divide)));
        assert_eq!(l.button_at(25, 33), Some(Key::Digit(8)));
        assert_eq!(l.button_at(70, 39), Some(Key::Equals));
        assert_eq!(l.button_at(30, 39), Some(Key::Digit(0)));
    }

    #[test]
    fn clicks_between_buttons_miss() {
        let l = Layout::new(80, 40);
        assert_eq!(l.button_at(40, 31), None);
        assert_eq!(l.button_at(5, 32), None);
        assert_eq!(l.button_at(5, 30), None);
    }

    #[test]
    fn keypad_has_every_token() {
        let l = Layout::new(80, 40);
        assert_eq!(l.buttons().len(), 18);
    }

    #[test]
    fn wide_glyphs_take_two_cells() {
        let mut buf = CellBuffer::new(10, 1);
        draw_text(&mut buf, 0, 0, "a💥b", Color::White, Color::Black, false);
        assert_eq!(buf.cells[0].ch, 'a');
        assert_eq!(buf.cells[1].ch, '💥');
        assert_eq!(buf.cells[2].ch, WIDE_TAIL);
        assert_eq!(buf.cells[3].ch, 'b');
        assert_eq!(text_width("BOOM! 💥"), 8);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("123456789", 4), "6789");
        assert_eq!(tail("12", 4), "12");
    }

    #[test]
    fn voxel_draws_front_top_and_side() {
        let mut canvas = PixelCanvas::new(40, 40);
        let mut p = Painter {
            canvas: &mut canvas,
            baseline: 120.0,
        };
        // 4 subpx wide, 4 tall, 2 deep; front occupies x 4..8, y 26..30
        p.voxel(16.0, 0.0, 16.0, 16.0, 8.0, WOOL);
        let at = |x: u32, y: u32| canvas.px[canvas.idx(x, y)];
        assert_eq!(at(4, 26), WOOL.front);
        assert_eq!(at(5, 25), WOOL.top);
        assert_eq!(at(8, 27), WOOL.side);
        assert_eq!(at(3, 26).a, 0);
    }

    #[test]
    fn braille_cell_gets_ink_color() {
        let mut canvas = PixelCanvas::new(2, 4);
        canvas.fill_rect(0, 0, 2, 4, hex(0x102030));
        let mut out = CellBuffer::new(1, 1);
        canvas_to_cells(&canvas, &mut out, 1, true, Color::Black);
        assert_eq!(out.cells[0].ch, '⣿');
        assert_eq!(
            out.cells[0].fg,
            Color::Rgb {
                r: 0x10,
                g: 0x20,
                b: 0x30
            }
        );
    }

    #[test]
    fn ascii_scene_shows_sky_and_explosion() {
        let l = Layout::new(80, 40);
        let mut buf = CellBuffer::new(80, 40);
        draw_scene_ascii(&mut buf, &exploded_engine(true), &Timelines::new(), &l, Color::Blue);
        assert_eq!(buf.cells[buf.idx(0, 0)].bg, Color::Blue);
        // sheep sprite spans rows 10 to 12 from column 5
        assert_eq!(buf.cells[buf.idx(6, 11)].ch, 'B');
    }

    #[test]
    fn braille_scene_paints_the_explosion() {
        let l = Layout::new(80, 40);
        let anim = Timelines::new();
        let mut calm = PixelCanvas::new(160, 160);
        draw_scene(&mut calm, &exploded_engine(false), &anim, &l);
        let mut boom = PixelCanvas::new(160, 160);
        draw_scene(&mut boom, &exploded_engine(true), &anim, &l);
        // centre of the blast over the sheep
        let i = boom.idx(19, 44);
        assert!(boom.px[i].a > 0);
        assert_ne!(boom.px[i], calm.px[i]);
    }

    #[test]
    fn full_redraw_repaints_unchanged_cells() {
        let blank = Cell::default();
        let digit = Cell {
            ch: '7',
            ..Cell::default()
        };
        assert!(!needs_paint(&blank, &blank, true));
        assert!(needs_paint(&blank, &blank, false));
        assert!(needs_paint(&blank, &digit, true));
        let tail = Cell {
            ch: WIDE_TAIL,
            ..Cell::default()
        };
        assert!(!needs_paint(&blank, &tail, false));
    }
}
